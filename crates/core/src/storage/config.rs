use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for local artifact storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `<job_id>/<name>` artifacts.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// URL prefix under which `root` is served.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_root() -> PathBuf {
    PathBuf::from("./data/artifacts")
}

fn default_public_base_url() -> String {
    "http://localhost:8080/artifacts".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            public_base_url: default_public_base_url(),
        }
    }
}
