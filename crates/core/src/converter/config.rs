//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the external-command executor.
///
/// Arguments may contain `{input}`, `{output_dir}`, `{job_id}`,
/// `{context_url}` and `{setting:<key>}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Program to run.
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Argument templates.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Timeout for a single conversion in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_program() -> PathBuf {
    PathBuf::from("cp")
}

fn default_args() -> Vec<String> {
    vec!["{input}".to_string(), "{output_dir}".to_string()]
}

fn default_timeout() -> u64 {
    3600 // 1 hour
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ConverterConfig {
    pub fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConverterConfig::default();
        assert_eq!(config.program, PathBuf::from("cp"));
        assert_eq!(config.args, vec!["{input}", "{output_dir}"]);
        assert_eq!(config.timeout_secs, 3600);
    }

    #[test]
    fn test_deserialize_config() {
        let config: ConverterConfig = toml::from_str(
            r#"
            program = "/usr/bin/soffice"
            args = ["--headless", "--convert-to", "{setting:format}", "--outdir", "{output_dir}", "{input}"]
            timeout_secs = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.program, PathBuf::from("/usr/bin/soffice"));
        assert_eq!(config.args.len(), 6);
        assert_eq!(config.timeout(), Duration::from_secs(600));
    }
}
