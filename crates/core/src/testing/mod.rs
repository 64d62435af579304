//! Testing utilities and mock implementations.
//!
//! Lets orchestrator and API tests run jobs end to end without an external
//! converter program.
//!
//! # Example
//!
//! ```rust,ignore
//! use convoy_core::testing::{fixtures, MockExecutor};
//!
//! let executor = MockExecutor::new().with_custom_value("pages", "10");
//! let input = fixtures::write_input(dir.path(), "in.docx", b"hello");
//! ```

mod mock_executor;

pub use mock_executor::MockExecutor;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    use crate::orchestrator::CreateJobRequest;

    /// Settings map from `(key, value)` pairs.
    pub fn settings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// A request with the given settings and no callback.
    pub fn create_request(pairs: &[(&str, &str)]) -> CreateJobRequest {
        CreateJobRequest::new(settings(pairs))
    }

    /// Write an input file under `dir` and return its path.
    pub fn write_input(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&path, contents);
        path
    }
}
