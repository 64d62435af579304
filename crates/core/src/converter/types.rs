//! Types for the converter module.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything an executor needs to convert one job.
#[derive(Debug, Clone)]
pub struct ConversionContext {
    pub job_id: String,
    /// Settings captured when the job was created.
    pub settings: BTreeMap<String, String>,
    /// Input file on local disk.
    pub input_path: PathBuf,
    /// Directory the executor writes its outputs into. Created beforehand.
    pub output_dir: PathBuf,
    /// Base URL of the service, for executors that link back to it.
    pub context_url: Option<String>,
}
