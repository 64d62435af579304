//! Trait definitions for the converter module.

use async_trait::async_trait;

use super::error::ConversionError;
use super::types::ConversionContext;
use crate::job::JobHandle;

/// Runs one conversion and reports through the job handle.
#[async_trait]
pub trait ConversionExecutor: Send + Sync {
    /// Returns the name of this executor implementation.
    fn name(&self) -> &str;

    /// Convert `ctx.input_path` into `ctx.output_dir`.
    ///
    /// Returning `Ok` marks the job processed unless the executor already
    /// reported an error through `job`. Returning `Err` marks it failed with
    /// the error's code. A panic is treated like a generic failure.
    async fn execute(&self, ctx: ConversionContext, job: JobHandle) -> Result<(), ConversionError>;
}
