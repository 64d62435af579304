//! Conversion executor seam.
//!
//! The orchestrator hands each job to a `ConversionExecutor` together with a
//! `JobHandle`. The executor reports through the handle and returns; it owns
//! no scheduling or retry.
//!
//! `CommandExecutor` is the bundled implementation: it runs an external
//! program with templated arguments and stores whatever lands in the output
//! directory through an `ArtifactStorage`.

mod command;
mod config;
mod error;
mod traits;
mod types;

pub use command::CommandExecutor;
pub use config::ConverterConfig;
pub use error::ConversionError;
pub use traits::ConversionExecutor;
pub use types::ConversionContext;
