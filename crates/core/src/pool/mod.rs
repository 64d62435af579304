//! Bounded worker pools for the download, convert and callback stages.
//!
//! Each pool is fed by an unbounded queue, so submission never blocks the
//! caller. A saturated pool simply leaves work queued longer.

mod config;
mod types;
mod worker;

pub use config::{PoolsConfig, WorkerPools};
pub use types::{PoolError, PoolStatus};
pub use worker::WorkerPool;
pub(crate) use worker::panic_message;
