//! Completion callbacks with bounded retry.
//!
//! Delivery is at-least-once: a receiver may see the same snapshot more than
//! once if an attempt succeeds but its response is lost. Outcomes never touch
//! job state.

mod config;
mod dispatcher;

pub use config::CallbackConfig;
pub use dispatcher::{CallbackDispatcher, CallbackError, CallbackStats};
