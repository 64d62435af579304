//! Fetches URL-sourced job input before conversion.

mod config;
mod fetcher;

pub use config::DownloadConfig;
pub use fetcher::{DownloadError, Downloader};
