//! HTTP input fetcher with a size limit.

use std::path::{Path, PathBuf};

use reqwest::{Client, Url};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::DownloadConfig;
use crate::job::error_codes;

/// Errors that can occur while acquiring input.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Remote answered with a non-success status.
    #[error("Download failed with HTTP {status}")]
    Status { status: u16 },

    /// Connection, TLS or timeout failure.
    #[error("Download failed: {0}")]
    Transport(String),

    /// Body exceeded the configured limit.
    #[error("Input exceeds size limit of {limit} bytes")]
    TooLarge { limit: u64 },

    /// Local write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Job error code for this failure.
    pub fn code(&self) -> u32 {
        match self {
            Self::TooLarge { .. } => error_codes::DOWNLOAD_TOO_LARGE,
            _ => error_codes::DOWNLOAD_FAILED,
        }
    }
}

/// Streams a remote file to disk, enforcing `max_bytes`.
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    config: DownloadConfig,
}

impl Downloader {
    pub fn new(config: DownloadConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| DownloadError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Download `url` into `dest_dir`, returning the written file path.
    ///
    /// Any failure after the file is created removes the partial file.
    pub async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
        let parsed =
            Url::parse(url).map_err(|e| DownloadError::Transport(format!("invalid URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::Transport(format!(
                "unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }
        let dest = dest_dir.join(file_name_from_url(&parsed));

        let mut response = self.client.get(parsed).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::Transport(format!("timed out: {}", e))
            } else {
                DownloadError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
            });
        }

        let limit = self.config.max_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(DownloadError::TooLarge { limit });
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let mut file = tokio::fs::File::create(&dest).await?;
        match write_body(&mut response, &mut file, limit).await {
            Ok(written) => {
                tracing::debug!(url = %url, bytes = written, path = %dest.display(), "Input downloaded");
                Ok(dest)
            }
            Err(e) => {
                drop(file);
                remove_partial(&dest).await;
                Err(e)
            }
        }
    }
}

/// Copy the response body into `out`, stopping once more than `limit` bytes arrive.
async fn write_body<W>(
    response: &mut reqwest::Response,
    out: &mut W,
    limit: u64,
) -> Result<u64, DownloadError>
where
    W: AsyncWrite + Unpin,
{
    let mut written: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| DownloadError::Transport(e.to_string()))?
    {
        written += chunk.len() as u64;
        if written > limit {
            return Err(DownloadError::TooLarge { limit });
        }
        out.write_all(&chunk).await?;
    }
    out.flush().await?;
    Ok(written)
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial download");
    }
}

/// Last path segment of the URL, reduced to a safe file name.
fn file_name_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or_default();

    let cleaned: String = segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "input".to_string()
    } else {
        cleaned.to_string()
    }
}
