//! Input resolution: read an extracted-document JSON from a path or URL.
//!
//! Local files are read with `tokio::fs`; URLs are fetched with `reqwest`
//! under the configured download timeout. Both yield the raw bytes plus a
//! file name, which seeds the `file_name` metadata column.

use crate::error::Doc2TableError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The bytes of one input document.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    /// The input as given (path or URL).
    pub source: String,
    /// Final path or URL segment, e.g. `invoice-17.json`.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read the input document from a local path or an HTTP(S) URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Doc2TableError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<ResolvedInput, Doc2TableError> {
    if path_str.trim().is_empty() {
        return Err(Doc2TableError::InvalidInput {
            input: path_str.to_string(),
        });
    }
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Doc2TableError::PermissionDenied { path });
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Doc2TableError::InputNotFound { path });
        }
        Err(e) => {
            return Err(Doc2TableError::InvalidDocument {
                source_name: path.display().to_string(),
                detail: e.to_string(),
            });
        }
    };

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(ResolvedInput {
        source: path_str.to_string(),
        file_name: file_name_of(&path),
        bytes,
    })
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Doc2TableError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Doc2TableError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let to_error = |e: reqwest::Error| {
        if e.is_timeout() {
            Doc2TableError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Doc2TableError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(to_error)?;
    if !response.status().is_success() {
        return Err(Doc2TableError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }
    let bytes = response.bytes().await.map_err(to_error)?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(ResolvedInput {
        source: url.to_string(),
        file_name: extract_filename(url),
        bytes: bytes.to_vec(),
    })
}

/// Last non-empty path segment of a URL, or `downloaded.json`.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(last) = parsed
            .path_segments()
            .and_then(|s| s.filter(|seg| !seg.is_empty()).last())
        {
            return last.to_string();
        }
    }
    "downloaded.json".to_string()
}
