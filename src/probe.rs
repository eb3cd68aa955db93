//! Capability probing: can this resource be fetched in ranges, and how big is it?

use reqwest::header::{HeaderMap, ACCEPT_RANGES, CONTENT_LENGTH};
use reqwest::Client;
use tracing::debug;

use crate::error::{DownloadError, Result};

/// A resource that has been confirmed to support byte-range requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub url: String,
    pub total_size: u64,
}

/// Issue one plain GET and inspect its headers.
///
/// The body is never read; the response is dropped before returning so the
/// connection is released instead of lingering.
pub async fn probe(client: &Client, url: &str) -> Result<Resource> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Network(format!("probe returned HTTP {}", status)));
    }
    debug!(?status, headers = ?response.headers(), "probe response");

    let total_size = inspect_headers(response.headers());
    drop(response);

    Ok(Resource {
        url: url.to_string(),
        total_size: total_size?,
    })
}

/// Validate `Accept-Ranges` first, then parse `Content-Length`.
pub fn inspect_headers(headers: &HeaderMap) -> Result<u64> {
    match headers.get(ACCEPT_RANGES) {
        None => {
            return Err(DownloadError::Unsupported(
                "server did not send Accept-Ranges".into(),
            ))
        }
        Some(value) if value.as_bytes() != b"bytes" => {
            return Err(DownloadError::Unsupported(format!(
                "Accept-Ranges is {:?}, not \"bytes\"",
                value
            )))
        }
        Some(_) => {}
    }

    content_length(headers)
}

pub fn content_length(headers: &HeaderMap) -> Result<u64> {
    let value = headers
        .get(CONTENT_LENGTH)
        .ok_or_else(|| DownloadError::Format("missing Content-Length".into()))?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| DownloadError::Format(format!("unparseable Content-Length {:?}", value)))
}
