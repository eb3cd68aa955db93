//! Ranged GET for a single part.

use std::io;
use std::pin::Pin;
use std::sync::Arc;

use futures::TryStreamExt;
use reqwest::header::RANGE;
use reqwest::Client;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::error::{DownloadError, Result};
use crate::probe::content_length;
use crate::state::PartRange;
use crate::throughput::{ConnStats, Metered};

/// Response body as a byte reader.
pub type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

pub struct RangeBody {
    pub reader: BodyReader,
    /// `Content-Length` of the ranged response
    pub declared_size: u64,
}

/// Turn a response into a reader, counting received bytes into `stats`.
pub fn body_reader(response: reqwest::Response, stats: Arc<ConnStats>) -> BodyReader {
    let stream = response
        .bytes_stream()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
    Box::pin(Metered::new(StreamReader::new(Box::pin(stream)), stats))
}

/// Request `range` and check the server's declared length against it.
pub async fn fetch_range(
    client: &Client,
    url: &str,
    range: PartRange,
    stats: Arc<ConnStats>,
) -> Result<RangeBody> {
    let response = client
        .get(url)
        .header(RANGE, range.header_value())
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Network(format!(
            "range {} returned HTTP {}",
            range.header_value(),
            status
        )));
    }

    let declared_size = content_length(response.headers())?;
    debug!(part = range.index, %status, declared_size, "range response");
    if declared_size != range.len() {
        return Err(DownloadError::RangeMismatch {
            expected: range.len(),
            declared: declared_size,
        });
    }

    Ok(RangeBody {
        reader: body_reader(response, stats),
        declared_size,
    })
}
