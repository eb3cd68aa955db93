//! Error types for segmented downloads.

use thiserror::Error;

/// Everything that can stop a download.
///
/// Probe and planning failures surface before any file is touched. Every
/// failure inside a part is wrapped in [`DownloadError::Part`] so the caller
/// knows which range broke.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Server does not advertise `Accept-Ranges: bytes`
    #[error("range requests not supported: {0}")]
    Unsupported(String),

    /// A required header was missing or unparseable
    #[error("malformed response: {0}")]
    Format(String),

    /// Invalid worker count or degenerate size
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Connection or transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Body ended before the declared size was reached
    #[error("transfer incomplete: wrote {written} of {expected} bytes")]
    IncompleteTransfer { expected: u64, written: u64 },

    /// The OS accepted fewer bytes than requested
    #[error("short write: {written} of {requested} bytes")]
    ShortWrite { requested: usize, written: usize },

    /// Server declared a part length other than the one requested
    #[error("server declared {declared} bytes for a {expected} byte range")]
    RangeMismatch { expected: u64, declared: u64 },

    /// Body carried more bytes than declared
    #[error("body exceeded declared size of {declared} bytes")]
    Overflow { declared: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A sibling part failed and this one was stopped
    #[error("cancelled")]
    Cancelled,

    #[error("part {index}: {source}")]
    Part {
        index: usize,
        #[source]
        source: Box<DownloadError>,
    },
}

impl DownloadError {
    pub fn in_part(self, index: usize) -> Self {
        match self {
            DownloadError::Part { .. } => self,
            other => DownloadError::Part {
                index,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error, looking through any part wrapper.
    pub fn root(&self) -> &DownloadError {
        match self {
            DownloadError::Part { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn part_index(&self) -> Option<usize> {
        match self {
            DownloadError::Part { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        DownloadError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
