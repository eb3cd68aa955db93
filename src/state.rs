use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Inclusive byte range `[start, end]` owned by one part.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl PartRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Transfer state of one part. Only the task that owns the part mutates it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PartState {
    pub index: usize,
    pub start_byte: u64,
    pub end_byte: u64,
    pub expected_size: u64,
    pub written: u64,
    pub completed: bool,
}

impl PartState {
    pub fn new(range: PartRange) -> Self {
        Self {
            index: range.index,
            start_byte: range.start,
            end_byte: range.end,
            expected_size: range.len(),
            written: 0,
            completed: false,
        }
    }

    /// Absolute file offset of the next byte this part will write.
    pub fn current_byte(&self) -> u64 {
        self.start_byte + self.written
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DownloadReport {
    pub url: String,
    pub path: String,
    pub total_size: u64,
    pub elapsed_ms: u64,
    pub parts: Vec<PartState>,
}

impl DownloadReport {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    pub fn bytes_written(&self) -> u64 {
        self.parts.iter().map(|p| p.written).sum()
    }
}
