//! Segmented HTTP downloader.
//!
//! A resource is probed for byte-range support, split into contiguous ranges,
//! and every range is fetched over its own connection and written straight
//! into its offset of the destination file.

pub mod cli;
pub mod commands;
pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod state;
pub mod throughput;
pub mod utils;
pub mod writer;

pub use downloader::{DownloadConfig, DownloadPlan, Downloader};
pub use error::{DownloadError, Result};
pub use writer::{write_part, PositionalFile, DEFAULT_CHUNK_SIZE};
