//! Positional writes into the shared destination file.

use std::fs::File;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::error::{DownloadError, Result};
use crate::progress::{PercentTracker, ProgressSink};
use crate::state::PartState;
use crate::throughput::ConnStats;

pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Destination file shared by every part.
///
/// Writes carry their own absolute offset, so there is no shared cursor and
/// no lock: parts never write outside their own range.
#[derive(Clone, Debug)]
pub struct PositionalFile {
    file: Arc<File>,
    path: PathBuf,
    stats: Option<Arc<ConnStats>>,
}

impl PositionalFile {
    /// Open read/write, creating the file if needed. Existing content is kept.
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await?
            .into_std()
            .await;

        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
            stats: None,
        })
    }

    /// Count every byte written through this handle into `stats`.
    pub fn metered(mut self, stats: Arc<ConnStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `chunk` at `offset`. May write fewer bytes than requested.
    pub async fn write_at(&self, offset: u64, chunk: Vec<u8>) -> io::Result<usize> {
        let file = Arc::clone(&self.file);
        let wrote = tokio::task::spawn_blocking(move || write_at_offset(&file, &chunk, offset))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
        if let Some(stats) = &self.stats {
            stats.record_write(wrote as u64);
        }
        Ok(wrote)
    }

    /// Resize to exactly `size` bytes, dropping any stale tail.
    pub async fn set_len(&self, size: u64) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.set_len(size))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }

    pub async fn sync(&self) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }

    pub async fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

#[cfg(unix)]
fn write_at_offset(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

#[cfg(windows)]
fn write_at_offset(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}

/// Stream one part's body into its range of the file.
///
/// Succeeds only when exactly `declared` bytes were written. Progress reaches
/// 100 and the part is marked finished only on success.
pub async fn write_part<R>(
    file: &PositionalFile,
    reader: R,
    state: &mut PartState,
    declared: u64,
    chunk_size: usize,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    copy_part(
        move |offset, chunk| file.write_at(offset, chunk),
        reader,
        state,
        declared,
        chunk_size,
        sink,
        cancel,
    )
    .await
}

async fn copy_part<W, F, R>(
    mut write: W,
    mut reader: R,
    state: &mut PartState,
    declared: u64,
    chunk_size: usize,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<u64>
where
    W: FnMut(u64, Vec<u8>) -> F,
    F: Future<Output = io::Result<usize>>,
    R: AsyncRead + Unpin,
{
    let mut tracker = PercentTracker::new(declared);
    let mut buf = vec![0u8; chunk_size.max(1)];

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            read = reader.read(&mut buf) => {
                read.map_err(|e| DownloadError::Network(format!("body read failed: {}", e)))?
            }
        };
        if n == 0 {
            break;
        }
        if state.written + n as u64 > declared {
            return Err(DownloadError::Overflow { declared });
        }

        let wrote = write(state.current_byte(), buf[..n].to_vec()).await?;
        if wrote != n {
            return Err(DownloadError::ShortWrite {
                requested: n,
                written: wrote,
            });
        }
        state.written += n as u64;

        // 100 is held back until end of input confirms the part
        if state.written < declared {
            if let Some(percent) = tracker.update(state.written) {
                sink.set_percent(state.index, percent);
            }
        }
    }

    if state.written != declared {
        return Err(DownloadError::IncompleteTransfer {
            expected: declared,
            written: state.written,
        });
    }

    if let Some(percent) = tracker.update(state.written) {
        sink.set_percent(state.index, percent);
    }
    state.completed = true;
    sink.finish(state.index);
    Ok(state.written)
}
