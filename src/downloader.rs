use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cli::RemainderPolicy;
use crate::error::{DownloadError, Result};
use crate::fetcher::{body_reader, fetch_range};
use crate::planner::plan;
use crate::probe::{content_length, probe, Resource};
use crate::progress::ProgressSink;
use crate::state::{DownloadReport, PartRange, PartState};
use crate::throughput::{spawn_rate_logger, ConnStats};
use crate::writer::{write_part, PositionalFile, DEFAULT_CHUNK_SIZE};

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub workers: usize,
    pub remainder: RemainderPolicy,
    /// Read buffer per part
    pub chunk_size: usize,
    pub connect_timeout: Duration,
    /// How often the smoothed throughput is sampled and logged
    pub sample_interval: Duration,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            remainder: RemainderPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: Duration::from_secs(10),
            sample_interval: Duration::from_secs(3),
            user_agent: format!("segdl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// A probed resource and the ranges it will be fetched in.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    pub resource: Resource,
    pub ranges: Vec<PartRange>,
}

impl DownloadPlan {
    /// Bytes the ranges leave uncovered (non-zero only with truncating partitions).
    pub fn uncovered_bytes(&self) -> u64 {
        let covered: u64 = self.ranges.iter().map(|r| r.len()).sum();
        self.resource.total_size - covered
    }
}

pub struct Downloader {
    client: Client,
    config: DownloadConfig,
    stats: Arc<ConnStats>,
}

impl Downloader {
    pub fn new(config: DownloadConfig) -> Self {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            config,
            stats: ConnStats::shared(),
        }
    }

    pub fn stats(&self) -> Arc<ConnStats> {
        Arc::clone(&self.stats)
    }

    /// Probe the URL and partition it. Nothing is written to disk.
    pub async fn prepare(&self, url: &str) -> Result<DownloadPlan> {
        let resource = probe(&self.client, url).await?;
        info!(size = resource.total_size, "File size: {} bytes", resource.total_size);

        let ranges = plan(resource.total_size, self.config.workers, self.config.remainder)?;
        let plan = DownloadPlan { resource, ranges };

        let uncovered = plan.uncovered_bytes();
        if uncovered > 0 {
            warn!(uncovered, "truncating partition leaves trailing bytes unfetched");
        }
        Ok(plan)
    }

    pub async fn download(
        &self,
        url: &str,
        path: &Path,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<DownloadReport> {
        let plan = self.prepare(url).await?;
        self.execute(&plan, path, sink).await
    }

    /// Fetch every range concurrently into `path`.
    ///
    /// The first part to fail cancels the others; its error is returned
    /// tagged with the part index. If this call created the file, the partial
    /// file is removed on failure.
    pub async fn execute(
        &self,
        plan: &DownloadPlan,
        path: &Path,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<DownloadReport> {
        let started = Instant::now();
        let existed = path.exists();
        let file = PositionalFile::open(path).await?.metered(self.stats());
        file.set_len(plan.resource.total_size).await?;

        let cancel = CancellationToken::new();
        let ticker_stop = CancellationToken::new();
        let ticker = spawn_rate_logger(self.stats(), self.config.sample_interval, ticker_stop.clone());

        let mut tasks = JoinSet::new();
        for range in plan.ranges.iter().copied() {
            let client = self.client.clone();
            let url = plan.resource.url.clone();
            let file = file.clone();
            let sink = Arc::clone(&sink);
            let stats = self.stats();
            let cancel = cancel.clone();
            let chunk_size = self.config.chunk_size;

            debug!(part = range.index, start = range.start, end = range.end, "dispatching part");
            tasks.spawn(async move {
                let mut state = PartState::new(range);
                let result = run_part(
                    &client, &url, range, &mut state, &file, &*sink, stats, chunk_size, &cancel,
                )
                .await;
                (state, result)
            });
        }

        let mut parts = Vec::with_capacity(plan.ranges.len());
        let mut failure: Option<DownloadError> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((state, Ok(()))) => {
                    debug!(part = state.index, bytes = state.written, "part complete");
                    parts.push(state);
                }
                Ok((state, Err(err))) => {
                    if failure.is_none() {
                        error!(part = state.index, error = %err, "part failed");
                        cancel.cancel();
                        failure = Some(err.in_part(state.index));
                    }
                    parts.push(state);
                }
                Err(join_err) => {
                    if failure.is_none() {
                        error!(error = %join_err, "part task aborted");
                        cancel.cancel();
                        failure = Some(DownloadError::Io(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            format!("part task aborted: {}", join_err),
                        )));
                    }
                }
            }
        }

        ticker_stop.cancel();
        let _ = ticker.await;

        if let Some(err) = failure {
            drop(file);
            if !existed {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!(path = %path.display(), error = %e, "could not remove partial file");
                }
            }
            return Err(err);
        }

        file.sync().await?;
        let size = file.size().await?;
        debug!(path = %file.path().display(), size, "file synced");
        parts.sort_by_key(|p| p.index);

        Ok(DownloadReport {
            url: plan.resource.url.clone(),
            path: path.display().to_string(),
            total_size: plan.resource.total_size,
            elapsed_ms: started.elapsed().as_millis() as u64,
            parts,
        })
    }

    /// Fetch the whole resource over one metered connection, without ranges.
    pub async fn download_single(
        &self,
        url: &str,
        path: &Path,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<DownloadReport> {
        let started = Instant::now();

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Network(format!("GET returned HTTP {}", status)));
        }
        let declared = content_length(response.headers())?;
        let range = plan(declared, 1, RemainderPolicy::LastPart)?[0];
        info!(size = declared, "File size: {} bytes", declared);

        let existed = path.exists();
        let file = PositionalFile::open(path).await?.metered(self.stats());
        file.set_len(declared).await?;
        let ticker_stop = CancellationToken::new();
        let ticker = spawn_rate_logger(self.stats(), self.config.sample_interval, ticker_stop.clone());

        let mut state = PartState::new(range);
        let result = write_part(
            &file,
            body_reader(response, self.stats()),
            &mut state,
            declared,
            self.config.chunk_size,
            &*sink,
            &CancellationToken::new(),
        )
        .await;

        ticker_stop.cancel();
        let _ = ticker.await;

        if let Err(err) = result {
            drop(file);
            if !existed {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!(path = %path.display(), error = %e, "could not remove partial file");
                }
            }
            return Err(err.in_part(0));
        }
        file.sync().await?;

        Ok(DownloadReport {
            url: url.to_string(),
            path: path.display().to_string(),
            total_size: declared,
            elapsed_ms: started.elapsed().as_millis() as u64,
            parts: vec![state],
        })
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_part(
    client: &Client,
    url: &str,
    range: PartRange,
    state: &mut PartState,
    file: &PositionalFile,
    sink: &dyn ProgressSink,
    stats: Arc<ConnStats>,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        body = fetch_range(client, url, range, stats) => body?,
    };
    write_part(file, body.reader, state, body.declared_size, chunk_size, sink, cancel).await?;
    Ok(())
}
