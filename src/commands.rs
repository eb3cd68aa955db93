use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

use crate::cli::NamingPolicy;
use crate::downloader::{DownloadConfig, Downloader};
use crate::progress::{PartBars, ProgressSink};
use crate::state::DownloadReport;
use crate::utils::output_path;

pub struct RunOptions {
    pub url: String,
    pub download_dir: PathBuf,
    pub naming: NamingPolicy,
    /// One unranged connection instead of segmented parts
    pub single: bool,
    pub report: Option<PathBuf>,
    pub config: DownloadConfig,
}

pub async fn run_download(opts: RunOptions) -> Result<DownloadReport> {
    info!("Url: {}", opts.url);
    let downloader = Downloader::new(opts.config);

    let report = if opts.single {
        let filepath = prepare_destination(&opts.download_dir, &opts.url, opts.naming).await?;
        let sink: Arc<dyn ProgressSink> = Arc::new(PartBars::new(1));
        downloader.download_single(&opts.url, &filepath, sink).await?
    } else {
        // probe before touching the filesystem so an unsupported server leaves nothing behind
        let plan = downloader.prepare(&opts.url).await?;
        let filepath = prepare_destination(&opts.download_dir, &opts.url, opts.naming).await?;
        let sink: Arc<dyn ProgressSink> = Arc::new(PartBars::new(plan.ranges.len()));
        downloader.execute(&plan, &filepath, sink).await?
    };

    info!("Elapsed time: {:?}", report.elapsed());
    info!("Done!");

    if let Some(path) = &opts.report {
        write_report(&report, path).await?;
    }
    Ok(report)
}

async fn prepare_destination(dir: &Path, url: &str, naming: NamingPolicy) -> Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir).await.context("Failed to create output directory")?;
    }
    let filepath = output_path(dir, url, naming)?;
    info!("Local path: {}", filepath.display());
    Ok(filepath)
}

pub async fn write_report(report: &DownloadReport, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write report to {:?}", path))?;
    Ok(())
}

/// Ask for a URL on stdin.
pub fn prompt_url() -> Result<String> {
    eprint!("Please enter a URL: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let url = line.trim().to_string();
    if url.is_empty() {
        bail!("no URL given");
    }
    Ok(url)
}
