use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

use segdl::cli::{NamingPolicy, RemainderPolicy};
use segdl::commands::{prompt_url, run_download, RunOptions};
use segdl::{DownloadConfig, DownloadError};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL to download (prompted for when omitted)
    #[arg(index = 1)]
    url: Option<String>,

    /// Number of parallel connections
    #[arg(short = 'c', long = "connections", default_value_t = 5)]
    connections: usize,

    /// Directory to save the downloaded file
    #[arg(short = 'd', long = "download-dir", default_value = ".")]
    download_dir: PathBuf,

    /// Prefix the file name with the current time
    #[arg(short = 't', long = "timestamp")]
    timestamp: bool,

    /// Where the bytes left over by an uneven split go
    #[arg(long, value_enum, default_value = "last-part")]
    partition: RemainderPolicy,

    /// Download over a single connection, logging throughput
    #[arg(long)]
    single: bool,

    /// Write a JSON report of the finished download to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Seconds between throughput samples
    #[arg(long = "sample-interval", default_value_t = 3)]
    sample_interval: u64,

    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "debug,hyper=warn,reqwest=warn"
    } else {
        "info,hyper=warn,reqwest=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<DownloadError>().and_then(DownloadError::part_index) {
                Some(index) => error!(part = index, "err: {:#}", e),
                None => error!("err: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let url = match args.url {
        Some(url) => url,
        None => prompt_url()?,
    };

    let config = DownloadConfig {
        workers: args.connections,
        remainder: args.partition,
        sample_interval: Duration::from_secs(args.sample_interval.max(1)),
        ..DownloadConfig::default()
    };

    let opts = RunOptions {
        url,
        download_dir: args.download_dir,
        naming: if args.timestamp {
            NamingPolicy::Timestamp
        } else {
            NamingPolicy::Plain
        },
        single: args.single,
        report: args.report,
        config,
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { run_download(opts).await })?;
    Ok(())
}
