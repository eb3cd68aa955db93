//! Byte counters around transport streams and a smoothed transfer rate.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use indicatif::HumanBytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cumulative bytes moved through every metered stream sharing this value.
#[derive(Debug, Default)]
pub struct ConnStats {
    read_total: AtomicU64,
    write_total: AtomicU64,
}

impl ConnStats {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_read(&self, n: u64) {
        self.read_total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_write(&self, n: u64) {
        self.write_total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn read_total(&self) -> u64 {
        self.read_total.load(Ordering::Relaxed)
    }

    pub fn write_total(&self) -> u64 {
        self.write_total.load(Ordering::Relaxed)
    }
}

/// Wraps a reader/writer and counts every byte that passes through it.
pub struct Metered<T> {
    inner: T,
    stats: Arc<ConnStats>,
}

impl<T> Metered<T> {
    pub fn new(inner: T, stats: Arc<ConnStats>) -> Self {
        Self { inner, stats }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Metered<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            self.stats.record_read((buf.filled().len() - before) as u64);
        }
        poll
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Metered<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            self.stats.record_write(n as u64);
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Exponentially smoothed rate (factor 0.5) over a cumulative counter.
#[derive(Debug)]
pub struct RateSampler {
    last_total: u64,
    last_at: Instant,
    smoothed: Option<u64>,
}

impl RateSampler {
    pub fn new(now: Instant) -> Self {
        Self {
            last_total: 0,
            last_at: now,
            smoothed: None,
        }
    }

    /// Feed the counter's current value; returns the smoothed bytes/second.
    pub fn sample(&mut self, total: u64, now: Instant) -> u64 {
        let elapsed_ms = (now.saturating_duration_since(self.last_at).as_millis() as u64).max(1);
        let instant = total.saturating_sub(self.last_total) * 1000 / elapsed_ms;

        let smoothed = match self.smoothed {
            None => instant,
            Some(prev) => (instant + prev) / 2,
        };

        self.smoothed = Some(smoothed);
        self.last_total = total;
        self.last_at = now;
        smoothed
    }

    pub fn rate(&self) -> Option<u64> {
        self.smoothed
    }
}

const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Log the smoothed receive and write rates every `interval` until `cancel`
/// fires.
pub fn spawn_rate_logger(
    stats: Arc<ConnStats>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        let mut reads = RateSampler::new(started);
        let mut writes = RateSampler::new(started);
        let mut ticker = tokio::time::interval(interval.max(MIN_SAMPLE_INTERVAL));
        // first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let (received, written) = (stats.read_total(), stats.write_total());
                    let read_rate = reads.sample(received, now);
                    let write_rate = writes.sample(written, now);
                    info!(
                        down = %format!("{}/s", HumanBytes(read_rate)),
                        disk = %format!("{}/s", HumanBytes(write_rate)),
                        received,
                        written,
                        "throughput"
                    );
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn first_sample_seeds_the_average() {
        let t0 = Instant::now();
        let mut sampler = RateSampler::new(t0);
        assert_eq!(sampler.rate(), None);
        let rate = sampler.sample(3_000, t0 + Duration::from_secs(3));
        assert_eq!(rate, 1_000);
    }

    #[test]
    fn smoothing_averages_with_previous() {
        let t0 = Instant::now();
        let mut sampler = RateSampler::new(t0);
        sampler.sample(3_000, t0 + Duration::from_secs(3));
        // next interval runs at 3000 B/s
        let rate = sampler.sample(12_000, t0 + Duration::from_secs(6));
        assert_eq!(rate, 2_000);
        assert_eq!(sampler.rate(), Some(2_000));
    }

    #[test]
    fn constant_rate_converges_and_never_overshoots() {
        let t0 = Instant::now();
        let mut sampler = RateSampler::new(t0);
        let target = 5_000u64;

        // start slow so convergence is visible
        let mut total = 300u64;
        let mut now = t0 + Duration::from_secs(3);
        let mut prev_gap = u64::MAX;
        sampler.sample(total, now);

        for _ in 0..20 {
            total += target * 3;
            now += Duration::from_secs(3);
            let rate = sampler.sample(total, now);
            assert!(rate <= target);
            let gap = target - rate;
            assert!(gap <= prev_gap);
            prev_gap = gap;
        }
        assert!(prev_gap <= 1);
    }

    #[test]
    fn zero_elapsed_does_not_divide_by_zero() {
        let t0 = Instant::now();
        let mut sampler = RateSampler::new(t0);
        assert_eq!(sampler.sample(42, t0), 42_000);
    }

    #[tokio::test]
    async fn zero_interval_logger_does_not_panic() {
        let cancel = CancellationToken::new();
        let handle = spawn_rate_logger(ConnStats::shared(), Duration::ZERO, cancel.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn metered_counts_reads_and_writes() {
        let stats = ConnStats::shared();

        let mut reader = Metered::new(&b"hello world"[..], stats.clone());
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(stats.read_total(), 11);

        let mut writer = Metered::new(Vec::new(), stats.clone());
        writer.write_all(b"abc").await.unwrap();
        assert_eq!(stats.write_total(), 3);
        assert_eq!(writer.into_inner(), b"abc");
    }
}
