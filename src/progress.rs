//! Per-part completion percentages and the sinks that render them.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Receives progress for each part. Implementations are shared by every part
/// task and must serialize concurrent updates themselves.
pub trait ProgressSink: Send + Sync {
    fn set_percent(&self, part: usize, percent: u8);
    fn finish(&self, part: usize);
}

/// Discards all updates.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn set_percent(&self, _part: usize, _percent: u8) {}
    fn finish(&self, _part: usize) {}
}

/// One 0-100 bar per part.
pub struct PartBars {
    _multi: MultiProgress,
    bars: Vec<ProgressBar>,
}

impl PartBars {
    pub fn new(parts: usize) -> Self {
        let multi = MultiProgress::new();
        multi.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));

        let style = ProgressStyle::default_bar()
            .template("{prefix:>8} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");

        let bars = (0..parts)
            .map(|i| {
                let pb = multi.add(ProgressBar::new(100));
                pb.set_style(style.clone());
                pb.set_prefix(format!("Part {}", i));
                pb
            })
            .collect();

        Self { _multi: multi, bars }
    }
}

impl ProgressSink for PartBars {
    fn set_percent(&self, part: usize, percent: u8) {
        if let Some(pb) = self.bars.get(part) {
            pb.set_position(percent as u64);
        }
    }

    fn finish(&self, part: usize) {
        if let Some(pb) = self.bars.get(part) {
            pb.finish();
        }
    }
}

/// Turns a running byte count into integer percentages, emitting each
/// distinct value once and never going backwards.
#[derive(Debug)]
pub struct PercentTracker {
    declared: u64,
    last: Option<u8>,
}

impl PercentTracker {
    pub fn new(declared: u64) -> Self {
        Self { declared, last: None }
    }

    /// Returns the new percentage if it differs from the last one reported.
    pub fn update(&mut self, written: u64) -> Option<u8> {
        let percent = if self.declared == 0 {
            100
        } else {
            (written.min(self.declared) as u128 * 100 / self.declared as u128) as u8
        };

        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every call so tests can assert on the exact sequence.
    #[derive(Default)]
    pub struct RecordingProgress {
        pub events: Mutex<Vec<(usize, Option<u8>)>>,
    }

    impl RecordingProgress {
        pub fn percents(&self, part: usize) -> Vec<u8> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| *p == part)
                .filter_map(|(_, pct)| *pct)
                .collect()
        }

        pub fn finished(&self, part: usize) -> bool {
            self.events
                .lock()
                .unwrap()
                .iter()
                .any(|(p, pct)| *p == part && pct.is_none())
        }
    }

    impl ProgressSink for RecordingProgress {
        fn set_percent(&self, part: usize, percent: u8) {
            self.events.lock().unwrap().push((part, Some(percent)));
        }

        fn finish(&self, part: usize) {
            self.events.lock().unwrap().push((part, None));
        }
    }

    #[test]
    fn reports_each_percentage_once() {
        let mut tracker = PercentTracker::new(1000);
        assert_eq!(tracker.update(0), Some(0));
        assert_eq!(tracker.update(5), None);
        assert_eq!(tracker.update(10), Some(1));
        assert_eq!(tracker.update(19), None);
        assert_eq!(tracker.update(999), Some(99));
        assert_eq!(tracker.update(1000), Some(100));
        assert_eq!(tracker.update(1000), None);
    }

    #[test]
    fn never_reaches_100_before_the_end() {
        let mut tracker = PercentTracker::new(1_000_000);
        tracker.update(999_999);
        assert_eq!(tracker.last(), Some(99));
    }

    #[test]
    fn never_decreases() {
        let mut tracker = PercentTracker::new(100);
        assert_eq!(tracker.update(50), Some(50));
        assert_eq!(tracker.update(40), None);
        assert_eq!(tracker.last(), Some(50));
    }
}
