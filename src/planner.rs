//! Range partition arithmetic.

use crate::cli::RemainderPolicy;
use crate::error::{DownloadError, Result};
use crate::state::PartRange;

/// Split `total_size` bytes into contiguous inclusive ranges, one per worker.
///
/// With [`RemainderPolicy::LastPart`] the union is exactly
/// `[0, total_size - 1]` and the worker count is clamped to `total_size` so
/// no range is empty. With [`RemainderPolicy::Truncate`] every range has the
/// same length and up to `worker_count - 1` trailing bytes are not covered.
pub fn plan(total_size: u64, worker_count: usize, policy: RemainderPolicy) -> Result<Vec<PartRange>> {
    if worker_count == 0 {
        return Err(DownloadError::Config("worker count must be positive".into()));
    }
    if total_size == 0 {
        return Err(DownloadError::Config("resource size must be positive".into()));
    }

    let count = match policy {
        RemainderPolicy::LastPart => (worker_count as u64).min(total_size),
        RemainderPolicy::Truncate => worker_count as u64,
    };
    let part_size = total_size / count;
    if part_size == 0 {
        return Err(DownloadError::Config(format!(
            "{} bytes cannot be split across {} workers",
            total_size, worker_count
        )));
    }

    let ranges = (0..count)
        .map(|i| {
            let start = i * part_size;
            let end = if i == count - 1 && policy == RemainderPolicy::LastPart {
                total_size - 1
            } else {
                start + part_size - 1
            };
            PartRange {
                index: i as usize,
                start,
                end,
            }
        })
        .collect();

    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_contiguous(ranges: &[PartRange]) {
        assert_eq!(ranges[0].start, 0);
        for (i, pair) in ranges.windows(2).enumerate() {
            assert_eq!(pair[0].index, i);
            assert!(pair[0].start <= pair[0].end);
            assert_eq!(pair[1].start, pair[0].end + 1, "gap or overlap after part {}", i);
        }
    }

    #[test]
    fn covers_whole_resource() {
        for total in [1u64, 2, 7, 100, 999, 1_000_000, 1_000_003] {
            for workers in 1..=17 {
                let ranges = plan(total, workers, RemainderPolicy::LastPart).unwrap();
                assert_contiguous(&ranges);
                assert_eq!(ranges.last().unwrap().end, total - 1);
                assert_eq!(ranges.iter().map(|r| r.len()).sum::<u64>(), total);
            }
        }
    }

    #[test]
    fn single_worker_takes_everything() {
        let ranges = plan(12345, 1, RemainderPolicy::LastPart).unwrap();
        assert_eq!(ranges, vec![PartRange { index: 0, start: 0, end: 12344 }]);

        let legacy = plan(12345, 1, RemainderPolicy::Truncate).unwrap();
        assert_eq!(legacy, ranges);
    }

    #[test]
    fn remainder_goes_to_last_part() {
        let ranges = plan(10, 3, RemainderPolicy::LastPart).unwrap();
        let lens: Vec<u64> = ranges.iter().map(|r| r.len()).collect();
        assert_eq!(lens, vec![3, 3, 4]);
        assert_eq!(ranges[2].end, 9);
    }

    #[test]
    fn legacy_policy_drops_remainder() {
        let ranges = plan(10, 3, RemainderPolicy::Truncate).unwrap();
        assert_contiguous(&ranges);
        let lens: Vec<u64> = ranges.iter().map(|r| r.len()).collect();
        assert_eq!(lens, vec![3, 3, 3]);
        // byte 9 is never fetched
        assert_eq!(ranges[2].end, 8);
    }

    #[test]
    fn even_split_is_identical_under_both_policies() {
        let fixed = plan(1_000_000, 4, RemainderPolicy::LastPart).unwrap();
        let legacy = plan(1_000_000, 4, RemainderPolicy::Truncate).unwrap();
        assert_eq!(fixed, legacy);
        assert!(fixed.iter().all(|r| r.len() == 250_000));
    }

    #[test]
    fn more_workers_than_bytes() {
        let ranges = plan(3, 8, RemainderPolicy::LastPart).unwrap();
        assert_eq!(ranges.len(), 3);
        assert!(ranges.iter().all(|r| r.len() == 1));

        let err = plan(3, 8, RemainderPolicy::Truncate).unwrap_err();
        assert!(matches!(err, DownloadError::Config(_)));
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(matches!(
            plan(100, 0, RemainderPolicy::LastPart),
            Err(DownloadError::Config(_))
        ));
        assert!(matches!(
            plan(0, 4, RemainderPolicy::LastPart),
            Err(DownloadError::Config(_))
        ));
    }

    #[test]
    fn range_header_is_inclusive() {
        let r = PartRange { index: 1, start: 250_000, end: 499_999 };
        assert_eq!(r.header_value(), "bytes=250000-499999");
        assert_eq!(r.len(), 250_000);
    }
}
