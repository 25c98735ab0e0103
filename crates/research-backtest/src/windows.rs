//! Calendar-aligned walk-forward window slicing.

use chrono::NaiveDate;

/// Slice `count` non-overlapping windows of `span_years` calendar years,
/// chronological, with the last window ending on Dec 31 of `anchor_year`.
///
/// With the defaults (12 windows of 3 years anchored at 2024) the first
/// window covers 1989-1991 and the last 2022-2024.
pub fn slice_windows(anchor_year: i32, count: u32, span_years: u32) -> Vec<(NaiveDate, NaiveDate)> {
    let mut out = Vec::with_capacity(count as usize);
    for k in 1..=count {
        let end_year = anchor_year - (span_years * (count - k)) as i32;
        let start_year = end_year - span_years as i32 + 1;
        let start = NaiveDate::from_ymd_opt(start_year, 1, 1);
        let end = NaiveDate::from_ymd_opt(end_year, 12, 31);
        if let (Some(start), Some(end)) = (start, end) {
            out.push((start, end));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_slicing() {
        let windows = slice_windows(2024, 12, 3);
        assert_eq!(windows.len(), 12);
        assert_eq!(
            windows[0],
            (
                NaiveDate::from_ymd_opt(1989, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(1991, 12, 31).unwrap()
            )
        );
        assert_eq!(
            windows[11],
            (
                NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
            )
        );
    }

    #[test]
    fn test_windows_are_non_overlapping_and_contiguous() {
        let windows = slice_windows(2024, 12, 3);
        for pair in windows.windows(2) {
            let (_, prev_end) = pair[0];
            let (next_start, _) = pair[1];
            assert_eq!(next_start, prev_end + chrono::Duration::days(1));
        }
    }

    #[test]
    fn test_single_window() {
        let windows = slice_windows(2020, 1, 5);
        assert_eq!(
            windows,
            vec![(
                NaiveDate::from_ymd_opt(2016, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2020, 12, 31).unwrap()
            )]
        );
    }
}
