// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed points in time for tests.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

/// UTC+8, the offset most fixtures use.
pub const TEST_OFFSET_MINUTES: i32 = 8 * 60;

/// # Panics
///
/// When `minutes` is a day or more away from UTC.
pub fn offset(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes * 60).expect("offset within one day of UTC")
}

/// Local wall-clock time at [`TEST_OFFSET_MINUTES`].
///
/// # Panics
///
/// On an invalid calendar date or time.
pub fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<FixedOffset> {
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, min, sec))
        .expect("valid test date");
    offset(TEST_OFFSET_MINUTES)
        .from_local_datetime(&naive)
        .single()
        .expect("fixed offsets are unambiguous")
}

/// Epoch seconds of [`at`].
pub fn epoch(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> i64 {
    at(year, month, day, hour, min, sec).timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_respects_offset() {
        // 2024-03-10 08:00 at UTC+8 is midnight UTC.
        assert_eq!(epoch(2024, 3, 10, 8, 0, 0), 1_710_028_800);
    }
}
