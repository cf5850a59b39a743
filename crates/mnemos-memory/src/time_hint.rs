// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in [`TimeExtractor`] for common English and Chinese date expressions.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, FixedOffset, Months, NaiveDate};
use regex::Regex;

use mnemos_core::{TimeExtractor, TimeRange};

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());
static DAYS_AGO_EN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,4})\s+days?\s+ago\b").unwrap());
static DAYS_AGO_ZH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{1,4})\s*天前").unwrap());

#[derive(Debug, Clone, Copy)]
enum Span {
    /// Whole calendar day, relative to today.
    Day(i64),
    LastNight,
    ThisMorning,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
}

/// Longer phrases come before phrases they contain.
const PHRASES: &[(&str, Span)] = &[
    ("day before yesterday", Span::Day(-2)),
    ("前天", Span::Day(-2)),
    ("last night", Span::LastNight),
    ("昨天晚上", Span::LastNight),
    ("昨晚", Span::LastNight),
    ("yesterday", Span::Day(-1)),
    ("昨天", Span::Day(-1)),
    ("this morning", Span::ThisMorning),
    ("今天早上", Span::ThisMorning),
    ("今早", Span::ThisMorning),
    ("today", Span::Day(0)),
    ("今天", Span::Day(0)),
    ("this week", Span::ThisWeek),
    ("本周", Span::ThisWeek),
    ("这周", Span::ThisWeek),
    ("last week", Span::LastWeek),
    ("上周", Span::LastWeek),
    ("this month", Span::ThisMonth),
    ("这个月", Span::ThisMonth),
    ("本月", Span::ThisMonth),
    ("last month", Span::LastMonth),
    ("上个月", Span::LastMonth),
];

/// Resolves relative day, week and month expressions plus ISO dates against the
/// caller's clock. Ranges are whole local days unless the phrase names part of one.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalendarTimeExtractor;

impl TimeExtractor for CalendarTimeExtractor {
    fn extract(&self, text: &str, now: DateTime<FixedOffset>) -> Vec<TimeRange> {
        let offset = *now.offset();
        let today = now.date_naive();
        let mut text = text.to_lowercase();
        let mut found: Vec<(usize, TimeRange)> = Vec::new();

        for caps in ISO_DATE.captures_iter(&text) {
            let (Some(whole), Some(y), Some(m), Some(d)) =
                (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
            else {
                continue;
            };
            let date = match (y.as_str().parse(), m.as_str().parse(), d.as_str().parse()) {
                (Ok(y), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(y, m, d),
                _ => None,
            };
            if let Some(date) = date {
                found.push((whole.start(), day_range(offset, date)));
            }
        }

        for re in [&*DAYS_AGO_EN, &*DAYS_AGO_ZH] {
            for caps in re.captures_iter(&text) {
                let (Some(whole), Some(n)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                if let Ok(n) = n.as_str().parse::<u64>()
                    && let Some(date) = today.checked_sub_days(Days::new(n))
                {
                    found.push((whole.start(), day_range(offset, date)));
                }
            }
        }

        for (phrase, span) in PHRASES {
            while let Some(pos) = text.find(phrase) {
                if let Some(range) = resolve(*span, offset, today) {
                    found.push((pos, range));
                }
                // Blank the match so shorter phrases inside it are not found again.
                text.replace_range(pos..pos + phrase.len(), &" ".repeat(phrase.len()));
            }
        }

        found.sort_by_key(|(pos, _)| *pos);
        found.into_iter().map(|(_, range)| range).collect()
    }
}

fn resolve(span: Span, offset: FixedOffset, today: NaiveDate) -> Option<TimeRange> {
    let monday = today.checked_sub_days(Days::new(u64::from(
        today.weekday().num_days_from_monday(),
    )))?;
    let first_of_month = today.with_day(1)?;

    Some(match span {
        Span::Day(delta) => {
            let date = if delta < 0 {
                today.checked_sub_days(Days::new(delta.unsigned_abs()))?
            } else {
                today.checked_add_days(Days::new(delta.unsigned_abs()))?
            };
            day_range(offset, date)
        }
        Span::LastNight => {
            let yesterday = today.checked_sub_days(Days::new(1))?;
            TimeRange::new(
                local_ts(offset, yesterday, 18),
                local_ts(offset, today, 6) - 1,
            )
        }
        Span::ThisMorning => TimeRange::new(local_ts(offset, today, 0), local_ts(offset, today, 12) - 1),
        Span::ThisWeek => days_range(offset, monday, monday.checked_add_days(Days::new(7))?),
        Span::LastWeek => days_range(offset, monday.checked_sub_days(Days::new(7))?, monday),
        Span::ThisMonth => days_range(
            offset,
            first_of_month,
            first_of_month.checked_add_months(Months::new(1))?,
        ),
        Span::LastMonth => days_range(
            offset,
            first_of_month.checked_sub_months(Months::new(1))?,
            first_of_month,
        ),
    })
}

/// Epoch seconds of `hour:00:00` local time on `date`.
fn local_ts(offset: FixedOffset, date: NaiveDate, hour: u32) -> i64 {
    let local = date
        .and_hms_opt(hour, 0, 0)
        .unwrap_or_default()
        .and_utc()
        .timestamp();
    local - i64::from(offset.local_minus_utc())
}

fn day_range(offset: FixedOffset, date: NaiveDate) -> TimeRange {
    let next = date.succ_opt().unwrap_or(date);
    days_range(offset, date, next)
}

/// `[start, end)` in whole days, as an inclusive range of seconds.
fn days_range(offset: FixedOffset, start: NaiveDate, end: NaiveDate) -> TimeRange {
    TimeRange::new(local_ts(offset, start, 0), local_ts(offset, end, 0) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<FixedOffset> {
        // Wednesday 2024-03-13 15:30 at UTC+8.
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 13, 15, 30, 0)
            .unwrap()
    }

    fn ts(y: i32, m: u32, d: u32, h: u32) -> i64 {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .unwrap()
            .timestamp()
    }

    fn extract(text: &str) -> Vec<TimeRange> {
        CalendarTimeExtractor.extract(text, now())
    }

    #[test]
    fn no_time_no_ranges() {
        assert!(extract("what's your favourite colour?").is_empty());
    }

    #[test]
    fn yesterday_is_the_whole_local_day() {
        assert_eq!(
            extract("What did we talk about yesterday?"),
            vec![TimeRange::new(ts(2024, 3, 12, 0), ts(2024, 3, 13, 0) - 1)]
        );
        assert_eq!(extract("昨天聊了什么"), extract("yesterday"));
    }

    #[test]
    fn day_before_yesterday_is_not_also_yesterday() {
        let ranges = extract("the day before yesterday");
        assert_eq!(ranges, vec![TimeRange::new(ts(2024, 3, 11, 0), ts(2024, 3, 12, 0) - 1)]);
        assert_eq!(extract("前天"), ranges);
    }

    #[test]
    fn n_days_ago() {
        let expected = vec![TimeRange::new(ts(2024, 3, 8, 0), ts(2024, 3, 9, 0) - 1)];
        assert_eq!(extract("5 days ago"), expected);
        assert_eq!(extract("5天前"), expected);
    }

    #[test]
    fn weeks_start_on_monday() {
        assert_eq!(
            extract("this week"),
            vec![TimeRange::new(ts(2024, 3, 11, 0), ts(2024, 3, 18, 0) - 1)]
        );
        assert_eq!(
            extract("上周"),
            vec![TimeRange::new(ts(2024, 3, 4, 0), ts(2024, 3, 11, 0) - 1)]
        );
    }

    #[test]
    fn months_handle_leap_february() {
        assert_eq!(
            extract("last month"),
            vec![TimeRange::new(ts(2024, 2, 1, 0), ts(2024, 3, 1, 0) - 1)]
        );
        assert_eq!(
            extract("这个月"),
            vec![TimeRange::new(ts(2024, 3, 1, 0), ts(2024, 4, 1, 0) - 1)]
        );
    }

    #[test]
    fn parts_of_days() {
        assert_eq!(
            extract("last night"),
            vec![TimeRange::new(ts(2024, 3, 12, 18), ts(2024, 3, 13, 6) - 1)]
        );
        assert_eq!(
            extract("今天早上"),
            vec![TimeRange::new(ts(2024, 3, 13, 0), ts(2024, 3, 13, 12) - 1)]
        );
    }

    #[test]
    fn iso_dates_and_order_of_appearance() {
        let ranges = extract("between 2024-01-05 and yesterday");
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].start, ts(2024, 1, 5, 0));
        assert_eq!(ranges[1].start, ts(2024, 3, 12, 0));
        assert!(extract("2024-02-30").is_empty());
    }
}
