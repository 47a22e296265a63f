use chrono::{DateTime, Duration, Months, NaiveDateTime, TimeZone};
use interim::{parse_date_string, Dialect};
use regex::Regex;
use tracing::{debug, warn};

use crate::core::error::PipelineError;

/// 解析完成的绝对时间区间，秒级精度，保证 start <= end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ResolvedDateRange {
    pub fn start_sql(&self) -> String {
        self.start.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    pub fn end_sql(&self) -> String {
        self.end.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// 把自然语言的起止短语解析为绝对时间区间。
/// anchor 由调用方求值一次后传入，同一次解析内的所有相对短语共享同一个"现在"。
pub fn resolve_range<Tz>(
    start_phrase: &str,
    end_phrase: Option<&str>,
    anchor: DateTime<Tz>,
) -> Result<ResolvedDateRange, PipelineError>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    let start_phrase = start_phrase.trim();
    if start_phrase.is_empty() {
        return Err(PipelineError::UnresolvableDate {
            phrase: start_phrase.to_string(),
        });
    }

    // 快速路径：最常见的 "last N hours/minutes/days" 相对查询。
    // 命中时右端点固定为 anchor，end 短语在此分支被忽略。
    let fast = Regex::new(r"(?i)^last\s+(\d+)\s+(hour|minute|day)s?$").unwrap();
    if let Some(cap) = fast.captures(start_phrase) {
        let n: i64 = cap[1].parse().map_err(|_| PipelineError::UnresolvableDate {
            phrase: start_phrase.to_string(),
        })?;
        let span = match cap[2].to_lowercase().as_str() {
            "hour" => Duration::try_hours(n),
            "minute" => Duration::try_minutes(n),
            _ => Duration::try_days(n),
        }
        .ok_or_else(|| PipelineError::UnresolvableDate {
            phrase: start_phrase.to_string(),
        })?;
        debug!("相对日期快速路径命中: {}", start_phrase);
        return Ok(ResolvedDateRange {
            start: (anchor - span).naive_local(),
            end: anchor.naive_local(),
        });
    }

    let start = parse_phrase(start_phrase, anchor)?;
    let end = match end_phrase.map(str::trim).filter(|p| !p.is_empty()) {
        None => anchor,
        Some(p) => parse_phrase(p, anchor)?,
    };

    let (mut start, mut end) = (start.naive_local(), end.naive_local());
    if start > end {
        warn!("日期区间倒置，交换起止端点: {} > {}", start, end);
        std::mem::swap(&mut start, &mut end);
    }
    Ok(ResolvedDateRange { start, end })
}

/// 单个短语的模糊解析。"now" 直接落在 anchor 上；
/// 对未写年份的歧义日期倾向解析到最近的过去 (订单查询都是回看)。
fn parse_phrase<Tz>(phrase: &str, anchor: DateTime<Tz>) -> Result<DateTime<Tz>, PipelineError>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    if phrase.eq_ignore_ascii_case("now") {
        return Ok(anchor);
    }

    let parsed =
        parse_date_string(phrase, anchor, Dialect::Us).map_err(|e| {
            debug!("模糊日期解析失败: '{}' ({})", phrase, e);
            PipelineError::UnresolvableDate {
                phrase: phrase.to_string(),
            }
        })?;

    if parsed > anchor && !has_explicit_year(phrase) && !is_forward_phrase(phrase) {
        if let Some(shifted) = parsed.clone().checked_sub_months(Months::new(12)) {
            debug!("歧义日期回拨一年: '{}' -> {}", phrase, shifted.naive_local());
            return Ok(shifted);
        }
    }
    Ok(parsed)
}

fn has_explicit_year(phrase: &str) -> bool {
    Regex::new(r"\d{4}").unwrap().is_match(phrase)
}

fn is_forward_phrase(phrase: &str) -> bool {
    let lower = phrase.to_lowercase();
    lower.contains("next") || lower.contains("tomorrow") || lower.starts_with("in ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn fast_path_last_hours() {
        let range = resolve_range("last 5 hours", Some("now"), anchor()).unwrap();
        assert_eq!(range.end, anchor().naive_utc());
        assert_eq!(range.end - range.start, Duration::hours(5));
    }

    #[test]
    fn fast_path_is_case_insensitive() {
        let range = resolve_range("LAST 2 Days", None, anchor()).unwrap();
        assert_eq!(range.end - range.start, Duration::days(2));
    }

    #[test]
    fn fast_path_ignores_end_phrase() {
        let range = resolve_range("last 30 minutes", Some("March 1"), anchor()).unwrap();
        assert_eq!(range.end, anchor().naive_utc());
        assert_eq!(range.end - range.start, Duration::minutes(30));
    }

    #[test]
    fn fuzzy_resolves_yesterday() {
        let range = resolve_range("yesterday", None, anchor()).unwrap();
        assert_eq!(
            range.start.date(),
            NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
        );
        assert_eq!(range.end, anchor().naive_utc());
    }

    #[test]
    fn month_year_range() {
        let range = resolve_range("January 2024", Some("February 2024"), anchor()).unwrap();
        assert!(range.start.date() <= NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert!(range.end.date() >= NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn ambiguous_date_prefers_past() {
        let feb = Utc.with_ymd_and_hms(2024, 2, 15, 8, 0, 0).unwrap();
        let range = resolve_range("March 1", None, feb).unwrap();
        assert_eq!(
            range.start.date(),
            NaiveDate::from_ymd_opt(2023, 3, 1).unwrap()
        );
    }

    #[test]
    fn explicit_year_is_not_shifted() {
        let feb = Utc.with_ymd_and_hms(2024, 2, 15, 8, 0, 0).unwrap();
        let range = resolve_range("1 March 2024", Some("now"), feb).unwrap();
        // 写明年份的未来日期保持原样，区间整体会被交换回正序
        assert_eq!(
            range.end.date(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
    }

    #[test]
    fn resolution_is_idempotent_for_fixed_anchor() {
        let a = resolve_range("yesterday", Some("now"), anchor()).unwrap();
        let b = resolve_range("yesterday", Some("now"), anchor()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn junk_phrase_is_rejected() {
        let err = resolve_range("banana", None, anchor()).unwrap_err();
        match err {
            PipelineError::UnresolvableDate { phrase } => assert_eq!(phrase, "banana"),
            other => panic!("意外的错误分类: {other:?}"),
        }
    }

    #[test]
    fn empty_start_is_rejected() {
        assert!(matches!(
            resolve_range("  ", None, anchor()),
            Err(PipelineError::UnresolvableDate { .. })
        ));
    }

    #[test]
    fn inverted_bounds_are_swapped() {
        let range = resolve_range("2024-03-05", Some("2024-01-02"), anchor()).unwrap();
        assert!(range.start <= range.end);
        assert_eq!(
            range.start.date(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }
}
