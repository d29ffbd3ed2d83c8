//! Date normalization, ordered fallback resolution, and the clock seam.
//!
//! Every timestamp that enters the reconciliation policy passes through
//! [`normalize_date`]: a missing or unparsable string becomes `None`, never
//! the epoch and never "now".

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Naive formats accepted in addition to RFC 3339. Interpreted as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an optional date string into a point in time.
///
/// Accepts RFC 3339, the naive ISO-8601 shapes in [`NAIVE_DATETIME_FORMATS`]
/// and a bare `YYYY-MM-DD` (midnight UTC). Surrounding whitespace and quotes
/// are ignored.
pub fn normalize_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = value?.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Return the first present candidate, in order.
///
/// Fallback chains are written as an explicit list so the order can be read
/// (and tested) at a glance.
pub fn first_present<T, I>(candidates: I) -> Option<T>
where
    I: IntoIterator<Item = Option<T>>,
{
    candidates.into_iter().flatten().next()
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of "now" for the policy's fallback on undated incoming notes.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rfc3339_with_offset() {
        let dt = normalize_date(Some("2023-05-25T12:00:00+02:00")).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 5, 25, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_naive_forms_are_utc() {
        let expected = Utc.with_ymd_and_hms(2023, 5, 25, 8, 30, 0).unwrap();
        assert_eq!(normalize_date(Some("2023-05-25T08:30:00")), Some(expected));
        assert_eq!(normalize_date(Some("2023-05-25 08:30:00")), Some(expected));
        assert_eq!(normalize_date(Some("2023-05-25 08:30")), Some(expected));
    }

    #[test]
    fn test_bare_date_is_midnight() {
        assert_eq!(
            normalize_date(Some("2023-05-25")),
            Some(Utc.with_ymd_and_hms(2023, 5, 25, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_quotes_and_whitespace_ignored() {
        assert_eq!(
            normalize_date(Some("  \"2023-05-25\" ")),
            Some(Utc.with_ymd_and_hms(2023, 5, 25, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_invalid_input_is_absent() {
        assert_eq!(normalize_date(None), None);
        assert_eq!(normalize_date(Some("")), None);
        assert_eq!(normalize_date(Some("   ")), None);
        assert_eq!(normalize_date(Some("yesterday")), None);
        assert_eq!(normalize_date(Some("2023-13-45")), None);
        assert_eq!(normalize_date(Some("0")), None);
    }

    #[test]
    fn test_first_present_order() {
        assert_eq!(first_present([None, Some(2), Some(3)]), Some(2));
        assert_eq!(first_present([Some(1), Some(2)]), Some(1));
        assert_eq!(first_present::<i32, _>([None, None]), None);
        assert_eq!(first_present::<i32, _>([]), None);
    }

    #[test]
    fn test_fixed_clock() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(FixedClock(t).now(), t);
    }
}
