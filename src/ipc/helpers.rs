use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

/// Unix-time UTC days are a fixed width; leap seconds never appear in
/// epoch-ms values.
pub const MS_PER_DAY: i64 = 86_400_000;

pub fn utc_day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

pub fn parse_day_key(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// UTC calendar-day interval `[start, end)` in epoch-ms.
pub fn day_bounds_ms(day: NaiveDate) -> (i64, i64) {
    let start = day.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    (start, start + MS_PER_DAY)
}

pub fn rfc3339_utc(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

/// Canonical form for staff codes, applied both when storing and when
/// resolving a check-in probe.
pub fn normalize_staff_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
