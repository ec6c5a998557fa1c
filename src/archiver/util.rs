use chrono::{DateTime, SecondsFormat, Utc};

/// Sheet timestamps sort lexically in chronological order, so the layout is
/// fixed-width, most significant field first, always UTC.
pub const SHEET_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Format an instant for the sheet, dropping sub-second precision.
pub fn format_sheet_time(at: DateTime<Utc>) -> String {
    at.format(SHEET_TIME_FORMAT).to_string()
}

/// Parse an RFC 3339 timestamp from the helpdesk API and format it for the
/// sheet. Returns `None` when the input is not a valid timestamp.
pub fn sheet_time_from_rfc3339(raw: &str) -> Option<String> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim()).ok()?;
    Some(format_sheet_time(parsed.with_timezone(&Utc)))
}

pub fn now_sheet_time() -> String {
    format_sheet_time(Utc::now())
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
