//! Display helpers for saved completion records.
//!
//! Record files are named `<name>_<YYYYMMDD>_<HHMMSS>.json`. These helpers
//! recover a human-readable label from that shape without ever failing: a
//! filename or timestamp that does not parse is shown as-is.

use chrono::NaiveDateTime;

/// Storage format of the timestamp embedded in record filenames.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Name segment used for records that were never renamed.
pub const DEFAULT_RECORD_PREFIX: &str = "completion";

const DISPLAY_FORMAT: &str = "%B %d, %Y at %H:%M:%S";
const UNNAMED: &str = "Unnamed";

/// Parses a `YYYYMMDD_HHMMSS` timestamp.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok()
}

/// Renders a `YYYYMMDD_HHMMSS` timestamp as `January 15, 2024 at 09:30:00`.
///
/// Input that does not parse is returned unchanged.
pub fn format_timestamp(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(dt) => dt.format(DISPLAY_FORMAT).to_string(),
        None => raw.to_string(),
    }
}

/// Splits a trailing `<digits>_<digits>` segment off a filename stem.
///
/// Returns `(prefix, segment)` where `prefix` excludes the joining
/// underscore. The segment is only shape-checked here; use
/// [`parse_timestamp`] to check that it is a real date.
pub fn split_timestamp(stem: &str) -> Option<(&str, &str)> {
    let (rest, time) = stem.rsplit_once('_')?;
    let (prefix, date) = match rest.rsplit_once('_') {
        Some((prefix, date)) => (prefix, date),
        None => ("", rest),
    };
    if !is_digits(date) || !is_digits(time) {
        return None;
    }
    let segment = &stem[stem.len() - date.len() - 1 - time.len()..];
    Some((prefix, segment))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Builds the label shown for a record file in the history view.
///
/// `completion_20240115_093000.json` becomes
/// `Unnamed (January 15, 2024 at 09:30:00)`, and a renamed
/// `acme-vs-globex_20240115_093000.json` becomes
/// `acme-vs-globex (January 15, 2024 at 09:30:00)`.
pub fn friendly_name(filename: &str) -> String {
    let stem = filename.strip_suffix(".json").unwrap_or(filename);

    let (prefix, timestamp) = match split_timestamp(stem) {
        Some((prefix, segment)) => (prefix, Some(segment)),
        None => (stem, None),
    };

    let base = if prefix.is_empty() || prefix == DEFAULT_RECORD_PREFIX {
        UNNAMED
    } else {
        prefix
    };

    match timestamp.and_then(parse_timestamp) {
        Some(dt) => format!("{} ({})", base, dt.format(DISPLAY_FORMAT)),
        None => base.to_string(),
    }
}
