//! File-name grammar for the filesystem view.
//!
//! A file name selects a series and, optionally, a [`View`] over it:
//!
//! ```text
//!   cpu          latest value of "cpu"
//!   cpu#5m       average over the last five minutes
//!   cpu%1h       total over the last hour
//!   cpu@30s      value in effect thirty seconds ago
//!   cpu^10s      latest value, if no older than ten seconds
//! ```
//!
//! Series names start with a letter, digit or underscore and may continue
//! with `.` and `-` as well. Durations are one or more `<integer><unit>`
//! groups (`1h30m`, `250ms`) with units `ns`, `us`, `ms`, `s`, `m` and `h`,
//! or a bare `0`.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::query::{QueryKind, View};

static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_][A-Za-z0-9_.\-]*)(?:([#%@^])([A-Za-z0-9_]+))?$")
        .expect("path pattern is valid")
});

static DURATION_PART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+)(ns|us|ms|s|m|h)").expect("duration pattern is valid")
});

/// Maps a mode character to the query it selects.
fn mode_kind(mode: &str) -> Option<QueryKind> {
    match mode {
        "#" => Some(QueryKind::Average),
        "%" => Some(QueryKind::Total),
        "@" => Some(QueryKind::ValueAt),
        "^" => Some(QueryKind::SafeLatest),
        _ => None,
    }
}

/// Splits a file name into its series name and view.
///
/// Returns `None` when the name does not match the grammar or the duration
/// is malformed. A plain name yields no view, meaning the latest value.
pub fn parse_path(path: &str) -> Option<(String, Option<View>)> {
    let caps = PATH_RE.captures(path)?;
    let name = caps.get(1)?.as_str().to_string();

    let Some(mode) = caps.get(2) else {
        return Some((name, None));
    };
    let kind = mode_kind(mode.as_str())?;
    let duration = parse_duration(caps.get(3)?.as_str())?;

    Some((name, Some(View::new(kind, duration))))
}

/// Like [`parse_path`], but only accepts plain series names.
pub fn parse_latest_path(path: &str) -> Option<String> {
    match parse_path(path)? {
        (name, None) => Some(name),
        (_, Some(_)) => None,
    }
}

/// Parses a duration such as `90s`, `1h30m` or `0`.
///
/// Returns `None` on unknown units, trailing garbage or overflow.
pub fn parse_duration(input: &str) -> Option<Duration> {
    if input == "0" {
        return Some(Duration::ZERO);
    }
    if input.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut consumed = 0;
    for caps in DURATION_PART_RE.captures_iter(input) {
        let whole = caps.get(0)?;
        // Groups must be contiguous and cover the whole input.
        if whole.start() != consumed {
            return None;
        }
        consumed = whole.end();

        let amount: u64 = caps[1].parse().ok()?;
        let part = match &caps[2] {
            "ns" => Duration::from_nanos(amount),
            "us" => Duration::from_micros(amount),
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount.checked_mul(60)?),
            "h" => Duration::from_secs(amount.checked_mul(3600)?),
            _ => return None,
        };
        total = total.checked_add(part)?;
    }

    (consumed == input.len()).then_some(total)
}
