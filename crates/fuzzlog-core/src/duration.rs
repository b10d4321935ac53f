use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::text::cached_regex;

/// First non-empty `NhNmNs` group in `line` (`4h0m0s`, `59m2s`, `7s`).
#[must_use]
pub fn capture_fuzzing_duration(line: &str) -> Option<String> {
    static DURATION: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached_regex(&DURATION, r"\b(?:\d+h)?(?:\d+m)?(?:\d+s)?\b")?;
    re.find_iter(line)
        .map(|m| m.as_str())
        .find(|found| !found.is_empty())
        .map(str::to_string)
}

/// Render seconds as `{h}h{m}m{s}s`, omitting zero hours and, when hours
/// are zero, zero minutes.
#[must_use]
pub fn format_time_difference(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Parse a bracketed `[YYYY-MM-DD HH:MM:SS.ff]` timestamp anywhere in the
/// line.
#[must_use]
pub fn parse_timestamp(line: &str) -> Option<NaiveDateTime> {
    static TIMESTAMP: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached_regex(
        &TIMESTAMP,
        r"\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?)\]",
    )?;
    let raw = re.captures(line)?.get(1)?.as_str();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn captures_first_duration_group() {
        assert_eq!(
            capture_fuzzing_duration(" 4h0m0s, calls: 1024 (800/sec), seq/s: 9"),
            Some("4h0m0s".to_string())
        );
        assert_eq!(
            capture_fuzzing_duration("⇾  12s, calls: 10"),
            Some("12s".to_string())
        );
        assert_eq!(capture_fuzzing_duration("no duration here"), None);
    }

    #[test]
    fn formats_time_differences() {
        assert_eq!(format_time_difference(0), "0s");
        assert_eq!(format_time_difference(59), "59s");
        assert_eq!(format_time_difference(61), "1m1s");
        assert_eq!(format_time_difference(3600), "1h0m0s");
        assert_eq!(format_time_difference(14_462), "4h1m2s");
    }

    #[test]
    fn parses_bracketed_timestamps() {
        let first = parse_timestamp("[2024-05-01 10:00:00.12] [Worker 0] New coverage").unwrap();
        let second = parse_timestamp("[2024-05-01 10:01:05.50] [status] tests: 0/3").unwrap();
        assert_eq!((second - first).num_seconds(), 65);
        assert!(parse_timestamp("echidna_x: passing").is_none());
    }
}
