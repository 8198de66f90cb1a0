use std::str::FromStr;
use tokio::time::Duration;

/// Parses a duration string in the format "50ms", "30s", "10m", "5h", "3d".
///
/// Supported units:
/// - `ms` for milliseconds
/// - `s` for seconds
/// - `m` for minutes
/// - `h` for hours
/// - `d` for days
///
/// A bare `0` is accepted as a zero duration, so delays and timeouts can be
/// switched off without picking a unit.
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration string cannot be empty".to_string());
    }

    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let (value_str, unit) = match s.strip_suffix("ms") {
        Some(rest) => (rest, "ms"),
        None => {
            let split = s.len() - s.chars().last().map_or(0, char::len_utf8);
            (&s[..split], &s[split..])
        }
    };

    let value = match u64::from_str(value_str) {
        Ok(v) => v,
        Err(_) => {
            return Err(format!(
                "Invalid numeric value in duration: '{}'",
                value_str
            ))
        }
    };

    let seconds_per_unit: u64 = match unit {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => {
            return Err(format!(
                "Unknown duration unit: '{}'. Use 'ms', 's', 'm', 'h', or 'd'.",
                unit
            ))
        }
    };

    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Duration too large: '{}'", s))
}

/// Parses a client timeout. `0`, `none` and `unbounded` mean "wait forever".
pub fn parse_timeout_string(s: &str) -> Result<Option<Duration>, String> {
    match s.trim().to_lowercase().as_str() {
        "none" | "unbounded" => Ok(None),
        other => parse_duration_string(other).map(non_zero),
    }
}

/// Maps a zero duration to `None`.
pub fn non_zero(duration: Duration) -> Option<Duration> {
    if duration.is_zero() {
        None
    } else {
        Some(duration)
    }
}

/// Parses a boolean flag the way the env loader expects: only "true" is true.
pub fn parse_flag(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("true")
}
