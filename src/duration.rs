//! Human duration strings ("2h", "30m", "1h30m") to milliseconds.

use crate::error::{PermissionError, Result};

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

/// Parse a duration string into milliseconds.
///
/// Accepts one or more `<number><unit>` segments with units `s`, `m`, `h`,
/// `d`, e.g. "30m", "2h", "1h30m", "7d". Whitespace between segments is
/// tolerated. Zero and empty inputs are rejected.
pub fn parse_duration(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid(input, "empty duration"));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    let mut saw_segment = false;

    for ch in trimmed.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        if ch.is_whitespace() {
            if !digits.is_empty() {
                return Err(invalid(input, "number without a unit"));
            }
            continue;
        }

        let unit_ms = match ch.to_ascii_lowercase() {
            's' => MS_PER_SECOND,
            'm' => MS_PER_MINUTE,
            'h' => MS_PER_HOUR,
            'd' => MS_PER_DAY,
            other => return Err(invalid(input, &format!("unknown unit '{}'", other))),
        };

        if digits.is_empty() {
            return Err(invalid(input, "unit without a number"));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| invalid(input, "number out of range"))?;
        digits.clear();

        total = value
            .checked_mul(unit_ms)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| invalid(input, "duration overflows"))?;
        saw_segment = true;
    }

    if !digits.is_empty() {
        return Err(invalid(input, "number without a unit"));
    }
    if !saw_segment {
        return Err(invalid(input, "no duration segments"));
    }
    if total == 0 {
        return Err(invalid(input, "duration must be greater than zero"));
    }

    Ok(total)
}

/// Render milliseconds back into a compact human string, e.g. "1h 30m".
/// Used for denial replies and audit messages.
pub fn format_duration(ms: u64) -> String {
    if ms < MS_PER_SECOND {
        return format!("{}ms", ms);
    }

    let mut remaining = ms;
    let mut parts = Vec::new();
    for (unit_ms, suffix) in [
        (MS_PER_DAY, "d"),
        (MS_PER_HOUR, "h"),
        (MS_PER_MINUTE, "m"),
        (MS_PER_SECOND, "s"),
    ] {
        if remaining >= unit_ms {
            parts.push(format!("{}{}", remaining / unit_ms, suffix));
            remaining %= unit_ms;
        }
    }
    parts.join(" ")
}

fn invalid(input: &str, message: &str) -> PermissionError {
    PermissionError::InvalidDuration {
        input: input.to_string(),
        message: message.to_string(),
    }
}
