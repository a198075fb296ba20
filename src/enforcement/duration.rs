use crate::error::{EngineError, EngineResult};
use std::time::Duration;

/// Parse a timeout such as `1w 2d 3h 4m 5s 6ms`. Components may appear in any order,
/// with or without spaces between them.
pub fn parse_timeout(value: &str) -> EngineResult<Duration> {
    let invalid = || EngineError::invalid_request(format!("Invalid timeout value: {value}"));

    let mut total_ms: u64 = 0;
    let mut chars = value.trim().chars().peekable();
    let mut parsed_any = false;

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut digits = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            digits.push(d);
            chars.next();
        }
        let mut unit = String::new();
        while let Some(&u) = chars.peek().filter(|u| u.is_ascii_alphabetic()) {
            unit.push(u);
            chars.next();
        }
        if digits.is_empty() || unit.is_empty() {
            return Err(invalid());
        }

        let amount: u64 = digits.parse().map_err(|_| invalid())?;
        let unit_ms: u64 = match unit.as_str() {
            "w" => 7 * 24 * 3_600_000,
            "d" => 24 * 3_600_000,
            "h" => 3_600_000,
            "m" => 60_000,
            "s" => 1_000,
            "ms" => 1,
            _ => return Err(invalid()),
        };
        total_ms = amount
            .checked_mul(unit_ms)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(invalid)?;
        parsed_any = true;
    }

    if !parsed_any {
        return Err(invalid());
    }
    Ok(Duration::from_millis(total_ms))
}

/// Human rendering of a limit: days when at least a day, else hours when at least an
/// hour, else seconds
pub fn format_limit_seconds(seconds: u64) -> String {
    const HOUR: u64 = 3_600;
    const DAY: u64 = 24 * HOUR;

    let (amount, unit) = if seconds >= DAY {
        (seconds / DAY, "day")
    } else if seconds >= HOUR {
        (seconds / HOUR, "hour")
    } else {
        (seconds, "second")
    };
    if amount == 1 {
        format!("{amount} {unit}")
    } else {
        format!("{amount} {unit}s")
    }
}
