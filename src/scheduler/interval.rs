use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("interval is empty")]
    Empty,

    #[error("invalid interval {0:?}")]
    Invalid(String),

    #[error("missing unit in interval {0:?} (use ns, us, ms, s, m or h)")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in interval {input:?}")]
    UnknownUnit { unit: String, input: String },

    #[error("interval {0:?} must be greater than zero")]
    NotPositive(String),

    #[error("interval {0:?} is too large")]
    Overflow(String),
}

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Parse a time-between-requests string such as `30s`, `1m30s`, `1.5h` or `250ms`.
///
/// The string is a sequence of decimal numbers, each with an optional
/// fraction and a required unit (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`).
/// A leading `+` is accepted. Zero and negative intervals are rejected.
pub fn parse_interval(input: &str) -> Result<Duration, IntervalError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(IntervalError::Empty);
    }

    let (negative, mut rest) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let invalid = || IntervalError::Invalid(trimmed.to_string());

    if rest.is_empty() {
        return Err(invalid());
    }
    // A bare zero needs no unit
    if rest == "0" {
        return Err(IntervalError::NotPositive(trimmed.to_string()));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, after_int) = rest.split_at(int_len);

        let (frac_digits, after_number) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
                after_dot.split_at(frac_len)
            }
            None => ("", after_int),
        };
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(invalid());
        }

        let unit_len = after_number
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(after_number.len());
        let (unit, remaining) = after_number.split_at(unit_len);
        if unit.is_empty() {
            return Err(IntervalError::MissingUnit(trimmed.to_string()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| IntervalError::UnknownUnit {
            unit: unit.to_string(),
            input: trimmed.to_string(),
        })?;

        let overflow = || IntervalError::Overflow(trimmed.to_string());
        let whole: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| overflow())?
        };
        let mut component = whole.checked_mul(scale).ok_or_else(overflow)?;

        // Digits beyond nanosecond precision of the largest unit cannot matter
        let frac_digits = &frac_digits[..frac_digits.len().min(18)];
        if !frac_digits.is_empty() {
            let frac: u128 = frac_digits.parse().map_err(|_| invalid())?;
            let denom = 10u128.pow(frac_digits.len() as u32);
            component = component
                .checked_add(frac * scale / denom)
                .ok_or_else(overflow)?;
        }

        total = total.checked_add(component).ok_or_else(overflow)?;
        if total > u128::from(u64::MAX) {
            return Err(overflow());
        }
        rest = remaining;
    }

    if negative || total == 0 {
        return Err(IntervalError::NotPositive(trimmed.to_string()));
    }

    let nanos = u64::try_from(total).map_err(|_| IntervalError::Overflow(trimmed.to_string()))?;
    Ok(Duration::from_nanos(nanos))
}
