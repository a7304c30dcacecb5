//! Bitrate strings as the encoder understands them.
//!
//! Accepts a decimal coefficient with an optional SI prefix, an optional `i`
//! for binary multiples and an optional `B` (bytes) or `b` (bits) suffix:
//! `2K` is 2000, `2Ki` is 2048, `2MB` is 16000000, `2MiB` is 16777216.

use crate::error::{Error, Result};

fn prefix_exponent(prefix: char) -> Option<i32> {
    let exp = match prefix {
        'y' => -24,
        'z' => -21,
        'a' => -18,
        'f' => -15,
        'p' => -12,
        'n' => -9,
        'u' => -6,
        'm' => -3,
        'c' => -2,
        'd' => -1,
        'h' => 2,
        'k' | 'K' => 3,
        'M' => 6,
        'G' => 9,
        'T' => 12,
        'P' => 15,
        'E' => 18,
        'Z' => 21,
        'Y' => 24,
        _ => return None,
    };
    Some(exp)
}

/// Parse a bitrate string into bits per second.
pub fn parse_bitrate(value: &str) -> Result<u64> {
    let invalid = || Error::Validation(format!("invalid bitrate '{value}'"));

    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    if digits_end == 0 {
        return Err(invalid());
    }
    let coef: f64 = value[..digits_end].parse().map_err(|_| invalid())?;
    let mut rest = value[digits_end..].chars().peekable();

    let mut result = coef;
    if let Some(exp) = rest.peek().copied().and_then(prefix_exponent) {
        rest.next();
        if rest.peek() == Some(&'i') {
            rest.next();
            result *= 2f64.powf(f64::from(exp) / 0.3);
        } else {
            result *= 10f64.powi(exp);
        }
    }

    match rest.next() {
        None | Some('b') => {}
        Some('B') => result *= 8.0,
        Some(_) => return Err(invalid()),
    }
    if rest.next().is_some() {
        return Err(invalid());
    }

    Ok(result as u64)
}

/// Render bits per second as an encoder `k` value, e.g. `30000k`.
pub fn kbps_arg(bits: u64) -> String {
    format!("{}k", bits / 1000)
}

/// Round bits per second down to a non-zero multiple of 64 kb/s.
///
/// AC-3 only accepts audio bitrates on this grid.
pub fn trunc64_kbps(bits: u64) -> u32 {
    let blocks = (bits / 64_000).max(1);
    (blocks * 64) as u32
}
