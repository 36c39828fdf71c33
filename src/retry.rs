//! Status-code patterns that decide whether a refused dial is retried.
//!
//! A pattern is exactly three characters, each either a digit or `x`, where
//! `x` matches any digit in that position: `"500"` matches only 500, `"5xx"`
//! matches every 5xx status.

use crate::error::RetryPatternError;

/// Wildcard that matches any digit in its position.
const WILDCARD: u8 = b'x';

/// Returns whether `code` matches any of `patterns`.
///
/// A malformed pattern aborts the match with an error, even if an earlier
/// pattern would have matched.
pub fn is_retry_code_match<S: AsRef<str>>(
    code: u16,
    patterns: &[S],
) -> Result<bool, RetryPatternError> {
    let digits = code.to_string();
    let digits = digits.as_bytes();
    if digits.len() != 3 {
        return Err(RetryPatternError::StatusCode(code));
    }

    let mut matched = false;
    for pattern in patterns {
        let pattern = pattern.as_ref();
        validate(pattern)?;
        matched |= pattern
            .bytes()
            .zip(digits)
            .all(|(p, d)| p == WILDCARD || p == *d);
    }
    Ok(matched)
}

/// Check that every pattern is well formed.
pub fn validate_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<(), RetryPatternError> {
    patterns.iter().try_for_each(|p| validate(p.as_ref()))
}

fn validate(pattern: &str) -> Result<(), RetryPatternError> {
    if pattern.len() != 3 {
        return Err(RetryPatternError::Length(pattern.to_owned()));
    }
    if !pattern.bytes().all(|b| b.is_ascii_digit() || b == WILDCARD) {
        return Err(RetryPatternError::Character(pattern.to_owned()));
    }
    Ok(())
}
