// Time arguments
//
// Absolute: "now" or RFC 3339 ("2021-03-15T12:00:00Z")
// Relative: "### UUU [### UUU ...]" where ### is a signed number and UUU one of
//  us, ms, s, m, h, d, w (and their long forms), eg "-1.5 h 30 min"
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

#[derive(Error, Debug, PartialEq)]
pub enum DateError {
    #[error("unexpected ending of '{0}'")]
    Ending(String),
    #[error("bad number '{0}'")]
    Number(String),
    #[error("unknown unit '{0}'")]
    Unit(String),
    #[error("bad time '{0}'")]
    Absolute(String),
    #[error("time out of range '{0}'")]
    Range(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum When {
    At(OffsetDateTime),
    Offset(Duration),
}

// Microseconds per unit
fn unit(tag: &str) -> Option<f64> {
    let scale = match tag {
        "us" => 1.0,
        "ms" => 1e3,
        "s" | "sec" | "secs" | "second" | "seconds" => 1e6,
        "m" | "min" | "mins" | "minute" | "minutes" => 60e6,
        "h" | "hrs" | "hour" | "hours" => 3600e6,
        "d" | "day" | "days" => 86400e6,
        "w" | "week" | "weeks" => 7.0 * 86400e6,
        _ => return None,
    };
    Some(scale)
}

pub fn parse(input: &str, now: OffsetDateTime) -> Result<When, DateError> {
    let input = input.trim();
    if input.is_empty() || input.eq_ignore_ascii_case("now") {
        return Ok(When::At(now));
    }

    let first = input.chars().next().unwrap_or(' ');
    if !(first.is_ascii_digit() || first == '-' || first == '+' || first == '.') {
        return Err(DateError::Absolute(input.to_string()));
    }

    if let Ok(at) = OffsetDateTime::parse(input, &Rfc3339) {
        return Ok(When::At(at));
    }

    let words: Vec<&str> = input.split_whitespace().collect();
    if words.len() % 2 == 1 {
        // A lone date that isn't RFC 3339 lands here too
        if words.len() == 1 && input.contains(['-', ':', 'T']) && !input.starts_with('-') {
            return Err(DateError::Absolute(input.to_string()));
        }
        return Err(DateError::Ending(input.to_string()));
    }

    let mut micros = 0.0;
    for pair in words.chunks(2) {
        let off: f64 = pair[0]
            .parse()
            .map_err(|_| DateError::Number(pair[0].to_string()))?;
        let tag = pair[1].to_ascii_lowercase();
        let scale = unit(&tag).ok_or(DateError::Unit(tag))?;
        micros += off * scale;
    }

    let micros = micros.round();
    // i64::MAX as f64 rounds up, so the upper bound is exclusive
    if !micros.is_finite() || micros < i64::MIN as f64 || micros >= i64::MAX as f64 {
        return Err(DateError::Range(input.to_string()));
    }

    Ok(When::Offset(Duration::microseconds(micros as i64)))
}

fn shift(at: OffsetDateTime, by: Duration) -> Result<OffsetDateTime, DateError> {
    at.checked_add(by)
        .ok_or_else(|| DateError::Range(format!("{} {}", at, by)))
}

/// Resolve a start and end pair, either of which may be relative.
///
/// Both relative: both from now. Only start relative: from the end. Only the
/// end relative: from the start when positive, from now when negative. The
/// result is always ordered.
pub fn interval(
    start: &str,
    end: Option<&str>,
    now: OffsetDateTime,
) -> Result<(OffsetDateTime, OffsetDateTime), DateError> {
    let start = parse(start, now)?;
    let end = match end {
        None => When::At(now),
        Some(x) => parse(x, now)?,
    };

    let (start, end) = match (start, end) {
        (When::At(s), When::At(e)) => (s, e),
        (When::Offset(s), When::Offset(e)) => (shift(now, s)?, shift(now, e)?),
        (When::Offset(s), When::At(e)) => (shift(e, s)?, e),
        (When::At(s), When::Offset(e)) if e >= Duration::ZERO => (s, shift(s, e)?),
        (When::At(s), When::Offset(e)) => (s, shift(now, e)?),
    };

    if start > end {
        Ok((end, start))
    } else {
        Ok((start, end))
    }
}
