//! Parsing of numeric request parameters. Every failure is a client error.

use std::time::Duration;

use crate::error::ProbeError;

pub fn parse_count(name: &str, raw: Option<&str>, default: u64) -> Result<u64, ProbeError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| ProbeError::invalid(name, format!("{raw:?} is not an integer")))?;
    u64::try_from(value).map_err(|_| ProbeError::invalid(name, "must not be negative"))
}

pub fn parse_seconds(
    name: &str,
    raw: Option<&str>,
    default: Duration,
) -> Result<Duration, ProbeError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let seconds = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| ProbeError::invalid(name, format!("{raw:?} is not a number")))?;
    if seconds < 0.0 {
        return Err(ProbeError::invalid(name, "must not be negative"));
    }
    if seconds == 0.0 {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| ProbeError::invalid(name, format!("{raw:?} is out of range")))
}

pub fn parse_status(raw: Option<&str>, default: u16) -> Result<u16, ProbeError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let code = raw
        .trim()
        .parse::<u16>()
        .map_err(|_| ProbeError::invalid("code", format!("{raw:?} is not a status code")))?;
    if !(100..=599).contains(&code) {
        return Err(ProbeError::invalid("code", format!("{code} is out of range")));
    }
    Ok(code)
}

/// Seeds accept the full signed range; negative values keep their
/// two's-complement bit pattern.
pub fn parse_seed(raw: Option<&str>) -> Result<Option<u64>, ProbeError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if let Ok(seed) = trimmed.parse::<u64>() {
        return Ok(Some(seed));
    }
    trimmed
        .parse::<i64>()
        .map(|seed| Some(seed as u64))
        .map_err(|_| ProbeError::invalid("seed", format!("{raw:?} is not an integer")))
}
