use chrono::{DateTime, NaiveTime, Utc};

use crate::error::{Error, Result};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Accepts strict 24-hour `HH:MM` (two digits each, 00-23 and 00-59).
pub fn parse_hhmm(raw: &str) -> Result<NaiveTime> {
    let invalid = || Error::Validation("Invalid scheduled time format. Use HH:MM.".to_string());
    let bytes = raw.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return Err(invalid());
    }
    if !bytes
        .iter()
        .enumerate()
        .all(|(i, b)| i == 2 || b.is_ascii_digit())
    {
        return Err(invalid());
    }
    NaiveTime::parse_from_str(raw, "%H:%M").map_err(|_| invalid())
}
