//! Wire format for record timestamps.
//!
//! Records carry `yyyy-MM-ddTHH:mm:ss` in UTC with no offset suffix.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Format string used on the wire.
pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Render a timestamp in the wire format.
pub fn format(ts: &DateTime<Utc>) -> String {
    ts.format(WIRE_FORMAT).to_string()
}

/// Parse a wire timestamp. RFC 3339 input is accepted as well.
pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match NaiveDateTime::parse_from_str(s, WIRE_FORMAT) {
        Ok(naive) => Ok(naive.and_utc()),
        Err(wire_err) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| wire_err),
    }
}

pub(crate) fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(ts))
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}
