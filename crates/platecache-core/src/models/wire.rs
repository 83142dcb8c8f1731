//! Lenient decoders for backend fields that arrive in more than one shape.
//!
//! The restaurant backend has shipped booleans as strings and numbers as
//! numeric strings depending on whether a record was seeded or updated.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Bool(bool),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberRepr {
    Int(i64),
    Float(f64),
    Text(String),
}

impl NumberRepr {
    fn into_i64<E: de::Error>(self) -> Result<i64, E> {
        match self {
            NumberRepr::Int(n) => Ok(n),
            NumberRepr::Float(f) if f.fract() == 0.0 => Ok(f as i64),
            NumberRepr::Float(f) => Err(E::custom(format!("expected an integer, got {}", f))),
            NumberRepr::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected a numeric string, got {:?}", s))),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Millis(i64),
    Text(String),
}

/// Favorite flags are stored as the strings `"true"` / `"false"`.
pub fn flag_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let flag = match FlagRepr::deserialize(deserializer)? {
        FlagRepr::Bool(b) => b,
        FlagRepr::Text(s) => s.trim().eq_ignore_ascii_case("true"),
    };
    Ok(flag.to_string())
}

pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    NumberRepr::deserialize(deserializer)?.into_i64()
}

pub fn lenient_u8<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let n = NumberRepr::deserialize(deserializer)?.into_i64::<D::Error>()?;
    u8::try_from(n).map_err(|_| de::Error::custom(format!("value {} out of range", n)))
}

pub fn lenient_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberRepr::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(repr) => {
            let n = repr.into_i64::<D::Error>()?;
            u32::try_from(n)
                .map(Some)
                .map_err(|_| de::Error::custom(format!("value {} out of range", n)))
        }
    }
}

/// Accepts epoch milliseconds or an RFC 3339 string.
pub fn timestamp_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<TimestampRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(TimestampRepr::Millis(ms)) => Ok(DateTime::from_timestamp_millis(ms)),
        Some(TimestampRepr::Text(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(de::Error::custom),
    }
}
