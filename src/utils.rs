use std::fmt;

use serde::{de, Deserializer};

/// Comparison key for emails: surrounding whitespace dropped, lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Accepts an epoch-millisecond cursor given either as a number or as a
/// numeric string (query strings only carry the latter).
pub fn i64_from_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct Millis;

    impl<'de> de::Visitor<'de> for Millis {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an integer millisecond timestamp")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|e| E::custom(e.to_string()))
        }

        fn visit_str<E: de::Error>(self, s: &str) -> Result<i64, E> {
            s.trim().parse::<i64>().map_err(|e| E::custom(e.to_string()))
        }
    }

    deserializer.deserialize_any(Millis)
}
