//! Duration parsing for configuration files.
//!
//! Durations are written in humantime form: `30s`, `2m`, `1h 30m`, `11days 13h`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Parse a humantime duration string.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s.trim())
        .map_err(|e| format!("invalid duration '{}': {} (expected e.g. 30s, 2m, 1h 30m)", s, e))
}

/// Deserialize a duration from a string.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Serialize a duration to a humantime string.
pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = humantime::format_duration(*duration).to_string();
    s.serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_humantime_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h 30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_default_executor_ttl() {
        assert_eq!(
            parse_duration("11days 13h 46m 40s").unwrap(),
            Duration::from_millis(1_000_000_000)
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        #[derive(Debug, Deserialize, Serialize, PartialEq)]
        struct TestStruct {
            #[serde(deserialize_with = "deserialize", serialize_with = "serialize")]
            period: Duration,
        }

        let parsed: TestStruct = toml::from_str("period = \"10m\"\n").unwrap();
        assert_eq!(parsed.period, Duration::from_secs(600));

        let serialized = toml::to_string(&parsed).unwrap();
        let reparsed: TestStruct = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, reparsed);
    }
}
