//! Handling of YAML scalar quirks.
//!
//! The YAML 1.1 bool set is wider than serde's: `yes`, `no`, `on`, `off`
//! arrive as strings and still have to parse as booleans. Numeric-looking
//! scalars likewise have to land in `String` fields that pass through to the
//! rendered output (time spans, keys, marks).

use serde::Deserializer;
use serde::de::{Error, Visitor};
use std::fmt::Formatter;

/// Deserialize a YAML boolean, accepting the 1.1 string spellings.
pub fn yaml_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    deserializer.deserialize_any(YamlBool)
}

/// Deserialize an optional YAML boolean.
///
/// Apply together with `#[serde(default)]`, otherwise a missing key is an
/// error rather than `None`.
pub fn yaml_bool_option<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<bool>, D::Error> {
    deserializer.deserialize_option(YamlBoolOption)
}

struct YamlBool;

impl<'de> Visitor<'de> for YamlBool {
    type Value = bool;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("YAML boolean")
    }

    fn visit_bool<E: Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
        match v.to_lowercase().as_str() {
            "true" | "yes" | "on" | "y" => Ok(true),
            "false" | "no" | "off" | "n" => Ok(false),
            _ => Err(Error::unknown_variant(
                v,
                &["true", "false", "yes", "no", "on", "off", "y", "n"],
            )),
        }
    }
}

struct YamlBoolOption;

impl<'de> Visitor<'de> for YamlBoolOption {
    type Value = Option<bool>;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("YAML boolean or null")
    }

    fn visit_none<E: Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        yaml_bool(deserializer).map(Some)
    }
}

/// Deserialize any YAML scalar into a `String`, keeping the source spelling
/// of numbers (`100`, `100ms`, `0x1`).
pub fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    deserializer.deserialize_any(ScalarString)
}

/// Optional variant of [`scalar_string`]; pair with `#[serde(default)]`.
pub fn scalar_string_option<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    deserializer.deserialize_option(ScalarStringOption)
}

struct ScalarString;

impl<'de> Visitor<'de> for ScalarString {
    type Value = String;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("YAML scalar")
    }

    fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(v.to_string())
    }

    fn visit_bool<E: Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(v.to_string())
    }
}

struct ScalarStringOption;

impl<'de> Visitor<'de> for ScalarStringOption {
    type Value = Option<String>;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("YAML scalar or null")
    }

    fn visit_none<E: Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        scalar_string(deserializer).map(Some)
    }
}

/// Deserialize a string-or-sequence-of-strings field into a `Vec<String>`.
pub fn string_or_seq<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    struct StringOrSeq;

    impl<'de> Visitor<'de> for StringOrSeq {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
            formatter.write_str("string or sequence of strings")
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::SeqAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                out.push(item);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(StringOrSeq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "yaml_bool_option")]
        flag: Option<bool>,
        #[serde(default, deserialize_with = "scalar_string_option")]
        span: Option<String>,
        #[serde(default, deserialize_with = "string_or_seq")]
        drivers: Vec<String>,
    }

    #[test]
    fn test_yaml_bool_spellings() {
        for (text, want) in [
            ("flag: yes", Some(true)),
            ("flag: \"no\"", Some(false)),
            ("flag: true", Some(true)),
            ("flag: off", Some(false)),
            ("span: 1", None),
        ] {
            let p: Probe = serde_yaml::from_str(text).unwrap();
            assert_eq!(p.flag, want, "input {text:?}");
        }
    }

    #[test]
    fn test_scalar_string_keeps_numbers() {
        let p: Probe = serde_yaml::from_str("span: 100").unwrap();
        assert_eq!(p.span.as_deref(), Some("100"));
        let p: Probe = serde_yaml::from_str("span: 100ms").unwrap();
        assert_eq!(p.span.as_deref(), Some("100ms"));
    }

    #[test]
    fn test_string_or_seq() {
        let p: Probe = serde_yaml::from_str("drivers: e1000*").unwrap();
        assert_eq!(p.drivers, vec!["e1000*"]);
        let p: Probe = serde_yaml::from_str("drivers: [ixgbe, mlx5_core]").unwrap();
        assert_eq!(p.drivers, vec!["ixgbe", "mlx5_core"]);
    }
}
