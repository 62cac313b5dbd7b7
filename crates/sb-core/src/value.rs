use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stored-variable namespace shared by the host and the flow engine.
pub type Variables = BTreeMap<String, SbValue>;

pub const ERROR_VAR: &str = "_error";
pub const RESULT_VAR: &str = "_result";
pub const INDEX_VAR: &str = "_i";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SbValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<SbValue>),
    Map(BTreeMap<String, SbValue>),
}

impl SbValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(value) => *value,
            Self::Number(value) => *value != 0.0 && !value.is_nan(),
            Self::String(value) => !value.is_empty(),
            Self::Array(values) => !values.is_empty(),
            Self::Map(_) => true,
        }
    }
}

impl fmt::Display for SbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{}", value),
            Self::Number(value) => {
                if value.is_finite() && value.fract().abs() < f64::EPSILON {
                    write!(f, "{}", *value as i64)
                } else {
                    write!(f, "{}", value)
                }
            }
            Self::String(value) => write!(f, "{}", value),
            Self::Array(values) => {
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", value)?;
                }
                Ok(())
            }
            Self::Map(values) => {
                write!(f, "{{")?;
                for (index, (key, value)) in values.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for SbValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for SbValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for SbValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for SbValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn truthiness_follows_script_conventions() {
        assert!(!SbValue::Null.is_truthy());
        assert!(!SbValue::Bool(false).is_truthy());
        assert!(!SbValue::Number(0.0).is_truthy());
        assert!(!SbValue::Number(f64::NAN).is_truthy());
        assert!(!SbValue::String(String::new()).is_truthy());
        assert!(!SbValue::Array(Vec::new()).is_truthy());
        assert!(SbValue::Number(-1.0).is_truthy());
        assert!(SbValue::from("x").is_truthy());
        assert!(SbValue::Map(BTreeMap::new()).is_truthy());
    }

    #[test]
    fn display_prints_integral_numbers_without_fraction() {
        assert_eq!(SbValue::Number(3.0).to_string(), "3");
        assert_eq!(SbValue::Number(2.5).to_string(), "2.5");
        assert_eq!(SbValue::Null.to_string(), "null");
        assert_eq!(
            SbValue::Array(vec![SbValue::Number(1.0), SbValue::from("a")]).to_string(),
            "1,a"
        );
        assert_eq!(
            SbValue::Map(BTreeMap::from([("k".to_string(), SbValue::Bool(true))])).to_string(),
            "{k: true}"
        );
    }

    #[test]
    fn untagged_serde_maps_json_shapes() {
        let parsed: SbValue =
            serde_json::from_str(r#"{"a":[1,"x",null,true]}"#).expect("value should parse");
        assert_eq!(
            parsed,
            SbValue::Map(BTreeMap::from([(
                "a".to_string(),
                SbValue::Array(vec![
                    SbValue::Number(1.0),
                    SbValue::from("x"),
                    SbValue::Null,
                    SbValue::Bool(true),
                ])
            )]))
        );
        assert_eq!(parsed.type_name(), "map");
        assert_eq!(SbValue::Number(1.0).as_number(), Some(1.0));
        assert_eq!(SbValue::from("s").as_string(), Some("s"));
    }
}
