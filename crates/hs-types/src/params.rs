use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A concrete parameter value produced by a proposer.
///
/// Serialized untagged, so an assignment reads as plain JSON
/// (`{"C": 0.5, "solver": "lbfgs"}`). `Int` is listed first so integral
/// JSON numbers come back as integers; a numeric `Choice` therefore
/// deserializes as `Int` or `Float`. Equality compares the JSON value, so
/// such a value still equals the choice it was written from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Choice(serde_json::Value),
}

impl ParameterValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Choice(v) => v.as_i64(),
            Self::Float(_) => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Choice(v) => v.as_f64(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Choice(v) => v.as_str(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Choice(v) => v.as_bool(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Value::from(*v),
            Self::Choice(v) => v.clone(),
        }
    }
}

impl PartialEq for ParameterValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Choice(a), Self::Choice(b)) => a == b,
            _ => self.to_json() == other.to_json(),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Choice(serde_json::Value::String(s)) => write!(f, "{s}"),
            Self::Choice(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Choice(serde_json::Value::String(v.to_string()))
    }
}

/// One complete set of hyperparameter values, keyed by parameter name.
pub type Assignment = BTreeMap<String, ParameterValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_serializes_as_plain_json() {
        let mut params = Assignment::new();
        params.insert("C".into(), ParameterValue::Float(0.5));
        params.insert("max_iter".into(), ParameterValue::Int(100));
        params.insert("solver".into(), "lbfgs".into());

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"C": 0.5, "max_iter": 100, "solver": "lbfgs"})
        );

        let back: Assignment = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn numeric_choices_survive_a_json_round_trip() {
        let mut params = Assignment::new();
        params.insert("batch".into(), ParameterValue::Choice(serde_json::json!(16)));
        params.insert("ratio".into(), ParameterValue::Choice(serde_json::json!(0.25)));

        let text = serde_json::to_string(&params).unwrap();
        assert_eq!(text, r#"{"batch":16,"ratio":0.25}"#);

        let back: Assignment = serde_json::from_str(&text).unwrap();
        assert!(matches!(back["batch"], ParameterValue::Int(16)));
        assert_eq!(back, params);

        assert_ne!(ParameterValue::Int(2), ParameterValue::Float(2.0));
        assert_ne!(ParameterValue::Choice(serde_json::json!("16")), ParameterValue::Int(16));
    }

    #[test]
    fn numeric_views() {
        assert_eq!(ParameterValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(ParameterValue::Float(2.5).as_i64(), None);
        assert_eq!(
            ParameterValue::Choice(serde_json::json!(64)).as_i64(),
            Some(64)
        );
        assert_eq!(ParameterValue::from("liblinear").as_str(), Some("liblinear"));
        assert_eq!(ParameterValue::from("liblinear").to_string(), "liblinear");
    }
}
