use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Runtime value of a record field.
///
/// Field values arrive as JSON (REST, Bulk v1 JSON batches) or as raw text
/// (CSV, XML). Nested JSON that has no scalar meaning is carried verbatim in
/// `Json` so unknown shapes pass through untouched.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Json(serde_json::Value),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Float(_) => "double",
            Self::Text(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::Json(_) => "json",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null or the empty string, the two shapes a "missing" required field takes.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// String coercion used by `=`, `!=`, `IN` and external-id matching.
    ///
    /// Floats keep their fractional marker (`5.0`) so a float never
    /// string-equals an integer literal.
    pub fn coerce_string(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => format!("{:?}", f),
            Self::Text(s) => s.clone(),
            Self::Boolean(b) => b.to_string(),
            Self::Json(v) => v.to_string(),
        }
    }

    /// Numeric coercion for `<`, `<=`, `>`, `>=`. Text is parsed; anything
    /// else that is not a number yields `None`.
    pub fn coerce_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Cell text for CSV output: null is the empty cell.
    pub fn to_csv_cell(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{:.1}", f)
                } else {
                    f.to_string()
                }
            }
            other => other.coerce_string(),
        }
    }

    /// Natural ordering of two non-null values.
    ///
    /// Same-typed values compare directly, integers and floats compare
    /// numerically; values of unrelated types are ranked by type so that a
    /// sort over heterogeneous data stays total.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let a = a.coerce_f64().unwrap_or(f64::NAN);
                let b = b.coerce_f64().unwrap_or(f64::NAN);
                match (a.is_nan(), b.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                }
            }
            (Self::Json(a), Self::Json(b)) => a.to_string().cmp(&b.to_string()),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Integer(_) | Self::Float(_) => 2,
            Self::Text(_) => 3,
            Self::Json(_) => 4,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Json(v) => v.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                if a.is_nan() && b.is_nan() {
                    return true;
                }
                (a - b).abs() < f64::EPSILON
            }
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(i), Self::Float(f)) | (Self::Float(f), Self::Integer(i)) => {
                (*i as f64 - f).abs() < f64::EPSILON
            }
            (Self::Json(a), Self::Json(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{}", fl),
            Self::Text(s) => write!(f, "{}", s),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Json(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Json(v) => v.serialize(serializer),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            serde_json::Value::String(s) => Self::Text(s),
            other => Self::Json(other),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_coercion() {
        assert_eq!(Value::Integer(42).coerce_string(), "42");
        assert_eq!(Value::Float(5.0).coerce_string(), "5.0");
        assert_eq!(Value::Boolean(true).coerce_string(), "true");
        assert_eq!(Value::Null.coerce_string(), "null");
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(Value::Text(" 12.5 ".into()).coerce_f64(), Some(12.5));
        assert_eq!(Value::Text("abc".into()).coerce_f64(), None);
        assert_eq!(Value::Boolean(true).coerce_f64(), None);
    }

    #[test]
    fn test_natural_ordering() {
        assert_eq!(Value::Integer(1).compare(&Value::Float(1.5)), Ordering::Less);
        assert_eq!(
            Value::Text("b".into()).compare(&Value::Text("a".into())),
            Ordering::Greater
        );
        assert_eq!(Value::Integer(9).compare(&Value::Text("1".into())), Ordering::Less);
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Value::from(serde_json::json!(3)), Value::Integer(3));
        assert_eq!(Value::from(serde_json::json!("x")), Value::Text("x".into()));
        assert!(matches!(Value::from(serde_json::json!({"a": 1})), Value::Json(_)));
    }
}
