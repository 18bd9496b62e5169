//! Scalar cell values as they travel between payloads, semantic records and
//! sheet rows.
//!
//! Sheets hold loosely typed scalars. Two coercions matter to the rest of
//! the crate and both follow spreadsheet-script semantics:
//! - string form (`Display`): integral numbers print without a fraction,
//!   booleans as `true`/`false`, empty cells as `""`;
//! - numeric form (`as_number`): blank text is `0`, text is parsed after
//!   trimming, booleans are `1`/`0`, anything unparsable is `None`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    /// The value written into cells nothing was projected onto.
    pub fn empty() -> Self {
        CellValue::Text(String::new())
    }

    /// True for empty or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.trim().is_empty())
    }

    /// Numeric coercion. Never yields NaN or an infinity.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            CellValue::Number(n) => *n,
            CellValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            CellValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Some(0.0);
                }
                // Rust accepts "inf"/"nan" spellings that sheets never produce
                if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
                    return None;
                }
                trimmed.parse::<f64>().ok()?
            }
        };
        n.is_finite().then_some(n)
    }

    /// Trimmed string form, the representation composite keys compare on.
    pub fn key_string(&self) -> String {
        self.to_string().trim().to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Bool(b) => write!(f, "{b}"),
            // -0 prints as "0"
            CellValue::Number(n) if *n == 0.0 => f.write_str("0"),
            CellValue::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<Value> for CellValue {
    fn from(value: Value) -> Self {
        CellValue::from(&value)
    }
}

impl From<&Value> for CellValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::empty(),
            Value::Bool(b) => CellValue::Bool(*b),
            Value::Number(n) => n
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or_else(|| CellValue::Text(n.to_string())),
            Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl From<CellValue> for Value {
    fn from(cell: CellValue) -> Self {
        match cell {
            CellValue::Text(s) => Value::String(s),
            CellValue::Bool(b) => Value::Bool(b),
            CellValue::Number(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integral_numbers_print_without_fraction() {
        assert_eq!(CellValue::Number(1.0).to_string(), "1");
        assert_eq!(CellValue::Number(1.5).to_string(), "1.5");
        assert_eq!(CellValue::Number(-0.0).to_string(), "0");
        assert_eq!(CellValue::Number(150000.0).to_string(), "150000");
    }

    #[test]
    fn test_numeric_coercion_is_lenient_but_never_nan() {
        assert_eq!(CellValue::from(" 12 ").as_number(), Some(12.0));
        assert_eq!(CellValue::empty().as_number(), Some(0.0));
        assert_eq!(CellValue::Bool(true).as_number(), Some(1.0));
        assert_eq!(CellValue::from("1e3").as_number(), Some(1000.0));
        assert_eq!(CellValue::from("abc").as_number(), None);
        assert_eq!(CellValue::from("NaN").as_number(), None);
        assert_eq!(CellValue::from("inf").as_number(), None);
        assert_eq!(CellValue::from("1,000").as_number(), None);
    }

    #[test]
    fn test_key_string_trims() {
        assert_eq!(CellValue::from(" 2024-01-05 ").key_string(), "2024-01-05");
        assert_eq!(CellValue::Number(2.0).key_string(), "2");
    }

    #[test]
    fn test_json_conversion() {
        let cells: Vec<CellValue> =
            serde_json::from_value(json!(["Fecha", 1, true, null])).unwrap();
        assert_eq!(
            cells,
            vec![
                CellValue::from("Fecha"),
                CellValue::Number(1.0),
                CellValue::Bool(true),
                CellValue::empty(),
            ]
        );
        assert_eq!(serde_json::to_value(&cells[1]).unwrap(), json!(1.0));
    }
}
