// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Primitive SQL values such as number and string, used both for literals
/// of a statement and for the parameters bound to its markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(f64),
    Text(String),
}

impl Value {
    pub fn text(v: &str) -> Self {
        Value::Text(v.to_string())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Value::Text(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Decimal(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Text(v) => v.trim().parse().ok(),
            Value::Bool(v) => Some(*v as i64),
            Value::Null => None,
            Value::Decimal(_) => None,
        }
    }

    /// Literal form as it would be written inside SQL text.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Text(v) => format!("'{}'", escape_single_quote_string(v)),
            other => other.to_string(),
        }
    }

    /// Orders values of comparable kinds, numbers compare across int/decimal.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Decimal(b)) => (*a as f64).partial_cmp(b),
            (Value::Decimal(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Decimal(a), Value::Decimal(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

pub struct EscapeSingleQuoteString<'a>(&'a str);

impl<'a> fmt::Display for EscapeSingleQuoteString<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

pub fn escape_single_quote_string(s: &str) -> EscapeSingleQuoteString<'_> {
    EscapeSingleQuoteString(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_literal() {
        assert_eq!(Value::Int(5).to_sql_literal(), "5");
        assert_eq!(Value::text("x").to_sql_literal(), "'x'");
        assert_eq!(Value::text("it's").to_sql_literal(), "'it''s'");
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::Int(1).compare(&Value::Decimal(1.5)), Some(Ordering::Less));
        assert_eq!(Value::text("b").compare(&Value::text("a")), Some(Ordering::Greater));
        assert_eq!(Value::Int(1).compare(&Value::text("1")), None);
    }

    #[test]
    fn test_untagged_parameters_from_yaml() {
        let values: Vec<Value> = serde_yaml::from_str("[1, 'x', null, true, 1.5]").unwrap();
        assert_eq!(
            values,
            vec![Value::Int(1), Value::text("x"), Value::Null, Value::Bool(true), Value::Decimal(1.5)]
        );
    }
}
