// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Typed scalar values stored at tree leaves

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Serialize, Serializer};
use serde_json::{Number, Value as JsonValue};
use url::Url;
use uuid::Uuid;

/// Leaf value of a document tree
///
/// Each kind is preserved distinctly while a document is being built; kinds
/// without a native JSON representation (dates, GUIDs, URIs) serialize as
/// strings.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScalarValue {
    /// JSON null, also used as the placeholder for not-yet-written slots
    #[default]
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value (64-bit signed)
    Integer(i64),
    /// Decimal value with arbitrary precision
    Decimal(Decimal),
    /// JSON number outside the integer and decimal ranges, kept verbatim
    Number(Number),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time with offset
    DateTime(DateTime<FixedOffset>),
    /// GUID / UUID
    Guid(Uuid),
    /// Absolute URI
    Uri(Url),
    /// String value
    String(String),
}

impl ScalarValue {
    /// Name of the value kind, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Null => "null",
            ScalarValue::Boolean(_) => "boolean",
            ScalarValue::Integer(_) => "integer",
            ScalarValue::Decimal(_) => "decimal",
            ScalarValue::Number(_) => "number",
            ScalarValue::Date(_) => "date",
            ScalarValue::DateTime(_) => "dateTime",
            ScalarValue::Guid(_) => "guid",
            ScalarValue::Uri(_) => "uri",
            ScalarValue::String(_) => "string",
        }
    }

    /// Whether this is null
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// String content, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean content, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer content, if this is an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric content widened to a decimal
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            ScalarValue::Integer(i) => Some(Decimal::from(*i)),
            ScalarValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Convert a JSON value; `None` for arrays and objects
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => Some(ScalarValue::Null),
            JsonValue::Bool(b) => Some(ScalarValue::Boolean(*b)),
            JsonValue::Number(n) => Some(Self::from_number(n)),
            JsonValue::String(s) => Some(ScalarValue::String(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    fn from_number(number: &Number) -> Self {
        if let Some(i) = number.as_i64() {
            return ScalarValue::Integer(i);
        }
        let text = number.to_string();
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map(ScalarValue::Decimal)
            .unwrap_or_else(|_| ScalarValue::Number(number.clone()))
    }

    /// Convert to a JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            ScalarValue::Null => JsonValue::Null,
            ScalarValue::Boolean(b) => JsonValue::Bool(*b),
            ScalarValue::Integer(i) => JsonValue::from(*i),
            ScalarValue::Decimal(d) => exact_f64(d)
                .and_then(Number::from_f64)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(d.to_string())),
            ScalarValue::Number(n) => JsonValue::Number(n.clone()),
            ScalarValue::Date(_)
            | ScalarValue::DateTime(_)
            | ScalarValue::Guid(_)
            | ScalarValue::Uri(_) => JsonValue::String(self.to_string()),
            ScalarValue::String(s) => JsonValue::String(s.clone()),
        }
    }
}

/// The decimal as a double, only when the double reads back as the same value
fn exact_f64(value: &Decimal) -> Option<f64> {
    let double = value.to_f64().filter(|f| f.is_finite())?;
    let back = Decimal::from_str(&double.to_string()).ok()?;
    (back == *value).then_some(double)
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("null"),
            ScalarValue::Boolean(b) => write!(f, "{b}"),
            ScalarValue::Integer(i) => write!(f, "{i}"),
            ScalarValue::Decimal(d) => write!(f, "{d}"),
            ScalarValue::Number(n) => write!(f, "{n}"),
            ScalarValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            ScalarValue::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
            ScalarValue::Guid(g) => write!(f, "{}", g.hyphenated()),
            ScalarValue::Uri(u) => f.write_str(u.as_str()),
            ScalarValue::String(s) => f.write_str(s),
        }
    }
}

impl Serialize for ScalarValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ScalarValue::Null => serializer.serialize_unit(),
            ScalarValue::Boolean(b) => serializer.serialize_bool(*b),
            ScalarValue::Integer(i) => serializer.serialize_i64(*i),
            ScalarValue::Decimal(d) => match exact_f64(d) {
                Some(f) => serializer.serialize_f64(f),
                None => serializer.collect_str(d),
            },
            ScalarValue::Number(n) => n.serialize(serializer),
            ScalarValue::String(s) => serializer.serialize_str(s),
            other => serializer.collect_str(other),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Integer(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Integer(i64::from(value))
    }
}

impl From<Decimal> for ScalarValue {
    fn from(value: Decimal) -> Self {
        ScalarValue::Decimal(value)
    }
}

impl From<NaiveDate> for ScalarValue {
    fn from(value: NaiveDate) -> Self {
        ScalarValue::Date(value)
    }
}

impl From<DateTime<FixedOffset>> for ScalarValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        ScalarValue::DateTime(value)
    }
}

impl From<Uuid> for ScalarValue {
    fn from(value: Uuid) -> Self {
        ScalarValue::Guid(value)
    }
}

impl From<Url> for ScalarValue {
    fn from(value: Url) -> Self {
        ScalarValue::Uri(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::String(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::String(value)
    }
}
