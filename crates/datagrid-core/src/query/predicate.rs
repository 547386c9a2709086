use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{GridError, Result};

/// Comparison applied by a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    /// Case-insensitive substring match
    Contains,
    /// Case-insensitive prefix match
    StartsWith,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::Contains => "contains",
            Operator::StartsWith => "starts_with",
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Operator::Contains | Operator::StartsWith)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = GridError;

    fn from_str(op: &str) -> Result<Self> {
        let norm = op.trim().to_ascii_lowercase();
        match norm.as_str() {
            "=" | "==" | "eq" | "equals" => Ok(Operator::Equals),
            "!=" | "<>" | "ne" | "not_equals" => Ok(Operator::NotEquals),
            ">" | "gt" | "greater_than" => Ok(Operator::GreaterThan),
            ">=" | "gte" | "greater_than_or_equal" => Ok(Operator::GreaterThanOrEqual),
            "<" | "lt" | "less_than" => Ok(Operator::LessThan),
            "<=" | "lte" | "less_than_or_equal" => Ok(Operator::LessThanOrEqual),
            "like" | "contains" => Ok(Operator::Contains),
            "starts_with" | "prefix" => Ok(Operator::StartsWith),
            _ => Err(GridError::InvalidConfiguration(format!(
                "unsupported operator `{op}`"
            ))),
        }
    }
}

/// Sort direction of one order clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

impl FromStr for SortDirection {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "1" => Ok(SortDirection::Asc),
            "desc" | "-1" => Ok(SortDirection::Desc),
            other => Err(GridError::InvalidRequest(format!(
                "invalid sort direction `{other}`"
            ))),
        }
    }
}

/// `field <op> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    field: String,
    operator: Operator,
    value: Value,
}

impl Predicate {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Regex source for pattern operators; the value is matched literally.
    pub fn pattern_source(&self) -> Option<String> {
        let text = match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match self.operator {
            Operator::Contains => Some(regex::escape(&text)),
            Operator::StartsWith => Some(format!("^{}", regex::escape(&text))),
            _ => None,
        }
    }

    /// Compiled case-insensitive pattern for pattern operators.
    pub fn pattern(&self) -> Result<Option<Regex>> {
        self.pattern_source()
            .map(|src| {
                RegexBuilder::new(&src)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| GridError::Execution(format!("invalid pattern `{src}`: {e}")))
            })
            .transpose()
    }

    /// Render as a MongoDB-style filter document.
    pub fn to_document(&self) -> Value {
        let field = self.field.as_str();
        let cond = match self.operator {
            Operator::Equals => self.value.clone(),
            Operator::NotEquals => json!({ "$ne": self.value }),
            Operator::GreaterThan => json!({ "$gt": self.value }),
            Operator::GreaterThanOrEqual => json!({ "$gte": self.value }),
            Operator::LessThan => json!({ "$lt": self.value }),
            Operator::LessThanOrEqual => json!({ "$lte": self.value }),
            Operator::Contains | Operator::StartsWith => json!({
                "$regex": self.pattern_source().unwrap_or_default(),
                "$options": "i",
            }),
        };
        let mut doc = serde_json::Map::new();
        doc.insert(field.to_string(), cond);
        Value::Object(doc)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}
