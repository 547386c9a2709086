//! Column descriptors as read by the query layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::Operator;
use crate::resolver::strip_root_alias;

/// How a raw search term becomes a comparison value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Coercion {
    #[default]
    Text,
    Integer,
    Float,
    Boolean,
}

impl Coercion {
    pub fn coerce(&self, term: &str) -> Result<Value, String> {
        let term = term.trim();
        match self {
            Coercion::Text => Ok(Value::String(term.to_string())),
            Coercion::Integer => term
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| format!("expected an integer: {e}")),
            Coercion::Float => term
                .parse::<f64>()
                .map_err(|e| format!("expected a number: {e}"))
                .and_then(|f| {
                    serde_json::Number::from_f64(f)
                        .map(Value::Number)
                        .ok_or_else(|| "expected a finite number".to_string())
                }),
            Coercion::Boolean => match term.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Value::Bool(true)),
                "0" | "false" | "no" | "off" => Ok(Value::Bool(false)),
                _ => Err("expected a boolean".to_string()),
            },
        }
    }
}

/// Per-column filter: the operator and how to coerce the submitted term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub operator: Operator,
    #[serde(default)]
    pub coercion: Coercion,
}

impl ColumnFilter {
    pub fn new(operator: Operator, coercion: Coercion) -> Self {
        Self { operator, coercion }
    }

    /// Free-text filter: case-insensitive substring match.
    pub fn text() -> Self {
        Self::new(Operator::Contains, Coercion::Text)
    }

    /// Exact match on a choice value.
    pub fn choice() -> Self {
        Self::new(Operator::Equals, Coercion::Text)
    }
}

fn default_true() -> bool {
    true
}

/// One table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Dotted field path, e.g. `author.address.city`
    #[serde(default)]
    pub field: Option<String>,
    /// Field to sort on when it differs from `field`
    #[serde(default)]
    pub order_field: Option<String>,
    #[serde(default = "default_true")]
    pub orderable: bool,
    #[serde(default = "default_true")]
    pub global_searchable: bool,
    #[serde(default)]
    pub filter: Option<ColumnFilter>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field: None,
            order_field: None,
            orderable: true,
            global_searchable: true,
            filter: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_order_field(mut self, field: impl Into<String>) -> Self {
        self.order_field = Some(field.into());
        self
    }

    pub fn with_filter(mut self, filter: ColumnFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn orderable(mut self, orderable: bool) -> Self {
        self.orderable = orderable;
        self
    }

    pub fn global_searchable(mut self, searchable: bool) -> Self {
        self.global_searchable = searchable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicit field path; empty paths count as absent.
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref().filter(|f| !f.is_empty())
    }

    /// Sort field, falling back to the field path.
    pub fn order_field(&self) -> Option<&str> {
        self.order_field
            .as_deref()
            .filter(|f| !f.is_empty())
            .or_else(|| self.field())
    }

    /// [`field`](Self::field) relative to the root document, without a
    /// leading `{root_alias}.` segment.
    pub fn field_path(&self, root_alias: &str) -> Option<&str> {
        self.field().map(|f| strip_root_alias(f, root_alias))
    }

    /// [`order_field`](Self::order_field) relative to the root document.
    pub fn order_path(&self, root_alias: &str) -> Option<&str> {
        self.order_field().map(|f| strip_root_alias(f, root_alias))
    }

    pub fn filter(&self) -> Option<&ColumnFilter> {
        self.filter.as_ref()
    }

    pub fn is_orderable(&self) -> bool {
        self.orderable
    }

    pub fn is_global_searchable(&self) -> bool {
        self.global_searchable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_field_falls_back_to_field() {
        let col = Column::new("author").with_field("author.name");
        assert_eq!(col.order_field(), Some("author.name"));
        let col = col.with_order_field("author.lastName");
        assert_eq!(col.order_field(), Some("author.lastName"));
        assert_eq!(Column::new("x").order_field(), None);
        assert_eq!(Column::new("x").with_field("").field(), None);
    }

    #[test]
    fn test_paths_drop_root_alias() {
        let col = Column::new("email").with_field("book.author.email");
        assert_eq!(col.field_path("book"), Some("author.email"));
        assert_eq!(col.order_path("book"), Some("author.email"));
        assert_eq!(col.field_path("person"), Some("book.author.email"));

        let col = Column::new("title").with_field("title").with_order_field("book.sortTitle");
        assert_eq!(col.field_path("book"), Some("title"));
        assert_eq!(col.order_path("book"), Some("sortTitle"));
        assert_eq!(Column::new("x").field_path("book"), None);
    }

    #[test]
    fn test_coercion() {
        assert_eq!(Coercion::Integer.coerce(" 42 ").unwrap(), json!(42));
        assert!(Coercion::Integer.coerce("4x").is_err());
        assert_eq!(Coercion::Float.coerce("2.5").unwrap(), json!(2.5));
        assert_eq!(Coercion::Boolean.coerce("Yes").unwrap(), json!(true));
        assert!(Coercion::Boolean.coerce("maybe").is_err());
        assert_eq!(Coercion::Text.coerce("ann").unwrap(), json!("ann"));
    }

    #[test]
    fn test_column_deserialization_defaults() {
        let col: Column = serde_json::from_value(json!({
            "name": "age",
            "field": "age",
            "filter": { "operator": "greater_than", "coercion": "integer" }
        }))
        .unwrap();
        assert!(col.is_orderable());
        assert!(col.is_global_searchable());
        assert_eq!(
            col.filter(),
            Some(&ColumnFilter::new(Operator::GreaterThan, Coercion::Integer))
        );
    }
}
