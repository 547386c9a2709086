//! Configuration management for datagrid tables

use config::{Config, ConfigError, Environment, File, FileFormat};
use datagrid_core::{AdapterOptions, Column, DocumentMetadata, ProcessorSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Environment prefix; `DATAGRID__OBSERVABILITY__LOGGING__LEVEL=debug` and so on.
const ENV_PREFIX: &str = "DATAGRID";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Document schema: fields, identifiers and associations per document type
    #[serde(default)]
    pub documents: Vec<DocumentMetadata>,

    /// Tables by name
    #[serde(default)]
    pub tables: BTreeMap<String, TableConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json or pretty)
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics collection
    pub enabled: bool,

    /// Prometheus scrape endpoint bind address
    pub bind_address: String,
}

/// One table: the document it lists, its processors and its columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub document: String,

    /// Named query processors; empty means the automatic query builder
    #[serde(default)]
    pub query: Vec<String>,

    /// Named criteria processors; absent means the default search criteria
    #[serde(default)]
    pub criteria: Option<Vec<String>>,

    #[serde(default)]
    pub columns: Vec<Column>,
}

impl TableConfig {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            query: Vec::new(),
            criteria: None,
            columns: Vec::new(),
        }
    }

    /// Adapter options with processor names left for the adapter's registry
    /// to resolve.
    pub fn adapter_options(&self) -> AdapterOptions {
        let named = |names: &[String]| {
            ProcessorSpec::List(names.iter().map(|n| ProcessorSpec::named(n.as_str())).collect())
        };

        let mut options = AdapterOptions::new(self.document.clone());
        if !self.query.is_empty() {
            options = options.with_query(named(&self.query));
        }
        if let Some(criteria) = &self.criteria {
            options = options.with_criteria(named(criteria));
        }
        if !self.columns.is_empty() {
            options = options.with_columns(self.columns_arc());
        }
        options
    }

    pub fn columns_arc(&self) -> Arc<[Column]> {
        Arc::from(self.columns.clone())
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            observability: ObservabilityConfig {
                logging: LoggingConfig {
                    level: "info".to_string(),
                    format: "json".to_string(),
                },
                metrics: MetricsConfig {
                    enabled: false,
                    bind_address: "0.0.0.0:9090".to_string(),
                },
            },
            documents: Vec::new(),
            tables: BTreeMap::new(),
        }
    }
}

impl GridConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("datagrid.toml")
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&GridConfig::default())?)
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        if path.as_ref().exists() {
            builder = builder.add_source(File::from(path.as_ref()));
        }

        builder.build()?.try_deserialize()
    }

    /// Load configuration from environment variables only
    pub fn load_from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Config::try_from(&GridConfig::default())?)
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Parse configuration text over the defaults
    pub fn parse_str(contents: &str, format: FileFormat) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Config::try_from(&GridConfig::default())?)
            .add_source(File::from_str(contents, format))
            .build()?
            .try_deserialize()
    }

    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datagrid_core::{AssociationKind, Operator};
    use std::io::Write;

    const PEOPLE: &str = r#"
[observability.logging]
level = "debug"
format = "pretty"

[[documents]]
name = "Person"
fields = ["firstName", "lastName", "age"]

[documents.associations.employer]
target = "Company"

[[documents]]
name = "Company"
identifier = ["code"]
fields = ["name"]

[tables.people]
document = "Person"
criteria = ["search"]

[[tables.people.columns]]
name = "firstName"
field = "firstName"

[[tables.people.columns]]
name = "age"
field = "age"
global_searchable = false
filter = { operator = "greater_than_or_equal", coercion = "integer" }

[[tables.people.columns]]
name = "employer"
field = "employer.name"
orderable = false
"#;

    #[test]
    fn test_default_config() {
        let config = GridConfig::default();
        assert_eq!(config.observability.logging.level, "info");
        assert!(!config.observability.metrics.enabled);
        assert!(config.tables.is_empty());
    }

    #[test]
    fn test_config_serialization() {
        let config = GridConfig::parse_str(PEOPLE, FileFormat::Toml).unwrap();
        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: GridConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(config.documents, deserialized.documents);
        assert_eq!(config.tables, deserialized.tables);
    }

    #[test]
    fn test_parse_tables_and_documents() {
        let config = GridConfig::parse_str(PEOPLE, FileFormat::Toml).unwrap();
        assert_eq!(config.observability.logging.format, "pretty");
        // untouched sections keep their defaults
        assert_eq!(config.observability.metrics.bind_address, "0.0.0.0:9090");

        assert_eq!(config.documents.len(), 2);
        let person = &config.documents[0];
        assert_eq!(person.identifier, vec!["id".to_string()]);
        assert_eq!(person.associations["employer"].target, "Company");
        assert_eq!(person.associations["employer"].kind, AssociationKind::ToOne);
        assert_eq!(config.documents[1].identifier, vec!["code".to_string()]);

        let table = config.table("people").unwrap();
        assert_eq!(table.columns.len(), 3);
        let age = &table.columns[1];
        assert!(!age.is_global_searchable());
        assert_eq!(age.filter().map(|f| f.operator), Some(Operator::GreaterThanOrEqual));
        assert!(!table.columns[2].is_orderable());
    }

    #[test]
    fn test_adapter_options_from_table() {
        let config = GridConfig::parse_str(PEOPLE, FileFormat::Toml).unwrap();
        let options = config.table("people").unwrap().adapter_options();
        assert_eq!(options.document, "Person");
        assert!(options.query.is_none());
        assert!(matches!(options.criteria, Some(ProcessorSpec::List(ref l)) if l.len() == 1));
        assert_eq!(options.columns.map(|c| c.len()), Some(3));

        let bare = TableConfig::new("Person").adapter_options();
        assert!(bare.criteria.is_none());
        assert!(bare.columns.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(PEOPLE.as_bytes()).unwrap();

        let config = GridConfig::load_from_file(file.path()).unwrap();
        assert!(config.table("people").is_some());

        let missing = GridConfig::load_from_file("does-not-exist.toml").unwrap();
        assert!(missing.documents.is_empty());
    }
}
