//! Document metadata and the provider interface the resolver reads it through.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{GridError, Result};

/// Cardinality of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    #[default]
    ToOne,
    ToMany,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    /// Name of the referenced document type
    pub target: String,
    #[serde(default)]
    pub kind: AssociationKind,
}

/// Read-only description of one document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Fully qualified document name (e.g. `App\Document\Person` or `app::Person`)
    pub name: String,
    /// Identifier field names, primary one first
    #[serde(default = "default_identifier")]
    pub identifier: Vec<String>,
    /// Scalar field mappings
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub associations: BTreeMap<String, Association>,
}

fn default_identifier() -> Vec<String> {
    vec!["id".to_string()]
}

impl DocumentMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: default_identifier(),
            fields: Vec::new(),
            associations: BTreeMap::new(),
        }
    }

    pub fn with_identifier(mut self, field: impl Into<String>) -> Self {
        self.identifier = vec![field.into()];
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_association(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        kind: AssociationKind,
    ) -> Self {
        self.associations.insert(
            name.into(),
            Association {
                target: target.into(),
                kind,
            },
        );
        self
    }

    /// Lower-cased last segment of the document name, used as root alias.
    pub fn short_name(&self) -> String {
        short_name(&self.name)
    }

    /// Primary identifier field.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.first().map(String::as_str)
    }

    /// True when `name` is a field mapping, identifiers included.
    pub fn has_field(&self, name: &str) -> bool {
        self.identifier.iter().any(|f| f == name) || self.fields.iter().any(|f| f == name)
    }

    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.get(name)
    }
}

/// Lower-cased last segment of a document name (`App\Document\Book` -> `book`).
pub fn short_name(document: &str) -> String {
    document
        .rsplit(['\\', ':', '.'])
        .next()
        .unwrap_or(document)
        .to_lowercase()
}

/// Lookup surface over document metadata.
///
/// Implementations are shared read-only between requests.
pub trait MetadataProvider: Send + Sync {
    /// Metadata for a document type, if known.
    fn metadata_for(&self, document: &str) -> Option<Arc<DocumentMetadata>>;

    fn identifier_fields(&self, document: &str) -> Vec<String> {
        self.metadata_for(document)
            .map(|m| m.identifier.clone())
            .unwrap_or_default()
    }

    fn has_field(&self, document: &str, name: &str) -> bool {
        self.metadata_for(document)
            .map(|m| m.has_field(name))
            .unwrap_or(false)
    }

    fn association_target(&self, document: &str, name: &str) -> Option<String> {
        self.metadata_for(document)
            .and_then(|m| m.association(name).map(|a| a.target.clone()))
    }
}

/// In-memory metadata registry.
#[derive(Debug, Default, Clone)]
pub struct MetadataRegistry {
    documents: BTreeMap<String, Arc<DocumentMetadata>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, metadata: DocumentMetadata) -> Self {
        self.insert(metadata);
        self
    }

    pub fn insert(&mut self, metadata: DocumentMetadata) {
        self.documents
            .insert(metadata.name.clone(), Arc::new(metadata));
    }

    /// Checks that every association points at a registered document.
    pub fn validate(&self) -> Result<()> {
        for doc in self.documents.values() {
            if doc.identifier.is_empty() {
                return Err(GridError::InvalidConfiguration(format!(
                    "document `{}` declares no identifier field",
                    doc.name
                )));
            }
            for (name, assoc) in &doc.associations {
                if !self.documents.contains_key(&assoc.target) {
                    return Err(GridError::InvalidConfiguration(format!(
                        "association `{}.{}` targets unknown document `{}`",
                        doc.name, name, assoc.target
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl FromIterator<DocumentMetadata> for MetadataRegistry {
    fn from_iter<T: IntoIterator<Item = DocumentMetadata>>(iter: T) -> Self {
        let mut registry = Self::new();
        for doc in iter {
            registry.insert(doc);
        }
        registry
    }
}

impl MetadataProvider for MetadataRegistry {
    fn metadata_for(&self, document: &str) -> Option<Arc<DocumentMetadata>> {
        self.documents.get(document).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MetadataRegistry {
        MetadataRegistry::new()
            .register(
                DocumentMetadata::new("App\\Document\\Book")
                    .with_field("title")
                    .with_association("author", "App\\Document\\Author", AssociationKind::ToOne),
            )
            .register(DocumentMetadata::new("App\\Document\\Author").with_field("name"))
    }

    #[test]
    fn test_short_name() {
        assert_eq!(DocumentMetadata::new("App\\Document\\Book").short_name(), "book");
        assert_eq!(DocumentMetadata::new("app::model::Person").short_name(), "person");
        assert_eq!(DocumentMetadata::new("Person").short_name(), "person");
    }

    #[test]
    fn test_provider_lookups() {
        let registry = registry();
        assert_eq!(registry.identifier_fields("App\\Document\\Book"), vec!["id"]);
        assert!(registry.has_field("App\\Document\\Book", "title"));
        assert!(registry.has_field("App\\Document\\Book", "id"));
        assert!(!registry.has_field("App\\Document\\Book", "missing"));
        assert_eq!(
            registry.association_target("App\\Document\\Book", "author").as_deref(),
            Some("App\\Document\\Author")
        );
        assert!(registry.association_target("App\\Document\\Book", "title").is_none());
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_dangling_association() {
        let registry = MetadataRegistry::new().register(
            DocumentMetadata::new("Book").with_association("author", "Author", AssociationKind::ToOne),
        );
        assert!(matches!(
            registry.validate(),
            Err(GridError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_metadata_deserialization_defaults() {
        let doc: DocumentMetadata = serde_json::from_value(serde_json::json!({
            "name": "Person",
            "fields": ["firstName"],
            "associations": { "address": { "target": "Address" } }
        }))
        .unwrap();
        assert_eq!(doc.identifier(), Some("id"));
        assert_eq!(doc.association("address").unwrap().kind, AssociationKind::ToOne);
    }
}
