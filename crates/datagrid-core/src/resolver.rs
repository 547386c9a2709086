//! Field-path resolution into join chains and projection sets.
//!
//! A dotted path such as `author.address.city` is walked against document
//! metadata starting at the root document. Every association segment adds a
//! join whose alias is derived from the path (`author`, `author_address`),
//! so overlapping paths land on the same joins. Each alias reached also
//! projects the identifier of the document type found there.

use std::sync::Arc;

use tracing::trace;

use crate::error::{GridError, Result};
use crate::metadata::{DocumentMetadata, MetadataProvider};
use crate::query::{JoinKind, QueryBuilder};

/// One planned join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEntry {
    /// `parentAlias.association`
    pub key: String,
    pub alias: String,
    pub kind: JoinKind,
}

/// Joins and per-alias projections accumulated over one or more paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPlan {
    root_alias: String,
    joins: Vec<JoinEntry>,
    projections: Vec<(String, Vec<String>)>,
}

impl JoinPlan {
    pub fn new(root_alias: impl Into<String>) -> Self {
        Self {
            root_alias: root_alias.into(),
            joins: Vec::new(),
            projections: Vec::new(),
        }
    }

    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    /// Joins in the order they were first needed.
    pub fn joins(&self) -> &[JoinEntry] {
        &self.joins
    }

    pub fn join(&self, key: &str) -> Option<&JoinEntry> {
        self.joins.iter().find(|j| j.key == key)
    }

    /// `(alias, fields)` in first-insertion order.
    pub fn projections(&self) -> &[(String, Vec<String>)] {
        &self.projections
    }

    pub fn projection(&self, alias: &str) -> Option<&[String]> {
        self.projections
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, fields)| fields.as_slice())
    }

    fn add_join(&mut self, key: String, alias: String) {
        if self.join(&key).is_none() {
            self.joins.push(JoinEntry {
                key,
                alias,
                kind: JoinKind::Join,
            });
        }
    }

    /// Two different association paths must never share an alias.
    fn check_alias(&self, key: &str, alias: &str) -> Result<()> {
        match self.joins.iter().find(|j| j.alias == alias && j.key != key) {
            Some(existing) => Err(GridError::InvalidConfiguration(format!(
                "join alias `{alias}` is produced by both `{}` and `{key}`",
                existing.key
            ))),
            None => Ok(()),
        }
    }

    fn add_projection(&mut self, alias: &str, field: &str) {
        match self.projections.iter_mut().find(|(a, _)| a == alias) {
            Some((_, fields)) => {
                if !fields.iter().any(|f| f == field) {
                    fields.push(field.to_string());
                }
            }
            None => self
                .projections
                .push((alias.to_string(), vec![field.to_string()])),
        }
    }

    /// Resolve one path starting at `base` and merge its joins and projections.
    ///
    /// Nothing is merged when the path fails to resolve.
    pub fn resolve(
        &mut self,
        path: &str,
        base: &Arc<DocumentMetadata>,
        provider: &dyn MetadataProvider,
    ) -> Result<()> {
        if path.split('.').any(str::is_empty) {
            return Err(GridError::UnknownField {
                document: base.name.clone(),
                field: path.to_string(),
            });
        }
        let segments: Vec<&str> = strip_root_alias(path, &self.root_alias).split('.').collect();

        let mut joins: Vec<(String, String)> = Vec::new();
        let mut projections: Vec<(String, String)> = Vec::new();

        let mut current_alias = self.root_alias.clone();
        let mut document = base.name.clone();
        let (terminal, associations) = segments
            .split_last()
            .ok_or_else(|| GridError::UnknownField {
                document: base.name.clone(),
                field: path.to_string(),
            })?;

        for (depth, segment) in associations.iter().enumerate() {
            let previous_alias = current_alias;
            current_alias = if depth == 0 {
                segment.to_string()
            } else {
                format!("{previous_alias}_{segment}")
            };
            let key = format!("{previous_alias}.{segment}");
            self.check_alias(&key, &current_alias)?;
            joins.push((key, current_alias.clone()));

            document = target_document(&document, segment, provider)?;
            projections.push((current_alias.clone(), identifier_of(&document, provider)?));
        }

        if !provider.has_field(&document, terminal)
            && provider.association_target(&document, terminal).is_none()
        {
            return Err(GridError::UnknownField {
                document,
                field: terminal.to_string(),
            });
        }
        projections.push((current_alias.clone(), identifier_of(&document, provider)?));
        projections.push((current_alias, terminal.to_string()));

        for (key, alias) in joins {
            self.add_join(key, alias);
        }
        for (alias, field) in projections {
            self.add_projection(&alias, &field);
        }
        trace!(path, joins = self.joins.len(), "resolved field path");
        Ok(())
    }

    /// Register every join and projection on a query builder.
    pub fn apply(&self, builder: &mut QueryBuilder) {
        for join in &self.joins {
            builder.add_join(&join.key, &join.alias, join.kind);
        }
        for (alias, fields) in &self.projections {
            for field in fields {
                builder.add_projection(alias, field);
            }
        }
    }
}

/// Resolve a single path from scratch.
pub fn resolve(
    path: &str,
    base_alias: &str,
    base: &Arc<DocumentMetadata>,
    provider: &dyn MetadataProvider,
) -> Result<JoinPlan> {
    let mut plan = JoinPlan::new(base_alias);
    plan.resolve(path, base, provider)?;
    Ok(plan)
}

/// `path` without a leading `{root_alias}.` segment.
///
/// A single-segment path is returned as is, even when it equals the alias.
pub fn strip_root_alias<'p>(path: &'p str, root_alias: &str) -> &'p str {
    match path.split_once('.') {
        Some((head, rest)) if head == root_alias && !rest.is_empty() => rest,
        _ => path,
    }
}

fn target_document(
    document: &str,
    association: &str,
    provider: &dyn MetadataProvider,
) -> Result<String> {
    provider
        .association_target(document, association)
        .filter(|target| provider.metadata_for(target).is_some())
        .ok_or_else(|| GridError::UnknownAssociation {
            document: document.to_string(),
            association: association.to_string(),
        })
}

fn identifier_of(document: &str, provider: &dyn MetadataProvider) -> Result<String> {
    provider
        .identifier_fields(document)
        .into_iter()
        .next()
        .ok_or_else(|| {
            GridError::InvalidConfiguration(format!(
                "document `{document}` declares no identifier field"
            ))
        })
}
