use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::predicate::{Predicate, SortDirection};
use crate::error::Result;
use crate::metadata::short_name;
use crate::store::{DocumentStore, DocumentStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    #[default]
    Join,
    LeftJoin,
}

/// One lookup, keyed by `parentAlias.association`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub key: String,
    pub alias: String,
    pub kind: JoinKind,
}

impl Join {
    /// Split the key into (parent alias, association name).
    pub fn parent_and_association(&self) -> (&str, &str) {
        self.key.rsplit_once('.').unwrap_or(("", self.key.as_str()))
    }
}

/// The accumulated clauses of one document query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    document: String,
    joins: Vec<Join>,
    projections: Vec<(String, Vec<String>)>,
    and: Vec<Predicate>,
    or: Vec<Predicate>,
    sort: Vec<(String, SortDirection)>,
    skip: Option<u64>,
    limit: Option<u64>,
}

impl Query {
    pub fn new(document: &str) -> Self {
        Query {
            document: document.to_string(),
            ..Default::default()
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    /// Alias of the queried document, as used by the join plan.
    pub fn root_alias(&self) -> String {
        short_name(&self.document)
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn projections(&self) -> &[(String, Vec<String>)] {
        &self.projections
    }

    pub fn and_predicates(&self) -> &[Predicate] {
        &self.and
    }

    pub fn or_group(&self) -> &[Predicate] {
        &self.or
    }

    pub fn sort(&self) -> &[(String, SortDirection)] {
        &self.sort
    }

    pub fn skip(&self) -> Option<u64> {
        self.skip
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn has_criteria(&self) -> bool {
        !self.and.is_empty() || !self.or.is_empty()
    }

    /// Dotted document path for every join alias. Aliases that are never
    /// the target of a join (the root) map to the empty path.
    pub fn alias_paths(&self) -> HashMap<&str, String> {
        let mut paths: HashMap<&str, String> = HashMap::new();
        for join in &self.joins {
            let (parent, association) = join.parent_and_association();
            let path = match paths.get(parent) {
                Some(p) if !p.is_empty() => format!("{p}.{association}"),
                _ => association.to_string(),
            };
            paths.insert(join.alias.as_str(), path);
        }
        paths
    }

    /// Projections flattened to dotted document paths, in insertion order.
    pub fn projected_paths(&self) -> Vec<String> {
        let aliases = self.alias_paths();
        let mut out = Vec::new();
        for (alias, fields) in &self.projections {
            let prefix = aliases.get(alias.as_str()).map(String::as_str).unwrap_or("");
            for field in fields {
                let path = if prefix.is_empty() {
                    field.clone()
                } else {
                    format!("{prefix}.{field}")
                };
                if !out.contains(&path) {
                    out.push(path);
                }
            }
        }
        out
    }

    /// Filter part rendered MongoDB-style; `{}` when there are no criteria.
    pub fn filter_document(&self) -> Value {
        let mut clauses: Vec<Value> = self.and.iter().map(Predicate::to_document).collect();
        if !self.or.is_empty() {
            clauses.push(json!({ "$or": self.or.iter().map(Predicate::to_document).collect::<Vec<_>>() }));
        }
        match clauses.len() {
            0 => json!({}),
            1 => clauses.remove(0),
            _ => json!({ "$and": clauses }),
        }
    }

    /// Whole query rendered as a MongoDB-style command document.
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("find".into(), json!(self.document));

        if !self.joins.is_empty() {
            let lookups: Vec<Value> = self
                .joins
                .iter()
                .map(|j| {
                    json!({
                        "from": j.key,
                        "as": j.alias,
                        "preserveNull": j.kind == JoinKind::LeftJoin,
                    })
                })
                .collect();
            doc.insert("lookups".into(), Value::Array(lookups));
        }

        let projected = self.projected_paths();
        if !projected.is_empty() {
            let projection: Map<String, Value> =
                projected.into_iter().map(|p| (p, json!(1))).collect();
            doc.insert("projection".into(), Value::Object(projection));
        }

        doc.insert("filter".into(), self.filter_document());

        if !self.sort.is_empty() {
            let sort: Vec<Value> = self
                .sort
                .iter()
                .map(|(field, dir)| json!([field, dir.as_i32()]))
                .collect();
            doc.insert("sort".into(), Value::Array(sort));
        }
        if let Some(skip) = self.skip {
            doc.insert("skip".into(), json!(skip));
        }
        if let Some(limit) = self.limit {
            doc.insert("limit".into(), json!(limit));
        }
        Value::Object(doc)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query: {}", self.to_document())
    }
}

/// Append-only clause accumulator bound to the store that executes it.
pub struct QueryBuilder {
    query: Query,
    store: Arc<dyn DocumentStore>,
}

impl QueryBuilder {
    pub fn new(store: Arc<dyn DocumentStore>, document: &str) -> Self {
        Self {
            query: Query::new(document),
            store,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn scope_to(&mut self, document: &str) -> &mut Self {
        self.query.document = document.to_string();
        self
    }

    /// Idempotent: a field already projected at `alias` is not added twice.
    pub fn add_projection(&mut self, alias: &str, field: &str) -> &mut Self {
        match self.query.projections.iter_mut().find(|(a, _)| a == alias) {
            Some((_, fields)) => {
                if !fields.iter().any(|f| f == field) {
                    fields.push(field.to_string());
                }
            }
            None => self
                .query
                .projections
                .push((alias.to_string(), vec![field.to_string()])),
        }
        self
    }

    /// Joins are keyed; re-adding a key keeps the first registration.
    pub fn add_join(&mut self, key: &str, alias: &str, kind: JoinKind) -> &mut Self {
        if !self.query.joins.iter().any(|j| j.key == key) {
            self.query.joins.push(Join {
                key: key.to_string(),
                alias: alias.to_string(),
                kind,
            });
        }
        self
    }

    pub fn add_and(&mut self, predicate: Predicate) -> &mut Self {
        self.query.and.push(predicate);
        self
    }

    /// Extends the single OR group; an empty group adds nothing.
    pub fn add_or_group<I>(&mut self, predicates: I) -> &mut Self
    where
        I: IntoIterator<Item = Predicate>,
    {
        self.query.or.extend(predicates);
        self
    }

    pub fn add_sort(&mut self, field: &str, direction: SortDirection) -> &mut Self {
        self.query.sort.push((field.to_string(), direction));
        self
    }

    pub fn set_offset(&mut self, offset: u64) -> &mut Self {
        self.query.skip = Some(offset);
        self
    }

    pub fn set_limit(&mut self, limit: u64) -> &mut Self {
        self.query.limit = Some(limit);
        self
    }

    /// Count of matching documents, ignoring skip and limit.
    pub async fn count(&self) -> Result<u64> {
        self.store.count(&self.query).await
    }

    /// Run the query. The builder is consumed: a query executes once.
    pub async fn execute(self) -> Result<DocumentStream> {
        self.store.find(&self.query).await
    }
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder").field("query", &self.query).finish()
    }
}
