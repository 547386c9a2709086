use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::{lookup, Document, DocumentStore, DocumentStream};
use crate::error::Result;
use crate::query::{Operator, Predicate, Query, SortDirection};

/// Collections of JSON documents held in memory.
///
/// Associations are stored embedded, so a join is a walk into a nested
/// object (or each element of a nested array).
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append documents to a collection, creating it if needed.
    pub fn insert_many<I>(&self, document: &str, docs: I)
    where
        I: IntoIterator<Item = Document>,
    {
        self.collections
            .entry(document.to_string())
            .or_default()
            .extend(docs);
    }

    pub fn insert(&self, document: &str, doc: Document) {
        self.insert_many(document, std::iter::once(doc));
    }

    pub fn len(&self, document: &str) -> usize {
        self.collections.get(document).map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, document: &str) -> bool {
        self.len(document) == 0
    }

    fn matching(&self, query: &Query) -> Result<Vec<Document>> {
        let criteria = Criteria::compile(query)?;
        let docs = match self.collections.get(query.document()) {
            Some(collection) => collection
                .iter()
                .filter(|doc| criteria.matches(doc))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        Ok(docs)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn count(&self, query: &Query) -> Result<u64> {
        let count = self.matching(query)?.len() as u64;
        debug!(document = query.document(), count, "memory store count");
        Ok(count)
    }

    async fn find(&self, query: &Query) -> Result<DocumentStream> {
        let mut docs = self.matching(query)?;

        if !query.sort().is_empty() {
            docs.sort_by(|a, b| {
                for (field, direction) in query.sort() {
                    let ord = compare_sort_keys(lookup(a, field).as_ref(), lookup(b, field).as_ref());
                    let ord = match direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let skip = query.skip().unwrap_or(0) as usize;
        let docs: Vec<Document> = match query.limit() {
            Some(limit) => docs.into_iter().skip(skip).take(limit as usize).collect(),
            None => docs.into_iter().skip(skip).collect(),
        };

        let paths = query.projected_paths();
        let docs: Vec<Document> = if paths.is_empty() {
            docs
        } else {
            docs.iter().map(|d| project(d, &paths)).collect()
        };

        trace!(document = query.document(), rows = docs.len(), "memory store find");
        Ok(stream::iter(docs.into_iter().map(Ok)).boxed())
    }
}

struct Criteria<'q> {
    and: Vec<(&'q Predicate, Option<Regex>)>,
    or: Vec<(&'q Predicate, Option<Regex>)>,
}

impl<'q> Criteria<'q> {
    fn compile(query: &'q Query) -> Result<Self> {
        let compile = |preds: &'q [Predicate]| {
            preds
                .iter()
                .map(|p| Ok((p, p.pattern()?)))
                .collect::<Result<Vec<_>>>()
        };
        Ok(Self {
            and: compile(query.and_predicates())?,
            or: compile(query.or_group())?,
        })
    }

    fn matches(&self, doc: &Document) -> bool {
        self.and.iter().all(|(p, re)| predicate_matches(p, re.as_ref(), doc))
            && (self.or.is_empty()
                || self.or.iter().any(|(p, re)| predicate_matches(p, re.as_ref(), doc)))
    }
}

fn predicate_matches(predicate: &Predicate, pattern: Option<&Regex>, doc: &Document) -> bool {
    let actual = lookup(doc, predicate.field());
    let candidates: Vec<&Value> = match &actual {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v) => vec![v],
        None => Vec::new(),
    };
    let expected = predicate.value();

    match predicate.operator() {
        Operator::NotEquals => !candidates.iter().any(|v| values_equal(v, expected)),
        Operator::Equals => candidates.iter().any(|v| values_equal(v, expected)),
        Operator::GreaterThan => any_ordering(&candidates, expected, |o| o == Ordering::Greater),
        Operator::GreaterThanOrEqual => any_ordering(&candidates, expected, |o| o != Ordering::Less),
        Operator::LessThan => any_ordering(&candidates, expected, |o| o == Ordering::Less),
        Operator::LessThanOrEqual => any_ordering(&candidates, expected, |o| o != Ordering::Greater),
        Operator::Contains | Operator::StartsWith => match pattern {
            Some(re) => candidates
                .iter()
                .filter_map(|v| scalar_text(v))
                .any(|text| re.is_match(&text)),
            None => false,
        },
    }
}

fn any_ordering(candidates: &[&Value], expected: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    candidates
        .iter()
        .filter_map(|v| compare_scalars(v, expected))
        .any(accept)
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering between two scalars of the same kind; `None` across kinds.
fn compare_scalars(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_rank(v: Option<&Value>) -> u8 {
    match v {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order used for sorting: missing/null first, then by type, then by value.
fn compare_sort_keys(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(x), Some(y)) => compare_scalars(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Keep only the given dotted paths, preserving nesting and arrays.
fn project(doc: &Value, paths: &[String]) -> Value {
    let mut grouped: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for path in paths {
        let (head, rest) = path.split_once('.').unwrap_or((path.as_str(), ""));
        let rests = grouped.entry(head).or_default();
        if !rest.is_empty() {
            rests.push(rest.to_string());
        }
    }

    match doc {
        Value::Object(map) => {
            let mut out = Map::new();
            for (head, rests) in grouped {
                let Some(value) = map.get(head) else { continue };
                // a bare path segment wins over narrower nested paths
                let whole = paths.iter().any(|p| p == head);
                let projected = if whole || rests.is_empty() {
                    value.clone()
                } else {
                    project(value, &rests)
                };
                out.insert(head.to_string(), projected);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| project(v, paths)).collect()),
        other => other.clone(),
    }
}
