//! Query processors and their normalization.
//!
//! Adapter options accept processors in several shapes: a processor object,
//! a bare closure, the name of a registered processor, or a list of those.
//! [`normalize`] turns any of them into a flat list of [`Processor`]s once,
//! at configuration time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::column::Column;
use crate::error::{GridError, Result};
use crate::manager::DocumentManager;
use crate::metadata::DocumentMetadata;
use crate::query::QueryBuilder;
use crate::state::TableState;

/// Something that appends clauses to a query for a given table state.
///
/// Processors must not execute the query and must not keep the builder.
pub trait QueryProcessor: Send + Sync {
    /// Called once at configuration time when the column set is static.
    fn prepare(&self, _columns: &[Column]) -> Result<()> {
        Ok(())
    }

    fn process(&self, builder: &mut QueryBuilder, state: &TableState) -> Result<()>;
}

/// Signature accepted for bare closures.
pub type ProcessorFn = dyn Fn(&mut QueryBuilder, &TableState) -> Result<()> + Send + Sync;

/// A normalized processor.
#[derive(Clone)]
pub enum Processor {
    Direct(Arc<dyn QueryProcessor>),
    Wrapped(Arc<ProcessorFn>),
}

impl Processor {
    pub fn prepare(&self, columns: &[Column]) -> Result<()> {
        match self {
            Processor::Direct(p) => p.prepare(columns),
            Processor::Wrapped(_) => Ok(()),
        }
    }

    pub fn process(&self, builder: &mut QueryBuilder, state: &TableState) -> Result<()> {
        match self {
            Processor::Direct(p) => p.process(builder, state),
            Processor::Wrapped(f) => f(builder, state),
        }
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Processor::Direct(_) => f.write_str("Processor::Direct"),
            Processor::Wrapped(_) => f.write_str("Processor::Wrapped"),
        }
    }
}

/// Processor option as supplied by the caller.
#[derive(Clone)]
pub enum ProcessorSpec {
    Processor(Arc<dyn QueryProcessor>),
    Callable(Arc<ProcessorFn>),
    /// Looked up in the [`ProcessorRegistry`]
    Named(String),
    List(Vec<ProcessorSpec>),
}

impl ProcessorSpec {
    pub fn processor<P: QueryProcessor + 'static>(processor: P) -> Self {
        ProcessorSpec::Processor(Arc::new(processor))
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&mut QueryBuilder, &TableState) -> Result<()> + Send + Sync + 'static,
    {
        ProcessorSpec::Callable(Arc::new(f))
    }

    pub fn named(name: impl Into<String>) -> Self {
        ProcessorSpec::Named(name.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ProcessorSpec::List(items) => items.iter().all(ProcessorSpec::is_empty),
            _ => false,
        }
    }
}

impl fmt::Debug for ProcessorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorSpec::Processor(_) => f.write_str("Processor"),
            ProcessorSpec::Callable(_) => f.write_str("Callable"),
            ProcessorSpec::Named(name) => write!(f, "Named({name:?})"),
            ProcessorSpec::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

impl From<Vec<ProcessorSpec>> for ProcessorSpec {
    fn from(items: Vec<ProcessorSpec>) -> Self {
        ProcessorSpec::List(items)
    }
}

impl From<Arc<dyn QueryProcessor>> for ProcessorSpec {
    fn from(processor: Arc<dyn QueryProcessor>) -> Self {
        ProcessorSpec::Processor(processor)
    }
}

impl From<&str> for ProcessorSpec {
    fn from(name: &str) -> Self {
        ProcessorSpec::Named(name.to_string())
    }
}

/// What a named processor factory gets to build from.
pub struct ProcessorContext<'a> {
    pub manager: &'a Arc<DocumentManager>,
    pub metadata: &'a Arc<DocumentMetadata>,
}

pub type ProcessorFactory = dyn Fn(&ProcessorContext<'_>) -> Result<Arc<dyn QueryProcessor>> + Send + Sync;

/// Named processor factories, used to resolve processors given by name.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    factories: BTreeMap<String, Arc<ProcessorFactory>>,
}

pub const AUTOMATIC: &str = "automatic";
pub const SEARCH: &str = "search";

impl ProcessorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `automatic` and `search` processors.
    pub fn with_builtins() -> Self {
        Self::new()
            .register(AUTOMATIC, |ctx| {
                Ok(Arc::new(crate::automatic::AutomaticQueryBuilder::new(
                    Arc::clone(ctx.manager),
                    Arc::clone(ctx.metadata),
                )) as Arc<dyn QueryProcessor>)
            })
            .register(SEARCH, |_| {
                Ok(Arc::new(crate::criteria::SearchCriteriaProvider::new()) as Arc<dyn QueryProcessor>)
            })
    }

    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ProcessorContext<'_>) -> Result<Arc<dyn QueryProcessor>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    fn build(&self, name: &str, ctx: &ProcessorContext<'_>) -> Result<Arc<dyn QueryProcessor>> {
        match self.factories.get(name) {
            Some(factory) => factory(ctx),
            None => Err(GridError::InvalidConfiguration(format!(
                "Provider must be a callable or implement QueryProcessor, got unknown processor `{name}`"
            ))),
        }
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Flatten a processor option into an ordered list of processors.
pub fn normalize(
    spec: ProcessorSpec,
    registry: &ProcessorRegistry,
    ctx: &ProcessorContext<'_>,
) -> Result<Vec<Processor>> {
    let mut out = Vec::new();
    normalize_into(spec, registry, ctx, &mut out)?;
    Ok(out)
}

fn normalize_into(
    spec: ProcessorSpec,
    registry: &ProcessorRegistry,
    ctx: &ProcessorContext<'_>,
    out: &mut Vec<Processor>,
) -> Result<()> {
    match spec {
        ProcessorSpec::Processor(p) => out.push(Processor::Direct(p)),
        ProcessorSpec::Callable(f) => out.push(Processor::Wrapped(f)),
        ProcessorSpec::Named(name) => out.push(Processor::Direct(registry.build(&name, ctx)?)),
        ProcessorSpec::List(items) => {
            for item in items {
                normalize_into(item, registry, ctx, out)?;
            }
        }
    }
    Ok(())
}
