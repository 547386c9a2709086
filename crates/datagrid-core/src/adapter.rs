//! Document-store table adapter.
//!
//! One request runs through a fixed sequence of phases:
//!
//! ```text
//! Init -> BuildBaseQuery -> RunQueryProcessors -> RunCriteriaProcessors
//!      -> ComputeFilteredCount -> ComputeTotalCount -> ApplySortAndPage
//!      -> StreamResults -> Done
//! ```
//!
//! Counts and the result query are separate executions; they are not taken
//! from a common snapshot.

use std::fmt;
use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use tracing::{debug, field, instrument, Span};
use uuid::Uuid;

use crate::automatic::AutomaticQueryBuilder;
use crate::column::Column;
use crate::criteria::SearchCriteriaProvider;
use crate::error::{GridError, Result};
use crate::manager::{DocumentManager, ManagerRegistry};
use crate::metadata::DocumentMetadata;
use crate::processor::{normalize, Processor, ProcessorContext, ProcessorRegistry, ProcessorSpec};
use crate::query::QueryBuilder;
use crate::state::TableState;
use crate::store::{lookup, DocumentStream};

/// Options accepted by [`OdmAdapter::configure`].
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Document type the table lists
    pub document: String,
    /// Query processors; empty or absent means the automatic query builder
    pub query: Option<ProcessorSpec>,
    /// Criteria processors; absent means the default search criteria,
    /// an empty list means none
    pub criteria: Option<ProcessorSpec>,
    /// Static columns; when given, the automatic join plan is resolved
    /// during configuration
    pub columns: Option<Arc<[Column]>>,
}

impl AdapterOptions {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            query: None,
            criteria: None,
            columns: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<ProcessorSpec>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_criteria(mut self, criteria: impl Into<ProcessorSpec>) -> Self {
        self.criteria = Some(criteria.into());
        self
    }

    pub fn with_columns(mut self, columns: Arc<[Column]>) -> Self {
        self.columns = Some(columns);
        self
    }
}

#[derive(Debug)]
struct AdapterConfig {
    manager: Arc<DocumentManager>,
    metadata: Arc<DocumentMetadata>,
    query_processors: Vec<Processor>,
    criteria_processors: Vec<Processor>,
}

/// Request phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    BuildBaseQuery,
    RunQueryProcessors,
    RunCriteriaProcessors,
    ComputeFilteredCount,
    ComputeTotalCount,
    ApplySortAndPage,
    StreamResults,
    Done,
}

impl Phase {
    pub fn next(self) -> Option<Phase> {
        use Phase::*;
        match self {
            Init => Some(BuildBaseQuery),
            BuildBaseQuery => Some(RunQueryProcessors),
            RunQueryProcessors => Some(RunCriteriaProcessors),
            RunCriteriaProcessors => Some(ComputeFilteredCount),
            ComputeFilteredCount => Some(ComputeTotalCount),
            ComputeTotalCount => Some(ApplySortAndPage),
            ApplySortAndPage => Some(StreamResults),
            StreamResults => Some(Done),
            Done => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::BuildBaseQuery => "build_base_query",
            Phase::RunQueryProcessors => "run_query_processors",
            Phase::RunCriteriaProcessors => "run_criteria_processors",
            Phase::ComputeFilteredCount => "compute_filtered_count",
            Phase::ComputeTotalCount => "compute_total_count",
            Phase::ApplySortAndPage => "apply_sort_and_page",
            Phase::StreamResults => "stream_results",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping for one request as it moves through the phases.
#[derive(Debug)]
pub struct AdapterQuery<'s> {
    id: Uuid,
    state: &'s TableState,
    phase: Phase,
    filtered_rows: Option<u64>,
    total_rows: Option<u64>,
    identifier_property_path: Option<String>,
}

impl<'s> AdapterQuery<'s> {
    fn new(state: &'s TableState) -> Self {
        Self {
            id: Uuid::new_v4(),
            state,
            phase: Phase::Init,
            filtered_rows: None,
            total_rows: None,
            identifier_property_path: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &TableState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn filtered_rows(&self) -> Option<u64> {
        self.filtered_rows
    }

    pub fn total_rows(&self) -> Option<u64> {
        self.total_rows
    }

    pub fn identifier_property_path(&self) -> Option<&str> {
        self.identifier_property_path.as_deref()
    }

    fn advance(&mut self) -> Phase {
        if let Some(next) = self.phase.next() {
            self.phase = next;
        }
        debug!(request_id = %self.id, phase = %self.phase, "adapter phase");
        self.phase
    }
}

/// Counts and result stream of one handled request.
pub struct ResultSet {
    request_id: Uuid,
    total_rows: u64,
    filtered_rows: u64,
    identifier_property_path: Option<String>,
    columns: Arc<[Column]>,
    root_alias: String,
    documents: DocumentStream,
}

impl ResultSet {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Row count of the document type, ignoring all criteria.
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Row count after criteria, before paging.
    pub fn filtered_rows(&self) -> u64 {
        self.filtered_rows
    }

    /// Identifier field of the listed document type.
    pub fn identifier_property_path(&self) -> Option<&str> {
        self.identifier_property_path.as_deref()
    }

    /// Raw result documents, consumed once.
    pub fn into_documents(self) -> DocumentStream {
        self.documents
    }

    /// Results mapped to one JSON object per row, keyed by column name, with
    /// each value read from the document at the column's field path.
    pub fn into_rows(self) -> BoxStream<'static, Result<Map<String, Value>>> {
        let columns = self.columns;
        let root_alias = self.root_alias;
        self.documents
            .map_ok(move |doc| map_row(&columns, &root_alias, &doc))
            .boxed()
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("request_id", &self.request_id)
            .field("total_rows", &self.total_rows)
            .field("filtered_rows", &self.filtered_rows)
            .field("identifier_property_path", &self.identifier_property_path)
            .finish_non_exhaustive()
    }
}

fn map_row(columns: &[Column], root_alias: &str, doc: &Value) -> Map<String, Value> {
    columns
        .iter()
        .map(|column| {
            let path = column.field_path(root_alias).unwrap_or(column.name());
            let value = lookup(doc, path).unwrap_or(Value::Null);
            (column.name().to_string(), value)
        })
        .collect()
}

/// Table adapter over a document store.
pub struct OdmAdapter {
    registry: Arc<dyn ManagerRegistry>,
    processors: ProcessorRegistry,
    config: Option<AdapterConfig>,
}

impl OdmAdapter {
    /// Fails with `MissingDependency` when no manager registry is available.
    pub fn new(registry: Option<Arc<dyn ManagerRegistry>>) -> Result<Self> {
        let registry = registry.ok_or_else(|| {
            GridError::MissingDependency(
                "a document manager registry is required to use the ODM adapter".to_string(),
            )
        })?;
        Ok(Self {
            registry,
            processors: ProcessorRegistry::with_builtins(),
            config: None,
        })
    }

    /// Replace the registry used to resolve processors given by name.
    pub fn with_processor_registry(mut self, processors: ProcessorRegistry) -> Self {
        self.processors = processors;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Resolve the document type and normalize the processors.
    #[instrument(skip(self, options), fields(document = %options.document))]
    pub fn configure(&mut self, options: AdapterOptions) -> Result<()> {
        let AdapterOptions {
            document,
            query,
            criteria,
            columns,
        } = options;

        let manager = self.registry.manager_for(&document).ok_or_else(|| {
            GridError::InvalidConfiguration(format!(
                "no document manager for document `{document}`, is it correctly registered?"
            ))
        })?;
        let metadata = manager.metadata_for(&document).ok_or_else(|| {
            GridError::InvalidConfiguration(format!("no metadata for document `{document}`"))
        })?;

        let ctx = ProcessorContext {
            manager: &manager,
            metadata: &metadata,
        };

        let query_processors = match query.filter(|q| !q.is_empty()) {
            Some(spec) => normalize(spec, &self.processors, &ctx)?,
            None => vec![Processor::Direct(Arc::new(AutomaticQueryBuilder::new(
                Arc::clone(&manager),
                Arc::clone(&metadata),
            )))],
        };

        let criteria_processors = match criteria {
            Some(spec) => normalize(spec, &self.processors, &ctx)?,
            None => vec![Processor::Direct(Arc::new(SearchCriteriaProvider::new()))],
        };

        if let Some(columns) = &columns {
            for processor in query_processors.iter().chain(&criteria_processors) {
                processor.prepare(columns)?;
            }
        }

        debug!(
            query_processors = query_processors.len(),
            criteria_processors = criteria_processors.len(),
            "adapter configured"
        );

        self.config = Some(AdapterConfig {
            manager,
            metadata,
            query_processors,
            criteria_processors,
        });
        Ok(())
    }

    fn config(&self) -> Result<&AdapterConfig> {
        self.config.as_ref().ok_or_else(|| {
            GridError::InvalidConfiguration("adapter used before `configure`".to_string())
        })
    }

    /// Document type this adapter lists, once configured.
    pub fn document(&self) -> Option<&str> {
        self.config.as_ref().map(|c| c.metadata.name.as_str())
    }

    /// Run one request. Any processor or driver error aborts it unchanged.
    #[instrument(skip(self, state), fields(document = field::Empty, request_id = field::Empty))]
    pub async fn handle(&self, state: &TableState) -> Result<ResultSet> {
        let config = self.config()?;
        let document = config.metadata.name.as_str();
        let mut query = AdapterQuery::new(state);
        Span::current().record("document", document);
        Span::current().record("request_id", field::display(query.id));

        query.advance();
        let mut builder: QueryBuilder = config.manager.create_query_builder(document);

        query.advance();
        for processor in &config.query_processors {
            processor.process(&mut builder, state)?;
        }

        query.advance();
        for processor in &config.criteria_processors {
            processor.process(&mut builder, state)?;
        }

        query.advance();
        let filtered_rows = builder.count().await?;
        query.filtered_rows = Some(filtered_rows);

        query.advance();
        let total_rows = config.manager.create_query_builder(document).count().await?;
        query.total_rows = Some(total_rows);
        query.identifier_property_path = config.metadata.identifier().map(str::to_string);

        query.advance();
        let root_alias = config.metadata.short_name();
        for (column, direction) in state.order_by() {
            if !column.is_orderable() {
                continue;
            }
            match column.order_path(&root_alias) {
                Some(field) => {
                    builder.add_sort(field, direction);
                }
                None => debug!(column = column.name(), "orderable column has no field, not sorted"),
            }
        }
        if state.length() > 0 {
            builder
                .set_offset(state.start())
                .set_limit(state.length() as u64);
        }

        query.advance();
        debug!(query = %builder.query(), "executing table query");
        let documents = builder.execute().await?;

        query.advance();
        debug!(total_rows, filtered_rows, "table request prepared");

        Ok(ResultSet {
            request_id: query.id,
            total_rows,
            filtered_rows,
            identifier_property_path: query.identifier_property_path,
            columns: Arc::clone(state.columns()),
            root_alias,
            documents,
        })
    }
}

impl fmt::Debug for OdmAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdmAdapter")
            .field("processors", &self.processors)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataRegistry;
    use crate::query::{Operator, Predicate, Query, SortDirection};
    use crate::store::{MemoryStore, MockDocumentStore};
    use futures::stream;
    use mockall::Sequence;
    use serde_json::json;

    fn person() -> DocumentMetadata {
        DocumentMetadata::new("Person").with_fields(["firstName", "lastName"])
    }

    fn registry_with(store: Arc<dyn crate::store::DocumentStore>) -> Arc<dyn ManagerRegistry> {
        let manager = Arc::new(DocumentManager::new(
            Arc::new(MetadataRegistry::new().register(person())),
            store,
        ));
        Arc::new(crate::manager::StaticRegistry::single(manager))
    }

    fn columns() -> Arc<[Column]> {
        vec![
            Column::new("firstName").with_field("firstName"),
            Column::new("lastName").with_field("lastName"),
        ]
        .into()
    }

    #[test]
    fn test_requires_registry() {
        let err = OdmAdapter::new(None).unwrap_err();
        assert!(matches!(err, GridError::MissingDependency(_)));
        assert!(err.to_string().contains("registry"));
    }

    #[test]
    fn test_unknown_document_is_invalid_configuration() {
        let mut adapter = OdmAdapter::new(Some(registry_with(Arc::new(MemoryStore::new())))).unwrap();
        let err = adapter.configure(AdapterOptions::new("Car")).unwrap_err();
        assert!(matches!(err, GridError::InvalidConfiguration(_)));
        assert!(!adapter.is_configured());
    }

    #[test]
    fn test_invalid_query_processor_throws() {
        let mut adapter = OdmAdapter::new(Some(registry_with(Arc::new(MemoryStore::new())))).unwrap();
        let err = adapter
            .configure(AdapterOptions::new("Person").with_query(vec![ProcessorSpec::named("foo")]))
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Provider must be a callable or implement QueryProcessor"));
    }

    struct RequiresColumn(&'static str);

    impl crate::processor::QueryProcessor for RequiresColumn {
        fn prepare(&self, columns: &[Column]) -> Result<()> {
            if columns.iter().any(|c| c.name() == self.0) {
                Ok(())
            } else {
                Err(GridError::InvalidConfiguration(format!("missing column `{}`", self.0)))
            }
        }

        fn process(&self, _builder: &mut QueryBuilder, _state: &TableState) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_static_columns_prepare_every_processor() {
        let mut adapter = OdmAdapter::new(Some(registry_with(Arc::new(MemoryStore::new())))).unwrap();
        let err = adapter
            .configure(
                AdapterOptions::new("Person")
                    .with_criteria(ProcessorSpec::processor(RequiresColumn("email")))
                    .with_columns(columns()),
            )
            .unwrap_err();
        assert!(err.to_string().contains("missing column `email`"));
        assert!(!adapter.is_configured());

        adapter
            .configure(
                AdapterOptions::new("Person")
                    .with_query(ProcessorSpec::processor(RequiresColumn("lastName")))
                    .with_columns(columns()),
            )
            .unwrap();
        assert!(adapter.is_configured());
    }

    #[tokio::test]
    async fn test_handle_before_configure_fails() {
        let adapter = OdmAdapter::new(Some(registry_with(Arc::new(MemoryStore::new())))).unwrap();
        let state = TableState::new(columns());
        assert!(matches!(
            adapter.handle(&state).await,
            Err(GridError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_phases_are_sequential() {
        let mut phase = Phase::Init;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            assert!(next > phase);
            phase = next;
            seen.push(phase);
        }
        assert_eq!(seen.len(), 9);
        assert_eq!(seen.last(), Some(&Phase::Done));
    }

    #[tokio::test]
    async fn test_counts_then_query_against_store() {
        let mut store = MockDocumentStore::new();
        let mut seq = Sequence::new();

        store
            .expect_count()
            .withf(|q: &Query| q.has_criteria())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(2));
        store
            .expect_count()
            .withf(|q: &Query| !q.has_criteria() && q.projections().is_empty())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(10));
        store
            .expect_find()
            .withf(|q: &Query| {
                q.sort() == [("lastName".to_string(), SortDirection::Desc)]
                    && q.skip() == Some(5)
                    && q.limit() == Some(5)
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(stream::iter(vec![
                    Ok(json!({ "id": 1, "firstName": "Ann", "lastName": "Zed" })),
                    Ok(json!({ "id": 2, "firstName": "Anna" })),
                ])
                .boxed())
            });

        let mut adapter = OdmAdapter::new(Some(registry_with(Arc::new(store)))).unwrap();
        adapter.configure(AdapterOptions::new("Person")).unwrap();

        let mut state = TableState::new(columns());
        state
            .set_global_search("ann")
            .set_start(5)
            .set_length(5);
        state.add_order(1, SortDirection::Desc).unwrap();

        let result = adapter.handle(&state).await.unwrap();
        assert_eq!(result.filtered_rows(), 2);
        assert_eq!(result.total_rows(), 10);
        assert_eq!(result.identifier_property_path(), Some("id"));

        let rows: Vec<_> = result.into_rows().try_collect().await.unwrap();
        assert_eq!(rows[0]["lastName"], json!("Zed"));
        assert_eq!(rows[1]["lastName"], Value::Null);
    }

    #[tokio::test]
    async fn test_processor_error_aborts_request() {
        let mut store = MockDocumentStore::new();
        store.expect_count().never();
        store.expect_find().never();

        let mut adapter = OdmAdapter::new(Some(registry_with(Arc::new(store)))).unwrap();
        adapter
            .configure(AdapterOptions::new("Person").with_criteria(ProcessorSpec::callable(
                |_: &mut QueryBuilder, _: &TableState| Err(GridError::Execution("boom".into())),
            )))
            .unwrap();

        let err = adapter.handle(&TableState::new(columns())).await.unwrap_err();
        assert!(matches!(err, GridError::Execution(ref m) if m == "boom"));
    }

    #[tokio::test]
    async fn test_driver_error_propagates() {
        let mut store = MockDocumentStore::new();
        store
            .expect_count()
            .returning(|_| Err(GridError::Execution("connection reset".into())));
        store.expect_find().never();

        let mut adapter = OdmAdapter::new(Some(registry_with(Arc::new(store)))).unwrap();
        adapter.configure(AdapterOptions::new("Person")).unwrap();
        let err = adapter.handle(&TableState::new(columns())).await.unwrap_err();
        assert_eq!(err.to_string(), "Execution error: connection reset");
    }

    #[tokio::test]
    async fn test_empty_criteria_list_disables_search() {
        let store = MemoryStore::new();
        store.insert_many(
            "Person",
            vec![
                json!({ "id": 1, "firstName": "Ann" }),
                json!({ "id": 2, "firstName": "Bob" }),
            ],
        );
        let mut adapter = OdmAdapter::new(Some(registry_with(Arc::new(store)))).unwrap();
        adapter
            .configure(AdapterOptions::new("Person").with_criteria(ProcessorSpec::List(vec![])))
            .unwrap();

        let mut state = TableState::new(columns());
        state.set_global_search("ann");
        let result = adapter.handle(&state).await.unwrap();
        assert_eq!(result.filtered_rows(), 2);
    }

    #[tokio::test]
    async fn test_custom_query_processor_replaces_automatic() {
        let store = MemoryStore::new();
        store.insert_many(
            "Person",
            vec![
                json!({ "id": 1, "firstName": "Ann", "active": true }),
                json!({ "id": 2, "firstName": "Bob", "active": false }),
            ],
        );
        let mut adapter = OdmAdapter::new(Some(registry_with(Arc::new(store)))).unwrap();
        adapter
            .configure(AdapterOptions::new("Person").with_query(ProcessorSpec::callable(
                |qb: &mut QueryBuilder, _: &TableState| {
                    qb.add_and(Predicate::new("active", Operator::Equals, true));
                    Ok(())
                },
            )))
            .unwrap();

        let result = adapter.handle(&TableState::new(columns())).await.unwrap();
        assert_eq!(result.filtered_rows(), 1);
        assert_eq!(result.total_rows(), 2);
        let docs: Vec<_> = result.into_documents().try_collect().await.unwrap();
        // no automatic builder, so no projection: full documents come back
        assert_eq!(docs, vec![json!({ "id": 1, "firstName": "Ann", "active": true })]);
    }
}
