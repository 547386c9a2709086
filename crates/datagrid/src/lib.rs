//! `datagrid`: façade over `datagrid-core` and `datagrid-shared`, plus a
//! configuration-driven [`Grid`] of named tables.

#![deny(missing_docs)]

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

/// Re-export everything from datagrid-core at the crate root.
#[doc(inline)]
pub use datagrid_core::*;

/// datagrid-core as a nested module, for `datagrid::core::...` paths.
pub use datagrid_core as core;

/// Configuration and observability.
pub use datagrid_shared as shared;

use datagrid_shared::{GridConfig, GridMetrics, RequestTimer};

/// Response body for one table request, in DataTables' wire names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResponse {
    /// Echo of the request's draw counter
    pub draw: u64,
    /// Rows of the document type, ignoring all criteria
    pub records_total: u64,
    /// Rows matching the criteria, before paging
    pub records_filtered: u64,
    /// One object per row, keyed by column name
    pub data: Vec<Map<String, Value>>,
}

struct GridTable {
    adapter: OdmAdapter,
    columns: Arc<[Column]>,
}

/// Named tables over a single document store.
pub struct Grid {
    tables: BTreeMap<String, GridTable>,
}

impl Grid {
    /// Build every configured table with the built-in processors.
    pub fn from_config(config: &GridConfig, store: Arc<dyn DocumentStore>) -> anyhow::Result<Self> {
        Self::from_config_with(config, store, ProcessorRegistry::with_builtins())
    }

    /// Build every configured table, resolving processor names through
    /// `processors`.
    pub fn from_config_with(
        config: &GridConfig,
        store: Arc<dyn DocumentStore>,
        processors: ProcessorRegistry,
    ) -> anyhow::Result<Self> {
        let metadata: MetadataRegistry = config.documents.iter().cloned().collect();
        metadata.validate().context("invalid document schema")?;

        let manager = Arc::new(DocumentManager::new(Arc::new(metadata), store));
        let registry: Arc<dyn ManagerRegistry> = Arc::new(StaticRegistry::single(manager));

        let mut tables = BTreeMap::new();
        for (name, table) in &config.tables {
            let mut adapter = OdmAdapter::new(Some(Arc::clone(&registry)))?
                .with_processor_registry(processors.clone());
            adapter
                .configure(table.adapter_options())
                .with_context(|| format!("failed to configure table `{name}`"))?;
            tables.insert(
                name.clone(),
                GridTable {
                    adapter,
                    columns: table.columns_arc(),
                },
            );
        }

        info!(tables = tables.len(), "grid configured");
        Ok(Self { tables })
    }

    /// Names of the configured tables.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Handle one request for `table` and collect the page of rows.
    #[instrument(skip(self, request), fields(draw = request.draw))]
    pub async fn handle(&self, table: &str, request: &TableRequest) -> anyhow::Result<TableResponse> {
        let entry = self
            .tables
            .get(table)
            .with_context(|| format!("unknown table `{table}`"))?;

        let timer = RequestTimer::start(table);
        let response = Self::run(entry, request).await;
        timer.finish();

        match response {
            Ok(response) => {
                GridMetrics::request_handled(table, response.records_filtered, response.records_total);
                GridMetrics::rows_returned(table, response.data.len());
                Ok(response)
            }
            Err(err) => {
                warn!(error = %err, "table request failed");
                GridMetrics::request_failed(table, err.kind());
                Err(err).with_context(|| format!("request for table `{table}` failed"))
            }
        }
    }

    async fn run(entry: &GridTable, request: &TableRequest) -> Result<TableResponse> {
        let state = TableState::from_request(Arc::clone(&entry.columns), request)?;
        let result = entry.adapter.handle(&state).await?;
        let records_total = result.total_rows();
        let records_filtered = result.filtered_rows();
        let data = result.into_rows().try_collect().await?;

        Ok(TableResponse {
            draw: state.draw(),
            records_total,
            records_filtered,
            data,
        })
    }
}

impl std::fmt::Debug for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grid")
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .finish()
    }
}
