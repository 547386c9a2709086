//! Document managers: metadata plus the store that holds the documents.

use std::fmt;
use std::sync::Arc;

use crate::metadata::{DocumentMetadata, MetadataProvider};
use crate::query::QueryBuilder;
use crate::store::DocumentStore;

pub struct DocumentManager {
    metadata: Arc<dyn MetadataProvider>,
    store: Arc<dyn DocumentStore>,
}

impl DocumentManager {
    pub fn new(metadata: Arc<dyn MetadataProvider>, store: Arc<dyn DocumentStore>) -> Self {
        Self { metadata, store }
    }

    pub fn metadata(&self) -> &dyn MetadataProvider {
        self.metadata.as_ref()
    }

    pub fn metadata_for(&self, document: &str) -> Option<Arc<DocumentMetadata>> {
        self.metadata.metadata_for(document)
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Fresh query builder scoped to `document`.
    pub fn create_query_builder(&self, document: &str) -> QueryBuilder {
        QueryBuilder::new(Arc::clone(&self.store), document)
    }
}

impl fmt::Debug for DocumentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentManager").finish_non_exhaustive()
    }
}

/// Finds the manager responsible for a document type.
pub trait ManagerRegistry: Send + Sync {
    fn manager_for(&self, document: &str) -> Option<Arc<DocumentManager>>;
}

/// Registry over a fixed list of managers; the first one that knows the
/// document wins.
#[derive(Debug, Default, Clone)]
pub struct StaticRegistry {
    managers: Vec<Arc<DocumentManager>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(manager: Arc<DocumentManager>) -> Self {
        Self::new().with_manager(manager)
    }

    pub fn with_manager(mut self, manager: Arc<DocumentManager>) -> Self {
        self.managers.push(manager);
        self
    }
}

impl ManagerRegistry for StaticRegistry {
    fn manager_for(&self, document: &str) -> Option<Arc<DocumentManager>> {
        self.managers
            .iter()
            .find(|m| m.metadata_for(document).is_some())
            .cloned()
    }
}
