//! Query construction for server-side document tables
//!
//! Turns a table request (paging, ordering, global and per-column search)
//! into a single document-store query with joins and projections derived
//! from the table's column paths.

pub mod adapter;
pub mod automatic;
pub mod column;
pub mod criteria;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod processor;
pub mod query;
pub mod resolver;
pub mod state;
pub mod store;

pub use adapter::{AdapterOptions, AdapterQuery, OdmAdapter, Phase, ResultSet};
pub use automatic::AutomaticQueryBuilder;
pub use column::{Coercion, Column, ColumnFilter};
pub use criteria::SearchCriteriaProvider;
pub use error::*;
pub use manager::{DocumentManager, ManagerRegistry, StaticRegistry};
pub use metadata::{Association, AssociationKind, DocumentMetadata, MetadataProvider, MetadataRegistry};
pub use processor::{normalize, Processor, ProcessorContext, ProcessorRegistry, ProcessorSpec, QueryProcessor};
pub use query::{Join, JoinKind, Operator, Predicate, Query, QueryBuilder, SortDirection};
pub use resolver::{JoinEntry, JoinPlan};
pub use state::{ColumnParams, OrderParams, SearchParams, TableRequest, TableState};
pub use store::{lookup, Document, DocumentStore, DocumentStream, MemoryStore};
