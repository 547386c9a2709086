//! Query processor that derives joins and projections from the table's columns.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, instrument};

use crate::column::Column;
use crate::error::Result;
use crate::manager::DocumentManager;
use crate::metadata::DocumentMetadata;
use crate::processor::QueryProcessor;
use crate::query::QueryBuilder;
use crate::resolver::JoinPlan;
use crate::state::TableState;

/// Resolves every column's field path against the root document and applies
/// the resulting joins and projections to each request's query.
///
/// The plan is computed once, either up front through [`plan_for`](Self::plan_for)
/// or from the first request's columns, and reused afterwards.
pub struct AutomaticQueryBuilder {
    manager: Arc<DocumentManager>,
    metadata: Arc<DocumentMetadata>,
    root_alias: String,
    plan: OnceCell<JoinPlan>,
}

impl AutomaticQueryBuilder {
    pub fn new(manager: Arc<DocumentManager>, metadata: Arc<DocumentMetadata>) -> Self {
        let root_alias = metadata.short_name();
        Self {
            manager,
            metadata,
            root_alias,
            plan: OnceCell::new(),
        }
    }

    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    /// Resolve the plan for a static column set ahead of the first request.
    pub fn plan_for(&self, columns: &[Column]) -> Result<&JoinPlan> {
        self.plan.get_or_try_init(|| self.build_plan(columns))
    }

    /// The resolved plan, if any request or `plan_for` has produced one.
    pub fn plan(&self) -> Option<&JoinPlan> {
        self.plan.get()
    }

    #[instrument(skip(self, columns), fields(document = %self.metadata.name))]
    fn build_plan(&self, columns: &[Column]) -> Result<JoinPlan> {
        let mut plan = JoinPlan::new(self.root_alias.clone());
        for column in columns {
            if let Some(field) = self.column_field(column) {
                plan.resolve(field, &self.metadata, self.manager.metadata())?;
            }
        }
        debug!(
            joins = plan.joins().len(),
            aliases = plan.projections().len(),
            "resolved column join plan"
        );
        Ok(plan)
    }

    /// Explicit field path, or the column name when it is a root field mapping.
    fn column_field<'c>(&self, column: &'c Column) -> Option<&'c str> {
        column
            .field()
            .or_else(|| self.metadata.has_field(column.name()).then_some(column.name()))
    }
}

impl QueryProcessor for AutomaticQueryBuilder {
    fn prepare(&self, columns: &[Column]) -> Result<()> {
        self.plan_for(columns).map(|_| ())
    }

    fn process(&self, builder: &mut QueryBuilder, state: &TableState) -> Result<()> {
        let plan = self.plan_for(state.columns())?;
        builder.scope_to(&self.metadata.name);
        plan.apply(builder);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GridError;
    use crate::metadata::{AssociationKind, MetadataProvider, MetadataRegistry};
    use crate::store::MemoryStore;

    fn setup() -> (Arc<DocumentManager>, Arc<DocumentMetadata>) {
        let registry = MetadataRegistry::new()
            .register(
                DocumentMetadata::new("App\\Document\\Book")
                    .with_fields(["title", "year"])
                    .with_association("author", "App\\Document\\Author", AssociationKind::ToOne),
            )
            .register(
                DocumentMetadata::new("App\\Document\\Author")
                    .with_fields(["name", "email"])
                    .with_association("address", "App\\Document\\Address", AssociationKind::ToOne),
            )
            .register(DocumentMetadata::new("App\\Document\\Address").with_field("city"));
        let metadata = registry.metadata_for("App\\Document\\Book").unwrap();
        let manager = Arc::new(DocumentManager::new(
            Arc::new(registry),
            Arc::new(MemoryStore::new()),
        ));
        (manager, metadata)
    }

    fn columns() -> Arc<[Column]> {
        vec![
            Column::new("title"),
            Column::new("author").with_field("author.name"),
            Column::new("email").with_field("book.author.email"),
            Column::new("city").with_field("author.address.city"),
            Column::new("actions"),
        ]
        .into()
    }

    #[test]
    fn test_process_applies_plan_and_scope() {
        let (manager, metadata) = setup();
        let automatic = AutomaticQueryBuilder::new(manager.clone(), metadata);
        assert_eq!(automatic.root_alias(), "book");

        let state = TableState::new(columns());
        let mut qb = manager.create_query_builder("App\\Document\\Book");
        automatic.process(&mut qb, &state).unwrap();

        let query = qb.query();
        assert_eq!(query.document(), "App\\Document\\Book");
        let joins: Vec<_> = query.joins().iter().map(|j| (j.key.as_str(), j.alias.as_str())).collect();
        assert_eq!(
            joins,
            vec![("book.author", "author"), ("author.address", "author_address")]
        );
        assert_eq!(
            query.projected_paths(),
            vec![
                "id",
                "title",
                "author.id",
                "author.name",
                "author.email",
                "author.address.id",
                "author.address.city",
            ]
        );
    }

    #[test]
    fn test_plan_is_computed_once() {
        let (manager, metadata) = setup();
        let automatic = AutomaticQueryBuilder::new(manager.clone(), metadata);
        let state = TableState::new(columns());

        for _ in 0..3 {
            let mut qb = manager.create_query_builder("App\\Document\\Book");
            automatic.process(&mut qb, &state).unwrap();
            assert_eq!(qb.query().joins().len(), 2);
        }

        // later column sets do not change a plan that is already resolved
        let other = TableState::new(Arc::from(vec![Column::new("year")]));
        let mut qb = manager.create_query_builder("App\\Document\\Book");
        automatic.process(&mut qb, &other).unwrap();
        assert_eq!(qb.query().joins().len(), 2);
    }

    #[test]
    fn test_unknown_path_fails_configuration() {
        let (manager, metadata) = setup();
        let automatic = AutomaticQueryBuilder::new(manager, metadata);
        let cols = vec![Column::new("publisher").with_field("publisher.name")];
        assert!(matches!(
            automatic.plan_for(&cols),
            Err(GridError::UnknownAssociation { .. })
        ));
        assert!(automatic.plan().is_none());
    }
}
