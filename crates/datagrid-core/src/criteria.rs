//! Search criteria: per-column filters and the global search.

use tracing::trace;

use crate::error::{GridError, Result};
use crate::processor::QueryProcessor;
use crate::query::{Operator, Predicate, QueryBuilder};
use crate::state::TableState;

/// Default criteria processor.
///
/// Per-column terms become AND predicates, but only on columns that declare
/// a filter. A global term becomes one OR group of case-insensitive prefix
/// matches over every globally searchable column that has a field path.
#[derive(Debug, Default, Clone)]
pub struct SearchCriteriaProvider;

impl SearchCriteriaProvider {
    pub fn new() -> Self {
        Self
    }

    fn process_search_columns(&self, builder: &mut QueryBuilder, state: &TableState) -> Result<()> {
        let root_alias = builder.query().root_alias();
        for (column, search) in state.search_columns() {
            if search.is_empty() {
                continue;
            }
            let Some(filter) = column.filter() else {
                continue;
            };
            let Some(field) = column.field_path(&root_alias) else {
                continue;
            };
            let value = filter
                .coercion
                .coerce(search)
                .map_err(|reason| GridError::InvalidSearchTerm {
                    column: column.name().to_string(),
                    term: search.to_string(),
                    reason,
                })?;
            trace!(column = column.name(), operator = %filter.operator, "column search");
            builder.add_and(Predicate::new(field, filter.operator, value));
        }
        Ok(())
    }

    fn process_global_search(&self, builder: &mut QueryBuilder, state: &TableState) {
        let search = state.global_search();
        if search.is_empty() {
            return;
        }
        let root_alias = builder.query().root_alias();
        let group: Vec<Predicate> = state
            .columns()
            .iter()
            .filter(|c| c.is_global_searchable())
            .filter_map(|c| c.field_path(&root_alias))
            .map(|field| Predicate::new(field, Operator::StartsWith, search))
            .collect();

        if group.is_empty() {
            trace!("no globally searchable column, global search skipped");
            return;
        }
        builder.add_or_group(group);
    }
}

impl QueryProcessor for SearchCriteriaProvider {
    fn process(&self, builder: &mut QueryBuilder, state: &TableState) -> Result<()> {
        self.process_search_columns(builder, state)?;
        self.process_global_search(builder, state);
        Ok(())
    }
}
