mod builder;
mod predicate;

pub use builder::{Join, JoinKind, Query, QueryBuilder};
pub use predicate::{Operator, Predicate, SortDirection};
