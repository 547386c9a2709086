//! Shared configuration and observability for datagrid

pub mod config;
pub mod observability;

pub use config::*;
pub use observability::*;
