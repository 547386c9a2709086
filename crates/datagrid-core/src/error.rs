//! Error types for datagrid core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown field `{field}` on document `{document}`")]
    UnknownField { document: String, field: String },

    #[error("Unknown association `{association}` on document `{document}`")]
    UnknownAssociation { document: String, association: String },

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid search term `{term}` for column `{column}`: {reason}")]
    InvalidSearchTerm {
        column: String,
        term: String,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Execution error: {0}")]
    Execution(String),
}

impl GridError {
    /// Path resolution failures are raised while configuring a column.
    pub fn is_path_resolution(&self) -> bool {
        matches!(
            self,
            GridError::UnknownField { .. } | GridError::UnknownAssociation { .. }
        )
    }

    /// Short stable label, used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GridError::InvalidConfiguration(_) => "invalid_configuration",
            GridError::UnknownField { .. } => "unknown_field",
            GridError::UnknownAssociation { .. } => "unknown_association",
            GridError::MissingDependency(_) => "missing_dependency",
            GridError::InvalidRequest(_) => "invalid_request",
            GridError::InvalidSearchTerm { .. } => "invalid_search_term",
            GridError::Serialization(_) => "serialization",
            GridError::Execution(_) => "execution",
        }
    }
}

pub type Result<T> = std::result::Result<T, GridError>;

impl From<anyhow::Error> for GridError {
    fn from(err: anyhow::Error) -> Self {
        GridError::Execution(format!("{err:#}"))
    }
}
