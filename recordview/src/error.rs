use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordViewError {
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Invalid filter rule on '{field}': {reason}")]
    InvalidRule { field: String, reason: String },

    #[error("Invalid page size: {0} (must be greater than zero)")]
    InvalidPageSize(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RecordViewError>;
