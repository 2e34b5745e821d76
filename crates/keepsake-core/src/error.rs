use thiserror::Error;

/// Whole-run failures. Per-file and per-subtree problems never surface here;
/// they are collected as warnings in the run report.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Export error: {0}")]
    Export(#[from] csv::Error),

    #[error("Plan record error: {0}")]
    Record(#[from] serde_json::Error),

    #[error("Audit failed: {0}")]
    Audit(String),

    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Cache(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Cache(err.to_string())
    }
}
