use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("{source_name} is missing required column(s): {columns}")]
    MissingColumns { source_name: String, columns: String },
    #[error("CSV_INVALID: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid timestamp '{0}', expected RFC 3339 (e.g. 2024-06-01T12:00:00Z)")]
    InvalidTimestamp(String),
}
