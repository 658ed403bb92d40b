use crate::schema::CanonicalField;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SalesForecastError {
    #[error("Required columns could not be resolved: {}", join_fields(.missing))]
    SchemaError { missing: Vec<CanonicalField> },

    #[error("No valid rows remain after coercion ({total_rows} rows read)")]
    EmptyDataset { total_rows: usize },

    #[error("Forecasting needs at least {required} distinct dates, got {distinct_dates}")]
    InsufficientHistory {
        distinct_dates: usize,
        required: usize,
    },

    #[error("Invalid sales target {0}: must be greater than zero")]
    InvalidTarget(f64),

    #[error("Numeric overflow: {0}")]
    NumericOverflow(String),

    #[error("Model fitting exceeded the {timeout_ms} ms budget")]
    FitTimeout { timeout_ms: u64 },

    #[error("Forecast model error: {0}")]
    ModelError(String),

    #[error("Unsupported table format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

fn join_fields(fields: &[CanonicalField]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, SalesForecastError>;
