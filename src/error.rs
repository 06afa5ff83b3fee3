use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("{source_name}: missing required columns {missing:?} (found {found:?})")]
    Schema {
        source_name: String,
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("Sheet '{0}' not found in workbook")]
    MissingSheet(String),

    #[error("Roster source has no usable promoter rows")]
    EmptyRoster,

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::XlsxError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
