use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spreadsheet read error: {0}")]
    Read(#[from] calamine::Error),

    #[error("Spreadsheet write error: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),

    #[error("Spreadsheet edit error: {0}")]
    Edit(#[from] umya_spreadsheet::XlsxError),

    #[error("Only .xlsx workbooks can be marked in place: {0}")]
    UnsupportedFormat(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Not enough columns: found {found}, need at least {required}")]
    InsufficientColumns { found: usize, required: usize },

    #[error("No valid records to export")]
    NoData,

    #[error("No .xlsx file found in {0}")]
    NoWorkbook(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
