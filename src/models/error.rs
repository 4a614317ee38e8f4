use thiserror::Error;

/// Custom error types for the label / box-mark toolkit
#[derive(Error, Debug)]
pub enum LabelBoxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Sheet not found: {0}")]
    SheetMissing(String),

    #[error("Template directory not found: {0}")]
    TemplateDirMissing(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Product-code mapping error: {0}")]
    Mapping(String),

    #[error("Reservation table error: {0}")]
    Reservation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// The UI boundary only deals in strings
impl From<LabelBoxError> for String {
    fn from(err: LabelBoxError) -> String {
        err.to_string()
    }
}
