use thiserror::Error;

#[derive(Error, Debug)]
pub enum StampError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Failed to read {path}: {reason}")]
    UnreadableDocument { path: String, reason: String },

    #[error("Page {page}: missing or malformed {box_name}")]
    MissingPageBox { page: u32, box_name: String },

    #[error("Page {page}: no declared range covers this page")]
    UnresolvablePosition { page: u32 },

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Failed to write output: {0}")]
    WriteFailure(String),
}
