use thiserror::Error;

/// Crate-wide error type. Library functions that hit a skippable data condition (see
/// the gate steps in the fragment builder and gap realigner) return `bool`/`Option`,
/// not `Err` -- this type is reserved for conditions the caller cannot proceed past.
#[derive(Error, Debug, Clone)]
pub enum BirdToolError {
    #[error("Invalid clip operation: {0}")]
    InvalidClip(String),

    #[error("Invalid genomic location: {0}")]
    InvalidLocation(String),

    #[error("Cigar builder error: {0}")]
    CigarBuilderError(String),

    #[error("Invalid cigar: {0}")]
    InvalidCigar(String),

    #[error("Reference position out of bounds: contig {contig} position {position}")]
    ReferenceOutOfBounds { contig: usize, position: i64 },

    #[error("Invalid adapter definition: {0}")]
    InvalidAdapter(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Debug assertion failure: {0}")]
    DebugError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for BirdToolError {
    fn from(e: std::io::Error) -> Self {
        BirdToolError::IoError(e.to_string())
    }
}
