use thiserror::Error;

/// Reasons a datagram could not be turned into a reading.
///
/// Both variants are local to a single datagram: the offending packet is
/// dropped and nothing else is affected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid numeric value for {field}: {value:?}")]
    InvalidNumeric { field: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
