use thiserror::Error;

/// Per-read failures raised while decoding alignments or building pileup elements.
///
/// None of these leave shared state behind: the caller decides whether to drop
/// the offending read or abort the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PileupError {
    /// The requested position lies outside the read's aligned span, or an
    /// adjacent indel event runs past the read's last base.
    #[error("Malformed alignment: {0}")]
    MalformedAlignment(String),

    /// A pileup element was requested for a deletion with a negative offset.
    #[error("Invalid pileup element: {0}")]
    InvalidConstruction(String),

    /// The cursor was asked to move backwards.
    #[error("Unsupported query: position {requested} precedes last resolved position {last}")]
    UnsupportedQuery { requested: i64, last: i64 },

    /// CIGAR text, packed CIGAR values, or auxiliary tags could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, PileupError>;
