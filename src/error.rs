//! Error taxonomy shared across the whole decoding/encoding pipeline.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("binary framing error: {0}")]
    Binrw(#[from] binrw::Error),

    #[error("table lookup failed for descriptor {id}")]
    TableLookup { id: u32 },

    #[error("parse error at position {position}: {reason}")]
    Parse { reason: String, position: usize },

    #[error("unit mismatch: expected {expected}, got {got} ({value_preview})")]
    UnitMismatch {
        expected: &'static str,
        got: &'static str,
        value_preview: String,
    },

    #[error("read past section boundary by {overshoot_bits} bits")]
    OutOfSectionBoundary { overshoot_bits: i64 },

    #[error("inconsistent compression: {which}")]
    InconsistentCompression { which: String },

    #[error("bitmap bit count ({bits}) does not match candidate target nodes ({candidates})")]
    BitmapBitsMismatch { bits: usize, candidates: usize },

    #[error("unsupported: {what}")]
    Unsupported { what: String },

    #[error("template lint failed: {0}")]
    Lint(String),

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl Error {
    pub fn parse(reason: impl Into<String>, position: usize) -> Self {
        Error::Parse {
            reason: reason.into(),
            position,
        }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Error::Unsupported { what: what.into() }
    }

    pub fn lint(message: impl Into<String>) -> Self {
        Error::Lint(message.into())
    }
}
