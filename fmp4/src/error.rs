use std::io;

use crate::{fourcc_str, FourCC};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to write box: {0}")]
    IoError(#[from] io::Error),

    #[error("Buffer overflow: need {need} bytes, {remaining} remaining")]
    BufferOverflow { need: u64, remaining: u64 },

    #[error("Truncated {name}: need {need} bytes, have {have}")]
    Truncated { name: String, need: u64, have: u64 },

    #[error("Invalid {name} box: {reason}")]
    InvalidBox { name: String, reason: String },

    #[error("Missing {name} box in {parent}")]
    MissingBox {
        name: &'static str,
        parent: &'static str,
    },

    #[error("Unexpected {name} box: {context}")]
    UnexpectedBox { name: String, context: &'static str },

    #[error("{name}: {source}")]
    InBox { name: String, source: Box<Error> },

    #[error("fragment {index}: {source}")]
    InFragment { index: usize, source: Box<Error> },

    #[error("trex not set")]
    MissingDefaults,

    #[error("different common sample duration in fragment {fragment} ({found}, expected {expected})")]
    DurationMismatch {
        fragment: usize,
        expected: u32,
        found: u32,
    },

    #[error("No common sample duration: {0}")]
    NoCommonDuration(String),

    #[error("no boxes in segment")]
    NoBoxes,

    #[error("No track fragment for track {0}")]
    TrackNotFound(u32),

    #[error("Sample data out of range: {size} bytes at offset {offset}, mdat holds {available}")]
    SampleDataOutOfRange {
        offset: u64,
        size: u64,
        available: u64,
    },

    #[error("Track {0} cannot take samples after a later track fragment has data")]
    InterleavedTrackData(u32),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Invalid info levels '{0}'")]
    InvalidInfoLevels(String),
}

impl Error {
    pub(crate) fn in_box(self, name: &FourCC) -> Self {
        Error::InBox {
            name: fourcc_str(name),
            source: Box::new(self),
        }
    }

    /// `index` is the zero-based position; messages use one-based numbering.
    pub(crate) fn in_fragment(self, index: usize) -> Self {
        Error::InFragment {
            index: index + 1,
            source: Box::new(self),
        }
    }

    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Error::InvalidBox {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Strips `InBox`/`InFragment` context wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::InBox { source, .. } | Error::InFragment { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
