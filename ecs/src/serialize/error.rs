//! Error types for scene serialization and deserialization.

use thiserror::Error;

/// Errors surfaced by the scene codecs.
///
/// Everything here is recoverable at the "load a scene" call boundary: the
/// loader rolls back any partially created entities before returning one of
/// these. Storage-level bounds violations are not represented; those are
/// fatal by design.
#[derive(Debug, Error)]
pub enum SceneError {
    /// Malformed scene text.
    #[error("parse error at line {line}: {message}")]
    Parse { line: u32, message: String },

    /// A scene referenced a component type name with no registration.
    #[error("unknown component type '{name}'")]
    UnknownComponent { name: String },

    /// A binary scene referenced a dense type id outside the registered range.
    #[error("unknown binary component type id {id}")]
    UnknownTypeId { id: u32 },

    /// The binary buffer ended before the decoder was done.
    #[error("unexpected end of binary scene data at offset {offset}")]
    Truncated { offset: usize },

    /// Underlying file I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SceneError {
    pub(crate) fn parse(line: u32, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
