use std::fmt;

/// Errors produced while decoding or encoding a SIR0 container.
#[derive(Debug, thiserror::Error)]
pub enum Sir0Error {
    /// The buffer does not start with the `SIR0` magic tag.
    #[error("bad magic {found:02x?}, expected \"SIR0\"")]
    BadMagic { found: [u8; 4] },

    /// The container layout is inconsistent (truncated header, pointer list
    /// running past the buffer, a pointed address with no known boundary).
    #[error("container format error at {offset:#x}: {reason}")]
    Format { offset: usize, reason: String },

    /// A pointer or reference field landed at an offset that is not a
    /// multiple of the pointer width. The offset is relative to the start
    /// of the enclosing struct; its absolute position is not yet known
    /// when the check runs.
    #[error("pointer at struct-relative offset {offset:#x} is not {width}-byte aligned")]
    Alignment { offset: usize, width: usize },

    /// A `<reference ref=..>` names an id no struct in the tree defines.
    #[error("unresolved reference id '{id}'")]
    UnresolvedReference { id: String },

    /// The schema grammar and the byte stream disagree: unresolvable type
    /// name, unexpected field tag, or a data run whose consumed bytes do not
    /// match its extent.
    #[error("schema error: {0}")]
    Schema(String),

    /// The XML interchange text could not be parsed or written.
    #[error("xml error: {0}")]
    Xml(String),
}

impl Sir0Error {
    pub(crate) fn format(offset: usize, reason: impl fmt::Display) -> Self {
        Sir0Error::Format {
            offset,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn schema(reason: impl fmt::Display) -> Self {
        Sir0Error::Schema(reason.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Sir0Error>;
