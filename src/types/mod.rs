//! Shared identifiers, link records and the crate-wide error type.

use std::fmt;

/// Identifier of a link. Ids start at 1; 0 never names a stored link.
pub type LinkId = u64;

/// A stored doublet: an id and the two links it references.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Link {
    /// Id of this link.
    pub id: LinkId,
    /// Referenced link on the left side.
    pub source: LinkId,
    /// Referenced link on the right side.
    pub target: LinkId,
}

impl Link {
    /// Creates a link value.
    pub const fn new(id: LinkId, source: LinkId, target: LinkId) -> Self {
        Self { id, source, target }
    }

    /// Returns true for self-loops, the atoms of the store.
    pub const fn is_point(&self) -> bool {
        self.source == self.id && self.target == self.id
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}: {} -> {})", self.id, self.source, self.target)
    }
}

/// Errors raised by the store and everything layered on top of it.
#[derive(thiserror::Error, Debug)]
pub enum DoubletError {
    /// Underlying file or mapping failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// On-disk structures failed validation.
    #[error("corruption: {0}")]
    Corruption(String),
    /// Caller supplied an argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    Invalid(String),
    /// The referenced link does not exist.
    #[error("link {0} not found")]
    NotFound(LinkId),
    /// A reserved point was not found at its fixed address.
    #[error("{name} allocated at {actual}, expected {expected}")]
    MarkerMismatch {
        /// Human-readable marker name.
        name: &'static str,
        /// Address the marker must occupy.
        expected: LinkId,
        /// Address the store produced.
        actual: LinkId,
    },
    /// The store was released and can no longer be used.
    #[error("link store has been disposed")]
    Disposed,
    /// The store cannot grow any further.
    #[error("capacity exhausted: {0}")]
    Capacity(&'static str),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, DoubletError>;

impl DoubletError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        DoubletError::Invalid(message.into())
    }

    pub(crate) fn corruption(message: impl Into<String>) -> Self {
        DoubletError::Corruption(message.into())
    }
}
