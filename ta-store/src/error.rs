use tee_core::TeeResult;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
/// An error reported by a TA store backend.
pub enum StoreError {
    #[error("TA not found")]
    NotFound,
    #[error("Storage not available")]
    NotAvailable,
    #[error("I/O error")]
    Io,
    #[error("Stored TA is corrupted")]
    Corrupt,
    #[error("Read past the end of the TA")]
    OutOfRange,
    #[error("Handle is closed")]
    Closed,
    #[error("Out of memory")]
    OutOfMemory,
}

impl StoreError {
    #[must_use]
    #[inline]
    /// Whether the error means "this backend does not hold the TA", as opposed
    /// to a fault of the backend itself.
    pub const fn is_absent(self) -> bool {
        matches!(self, Self::NotFound | Self::NotAvailable)
    }
}

impl From<StoreError> for TeeResult {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => Self::ItemNotFound,
            StoreError::NotAvailable => Self::StorageNotAvailable,
            StoreError::Corrupt => Self::CorruptObject,
            StoreError::OutOfRange => Self::Overflow,
            StoreError::Closed => Self::BadState,
            StoreError::OutOfMemory => Self::OutOfMemory,
            StoreError::Io => Self::Generic,
        }
    }
}
