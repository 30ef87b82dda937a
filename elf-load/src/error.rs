//! Error types for TA loading.
use ta_store::StoreError;
use tee_core::TeeResult;
use thiserror::Error;
use xmas_elf::{header, program};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
/// Reasons for rejecting a TA image.
pub enum FormatError {
    #[error("Image is shorter than its headers")]
    Truncated,
    #[error("Bad ELF magic")]
    BadMagic,
    #[error("Unsupported ELF class")]
    UnsupportedClass,
    #[error("Unsupported data encoding")]
    UnsupportedEncoding,
    #[error("Unsupported ELF version")]
    UnsupportedVersion,
    #[error("Unsupported ELF type {0:?}")]
    UnsupportedType(header::Type),
    #[error("Unsupported machine {0:?}")]
    UnsupportedMachine(header::Machine),
    #[error("ELF header size {0} does not match the ELF class")]
    HeaderSize(u16),
    #[error("Program header size {0} does not match the ELF class")]
    ProgramHeaderSize(u16),
    #[error("Unsupported program header count {0}")]
    SegmentCount(u16),
    #[error("Program header table overlaps the ELF header")]
    TableOverlapsHeader,
    #[error("Program header table is not aligned for its class")]
    MisalignedTable,
    #[error("Program header table exceeds the image")]
    TableOutOfBounds,
    #[error("ELF headers exceed the configured limit")]
    HeadersTooLarge,
    #[error("Segment type {0:?} is not supported")]
    UnsupportedSegment(program::Type),
    #[error("Segment memory size is smaller than its file size")]
    MemSizeBelowFileSize,
    #[error("Segment data exceeds the image")]
    SegmentOutOfBounds,
    #[error("Invalid segment alignment {0:#x}")]
    BadAlignment(u64),
    #[error("Segment address overflows")]
    AddressOverflow,
    #[error("Segment address is beyond the address space")]
    AddressOutOfRange,
    #[error("Segments overlap in the file")]
    FileOverlap,
    #[error("Segments overlap in memory")]
    MemoryOverlap,
    #[error("Image has no loadable segment")]
    NoLoadableSegment,
    #[error("Entry point is outside the image")]
    EntryOutOfRange,
    #[error("TA head does not match the requested UUID")]
    UuidMismatch,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
/// Loader operations called with bad arguments or out of order.
pub enum UsageError {
    #[error("Store handle is closed")]
    HandleClosed,
    #[error("Invalid loader configuration")]
    BadConfig,
    #[error("Headers have not been parsed")]
    HeadNotParsed,
    #[error("Headers were already parsed")]
    HeadAlreadyParsed,
    #[error("Body was already loaded")]
    BodyAlreadyLoaded,
    #[error("A previous step failed")]
    Poisoned,
    #[error("Load state is finalized")]
    Finalized,
    #[error("Destination range overflows the address space")]
    BadDestination,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
/// Errors that can occur while loading a TA.
pub enum LoadError {
    /// No store could open the requested TA
    #[error("TA not found")]
    NotFound,
    /// A store failed, independently of the image content
    #[error("TA store error: {0}")]
    Store(StoreError),
    /// The image is corrupted or malicious
    #[error("Malformed TA image: {0}")]
    Malformed(#[from] FormatError),
    /// Allocation of internal state or buffers failed
    #[error("Out of memory")]
    OutOfMemory,
    /// The loader was misused
    #[error("Invalid usage: {0}")]
    InvalidUsage(#[from] UsageError),
    /// The destination address space rejected an operation
    #[error("Address space operation failed")]
    Mapping,
}

impl LoadError {
    #[must_use]
    #[inline]
    /// Whether the image itself is at fault.
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

impl From<StoreError> for LoadError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => Self::NotFound,
            StoreError::OutOfMemory => Self::OutOfMemory,
            other => Self::Store(other),
        }
    }
}

impl From<LoadError> for TeeResult {
    fn from(error: LoadError) -> Self {
        match error {
            LoadError::NotFound => Self::ItemNotFound,
            LoadError::Store(store) => store.into(),
            LoadError::Malformed(FormatError::UuidMismatch) => Self::Security,
            LoadError::Malformed(_) => Self::BadFormat,
            LoadError::OutOfMemory => Self::OutOfMemory,
            LoadError::InvalidUsage(UsageError::BadConfig | UsageError::BadDestination) => {
                Self::BadParameters
            }
            LoadError::InvalidUsage(_) => Self::BadState,
            LoadError::Mapping => Self::Generic,
        }
    }
}
