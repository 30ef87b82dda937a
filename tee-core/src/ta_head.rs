//! The TA head, a fixed-size descriptor that precedes the ELF image.
//!
//! Layout (native byte order, 32 bytes):
//! ```text
//! +----------------------+  offset 0
//! | uuid (16 bytes)      |  `TEE_UUID` struct layout
//! +----------------------+  offset 16
//! | stack_size (u32)     |
//! +----------------------+  offset 20
//! | flags (u32)          |
//! +----------------------+  offset 24
//! | depr_entry (u64)     |  unused, kept for layout compatibility
//! +----------------------+  offset 32
//! ```
use crate::uuid::TaUuid;
use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Size in bytes of an encoded [`TaHead`].
pub const TA_HEAD_SIZE: usize = 32;

crate::static_assert!(size_of::<TaHead>() == TA_HEAD_SIZE);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TaHeadError {
    #[error("TA head is shorter than 32 bytes")]
    TooShort,
}

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
#[repr(transparent)]
/// Properties a TA requests from the TEE core.
pub struct TaFlags(u32);

bitflags::bitflags! {
    impl TaFlags: u32 {
        /// At most one instance of the TA exists at a time
        const SINGLE_INSTANCE = 1 << 2;
        /// Sessions share the single instance
        const MULTI_SESSION = 1 << 3;
        /// The instance outlives its last session
        const INSTANCE_KEEP_ALIVE = 1 << 4;
        const SECURE_DATA_PATH = 1 << 5;
        const CACHE_MAINTENANCE = 1 << 7;
        const CONCURRENT = 1 << 8;
        const DEVICE_ENUM = 1 << 9;
        const DEVICE_ENUM_SUPP = 1 << 10;
        const DONT_CLOSE_HANDLE_ON_CORRUPT_OBJECT = 1 << 11;
        const DEVICE_ENUM_TEE_STORAGE_PRIVATE = 1 << 12;
        /// A crashed keep-alive instance is not restarted
        const INSTANCE_KEEP_CRASHED = 1 << 13;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct TaHead {
    pub uuid: TaUuid,
    pub stack_size: u32,
    pub flags: TaFlags,
    pub depr_entry: u64,
}

impl TaHead {
    /// Decodes a TA head from the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self, TaHeadError> {
        Self::read_from_prefix(data)
            .map(|(head, _)| head)
            .map_err(|_| TaHeadError::TooShort)
    }
}
