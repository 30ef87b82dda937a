//! `TEE_Result` codes reported at the kernel boundary.
use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
/// The subset of `TEE_Result` codes the TA loading path can produce.
pub enum TeeResult {
    Success = 0x0000_0000,
    CorruptObject = 0xF010_0001,
    StorageNotAvailable = 0xF010_0003,
    Generic = 0xFFFF_0000,
    AccessDenied = 0xFFFF_0001,
    BadFormat = 0xFFFF_0005,
    BadParameters = 0xFFFF_0006,
    BadState = 0xFFFF_0007,
    ItemNotFound = 0xFFFF_0008,
    NotSupported = 0xFFFF_000A,
    OutOfMemory = 0xFFFF_000C,
    Security = 0xFFFF_000F,
    Overflow = 0xFFFF_300F,
}

impl TeeResult {
    #[must_use]
    #[inline]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}
