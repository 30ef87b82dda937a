//! Trusted Application identifiers (`TEE_UUID`).
use core::fmt;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
#[repr(C)]
/// A `TEE_UUID`, identifying a Trusted Application.
///
/// The layout matches the C structure, so a UUID embedded in a TA head can
/// be read in place.
pub struct TaUuid {
    pub time_low: u32,
    pub time_mid: u16,
    pub time_hi_and_version: u16,
    pub clock_seq_and_node: [u8; 8],
}

impl TaUuid {
    #[must_use]
    #[inline]
    pub const fn new(
        time_low: u32,
        time_mid: u16,
        time_hi_and_version: u16,
        clock_seq_and_node: [u8; 8],
    ) -> Self {
        Self {
            time_low,
            time_mid,
            time_hi_and_version,
            clock_seq_and_node,
        }
    }
}

impl fmt::Display for TaUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = &self.clock_seq_and_node;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.time_low,
            self.time_mid,
            self.time_hi_and_version,
            node[0],
            node[1],
            node[2],
            node[3],
            node[4],
            node[5],
            node[6],
            node[7],
        )
    }
}
