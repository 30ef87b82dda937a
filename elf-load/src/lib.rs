//! Streaming ELF loader for Trusted Applications.
//!
//! TA images are read from a [`ta_store`] handle, which only moves forward.
//! The loader therefore validates every header before touching segment data,
//! then copies the segments in file order with a single pass over the image.
//!
//! # Usage
//!
//! [`ElfLoadState`] exposes the individual steps. [`TaLoader`] chains them
//! for a TA laid out as a [`tee_core::TaHead`] followed by an ELF image.
//!
//! ```rust
//! use elf_load::{ElfLoadState, LoaderConfig, PrefixMode, SliceTarget, VirtAddr};
//! use ta_store::{MemoryStore, StoreHandle};
//! use tee_core::TaUuid;
//!
//! let uuid = TaUuid::new(1, 2, 3, [4; 8]);
//! let image: &[u8] = &[/* TA image */];
//! let store = MemoryStore::new("embedded").with_image(uuid, image);
//!
//! let handle = StoreHandle::open(&store, &uuid).unwrap();
//! let mut state = ElfLoadState::init(handle, LoaderConfig::default()).unwrap();
//!
//! match state.head(0, PrefixMode::Skip) {
//!     Ok(info) => {
//!         let base = VirtAddr::new(0x4000_0000);
//!         let mut memory = vec![0u8; info.vasize];
//!         let mut target = SliceTarget::new(base, &mut memory);
//!         state.body(base, &mut target).unwrap();
//!     }
//!     Err(err) => {
//!         // The image was rejected before any segment was read
//!         assert!(err.is_malformed());
//!     }
//! }
//! state.finalize();
//! ```
#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc)]

extern crate alloc;

mod config;
mod copier;
mod error;
mod header;
mod layout;
mod loader;
mod program;
mod segments;
mod state;
pub mod target;

use alloc::vec::Vec;
use zerocopy::IntoBytes;

pub use config::LoaderConfig;
pub use error::{FormatError, LoadError, UsageError};
pub use header::ElfClass;
pub use loader::{LoadedTa, TaLoader};
pub use program::{SegmentFlags, SegmentKind};
pub use segments::{Segment, Segments};
pub use state::{ElfLoadState, HeadInfo, Phase, PrefixMode};
pub use target::{AddressSpace, LoadTarget, SliceTarget, VirtAddr};
pub use xmas_elf::header::Machine;

/// Result type for TA loading operations
pub type Result<T> = core::result::Result<T, LoadError>;

/// Allocates an empty vector, failing gracefully if memory is short.
fn try_vec_with_capacity<T>(capacity: usize) -> Result<Vec<T>> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(capacity)
        .map_err(|_| LoadError::OutOfMemory)?;
    Ok(vec)
}

/// Allocates a zeroed buffer, failing gracefully if memory is short.
fn try_zeroed_vec(len: usize) -> Result<Vec<u8>> {
    let mut vec = try_vec_with_capacity(len)?;
    vec.resize(len, 0);
    Ok(vec)
}

#[derive(Debug, Default)]
/// Byte buffer aligned for in-place decoding of ELF structures.
struct AlignedBuf {
    words: Vec<u64>,
    len: usize,
}

impl AlignedBuf {
    fn try_zeroed(len: usize) -> Result<Self> {
        let count = len.div_ceil(size_of::<u64>());
        let mut words = try_vec_with_capacity(count)?;
        words.resize(count, 0);
        Ok(Self { words, len })
    }

    fn bytes(&self) -> &[u8] {
        &self.words.as_bytes()[..self.len]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut self.words.as_mut_bytes()[..len]
    }
}
