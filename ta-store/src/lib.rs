//! Trusted Application stores.
//!
//! A store backend hands out TA images as strictly sequential byte streams:
//! there is no seek, only "copy the next `n` bytes" or "discard the next `n`
//! bytes". Several backends can be registered with a priority; a lookup tries
//! them in order until one of them knows the requested TA.
//!
//! # Usage
//!
//! ```
//! use ta_store::{MemoryStore, ReadMode, StoreRegistry};
//! use tee_core::TaUuid;
//!
//! static IMAGE: [u8; 8] = *b"TA bytes";
//! let uuid = TaUuid::new(1, 2, 3, [4; 8]);
//!
//! let mut registry = StoreRegistry::new();
//! registry.register(10, MemoryStore::new("early TA").with_image(uuid, &IMAGE));
//!
//! let mut handle = registry.lookup(&uuid).unwrap();
//! assert_eq!(handle.size().unwrap(), 8);
//!
//! let mut buf = [0u8; 2];
//! handle.read(ReadMode::Copy(&mut buf)).unwrap();
//! handle.read(ReadMode::Skip(6)).unwrap();
//! assert_eq!(&buf, b"TA");
//! assert_eq!(handle.consumed(), 8);
//! handle.close();
//! ```
#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc)]

extern crate alloc;

mod error;
mod handle;
mod mem;
mod registry;

pub use error::StoreError;
pub use handle::{ReadMode, StoreHandle, TaStore, TaStoreHandle};
pub use mem::MemoryStore;
pub use registry::StoreRegistry;

/// Result type for store operations
pub type StoreResult<T> = core::result::Result<T, StoreError>;
