//! Core vocabulary shared by the TA store and the ELF loader.
//!
//! Nothing in here performs I/O: these are the address, identifier and
//! result types that travel between the store backends, the loader state
//! machine and the rest of the TEE kernel.
#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::doc_markdown)]

pub mod addr;
pub mod range;
pub mod result;
pub mod ta_head;
pub mod uuid;

pub use addr::{VirtAddr, align_down, align_up};
pub use range::MemoryRange;
pub use result::TeeResult;
pub use ta_head::{TA_HEAD_SIZE, TaFlags, TaHead, TaHeadError};
pub use uuid::TaUuid;

#[macro_export]
macro_rules! static_assert {
    ($condition:expr $(, $($arg:tt)+)?) => {
        const _: () = assert!($condition $(, $($arg)+)?);
    };
}
