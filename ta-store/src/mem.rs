//! A store serving TA images that already live in memory, such as TAs
//! embedded in the kernel image for early boot.
use crate::{ReadMode, StoreError, StoreResult, TaStore, TaStoreHandle};
use alloc::{boxed::Box, vec::Vec};
use tee_core::TaUuid;

#[derive(Debug, Clone)]
pub struct MemoryStore<'a> {
    description: &'a str,
    images: Vec<(TaUuid, &'a [u8])>,
}

impl<'a> MemoryStore<'a> {
    #[must_use]
    #[inline]
    pub const fn new(description: &'a str) -> Self {
        Self {
            description,
            images: Vec::new(),
        }
    }

    #[must_use]
    #[inline]
    pub fn with_image(mut self, uuid: TaUuid, image: &'a [u8]) -> Self {
        self.insert(uuid, image);
        self
    }

    /// Adds an image, replacing any previous image with the same UUID.
    pub fn insert(&mut self, uuid: TaUuid, image: &'a [u8]) {
        if let Some(slot) = self.images.iter_mut().find(|(id, _)| *id == uuid) {
            slot.1 = image;
        } else {
            self.images.push((uuid, image));
        }
    }
}

impl TaStore for MemoryStore<'_> {
    fn description(&self) -> &str {
        self.description
    }

    fn open(&self, uuid: &TaUuid) -> StoreResult<Box<dyn TaStoreHandle + '_>> {
        let &(_, data) = self
            .images
            .iter()
            .find(|(id, _)| id == uuid)
            .ok_or(StoreError::NotFound)?;
        Ok(Box::new(MemoryHandle {
            data,
            offset: 0,
        }))
    }
}

struct MemoryHandle<'a> {
    data: &'a [u8],
    offset: usize,
}

impl TaStoreHandle for MemoryHandle<'_> {
    fn size(&self) -> StoreResult<usize> {
        Ok(self.data.len())
    }

    fn read(&mut self, mode: ReadMode<'_>) -> StoreResult<()> {
        let end = self
            .offset
            .checked_add(mode.len())
            .filter(|&end| end <= self.data.len())
            .ok_or(StoreError::OutOfRange)?;

        if let ReadMode::Copy(buf) = mode {
            buf.copy_from_slice(&self.data[self.offset..end]);
        }
        self.offset = end;

        if self.offset == self.data.len() {
            log::trace!("Embedded TA fully consumed ({} bytes)", self.offset);
        }
        Ok(())
    }
}
