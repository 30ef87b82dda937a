//! Streaming of segment contents from a store handle.
use crate::{
    LoadError, Result,
    error::{FormatError, UsageError},
    layout::LoadSegment,
    target::{LoadTarget, VirtAddr},
    try_zeroed_vec,
};
use alloc::vec::Vec;
use ta_store::StoreHandle;

/// Copies segments through a bounce buffer, reading the image exactly once.
///
/// `cursor` is the ELF offset of the next streamed byte. Bytes below
/// `retained.len()` were consumed while parsing the headers and are served
/// from memory instead.
pub(crate) struct SegmentCopier<'a, 's> {
    handle: &'a mut StoreHandle<'s>,
    cursor: &'a mut u64,
    retained: &'a [u8],
    scratch: Vec<u8>,
}

impl<'a, 's> SegmentCopier<'a, 's> {
    pub fn new(
        handle: &'a mut StoreHandle<'s>,
        cursor: &'a mut u64,
        retained: &'a [u8],
        scratch_size: usize,
    ) -> Result<Self> {
        Ok(Self {
            handle,
            cursor,
            retained,
            scratch: try_zeroed_vec(scratch_size)?,
        })
    }

    /// Writes one segment to `dest`, zero-filling the part past its file data.
    pub fn copy<T: LoadTarget + ?Sized>(
        &mut self,
        segment: &LoadSegment,
        dest: VirtAddr,
        target: &mut T,
    ) -> Result<()> {
        let retained_len = self.retained.len() as u64;
        let file_end = segment.file_end();

        if segment.offset < retained_len && segment.filesz != 0 {
            // Both bounds fit the retained buffer
            let start = usize::try_from(segment.offset)
                .map_err(|_| FormatError::SegmentOutOfBounds)?;
            let end = usize::try_from(file_end.min(retained_len))
                .map_err(|_| FormatError::SegmentOutOfBounds)?;
            target
                .copy_data(dest, &self.retained[start..end])
                .map_err(|()| LoadError::Mapping)?;
        }

        let stream_start = segment.offset.max(retained_len);
        if file_end > stream_start {
            self.skip_to(stream_start)?;

            let mut written = stream_start - segment.offset;
            while written < segment.filesz {
                let left = segment.filesz - written;
                let chunk = usize::try_from(left).map_or(self.scratch.len(), |left| {
                    left.min(self.scratch.len())
                });
                let buf = &mut self.scratch[..chunk];

                self.handle.read_exact(buf)?;
                *self.cursor += chunk as u64;

                let at = dest
                    .checked_add(written)
                    .ok_or(UsageError::BadDestination)?;
                target.copy_data(at, buf).map_err(|()| LoadError::Mapping)?;
                written += chunk as u64;
            }
        }

        if segment.memsz > segment.filesz {
            let tail = dest
                .checked_add(segment.filesz)
                .ok_or(UsageError::BadDestination)?;
            target
                .zero_region(tail, segment.memsz - segment.filesz)
                .map_err(|()| LoadError::Mapping)?;
        }

        Ok(())
    }

    /// Discards stream bytes up to ELF offset `offset`.
    pub fn skip_to(&mut self, offset: u64) -> Result<()> {
        let gap = offset
            .checked_sub(*self.cursor)
            .ok_or(FormatError::FileOverlap)?;
        if gap != 0 {
            let gap = usize::try_from(gap).map_err(|_| FormatError::SegmentOutOfBounds)?;
            self.handle.skip(gap)?;
            *self.cursor = offset;
        }
        Ok(())
    }
}
