//! Destinations for loaded segments.
use crate::program::SegmentFlags;
pub use tee_core::VirtAddr;

#[expect(clippy::result_unit_err)]
/// Memory that segment contents are written to.
///
/// Addresses are absolute: they already include the load base.
pub trait LoadTarget {
    /// Copy data to `dest`.
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the destination is not writable.
    fn copy_data(&mut self, dest: VirtAddr, src: &[u8]) -> core::result::Result<(), ()>;

    /// Zero `size` bytes starting at `dest`.
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the destination is not writable.
    fn zero_region(&mut self, dest: VirtAddr, size: u64) -> core::result::Result<(), ()>;
}

impl<T: LoadTarget + ?Sized> LoadTarget for &mut T {
    #[inline]
    fn copy_data(&mut self, dest: VirtAddr, src: &[u8]) -> core::result::Result<(), ()> {
        (**self).copy_data(dest, src)
    }

    #[inline]
    fn zero_region(&mut self, dest: VirtAddr, size: u64) -> core::result::Result<(), ()> {
        (**self).zero_region(dest, size)
    }
}

#[expect(clippy::result_unit_err)]
/// An address space able to host a whole TA.
pub trait AddressSpace: LoadTarget {
    /// Reserve a readable and writable span of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if no such span is available.
    fn reserve(&mut self, size: u64) -> core::result::Result<VirtAddr, ()>;

    /// Apply the final permissions of a segment.
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the permissions cannot be applied.
    fn protect(
        &mut self,
        addr: VirtAddr,
        size: u64,
        flags: SegmentFlags,
    ) -> core::result::Result<(), ()>;

    /// Give back a span obtained from [`AddressSpace::reserve`].
    ///
    /// This is a best-effort operation.
    fn release(&mut self, addr: VirtAddr, size: u64);
}

#[derive(Debug)]
/// A [`LoadTarget`] backed by a plain byte slice mapped at `base`.
pub struct SliceTarget<'m> {
    base: VirtAddr,
    memory: &'m mut [u8],
}

impl<'m> SliceTarget<'m> {
    #[must_use]
    #[inline]
    pub const fn new(base: VirtAddr, memory: &'m mut [u8]) -> Self {
        Self { base, memory }
    }

    #[must_use]
    #[inline]
    pub const fn base(&self) -> VirtAddr {
        self.base
    }

    #[must_use]
    #[inline]
    pub const fn memory(&self) -> &[u8] {
        &*self.memory
    }

    fn window(&mut self, dest: VirtAddr, size: u64) -> core::result::Result<&mut [u8], ()> {
        let start = dest.checked_offset_from(self.base).ok_or(())?;
        let start = usize::try_from(start).map_err(|_| ())?;
        let size = usize::try_from(size).map_err(|_| ())?;
        let end = start.checked_add(size).ok_or(())?;
        self.memory.get_mut(start..end).ok_or(())
    }
}

impl LoadTarget for SliceTarget<'_> {
    fn copy_data(&mut self, dest: VirtAddr, src: &[u8]) -> core::result::Result<(), ()> {
        self.window(dest, src.len() as u64)?.copy_from_slice(src);
        Ok(())
    }

    fn zero_region(&mut self, dest: VirtAddr, size: u64) -> core::result::Result<(), ()> {
        self.window(dest, size)?.fill(0);
        Ok(())
    }
}
