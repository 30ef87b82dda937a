//! Descriptors of loaded segments.
use crate::{
    layout::LoadSegment,
    program::{SegmentFlags, SegmentKind},
    target::VirtAddr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A loadable segment, placed at its final address.
pub struct Segment {
    vaddr: VirtAddr,
    offset: u64,
    filesz: u64,
    memsz: u64,
    flags: SegmentFlags,
    kind: SegmentKind,
}

impl Segment {
    #[must_use]
    #[inline]
    pub(crate) const fn new(vaddr: VirtAddr, segment: &LoadSegment) -> Self {
        Self {
            vaddr,
            offset: segment.offset,
            filesz: segment.filesz,
            memsz: segment.memsz,
            flags: segment.flags,
            kind: SegmentKind::Load,
        }
    }

    #[must_use]
    #[inline]
    /// Absolute address of the first byte of the segment.
    pub const fn vaddr(&self) -> VirtAddr {
        self.vaddr
    }

    #[must_use]
    #[inline]
    /// File offset of the segment data, relative to the ELF image.
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    #[inline]
    pub const fn file_size(&self) -> u64 {
        self.filesz
    }

    #[must_use]
    #[inline]
    /// Size in memory, zero-filled tail included.
    pub const fn size(&self) -> u64 {
        self.memsz
    }

    #[must_use]
    #[inline]
    pub const fn flags(&self) -> SegmentFlags {
        self.flags
    }

    #[must_use]
    #[inline]
    pub const fn kind(&self) -> SegmentKind {
        self.kind
    }
}

#[derive(Debug, Clone)]
/// Iterator over the loadable segments of an image, in file order.
pub struct Segments<'a> {
    base: VirtAddr,
    inner: core::slice::Iter<'a, LoadSegment>,
}

impl<'a> Segments<'a> {
    #[must_use]
    #[inline]
    pub(crate) fn new(base: VirtAddr, segments: &'a [LoadSegment]) -> Self {
        Self {
            base,
            inner: segments.iter(),
        }
    }
}

impl Iterator for Segments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Self::Item> {
        // The whole span was checked to fit the address space
        let segment = self.inner.next()?;
        Some(Segment::new(self.base + segment.rel_vaddr, segment))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Segments<'_> {}
