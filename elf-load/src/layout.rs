//! Validation of the loadable segments and computation of the image span.
use crate::{
    Result,
    config::LoaderConfig,
    error::FormatError,
    header::ElfHeader,
    program::{ProgramHeader, SegmentFlags, SegmentKind, requires_support},
    try_vec_with_capacity,
};
use alloc::vec::Vec;
use tee_core::{MemoryRange, align_down, align_up};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A validated `PT_LOAD` entry.
///
/// Addresses are relative to the start of the image span.
pub(crate) struct LoadSegment {
    pub offset: u64,
    pub filesz: u64,
    pub rel_vaddr: u64,
    pub memsz: u64,
    pub flags: SegmentFlags,
}

impl LoadSegment {
    #[must_use]
    #[inline]
    pub const fn file_end(&self) -> u64 {
        // Checked during validation
        self.offset + self.filesz
    }

    #[must_use]
    #[inline]
    pub const fn rel_end(&self) -> u64 {
        self.rel_vaddr + self.memsz
    }
}

#[derive(Debug)]
/// Segments of an image, in file order, and the span they occupy once loaded.
pub(crate) struct ImageLayout {
    pub segments: Vec<LoadSegment>,
    /// Lowest segment address, rounded down to a page.
    pub link_base: u64,
    /// Page-rounded size of the span covering every segment.
    pub vasize: u64,
    /// Entry point, relative to the span.
    pub entry: u64,
}

impl ImageLayout {
    /// Validates every program header of an image.
    ///
    /// `elf_size` is the size of the ELF file and `retained` the number of
    /// leading bytes the caller keeps in memory: file data below it does not
    /// come from the stream and is exempt from the ordering rules.
    pub fn build(
        header: &ElfHeader,
        phdrs: &[ProgramHeader],
        elf_size: u64,
        retained: u64,
        config: &LoaderConfig,
    ) -> Result<Self> {
        let max_va = config.max_va(header.class);
        let mut loads: Vec<(u64, ProgramHeader)> = try_vec_with_capacity(phdrs.len())?;

        for (index, phdr) in phdrs.iter().enumerate() {
            match phdr.kind {
                Some(SegmentKind::Load) => {}
                Some(kind) if requires_support(kind) => {
                    return Err(FormatError::UnsupportedSegment(kind).into());
                }
                Some(kind) => {
                    log::trace!("Ignoring program header {index} of type {kind:?}");
                    continue;
                }
                None => {
                    log::trace!("Ignoring program header {index} of unknown type");
                    continue;
                }
            }

            if phdr.filesz > phdr.memsz {
                return Err(FormatError::MemSizeBelowFileSize.into());
            }
            if phdr
                .offset
                .checked_add(phdr.filesz)
                .is_none_or(|end| end > elf_size)
            {
                return Err(FormatError::SegmentOutOfBounds.into());
            }
            if phdr.align > 1 && !phdr.align.is_power_of_two() {
                return Err(FormatError::BadAlignment(phdr.align).into());
            }
            if phdr.memsz == 0 {
                log::trace!("Skipping empty segment {index}");
                continue;
            }
            let vend = phdr
                .vaddr
                .checked_add(phdr.memsz)
                .ok_or(FormatError::AddressOverflow)?;
            if vend > max_va {
                return Err(FormatError::AddressOutOfRange.into());
            }

            loads.push((vend, *phdr));
        }

        if loads.is_empty() {
            return Err(FormatError::NoLoadableSegment.into());
        }

        Self::check_memory_overlap(&mut loads)?;

        let lowest = loads.iter().map(|(_, p)| p.vaddr).min().unwrap_or(0);
        let highest = loads.iter().map(|(vend, _)| *vend).max().unwrap_or(0);
        let link_base = align_down(lowest, config.page_size);
        let span_end = align_up(highest, config.page_size).ok_or(FormatError::AddressOverflow)?;
        let vasize = span_end - link_base;
        if usize::try_from(vasize).is_err() {
            return Err(FormatError::AddressOutOfRange.into());
        }

        if header.entry < link_base || header.entry >= span_end {
            return Err(FormatError::EntryOutOfRange.into());
        }

        loads.sort_by_key(|(_, p)| (p.offset, p.vaddr));
        Self::check_file_overlap(&loads, retained)?;

        let mut segments = try_vec_with_capacity(loads.len())?;
        segments.extend(loads.iter().map(|(_, p)| LoadSegment {
            offset: p.offset,
            filesz: p.filesz,
            rel_vaddr: p.vaddr - link_base,
            memsz: p.memsz,
            flags: p.flags,
        }));

        Ok(Self {
            segments,
            link_base,
            vasize,
            entry: header.entry - link_base,
        })
    }

    /// Sorts `loads` by address and rejects overlapping segments.
    fn check_memory_overlap(loads: &mut [(u64, ProgramHeader)]) -> Result<()> {
        loads.sort_by_key(|(_, p)| p.vaddr);
        for pair in loads.windows(2) {
            let (prev_end, _) = pair[0];
            let (_, next) = pair[1];
            if next.vaddr < prev_end {
                return Err(FormatError::MemoryOverlap.into());
            }
        }
        Ok(())
    }

    /// Rejects segments whose streamed data overlaps.
    ///
    /// `loads` must be sorted by file offset. The stream only moves forward,
    /// so every byte past `retained` can be handed to a single segment.
    fn check_file_overlap(loads: &[(u64, ProgramHeader)], retained: u64) -> Result<()> {
        let mut streamed: Option<MemoryRange> = None;
        for (_, phdr) in loads {
            let start = phdr.offset.max(retained);
            let Some(size) = (phdr.offset + phdr.filesz).checked_sub(start) else {
                continue;
            };
            let Some(range) = MemoryRange::from_start_size(start, size) else {
                continue;
            };
            if let Some(shared) = streamed.and_then(|prev| prev.overlaps(&range)) {
                log::trace!(
                    "File bytes {:#x}..={:#x} are claimed by two segments",
                    shared.start(),
                    shared.end()
                );
                return Err(FormatError::FileOverlap.into());
            }
            streamed = Some(range);
        }
        Ok(())
    }
}
