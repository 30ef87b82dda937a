//! Incremental loading of an ELF image from a store handle.
use crate::{
    AlignedBuf, Result,
    config::LoaderConfig,
    copier::SegmentCopier,
    error::{FormatError, UsageError},
    header::{self, EI_NIDENT, ElfHeader, RawHeader},
    layout::ImageLayout,
    program::ProgramHeader,
    segments::{Segment, Segments},
    target::{LoadTarget, VirtAddr},
    try_zeroed_vec,
};
use alloc::vec::Vec;
use ta_store::StoreHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Progress of an [`ElfLoadState`].
pub enum Phase {
    Initialized,
    HeadParsed,
    BodyLoaded,
    /// A step failed; only [`ElfLoadState::finalize`] is allowed.
    Poisoned,
    Finalized,
}

impl Phase {
    /// Error reported when an operation is attempted in a phase that does
    /// not allow it.
    const fn misuse(self) -> UsageError {
        match self {
            Self::Initialized => UsageError::HeadNotParsed,
            Self::HeadParsed => UsageError::HeadAlreadyParsed,
            Self::BodyLoaded => UsageError::BodyAlreadyLoaded,
            Self::Poisoned => UsageError::Poisoned,
            Self::Finalized => UsageError::Finalized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What to do with the bytes preceding the ELF image.
pub enum PrefixMode {
    /// Keep them, see [`ElfLoadState::prefix`].
    Keep,
    /// Discard them.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Results of [`ElfLoadState::head`].
pub struct HeadInfo {
    /// Size of the span to reserve for the image.
    pub vasize: usize,
    pub is_32bit: bool,
    /// Entry point offset from the start of the span.
    pub entry: u64,
}

/// Loads an ELF image in three ordered steps.
///
/// 1. [`ElfLoadState::head`] reads and validates the headers.
/// 2. [`ElfLoadState::body`] copies every loadable segment.
/// 3. [`ElfLoadState::finalize`] releases the handle and buffers.
///
/// The image is read strictly forward and exactly once, skipped gaps
/// included. The ELF header and program header table are kept in memory
/// after `head`, so segments that start inside them are still loadable.
///
/// Any failure in `head` or `body` poisons the state. Dropping the state
/// finalizes it.
pub struct ElfLoadState<'s> {
    handle: StoreHandle<'s>,
    config: LoaderConfig,
    phase: Phase,
    prefix: Option<Vec<u8>>,
    /// Bytes `[0, table_end)` of the ELF image.
    retained: AlignedBuf,
    layout: Option<ImageLayout>,
    is_32bit: bool,
    elf_size: u64,
    /// ELF offset of the next byte to read from the handle.
    cursor: u64,
}

impl<'s> ElfLoadState<'s> {
    /// Takes ownership of an open handle.
    pub fn init(handle: StoreHandle<'s>, config: LoaderConfig) -> Result<Self> {
        if handle.is_closed() {
            return Err(UsageError::HandleClosed.into());
        }
        config.validate()?;

        Ok(Self {
            handle,
            config,
            phase: Phase::Initialized,
            prefix: None,
            retained: AlignedBuf::default(),
            layout: None,
            is_32bit: false,
            elf_size: 0,
            cursor: 0,
        })
    }

    #[must_use]
    #[inline]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    #[inline]
    /// The bytes preceding the ELF image, when kept.
    pub fn prefix(&self) -> Option<&[u8]> {
        self.prefix.as_deref()
    }

    #[must_use]
    #[inline]
    pub const fn is_32bit(&self) -> bool {
        self.is_32bit
    }

    #[must_use]
    #[inline]
    /// Number of loadable segments, once the headers are parsed.
    pub fn segment_count(&self) -> usize {
        self.layout.as_ref().map_or(0, |layout| layout.segments.len())
    }

    #[must_use]
    #[inline]
    /// Total bytes read from the handle, prefix included.
    pub const fn consumed(&self) -> usize {
        self.handle.consumed()
    }

    /// Reads and validates the ELF headers.
    ///
    /// The first `head_size` bytes of the handle precede the ELF image and
    /// are kept or discarded according to `mode`. No segment data is read.
    pub fn head(&mut self, head_size: usize, mode: PrefixMode) -> Result<HeadInfo> {
        match self.phase {
            Phase::Initialized => {}
            Phase::HeadParsed | Phase::BodyLoaded => {
                return Err(UsageError::HeadAlreadyParsed.into());
            }
            other => return Err(other.misuse().into()),
        }

        let result = self.parse_head(head_size, mode);
        match &result {
            Ok(info) => {
                log::debug!(
                    "ELF headers parsed: {} segment(s), span {:#x}, {}-bit",
                    self.segment_count(),
                    info.vasize,
                    if info.is_32bit { 32 } else { 64 }
                );
                self.phase = Phase::HeadParsed;
            }
            Err(err) => {
                log::warn!("Rejecting TA image: {err}");
                self.phase = Phase::Poisoned;
            }
        }
        result
    }

    fn parse_head(&mut self, head_size: usize, mode: PrefixMode) -> Result<HeadInfo> {
        let total = self.handle.size()?;
        let elf_size = total
            .checked_sub(head_size)
            .ok_or(FormatError::Truncated)?;

        match mode {
            PrefixMode::Keep => {
                let mut prefix = try_zeroed_vec(head_size)?;
                self.handle.read_exact(&mut prefix)?;
                self.prefix = Some(prefix);
            }
            PrefixMode::Skip => self.handle.skip(head_size)?,
        }

        if elf_size < EI_NIDENT {
            return Err(FormatError::Truncated.into());
        }
        let mut raw = RawHeader::new();
        self.handle.read_exact(&mut raw.0[..EI_NIDENT])?;
        let class = header::identify(&raw.0[..EI_NIDENT], &self.config)?;

        let ehdr_size = class.ehdr_size();
        if elf_size < ehdr_size {
            return Err(FormatError::Truncated.into());
        }
        self.handle.read_exact(&mut raw.0[EI_NIDENT..ehdr_size])?;
        let header = ElfHeader::parse(class, &raw, &self.config)?;

        // The table must be fully inside the image before any of it is read
        if header.phoff < ehdr_size as u64 {
            return Err(FormatError::TableOverlapsHeader.into());
        }
        if header.phoff % class.phdr_align() as u64 != 0 {
            return Err(FormatError::MisalignedTable.into());
        }
        let table_end = header
            .table_end()
            .filter(|&end| end <= elf_size as u64)
            .ok_or(FormatError::TableOutOfBounds)?;
        let table_end = usize::try_from(table_end).map_err(|_| FormatError::TableOutOfBounds)?;
        if table_end > self.config.max_headers_size {
            return Err(FormatError::HeadersTooLarge.into());
        }

        let mut retained = AlignedBuf::try_zeroed(table_end)?;
        let bytes = retained.bytes_mut();
        bytes[..ehdr_size].copy_from_slice(&raw.0[..ehdr_size]);
        self.handle.read_exact(&mut bytes[ehdr_size..])?;

        let phdrs = ProgramHeader::read_table(retained.bytes(), header.phnum)?;

        let layout = ImageLayout::build(
            &header,
            &phdrs,
            elf_size as u64,
            table_end as u64,
            &self.config,
        )?;

        log::trace!(
            "Image linked at {:#x}, entry {:#x}",
            layout.link_base,
            header.entry
        );

        // Checked against `usize` by the layout
        let vasize = usize::try_from(layout.vasize).map_err(|_| FormatError::AddressOutOfRange)?;
        let info = HeadInfo {
            vasize,
            is_32bit: class.is_32bit(),
            entry: layout.entry,
        };

        self.retained = retained;
        self.cursor = table_end as u64;
        self.elf_size = elf_size as u64;
        self.is_32bit = info.is_32bit;
        self.layout = Some(layout);

        Ok(info)
    }

    /// Copies every loadable segment into `target`, the span starting at
    /// `base`.
    ///
    /// The span must have been reserved with the size returned by
    /// [`ElfLoadState::head`]. On success, the whole image has been consumed.
    pub fn body<T: LoadTarget + ?Sized>(&mut self, base: VirtAddr, target: &mut T) -> Result<()> {
        if self.phase != Phase::HeadParsed {
            return Err(self.phase.misuse().into());
        }

        let result = self.copy_segments(base, target);
        match &result {
            Ok(()) => {
                log::debug!(
                    "ELF image loaded at {:#x} ({} bytes read)",
                    base,
                    self.handle.consumed()
                );
                self.phase = Phase::BodyLoaded;
            }
            Err(err) => {
                log::warn!("Failed to load TA segments: {err}");
                self.phase = Phase::Poisoned;
            }
        }
        result
    }

    fn copy_segments<T: LoadTarget + ?Sized>(
        &mut self,
        base: VirtAddr,
        target: &mut T,
    ) -> Result<()> {
        let layout = self.layout.as_ref().ok_or(UsageError::HeadNotParsed)?;

        base.as_u64()
            .checked_add(layout.vasize)
            .ok_or(UsageError::BadDestination)?;
        // The span was computed to cover every segment
        debug_assert!(
            layout
                .segments
                .iter()
                .all(|segment| segment.rel_end() <= layout.vasize)
        );

        let mut copier = SegmentCopier::new(
            &mut self.handle,
            &mut self.cursor,
            self.retained.bytes(),
            self.config.scratch_size,
        )?;

        for segment in &layout.segments {
            let dest = base + segment.rel_vaddr;
            log::trace!(
                "Loading segment: file {:#x}+{:#x} -> {:#x}+{:#x} ({:?})",
                segment.offset,
                segment.filesz,
                dest,
                segment.memsz,
                segment.flags
            );
            copier.copy(segment, dest, target)?;
        }

        // Whatever follows the last segment is part of the image too
        copier.skip_to(self.elf_size)
    }

    /// Returns the segment at `*cursor` and advances the cursor.
    ///
    /// Segments come in file order, with absolute addresses computed from
    /// `base`. Returns `None` once every segment was yielded.
    pub fn next_segment(&self, base: VirtAddr, cursor: &mut usize) -> Result<Option<Segment>> {
        let layout = self.loaded_layout()?;
        let Some(segment) = layout.segments.get(*cursor) else {
            return Ok(None);
        };
        let vaddr = base
            .checked_add(segment.rel_vaddr)
            .ok_or(UsageError::BadDestination)?;
        *cursor += 1;
        Ok(Some(Segment::new(vaddr, segment)))
    }

    /// Iterates over every loadable segment, see [`ElfLoadState::next_segment`].
    pub fn segments(&self, base: VirtAddr) -> Result<Segments<'_>> {
        let layout = self.loaded_layout()?;
        base.checked_add(layout.vasize)
            .ok_or(UsageError::BadDestination)?;
        Ok(Segments::new(base, &layout.segments))
    }

    fn loaded_layout(&self) -> Result<&ImageLayout> {
        match self.phase {
            Phase::HeadParsed | Phase::BodyLoaded => {
                self.layout.as_ref().ok_or(UsageError::HeadNotParsed.into())
            }
            other => Err(other.misuse().into()),
        }
    }

    /// Releases the store handle and every buffer.
    ///
    /// Can be called in any phase, any number of times.
    pub fn finalize(&mut self) {
        if self.phase == Phase::Finalized {
            return;
        }
        log::trace!("Finalizing ELF load state ({:?})", self.phase);
        self.handle.close();
        self.prefix = None;
        self.retained = AlignedBuf::default();
        self.layout = None;
        self.phase = Phase::Finalized;
    }
}

impl Drop for ElfLoadState<'_> {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl core::fmt::Debug for ElfLoadState<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ElfLoadState")
            .field("handle", &self.handle)
            .field("phase", &self.phase)
            .field("segments", &self.segment_count())
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}
