//! Program header entries.
use crate::{Result, error::FormatError, try_vec_with_capacity};
use alloc::vec::Vec;
use xmas_elf::{ElfFile, program};

pub use xmas_elf::program::Type as SegmentKind;

bitflags::bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    /// Access permissions of a segment.
    pub struct SegmentFlags: u32 {
        const EXECUTE = 1;
        const WRITE = 1 << 1;
        const READ = 1 << 2;
    }
}

impl SegmentFlags {
    #[must_use]
    #[inline]
    pub const fn is_executable(self) -> bool {
        self.contains(Self::EXECUTE)
    }

    #[must_use]
    #[inline]
    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITE)
    }

    /// OS and processor specific bits carry no access semantics and are
    /// dropped.
    fn from_elf(flags: program::Flags) -> Self {
        let mut result = Self::empty();
        result.set(Self::READ, flags.is_read());
        result.set(Self::WRITE, flags.is_write());
        result.set(Self::EXECUTE, flags.is_execute());
        result
    }
}

#[must_use]
#[inline]
/// Whether ignoring a segment of this kind would produce a broken TA.
///
/// TAs are self-contained: they cannot request an interpreter and the
/// reserved `PT_SHLIB` has no defined semantics.
pub const fn requires_support(kind: SegmentKind) -> bool {
    matches!(kind, SegmentKind::Interp | SegmentKind::ShLib)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A program header entry, with address-sized fields widened to 64 bits.
pub struct ProgramHeader {
    /// `None` for types outside every known range.
    pub kind: Option<SegmentKind>,
    pub flags: SegmentFlags,
    pub offset: u64,
    pub vaddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

impl ProgramHeader {
    fn from_entry(entry: program::ProgramHeader<'_>) -> Self {
        Self {
            kind: entry.get_type().ok(),
            flags: SegmentFlags::from_elf(entry.flags()),
            offset: entry.offset(),
            vaddr: entry.virtual_addr(),
            filesz: entry.file_size(),
            memsz: entry.mem_size(),
            align: entry.align(),
        }
    }

    /// Decodes the `count` entries of the program header table.
    ///
    /// `image` holds the ELF file up to the end of the table. It must be
    /// 8-byte aligned, with a header accepted by
    /// [`ElfHeader::parse`](crate::header::ElfHeader::parse) and a table
    /// aligned for its class.
    pub fn read_table(image: &[u8], count: u16) -> Result<Vec<Self>> {
        let elf = ElfFile::new(image).map_err(|_| FormatError::Truncated)?;

        let mut phdrs = try_vec_with_capacity(usize::from(count))?;
        phdrs.extend(elf.program_iter().map(Self::from_entry));
        if phdrs.len() != usize::from(count) {
            return Err(FormatError::TableOutOfBounds.into());
        }
        Ok(phdrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlignedBuf;

    const PT_LOAD: u32 = 1;
    const PT_NOTE: u32 = 4;

    /// A 64-bit image made of a header and a table of `phdrs` at offset 64.
    fn image64(phdrs: &[[u8; 56]]) -> AlignedBuf {
        let count = u16::try_from(phdrs.len()).unwrap();
        let mut image = AlignedBuf::try_zeroed(64 + 56 * phdrs.len()).unwrap();
        let bytes = image.bytes_mut();
        bytes[..4].copy_from_slice(b"\x7fELF");
        bytes[4] = 2;
        bytes[5] = if cfg!(target_endian = "little") { 1 } else { 2 };
        bytes[6] = 1;
        bytes[16..18].copy_from_slice(&3u16.to_ne_bytes());
        bytes[18..20].copy_from_slice(&183u16.to_ne_bytes());
        bytes[20..24].copy_from_slice(&1u32.to_ne_bytes());
        bytes[32..40].copy_from_slice(&64u64.to_ne_bytes());
        bytes[52..54].copy_from_slice(&64u16.to_ne_bytes());
        bytes[54..56].copy_from_slice(&56u16.to_ne_bytes());
        bytes[56..58].copy_from_slice(&count.to_ne_bytes());
        for (index, phdr) in phdrs.iter().enumerate() {
            let start = 64 + 56 * index;
            bytes[start..start + 56].copy_from_slice(phdr);
        }
        image
    }

    fn phdr64(kind: u32, flags: u32, offset: u64, vaddr: u64, filesz: u64, memsz: u64) -> [u8; 56] {
        let mut raw = [0u8; 56];
        raw[0..4].copy_from_slice(&kind.to_ne_bytes());
        raw[4..8].copy_from_slice(&flags.to_ne_bytes());
        raw[8..16].copy_from_slice(&offset.to_ne_bytes());
        raw[16..24].copy_from_slice(&vaddr.to_ne_bytes());
        raw[32..40].copy_from_slice(&filesz.to_ne_bytes());
        raw[40..48].copy_from_slice(&memsz.to_ne_bytes());
        raw[48..56].copy_from_slice(&0x1000u64.to_ne_bytes());
        raw
    }

    #[test]
    fn test_requires_support() {
        assert!(requires_support(SegmentKind::Interp));
        assert!(requires_support(SegmentKind::ShLib));
        assert!(!requires_support(SegmentKind::Note));
        assert!(!requires_support(SegmentKind::OsSpecific(0x6fff_0000)));
    }

    #[test]
    fn test_read_table() {
        let image = image64(&[
            phdr64(PT_LOAD, 0x0ff0_0000 | 5, 0x1000, 0x4000, 0x200, 0x300),
            phdr64(PT_NOTE, 4, 0x80, 0, 0x10, 0x10),
        ]);

        let phdrs = ProgramHeader::read_table(image.bytes(), 2).unwrap();
        assert_eq!(phdrs.len(), 2);

        let load = phdrs[0];
        assert_eq!(load.kind, Some(SegmentKind::Load));
        assert_eq!(load.flags, SegmentFlags::READ | SegmentFlags::EXECUTE);
        assert_eq!(load.offset, 0x1000);
        assert_eq!(load.vaddr, 0x4000);
        assert_eq!(load.filesz, 0x200);
        assert_eq!(load.memsz, 0x300);
        assert_eq!(load.align, 0x1000);

        assert_eq!(phdrs[1].kind, Some(SegmentKind::Note));
        assert_eq!(phdrs[1].flags, SegmentFlags::READ);
    }

    #[test]
    fn test_unknown_type() {
        let image = image64(&[phdr64(42, 0, 0, 0, 0, 0)]);
        let phdrs = ProgramHeader::read_table(image.bytes(), 1).unwrap();
        assert_eq!(phdrs[0].kind, None);
    }
}
