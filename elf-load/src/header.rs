//! ELF identification and file header.
//!
//! Decoding is done by `xmas_elf`, which reads the structures in place and
//! therefore needs them 8-byte aligned. This module only applies the
//! platform policy on top of it.
use crate::{config::LoaderConfig, error::FormatError};
use xmas_elf::{
    header::{self, Data, Machine, Version},
    program::{ProgramHeader32, ProgramHeader64},
};

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const EI_NIDENT: usize = 16;

/// Offset of the class byte in `e_ident`.
const EI_CLASS: usize = 4;
const EV_CURRENT: u32 = 1;

#[cfg(target_endian = "little")]
const NATIVE_DATA: Data = Data::LittleEndian;
#[cfg(target_endian = "big")]
const NATIVE_DATA: Data = Data::BigEndian;

/// Size of the largest supported ELF header.
pub const MAX_EHDR_SIZE: usize = ElfClass::Elf64.ehdr_size();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

impl ElfClass {
    #[must_use]
    #[inline]
    pub const fn ehdr_size(self) -> usize {
        match self {
            Self::Elf32 => 52,
            Self::Elf64 => 64,
        }
    }

    #[must_use]
    #[inline]
    pub const fn phdr_size(self) -> usize {
        match self {
            Self::Elf32 => size_of::<ProgramHeader32>(),
            Self::Elf64 => size_of::<ProgramHeader64>(),
        }
    }

    #[must_use]
    #[inline]
    /// Alignment the program header table needs to be decoded in place.
    pub const fn phdr_align(self) -> usize {
        match self {
            Self::Elf32 => align_of::<ProgramHeader32>(),
            Self::Elf64 => align_of::<ProgramHeader64>(),
        }
    }

    #[must_use]
    #[inline]
    pub const fn is_32bit(self) -> bool {
        matches!(self, Self::Elf32)
    }
}

#[derive(Clone, Copy)]
#[repr(C, align(8))]
/// Stack buffer holding a raw ELF header.
pub(crate) struct RawHeader(pub [u8; MAX_EHDR_SIZE]);

impl RawHeader {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self([0; MAX_EHDR_SIZE])
    }
}

/// Checks the magic and the class byte of `e_ident`.
///
/// The class decides how many more header bytes are read, so it is looked at
/// before anything else is decoded.
pub fn identify(ident: &[u8], config: &LoaderConfig) -> Result<ElfClass, FormatError> {
    if ident.get(..ELF_MAGIC.len()) != Some(ELF_MAGIC.as_slice()) {
        return Err(FormatError::BadMagic);
    }
    match ident.get(EI_CLASS) {
        Some(1) if config.allow_32bit => Ok(ElfClass::Elf32),
        Some(2) => Ok(ElfClass::Elf64),
        _ => Err(FormatError::UnsupportedClass),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The ELF file header, with address-sized fields widened to 64 bits.
pub struct ElfHeader {
    pub class: ElfClass,
    pub machine: Machine,
    pub entry: u64,
    pub phoff: u64,
    pub phentsize: u16,
    pub phnum: u16,
}

impl ElfHeader {
    /// Validates a full ELF header.
    ///
    /// `raw` must hold the `class.ehdr_size()` header bytes, identification
    /// included, with `class` as returned by [`identify`].
    pub(crate) fn parse(
        class: ElfClass,
        raw: &RawHeader,
        config: &LoaderConfig,
    ) -> Result<Self, FormatError> {
        let parsed = header::parse_header(&raw.0[..class.ehdr_size()])
            .map_err(|_| FormatError::Truncated)?;
        let (pt1, pt2) = (parsed.pt1, &parsed.pt2);

        if pt1.data() != NATIVE_DATA {
            return Err(FormatError::UnsupportedEncoding);
        }
        if pt1.version() != Version::Current || pt2.version() != EV_CURRENT {
            return Err(FormatError::UnsupportedVersion);
        }

        let kind = pt2.type_().as_type();
        if !matches!(kind, header::Type::Executable | header::Type::SharedObject) {
            return Err(FormatError::UnsupportedType(kind));
        }
        let machine = pt2.machine().as_machine();
        if !config.accepts_machine(class, machine) {
            return Err(FormatError::UnsupportedMachine(machine));
        }

        let ehsize = pt2.header_size();
        if usize::from(ehsize) != class.ehdr_size() {
            return Err(FormatError::HeaderSize(ehsize));
        }
        let phentsize = pt2.ph_entry_size();
        if usize::from(phentsize) != class.phdr_size() {
            return Err(FormatError::ProgramHeaderSize(phentsize));
        }
        let phnum = pt2.ph_count();
        if phnum == 0 || phnum > config.max_phnum {
            return Err(FormatError::SegmentCount(phnum));
        }

        Ok(Self {
            class,
            machine,
            entry: pt2.entry_point(),
            phoff: pt2.ph_offset(),
            phentsize,
            phnum,
        })
    }

    #[must_use]
    #[inline]
    /// Size of the program header table in bytes.
    pub const fn table_size(&self) -> u64 {
        // Both factors are 16-bit
        self.phentsize as u64 * self.phnum as u64
    }

    #[must_use]
    #[inline]
    /// File offset right past the program header table.
    pub const fn table_end(&self) -> Option<u64> {
        self.phoff.checked_add(self.table_size())
    }
}
