//! Loader tunables.
use crate::{
    error::UsageError,
    header::{ElfClass, MAX_EHDR_SIZE},
};
use xmas_elf::header::Machine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Platform policy applied while validating and loading an image.
pub struct LoaderConfig {
    /// Granule used to round the reserved span. Must be a power of two.
    pub page_size: u64,
    /// Accepted machine for 32-bit images, `None` accepts any.
    pub machine32: Option<Machine>,
    /// Accepted machine for 64-bit images, `None` accepts any.
    pub machine64: Option<Machine>,
    /// Whether 32-bit images are loadable at all.
    pub allow_32bit: bool,
    /// Exclusive ceiling of segment addresses in 32-bit images.
    pub max_va32: u64,
    /// Exclusive ceiling of segment addresses in 64-bit images.
    pub max_va64: u64,
    /// Largest accepted program header count.
    pub max_phnum: u16,
    /// Largest accepted `phoff + phnum * phentsize`.
    ///
    /// The ELF header, the gap after it and the program header table are
    /// all kept in memory until the body is loaded.
    pub max_headers_size: usize,
    /// Size of the bounce buffer used to stream segment data.
    pub scratch_size: usize,
}

impl LoaderConfig {
    pub const DEFAULT: Self = Self {
        page_size: 0x1000,
        machine32: Some(Machine::Arm),
        machine64: Some(Machine::AArch64),
        allow_32bit: true,
        max_va32: 1 << 32,
        max_va64: 1 << 48,
        max_phnum: 128,
        max_headers_size: 0x4000,
        scratch_size: 0x1000,
    };

    #[must_use]
    #[inline]
    pub const fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_machines(
        mut self,
        machine32: Option<Machine>,
        machine64: Option<Machine>,
    ) -> Self {
        self.machine32 = machine32;
        self.machine64 = machine64;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_scratch_size(mut self, scratch_size: usize) -> Self {
        self.scratch_size = scratch_size;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_max_phnum(mut self, max_phnum: u16) -> Self {
        self.max_phnum = max_phnum;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_max_headers_size(mut self, max_headers_size: usize) -> Self {
        self.max_headers_size = max_headers_size;
        self
    }

    #[must_use]
    #[inline]
    pub const fn without_32bit(mut self) -> Self {
        self.allow_32bit = false;
        self
    }

    #[must_use]
    #[inline]
    pub const fn max_va(&self, class: ElfClass) -> u64 {
        match class {
            ElfClass::Elf32 => self.max_va32,
            ElfClass::Elf64 => self.max_va64,
        }
    }

    #[must_use]
    #[inline]
    pub fn accepts_machine(&self, class: ElfClass, machine: Machine) -> bool {
        let expected = match class {
            ElfClass::Elf32 => self.machine32,
            ElfClass::Elf64 => self.machine64,
        };
        expected.is_none_or(|m| m == machine)
    }

    pub(crate) const fn validate(&self) -> Result<(), UsageError> {
        if !self.page_size.is_power_of_two()
            || self.scratch_size == 0
            || self.max_phnum == 0
            || self.max_headers_size < MAX_EHDR_SIZE + ElfClass::Elf64.phdr_size()
            || self.max_va32 > 1 << 32
        {
            return Err(UsageError::BadConfig);
        }
        Ok(())
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
