//! Loading of a complete TA, from lookup to final permissions.
use crate::{
    LoadError, Result,
    config::LoaderConfig,
    error::FormatError,
    state::{ElfLoadState, PrefixMode},
    target::{AddressSpace, VirtAddr},
};
use ta_store::{StoreHandle, StoreRegistry};
use tee_core::{TA_HEAD_SIZE, TaHead, TaUuid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A TA ready to be run.
pub struct LoadedTa {
    /// Start of the span holding the TA.
    pub base: VirtAddr,
    /// Size of the span.
    pub size: u64,
    pub entry: VirtAddr,
    pub head: TaHead,
    pub is_32bit: bool,
}

#[derive(Debug, Default, Clone, Copy)]
/// Loads TAs stored as a [`TaHead`] followed by an ELF image.
pub struct TaLoader {
    config: LoaderConfig,
}

impl TaLoader {
    #[must_use]
    #[inline]
    pub const fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    #[must_use]
    #[inline]
    pub const fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Looks `uuid` up in `registry` and loads it into `space`.
    pub fn load<A: AddressSpace + ?Sized>(
        &self,
        registry: &StoreRegistry<'_>,
        uuid: &TaUuid,
        space: &mut A,
    ) -> Result<LoadedTa> {
        let handle = registry.lookup(uuid)?;
        log::debug!("Loading TA {} from '{}'", uuid, handle.description());
        self.load_from(handle, uuid, space)
    }

    /// Loads the TA behind an already open handle.
    ///
    /// The span is reserved readable and writable, filled, then every segment
    /// gets its final permissions. On failure, the span is released.
    pub fn load_from<A: AddressSpace + ?Sized>(
        &self,
        handle: StoreHandle<'_>,
        uuid: &TaUuid,
        space: &mut A,
    ) -> Result<LoadedTa> {
        let mut state = ElfLoadState::init(handle, self.config)?;
        let info = state.head(TA_HEAD_SIZE, PrefixMode::Keep)?;

        let head = TaHead::parse(state.prefix().unwrap_or_default())
            .map_err(|_| FormatError::Truncated)?;
        if head.uuid != *uuid {
            log::warn!("TA head announces {} instead of {}", head.uuid, uuid);
            return Err(FormatError::UuidMismatch.into());
        }
        log::debug!(
            "TA head: stack {:#x}, flags {:?}",
            head.stack_size,
            head.flags
        );

        let size = info.vasize as u64;
        let base = space.reserve(size).map_err(|()| LoadError::Mapping)?;

        if let Err(err) = Self::populate(&mut state, base, space) {
            space.release(base, size);
            return Err(err);
        }
        state.finalize();

        let entry = base
            .checked_add(info.entry)
            .ok_or(FormatError::EntryOutOfRange)?;
        log::info!("TA {uuid} loaded at {base:#x}, entry {entry:#x}");

        Ok(LoadedTa {
            base,
            size,
            entry,
            head,
            is_32bit: info.is_32bit,
        })
    }

    fn populate<A: AddressSpace + ?Sized>(
        state: &mut ElfLoadState<'_>,
        base: VirtAddr,
        space: &mut A,
    ) -> Result<()> {
        state.body(base, space)?;

        // Pages shared by two segments end up with the permissions of the
        // last one
        let mut cursor = 0;
        while let Some(segment) = state.next_segment(base, &mut cursor)? {
            if segment.flags().is_writable() && segment.flags().is_executable() {
                log::warn!("Segment at {:#x} is writable and executable", segment.vaddr());
            }
            space
                .protect(segment.vaddr(), segment.size(), segment.flags())
                .map_err(|()| LoadError::Mapping)?;
        }
        Ok(())
    }
}
