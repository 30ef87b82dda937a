//! Priority-ordered collection of TA stores.
use crate::{StoreError, StoreHandle, StoreResult, TaStore};
use alloc::{boxed::Box, vec::Vec};
use tee_core::TaUuid;

struct RegisteredStore<'s> {
    priority: i32,
    store: Box<dyn TaStore + 's>,
}

#[derive(Default)]
/// An ordered set of TA stores.
///
/// Stores are kept sorted by priority, lower values first. Stores sharing a
/// priority keep their registration order.
pub struct StoreRegistry<'s> {
    stores: Vec<RegisteredStore<'s>>,
}

impl<'s> StoreRegistry<'s> {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self { stores: Vec::new() }
    }

    /// Registers a new store.
    ///
    /// A lower `priority` means the store is tried earlier.
    pub fn register<S: TaStore + 's>(&mut self, priority: i32, store: S) {
        let index = self.stores.partition_point(|s| s.priority <= priority);
        log::debug!(
            "Registering TA store '{}' with priority {}",
            store.description(),
            priority
        );
        self.stores.insert(
            index,
            RegisteredStore {
                priority,
                store: Box::new(store),
            },
        );
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Iterates over `(priority, description)` in lookup order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> {
        self.stores
            .iter()
            .map(|s| (s.priority, s.store.description()))
    }

    /// Opens `uuid` on the first store that holds it.
    ///
    /// Stores are tried in priority order. A store reporting the TA as absent
    /// is skipped silently; any other failure is remembered and the next
    /// store is tried. If no store succeeds, the first such failure is
    /// returned as-is so that a broken storage is never reported as a missing
    /// TA. Otherwise, the lookup fails with [`StoreError::NotFound`].
    pub fn lookup(&self, uuid: &TaUuid) -> StoreResult<StoreHandle<'_>> {
        let mut first_fault = None;

        for registered in &self.stores {
            let store = &*registered.store;
            log::debug!(
                "Lookup TA {} in '{}' (priority {})",
                uuid,
                store.description(),
                registered.priority
            );

            match StoreHandle::open(store, uuid) {
                Ok(handle) => return Ok(handle),
                Err(err) if err.is_absent() => {}
                Err(err) => {
                    log::warn!(
                        "TA store '{}' failed to open {}: {}",
                        store.description(),
                        uuid,
                        err
                    );
                    first_fault.get_or_insert(err);
                }
            }
        }

        Err(first_fault.unwrap_or(StoreError::NotFound))
    }
}

impl core::fmt::Debug for StoreRegistry<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
