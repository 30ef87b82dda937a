//! The store backend contract and the owning handle wrapper.
use crate::{StoreError, StoreResult};
use alloc::boxed::Box;
use tee_core::TaUuid;

#[derive(Debug)]
/// How a sequential read consumes the next bytes of a TA image.
pub enum ReadMode<'b> {
    /// Copy the next `buf.len()` bytes into `buf`.
    Copy(&'b mut [u8]),
    /// Discard the next `n` bytes.
    Skip(usize),
}

impl ReadMode<'_> {
    #[must_use]
    #[inline]
    /// Number of bytes this read moves the cursor forward by.
    pub const fn len(&self) -> usize {
        match self {
            Self::Copy(buf) => buf.len(),
            Self::Skip(n) => *n,
        }
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A source of TA images.
///
/// Opening a TA does not guarantee that the TA is valid, nor even that it
/// exists: backends are free to defer checks until the first read.
pub trait TaStore {
    /// Human-readable string describing where TAs come from.
    ///
    /// Used for diagnostics only.
    fn description(&self) -> &str;

    /// Opens the TA identified by `uuid`.
    ///
    /// Backends that do not hold the TA must return [`StoreError::NotFound`]
    /// (or [`StoreError::NotAvailable`] if the storage itself is offline)
    /// so that the registry can move on to the next backend.
    fn open(&self, uuid: &TaUuid) -> StoreResult<Box<dyn TaStoreHandle + '_>>;
}

impl<T: TaStore + ?Sized> TaStore for &T {
    #[inline]
    fn description(&self) -> &str {
        (**self).description()
    }

    #[inline]
    fn open(&self, uuid: &TaUuid) -> StoreResult<Box<dyn TaStoreHandle + '_>> {
        (**self).open(uuid)
    }
}

/// A per-TA read cursor handed out by a [`TaStore`].
///
/// The cursor only moves forward. Over the lifetime of a handle, the reader
/// is expected to consume exactly [`TaStoreHandle::size`] bytes unless an
/// error occurs, so a backend may rely on "offset == size" to detect the last
/// read (e.g. to finalize a running hash).
pub trait TaStoreHandle {
    /// Total size of the TA: the TA head plus the ELF image.
    fn size(&self) -> StoreResult<usize>;

    /// Moves the cursor forward by exactly `mode.len()` bytes.
    fn read(&mut self, mode: ReadMode<'_>) -> StoreResult<()>;

    /// Releases backend resources.
    ///
    /// Called at most once by [`StoreHandle`].
    fn close(&mut self) {}
}

/// An open TA, bound to the backend that produced it.
///
/// The handle keeps track of how many bytes were consumed, refuses to read
/// past the size reported by the backend and closes the backend handle
/// exactly once, either through [`StoreHandle::close`] or on drop.
pub struct StoreHandle<'s> {
    description: &'s str,
    inner: Option<Box<dyn TaStoreHandle + 's>>,
    size: Option<usize>,
    consumed: usize,
}

impl<'s> StoreHandle<'s> {
    #[must_use]
    #[inline]
    pub fn new(description: &'s str, inner: Box<dyn TaStoreHandle + 's>) -> Self {
        Self {
            description,
            inner: Some(inner),
            size: None,
            consumed: 0,
        }
    }

    /// Opens `uuid` directly on `store`, bypassing any registry.
    pub fn open<S: TaStore + ?Sized>(store: &'s S, uuid: &TaUuid) -> StoreResult<Self> {
        let inner = store.open(uuid)?;
        Ok(Self::new(store.description(), inner))
    }

    #[must_use]
    #[inline]
    /// Description of the backend this handle was opened on.
    pub const fn description(&self) -> &'s str {
        self.description
    }

    #[must_use]
    #[inline]
    pub const fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    #[must_use]
    #[inline]
    /// Number of bytes consumed so far, skipped bytes included.
    pub const fn consumed(&self) -> usize {
        self.consumed
    }

    /// Total size of the TA as reported by the backend.
    ///
    /// The value is queried once and cached for the lifetime of the handle.
    pub fn size(&mut self) -> StoreResult<usize> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        let size = self.inner.as_ref().ok_or(StoreError::Closed)?.size()?;
        self.size = Some(size);
        Ok(size)
    }

    /// Number of bytes left before the end of the TA.
    pub fn remaining(&mut self) -> StoreResult<usize> {
        let size = self.size()?;
        // `read` never lets `consumed` go past `size`
        Ok(size - self.consumed)
    }

    /// Moves the cursor forward by exactly `mode.len()` bytes.
    pub fn read(&mut self, mode: ReadMode<'_>) -> StoreResult<()> {
        let size = self.size()?;
        let len = mode.len();
        let end = self
            .consumed
            .checked_add(len)
            .filter(|&end| end <= size)
            .ok_or(StoreError::OutOfRange)?;

        if len == 0 {
            return Ok(());
        }

        self.inner.as_mut().ok_or(StoreError::Closed)?.read(mode)?;
        self.consumed = end;
        Ok(())
    }

    #[inline]
    pub fn read_exact(&mut self, buf: &mut [u8]) -> StoreResult<()> {
        self.read(ReadMode::Copy(buf))
    }

    #[inline]
    pub fn skip(&mut self, len: usize) -> StoreResult<()> {
        self.read(ReadMode::Skip(len))
    }

    /// Closes the backend handle.
    ///
    /// Closing an already closed handle does nothing.
    pub fn close(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            log::trace!(
                "Closing TA handle from '{}' after {} bytes",
                self.description,
                self.consumed
            );
            inner.close();
        }
    }
}

impl Drop for StoreHandle<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl core::fmt::Debug for StoreHandle<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("description", &self.description)
            .field("closed", &self.is_closed())
            .field("size", &self.size)
            .field("consumed", &self.consumed)
            .finish()
    }
}
