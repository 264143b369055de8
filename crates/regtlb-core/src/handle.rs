//! Owned system handles.

use crate::error::Result;
use crate::store::{KeyStore, RawHandle};
use std::fmt;
use tracing::warn;

/// Lifecycle wrapper for an opaque system handle.
///
/// A `Handle` owns at most one handle value and releases it exactly once,
/// either explicitly through [`close`](Self::close) or on drop. It is
/// move-only; use [`duplicate`](Self::duplicate) to get a second, independent
/// handle to the same underlying object.
pub struct Handle<'s> {
    store: &'s dyn KeyStore,
    raw: RawHandle,
}

impl<'s> Handle<'s> {
    /// Create an invalid handle that owns nothing.
    pub fn empty(store: &'s dyn KeyStore) -> Self {
        Self {
            store,
            raw: RawHandle::INVALID,
        }
    }

    /// Take ownership of `raw`.
    pub fn from_raw(store: &'s dyn KeyStore, raw: RawHandle) -> Self {
        Self { store, raw }
    }

    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    pub fn is_valid(&self) -> bool {
        self.raw.is_valid()
    }

    pub(crate) fn store(&self) -> &'s dyn KeyStore {
        self.store
    }

    /// Release the handle if it is valid. Safe to call any number of times.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_valid() {
            return Ok(());
        }
        let raw = std::mem::replace(&mut self.raw, RawHandle::INVALID);
        self.store.close_handle(raw)
    }

    /// Release the current handle and take ownership of `raw`.
    pub fn attach(&mut self, raw: RawHandle) -> Result<()> {
        self.close()?;
        self.raw = raw;
        Ok(())
    }

    /// Give up ownership without releasing; the caller becomes responsible for `raw`.
    pub fn detach(&mut self) -> RawHandle {
        std::mem::replace(&mut self.raw, RawHandle::INVALID)
    }

    /// Duplicate the handle. The copy has its own lifetime.
    pub fn duplicate(&self) -> Result<Handle<'s>> {
        let raw = self.store.duplicate_handle(self.raw)?;
        Ok(Handle::from_raw(self.store, raw))
    }
}

impl Drop for Handle<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to release handle: {}", e);
        }
    }
}

impl fmt::Debug for Handle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("raw", &self.raw).finish()
    }
}
