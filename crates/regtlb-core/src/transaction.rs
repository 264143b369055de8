//! Kernel transactions over the key store.

use crate::error::{RegTlbError, Result};
use crate::handle::Handle;
use crate::platform::codes;
use crate::store::{KeyStore, RawHandle};
use tracing::{debug, warn};

/// An atomic unit of work over the key store.
///
/// Operations performed through keys opened under a transaction become visible
/// to others only on [`commit`](Self::commit). Releasing a transaction that
/// was never committed discards its work.
#[derive(Debug)]
pub struct Transaction<'s> {
    handle: Handle<'s>,
}

impl<'s> Transaction<'s> {
    /// A transaction object that does not hold a transaction yet.
    pub fn new(store: &'s dyn KeyStore) -> Self {
        Self {
            handle: Handle::empty(store),
        }
    }

    /// Create and begin a new transaction.
    pub fn create(store: &'s dyn KeyStore, description: Option<&str>) -> Result<Self> {
        let mut transaction = Self::new(store);
        transaction.begin(description)?;
        Ok(transaction)
    }

    /// Adopt an existing transaction handle.
    pub fn from_handle(handle: Handle<'s>) -> Self {
        Self { handle }
    }

    /// Begin a new transaction with default settings.
    ///
    /// A transaction already held is released first, without committing it.
    pub fn begin(&mut self, description: Option<&str>) -> Result<()> {
        if self.handle.is_valid() {
            self.handle.close()?;
        }
        let raw = self.handle.store().create_transaction(description)?;
        if !raw.is_valid() {
            return Err(RegTlbError::system(
                codes::ERROR_INVALID_HANDLE,
                "CreateTransaction",
            ));
        }
        self.handle.attach(raw)?;
        debug!("Began transaction {:?}", raw);
        Ok(())
    }

    /// Make every operation performed under this transaction durable.
    pub fn commit(&self) -> Result<()> {
        self.handle.store().commit_transaction(self.handle.raw())?;
        debug!("Committed transaction {:?}", self.handle.raw());
        Ok(())
    }

    /// Discard every operation performed under this transaction.
    pub fn rollback(&self) -> Result<()> {
        self.handle.store().rollback_transaction(self.handle.raw())?;
        debug!("Rolled back transaction {:?}", self.handle.raw());
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    pub fn raw(&self) -> RawHandle {
        self.handle.raw()
    }

    pub fn handle(&self) -> &Handle<'s> {
        &self.handle
    }

    /// Duplicate the underlying handle; both refer to the same unit of work.
    pub fn duplicate(&self) -> Result<Transaction<'s>> {
        Ok(Transaction::from_handle(self.handle.duplicate()?))
    }

    /// Run `work` under `transaction` if one is supplied and valid.
    ///
    /// Otherwise `work` runs under a new local transaction that is committed
    /// when it succeeds and rolled back when it fails; the failure is returned
    /// unchanged. A supplied transaction is never committed or rolled back.
    pub fn scoped<T>(
        store: &dyn KeyStore,
        transaction: Option<&Transaction<'_>>,
        description: &str,
        work: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        if let Some(transaction) = transaction.filter(|tx| tx.is_valid()) {
            return work(transaction);
        }

        let local = Transaction::create(store, Some(description))?;
        match work(&local) {
            Ok(value) => {
                local.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = local.rollback() {
                    warn!("Failed to roll back '{}': {}", description, rollback);
                }
                Err(e)
            }
        }
    }
}
