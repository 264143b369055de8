//! Registry keys with path tracking.
//!
//! An open key cannot report its own path, so [`RegKey`] records it while keys
//! are opened: every key is produced by opening or creating a name below a
//! parent whose path is already known (a well-known root or another `RegKey`).
//! For the same reason there is no way to build a `RegKey` from a raw handle.
//!
//! A key opened under a [`Transaction`] keeps a reference to it, so subkeys
//! opened or created from that key take part in the same unit of work. The
//! key never commits or rolls back that transaction.

use crate::config::{RegistryConfig, TransactionConfig};
use crate::error::{RegTlbError, Result};
use crate::platform::codes;
use crate::store::{Access, KeyStore, RawKey, ValueFilter, ValueType, WellKnownKey};
use crate::transaction::Transaction;
use std::fmt;
use tracing::{debug, warn};

/// An open registry key.
pub struct RegKey<'a> {
    store: &'a dyn KeyStore,
    raw: RawKey,
    path: String,
    rel_path: String,
    transaction: Option<&'a Transaction<'a>>,
}

impl<'a> RegKey<'a> {
    /// Open an existing key `name` below `parent`.
    ///
    /// The open is transacted when a valid `transaction` is supplied.
    ///
    /// # Errors
    /// `ERROR_FILE_NOT_FOUND` if the key does not exist, or any other system
    /// error reported by the store.
    pub fn open(
        store: &'a dyn KeyStore,
        parent: impl Into<RawKey>,
        name: &str,
        access: Access,
        transaction: Option<&'a Transaction<'a>>,
    ) -> Result<RegKey<'a>> {
        let parent = parent.into();
        let transaction = transaction.filter(|tx| tx.is_valid());
        let raw = store.open_key(parent, name, access, transaction.map(Transaction::raw))?;
        debug!("Opened key {}", name);
        Ok(Self::with_path(store, raw, parent, name, transaction))
    }

    /// Open key `name` below `parent`, creating it (and missing ancestors) if needed.
    ///
    /// Created keys are non-volatile.
    pub fn create(
        store: &'a dyn KeyStore,
        parent: impl Into<RawKey>,
        name: &str,
        access: Access,
        transaction: Option<&'a Transaction<'a>>,
    ) -> Result<RegKey<'a>> {
        let parent = parent.into();
        let transaction = transaction.filter(|tx| tx.is_valid());
        let raw = store.create_key(parent, name, access, transaction.map(Transaction::raw))?;
        debug!("Created or opened key {}", name);
        Ok(Self::with_path(store, raw, parent, name, transaction))
    }

    fn with_path(
        store: &'a dyn KeyStore,
        raw: RawKey,
        parent: RawKey,
        name: &str,
        transaction: Option<&'a Transaction<'a>>,
    ) -> RegKey<'a> {
        let root = WellKnownKey::from_raw(parent)
            .map(WellKnownKey::short_name)
            .unwrap_or(RegistryConfig::UNKNOWN_ROOT);
        RegKey {
            store,
            raw,
            path: join(root, name),
            rel_path: name.to_string(),
            transaction,
        }
    }

    pub fn raw(&self) -> RawKey {
        self.raw
    }

    /// Full path, as far as it could be tracked.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path relative to the key this one was opened from.
    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    /// The last component of [`path`](Self::path).
    pub fn name(&self) -> &str {
        match self.path.rsplit_once(RegistryConfig::PATH_SEPARATOR) {
            Some((_, name)) => name,
            None => &self.path,
        }
    }

    pub fn transaction(&self) -> Option<&'a Transaction<'a>> {
        self.transaction
    }

    /// Open a subkey for reading.
    pub fn open_sub_key(&self, name: &str) -> Result<RegKey<'a>> {
        self.open_sub_key_with(name, Access::READ)
    }

    pub fn open_sub_key_with(&self, name: &str, access: Access) -> Result<RegKey<'a>> {
        let mut key = RegKey::open(self.store, self.raw, name, access, self.transaction)?;
        key.path = join(&self.path, name);
        Ok(key)
    }

    /// Create or open a subkey for reading and writing.
    pub fn create_sub_key(&self, name: &str) -> Result<RegKey<'a>> {
        self.create_sub_key_with(name, Access::READ | Access::WRITE)
    }

    pub fn create_sub_key_with(&self, name: &str, access: Access) -> Result<RegKey<'a>> {
        let mut key = RegKey::create(self.store, self.raw, name, access, self.transaction)?;
        key.path = join(&self.path, name);
        Ok(key)
    }

    pub fn sub_key_exists(&self, name: &str) -> Result<bool> {
        RegKey::exists(self.store, self.raw, name, self.transaction)
    }

    /// Delete the subkey `name` and everything below it.
    ///
    /// Runs under `transaction` if given, otherwise under the transaction this
    /// key was opened with, otherwise under a local transaction. Either way
    /// the deletion is all-or-nothing.
    pub fn delete_sub_key(&self, name: &str, transaction: Option<&Transaction<'_>>) -> Result<()> {
        let transaction = match transaction {
            Some(tx) => Some(tx),
            None => self.transaction,
        };
        RegKey::delete_tree(self.store, self.raw, Some(name), true, transaction)
    }

    /// Write a string value. An empty name sets the default value.
    pub fn set_value(&self, name: &str, value: &str) -> Result<()> {
        let data: Vec<u8> = value
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(u16::to_le_bytes)
            .collect();
        self.store.set_value(self.raw, name, ValueType::String, &data)
    }

    /// Write a 32-bit value.
    pub fn set_dw_value(&self, name: &str, value: u32) -> Result<()> {
        self.store
            .set_value(self.raw, name, ValueType::DWord, &value.to_le_bytes())
    }

    /// Read a string value. An empty name reads the default value.
    pub fn get_ws_value(&self, name: &str) -> Result<String> {
        let info = self.store.get_value(self.raw, name, ValueFilter::String, None)?;

        // String data may be stored without a terminator; oversize by one character.
        let mut buffer = vec![0u8; info.size + 2];
        self.store
            .get_value(self.raw, name, ValueFilter::String, Some(&mut buffer))?;

        let wide: Vec<u16> = buffer
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(until_nul(&wide)).map_err(|_| {
            RegTlbError::application(format!(
                "Value '{}' under {} is not valid UTF-16",
                name, self.path
            ))
        })
    }

    /// Read a 32-bit value.
    pub fn get_dw_value(&self, name: &str) -> Result<u32> {
        let mut buffer = [0u8; 4];
        self.store
            .get_value(self.raw, name, ValueFilter::DWord, Some(&mut buffer))?;
        Ok(u32::from_le_bytes(buffer))
    }

    /// Names of the subkeys directly below this key.
    pub fn get_sub_keys(&self) -> Result<Vec<String>> {
        let info = self.store.query_info(self.raw)?;
        self.enumerate(info.sub_keys, info.max_sub_key_len, |index, buffer| {
            self.store.enum_key(self.raw, index, buffer)
        })
    }

    /// Names of the values of this key. The default value has an empty name.
    pub fn get_values(&self) -> Result<Vec<String>> {
        let info = self.store.query_info(self.raw)?;
        self.enumerate(info.values, info.max_value_name_len, |index, buffer| {
            self.store.enum_value(self.raw, index, buffer)
        })
    }

    fn enumerate(
        &self,
        count: u32,
        max_len: u32,
        mut next: impl FnMut(u32, &mut [u16]) -> Result<usize>,
    ) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(count as usize);
        let mut buffer = vec![0u16; max_len as usize + 1];
        for index in 0..count {
            // A shorter name must not pick up the tail of a longer previous one.
            buffer.fill(0);
            next(index, &mut buffer)?;
            names.push(String::from_utf16_lossy(until_nul(&buffer)));
        }
        Ok(names)
    }

    /// Type of a value, without reading its data.
    pub fn get_value_type(&self, name: &str) -> Result<ValueType> {
        Ok(self
            .store
            .get_value(self.raw, name, ValueFilter::Any, None)?
            .kind)
    }

    /// Delete everything below `root\sub_key` and, if requested, `sub_key` itself.
    ///
    /// With no `transaction`, a local transaction is created, committed when
    /// every step succeeded and rolled back otherwise, so the store is either
    /// fully updated or left untouched. A supplied transaction is used as-is
    /// and never committed or rolled back here.
    ///
    /// # Errors
    /// `ERROR_INVALID_PARAMETER` if `root` is null, if `sub_key` is missing,
    /// empty or only separators while `root` is a well-known root, or if
    /// `delete_sub_key` is requested without a `sub_key`. Otherwise the first failing step's error, unchanged.
    pub fn delete_tree(
        store: &dyn KeyStore,
        root: impl Into<RawKey>,
        sub_key: Option<&str>,
        delete_sub_key: bool,
        transaction: Option<&Transaction<'_>>,
    ) -> Result<()> {
        const OP: &str = "RegKey::delete_tree";
        let root = root.into();
        // A name made only of separators refers to `root` itself.
        let sub_key = sub_key.filter(|name| {
            name.split(RegistryConfig::PATH_SEPARATOR)
                .any(|part| !part.is_empty())
        });
        if root.is_null() {
            return Err(RegTlbError::system(codes::ERROR_INVALID_PARAMETER, OP));
        }
        if sub_key.is_none() && RegKey::is_well_known_key(root) {
            return Err(RegTlbError::system(codes::ERROR_INVALID_PARAMETER, OP));
        }
        if delete_sub_key && sub_key.is_none() {
            return Err(RegTlbError::system(codes::ERROR_INVALID_PARAMETER, OP));
        }

        Transaction::scoped(
            store,
            transaction,
            TransactionConfig::DELETE_TREE_DESCRIPTION,
            |transaction| delete_tree_steps(store, root, sub_key, delete_sub_key, transaction),
        )
    }

    /// True if `key` is one of the predefined root pseudo-handles.
    pub fn is_well_known_key(key: RawKey) -> bool {
        WellKnownKey::from_raw(key).is_some()
    }

    /// Probe whether `root\sub_key` exists.
    ///
    /// Only "not found" means `false`; any other failure, such as access
    /// denied, is returned as an error.
    pub fn exists(
        store: &dyn KeyStore,
        root: impl Into<RawKey>,
        sub_key: &str,
        transaction: Option<&Transaction<'_>>,
    ) -> Result<bool> {
        let transaction = transaction.filter(|tx| tx.is_valid()).map(Transaction::raw);
        match store.open_key(root.into(), sub_key, Access::READ, transaction) {
            Ok(raw) => {
                if let Err(e) = store.close_key(raw) {
                    warn!("Failed to close check key {}: {}", sub_key, e);
                }
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Short display name of a well-known root, e.g. `HKCU`.
    pub fn well_known_key_name(key: RawKey) -> Result<&'static str> {
        WellKnownKey::from_raw(key)
            .map(WellKnownKey::short_name)
            .ok_or_else(|| RegTlbError::application("Not a well-known key"))
    }
}

fn delete_tree_steps(
    store: &dyn KeyStore,
    root: RawKey,
    sub_key: Option<&str>,
    delete_sub_key: bool,
    transaction: &Transaction<'_>,
) -> Result<()> {
    {
        let key = RegKey::open(
            store,
            root,
            sub_key.unwrap_or(""),
            Access::READ | Access::WRITE | Access::DELETE,
            Some(transaction),
        )?;
        store.delete_tree(key.raw, None)?;
        debug!("Deleted contents of {}", key.path);
    }

    if let (true, Some(sub_key)) = (delete_sub_key, sub_key) {
        store.delete_key(root, sub_key, Some(transaction.raw()))?;
        debug!("Deleted key {}", sub_key);
    }
    Ok(())
}

fn join(parent: &str, name: &str) -> String {
    format!("{}{}{}", parent, RegistryConfig::PATH_SEPARATOR, name)
}

fn until_nul(wide: &[u16]) -> &[u16] {
    let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    &wide[..end]
}

impl Drop for RegKey<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.close_key(self.raw) {
            warn!("Failed to close key {}: {}", self.path, e);
        }
    }
}

impl fmt::Debug for RegKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegKey")
            .field("raw", &self.raw)
            .field("path", &self.path)
            .field("rel_path", &self.rel_path)
            .field("transacted", &self.transaction.is_some())
            .finish()
    }
}
