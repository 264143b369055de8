//! Shared fixtures for the integration tests.
//!
//! - [`FaultyStore`] wraps a [`MemoryStore`] and fails a chosen operation
//! - [`CatalogBinding`] serves type libraries from an in-memory catalog and
//!   writes registrations into a key store the way the system does

#![allow(dead_code)]

use regtlb_core::platform::codes;
use regtlb_core::{
    Access, KeyInfo, KeyStore, LoadedTypeLib, MemoryStore, RawHandle, RawKey, RegKey,
    RegTlbError, RegistrationScope, Result, SysKind, TypeDescriptor, TypeKind, TypeLibBinding,
    TypeLibIdentity, TypeLibrary, ValueFilter, ValueInfo, ValueType,
};
use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    DeleteTree,
    DeleteKey,
    SetValue,
    Commit,
}

/// A [`MemoryStore`] that fails one kind of operation on demand.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fault: Cell<Option<Fault>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Fail every following `fault` operation with access denied.
    pub fn fail(&self, fault: Fault) {
        self.fault.set(Some(fault));
    }

    pub fn heal(&self) {
        self.fault.set(None);
    }

    fn check(&self, fault: Fault, operation: &str) -> Result<()> {
        if self.fault.get() == Some(fault) {
            return Err(RegTlbError::system(codes::ERROR_ACCESS_DENIED, operation));
        }
        Ok(())
    }
}

impl KeyStore for FaultyStore {
    fn close_handle(&self, handle: RawHandle) -> Result<()> {
        self.inner.close_handle(handle)
    }

    fn duplicate_handle(&self, handle: RawHandle) -> Result<RawHandle> {
        self.inner.duplicate_handle(handle)
    }

    fn create_transaction(&self, description: Option<&str>) -> Result<RawHandle> {
        self.inner.create_transaction(description)
    }

    fn commit_transaction(&self, transaction: RawHandle) -> Result<()> {
        self.check(Fault::Commit, "CommitTransaction")?;
        self.inner.commit_transaction(transaction)
    }

    fn rollback_transaction(&self, transaction: RawHandle) -> Result<()> {
        self.inner.rollback_transaction(transaction)
    }

    fn open_key(
        &self,
        parent: RawKey,
        name: &str,
        access: Access,
        transaction: Option<RawHandle>,
    ) -> Result<RawKey> {
        self.inner.open_key(parent, name, access, transaction)
    }

    fn create_key(
        &self,
        parent: RawKey,
        name: &str,
        access: Access,
        transaction: Option<RawHandle>,
    ) -> Result<RawKey> {
        self.inner.create_key(parent, name, access, transaction)
    }

    fn close_key(&self, key: RawKey) -> Result<()> {
        self.inner.close_key(key)
    }

    fn delete_tree(&self, key: RawKey, sub_key: Option<&str>) -> Result<()> {
        self.check(Fault::DeleteTree, "RegDeleteTreeW")?;
        self.inner.delete_tree(key, sub_key)
    }

    fn delete_key(
        &self,
        parent: RawKey,
        name: &str,
        transaction: Option<RawHandle>,
    ) -> Result<()> {
        self.check(Fault::DeleteKey, "RegDeleteKeyTransactedW")?;
        self.inner.delete_key(parent, name, transaction)
    }

    fn set_value(&self, key: RawKey, name: &str, kind: ValueType, data: &[u8]) -> Result<()> {
        self.check(Fault::SetValue, "RegSetValueExW")?;
        self.inner.set_value(key, name, kind, data)
    }

    fn get_value(
        &self,
        key: RawKey,
        name: &str,
        filter: ValueFilter,
        buffer: Option<&mut [u8]>,
    ) -> Result<ValueInfo> {
        self.inner.get_value(key, name, filter, buffer)
    }

    fn query_info(&self, key: RawKey) -> Result<KeyInfo> {
        self.inner.query_info(key)
    }

    fn enum_key(&self, key: RawKey, index: u32, name: &mut [u16]) -> Result<usize> {
        self.inner.enum_key(key, index, name)
    }

    fn enum_value(&self, key: RawKey, index: u32, name: &mut [u16]) -> Result<usize> {
        self.inner.enum_value(key, index, name)
    }
}

/// A library served by [`CatalogBinding`].
#[derive(Debug, Clone)]
pub struct CatalogLibrary {
    identity: TypeLibIdentity,
    descriptors: Vec<TypeDescriptor>,
}

impl LoadedTypeLib for CatalogLibrary {
    fn identity(&self) -> Result<TypeLibIdentity> {
        Ok(self.identity.clone())
    }

    fn descriptors(&self) -> Result<Vec<TypeDescriptor>> {
        Ok(self.descriptors.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Type library services over a catalog keyed by file name.
///
/// Registration writes the conventional `TypeLib\{GUID}` layout into the store;
/// unregistering something that is not registered fails the way the system
/// call does.
pub struct CatalogBinding<'s> {
    store: &'s dyn KeyStore,
    libraries: HashMap<String, CatalogLibrary>,
}

impl<'s> CatalogBinding<'s> {
    pub fn new(store: &'s dyn KeyStore) -> Self {
        Self {
            store,
            libraries: HashMap::new(),
        }
    }

    pub fn with_library(
        mut self,
        file_name: &str,
        identity: TypeLibIdentity,
        descriptors: Vec<TypeDescriptor>,
    ) -> Self {
        self.libraries.insert(
            file_name.to_ascii_lowercase(),
            CatalogLibrary {
                identity,
                descriptors,
            },
        );
        self
    }
}

fn file_key(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase())
}

impl TypeLibBinding for CatalogBinding<'_> {
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedTypeLib>> {
        file_key(path)
            .and_then(|key| self.libraries.get(&key))
            .map(|library| Box::new(library.clone()) as Box<dyn LoadedTypeLib>)
            .ok_or_else(|| {
                RegTlbError::result_code(codes::TYPE_E_CANTLOADLIBRARY, "LoadTypeLibEx")
            })
    }

    fn register(
        &self,
        library: &dyn LoadedTypeLib,
        path: &Path,
        scope: RegistrationScope,
    ) -> Result<()> {
        let library = library
            .as_any()
            .downcast_ref::<CatalogLibrary>()
            .ok_or_else(|| RegTlbError::application("Library was not loaded by the catalog"))?;
        let identity = &library.identity;

        let record = RegKey::create(
            self.store,
            scope.root(),
            &TypeLibrary::registry_path(&identity.guid),
            Access::READ | Access::WRITE,
            None,
        )?;
        let version = record.create_sub_key(&identity.version_key())?;
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        version.set_value("", &format!("{} Type Library", stem))?;
        version.create_sub_key("FLAGS")?.set_value("", "0")?;
        let helpdir = path.parent().map(PathBuf::from).unwrap_or_default();
        version
            .create_sub_key("HELPDIR")?
            .set_value("", &helpdir.display().to_string())?;
        version
            .create_sub_key(&format!("{}\\{}", identity.locale_key(), identity.syskind))?
            .set_value("", &path.display().to_string())?;
        Ok(())
    }

    fn unregister(&self, identity: &TypeLibIdentity, scope: RegistrationScope) -> Result<()> {
        let operation = match scope {
            RegistrationScope::User => "UnRegisterTypeLibForUser",
            RegistrationScope::Machine => "UnRegisterTypeLib",
        };
        let record = TypeLibrary::registry_path(&identity.guid);
        let version = format!("{}\\{}", record, identity.version_key());
        let entry = format!("{}\\{}\\{}", version, identity.locale_key(), identity.syskind);

        if !RegKey::exists(self.store, scope.root(), &entry, None)? {
            return Err(RegTlbError::result_code(codes::TYPE_E_REGISTRYACCESS, operation));
        }
        RegKey::delete_tree(self.store, scope.root(), Some(&version), true, None)?;

        let remaining = RegKey::open(self.store, scope.root(), &record, Access::READ, None)?
            .get_sub_keys()?;
        if remaining.is_empty() {
            RegKey::delete_tree(self.store, scope.root(), Some(&record), true, None)?;
        }
        Ok(())
    }
}

pub fn guid(text: &str) -> Uuid {
    regtlb_core::parse_guid(text).unwrap()
}

/// Identity and declared types of a small sample library.
pub fn sample_library() -> (TypeLibIdentity, Vec<TypeDescriptor>) {
    let identity = TypeLibIdentity::new(
        guid("{3F2504E0-4F89-11D3-9A0C-0305E82C3301}"),
        1,
        0,
        SysKind::Win32,
    );
    let descriptors = vec![
        TypeDescriptor {
            guid: guid("{3F2504E0-4F89-11D3-9A0C-0305E82C3310}"),
            kind: TypeKind::Interface,
        },
        TypeDescriptor {
            guid: guid("{3F2504E0-4F89-11D3-9A0C-0305E82C3311}"),
            kind: TypeKind::Dispatch,
        },
        TypeDescriptor {
            guid: guid("{3F2504E0-4F89-11D3-9A0C-0305E82C3312}"),
            kind: TypeKind::CoClass,
        },
        TypeDescriptor {
            guid: guid("{3F2504E0-4F89-11D3-9A0C-0305E82C3313}"),
            kind: TypeKind::Enum,
        },
    ];
    (identity, descriptors)
}
