//! Type library registration.
//!
//! [`TypeLibrary`] wraps a library loaded from a file and registers or
//! unregisters it. The associated functions work from an identity alone and
//! read the registration records directly from the key store, which is what is
//! needed to clean up after a library file has disappeared.

use super::binding::{LoadedTypeLib, RegistrationScope, TypeLibBinding};
use super::identity::{Registration, SysKind, TypeLibIdentity, TypeLibInfo};
use crate::config::{RegistryConfig, TransactionConfig, TypeLibConfig};
use crate::error::{RegTlbError, Result};
use crate::guid::format_guid;
use crate::key::RegKey;
use crate::store::{Access, KeyStore};
use crate::transaction::Transaction;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// A type library loaded from a file.
pub struct TypeLibrary<'b> {
    binding: &'b dyn TypeLibBinding,
    library: Box<dyn LoadedTypeLib>,
    path: PathBuf,
    info: TypeLibInfo,
}

impl<'b> TypeLibrary<'b> {
    /// Load the library at `path` and read its identity and declared types.
    ///
    /// Relative paths are made absolute first, since registration records
    /// the path as given.
    pub fn load(binding: &'b dyn TypeLibBinding, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path = std::path::absolute(path).map_err(|e| RegTlbError::io_with_path(e, path))?;

        let library = binding.load(&path)?;
        let identity = library.identity()?;
        let info = TypeLibInfo::from_descriptors(identity, library.descriptors()?);
        debug!(
            "Loaded type library {} ({} coclasses, {} interfaces, {} dispatch interfaces)",
            info.identity,
            info.co_classes.len(),
            info.interfaces.len(),
            info.dispatch_interfaces.len()
        );

        Ok(Self {
            binding,
            library,
            path,
            info,
        })
    }

    pub fn info(&self) -> &TypeLibInfo {
        &self.info
    }

    pub fn identity(&self) -> &TypeLibIdentity {
        &self.info.identity
    }

    /// Absolute path of the library file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn register(&self, scope: RegistrationScope) -> Result<()> {
        self.binding
            .register(self.library.as_ref(), &self.path, scope)?;
        info!(
            "Registered type library {} for {} from {}",
            self.info.identity,
            scope.hive_name(),
            self.path.display()
        );
        Ok(())
    }

    /// Unregister using the identity stored in the library.
    pub fn unregister(&self, scope: RegistrationScope) -> Result<()> {
        Self::unregister_identity(self.binding, &self.info.identity, scope)
    }

    /// Unregister a library known only by its identity.
    pub fn unregister_identity(
        binding: &dyn TypeLibBinding,
        identity: &TypeLibIdentity,
        scope: RegistrationScope,
    ) -> Result<()> {
        binding.unregister(identity, scope)?;
        info!(
            "Unregistered type library {} for {}",
            identity,
            scope.hive_name()
        );
        Ok(())
    }

    /// Registry path of the registration record for `guid`, relative to the scope root.
    pub fn registry_path(guid: &Uuid) -> String {
        format!(
            "{}{}{}",
            TypeLibConfig::TYPELIB_KEY_PATH,
            RegistryConfig::PATH_SEPARATOR,
            format_guid(guid)
        )
    }

    /// True if any version of `guid` is registered in `scope`.
    pub fn exists(store: &dyn KeyStore, guid: &Uuid, scope: RegistrationScope) -> Result<bool> {
        RegKey::exists(store, scope.root(), &Self::registry_path(guid), None)
    }

    /// Every (version, locale, syskind) registered for `guid` in `scope`.
    ///
    /// Subkeys that do not follow the registration layout are skipped.
    pub fn registrations(
        store: &dyn KeyStore,
        guid: &Uuid,
        scope: RegistrationScope,
    ) -> Result<Vec<Registration>> {
        let key = match RegKey::open(
            store,
            scope.root(),
            &Self::registry_path(guid),
            Access::READ,
            None,
        ) {
            Ok(key) => key,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut found = Vec::new();
        for version_name in key.get_sub_keys()? {
            let Some((major, minor)) = TypeLibIdentity::parse_version_key(&version_name) else {
                debug!("Skipping {}\\{}", key.path(), version_name);
                continue;
            };
            let version = key.open_sub_key(&version_name)?;
            let name = default_value(&version)?;

            for locale_name in version.get_sub_keys()? {
                if is_reserved(&locale_name) {
                    continue;
                }
                let Some(locale) = TypeLibIdentity::parse_locale_key(&locale_name) else {
                    debug!("Skipping {}\\{}", version.path(), locale_name);
                    continue;
                };
                let locale_key = version.open_sub_key(&locale_name)?;

                for kind_name in locale_key.get_sub_keys()? {
                    let Ok(syskind) = kind_name.parse::<SysKind>() else {
                        debug!("Skipping {}\\{}", locale_key.path(), kind_name);
                        continue;
                    };
                    let kind_key = locale_key.open_sub_key(&kind_name)?;
                    found.push(Registration {
                        identity: TypeLibIdentity::new(*guid, major, minor, syskind)
                            .with_locale(locale),
                        name: name.clone(),
                        path: default_value(&kind_key)?,
                    });
                }
            }
        }
        Ok(found)
    }

    /// Remove every registration of `guid` in `scope`, whatever its version.
    ///
    /// The whole record is deleted as one unit of work: under `transaction`
    /// if given, otherwise under a local transaction. Returns `false` if
    /// nothing was registered.
    pub fn purge(
        store: &dyn KeyStore,
        guid: &Uuid,
        scope: RegistrationScope,
        transaction: Option<&Transaction<'_>>,
    ) -> Result<bool> {
        let path = Self::registry_path(guid);
        let root = scope.root();

        let removed = Transaction::scoped(
            store,
            transaction,
            TransactionConfig::PURGE_DESCRIPTION,
            |transaction| {
                if !RegKey::exists(store, root, &path, Some(transaction))? {
                    return Ok(false);
                }
                RegKey::delete_tree(store, root, Some(&path), true, Some(transaction))?;
                Ok(true)
            },
        )?;

        if removed {
            info!("Purged {}\\{}", root, path);
        }
        Ok(removed)
    }
}

impl fmt::Debug for TypeLibrary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeLibrary")
            .field("library", &self.library)
            .field("path", &self.path)
            .field("info", &self.info)
            .finish()
    }
}

fn is_reserved(name: &str) -> bool {
    name.eq_ignore_ascii_case(TypeLibConfig::FLAGS_KEY)
        || name.eq_ignore_ascii_case(TypeLibConfig::HELPDIR_KEY)
}

/// The default string value of `key`, if it has one.
fn default_value(key: &RegKey<'_>) -> Result<Option<String>> {
    match key.get_ws_value("") {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
