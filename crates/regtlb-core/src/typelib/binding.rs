//! The seam between registration logic and the system type library services.

use super::identity::{TypeDescriptor, TypeLibIdentity};
use crate::error::Result;
use crate::store::WellKnownKey;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::path::Path;

/// Whether a registration applies to the current user or the whole machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationScope {
    User,
    Machine,
}

impl RegistrationScope {
    pub fn from_per_user(per_user: bool) -> Self {
        if per_user {
            RegistrationScope::User
        } else {
            RegistrationScope::Machine
        }
    }

    pub fn is_per_user(self) -> bool {
        self == RegistrationScope::User
    }

    /// Registry root holding registrations for this scope.
    pub fn root(self) -> WellKnownKey {
        match self {
            RegistrationScope::User => WellKnownKey::CurrentUser,
            RegistrationScope::Machine => WellKnownKey::LocalMachine,
        }
    }

    /// Name of the hive, as shown to users.
    pub fn hive_name(self) -> &'static str {
        match self {
            RegistrationScope::User => "user",
            RegistrationScope::Machine => "machine",
        }
    }
}

/// A type library loaded by a [`TypeLibBinding`].
pub trait LoadedTypeLib: fmt::Debug {
    /// GUID, version, locale and syskind stored in the library.
    fn identity(&self) -> Result<TypeLibIdentity>;

    /// Every type the library declares, in declaration order.
    fn descriptors(&self) -> Result<Vec<TypeDescriptor>>;

    /// Lets a binding recover its own concrete type in [`TypeLibBinding::register`].
    fn as_any(&self) -> &dyn Any;
}

/// System services for loading and (un)registering type libraries.
pub trait TypeLibBinding {
    /// Load the library at `path` without registering it.
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedTypeLib>>;

    /// Register a library previously returned by [`load`](Self::load).
    ///
    /// `path` must be absolute; it is what the registration records.
    fn register(&self, library: &dyn LoadedTypeLib, path: &Path, scope: RegistrationScope)
        -> Result<()>;

    /// Remove the registration of exactly `identity`.
    fn unregister(&self, identity: &TypeLibIdentity, scope: RegistrationScope) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_roots() {
        assert_eq!(RegistrationScope::from_per_user(true), RegistrationScope::User);
        assert_eq!(RegistrationScope::from_per_user(false), RegistrationScope::Machine);
        assert_eq!(RegistrationScope::User.root(), WellKnownKey::CurrentUser);
        assert_eq!(RegistrationScope::Machine.root(), WellKnownKey::LocalMachine);
        assert!(RegistrationScope::User.is_per_user());
        assert_eq!(RegistrationScope::Machine.hive_name(), "machine");
    }
}
