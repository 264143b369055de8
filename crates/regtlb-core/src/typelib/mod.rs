//! Type library identity, loading and registration.
//!
//! - `identity` - identity records and declared-type classification
//! - `binding` - the system services trait and registration scope
//! - `library` - register, unregister, query and purge
//! - `com` - OLE automation binding (Windows only)

pub mod binding;
#[cfg(windows)]
pub mod com;
pub mod identity;
pub mod library;

pub use binding::{LoadedTypeLib, RegistrationScope, TypeLibBinding};
#[cfg(windows)]
pub use com::ComBinding;
pub use identity::{
    Registration, SysKind, TypeDescriptor, TypeKind, TypeLibIdentity, TypeLibInfo,
};
pub use library::TypeLibrary;
