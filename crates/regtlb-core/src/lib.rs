//! regtlb core - transactional registry access and type library registration.
//!
//! This crate provides owned system handles, kernel transactions, registry
//! keys that track their own path, and the registration engine that installs,
//! removes and inspects COM type library registrations.
//!
//! The system is reached through two traits: [`KeyStore`] for the registry and
//! [`TypeLibBinding`] for the type library services. On Windows,
//! [`platform::system_store`] and [`platform::system_binding`] return the real
//! implementations; [`MemoryStore`] works everywhere.
//!
//! # Example
//!
//! ```rust
//! use regtlb_core::{Access, MemoryStore, RegKey, Transaction, WellKnownKey};
//!
//! # fn main() -> regtlb_core::Result<()> {
//! let store = MemoryStore::new();
//! let tx = Transaction::create(&store, Some("example"))?;
//! {
//!     let key = RegKey::create(
//!         &store,
//!         WellKnownKey::CurrentUser,
//!         "Software\\Example",
//!         Access::READ | Access::WRITE,
//!         Some(&tx),
//!     )?;
//!     key.set_value("", "hello")?;
//!     assert_eq!(key.path(), "HKCU\\Software\\Example");
//! }
//! tx.commit()?;
//! assert!(RegKey::exists(&store, WellKnownKey::CurrentUser, "Software\\Example", None)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod guid;
pub mod handle;
pub mod key;
pub mod platform;
pub mod store;
pub mod transaction;
pub mod typelib;

// Re-export commonly used types
pub use error::{RegTlbError, Result};
pub use guid::{format_guid, parse_guid};
pub use handle::Handle;
pub use key::RegKey;
pub use store::{
    Access, KeyInfo, KeyStore, MemoryStore, RawHandle, RawKey, ValueFilter, ValueInfo,
    ValueType, WellKnownKey,
};
pub use transaction::Transaction;
pub use typelib::{
    LoadedTypeLib, Registration, RegistrationScope, SysKind, TypeDescriptor, TypeKind,
    TypeLibBinding, TypeLibIdentity, TypeLibInfo, TypeLibrary,
};
