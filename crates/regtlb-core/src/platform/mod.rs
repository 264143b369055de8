//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live here or in the backend
//! modules they select, rather than scattered through the key and
//! registration layers.
//!
//! - `codes` - the system error codes and result codes this crate inspects
//! - `message` - decoding of those codes into text
//!
//! # Supported Platforms
//!
//! - **Windows**: Full support (system registry and OLE automation)
//! - **Other**: In-memory key store only; system services report an error

pub mod codes;
pub mod message;

use crate::error::Result;
use crate::store::KeyStore;
use crate::typelib::TypeLibBinding;

#[cfg(not(windows))]
use crate::error::RegTlbError;

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "macos"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}

/// Returns true if the system registry and type library services are available.
pub fn is_supported_platform() -> bool {
    cfg!(windows)
}

/// The system key store.
///
/// # Platform Behavior
/// - **Windows**: The registry, with kernel transactions
/// - **Other**: Fails with an application error
pub fn system_store() -> Result<Box<dyn KeyStore>> {
    #[cfg(windows)]
    {
        Ok(Box::new(crate::store::WindowsRegistry::new()))
    }

    #[cfg(not(windows))]
    {
        Err(unsupported("The system registry"))
    }
}

/// The system type library services.
///
/// # Platform Behavior
/// - **Windows**: OLE automation (`LoadTypeLibEx`, `RegisterTypeLib`, ...)
/// - **Other**: Fails with an application error
pub fn system_binding() -> Result<Box<dyn TypeLibBinding>> {
    #[cfg(windows)]
    {
        Ok(Box::new(crate::typelib::ComBinding::new()))
    }

    #[cfg(not(windows))]
    {
        Err(unsupported("Type library registration"))
    }
}

#[cfg(not(windows))]
fn unsupported(what: &str) -> RegTlbError {
    RegTlbError::application(format!(
        "{} is not available on {}",
        what,
        current_platform()
    ))
}
