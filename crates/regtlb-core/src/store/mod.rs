//! Key store backends.
//!
//! [`KeyStore`] is the boundary between the handle/key/transaction types and the
//! system that actually holds the data. Every method corresponds to one system
//! call and reports failures as [`RegTlbError::System`](crate::RegTlbError) with
//! the Win32 error code, so the layers above behave the same regardless of the
//! backend.
//!
//! - [`MemoryStore`] - in-process transactional store, available everywhere
//! - `WindowsRegistry` - the Windows registry and kernel transaction manager

pub mod memory;
#[cfg(windows)]
pub mod windows;

pub use memory::MemoryStore;
#[cfg(windows)]
pub use self::windows::WindowsRegistry;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Raw value of an opaque system handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub isize);

impl RawHandle {
    pub const NULL: RawHandle = RawHandle(0);
    pub const INVALID: RawHandle = RawHandle(-1);

    /// Neither null nor `INVALID_HANDLE_VALUE`.
    pub fn is_valid(self) -> bool {
        self != Self::NULL && self != Self::INVALID
    }
}

/// Raw value of an open registry key or a predefined root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawKey(pub isize);

impl RawKey {
    pub const NULL: RawKey = RawKey(0);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

/// The predefined registry roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WellKnownKey {
    ClassesRoot,
    CurrentUser,
    LocalMachine,
    Users,
    PerformanceData,
    PerformanceText,
    PerformanceNlsText,
    CurrentConfig,
    DynData,
    CurrentUserLocalSettings,
}

impl WellKnownKey {
    pub const ALL: [WellKnownKey; 10] = [
        WellKnownKey::ClassesRoot,
        WellKnownKey::CurrentUser,
        WellKnownKey::LocalMachine,
        WellKnownKey::Users,
        WellKnownKey::PerformanceData,
        WellKnownKey::PerformanceText,
        WellKnownKey::PerformanceNlsText,
        WellKnownKey::CurrentConfig,
        WellKnownKey::DynData,
        WellKnownKey::CurrentUserLocalSettings,
    ];

    /// The pseudo-handle value Windows uses for this root.
    pub const fn raw(self) -> RawKey {
        let value: u32 = match self {
            WellKnownKey::ClassesRoot => 0x8000_0000,
            WellKnownKey::CurrentUser => 0x8000_0001,
            WellKnownKey::LocalMachine => 0x8000_0002,
            WellKnownKey::Users => 0x8000_0003,
            WellKnownKey::PerformanceData => 0x8000_0004,
            WellKnownKey::CurrentConfig => 0x8000_0005,
            WellKnownKey::DynData => 0x8000_0006,
            WellKnownKey::CurrentUserLocalSettings => 0x8000_0007,
            WellKnownKey::PerformanceText => 0x8000_0050,
            WellKnownKey::PerformanceNlsText => 0x8000_0060,
        };
        // Predefined keys are sign-extended 32-bit values.
        RawKey(value as i32 as isize)
    }

    pub fn from_raw(raw: RawKey) -> Option<WellKnownKey> {
        Self::ALL.into_iter().find(|key| key.raw() == raw)
    }

    /// Short canonical display name, e.g. `HKLM`.
    pub const fn short_name(self) -> &'static str {
        match self {
            WellKnownKey::LocalMachine => "HKLM",
            WellKnownKey::Users => "HKU",
            WellKnownKey::CurrentUser => "HKCU",
            WellKnownKey::ClassesRoot => "HKCR",
            WellKnownKey::PerformanceData => "HKPD",
            WellKnownKey::PerformanceText => "HKPT",
            WellKnownKey::PerformanceNlsText => "HKPN",
            WellKnownKey::CurrentConfig => "HKCC",
            WellKnownKey::DynData => "HKDD",
            WellKnownKey::CurrentUserLocalSettings => "HKCULS",
        }
    }
}

impl From<WellKnownKey> for RawKey {
    fn from(key: WellKnownKey) -> Self {
        key.raw()
    }
}

impl fmt::Display for WellKnownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Requested access rights for an open key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Access(pub u32);

impl Access {
    /// `KEY_READ`
    pub const READ: Access = Access(0x0002_0019);
    /// `KEY_WRITE`
    pub const WRITE: Access = Access(0x0002_0006);
    /// `DELETE`, needed to delete a whole tree through an open key.
    pub const DELETE: Access = Access(0x0001_0000);
    /// `KEY_SET_VALUE`, the bit that distinguishes write from read access.
    const SET_VALUE: u32 = 0x0002;

    pub fn allows_write(self) -> bool {
        self.0 & Self::SET_VALUE != 0
    }
}

impl BitOr for Access {
    type Output = Access;

    fn bitor(self, rhs: Access) -> Access {
        Access(self.0 | rhs.0)
    }
}

/// Registry value type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    None,
    String,
    ExpandString,
    Binary,
    DWord,
    DWordBigEndian,
    Link,
    MultiString,
    QWord,
    Other(u32),
}

impl ValueType {
    pub fn from_raw(raw: u32) -> ValueType {
        match raw {
            0 => ValueType::None,
            1 => ValueType::String,
            2 => ValueType::ExpandString,
            3 => ValueType::Binary,
            4 => ValueType::DWord,
            5 => ValueType::DWordBigEndian,
            6 => ValueType::Link,
            7 => ValueType::MultiString,
            11 => ValueType::QWord,
            other => ValueType::Other(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            ValueType::None => 0,
            ValueType::String => 1,
            ValueType::ExpandString => 2,
            ValueType::Binary => 3,
            ValueType::DWord => 4,
            ValueType::DWordBigEndian => 5,
            ValueType::Link => 6,
            ValueType::MultiString => 7,
            ValueType::QWord => 11,
            ValueType::Other(other) => other,
        }
    }
}

/// Which value types a read accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFilter {
    /// `RRF_RT_ANY`
    Any,
    /// `RRF_RT_REG_SZ`
    String,
    /// `RRF_RT_REG_DWORD`
    DWord,
}

impl ValueFilter {
    pub fn raw(self) -> u32 {
        match self {
            ValueFilter::Any => 0x0000_ffff,
            ValueFilter::String => 0x0000_0002,
            ValueFilter::DWord => 0x0000_0010,
        }
    }

    pub fn accepts(self, kind: ValueType) -> bool {
        match self {
            ValueFilter::Any => true,
            ValueFilter::String => kind == ValueType::String,
            ValueFilter::DWord => kind == ValueType::DWord,
        }
    }
}

/// Result of a value query: its type and the byte size of its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueInfo {
    pub kind: ValueType,
    pub size: usize,
}

/// Counts and maximum name lengths (in UTF-16 units, without terminator).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyInfo {
    pub sub_keys: u32,
    pub max_sub_key_len: u32,
    pub values: u32,
    pub max_value_name_len: u32,
}

/// The system operations the handle, transaction and key types are built on.
///
/// Raw handles returned from `create_transaction`, `duplicate_handle`,
/// `open_key` and `create_key` are owned by the caller and must be released
/// through `close_handle` / `close_key`.
pub trait KeyStore {
    /// Release a generic handle (`CloseHandle`).
    fn close_handle(&self, handle: RawHandle) -> Result<()>;

    /// Duplicate a generic handle within the current process (`DuplicateHandle`).
    fn duplicate_handle(&self, handle: RawHandle) -> Result<RawHandle>;

    /// Begin a transaction with default isolation and timeout (`CreateTransaction`).
    fn create_transaction(&self, description: Option<&str>) -> Result<RawHandle>;

    fn commit_transaction(&self, transaction: RawHandle) -> Result<()>;

    fn rollback_transaction(&self, transaction: RawHandle) -> Result<()>;

    /// Open an existing key (`RegOpenKeyExW` / `RegOpenKeyTransactedW`).
    fn open_key(
        &self,
        parent: RawKey,
        name: &str,
        access: Access,
        transaction: Option<RawHandle>,
    ) -> Result<RawKey>;

    /// Open a key, creating it and any missing ancestors as non-volatile keys
    /// (`RegCreateKeyExW` / `RegCreateKeyTransactedW`).
    fn create_key(
        &self,
        parent: RawKey,
        name: &str,
        access: Access,
        transaction: Option<RawHandle>,
    ) -> Result<RawKey>;

    fn close_key(&self, key: RawKey) -> Result<()>;

    /// Delete the values and subkeys of `key`, or the whole `sub_key` subtree
    /// when one is given (`RegDeleteTreeW`).
    fn delete_tree(&self, key: RawKey, sub_key: Option<&str>) -> Result<()>;

    /// Delete a single key that has no subkeys (`RegDeleteKeyTransactedW`).
    fn delete_key(&self, parent: RawKey, name: &str, transaction: Option<RawHandle>)
        -> Result<()>;

    fn set_value(&self, key: RawKey, name: &str, kind: ValueType, data: &[u8]) -> Result<()>;

    /// Read a value (`RegGetValueW`).
    ///
    /// With no buffer, reports the required size. String data is always
    /// terminated in the output, and the reported size accounts for that.
    fn get_value(
        &self,
        key: RawKey,
        name: &str,
        filter: ValueFilter,
        buffer: Option<&mut [u8]>,
    ) -> Result<ValueInfo>;

    /// Counts and maximum name lengths (`RegQueryInfoKeyW`).
    fn query_info(&self, key: RawKey) -> Result<KeyInfo>;

    /// Copy the name of subkey `index` into `name`, terminated; returns its length
    /// (`RegEnumKeyExW`).
    fn enum_key(&self, key: RawKey, index: u32, name: &mut [u16]) -> Result<usize>;

    /// Copy the name of value `index` into `name`, terminated; returns its length
    /// (`RegEnumValueW`).
    fn enum_value(&self, key: RawKey, index: u32, name: &mut [u16]) -> Result<usize>;
}
