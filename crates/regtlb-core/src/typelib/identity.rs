//! Type library identity and declared-type classification.

use crate::config::TypeLibConfig;
use crate::error::{RegTlbError, Result};
use crate::guid::format_guid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Target platform word size a library was built for (`SYSKIND`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SysKind {
    Win16,
    Win32,
    Mac,
    Win64,
}

impl SysKind {
    pub fn from_raw(raw: i32) -> Option<SysKind> {
        match raw {
            0 => Some(SysKind::Win16),
            1 => Some(SysKind::Win32),
            2 => Some(SysKind::Mac),
            3 => Some(SysKind::Win64),
            _ => None,
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            SysKind::Win16 => 0,
            SysKind::Win32 => 1,
            SysKind::Mac => 2,
            SysKind::Win64 => 3,
        }
    }

    /// Name used for the platform subkey of a registration.
    pub fn as_str(self) -> &'static str {
        match self {
            SysKind::Win16 => "win16",
            SysKind::Win32 => "win32",
            SysKind::Mac => "mac",
            SysKind::Win64 => "win64",
        }
    }
}

impl fmt::Display for SysKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SysKind {
    type Err = RegTlbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "win16" => Ok(SysKind::Win16),
            "win32" => Ok(SysKind::Win32),
            "mac" => Ok(SysKind::Mac),
            "win64" => Ok(SysKind::Win64),
            _ => Err(RegTlbError::application(format!("Unknown syskind '{}'", s))),
        }
    }
}

/// Everything that identifies one registration of a type library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeLibIdentity {
    pub guid: Uuid,
    pub major: u16,
    pub minor: u16,
    pub locale: u32,
    pub syskind: SysKind,
}

impl TypeLibIdentity {
    pub fn new(guid: Uuid, major: u16, minor: u16, syskind: SysKind) -> Self {
        Self {
            guid,
            major,
            minor,
            locale: TypeLibConfig::DEFAULT_LOCALE,
            syskind,
        }
    }

    pub fn with_locale(mut self, locale: u32) -> Self {
        self.locale = locale;
        self
    }

    /// Name of the version subkey, `major.minor` in hex.
    pub fn version_key(&self) -> String {
        format!("{:x}.{:x}", self.major, self.minor)
    }

    /// Name of the locale subkey, in hex.
    pub fn locale_key(&self) -> String {
        format!("{:x}", self.locale)
    }

    /// Parse a version subkey name back into `(major, minor)`.
    pub fn parse_version_key(name: &str) -> Option<(u16, u16)> {
        let (major, minor) = name.split_once('.')?;
        Some((
            u16::from_str_radix(major, 16).ok()?,
            u16::from_str_radix(minor, 16).ok()?,
        ))
    }

    /// Parse a locale subkey name.
    pub fn parse_locale_key(name: &str) -> Option<u32> {
        u32::from_str_radix(name, 16).ok()
    }
}

impl fmt::Display for TypeLibIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{} lcid {} {}",
            format_guid(&self.guid),
            self.major,
            self.minor,
            self.locale,
            self.syskind
        )
    }
}

/// Kind of a declared type (`TYPEKIND`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Enum,
    Record,
    Module,
    Interface,
    Dispatch,
    CoClass,
    Alias,
    Union,
    Other(i32),
}

impl TypeKind {
    pub fn from_raw(raw: i32) -> TypeKind {
        match raw {
            0 => TypeKind::Enum,
            1 => TypeKind::Record,
            2 => TypeKind::Module,
            3 => TypeKind::Interface,
            4 => TypeKind::Dispatch,
            5 => TypeKind::CoClass,
            6 => TypeKind::Alias,
            7 => TypeKind::Union,
            other => TypeKind::Other(other),
        }
    }
}

/// One type declared by a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub guid: Uuid,
    pub kind: TypeKind,
}

/// Identity of a library plus the GUIDs of the types it exposes through COM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeLibInfo {
    pub identity: TypeLibIdentity,
    pub co_classes: Vec<Uuid>,
    pub interfaces: Vec<Uuid>,
    pub dispatch_interfaces: Vec<Uuid>,
}

impl TypeLibInfo {
    /// Classify declared types by kind.
    ///
    /// Interfaces, dispatch interfaces and coclasses each go to their own list;
    /// other kinds are only used internally by the library and are skipped.
    /// A GUID lands in at most one list, at its first occurrence.
    pub fn from_descriptors(
        identity: TypeLibIdentity,
        descriptors: impl IntoIterator<Item = TypeDescriptor>,
    ) -> Self {
        let mut info = Self {
            identity,
            co_classes: Vec::new(),
            interfaces: Vec::new(),
            dispatch_interfaces: Vec::new(),
        };

        for descriptor in descriptors {
            if info.contains(&descriptor.guid) {
                continue;
            }
            match descriptor.kind {
                TypeKind::Interface => info.interfaces.push(descriptor.guid),
                TypeKind::Dispatch => info.dispatch_interfaces.push(descriptor.guid),
                TypeKind::CoClass => info.co_classes.push(descriptor.guid),
                _ => {}
            }
        }
        info
    }

    pub fn contains(&self, guid: &Uuid) -> bool {
        self.co_classes.contains(guid)
            || self.interfaces.contains(guid)
            || self.dispatch_interfaces.contains(guid)
    }
}

/// One registered (version, locale, syskind) entry read back from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub identity: TypeLibIdentity,
    /// Display name stored on the version key.
    pub name: Option<String>,
    /// Library file stored on the platform key.
    pub path: Option<String>,
}
