//! Centralized configuration for regtlb.
//!
//! This module provides the registry layout constants and fixed parameters
//! shared by the key, transaction and registration layers.

/// Registry naming conventions.
pub struct RegistryConfig;

impl RegistryConfig {
    pub const PATH_SEPARATOR: &'static str = "\\";
    /// Root marker used in paths of keys opened below a non-root parent handle.
    pub const UNKNOWN_ROOT: &'static str = "<Unknown>";
}

/// Transaction parameters.
pub struct TransactionConfig;

impl TransactionConfig {
    pub const DELETE_TREE_DESCRIPTION: &'static str = "regtlb delete tree";
    pub const PURGE_DESCRIPTION: &'static str = "regtlb purge type library";
}

/// Type library registration layout.
pub struct TypeLibConfig;

impl TypeLibConfig {
    /// Registration records live below this path in HKCU or HKLM.
    pub const TYPELIB_KEY_PATH: &'static str = "Software\\Classes\\TypeLib";
    // Non-version subkeys that may appear below a GUID or version key
    pub const FLAGS_KEY: &'static str = "FLAGS";
    pub const HELPDIR_KEY: &'static str = "HELPDIR";
    /// Locale used when an identity does not name one (LANG_NEUTRAL).
    pub const DEFAULT_LOCALE: u32 = 0;
}
