//! Numeric system and result codes.
//!
//! These are the documented Win32 values. They are defined here rather than
//! pulled from `windows-sys` so that the in-memory store and the error
//! classification work on every platform.

pub const ERROR_SUCCESS: u32 = 0;
pub const ERROR_FILE_NOT_FOUND: u32 = 2;
pub const ERROR_ACCESS_DENIED: u32 = 5;
pub const ERROR_INVALID_HANDLE: u32 = 6;
pub const ERROR_INVALID_PARAMETER: u32 = 87;
pub const ERROR_MORE_DATA: u32 = 234;
pub const ERROR_NO_MORE_ITEMS: u32 = 259;
pub const ERROR_KEY_DELETED: u32 = 1018;
pub const ERROR_UNSUPPORTED_TYPE: u32 = 1630;
pub const ERROR_TRANSACTION_NOT_ACTIVE: u32 = 6701;

pub const TYPE_E_REGISTRYACCESS: u32 = 0x8002_801C;
pub const TYPE_E_LIBNOTREGISTERED: u32 = 0x8002_801D;
pub const TYPE_E_CANTLOADLIBRARY: u32 = 0x8002_9C4A;
