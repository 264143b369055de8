//! The Windows registry and kernel transaction manager.
//!
//! Every method is a thin call into the corresponding Win32 API; a non-zero
//! status (or a failed `BOOL` with `GetLastError`) becomes a
//! [`RegTlbError::System`] carrying the code.

#![allow(unsafe_code)]

use super::{Access, KeyInfo, KeyStore, RawHandle, RawKey, ValueFilter, ValueInfo, ValueType};
use crate::error::{RegTlbError, Result};
use crate::platform::codes;
use std::ffi::c_void;
use std::ptr;
use windows_sys::Win32::Foundation::{
    CloseHandle, DuplicateHandle, GetLastError, DUPLICATE_SAME_ACCESS, HANDLE,
    INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CommitTransaction, CreateTransaction, RollbackTransaction,
};
use windows_sys::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegCreateKeyTransactedW, RegDeleteKeyExW,
    RegDeleteKeyTransactedW, RegDeleteTreeW, RegEnumKeyExW, RegEnumValueW, RegGetValueW,
    RegOpenKeyExW, RegOpenKeyTransactedW, RegQueryInfoKeyW, RegSetValueExW, HKEY,
    REG_OPTION_NON_VOLATILE,
};
use windows_sys::Win32::System::Threading::GetCurrentProcess;

/// [`KeyStore`] over the system registry.
#[derive(Debug, Default)]
pub struct WindowsRegistry;

impl WindowsRegistry {
    pub fn new() -> Self {
        Self
    }
}

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

fn hkey(key: RawKey) -> HKEY {
    key.0 as HKEY
}

fn handle(raw: RawHandle) -> HANDLE {
    raw.0 as HANDLE
}

fn check(status: u32, operation: &str) -> Result<()> {
    if status == codes::ERROR_SUCCESS {
        Ok(())
    } else {
        Err(RegTlbError::system(status, operation))
    }
}

/// Name of the call made for `transaction`, for error reports.
fn api_name(
    transaction: Option<RawHandle>,
    transacted: &'static str,
    plain: &'static str,
) -> &'static str {
    if transaction.is_some() {
        transacted
    } else {
        plain
    }
}

fn check_bool(ok: i32, operation: &str) -> Result<()> {
    if ok != 0 {
        Ok(())
    } else {
        // SAFETY: reads the calling thread's last-error value.
        Err(RegTlbError::system(unsafe { GetLastError() }, operation))
    }
}

impl KeyStore for WindowsRegistry {
    fn close_handle(&self, raw: RawHandle) -> Result<()> {
        // SAFETY: the caller owns `raw` and releases it exactly once.
        check_bool(unsafe { CloseHandle(handle(raw)) }, "CloseHandle")
    }

    fn duplicate_handle(&self, raw: RawHandle) -> Result<RawHandle> {
        let mut target: HANDLE = ptr::null_mut();
        // SAFETY: the pseudo-handle of the current process is always valid and
        // `target` is a valid out pointer.
        let ok = unsafe {
            let process = GetCurrentProcess();
            DuplicateHandle(
                process,
                handle(raw),
                process,
                &mut target,
                0,
                0,
                DUPLICATE_SAME_ACCESS,
            )
        };
        check_bool(ok, "DuplicateHandle")?;
        Ok(RawHandle(target as isize))
    }

    fn create_transaction(&self, description: Option<&str>) -> Result<RawHandle> {
        let mut description = description.map(wide);
        let description_ptr = description
            .as_mut()
            .map_or(ptr::null_mut(), |text| text.as_mut_ptr());
        // SAFETY: all optional pointers are null or point to live buffers;
        // zero options, isolation and timeout select the system defaults.
        let transaction = unsafe {
            CreateTransaction(
                ptr::null_mut(),
                ptr::null_mut(),
                0,
                0,
                0,
                0,
                description_ptr,
            )
        };
        if transaction == INVALID_HANDLE_VALUE {
            // SAFETY: reads the calling thread's last-error value.
            return Err(RegTlbError::system(unsafe { GetLastError() }, "CreateTransaction"));
        }
        Ok(RawHandle(transaction as isize))
    }

    fn commit_transaction(&self, transaction: RawHandle) -> Result<()> {
        // SAFETY: `transaction` is a transaction handle owned by the caller.
        check_bool(unsafe { CommitTransaction(handle(transaction)) }, "CommitTransaction")
    }

    fn rollback_transaction(&self, transaction: RawHandle) -> Result<()> {
        // SAFETY: `transaction` is a transaction handle owned by the caller.
        check_bool(
            unsafe { RollbackTransaction(handle(transaction)) },
            "RollbackTransaction",
        )
    }

    fn open_key(
        &self,
        parent: RawKey,
        name: &str,
        access: Access,
        transaction: Option<RawHandle>,
    ) -> Result<RawKey> {
        let operation = api_name(transaction, "RegOpenKeyTransactedW", "RegOpenKeyExW");
        let name = wide(name);
        let mut key: HKEY = ptr::null_mut();
        // SAFETY: `name` is null-terminated and `key` is a valid out pointer.
        let status = unsafe {
            match transaction {
                Some(transaction) => RegOpenKeyTransactedW(
                    hkey(parent),
                    name.as_ptr(),
                    0,
                    access.0,
                    &mut key,
                    handle(transaction),
                    ptr::null(),
                ),
                None => RegOpenKeyExW(hkey(parent), name.as_ptr(), 0, access.0, &mut key),
            }
        };
        check(status, operation)?;
        Ok(RawKey(key as isize))
    }

    fn create_key(
        &self,
        parent: RawKey,
        name: &str,
        access: Access,
        transaction: Option<RawHandle>,
    ) -> Result<RawKey> {
        let operation = api_name(transaction, "RegCreateKeyTransactedW", "RegCreateKeyExW");
        let name = wide(name);
        let mut key: HKEY = ptr::null_mut();
        // SAFETY: `name` is null-terminated, `key` is a valid out pointer and
        // the optional class, security and disposition pointers are null.
        let status = unsafe {
            match transaction {
                Some(transaction) => RegCreateKeyTransactedW(
                    hkey(parent),
                    name.as_ptr(),
                    0,
                    ptr::null(),
                    REG_OPTION_NON_VOLATILE,
                    access.0,
                    ptr::null(),
                    &mut key,
                    ptr::null_mut(),
                    handle(transaction),
                    ptr::null(),
                ),
                None => RegCreateKeyExW(
                    hkey(parent),
                    name.as_ptr(),
                    0,
                    ptr::null(),
                    REG_OPTION_NON_VOLATILE,
                    access.0,
                    ptr::null(),
                    &mut key,
                    ptr::null_mut(),
                ),
            }
        };
        check(status, operation)?;
        Ok(RawKey(key as isize))
    }

    fn close_key(&self, key: RawKey) -> Result<()> {
        // SAFETY: the caller owns `key`; closing a predefined key is a no-op.
        check(unsafe { RegCloseKey(hkey(key)) }, "RegCloseKey")
    }

    fn delete_tree(&self, key: RawKey, sub_key: Option<&str>) -> Result<()> {
        let sub_key = sub_key.map(wide);
        let sub_key_ptr = sub_key.as_ref().map_or(ptr::null(), |text| text.as_ptr());
        // SAFETY: `sub_key_ptr` is null or a null-terminated string.
        check(unsafe { RegDeleteTreeW(hkey(key), sub_key_ptr) }, "RegDeleteTreeW")
    }

    fn delete_key(
        &self,
        parent: RawKey,
        name: &str,
        transaction: Option<RawHandle>,
    ) -> Result<()> {
        let operation = api_name(transaction, "RegDeleteKeyTransactedW", "RegDeleteKeyExW");
        let name = wide(name);
        // SAFETY: `name` is null-terminated; reserved arguments are zero/null.
        let status = unsafe {
            match transaction {
                Some(transaction) => RegDeleteKeyTransactedW(
                    hkey(parent),
                    name.as_ptr(),
                    0,
                    0,
                    handle(transaction),
                    ptr::null(),
                ),
                None => RegDeleteKeyExW(hkey(parent), name.as_ptr(), 0, 0),
            }
        };
        check(status, operation)
    }

    fn set_value(&self, key: RawKey, name: &str, kind: ValueType, data: &[u8]) -> Result<()> {
        let name = wide(name);
        let len = u32::try_from(data.len())
            .map_err(|_| RegTlbError::system(codes::ERROR_INVALID_PARAMETER, "RegSetValueExW"))?;
        // SAFETY: `data` is valid for `len` bytes and `name` is null-terminated.
        let status = unsafe {
            RegSetValueExW(hkey(key), name.as_ptr(), 0, kind.raw(), data.as_ptr(), len)
        };
        check(status, "RegSetValueExW")
    }

    fn get_value(
        &self,
        key: RawKey,
        name: &str,
        filter: ValueFilter,
        buffer: Option<&mut [u8]>,
    ) -> Result<ValueInfo> {
        let name = wide(name);
        let mut kind = 0u32;
        let (data, mut size) = match buffer {
            Some(buffer) => (
                buffer.as_mut_ptr() as *mut c_void,
                u32::try_from(buffer.len()).unwrap_or(u32::MAX),
            ),
            None => (ptr::null_mut(), 0),
        };
        // SAFETY: `data` is null or valid for `size` bytes; the remaining
        // pointers are valid out pointers or null-terminated strings.
        let status = unsafe {
            RegGetValueW(
                hkey(key),
                ptr::null(),
                name.as_ptr(),
                filter.raw(),
                &mut kind,
                data,
                &mut size,
            )
        };
        check(status, "RegGetValueW")?;
        Ok(ValueInfo {
            kind: ValueType::from_raw(kind),
            size: size as usize,
        })
    }

    fn query_info(&self, key: RawKey) -> Result<KeyInfo> {
        let mut info = KeyInfo::default();
        // SAFETY: every requested count is a valid out pointer; the class,
        // security and timestamp outputs are not requested.
        let status = unsafe {
            RegQueryInfoKeyW(
                hkey(key),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null(),
                &mut info.sub_keys,
                &mut info.max_sub_key_len,
                ptr::null_mut(),
                &mut info.values,
                &mut info.max_value_name_len,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        check(status, "RegQueryInfoKeyW")?;
        Ok(info)
    }

    fn enum_key(&self, key: RawKey, index: u32, name: &mut [u16]) -> Result<usize> {
        let mut len = u32::try_from(name.len()).unwrap_or(u32::MAX);
        // SAFETY: `name` is valid for `len` UTF-16 units.
        let status = unsafe {
            RegEnumKeyExW(
                hkey(key),
                index,
                name.as_mut_ptr(),
                &mut len,
                ptr::null(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        check(status, "RegEnumKeyExW")?;
        Ok(len as usize)
    }

    fn enum_value(&self, key: RawKey, index: u32, name: &mut [u16]) -> Result<usize> {
        let mut len = u32::try_from(name.len()).unwrap_or(u32::MAX);
        // SAFETY: `name` is valid for `len` UTF-16 units; data is not requested.
        let status = unsafe {
            RegEnumValueW(
                hkey(key),
                index,
                name.as_mut_ptr(),
                &mut len,
                ptr::null(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        check(status, "RegEnumValueW")?;
        Ok(len as usize)
    }
}
