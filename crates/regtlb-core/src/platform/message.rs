//! Decoding of numeric system codes into human-readable messages.
//!
//! # Platform Behavior
//! - **Windows**: Uses `FormatMessageW` with the neutral language
//! - **Other**: Falls back to a table of the codes this crate produces

#![cfg_attr(windows, allow(unsafe_code))]

use super::codes;

/// Get the canonical message for a system error code or HRESULT.
///
/// Never fails; unknown codes produce a generic message.
pub fn system_message(code: u32) -> String {
    #[cfg(windows)]
    {
        if let Some(message) = format_message(code) {
            return message;
        }
    }

    builtin_message(code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unknown error 0x{code:08x}"))
}

#[cfg(windows)]
fn format_message(code: u32) -> Option<String> {
    use windows_sys::Win32::System::Diagnostics::Debug::{
        FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
    };

    let mut buffer = [0u16; 512];
    // SAFETY: the buffer is valid for `buffer.len()` UTF-16 units and no
    // insert arguments are read because of FORMAT_MESSAGE_IGNORE_INSERTS.
    let len = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            std::ptr::null(),
            code,
            0,
            buffer.as_mut_ptr(),
            buffer.len() as u32,
            std::ptr::null(),
        )
    } as usize;

    if len == 0 {
        return None;
    }
    let text = String::from_utf16_lossy(&buffer[..len]);
    Some(text.trim_end().to_string())
}

fn builtin_message(code: u32) -> Option<&'static str> {
    let message = match code {
        codes::ERROR_SUCCESS => "The operation completed successfully.",
        codes::ERROR_FILE_NOT_FOUND => "The system cannot find the file specified.",
        codes::ERROR_ACCESS_DENIED => "Access is denied.",
        codes::ERROR_INVALID_HANDLE => "The handle is invalid.",
        codes::ERROR_INVALID_PARAMETER => "The parameter is incorrect.",
        codes::ERROR_MORE_DATA => "More data is available.",
        codes::ERROR_NO_MORE_ITEMS => "No more data is available.",
        codes::ERROR_KEY_DELETED => {
            "Illegal operation attempted on a registry key that has been marked for deletion."
        }
        codes::ERROR_UNSUPPORTED_TYPE => "Data of this type is not supported.",
        codes::ERROR_TRANSACTION_NOT_ACTIVE => {
            "The transaction handle associated with this operation is not valid."
        }
        codes::TYPE_E_REGISTRYACCESS => "Error accessing the OLE registry.",
        codes::TYPE_E_LIBNOTREGISTERED => "Library not registered.",
        codes::TYPE_E_CANTLOADLIBRARY => "Error loading type library/DLL.",
        _ => return None,
    };
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_code_has_message() {
        let message = system_message(codes::ERROR_FILE_NOT_FOUND);
        assert!(!message.is_empty());
        assert!(!message.ends_with('\n'));
    }

    #[test]
    fn test_unknown_code_does_not_fail() {
        let message = system_message(0x1234_5678);
        assert!(!message.is_empty());
    }
}
