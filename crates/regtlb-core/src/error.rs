//! Error types for regtlb.
//!
//! Failures fall into three categories that callers need to tell apart:
//! precondition violations raised by this crate, system error codes returned by
//! registry and handle APIs, and result codes (HRESULTs) returned by the type
//! library binding. System and result codes always carry the decoded system
//! message next to the numeric value.

use std::path::PathBuf;
use thiserror::Error;

use crate::platform::{codes, message};

/// Main error type for regtlb.
#[derive(Debug, Error)]
pub enum RegTlbError {
    /// A precondition enforced by this crate was violated.
    #[error("{message}")]
    Application { message: String },

    /// A system call returned a Win32 error code.
    #[error("{operation} returned error code {code}: {message}")]
    System {
        code: u32,
        message: String,
        operation: String,
    },

    /// The type library binding returned a failing HRESULT.
    #[error("{operation} returned hresult 0x{code:08x}: {message}")]
    ResultCode {
        code: u32,
        message: String,
        operation: String,
    },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Result type alias for regtlb operations.
pub type Result<T> = std::result::Result<T, RegTlbError>;

impl From<std::io::Error> for RegTlbError {
    fn from(err: std::io::Error) -> Self {
        RegTlbError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl RegTlbError {
    /// Create an application-level error.
    pub fn application(message: impl Into<String>) -> Self {
        RegTlbError::Application {
            message: message.into(),
        }
    }

    /// Create a system error, decoding the message for `code`.
    pub fn system(code: u32, operation: impl Into<String>) -> Self {
        RegTlbError::System {
            code,
            message: message::system_message(code),
            operation: operation.into(),
        }
    }

    /// Create a result code error, decoding the message for `code`.
    pub fn result_code(code: u32, operation: impl Into<String>) -> Self {
        RegTlbError::ResultCode {
            code,
            message: message::system_message(code),
            operation: operation.into(),
        }
    }

    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        RegTlbError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Numeric system or result code, if this error carries one.
    pub fn code(&self) -> Option<u32> {
        match self {
            RegTlbError::System { code, .. } | RegTlbError::ResultCode { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True for the system "not found" condition reported when a key or value is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegTlbError::System {
                code: codes::ERROR_FILE_NOT_FOUND,
                ..
            }
        )
    }

    /// True if this error was raised by the crate itself rather than by the system.
    pub fn is_application(&self) -> bool {
        matches!(self, RegTlbError::Application { .. })
    }
}
