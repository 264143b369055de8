//! Type library binding over the OLE automation APIs.
//!
//! # Platform Behavior
//! - **Windows**: `LoadTypeLibEx` without registration, `RegisterTypeLib[ForUser]`
//!   and `UnRegisterTypeLib[ForUser]`

#![allow(unsafe_code)]

use super::binding::{LoadedTypeLib, RegistrationScope, TypeLibBinding};
use super::identity::{SysKind, TypeDescriptor, TypeKind, TypeLibIdentity};
use crate::error::{RegTlbError, Result};
use std::any::Any;
use std::path::Path;
use uuid::Uuid;
use windows::core::{GUID, HSTRING, PCWSTR};
use windows::Win32::System::Com::{ITypeLib, SYSKIND};
use windows::Win32::System::Ole::{
    LoadTypeLibEx, RegisterTypeLib, RegisterTypeLibForUser, UnRegisterTypeLib,
    UnRegisterTypeLibForUser, REGKIND_NONE,
};

/// [`TypeLibBinding`] backed by the system OLE automation library.
#[derive(Debug, Default)]
pub struct ComBinding;

impl ComBinding {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug)]
struct ComTypeLib {
    library: ITypeLib,
}

fn result_code(err: windows::core::Error, operation: &str) -> RegTlbError {
    RegTlbError::result_code(err.code().0 as u32, operation)
}

impl LoadedTypeLib for ComTypeLib {
    fn identity(&self) -> Result<TypeLibIdentity> {
        // SAFETY: the attribute block returned by GetLibAttr is read before it is
        // handed back to ReleaseTLibAttr on the same library, exactly once.
        unsafe {
            let attr = self
                .library
                .GetLibAttr()
                .map_err(|e| result_code(e, "ITypeLib::GetLibAttr"))?;
            let identity = {
                let attr = &*attr;
                SysKind::from_raw(attr.syskind.0).map(|syskind| {
                    TypeLibIdentity::new(
                        Uuid::from_u128(attr.guid.to_u128()),
                        attr.wMajorVerNum,
                        attr.wMinorVerNum,
                        syskind,
                    )
                    .with_locale(attr.lcid)
                })
            };
            self.library.ReleaseTLibAttr(attr);
            identity
                .ok_or_else(|| RegTlbError::application("Type library has an unknown syskind"))
        }
    }

    fn descriptors(&self) -> Result<Vec<TypeDescriptor>> {
        // SAFETY: every ITypeInfo is owned by the smart pointer returned from
        // GetTypeInfo; its attribute block is released once after being copied.
        unsafe {
            let count = self.library.GetTypeInfoCount();
            let mut descriptors = Vec::with_capacity(count as usize);
            for index in 0..count {
                let info = self
                    .library
                    .GetTypeInfo(index)
                    .map_err(|e| result_code(e, "ITypeLib::GetTypeInfo"))?;
                let attr = info
                    .GetTypeAttr()
                    .map_err(|e| result_code(e, "ITypeInfo::GetTypeAttr"))?;
                descriptors.push(TypeDescriptor {
                    guid: Uuid::from_u128((*attr).guid.to_u128()),
                    kind: TypeKind::from_raw((*attr).typekind.0),
                });
                info.ReleaseTypeAttr(attr);
            }
            Ok(descriptors)
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TypeLibBinding for ComBinding {
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedTypeLib>> {
        let file = HSTRING::from(path.as_os_str());
        // SAFETY: `file` is a valid null-terminated wide string for the call.
        let library = unsafe { LoadTypeLibEx(&file, REGKIND_NONE) }
            .map_err(|e| result_code(e, "LoadTypeLibEx"))?;
        Ok(Box::new(ComTypeLib { library }))
    }

    fn register(
        &self,
        library: &dyn LoadedTypeLib,
        path: &Path,
        scope: RegistrationScope,
    ) -> Result<()> {
        let library = library
            .as_any()
            .downcast_ref::<ComTypeLib>()
            .ok_or_else(|| RegTlbError::application("Type library was not loaded by COM"))?;
        let full_path = HSTRING::from(path.as_os_str());

        // SAFETY: the library pointer and path string outlive the call; no help
        // directory is passed.
        unsafe {
            match scope {
                RegistrationScope::User => RegisterTypeLibForUser(
                    &library.library,
                    PCWSTR(full_path.as_ptr()),
                    PCWSTR::null(),
                )
                .map_err(|e| result_code(e, "RegisterTypeLibForUser")),
                RegistrationScope::Machine => RegisterTypeLib(
                    &library.library,
                    PCWSTR(full_path.as_ptr()),
                    PCWSTR::null(),
                )
                .map_err(|e| result_code(e, "RegisterTypeLib")),
            }
        }
    }

    fn unregister(&self, identity: &TypeLibIdentity, scope: RegistrationScope) -> Result<()> {
        let guid = GUID::from_u128(identity.guid.as_u128());
        let syskind = SYSKIND(identity.syskind.raw());

        // SAFETY: `guid` is a valid GUID that lives for the duration of the call.
        unsafe {
            match scope {
                RegistrationScope::User => UnRegisterTypeLibForUser(
                    &guid,
                    identity.major,
                    identity.minor,
                    identity.locale,
                    syskind,
                )
                .map_err(|e| result_code(e, "UnRegisterTypeLibForUser")),
                RegistrationScope::Machine => UnRegisterTypeLib(
                    &guid,
                    identity.major,
                    identity.minor,
                    identity.locale,
                    syskind,
                )
                .map_err(|e| result_code(e, "UnRegisterTypeLib")),
            }
        }
    }
}
