//! Command implementations.
//!
//! Commands run against any key store and type library binding, and write
//! their report to `out`; `main` passes the system services and stdout.

use crate::cli::{Command, InstallArgs, QueryArgs, UninstallArgs, UninstallTarget};
use crate::dump::dump_key;
use anyhow::Result;
use regtlb_core::{
    format_guid, Access, KeyStore, RegKey, RegTlbError, RegistrationScope, TypeLibBinding,
    TypeLibInfo, TypeLibrary,
};
use std::io::Write;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

pub fn run(
    command: &Command,
    store: &dyn KeyStore,
    binding: &dyn TypeLibBinding,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        Command::Install(args) => install(args, binding, out),
        Command::Uninstall(args) => uninstall(args, store, binding, out),
        Command::Query(args) => query(args, store, binding, out),
    }
}

fn install(args: &InstallArgs, binding: &dyn TypeLibBinding, out: &mut impl Write) -> Result<()> {
    let scope = args.scope();
    let library = TypeLibrary::load(binding, &args.tlb)?;
    library.register(scope)?;
    writeln!(
        out,
        "Registered {} in the {} hive.",
        library.identity(),
        scope.hive_name()
    )?;
    Ok(())
}

fn uninstall(
    args: &UninstallArgs,
    store: &dyn KeyStore,
    binding: &dyn TypeLibBinding,
    out: &mut impl Write,
) -> Result<()> {
    let scope = args.scope();
    match args.target()? {
        UninstallTarget::File(path) => {
            let library = TypeLibrary::load(binding, path)?;
            library.unregister(scope)?;
            writeln!(
                out,
                "Unregistered {} from the {} hive.",
                library.identity(),
                scope.hive_name()
            )?;
        }
        UninstallTarget::Identity(identity) => {
            TypeLibrary::unregister_identity(binding, &identity, scope)?;
            writeln!(
                out,
                "Unregistered {} from the {} hive.",
                identity,
                scope.hive_name()
            )?;
        }
        UninstallTarget::Purge(guid) => {
            let guid_text = format_guid(&guid);
            if TypeLibrary::purge(store, &guid, scope, None)? {
                writeln!(
                    out,
                    "Removed every registration of {} from the {} hive.",
                    guid_text,
                    scope.hive_name()
                )?;
            } else {
                writeln!(
                    out,
                    "GUID {} does not exist in the {} hive.",
                    guid_text,
                    scope.hive_name()
                )?;
            }
        }
    }
    Ok(())
}

fn query(
    args: &QueryArgs,
    store: &dyn KeyStore,
    binding: &dyn TypeLibBinding,
    out: &mut impl Write,
) -> Result<()> {
    if let Some(path) = &args.tlb {
        return query_file(path, args.json, binding, out);
    }
    match args.guid {
        Some(_) if args.json => {
            Err(RegTlbError::application("--json applies to --tlb only").into())
        }
        Some(guid) => query_registry(&guid, store, out),
        None => Err(RegTlbError::application("Either --tlb or --guid is required").into()),
    }
}

fn query_file(
    path: &Path,
    json: bool,
    binding: &dyn TypeLibBinding,
    out: &mut impl Write,
) -> Result<()> {
    let library = TypeLibrary::load(binding, path)?;
    if json {
        serde_json::to_writer_pretty(&mut *out, library.info())?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(
        out,
        "Querying type library {} for embedded information.",
        library.path().display()
    )?;
    print_info(library.info(), out)
}

fn print_info(info: &TypeLibInfo, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Type library: {}", info.identity)?;
    for guid in &info.co_classes {
        writeln!(out, "CoClass: {}", format_guid(guid))?;
    }
    for guid in &info.interfaces {
        writeln!(out, "Interface: {}", format_guid(guid))?;
    }
    for guid in &info.dispatch_interfaces {
        writeln!(out, "DispInterfaces: {}", format_guid(guid))?;
    }
    Ok(())
}

fn query_registry(guid: &Uuid, store: &dyn KeyStore, out: &mut impl Write) -> Result<()> {
    let guid_text = format_guid(guid);
    writeln!(out, "Querying for type library {} in the registry", guid_text)?;

    for scope in [RegistrationScope::User, RegistrationScope::Machine] {
        if !TypeLibrary::exists(store, guid, scope)? {
            writeln!(
                out,
                "GUID {} does not exist in the {} hive.",
                guid_text,
                scope.hive_name()
            )?;
            continue;
        }

        writeln!(
            out,
            "GUID {} exists in the {} hive.",
            guid_text,
            scope.hive_name()
        )?;
        let path = TypeLibrary::registry_path(guid);
        debug!("Dumping {}", path);
        let key = RegKey::open(store, scope.root(), &path, Access::READ, None)?;
        dump_key(&key, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;
    use regtlb_core::platform::codes;
    use regtlb_core::{
        LoadedTypeLib, MemoryStore, SysKind, TypeDescriptor, TypeKind, TypeLibIdentity,
        WellKnownKey,
    };
    use std::any::Any;
    use tempfile::NamedTempFile;

    const GUID: &str = "{3F2504E0-4F89-11D3-9A0C-0305E82C3301}";
    const COCLASS: &str = "{3F2504E0-4F89-11D3-9A0C-0305E82C3312}";
    const INTERFACE: &str = "{3F2504E0-4F89-11D3-9A0C-0305E82C3310}";

    fn guid(text: &str) -> Uuid {
        regtlb_core::parse_guid(text).unwrap()
    }

    fn identity() -> TypeLibIdentity {
        TypeLibIdentity::new(guid(GUID), 1, 0, SysKind::Win32)
    }

    #[derive(Debug)]
    struct FixedLibrary;

    impl LoadedTypeLib for FixedLibrary {
        fn identity(&self) -> regtlb_core::Result<TypeLibIdentity> {
            Ok(identity())
        }

        fn descriptors(&self) -> regtlb_core::Result<Vec<TypeDescriptor>> {
            Ok(vec![
                TypeDescriptor {
                    guid: guid(INTERFACE),
                    kind: TypeKind::Interface,
                },
                TypeDescriptor {
                    guid: guid(COCLASS),
                    kind: TypeKind::CoClass,
                },
            ])
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Serves one library for any path and records registrations as a
    /// bare version key.
    struct FixedBinding<'s> {
        store: &'s dyn KeyStore,
    }

    impl TypeLibBinding for FixedBinding<'_> {
        fn load(&self, _path: &Path) -> regtlb_core::Result<Box<dyn LoadedTypeLib>> {
            Ok(Box::new(FixedLibrary))
        }

        fn register(
            &self,
            _library: &dyn LoadedTypeLib,
            path: &Path,
            scope: RegistrationScope,
        ) -> regtlb_core::Result<()> {
            let identity = identity();
            let record = format!(
                "{}\\{}\\{}\\{}",
                TypeLibrary::registry_path(&identity.guid),
                identity.version_key(),
                identity.locale_key(),
                identity.syskind
            );
            RegKey::create(
                self.store,
                scope.root(),
                &record,
                Access::READ | Access::WRITE,
                None,
            )?
            .set_value("", &path.display().to_string())
        }

        fn unregister(
            &self,
            identity: &TypeLibIdentity,
            scope: RegistrationScope,
        ) -> regtlb_core::Result<()> {
            if !TypeLibrary::exists(self.store, &identity.guid, scope)? {
                return Err(RegTlbError::result_code(
                    codes::TYPE_E_REGISTRYACCESS,
                    "UnRegisterTypeLib",
                ));
            }
            let record = TypeLibrary::registry_path(&identity.guid);
            RegKey::delete_tree(self.store, scope.root(), Some(&record), true, None)
        }
    }

    fn execute(store: &MemoryStore, args: &[&str]) -> Result<String> {
        let args = Args::try_parse_from(std::iter::once("regtlb").chain(args.iter().copied()))?;
        let binding = FixedBinding { store };
        let mut out = Vec::new();
        run(&args.command, store, &binding, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn test_install_then_query_guid_dumps_user_hive() {
        let store = MemoryStore::new();
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();

        let output = execute(&store, &["install", "--tlb", path, "--per-user"]).unwrap();
        assert!(output.starts_with("Registered {3F2504E0-4F89-11D3-9A0C-0305E82C3301} 1.0"));

        let output = execute(&store, &["query", "--guid", GUID]).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[1], format!("GUID {} exists in the user hive.", GUID));
        assert_eq!(
            lines[2],
            format!("HKCU\\Software\\Classes\\TypeLib\\{}", GUID)
        );
        assert_eq!(lines[3], "  > 1.0");
        assert_eq!(
            lines.last().copied(),
            Some(format!("GUID {} does not exist in the machine hive.", GUID).as_str())
        );
        assert!(output.contains(&format!("(Default):  {}", file.path().display())));
    }

    #[test]
    fn test_uninstall_by_identity_and_missing_registration() {
        let store = MemoryStore::new();
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        execute(&store, &["install", "--tlb", path]).unwrap();

        let output = execute(
            &store,
            &["uninstall", "--guid", GUID, "--major", "1", "--minor", "0"],
        )
        .unwrap();
        assert!(output.contains("from the machine hive"));
        assert!(
            !TypeLibrary::exists(&store, &guid(GUID), RegistrationScope::Machine).unwrap()
        );

        let err = execute(
            &store,
            &["uninstall", "--guid", GUID, "--major", "1", "--minor", "0"],
        )
        .unwrap_err();
        let err = err.downcast_ref::<RegTlbError>().unwrap();
        assert_eq!(err.code(), Some(codes::TYPE_E_REGISTRYACCESS));
    }

    #[test]
    fn test_uninstall_purge_reports_what_happened() {
        let store = MemoryStore::new();
        let file = NamedTempFile::new().unwrap();
        execute(
            &store,
            &["install", "--tlb", file.path().to_str().unwrap(), "--per-user"],
        )
        .unwrap();

        let output = execute(&store, &["uninstall", "--guid", GUID, "--purge", "--per-user"]);
        assert!(output.unwrap().starts_with("Removed every registration"));
        assert!(!RegKey::exists(
            &store,
            WellKnownKey::CurrentUser,
            &TypeLibrary::registry_path(&guid(GUID)),
            None
        )
        .unwrap());

        let output = execute(&store, &["uninstall", "--guid", GUID, "--purge", "--per-user"]);
        assert!(output.unwrap().contains("does not exist in the user hive"));
    }

    #[test]
    fn test_query_file_prints_declared_types() {
        let store = MemoryStore::new();
        let file = NamedTempFile::new().unwrap();
        let output = execute(&store, &["query", "--tlb", file.path().to_str().unwrap()]).unwrap();

        assert!(output.contains(&format!("CoClass: {}", COCLASS)));
        assert!(output.contains(&format!("Interface: {}", INTERFACE)));
        assert!(!output.contains("DispInterfaces:"));
    }

    #[test]
    fn test_query_file_as_json() {
        let store = MemoryStore::new();
        let file = NamedTempFile::new().unwrap();
        let output = execute(
            &store,
            &["query", "--tlb", file.path().to_str().unwrap(), "--json"],
        )
        .unwrap();

        let info: TypeLibInfo = serde_json::from_str(&output).unwrap();
        assert_eq!(info.identity, identity());
        assert_eq!(info.co_classes, vec![guid(COCLASS)]);
        assert_eq!(info.interfaces, vec![guid(INTERFACE)]);
    }
}
