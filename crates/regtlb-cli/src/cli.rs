//! Command line arguments.
//!
//! Every command takes either a library file (`--tlb`) or a library GUID
//! (`--guid`), never both. Argument groups enforce that before any command
//! runs, so the commands only see validated combinations.

use clap::{ArgGroup, Parser, Subcommand};
use regtlb_core::{RegTlbError, RegistrationScope, SysKind, TypeLibIdentity};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "regtlb")]
#[command(about = "Register, unregister and inspect COM type libraries")]
#[command(version)]
pub struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a type library file
    Install(InstallArgs),
    /// Remove a type library registration
    Uninstall(UninstallArgs),
    /// Show what a library file declares, or what is registered for a GUID
    Query(QueryArgs),
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Type library file (.tlb, or a module embedding one)
    #[arg(long, value_parser = existing_file)]
    pub tlb: PathBuf,

    /// Register for the current user instead of the machine
    #[arg(long)]
    pub per_user: bool,
}

impl InstallArgs {
    pub fn scope(&self) -> RegistrationScope {
        RegistrationScope::from_per_user(self.per_user)
    }
}

#[derive(clap::Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["tlb", "guid"])))]
pub struct UninstallArgs {
    /// Unregister the library stored in this file
    #[arg(long, value_parser = existing_file)]
    pub tlb: Option<PathBuf>,

    /// Unregister by library GUID
    #[arg(long, value_parser = guid_value)]
    pub guid: Option<Uuid>,

    /// Major version (decimal)
    #[arg(
        long,
        requires = "guid",
        conflicts_with = "tlb",
        required_unless_present_any = ["tlb", "purge"]
    )]
    pub major: Option<u16>,

    /// Minor version (decimal)
    #[arg(
        long,
        requires = "guid",
        conflicts_with = "tlb",
        required_unless_present_any = ["tlb", "purge"]
    )]
    pub minor: Option<u16>,

    /// Locale id (decimal) [default: 0]
    #[arg(long, requires = "guid", conflicts_with = "tlb")]
    pub locale: Option<u32>,

    /// Target platform, win32 or win64 [default: win32]
    #[arg(long, requires = "guid", conflicts_with = "tlb", value_parser = syskind_value)]
    pub syskind: Option<SysKind>,

    /// Remove every registered version of the GUID
    #[arg(
        long,
        requires = "guid",
        conflicts_with_all = ["tlb", "major", "minor", "locale", "syskind"]
    )]
    pub purge: bool,

    /// Unregister from the current user instead of the machine
    #[arg(long)]
    pub per_user: bool,
}

/// What an uninstall acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallTarget<'a> {
    File(&'a Path),
    Identity(TypeLibIdentity),
    Purge(Uuid),
}

impl UninstallArgs {
    pub fn scope(&self) -> RegistrationScope {
        RegistrationScope::from_per_user(self.per_user)
    }

    pub fn target(&self) -> Result<UninstallTarget<'_>, RegTlbError> {
        if let Some(path) = &self.tlb {
            if self.has_identity_flags() || self.guid.is_some() {
                return Err(RegTlbError::application(
                    "--tlb cannot be combined with a GUID, a version or --purge",
                ));
            }
            return Ok(UninstallTarget::File(path));
        }
        let guid = self
            .guid
            .ok_or_else(|| RegTlbError::application("Either --tlb or --guid is required"))?;
        if self.purge && self.has_version_flags() {
            return Err(RegTlbError::application(
                "--purge cannot be combined with a version",
            ));
        }
        if self.purge {
            return Ok(UninstallTarget::Purge(guid));
        }

        match (self.major, self.minor) {
            (Some(major), Some(minor)) => {
                let syskind = self.syskind.unwrap_or(SysKind::Win32);
                let identity = TypeLibIdentity::new(guid, major, minor, syskind)
                    .with_locale(self.locale.unwrap_or(0));
                Ok(UninstallTarget::Identity(identity))
            }
            _ => Err(RegTlbError::application(
                "--major and --minor are required with --guid",
            )),
        }
    }

    fn has_version_flags(&self) -> bool {
        self.major.is_some()
            || self.minor.is_some()
            || self.locale.is_some()
            || self.syskind.is_some()
    }

    fn has_identity_flags(&self) -> bool {
        self.has_version_flags() || self.purge
    }
}

#[derive(clap::Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["tlb", "guid"])))]
pub struct QueryArgs {
    /// Print the identity and types declared by this library file
    #[arg(long, value_parser = existing_file)]
    pub tlb: Option<PathBuf>,

    /// Print library information as JSON
    #[arg(long, requires = "tlb", conflicts_with = "guid")]
    pub json: bool,

    /// Print what is registered for this GUID in both hives
    #[arg(long, value_parser = guid_value)]
    pub guid: Option<Uuid>,
}

fn existing_file(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("{} does not exist", value))
    }
}

fn guid_value(value: &str) -> Result<Uuid, String> {
    regtlb_core::parse_guid(value).map_err(|e| e.to_string())
}

fn syskind_value(value: &str) -> Result<SysKind, String> {
    match value.parse::<SysKind>() {
        Ok(kind @ (SysKind::Win32 | SysKind::Win64)) => Ok(kind),
        _ => Err(format!("{} is not supported, use win32 or win64", value)),
    }
}
