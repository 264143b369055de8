//! Printing of registry subtrees.

use regtlb_core::{RegKey, ValueType};
use std::io::Write;

/// Print `key`, its values and every subkey below it.
///
/// The top key is printed with its full path, subkeys with `> name` and two
/// more spaces of indentation per level. Only string and DWORD values are
/// printed; the default value shows as `(Default)`.
pub fn dump_key(key: &RegKey<'_>, out: &mut impl Write) -> anyhow::Result<()> {
    writeln!(out, "{}", key.path())?;
    dump_contents(key, "", out)
}

fn dump_contents(key: &RegKey<'_>, offset: &str, out: &mut impl Write) -> anyhow::Result<()> {
    for name in key.get_values()? {
        let value = match key.get_value_type(&name)? {
            ValueType::String => key.get_ws_value(&name)?,
            ValueType::DWord => key.get_dw_value(&name)?.to_string(),
            _ => continue,
        };
        let label = if name.is_empty() { "(Default)" } else { &name };
        writeln!(out, "{}  {}:  {}", offset, label, value)?;
    }

    let sub_offset = format!("{}  ", offset);
    for name in key.get_sub_keys()? {
        let sub_key = key.open_sub_key(&name)?;
        writeln!(out, "{}> {}", sub_offset, sub_key.rel_path())?;
        dump_contents(&sub_key, &sub_offset, out)?;
    }
    Ok(())
}
