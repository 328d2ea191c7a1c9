//! Opt-in "deep DWARF" fallback: walks debug information entries looking
//! for a `DW_AT_name` match when neither the static nor the dynamic
//! symbol table has the requested name.
//!
//! Grounded on `elftools_searcher.py`'s `_get_dwarf_debug_information_entry`,
//! which walks every compilation unit's DIEs for a literal name match and
//! reads `DW_AT_low_pc`/`DW_AT_high_pc` off the winning entry. Section
//! loading follows the pack's `cargo-disasm`
//! (`0599f5c2_..._elf.rs.rs`) `load_dwarf` helper.

use gimli::{EndianSlice, RunTimeEndian};
use object::{Object, ObjectSection};
use offender_core::cache::Attr;
use offender_core::{Error, Result};

use crate::image::Image;

/// Walks every compilation unit's DIEs in `image` for an entry whose
/// `DW_AT_name` equals `name`, returning `DW_AT_low_pc` (for
/// [`Attr::Address`]) or the raw `DW_AT_high_pc` attribute value (for
/// [`Attr::Size`]) exactly as stored, without normalizing
/// offset-from-low-pc forms — `elftools_searcher.py`'s own DWARF walk
/// reads the attribute unconditionally the same way.
pub fn deep_lookup(image: &Image, name: &str, attr: Attr) -> Result<Option<u64>> {
    let bytes = image.bytes();
    let file = object::File::parse(bytes)
        .map_err(|e| Error::FindFailure(format!("failed to parse ELF for DWARF walk: {e}")))?;
    let endian = if file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

    let load_section = |id: gimli::SectionId| -> Result<EndianSlice<'_, RunTimeEndian>, gimli::Error> {
        let data = file.section_by_name(id.name()).and_then(|section| section.data().ok()).unwrap_or(&[]);
        Ok(EndianSlice::new(data, endian))
    };

    let dwarf = gimli::Dwarf::load(load_section)
        .map_err(|e| Error::FindFailure(format!("failed to load DWARF sections: {e}")))?;

    let mut units = dwarf.units();
    while let Some(header) = units
        .next()
        .map_err(|e| Error::FindFailure(format!("DWARF unit header error: {e}")))?
    {
        let unit = dwarf
            .unit(header)
            .map_err(|e| Error::FindFailure(format!("DWARF unit error: {e}")))?;
        let mut entries = unit.entries();

        while let Some((_, entry)) = entries
            .next_dfs()
            .map_err(|e| Error::FindFailure(format!("DWARF DIE walk error: {e}")))?
        {
            let Some(name_attr) = entry
                .attr(gimli::DW_AT_name)
                .map_err(|e| Error::FindFailure(format!("DWARF attribute error: {e}")))?
            else {
                continue;
            };

            let Ok(entry_name) = dwarf.attr_string(&unit, name_attr.value()) else {
                continue;
            };
            if entry_name.slice() != name.as_bytes() {
                continue;
            }

            let attr_id = match attr {
                Attr::Address => gimli::DW_AT_low_pc,
                Attr::Size => gimli::DW_AT_high_pc,
            };
            return Ok(entry.attr_value(attr_id).ok().flatten().and_then(attr_value_as_u64));
        }
    }

    Ok(None)
}

fn attr_value_as_u64(value: gimli::AttributeValue<EndianSlice<'_, RunTimeEndian>>) -> Option<u64> {
    match value {
        gimli::AttributeValue::Addr(addr) => Some(addr),
        gimli::AttributeValue::Udata(v) => Some(v),
        gimli::AttributeValue::Data1(v) => Some(v as u64),
        gimli::AttributeValue::Data2(v) => Some(v as u64),
        gimli::AttributeValue::Data4(v) => Some(v as u64),
        gimli::AttributeValue::Data8(v) => Some(v),
        _ => None,
    }
}
