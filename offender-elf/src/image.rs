//! Loaded ELF images and the symbol/section lookups shared by the
//! symbol, symbol-size, section, and section-size searches.
//!
//! Grounded on `elftools_searcher.py`'s `_get_symbol_table_attribute_entry`
//! (symbol lookup, with the ".symtab" then ".dynsym" fallback and the
//! ambiguous-duplicate check) and its section lookups.

use object::{Object, ObjectSection, ObjectSymbol};
use offender_core::cache::Attr;
use offender_core::{Error, Result};

/// One loaded ELF file's raw bytes, parsed on demand. `object::File`
/// borrows from its backing buffer, so the parsed view isn't kept around
/// between calls; re-parsing a symbol table from already-read bytes is
/// cheap relative to the process-spawning alternatives in the sibling
/// searcher crates.
pub struct Image {
    bytes: Vec<u8>,
}

impl Image {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::SearcherUnavailable {
            name: "offender-elf".to_owned(),
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        Ok(Self { bytes })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn parse(&self) -> Result<object::File<'_>> {
        object::File::parse(&*self.bytes)
            .map_err(|e| Error::FindFailure(format!("failed to parse ELF: {e}")))
    }

    /// Looks up `name`'s address or size in `.symtab`, falling back to
    /// `.dynsym` when the static table has no match. Multiple
    /// same-named entries are accepted only when they agree; otherwise
    /// this reports "not found" (matching `logger.warning` + `None` in
    /// the ported original).
    pub fn symbol_attr(&self, name: &str, attr: Attr) -> Result<Option<u64>> {
        let file = self.parse()?;
        let mut matches = collect_symbol_matches(file.symbols(), name);
        if matches.is_empty() {
            matches = collect_symbol_matches(file.dynamic_symbols(), name);
        }

        resolve_ambiguity(name, matches, attr)
    }

    /// Looks up `name`'s file offset or size among the section headers.
    pub fn section_attr(&self, name: &str, attr: Attr) -> Result<Option<u64>> {
        let file = self.parse()?;
        let Some(section) = file.section_by_name(name) else {
            return Ok(None);
        };

        let value = match attr {
            // `sh_offset`: the offset of this section's data within the
            // file, not its virtual address. Kept intentionally
            // inconsistent with `offender-nm`'s `.text` base convention
            // (see DESIGN.md's resolution of the section-address open
            // question).
            Attr::Address => section.file_range().map(|(offset, _)| offset),
            Attr::Size => Some(section.size()),
        };
        Ok(value)
    }
}

fn collect_symbol_matches<'data, 'file>(
    iter: impl Iterator<Item = object::Symbol<'data, 'file>>,
    name: &str,
) -> Vec<(u64, u64)> {
    iter.filter(|sym| sym.name().map(|n| n == name).unwrap_or(false))
        .map(|sym| (sym.address(), sym.size()))
        .collect()
}

fn resolve_ambiguity(name: &str, matches: Vec<(u64, u64)>, attr: Attr) -> Result<Option<u64>> {
    match matches.as_slice() {
        [] => Ok(None),
        [(address, size)] => Ok(Some(match attr {
            Attr::Address => *address,
            Attr::Size => *size,
        })),
        many => {
            let first = many[0];
            if many.iter().all(|entry| *entry == first) {
                Ok(Some(match attr {
                    Attr::Address => first.0,
                    Attr::Size => first.1,
                }))
            } else {
                tracing::warn!(symbol = name, entries = ?many, "more than one symbol found, refusing to guess");
                Ok(None)
            }
        }
    }
}
