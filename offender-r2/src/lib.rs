//! RE-framework searcher: drives `radare2` over a command pipe instead
//! of parsing ELF/DWARF directly or shelling to binutils.
//!
//! Grounded on `offender/searcher/r2searcher.py`.

#![forbid(unsafe_code)]

mod pipe;

use std::cell::RefCell;
use std::collections::HashMap;

use serde::Deserialize;

use offender_core::cache::{Attr, SearcherCache};
use offender_core::{BinarySet, Error, OffsetData, Prerequisite, Result, Searcher, SearcherFactory};

use pipe::R2Pipe;

#[derive(Deserialize)]
struct R2Symbol {
    name: String,
    vaddr: u64,
    size: u64,
}

#[derive(Deserialize)]
struct R2Section {
    name: String,
    vaddr: u64,
    size: u64,
}

#[derive(Deserialize)]
struct R2Hit {
    offset: u64,
}

struct Entry {
    primary: RefCell<R2Pipe>,
    companion: Option<RefCell<R2Pipe>>,
    text_range: RefCell<Option<(u64, u64)>>,
}

/// Searches symbols, sections, and opcode patterns by driving `radare2`.
pub struct R2Searcher {
    entries: HashMap<String, Entry>,
    cache: SearcherCache,
}

impl R2Searcher {
    pub fn new(binaries: &BinarySet, cached: bool) -> Result<Self> {
        tracing::debug!(elf_count = binaries.handles().len(), cached, "spawning radare2 pipes");
        let mut entries = HashMap::new();
        for handle in binaries.handles() {
            let primary = R2Pipe::open(&handle.primary)?;
            let companion = handle.companion.as_deref().map(R2Pipe::open).transpose()?;
            entries.insert(
                handle.elf_name(),
                Entry { primary: RefCell::new(primary), companion: companion.map(RefCell::new), text_range: RefCell::new(None) },
            );
        }
        Ok(Self { entries, cache: SearcherCache::new(cached) })
    }

    fn entry(&self, elf: &str) -> Result<&Entry> {
        self.entries.get(elf).ok_or_else(|| Error::FindFailure(format!("unknown elf {elf:?}")))
    }

    fn pipes<'a>(&'a self, entry: &'a Entry) -> Vec<&'a RefCell<R2Pipe>> {
        std::iter::once(&entry.primary).chain(entry.companion.iter()).collect()
    }

    /// `.text`'s `[start, end)` virtual-address range, memoized
    /// per-ELF exactly once — distinct from the shared symbol/section
    /// cache, matching `r2searcher.py`'s separate
    /// `_text_section_addresses` dict.
    fn text_range(&self, elf: &str) -> Result<(u64, u64)> {
        let entry = self.entry(elf)?;
        if let Some(range) = *entry.text_range.borrow() {
            return Ok(range);
        }

        let output = entry.primary.borrow_mut().cmd("iS~.text")?;
        let fields: Vec<&str> = output.split_whitespace().collect();
        let (Some(start), Some(end)) = (fields.get(2), fields.get(4)) else {
            return Err(Error::FindFailure(format!("could not parse .text section info from {elf:?}")));
        };
        let start = u64::from_str_radix(start.trim_start_matches("0x"), 16)
            .map_err(|e| Error::FindFailure(format!("bad .text start: {e}")))?;
        let end = u64::from_str_radix(end.trim_start_matches("0x"), 16)
            .map_err(|e| Error::FindFailure(format!("bad .text end: {e}")))?;

        *entry.text_range.borrow_mut() = Some((start, end));
        Ok((start, end))
    }

    fn symbol_attr(&self, name: &str, elf: &str, attr: Attr) -> Result<Option<u64>> {
        let entry = self.entry(elf)?;
        let result = self.cache.symbol(
            name,
            elf,
            attr,
            |_elf| {
                let mut merged = HashMap::new();
                for pipe in self.pipes(entry) {
                    let raw = pipe.borrow_mut().cmd("isj")?;
                    let symbols: Vec<R2Symbol> = serde_json::from_str(&raw)
                        .map_err(|e| Error::FindFailure(format!("bad isj output: {e}")))?;
                    for sym in symbols {
                        merged.insert(
                            sym.name,
                            offender_core::cache::CachedData { address: sym.vaddr, size: Some(sym.size) },
                        );
                    }
                }
                Ok(merged)
            },
            |name, _elf| {
                for pipe in self.pipes(entry) {
                    let raw = pipe.borrow_mut().cmd(&format!("is~{name}"))?;
                    if raw.is_empty() {
                        continue;
                    }
                    if let Some(value) = extract_symbol_field(&raw, name, attr) {
                        return Ok(Some(vec![value]));
                    }
                }
                Ok(None)
            },
        )?;
        Ok(result.and_then(|v| v.into_iter().next()))
    }

    fn section_attr(&self, name: &str, elf: &str, attr: Attr) -> Result<Option<u64>> {
        let entry = self.entry(elf)?;
        let result = self.cache.section(
            name,
            elf,
            attr,
            |_elf| {
                let raw = entry.primary.borrow_mut().cmd("iSj")?;
                let sections: Vec<R2Section> =
                    serde_json::from_str(&raw).map_err(|e| Error::FindFailure(format!("bad iSj output: {e}")))?;
                Ok(sections
                    .into_iter()
                    .map(|s| (s.name, offender_core::cache::CachedData { address: s.vaddr, size: Some(s.size) }))
                    .collect())
            },
            |name, _elf| {
                for pipe in self.pipes(entry) {
                    let raw = pipe.borrow_mut().cmd(&format!("iS~{name}"))?;
                    if raw.is_empty() {
                        return Ok(None);
                    }
                    if let Some(value) = extract_section_field(&raw, name, attr) {
                        return Ok(Some(vec![value]));
                    }
                }
                Ok(None)
            },
        )?;
        Ok(result.and_then(|v| v.into_iter().next()))
    }
}

/// `line.split()[-1] == name`, then `[2]` for address or `[-2]` for size
/// (decimal), matching `_extract_data_from_radare_symbol_result`.
fn extract_symbol_field(output: &str, name: &str, attr: Attr) -> Option<u64> {
    output.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.last() != Some(&name) {
            return None;
        }
        match attr {
            Attr::Address => u64::from_str_radix(fields.get(2)?.trim_start_matches("0x"), 16).ok(),
            Attr::Size => fields.iter().rev().nth(1)?.parse().ok(),
        }
    })
}

/// `[1]` for address, `[2]` for size, both hex, matching
/// `_extract_data_from_radare_section_result`.
fn extract_section_field(output: &str, name: &str, attr: Attr) -> Option<u64> {
    output.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.last() != Some(&name) {
            return None;
        }
        let index = match attr {
            Attr::Address => 1,
            Attr::Size => 2,
        };
        u64::from_str_radix(fields.get(index)?.trim_start_matches("0x"), 16).ok()
    })
}

impl Searcher for R2Searcher {
    fn search_symbol(&self, name: &str, elf: &str) -> Result<Option<Vec<u64>>> {
        Ok(self.symbol_attr(name, elf, Attr::Address)?.map(|v| vec![v]))
    }

    fn search_symbol_size(&self, name: &str, elf: &str) -> Result<Option<Vec<u64>>> {
        Ok(self.symbol_attr(name, elf, Attr::Size)?.map(|v| vec![v]))
    }

    fn search_section(&self, name: &str, elf: &str) -> Result<Option<Vec<u64>>> {
        Ok(self.section_attr(name, elf, Attr::Address)?.map(|v| vec![v]))
    }

    fn search_section_size(&self, name: &str, elf: &str) -> Result<Option<Vec<u64>>> {
        Ok(self.section_attr(name, elf, Attr::Size)?.map(|v| vec![v]))
    }

    /// Opcodes are only ever searched in the primary binary (a DWARF
    /// companion carries no code). Assembly-text patterns are wrapped in
    /// one surrounding pair of quotes and interpolated into the `/a`
    /// command as-is, matching `r2searcher.py`'s `f'"/a {opcodes}"'`.
    fn search_opcodes(&self, pattern: &OffsetData, elf: &str) -> Result<Option<Vec<u64>>> {
        let entry = self.entry(elf)?;
        let cache_key = match pattern {
            OffsetData::Text(asm) => asm.clone().into_bytes(),
            OffsetData::Bytes(bytes) => bytes.clone(),
        };

        self.cache.opcodes(&cache_key, elf, || {
            let raw_hits = match pattern {
                OffsetData::Text(asm) => {
                    let command = format!("\"/a {asm}\"");
                    let output = entry.primary.borrow_mut().cmd(&command)?;
                    output
                        .lines()
                        .filter_map(|line| line.split_whitespace().next())
                        .filter_map(|tok| u64::from_str_radix(tok.trim_start_matches("0x"), 16).ok())
                        .collect::<Vec<_>>()
                }
                OffsetData::Bytes(bytes) => {
                    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
                    let output = entry.primary.borrow_mut().cmd(&format!("/xj {hex}"))?;
                    if output.is_empty() {
                        Vec::new()
                    } else {
                        let hits: Vec<R2Hit> = serde_json::from_str(&output)
                            .map_err(|e| Error::FindFailure(format!("bad /xj output: {e}")))?;
                        hits.into_iter().map(|h| h.offset).collect()
                    }
                }
            };

            if raw_hits.is_empty() {
                return Ok(None);
            }

            let (start, end) = self.text_range(elf)?;
            let filtered: Vec<u64> = raw_hits.into_iter().filter(|off| (start..end).contains(off)).collect();
            Ok(if filtered.is_empty() { None } else { Some(filtered) })
        })
    }

    fn name(&self) -> &str {
        "offender-r2"
    }
}

/// Constructs [`R2Searcher`]s, skipped by the selector when `radare2`
/// isn't on `PATH`.
pub struct R2SearcherFactory {
    cached: bool,
}

impl R2SearcherFactory {
    pub fn new(cached: bool) -> Self {
        Self { cached }
    }
}

impl SearcherFactory for R2SearcherFactory {
    fn name(&self) -> &'static str {
        "offender-r2"
    }

    fn prerequisite(&self) -> Option<Prerequisite> {
        Some(Prerequisite::any("radare2"))
    }

    fn construct(&self, binaries: &BinarySet) -> Result<Box<dyn Searcher>> {
        Ok(Box::new(R2Searcher::new(binaries, self.cached)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_symbol_field_reads_address_and_size() {
        let output = "1   0x00001149 0x00001149 GLOBAL FUNC  16 main\n";
        assert_eq!(extract_symbol_field(output, "main", Attr::Address), Some(0x1149));
        assert_eq!(extract_symbol_field(output, "main", Attr::Size), Some(16));
    }

    #[test]
    fn extract_section_field_reads_address_and_size() {
        let output = "1 0x00001000 0x0000abcd PROGBITS .text\n";
        assert_eq!(extract_section_field(output, ".text", Attr::Address), Some(0x1000));
        assert_eq!(extract_section_field(output, ".text", Attr::Size), Some(0xabcd));
    }
}
