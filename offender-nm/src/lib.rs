//! Native-binutils searcher: shells out to `nm`, `readelf`, and
//! `objcopy` rather than parsing ELF/DWARF directly.
//!
//! Grounded on `offender/searcher/linux_searcher.py`. Requires Linux and
//! all three tools on `PATH`; the selector skips this searcher
//! (`Error::SearcherUnavailable`) rather than failing the whole run when
//! either condition isn't met.

#![forbid(unsafe_code)]

mod assemble;
mod process;

use std::path::PathBuf;

use offender_core::cache::{Attr, SearcherCache};
use offender_core::{BinarySet, Error, OffsetData, Prerequisite, Result, Searcher, SearcherFactory};

pub use assemble::AssemblerArch;

struct Paths {
    primary: PathBuf,
    companion: Option<PathBuf>,
}

impl Paths {
    fn all(&self) -> Vec<&PathBuf> {
        std::iter::once(&self.primary).chain(self.companion.iter()).collect()
    }
}

/// Searches `.symtab`/`.dynsym`/section headers/`.text` bytes by
/// shelling out to host binutils.
pub struct NmSearcher {
    elfs: std::collections::HashMap<String, Paths>,
    cache: SearcherCache,
    assembler: AssemblerArch,
}

impl NmSearcher {
    pub fn new(binaries: &BinarySet, cached: bool, assembler: AssemblerArch) -> Self {
        tracing::debug!(cached, ?assembler, "initializing native binutils searcher");
        let elfs = binaries
            .handles()
            .iter()
            .map(|h| (h.elf_name(), Paths { primary: h.primary.clone(), companion: h.companion.clone() }))
            .collect();
        Self { elfs, cache: SearcherCache::new(cached), assembler }
    }

    fn paths(&self, elf: &str) -> Result<&Paths> {
        self.elfs.get(elf).ok_or_else(|| Error::FindFailure(format!("unknown elf {elf:?}")))
    }

    fn symbol_attr(&self, name: &str, elf: &str, attr: Attr) -> Result<Option<u64>> {
        let paths = self.paths(elf)?;
        let result = self.cache.symbol(
            name,
            elf,
            attr,
            |_elf| {
                let mut merged = std::collections::HashMap::new();
                for path in paths.all() {
                    merged.extend(process::nm_symbol_table(path)?);
                }
                Ok(merged)
            },
            |name, _elf| {
                for path in paths.all() {
                    if let Some((address, size)) = process::search_symbol_single_shot(path, name)? {
                        return Ok(Some(vec![match attr {
                            Attr::Address => address,
                            Attr::Size => size,
                        }]));
                    }
                }
                Ok(None)
            },
        )?;
        Ok(result.and_then(|v| v.into_iter().next()))
    }

    fn section_attr(&self, name: &str, elf: &str, attr: Attr) -> Result<Option<u64>> {
        let paths = self.paths(elf)?;
        let result = self.cache.section(
            name,
            elf,
            attr,
            |_elf| process::readelf_section_table(&paths.primary),
            |name, _elf| {
                Ok(process::search_section_single_shot(&paths.primary, name)?
                    .map(|(address, size)| vec![match attr {
                        Attr::Address => address,
                        Attr::Size => size,
                    }]))
            },
        )?;
        Ok(result.and_then(|v| v.into_iter().next()))
    }
}

impl Searcher for NmSearcher {
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

    /// Dwarf companion files carry no code, so opcode search always
    /// targets the primary binary, matching `self.elfs[elf][0]` in the
    /// original.
    fn search_opcodes(&self, pattern: &OffsetData, elf: &str) -> Result<Option<Vec<u64>>> {
        let primary = &self.paths(elf)?.primary;

        let encoded = match pattern {
            OffsetData::Text(asm) => self.assembler.assemble(asm)?,
            OffsetData::Bytes(bytes) => bytes.clone(),
        };

        self.cache.opcodes(&encoded, elf, || {
            let Some(text_base) = self.section_attr(".text", elf, Attr::Address)? else {
                return Err(Error::FindFailure(
                    "failed to find opcode because couldn't find .text section base".to_owned(),
                ));
            };
            let text_bytes = process::dump_text_section(primary)?;
            let hits: Vec<u64> =
                process::find_all_occurrences(&text_bytes, &encoded).into_iter().map(|off| text_base + off as u64).collect();
            Ok(if hits.is_empty() { None } else { Some(hits) })
        })
    }

    fn name(&self) -> &str {
        "offender-nm"
    }
}

/// Constructs [`NmSearcher`]s, refusing on non-Linux hosts and when
/// `nm`/`readelf`/`objcopy` are not all on `PATH`.
pub struct NmSearcherFactory {
    cached: bool,
    assembler: AssemblerArch,
}

impl NmSearcherFactory {
    pub fn new(cached: bool, assembler: AssemblerArch) -> Self {
        Self { cached, assembler }
    }
}

impl SearcherFactory for NmSearcherFactory {
    fn name(&self) -> &'static str {
        "offender-nm"
    }

    fn prerequisite(&self) -> Option<Prerequisite> {
        Some(Prerequisite::any("nm"))
    }

    fn construct(&self, binaries: &BinarySet) -> Result<Box<dyn Searcher>> {
        if !cfg!(target_os = "linux") {
            return Err(Error::SearcherUnavailable {
                name: self.name().to_owned(),
                reason: "not running on linux".to_owned(),
            });
        }
        for tool in ["readelf", "objcopy"] {
            if which(tool).is_none() {
                return Err(Error::SearcherUnavailable {
                    name: self.name().to_owned(),
                    reason: format!("missing required tool: {tool}"),
                });
            }
        }
        Ok(Box::new(NmSearcher::new(binaries, self.cached, self.assembler)))
    }
}

fn which(tool: &str) -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths).map(|dir| dir.join(tool)).find(|candidate| candidate.is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use offender_core::BinaryHandle;

    #[test]
    fn unknown_elf_is_a_find_failure() {
        let binaries = BinarySet::new(vec![BinaryHandle::new("a.out", None)]);
        let searcher = NmSearcher::new(&binaries, true, AssemblerArch::default());
        let err = searcher.search_symbol("main", "b.out").unwrap_err();
        assert!(matches!(err, Error::FindFailure(_)));
    }
}
