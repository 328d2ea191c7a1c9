//! Searcher capability surface: the five-operation interface every
//! back-end implements, plus flavor dispatch over an [`OffsetSpec`].
//!
//! Grounded on `offender/searcher/searcher.py`'s `Searcher` base class.
//! `Ok(None)` is the "not found" signal (capability supported, nothing
//! matched); `Err(Error::NotImplemented)` means the capability itself is
//! unsupported by this back-end; any other `Err` is a find-failure from
//! the search machinery.

use tracing::warn;

use crate::error::{Error, Result};
use crate::offset::{OffsetData, OffsetFlavor, OffsetSpec};

/// Candidates returned by a successful search: `None` for a miss,
/// `Some(candidates)` for a (possibly empty after filtering) hit list.
pub type SearchResult = Result<Option<Vec<u64>>>;

/// A back-end implementing the offset capability surface over a binary
/// set. Concrete implementations live in `offender-elf`, `offender-nm`,
/// and `offender-r2`.
pub trait Searcher: Send + Sync {
    fn search_symbol(&self, name: &str, elf: &str) -> SearchResult {
        let _ = (name, elf);
        Err(Error::NotImplemented)
    }

    fn search_symbol_size(&self, name: &str, elf: &str) -> SearchResult {
        let _ = (name, elf);
        Err(Error::NotImplemented)
    }

    fn search_section(&self, name: &str, elf: &str) -> SearchResult {
        let _ = (name, elf);
        Err(Error::NotImplemented)
    }

    fn search_section_size(&self, name: &str, elf: &str) -> SearchResult {
        let _ = (name, elf);
        Err(Error::NotImplemented)
    }

    fn search_opcodes(&self, pattern: &OffsetData, elf: &str) -> SearchResult {
        let _ = (pattern, elf);
        Err(Error::NotImplemented)
    }

    /// Human-readable name used in logs and registry lookups.
    fn name(&self) -> &str;
}

/// Dispatches `offset` to the method matching its flavor, over the list
/// of ELF names already resolved from its `elf_filter`. Returns the
/// candidates and the owning ELF on the first non-empty hit; `Ok(None)`
/// if no ELF in the list produced a hit.
pub fn search_in_elfs(
    searcher: &dyn Searcher,
    offset: &OffsetSpec,
    elfs: &[String],
) -> Result<Option<(Vec<u64>, String)>> {
    let data = offset
        .data
        .as_ref()
        .expect("search_in_elfs is only called for offsets with data");

    for elf in elfs {
        let result = match offset.flavor {
            OffsetFlavor::Symbol => dispatch_text(data, |name| searcher.search_symbol(name, elf)),
            OffsetFlavor::SymbolSize => {
                dispatch_text(data, |name| searcher.search_symbol_size(name, elf))
            }
            OffsetFlavor::Section => dispatch_text(data, |name| searcher.search_section(name, elf)),
            OffsetFlavor::SectionSize => {
                dispatch_text(data, |name| searcher.search_section_size(name, elf))
            }
            OffsetFlavor::Opcodes => searcher.search_opcodes(data, elf),
        };

        match result {
            Ok(Some(candidates)) => return Ok(Some((candidates, elf.clone()))),
            Ok(None) => continue,
            Err(Error::NotImplemented) => {
                warn!(
                    searcher = searcher.name(),
                    offset = %offset.name,
                    "searcher does not implement this capability"
                );
                continue;
            }
            // Any other error means this searcher's machinery failed on
            // this offset/elf pair: capability supported, but the search
            // machinery failed on it. Logged and treated as a miss, not
            // propagated; only exhausting every searcher is a find-failure.
            Err(e) => {
                warn!(
                    searcher = searcher.name(),
                    offset = %offset.name,
                    error = %e,
                    "searcher failed on this offset, trying next"
                );
                continue;
            }
        }
    }

    Ok(None)
}

fn dispatch_text(data: &OffsetData, f: impl FnOnce(&str) -> SearchResult) -> SearchResult {
    match data {
        OffsetData::Text(name) => f(name),
        OffsetData::Bytes(_) => Err(Error::NotImplemented),
    }
}
