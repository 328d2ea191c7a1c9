//! Cacheable-searcher base: per-binary memoization of symbol/section
//! tables, and per-`(elf, pattern)` opcode memoization.
//!
//! Grounded on `offender/searcher/cachable_searcher.py`. The Python
//! version is a mixin base class that concrete searchers inherit from,
//! overriding `_init_symbols_cache`/`_init_sections_cache`/
//! `_search_symbol_in_elf` etc. and falling back to the single-shot path
//! when the cache initializer isn't implemented. Rust has no mixin
//! inheritance, so `SearcherCache` is held by value inside each concrete
//! searcher and driven with small closures supplying the batch
//! initializer and the single-shot fallback, replacing template-method
//! dispatch with explicit composition.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::searcher::SearchResult;

/// One entry in a memoized symbol or section table.
#[derive(Debug, Clone, Copy)]
pub struct CachedData {
    pub address: u64,
    pub size: Option<u64>,
}

/// Which field of a [`CachedData`] a lookup wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attr {
    Address,
    Size,
}

type Table = HashMap<String, HashMap<String, CachedData>>;

/// Per-binary memoization shared by the native-utility and RE-framework
/// searchers. Symbol/section tables are populated by one batch
/// enumeration per ELF on first touch; opcode matches are cached
/// individually after the first hit.
pub struct SearcherCache {
    enabled: bool,
    symbols: RefCell<Table>,
    sections: RefCell<Table>,
    opcodes: RefCell<HashMap<(String, Vec<u8>), Vec<u64>>>,
}

impl SearcherCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            symbols: RefCell::new(HashMap::new()),
            sections: RefCell::new(HashMap::new()),
            opcodes: RefCell::new(HashMap::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Looks up `name`'s `attr` in `elf`'s symbol table, initializing it
    /// via `init` on first touch. If `init` reports
    /// `Error::NotImplemented`, falls back to `single_shot`.
    pub fn symbol(
        &self,
        name: &str,
        elf: &str,
        attr: Attr,
        init: impl FnOnce(&str) -> Result<HashMap<String, CachedData>>,
        single_shot: impl FnOnce(&str, &str) -> SearchResult,
    ) -> SearchResult {
        self.lookup(&self.symbols, name, elf, attr, init, single_shot)
    }

    /// Same as [`Self::symbol`] but against the section table.
    pub fn section(
        &self,
        name: &str,
        elf: &str,
        attr: Attr,
        init: impl FnOnce(&str) -> Result<HashMap<String, CachedData>>,
        single_shot: impl FnOnce(&str, &str) -> SearchResult,
    ) -> SearchResult {
        self.lookup(&self.sections, name, elf, attr, init, single_shot)
    }

    fn lookup(
        &self,
        table: &RefCell<Table>,
        name: &str,
        elf: &str,
        attr: Attr,
        init: impl FnOnce(&str) -> Result<HashMap<String, CachedData>>,
        single_shot: impl FnOnce(&str, &str) -> SearchResult,
    ) -> SearchResult {
        if !self.enabled {
            return single_shot(name, elf);
        }

        if !table.borrow().contains_key(elf) {
            match init(elf) {
                Ok(entries) => {
                    table.borrow_mut().insert(elf.to_owned(), entries);
                }
                Err(Error::NotImplemented) => return single_shot(name, elf),
                Err(e) => return Err(e),
            }
        }

        let table = table.borrow();
        let Some(entries) = table.get(elf) else {
            return Ok(None);
        };
        let Some(entry) = entries.get(name) else {
            return Ok(None);
        };

        let value = match attr {
            Attr::Address => Some(entry.address),
            Attr::Size => entry.size,
        };
        Ok(value.map(|v| vec![v]))
    }

    /// Looks up `pattern` in `elf`'s opcode cache, querying (and
    /// memoizing) via `single_shot` on a miss.
    pub fn opcodes(
        &self,
        pattern: &[u8],
        elf: &str,
        single_shot: impl FnOnce() -> SearchResult,
    ) -> SearchResult {
        if !self.enabled {
            return single_shot();
        }

        let key = (elf.to_owned(), pattern.to_vec());
        if let Some(hit) = self.opcodes.borrow().get(&key) {
            return Ok(Some(hit.clone()));
        }

        match single_shot()? {
            Some(candidates) => {
                self.opcodes.borrow_mut().insert(key, candidates.clone());
                Ok(Some(candidates))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn symbol_table_is_built_once_per_elf() {
        let cache = SearcherCache::new(true);
        let calls = Cell::new(0);

        let init = |_elf: &str| -> Result<HashMap<String, CachedData>> {
            calls.set(calls.get() + 1);
            let mut map = HashMap::new();
            map.insert("main".to_owned(), CachedData { address: 0x1000, size: Some(32) });
            Ok(map)
        };

        let r1 = cache.symbol("main", "a.out", Attr::Address, init, |_, _| Ok(None));
        let r2 = cache.symbol("main", "a.out", Attr::Size, init, |_, _| Ok(None));

        assert_eq!(r1.unwrap(), Some(vec![0x1000]));
        assert_eq!(r2.unwrap(), Some(vec![32]));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn falls_back_to_single_shot_when_init_not_implemented() {
        let cache = SearcherCache::new(true);
        let result = cache.symbol(
            "main",
            "a.out",
            Attr::Address,
            |_| Err(Error::NotImplemented),
            |_, _| Ok(Some(vec![42])),
        );
        assert_eq!(result.unwrap(), Some(vec![42]));
    }

    #[test]
    fn disabled_cache_always_uses_single_shot() {
        let cache = SearcherCache::new(false);
        let calls = Cell::new(0);
        for _ in 0..3 {
            cache
                .symbol(
                    "main",
                    "a.out",
                    Attr::Address,
                    |_| unreachable!("init should not run when caching is disabled"),
                    |_, _| {
                        calls.set(calls.get() + 1);
                        Ok(Some(vec![1]))
                    },
                )
                .unwrap();
        }
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn opcode_cache_memoizes_after_first_hit() {
        let cache = SearcherCache::new(true);
        let calls = Cell::new(0);
        let search = || {
            calls.set(calls.get() + 1);
            Ok(Some(vec![0x4000]))
        };

        cache.opcodes(b"\xc3", "a.out", search).unwrap();
        cache.opcodes(b"\xc3", "a.out", search).unwrap();

        assert_eq!(calls.get(), 1);
    }
}
