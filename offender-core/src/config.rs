//! Config: the `general` offset group plus zero or more independent
//! `chains`, with cached ordered views.
//!
//! Grounded on `offender/offset/offset_config.py`'s `OffsetConfig`. The
//! Python version memoizes `ordered_general`/`ordered_chains` as lazily
//! computed attributes (`try: return self._ordered_general except
//! AttributeError:`); here that's `std::sync::OnceLock` rather than
//! `std::cell::OnceCell`, so `Config` stays `Sync` and can be shared
//! across threads by [`crate::finder::Finder::find_parallel`].

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::offset::{Chain, OffsetGroup, OffsetSpec};
use crate::planner::generate_extracting_order;

/// The offsets to be found: a `general` group in scope for every chain,
/// plus independent alternative `chains`.
pub struct Config {
    pub general: Option<OffsetGroup>,
    pub chains: Vec<Chain>,
    ordered_general: OnceLock<Vec<usize>>,
    ordered_chains: OnceLock<HashMap<String, Vec<usize>>>,
}

impl Config {
    /// Builds a config, checking for duplicate names across `general`
    /// and every chain immediately.
    pub fn new(general: Option<OffsetGroup>, chains: Vec<Chain>) -> Result<Self> {
        let mut seen: HashMap<String, String> = HashMap::new();
        if let Some(g) = &general {
            for offset in &g.offsets {
                seen.insert(offset.name.clone(), "general".to_owned());
            }
        }
        for chain in &chains {
            for offset in &chain.group.offsets {
                if let Some(existing) = seen.get(&offset.name) {
                    return Err(Error::DuplicateNames {
                        name: offset.name.clone(),
                        context: format!("chain {:?} vs {}", chain.name, existing),
                    });
                }
            }
            // Duplicate names *within* a chain are already rejected by
            // OffsetGroup::new; here we only guard cross-chain/general.
            for offset in &chain.group.offsets {
                seen.insert(offset.name.clone(), format!("chain {:?}", chain.name));
            }
        }

        Ok(Self {
            general,
            chains,
            ordered_general: OnceLock::new(),
            ordered_chains: OnceLock::new(),
        })
    }

    /// The general group's offsets in a valid topological order.
    pub fn ordered_general(&self) -> Result<Vec<&OffsetSpec>> {
        let Some(general) = &self.general else {
            return Ok(Vec::new());
        };

        let indices = self.ordered_general.get_or_init_try(|| {
            generate_extracting_order(general, None)
                .map(|offsets| offsets.iter().map(|o| index_of(general, o)).collect())
        })?;

        Ok(indices.iter().map(|&i| &general.offsets[i]).collect())
    }

    /// Each chain's offsets, in a topological order computed with the
    /// general group's names as the outer scope.
    pub fn ordered_chains(&self) -> Result<HashMap<String, Vec<&OffsetSpec>>> {
        if self.chains.is_empty() {
            return Ok(HashMap::new());
        }

        let general_names = self.general.as_ref().map(|g| g.names());

        let by_chain = self.ordered_chains.get_or_init_try(|| -> Result<_> {
            let mut map = HashMap::new();
            for chain in &self.chains {
                let order = generate_extracting_order(&chain.group, general_names.as_ref())?;
                let indices = order.iter().map(|o| index_of(&chain.group, o)).collect();
                map.insert(chain.name.clone(), indices);
            }
            Ok(map)
        })?;

        let mut result = HashMap::new();
        for chain in &self.chains {
            let indices = &by_chain[&chain.name];
            result.insert(
                chain.name.clone(),
                indices.iter().map(|&i| &chain.group.offsets[i]).collect(),
            );
        }
        Ok(result)
    }
}

fn index_of(group: &OffsetGroup, offset: &OffsetSpec) -> usize {
    group
        .offsets
        .iter()
        .position(|o| std::ptr::eq(o, offset))
        .expect("offset must belong to the group it was ordered from")
}

// `OnceLock::get_or_try_init` is unstable; provide the minimal surface we
// need in terms of the stable API. Safe under concurrent callers: if two
// threads both lose the race and compute `f()` independently, `set`
// silently drops the loser's value and every caller still reads back the
// one value that won, via the final `self.get()`.
trait OnceLockTryExt<T> {
    fn get_or_init_try<E>(&self, f: impl FnOnce() -> std::result::Result<T, E>) -> std::result::Result<&T, E>;
}

impl<T> OnceLockTryExt<T> for OnceLock<T> {
    fn get_or_init_try<E>(&self, f: impl FnOnce() -> std::result::Result<T, E>) -> std::result::Result<&T, E> {
        if let Some(value) = self.get() {
            return Ok(value);
        }
        let value = f()?;
        let _ = self.set(value);
        Ok(self.get().expect("just set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset::{Dependency, OffsetFlavor};

    fn sym(name: &str, deps: Vec<&str>) -> OffsetSpec {
        OffsetSpec::new(name, OffsetFlavor::Symbol, name).depends_on(deps.into_iter().map(Dependency::from))
    }

    #[test]
    fn rejects_duplicate_name_across_general_and_chain() {
        let general = OffsetGroup::new("general", vec![sym("shared", vec![])]).unwrap();
        let chain = Chain::new("c1", OffsetGroup::new("c1", vec![sym("shared", vec![])]).unwrap());

        let err = Config::new(Some(general), vec![chain]).unwrap_err();
        assert!(matches!(err, Error::DuplicateNames { .. }));
    }

    #[test]
    fn chain_can_depend_on_general() {
        let general = OffsetGroup::new("general", vec![sym("base", vec![])]).unwrap();
        let chain = Chain::new("c1", OffsetGroup::new("c1", vec![sym("gadget", vec!["base"])]).unwrap());

        let config = Config::new(Some(general), vec![chain]).unwrap();
        let chains = config.ordered_chains().unwrap();
        assert_eq!(chains["c1"].len(), 1);
        assert_eq!(chains["c1"][0].name, "gadget");
    }

    #[test]
    fn ordered_views_are_memoized() {
        let general = OffsetGroup::new("general", vec![sym("a", vec![])]).unwrap();
        let config = Config::new(Some(general), vec![]).unwrap();

        let first = config.ordered_general().unwrap();
        let second = config.ordered_general().unwrap();
        assert_eq!(first.len(), second.len());
    }
}
