//! Extractor: orchestrates a single-binary-set extraction.
//!
//! Grounded on `offender/offset/offset_extractor.py`'s `OffsetExtractor`.

use tracing::{debug, info, warn};

use crate::binary::BinarySet;
use crate::config::Config;
use crate::context::{Context, FoundChain};
use crate::error::{Error, Result};
use crate::offset::{Dependency, FoundOffset, OffsetSpec, Scope};
use crate::planner::generate_extracting_order;
use crate::searcher::{search_in_elfs, Searcher};

/// Single entry point for resolving one [`Config`] against one
/// [`BinarySet`].
pub struct Extractor {
    binaries: BinarySet,
    searchers: Vec<Box<dyn Searcher>>,
}

impl Extractor {
    /// Builds an extractor from an already-selected, non-empty list of
    /// searchers (see [`crate::registry::select_searchers`]).
    pub fn new(binaries: BinarySet, searchers: Vec<Box<dyn Searcher>>) -> Result<Self> {
        if searchers.is_empty() {
            return Err(Error::SearcherUnavailable {
                name: "<all>".to_owned(),
                reason: "no searchers available".to_owned(),
            });
        }
        debug!(elfs = ?binaries.known_elf_names(), "offset extractor initialized");
        Ok(Self { binaries, searchers })
    }

    /// Resolves `config` against this extractor's binary set.
    pub fn extract(&self, config: &Config) -> Result<Context> {
        debug!("beginning offset extraction");

        let general_order = config.ordered_general()?;
        let general = self.extract_group(&general_order, None)?;

        let chains = if config.chains.is_empty() {
            Vec::new()
        } else {
            self.extract_chains(config, &general)?
        };

        debug!("finished offset extraction");
        Ok(Context::new(into_vec(general), chains))
    }

    fn extract_chains(&self, config: &Config, general: &Scope) -> Result<Vec<FoundChain>> {
        let ordered_chains = config.ordered_chains()?;
        let mut found_chains = Vec::new();

        for chain in &config.chains {
            let order = &ordered_chains[&chain.name];
            debug!(chain = %chain.name, "extracting chain");
            match self.extract_group(order, Some(general)) {
                Ok(found) => found_chains.push(FoundChain { name: chain.name.clone(), offsets: into_vec(found) }),
                Err(Error::FindFailure(reason)) => {
                    info!(chain = %chain.name, %reason, "chain failed to resolve, trying others");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        if found_chains.is_empty() {
            return Err(Error::FindFailure("no valid chains found".into()));
        }

        Ok(found_chains)
    }

    /// Resolves an ordered offset list, given an optional outer scope of
    /// already-found offsets (general's results, when resolving a chain).
    fn extract_group(&self, offsets: &[&OffsetSpec], outer_scope: Option<&Scope>) -> Result<Scope> {
        let mut already_found: Scope = outer_scope.cloned().unwrap_or_default();

        for offset in offsets {
            let found_value = match self.search_offset(offset) {
                Ok(value) => value,
                Err(Error::FindFailure(reason)) => {
                    warn!(offset = %offset.name, %reason, "failed to find offset");
                    if offset.optional {
                        continue;
                    }
                    return Err(Error::FindFailure(reason));
                }
                Err(e) => return Err(e),
            };

            let (candidates, elf) = found_value;

            let scope = self.build_dependency_scope(offset, &already_found)?;

            let filtered = offset.result_filter.apply(&candidates, &scope)?;
            let value = offset.modifications.apply(filtered, &scope)?;

            let found = FoundOffset { name: offset.name.clone(), value, elf };
            debug!(offset = %offset.name, value, "resolved offset");
            already_found.insert(found.name.clone(), found);
        }

        // Strip anything inherited purely from the outer scope so the
        // caller only sees offsets resolved by this group.
        if let Some(outer) = outer_scope {
            already_found.retain(|name, _| !outer.contains_key(name));
        }

        Ok(already_found)
    }

    /// Runs the search phase for one offset: `Ok((candidates, elf))` on a
    /// hit, `Err(FindFailure)` on a miss (to be interpreted by the
    /// caller per the offset's `optional` flag).
    fn search_offset(&self, offset: &OffsetSpec) -> Result<(Vec<u64>, Option<String>)> {
        let Some(_data) = &offset.data else {
            return Ok((Vec::new(), None));
        };

        let known = self.binaries.known_elf_names();
        let elfs = offset.elf_filter.resolve(&offset.name, &known)?;

        for searcher in &self.searchers {
            if let Some((candidates, elf)) = search_in_elfs(searcher.as_ref(), offset, &elfs)? {
                debug!(offset = %offset.name, ?candidates, %elf, "found candidates");
                return Ok((candidates, Some(elf)));
            }
        }

        Err(Error::FindFailure(format!("no searcher produced candidates for offset {:?}", offset.name)))
    }

    /// Builds the local dependency scope for `offset`: name-dependencies
    /// are looked up in `already_found` (a miss is a find-failure, even
    /// if the dependency was itself optional), and nested groups are
    /// resolved recursively with an empty outer scope and spliced in
    /// locally only.
    fn build_dependency_scope(&self, offset: &OffsetSpec, already_found: &Scope) -> Result<Scope> {
        let mut scope = Scope::new();

        for dependency in &offset.dependencies {
            match dependency {
                Dependency::Name(name) => {
                    let found = already_found.get(name).ok_or_else(|| {
                        Error::FindFailure(format!(
                            "could not process offset {:?}: dependency {name:?} was not found",
                            offset.name
                        ))
                    })?;
                    scope.insert(name.clone(), found.clone());
                }
                Dependency::Group(group) => {
                    let ordered = generate_extracting_order(group, None)?;
                    let resolved = self.extract_group(&ordered, None)?;
                    scope.extend(resolved);
                }
            }
        }

        Ok(scope)
    }
}

fn into_vec(scope: Scope) -> Vec<FoundOffset> {
    let mut values: Vec<FoundOffset> = scope.into_values().collect();
    values.sort_by(|a, b| a.name.cmp(&b.name));
    values
}
