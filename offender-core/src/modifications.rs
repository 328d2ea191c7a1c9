//! Reusable filter/modification helpers and the "derive from options"
//! offset factory.
//!
//! Grounded on `offender/utils/basic_offset_modifications.py` and
//! `offender/utils/offset_factory.py`.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::offset::{Dependency, FoundOffset, Filter, Identity, Modify, OffsetFlavor, OffsetGroup, OffsetSpec, Scope};

/// A filter that picks the candidate lying within `[start, start+size)`,
/// where `start`/`size` come from two dependencies named `symbol_name`
/// and `{symbol_name}_size`. Grounded on
/// `get_offset_within_symbol_filter` — used, for example, to pick the
/// one `ret` instruction that falls inside a known function's bounds.
pub struct WithinSymbol {
    symbol_name: String,
}

impl WithinSymbol {
    pub fn new(symbol_name: impl Into<String>) -> Self {
        Self { symbol_name: symbol_name.into() }
    }

    fn bounds(&self, scope: &Scope) -> Result<(u64, u64)> {
        let size_name = format!("{}_size", self.symbol_name);
        let start = lookup(scope, &self.symbol_name)?;
        let size = lookup(scope, &size_name)?;
        Ok((start, start + size))
    }
}

impl Filter for WithinSymbol {
    fn apply(&self, candidates: &[u64], scope: &Scope) -> Result<Option<u64>> {
        let (start, end) = self.bounds(scope)?;
        Ok(candidates.iter().copied().find(|c| (start..end).contains(c)))
    }
}

fn lookup(scope: &Scope, name: &str) -> Result<u64> {
    scope
        .get(name)
        .map(|found| found.value)
        .ok_or_else(|| Error::FindFailure(format!("dependency {name:?} not found in scope")))
}

/// Builds a derived offset whose value is selected from a set of
/// mutually-optional alternatives rather than searched directly.
/// Grounded on `get_offset_from_multiple_options`: every option in
/// `options` is marked optional, nested as a private dependency group,
/// and the first option that resolved wins (in the group's declared
/// order), with `modifications` applied to the winning value afterwards.
pub fn from_options(
    name: impl Into<String>,
    options: OffsetGroup,
    dependencies: Vec<Dependency>,
    modifications: Arc<dyn Modify>,
) -> OffsetSpec {
    let options = OffsetGroup {
        name: options.name,
        offsets: options.offsets.into_iter().map(|o| o.optional(true)).collect(),
    };
    let option_names: Vec<String> = options.offsets.iter().map(|o| o.name.clone()).collect();

    let mut all_dependencies = dependencies;
    all_dependencies.push(Dependency::Group(options));

    OffsetSpec::derived(name, OffsetFlavor::Symbol)
        .depends_on(all_dependencies)
        .modify(FromOptions { option_names, inner: modifications })
}

struct FromOptions {
    option_names: Vec<String>,
    inner: Arc<dyn Modify>,
}

impl Modify for FromOptions {
    fn apply(&self, _value: Option<u64>, scope: &Scope) -> Result<u64> {
        let found: Option<&FoundOffset> =
            self.option_names.iter().find_map(|name| scope.get(name));

        let Some(found) = found else {
            return Err(Error::FindFailure(format!(
                "could not select offset from options: {:?}",
                self.option_names
            )));
        };

        self.inner.apply(Some(found.value), scope)
    }
}

/// A modification-from-options that applies no further transformation,
/// equivalent to passing `_default_modification` in the Python original.
pub fn identity_modification() -> Arc<dyn Modify> {
    Arc::new(Identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset::OffsetSpec;

    fn scope_with(entries: &[(&str, u64)]) -> Scope {
        entries
            .iter()
            .map(|(name, value)| ((*name).to_owned(), FoundOffset { name: (*name).to_owned(), value: *value, elf: None }))
            .collect()
    }

    #[test]
    fn within_symbol_picks_matching_candidate() {
        let filter = WithinSymbol::new("func");
        let scope = scope_with(&[("func", 0x1000), ("func_size", 0x20)]);

        let result = filter.apply(&[0x500, 0x1010, 0x2000], &scope).unwrap();
        assert_eq!(result, Some(0x1010));
    }

    #[test]
    fn within_symbol_none_in_range() {
        let filter = WithinSymbol::new("func");
        let scope = scope_with(&[("func", 0x1000), ("func_size", 0x20)]);

        let result = filter.apply(&[0x500, 0x3000], &scope).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn from_options_selects_first_present_option() {
        let options = OffsetGroup::new(
            "anon",
            vec![
                OffsetSpec::new("opt_a", OffsetFlavor::Symbol, "a").optional(true),
                OffsetSpec::new("opt_b", OffsetFlavor::Symbol, "b").optional(true),
            ],
        )
        .unwrap();

        let spec = from_options("picked", options, vec![], identity_modification());
        let scope = scope_with(&[("opt_b", 77)]);

        let value = spec.modifications.apply(None, &scope).unwrap();
        assert_eq!(value, 77);
    }
}
