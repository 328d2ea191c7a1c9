//! Dependency planner: topological ordering of offsets within a group.
//!
//! Grounded on `Offsets.generate_extracting_order` in
//! `offender/offset/offset.py`, which pops from a dict used as a mutable
//! pool and recurses with `searching`/`found` dict-as-set bookkeeping.
//! Here a plain set of names suffices: `HashSet<String>` visiting/found
//! sets over a DFS.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::offset::{Dependency, OffsetGroup, OffsetSpec};

/// Computes an order for `group`'s offsets such that every offset's
/// name-dependencies appear earlier, given an optional outer scope of
/// already-resolved names (used when ordering a chain against general).
pub fn generate_extracting_order<'a>(
    group: &'a OffsetGroup,
    outer_scope: Option<&HashSet<String>>,
) -> Result<Vec<&'a OffsetSpec>> {
    let by_name = group.map();

    let mut visiting: HashSet<String> = HashSet::new();
    let mut found: HashSet<String> = outer_scope.cloned().unwrap_or_default();
    let mut result: Vec<&OffsetSpec> = Vec::new();
    let mut entered: HashSet<String> = HashSet::new();

    fn enter<'a>(
        offset: &'a OffsetSpec,
        by_name: &std::collections::HashMap<String, &'a OffsetSpec>,
        visiting: &mut HashSet<String>,
        found: &mut HashSet<String>,
        entered: &mut HashSet<String>,
        result: &mut Vec<&'a OffsetSpec>,
    ) -> Result<()> {
        if visiting.contains(&offset.name) {
            let mut members: Vec<String> = visiting.iter().cloned().collect();
            members.sort();
            return Err(Error::DependencyLoop { members });
        }

        visiting.insert(offset.name.clone());

        for dependency in &offset.dependencies {
            let dep_name = match dependency {
                // Nested groups are resolved lazily, in their own private
                // scope, inside the dependent's own resolution. They
                // contribute no ordering edge here.
                Dependency::Group(_) => continue,
                Dependency::Name(name) => name,
            };

            if found.contains(dep_name) {
                continue;
            }

            let dep_offset = by_name.get(dep_name).ok_or_else(|| Error::MissingDependency {
                dependent: offset.name.clone(),
                missing: dep_name.clone(),
            })?;

            if !entered.contains(dep_name) {
                enter(dep_offset, by_name, visiting, found, entered, result)?;
            }
        }

        result.push(offset);
        found.insert(offset.name.clone());
        entered.insert(offset.name.clone());
        visiting.remove(&offset.name);

        Ok(())
    }

    for offset in &group.offsets {
        if !entered.contains(&offset.name) {
            enter(offset, &by_name, &mut visiting, &mut found, &mut entered, &mut result)?;
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset::{OffsetFlavor, OffsetSpec};

    fn sym(name: &str, deps: Vec<&str>) -> OffsetSpec {
        OffsetSpec::new(name, OffsetFlavor::Symbol, name).depends_on(deps.into_iter().map(Dependency::from))
    }

    #[test]
    fn orders_dependencies_before_dependents() {
        let group = OffsetGroup::new(
            "general",
            vec![sym("c", vec!["b"]), sym("b", vec!["a"]), sym("a", vec![])],
        )
        .unwrap();

        let order = generate_extracting_order(&group, None).unwrap();
        let positions: std::collections::HashMap<_, _> =
            order.iter().enumerate().map(|(i, o)| (o.name.clone(), i)).collect();

        assert!(positions["a"] < positions["b"]);
        assert!(positions["b"] < positions["c"]);
    }

    #[test]
    fn detects_cycle() {
        let group = OffsetGroup::new("general", vec![sym("a", vec!["b"]), sym("b", vec!["a"])]).unwrap();

        let err = generate_extracting_order(&group, None).unwrap_err();
        assert!(matches!(err, Error::DependencyLoop { .. }));
    }

    #[test]
    fn detects_missing_dependency() {
        let group = OffsetGroup::new("general", vec![sym("a", vec!["ghost"])]).unwrap();

        let err = generate_extracting_order(&group, None).unwrap_err();
        match err {
            Error::MissingDependency { dependent, missing } => {
                assert_eq!(dependent, "a");
                assert_eq!(missing, "ghost");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn outer_scope_names_need_no_edge() {
        let outer: HashSet<String> = ["already_found".to_string()].into_iter().collect();
        let group = OffsetGroup::new("chain", vec![sym("a", vec!["already_found"])]).unwrap();

        let order = generate_extracting_order(&group, Some(&outer)).unwrap();
        assert_eq!(order.len(), 1);
        assert_eq!(order[0].name, "a");
    }

    #[test]
    fn nested_group_dependency_ignored_for_ordering() {
        let nested = OffsetGroup::new("anon", vec![sym("inner", vec![])]).unwrap();
        let group = OffsetGroup::new(
            "general",
            vec![OffsetSpec::new("outer", OffsetFlavor::Symbol, "outer")
                .depends_on(vec![Dependency::Group(nested)])],
        )
        .unwrap();

        let order = generate_extracting_order(&group, None).unwrap();
        assert_eq!(order.len(), 1);
        assert_eq!(order[0].name, "outer");
    }
}
