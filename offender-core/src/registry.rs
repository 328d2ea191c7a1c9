//! Searcher selector: verifies prerequisites, constructs requested
//! searchers, skips and logs unavailable ones.
//!
//! Grounded on `offender/searcher/searcher_selector.py` and
//! `offender/utils/import_utils.py`. The Python original dynamically
//! imports a searcher module by a snake_case/CamelCase naming
//! convention and checks versioned dependencies via
//! `importlib.metadata`. Rust has no equivalent dynamic loading, so this
//! is ported as a static registry of [`SearcherFactory`] trait objects
//! ("Searcher selector / dynamic loading"): concrete
//! searcher crates (`offender-elf`, `offender-nm`, `offender-r2`) each
//! expose a factory, and a binary (`offendertool`) assembles the
//! registry explicitly instead of importing modules by name string.
//!
//! The comparator grammar (`==`, `>=`, `<=`, `~=`, bare tool name) is
//! kept, applied to the external tool's self-reported version instead of
//! a Python package version.

use crate::binary::BinarySet;
use crate::error::{Error, Result};
use crate::searcher::Searcher;

/// An external tool dependency a searcher requires, with an optional
/// version constraint in the same grammar as `import_utils.py`'s
/// `COMPARISON_MAPPING`.
#[derive(Debug, Clone)]
pub struct Prerequisite {
    pub tool: String,
    pub constraint: Option<VersionConstraint>,
}

impl Prerequisite {
    pub fn any(tool: impl Into<String>) -> Self {
        Self { tool: tool.into(), constraint: None }
    }

    pub fn with_version(tool: impl Into<String>, constraint: VersionConstraint) -> Self {
        Self { tool: tool.into(), constraint: Some(constraint) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ge,
    Le,
    Compatible,
}

#[derive(Debug, Clone)]
pub struct VersionConstraint {
    pub comparator: Comparator,
    pub version: String,
}

impl VersionConstraint {
    /// Parses a constraint string such as `">=2.30"`, `"~=2.30"`, or a
    /// bare tool name with no constraint (returns `None`), matching
    /// `import_utils.py`'s `check_library_requirements` split loop.
    pub fn parse(spec: &str) -> Option<Self> {
        for (token, comparator) in [
            ("==", Comparator::Eq),
            (">=", Comparator::Ge),
            ("<=", Comparator::Le),
            ("~=", Comparator::Compatible),
        ] {
            if let Some((_, version)) = spec.split_once(token) {
                return Some(Self { comparator, version: version.trim().to_owned() });
            }
        }
        None
    }

    fn satisfied_by(&self, found: &str) -> bool {
        let parse = |s: &str| -> Vec<u32> {
            s.split('.').filter_map(|p| p.chars().take_while(|c| c.is_ascii_digit()).collect::<String>().parse().ok()).collect()
        };
        let found_parts = parse(found);
        let wanted_parts = parse(&self.version);

        match self.comparator {
            Comparator::Eq => found_parts == wanted_parts,
            Comparator::Ge => found_parts >= wanted_parts,
            Comparator::Le => found_parts <= wanted_parts,
            Comparator::Compatible => {
                found_parts.first().copied().zip(wanted_parts.first().copied()).map(|(a, b)| a == b).unwrap_or(false)
                    && found_parts.get(1) == wanted_parts.get(1)
            }
        }
    }
}

/// Checks that `prerequisite.tool` is on PATH and, if a version
/// constraint was given, that `--version` reports a satisfying version.
pub fn check_prerequisite(prerequisite: &Prerequisite) -> bool {
    let output = match std::process::Command::new(&prerequisite.tool).arg("--version").output() {
        Ok(output) => output,
        Err(_) => return false,
    };
    if !output.status.success() && output.stdout.is_empty() {
        return false;
    }

    let Some(constraint) = &prerequisite.constraint else {
        return true;
    };

    let text = String::from_utf8_lossy(&output.stdout);
    let Some(found_version) = first_version_like_token(&text) else {
        return false;
    };
    constraint.satisfied_by(&found_version)
}

fn first_version_like_token(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|tok| tok.chars().next().is_some_and(|c| c.is_ascii_digit()) && tok.contains('.'))
        .map(|tok| tok.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').to_owned())
}

/// Constructs a named, concrete [`Searcher`] over a binary set. Each
/// searcher crate supplies one implementation.
pub trait SearcherFactory: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` means this searcher has no external tool prerequisite
    /// (e.g. `offender-elf`, a pure library).
    fn prerequisite(&self) -> Option<Prerequisite>;

    fn construct(&self, binaries: &BinarySet) -> Result<Box<dyn Searcher>>;
}

/// Selects and constructs searchers from the requested factories, in
/// order, skipping (and logging) any whose prerequisites fail or whose
/// construction errors. Fails if none survive.
pub fn select_searchers(
    factories: &[Box<dyn SearcherFactory>],
    binaries: &BinarySet,
) -> Result<Vec<Box<dyn Searcher>>> {
    let mut searchers = Vec::new();

    for factory in factories {
        if let Some(prerequisite) = factory.prerequisite() {
            if !check_prerequisite(&prerequisite) {
                tracing::warn!(
                    searcher = factory.name(),
                    tool = %prerequisite.tool,
                    "prerequisite not met, skipping searcher"
                );
                continue;
            }
        }

        match factory.construct(binaries) {
            Ok(searcher) => searchers.push(searcher),
            Err(Error::SearcherUnavailable { name, reason }) => {
                tracing::warn!(searcher = %name, reason = %reason, "searcher unavailable, skipping");
                continue;
            }
            Err(e) => return Err(e),
        }
    }

    if searchers.is_empty() {
        return Err(Error::SearcherUnavailable {
            name: "<all>".to_owned(),
            reason: "no searchers available".to_owned(),
        });
    }

    Ok(searchers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comparator_grammar() {
        let ge = VersionConstraint::parse(">=2.30").unwrap();
        assert_eq!(ge.comparator, Comparator::Ge);
        assert_eq!(ge.version, "2.30");

        assert!(VersionConstraint::parse("justaname").is_none());
    }

    #[test]
    fn compatible_release_requires_matching_minor() {
        let constraint = VersionConstraint { comparator: Comparator::Compatible, version: "2.38".into() };
        assert!(constraint.satisfied_by("2.38.1"));
        assert!(!constraint.satisfied_by("2.39.0"));
    }

    #[test]
    fn ge_constraint() {
        let constraint = VersionConstraint { comparator: Comparator::Ge, version: "2.30".into() };
        assert!(constraint.satisfied_by("2.38"));
        assert!(!constraint.satisfied_by("2.10"));
    }
}
