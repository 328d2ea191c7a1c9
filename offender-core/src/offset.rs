//! Offset model: flavored specs, groups, chains, and found results.
//!
//! Grounded on `offender/offset/offset.py`. The Python original uses
//! inheritance (`Symbol(Offset)`, `SymbolSize(Offset)`, ...) with runtime
//! `isinstance` dispatch; here the flavor is modeled as a tagged
//! variant and dispatch with a `match` in [`crate::searcher`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Selects which [`crate::searcher::Searcher`] capability an offset invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OffsetFlavor {
    Symbol,
    SymbolSize,
    Section,
    SectionSize,
    Opcodes,
}

/// The search key carried by an offset spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffsetData {
    /// A symbol name, section name, or assembly string.
    Text(String),
    /// A literal opcode byte pattern.
    Bytes(Vec<u8>),
}

impl From<&str> for OffsetData {
    fn from(s: &str) -> Self {
        OffsetData::Text(s.to_owned())
    }
}

impl From<String> for OffsetData {
    fn from(s: String) -> Self {
        OffsetData::Text(s)
    }
}

impl From<Vec<u8>> for OffsetData {
    fn from(b: Vec<u8>) -> Self {
        OffsetData::Bytes(b)
    }
}

/// Which ELF(s) in the binary set an offset should be searched in.
#[derive(Clone)]
pub enum ElfFilter {
    /// Search every known binary, first hit wins.
    Any,
    /// Search exactly one named binary.
    One(String),
    /// Search any binary whose name is in the set.
    Many(HashSet<String>),
    /// Search any binary whose name satisfies the predicate.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl fmt::Debug for ElfFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElfFilter::Any => write!(f, "Any"),
            ElfFilter::One(name) => write!(f, "One({name:?})"),
            ElfFilter::Many(names) => write!(f, "Many({names:?})"),
            ElfFilter::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

impl ElfFilter {
    /// Resolves this filter against the known ELF names, returning the
    /// ordered (deterministic) list of names to search.
    pub(crate) fn resolve(&self, offset_name: &str, known: &[String]) -> Result<Vec<String>> {
        match self {
            ElfFilter::Any => Ok(known.to_vec()),
            ElfFilter::One(name) => {
                if known.iter().any(|k| k == name) {
                    Ok(vec![name.clone()])
                } else {
                    Err(Error::InvalidElf {
                        name: offset_name.to_owned(),
                        requested: name.clone(),
                        known: known.to_vec(),
                    })
                }
            }
            ElfFilter::Many(names) => {
                let matched: Vec<String> =
                    known.iter().filter(|k| names.contains(*k)).cloned().collect();
                if matched.is_empty() {
                    Err(Error::InvalidElf {
                        name: offset_name.to_owned(),
                        requested: format!("{names:?}"),
                        known: known.to_vec(),
                    })
                } else {
                    Ok(matched)
                }
            }
            ElfFilter::Predicate(pred) => {
                let matched: Vec<String> =
                    known.iter().filter(|k| pred(k)).cloned().collect();
                if matched.is_empty() {
                    Err(Error::InvalidElf {
                        name: offset_name.to_owned(),
                        requested: "<predicate>".to_owned(),
                        known: known.to_vec(),
                    })
                } else {
                    Ok(matched)
                }
            }
        }
    }
}

/// The result of resolving one offset: its name, integer value, and the
/// ELF it was found in (if any).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FoundOffset {
    pub name: String,
    pub value: u64,
    pub elf: Option<String>,
}

/// Scope of already-resolved offsets visible to a filter/modification.
pub type Scope = HashMap<String, FoundOffset>;

/// Narrows a non-empty candidate list to exactly one value (or reports
/// absent), given the dependency scope.
pub trait Filter: Send + Sync {
    fn apply(&self, candidates: &[u64], scope: &Scope) -> Result<Option<u64>>;
}

/// Maps the filter's output (possibly absent) plus the dependency scope
/// to the final integer value.
pub trait Modify: Send + Sync {
    fn apply(&self, value: Option<u64>, scope: &Scope) -> Result<u64>;
}

/// The filter used when a spec doesn't provide its own: picks the first
/// candidate, or reports absent if there are none. Spec §4.6, §9: "users
/// whose searches genuinely have multiple hits are expected to supply an
/// explicit filter."
pub struct FirstCandidate;

impl Filter for FirstCandidate {
    fn apply(&self, candidates: &[u64], _scope: &Scope) -> Result<Option<u64>> {
        Ok(candidates.first().copied())
    }
}

/// The modification used when a spec doesn't provide its own: identity,
/// raising `FindFailure` if the filter produced no value.
pub struct Identity;

impl Modify for Identity {
    fn apply(&self, value: Option<u64>, _scope: &Scope) -> Result<u64> {
        value.ok_or_else(|| {
            Error::FindFailure("received no value from filter in default modification".into())
        })
    }
}

/// A name-dependency, or a nested anonymous group resolved in a private
/// scope. Modeled as a tagged variant rather than a
/// heterogeneous dependency list.
#[derive(Clone)]
pub enum Dependency {
    Name(String),
    Group(OffsetGroup),
}

impl From<&str> for Dependency {
    fn from(s: &str) -> Self {
        Dependency::Name(s.to_owned())
    }
}

impl From<OffsetGroup> for Dependency {
    fn from(g: OffsetGroup) -> Self {
        Dependency::Group(g)
    }
}

/// A single user-authored offset declaration.
#[derive(Clone)]
pub struct OffsetSpec {
    pub name: String,
    pub flavor: OffsetFlavor,
    pub data: Option<OffsetData>,
    pub elf_filter: ElfFilter,
    pub optional: bool,
    pub dependencies: Vec<Dependency>,
    pub result_filter: Arc<dyn Filter>,
    pub modifications: Arc<dyn Modify>,
}

impl fmt::Debug for OffsetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffsetSpec")
            .field("name", &self.name)
            .field("flavor", &self.flavor)
            .field("data", &self.data)
            .field("elf_filter", &self.elf_filter)
            .field("optional", &self.optional)
            .finish()
    }
}

impl OffsetSpec {
    /// Starts building an offset spec with the given name, flavor, and
    /// search key. Defaults: searched in every known binary, required,
    /// no dependencies, first-candidate filter, identity modification.
    pub fn new(name: impl Into<String>, flavor: OffsetFlavor, data: impl Into<OffsetData>) -> Self {
        Self {
            name: name.into(),
            flavor,
            data: Some(data.into()),
            elf_filter: ElfFilter::Any,
            optional: false,
            dependencies: Vec::new(),
            result_filter: Arc::new(FirstCandidate),
            modifications: Arc::new(Identity),
        }
    }

    /// An offset with no search key, purely derived from its
    /// dependencies via a custom modification. Spec §3: "the offset is
    /// purely derived from its dependencies."
    pub fn derived(name: impl Into<String>, flavor: OffsetFlavor) -> Self {
        Self {
            name: name.into(),
            flavor,
            data: None,
            elf_filter: ElfFilter::Any,
            optional: false,
            dependencies: Vec::new(),
            result_filter: Arc::new(FirstCandidate),
            modifications: Arc::new(Identity),
        }
    }

    pub fn elf(mut self, filter: ElfFilter) -> Self {
        self.elf_filter = filter;
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = Dependency>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.result_filter = Arc::new(filter);
        self
    }

    pub fn modify(mut self, modification: impl Modify + 'static) -> Self {
        self.modifications = Arc::new(modification);
        self
    }
}

/// An ordered list of offset specs; names within a group must be unique.
#[derive(Clone)]
pub struct OffsetGroup {
    pub name: String,
    pub offsets: Vec<OffsetSpec>,
}

impl OffsetGroup {
    /// Builds a group, checking for duplicate names immediately: no name
    /// may appear twice inside any one group.
    pub fn new(name: impl Into<String>, offsets: Vec<OffsetSpec>) -> Result<Self> {
        let group_name = name.into();
        let mut seen = HashSet::new();
        for offset in &offsets {
            if !seen.insert(offset.name.clone()) {
                return Err(Error::DuplicateNames {
                    name: offset.name.clone(),
                    context: format!("group {group_name:?}"),
                });
            }
        }
        Ok(Self { name: group_name, offsets })
    }

    /// An anonymous group, for offsets declared with no group name.
    pub fn anonymous(offsets: Vec<OffsetSpec>) -> Result<Self> {
        Self::new("anonymous", offsets)
    }

    /// Quick lookup by name, as the Python `Offsets.map` property does.
    pub fn map(&self) -> HashMap<String, &OffsetSpec> {
        self.offsets.iter().map(|o| (o.name.clone(), o)).collect()
    }

    pub fn names(&self) -> HashSet<String> {
        self.offsets.iter().map(|o| o.name.clone()).collect()
    }
}

/// A named offset group used as an independent alternative.
#[derive(Clone)]
pub struct Chain {
    pub name: String,
    pub group: OffsetGroup,
}

impl Chain {
    pub fn new(name: impl Into<String>, group: OffsetGroup) -> Self {
        Self { name: name.into(), group }
    }
}
