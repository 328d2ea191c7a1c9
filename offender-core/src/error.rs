//! Error kinds surfaced by the offset resolution engine.
//!
//! Each variant is distinct and
//! user-visible, and propagation policy (fail-fast at construction vs.
//! caught-and-logged per chain) lives in [`crate::extractor`] and
//! [`crate::config`], not here.

use thiserror::Error;

/// Errors raised while building a [`crate::config::Config`] or while
/// running a [`crate::extractor::Extractor`].
#[derive(Debug, Error)]
pub enum Error {
    /// Two offsets share a name within a group, or across `general` and a chain.
    #[error("duplicate offset name {name:?} found in {context}")]
    DuplicateNames {
        /// The offending name.
        name: String,
        /// Where the clash was found, e.g. `"group 'anonymous'"` or
        /// `"chain 'rop1' vs general"`.
        context: String,
    },

    /// A name-dependency cycle was found while ordering a group.
    #[error("dependency loop involving: {}", members.join(", "))]
    DependencyLoop {
        /// Names participating in the cycle, in traversal order.
        members: Vec<String>,
    },

    /// A name-dependency could not be resolved in the reachable scope.
    #[error("offset {dependent:?} depends on {missing:?}, which does not exist")]
    MissingDependency {
        /// The offset whose dependency list named the missing entry.
        dependent: String,
        /// The unresolved name.
        missing: String,
    },

    /// An offset's `elf_filter` matched none of the known binaries.
    #[error("offset {name:?} requested elf(s) {requested:?}, known elfs: {known:?}")]
    InvalidElf {
        /// The offset whose filter failed to match.
        name: String,
        /// Human-readable description of what was requested.
        requested: String,
        /// The ELF names actually known to the extractor.
        known: Vec<String>,
    },

    /// A required offset had no searcher-produced candidates, a
    /// dependency of a required offset failed, or no chain succeeded
    /// when chains were declared.
    #[error("failed to find offset: {0}")]
    FindFailure(String),

    /// A requested searcher's prerequisites were not met. Non-fatal when
    /// other searchers remain; fatal when it is the last one.
    #[error("searcher {name:?} unavailable: {reason}")]
    SearcherUnavailable {
        /// The searcher that could not be constructed.
        name: String,
        /// Why it is unavailable.
        reason: String,
    },

    /// Internal signal: a concrete searcher does not implement a given
    /// capability. The extractor and cache treat this as "try the next
    /// searcher" / "fall back to the single-shot path"; it must never
    /// escape to a caller.
    #[error("capability not implemented by this searcher")]
    NotImplemented,
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
