//! Declarative engine for extracting symbol/section/opcode offsets from
//! versioned ELF/DWARF binaries.
//!
//! This crate is the core described in SPEC_FULL.md: offset model,
//! dependency planner, searcher trait, extractor, and finder. Concrete
//! searcher back-ends live in `offender-elf`, `offender-nm`, and
//! `offender-r2`; persistence lives in `offender-store`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]

pub mod binary;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod finder;
pub mod modifications;
pub mod offset;
pub mod planner;
pub mod registry;
pub mod searcher;

pub use binary::{BinaryHandle, BinarySet};
pub use config::Config;
pub use context::{Context, FoundChain};
pub use error::{Error, Result};
pub use extractor::Extractor;
pub use finder::{FindOutcome, Finder};
pub use offset::{
    Chain, Dependency, ElfFilter, FoundOffset, OffsetData, OffsetFlavor, OffsetGroup, OffsetSpec, Scope,
};
pub use registry::{select_searchers, Prerequisite, SearcherFactory};
pub use searcher::Searcher;
