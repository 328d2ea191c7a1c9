//! Finder: orchestrates extraction across many binary versions.
//!
//! Grounded on `offender/offset_finder/offset_finder.py`'s `OffsetFinder`.
//! The Python version always constructs one `OffsetExtractor` per
//! version sequentially, but version extractions are fully independent
//! of one another. [`Finder::find`] keeps the sequential default;
//! [`Finder::find_parallel`] is an opt-in alternative, gated behind the
//! `parallel` feature, using `std::thread::scope` rather than pulling in
//! an async runtime this domain has no other use for.

use std::collections::BTreeMap;

use tracing::{error, info};

use crate::binary::BinarySet;
use crate::config::Config;
use crate::context::Context;
use crate::error::Error;
use crate::extractor::Extractor;
use crate::registry::SearcherFactory;

/// Runs one shared [`Config`] against a map of version name → binary set.
pub struct Finder<'a> {
    config: &'a Config,
}

/// The result of a multi-version find: successful contexts keyed by
/// version name, plus the names of versions that failed.
pub struct FindOutcome {
    pub succeeded: BTreeMap<String, Context>,
    pub failed: Vec<String>,
}

impl<'a> Finder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Resolves `self.config` against every version in `versions`,
    /// constructing a fresh [`Extractor`] (and fresh searcher instances)
    /// per version — no cache is shared across versions.
    pub fn find(
        &self,
        versions: &BTreeMap<String, BinarySet>,
        factories: &[Box<dyn SearcherFactory>],
    ) -> FindOutcome {
        let mut succeeded = BTreeMap::new();
        let mut failed = Vec::new();

        for (version_name, binaries) in versions {
            match self.extract_one(version_name, binaries, factories) {
                Ok(context) => {
                    info!(version = %version_name, "successfully found offsets");
                    succeeded.insert(version_name.clone(), context);
                }
                Err(e) => {
                    error!(version = %version_name, error = %e, "could not find offsets");
                    failed.push(version_name.clone());
                }
            }
        }

        FindOutcome { succeeded, failed }
    }

    #[cfg(feature = "parallel")]
    pub fn find_parallel(
        &self,
        versions: &BTreeMap<String, BinarySet>,
        factories: &[Box<dyn SearcherFactory>],
    ) -> FindOutcome
    where
        Config: Sync,
    {
        let results: Vec<(String, Result<Context, Error>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = versions
                .iter()
                .map(|(version_name, binaries)| {
                    scope.spawn(move || {
                        (version_name.clone(), self.extract_one(version_name, binaries, factories))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("searcher thread panicked")).collect()
        });

        let mut succeeded = BTreeMap::new();
        let mut failed = Vec::new();
        for (version_name, result) in results {
            match result {
                Ok(context) => {
                    succeeded.insert(version_name, context);
                }
                Err(_) => failed.push(version_name),
            }
        }
        FindOutcome { succeeded, failed }
    }

    fn extract_one(
        &self,
        version_name: &str,
        binaries: &BinarySet,
        factories: &[Box<dyn SearcherFactory>],
    ) -> Result<Context, Error> {
        let searchers = crate::registry::select_searchers(factories, binaries)?;
        let extractor = Extractor::new(binaries.clone(), searchers)?;
        extractor.extract(self.config).map_err(|e| {
            tracing::debug!(version = %version_name, "extraction failed: {e}");
            e
        })
    }
}
