//! Persistence for finder runs: which versions' offsets were found, and
//! which failed outright.
//!
//! Grounded on `offender/offset_finder/offset_database.py`'s two tables,
//! which serialize each version's offset dict with `repr()` and read it
//! back with `eval()`. This crate serializes [`Context`] through
//! `serde_json` instead, since `eval()`-ing data read back from a
//! database is a latent code-execution hazard with no reason to survive
//! here (see DESIGN.md).

#![forbid(unsafe_code)]

mod error;

use std::collections::HashMap;
use std::path::Path;

pub use error::{Error, Result};
use offender_core::Context;

/// An open connection to a results database with the `found_versions`/
/// `failed_versions` schema, created on first open if absent.
pub struct Store {
    connection: sqlite::Connection,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let connection = sqlite::open(path)?;
        connection.execute(
            "CREATE TABLE IF NOT EXISTS found_versions (
                 id INTEGER PRIMARY KEY,
                 version TEXT NOT NULL,
                 offsets TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS failed_versions (
                 id INTEGER PRIMARY KEY,
                 version TEXT NOT NULL
             );",
        )?;
        Ok(Self { connection })
    }

    pub fn record_found(&self, version: &str, context: &Context) -> Result<()> {
        let offsets = serde_json::to_string(context)?;
        let mut statement = self.connection.prepare("INSERT INTO found_versions (version, offsets) VALUES (?, ?)")?;
        statement.bind((1, version))?;
        statement.bind((2, offsets.as_str()))?;
        drain(&mut statement)?;
        tracing::debug!(version, "recorded found version");
        Ok(())
    }

    pub fn record_failed(&self, version: &str) -> Result<()> {
        let mut statement = self.connection.prepare("INSERT INTO failed_versions (version) VALUES (?)")?;
        statement.bind((1, version))?;
        drain(&mut statement)?;
        tracing::debug!(version, "recorded failed version");
        Ok(())
    }

    /// Reads every persisted context, or just `version`'s when given.
    pub fn read_found(&self, version: Option<&str>) -> Result<HashMap<String, Context>> {
        let mut statement = match version {
            Some(v) => {
                let mut statement =
                    self.connection.prepare("SELECT version, offsets FROM found_versions WHERE version = ?")?;
                statement.bind((1, v))?;
                statement
            }
            None => self.connection.prepare("SELECT version, offsets FROM found_versions")?,
        };

        let mut results = HashMap::new();
        while let sqlite::State::Row = statement.next()? {
            let version: String = statement.read(0)?;
            let offsets: String = statement.read(1)?;
            results.insert(version, serde_json::from_str(&offsets)?);
        }
        Ok(results)
    }

    pub fn read_failed(&self) -> Result<Vec<String>> {
        let mut statement = self.connection.prepare("SELECT version FROM failed_versions")?;
        let mut results = Vec::new();
        while let sqlite::State::Row = statement.next()? {
            results.push(statement.read(0)?);
        }
        Ok(results)
    }
}

fn drain(statement: &mut sqlite::Statement<'_>) -> Result<()> {
    while let sqlite::State::Row = statement.next()? {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use offender_core::context::FoundChain;
    use offender_core::FoundOffset;

    fn sample_context() -> Context {
        Context {
            general: vec![FoundOffset { name: "x".into(), value: 0x10, elf: Some("a.out".into()) }],
            chains: vec![FoundChain { name: "chain1".into(), offsets: vec![] }],
        }
    }

    #[test]
    fn round_trips_a_found_version_through_memory_db() {
        let store = Store::open(":memory:").unwrap();
        let context = sample_context();
        store.record_found("1.2.3", &context).unwrap();

        let found = store.read_found(Some("1.2.3")).unwrap();
        assert_eq!(found.get("1.2.3"), Some(&context));
    }

    #[test]
    fn records_and_reads_back_failed_versions() {
        let store = Store::open(":memory:").unwrap();
        store.record_failed("9.9.9").unwrap();
        assert_eq!(store.read_failed().unwrap(), vec!["9.9.9".to_owned()]);
    }
}
