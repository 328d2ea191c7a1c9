//! The extraction output: a set of general found offsets plus a set of
//! found chains, each itself a set of found offsets.
//!
//! Grounded on `offender/offset/offset_config.py`'s `OffsetContext` /
//! `SerializableOffsetContext` pair. The Python version needs a separate
//! "serializable" shadow type because pydantic can't serialize sets of
//! non-primitive models; `serde` has no such restriction, so
//! `Context` here is directly `Serialize`/`Deserialize` and doubles as
//! its own wire format.

use std::collections::HashSet;

use crate::offset::FoundOffset;

/// One resolved chain: its name and the offsets found while resolving it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FoundChain {
    pub name: String,
    pub offsets: Vec<FoundOffset>,
}

/// The result of one extraction. Equality (and the round-trip invariant
/// here) is defined as set-equality on `(name, value, elf)` for
/// `general` and for each chain, not list order.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Context {
    pub general: Vec<FoundOffset>,
    pub chains: Vec<FoundChain>,
}

impl Context {
    pub fn new(general: Vec<FoundOffset>, chains: Vec<FoundChain>) -> Self {
        Self { general, chains }
    }

    pub fn chain(&self, name: &str) -> Option<&FoundChain> {
        self.chains.iter().find(|c| c.name == name)
    }
}

fn as_set(offsets: &[FoundOffset]) -> HashSet<&FoundOffset> {
    offsets.iter().collect()
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        if as_set(&self.general) != as_set(&other.general) {
            return false;
        }
        if self.chains.len() != other.chains.len() {
            return false;
        }
        self.chains.iter().all(|chain| {
            other
                .chain(&chain.name)
                .is_some_and(|found| as_set(&chain.offsets) == as_set(&found.offsets))
        })
    }
}

impl Eq for Context {}

#[cfg(test)]
mod tests {
    use super::*;

    fn fo(name: &str, value: u64) -> FoundOffset {
        FoundOffset { name: name.into(), value, elf: None }
    }

    #[test]
    fn equality_ignores_order() {
        let a = Context::new(vec![fo("x", 1), fo("y", 2)], vec![]);
        let b = Context::new(vec![fo("y", 2), fo("x", 1)], vec![]);
        assert_eq!(a, b);
    }

    #[test]
    fn json_round_trip_preserves_equality() {
        let ctx = Context::new(
            vec![fo("libc_start_main", 0x2A200)],
            vec![FoundChain { name: "chain1".into(), offsets: vec![fo("gadget", 0x1234)] }],
        );

        let json = serde_json::to_string(&ctx).unwrap();
        let decoded: Context = serde_json::from_str(&json).unwrap();
        assert_eq!(ctx, decoded);
    }
}
