//! End-to-end extractor tests driven by an in-memory fake searcher,
//! standing in for the real ELF fixture used by the Python test suite's
//! `test/test_extractor.py` (a known libc with a known symbol). No real
//! binary fixtures are committed to this port; the fake searcher
//! reproduces the same known offsets the Python tests assert on.

use std::collections::HashMap;

use offender_core::offset::{Dependency, ElfFilter, Filter, Modify, OffsetData, OffsetFlavor, OffsetGroup, OffsetSpec, Scope};
use offender_core::searcher::SearchResult;
use offender_core::{BinaryHandle, BinarySet, Chain, Config, Error, Extractor, Searcher};

/// A fake symbol table standing in for a real libc.
struct FakeLibc {
    symbols: HashMap<&'static str, (u64, u64)>,
    sections: HashMap<&'static str, (u64, u64)>,
    ret_addresses: Vec<u64>,
}

impl FakeLibc {
    fn new() -> Self {
        let mut symbols = HashMap::new();
        symbols.insert("__libc_start_main", (0x2A200, 0x50));
        symbols.insert("__libc_start_main_impl", (0x2A200, 0x14E));
        symbols.insert("msgget", (0x55000, 0x20));

        let mut sections = HashMap::new();
        sections.insert(".text", (0x1000, 0x40000));

        Self { symbols, sections, ret_addresses: vec![0x10, 0x2A210, 0x99999] }
    }
}

struct FakeSearcher {
    name: &'static str,
    libc: FakeLibc,
}

impl Searcher for FakeSearcher {
    fn search_symbol(&self, name: &str, elf: &str) -> SearchResult {
        assert_eq!(elf, "libc.so.6");
        Ok(self.libc.symbols.get(name).map(|(addr, _)| vec![*addr]))
    }

    fn search_symbol_size(&self, name: &str, elf: &str) -> SearchResult {
        assert_eq!(elf, "libc.so.6");
        Ok(self.libc.symbols.get(name).map(|(_, size)| vec![*size]))
    }

    fn search_section(&self, name: &str, _elf: &str) -> SearchResult {
        Ok(self.libc.sections.get(name).map(|(addr, _)| vec![*addr]))
    }

    fn search_section_size(&self, name: &str, _elf: &str) -> SearchResult {
        Ok(self.libc.sections.get(name).map(|(_, size)| vec![*size]))
    }

    fn search_opcodes(&self, pattern: &OffsetData, _elf: &str) -> SearchResult {
        match pattern {
            OffsetData::Text(asm) if asm == "ret" => Ok(Some(self.libc.ret_addresses.clone())),
            _ => Ok(None),
        }
    }

    fn name(&self) -> &str {
        self.name
    }
}

fn binaries() -> BinarySet {
    BinarySet::new(vec![BinaryHandle::new("libc.so.6", None)])
}

fn extractor() -> Extractor {
    let searcher = Box::new(FakeSearcher { name: "fake", libc: FakeLibc::new() });
    Extractor::new(binaries(), vec![searcher]).unwrap()
}

#[test]
fn scenario_1_plain_symbol_lookup() {
    let config = Config::new(
        Some(
            OffsetGroup::anonymous(vec![OffsetSpec::new(
                "libc_start_main",
                OffsetFlavor::Symbol,
                "__libc_start_main",
            )])
            .unwrap(),
        ),
        vec![],
    )
    .unwrap();

    let context = extractor().extract(&config).unwrap();
    assert_eq!(context.general.len(), 1);
    let found = &context.general[0];
    assert_eq!(found.name, "libc_start_main");
    assert_eq!(found.value, 0x2A200);
    assert_eq!(found.elf.as_deref(), Some("libc.so.6"));
}

struct AddFour;
impl Modify for AddFour {
    fn apply(&self, value: Option<u64>, _scope: &Scope) -> offender_core::Result<u64> {
        value.map(|v| v + 4).ok_or_else(|| Error::FindFailure("no value".into()))
    }
}

#[test]
fn scenario_2_modification_applies_after_filter() {
    let config = Config::new(
        Some(
            OffsetGroup::anonymous(vec![OffsetSpec::new(
                "libc_start_main",
                OffsetFlavor::Symbol,
                "__libc_start_main",
            )
            .modify(AddFour)])
            .unwrap(),
        ),
        vec![],
    )
    .unwrap();

    let context = extractor().extract(&config).unwrap();
    assert_eq!(context.general[0].value, 0x2A204);
}

struct RaiseIfMultiple;
impl Filter for RaiseIfMultiple {
    fn apply(&self, candidates: &[u64], _scope: &Scope) -> offender_core::Result<Option<u64>> {
        if candidates.len() > 1 {
            return Err(Error::FindFailure(format!("too many candidates: {}", candidates.len())));
        }
        Ok(candidates.first().copied())
    }
}

#[test]
fn scenario_3_filter_raises_on_many_hits() {
    let config = Config::new(
        Some(
            OffsetGroup::anonymous(vec![OffsetSpec::new("ret", OffsetFlavor::Opcodes, "ret")
                .filter(RaiseIfMultiple)])
            .unwrap(),
        ),
        vec![],
    )
    .unwrap();

    let err = extractor().extract(&config).unwrap_err();
    assert!(matches!(err, Error::FindFailure(_)));
}

struct WithinRange;
impl Filter for WithinRange {
    fn apply(&self, candidates: &[u64], scope: &Scope) -> offender_core::Result<Option<u64>> {
        let start = scope.get("impl_sym").unwrap().value;
        let size = scope.get("impl_size").unwrap().value;
        Ok(candidates.iter().copied().find(|c| (start..start + size).contains(c)))
    }
}

#[test]
fn scenario_4_gadget_within_symbol_bounds() {
    let config = Config::new(
        Some(
            OffsetGroup::anonymous(vec![
                OffsetSpec::new("impl_sym", OffsetFlavor::Symbol, "__libc_start_main_impl"),
                OffsetSpec::new("impl_size", OffsetFlavor::SymbolSize, "__libc_start_main_impl"),
                OffsetSpec::new("ret_gadget", OffsetFlavor::Opcodes, "ret")
                    .depends_on([Dependency::from("impl_sym"), Dependency::from("impl_size")])
                    .filter(WithinRange),
            ])
            .unwrap(),
        ),
        vec![],
    )
    .unwrap();

    let context = extractor().extract(&config).unwrap();
    let gadget = context.general.iter().find(|o| o.name == "ret_gadget").unwrap();
    assert!((0x2A200..0x2A200 + 0x14E).contains(&gadget.value));
}

#[test]
fn scenario_5_one_chain_succeeds_other_fails() {
    let good = Chain::new(
        "msgget_chain",
        OffsetGroup::new("msgget_chain", vec![OffsetSpec::new("msgget", OffsetFlavor::Symbol, "msgget")]).unwrap(),
    );
    let bad = Chain::new(
        "ghost_chain",
        OffsetGroup::new("ghost_chain", vec![OffsetSpec::new("ghost", OffsetFlavor::Symbol, "does_not_exist")])
            .unwrap(),
    );

    let config = Config::new(None, vec![good, bad]).unwrap();
    let context = extractor().extract(&config).unwrap();

    assert_eq!(context.chains.len(), 1);
    assert_eq!(context.chains[0].name, "msgget_chain");
}

#[test]
fn scenario_5b_all_chains_fail_is_find_failure() {
    let bad1 = Chain::new(
        "ghost_chain_1",
        OffsetGroup::new("ghost_chain_1", vec![OffsetSpec::new("g1", OffsetFlavor::Symbol, "nope1")]).unwrap(),
    );
    let bad2 = Chain::new(
        "ghost_chain_2",
        OffsetGroup::new("ghost_chain_2", vec![OffsetSpec::new("g2", OffsetFlavor::Symbol, "nope2")]).unwrap(),
    );

    let config = Config::new(None, vec![bad1, bad2]).unwrap();
    let err = extractor().extract(&config).unwrap_err();
    assert!(matches!(err, Error::FindFailure(_)));
}

#[test]
fn scenario_6_dependency_cycle_at_construction() {
    let a = OffsetSpec::new("a", OffsetFlavor::Symbol, "a").depends_on([Dependency::from("b")]);
    let b = OffsetSpec::new("b", OffsetFlavor::Symbol, "b").depends_on([Dependency::from("a")]);
    let group = OffsetGroup::new("general", vec![a, b]).unwrap();
    let config = Config::new(Some(group), vec![]).unwrap();

    let err = config.ordered_general().unwrap_err();
    assert!(matches!(err, Error::DependencyLoop { .. }));
}

#[test]
fn required_offset_miss_is_find_failure() {
    let config = Config::new(
        Some(OffsetGroup::anonymous(vec![OffsetSpec::new("missing", OffsetFlavor::Symbol, "nonexistent")]).unwrap()),
        vec![],
    )
    .unwrap();

    let err = extractor().extract(&config).unwrap_err();
    assert!(matches!(err, Error::FindFailure(_)));
}

#[test]
fn optional_offset_miss_is_silently_absent() {
    let config = Config::new(
        Some(
            OffsetGroup::anonymous(vec![OffsetSpec::new("missing", OffsetFlavor::Symbol, "nonexistent")
                .optional(true)])
            .unwrap(),
        ),
        vec![],
    )
    .unwrap();

    let context = extractor().extract(&config).unwrap();
    assert!(context.general.is_empty());
}

#[test]
fn invalid_elf_filter_is_rejected() {
    let config = Config::new(
        Some(
            OffsetGroup::anonymous(vec![OffsetSpec::new("x", OffsetFlavor::Symbol, "__libc_start_main")
                .elf(ElfFilter::One("not_a_real_elf".into()))])
            .unwrap(),
        ),
        vec![],
    )
    .unwrap();

    let err = extractor().extract(&config).unwrap_err();
    assert!(matches!(err, Error::InvalidElf { .. }));
}

#[test]
fn dependency_miss_when_required_dependency_was_optional_and_missed() {
    let base = OffsetSpec::new("base", OffsetFlavor::Symbol, "does_not_exist").optional(true);
    let dependent =
        OffsetSpec::derived("dependent", OffsetFlavor::Symbol).depends_on([Dependency::from("base")]);

    let config = Config::new(Some(OffsetGroup::anonymous(vec![base, dependent]).unwrap()), vec![]).unwrap();
    let err = extractor().extract(&config).unwrap_err();
    assert!(matches!(err, Error::FindFailure(_)));
}

#[test]
fn absent_data_with_default_modification_is_find_failure() {
    let config =
        Config::new(Some(OffsetGroup::anonymous(vec![OffsetSpec::derived("derived", OffsetFlavor::Symbol)]).unwrap()), vec![])
            .unwrap();

    let err = extractor().extract(&config).unwrap_err();
    assert!(matches!(err, Error::FindFailure(_)));
}
