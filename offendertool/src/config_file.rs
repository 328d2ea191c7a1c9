//! TOML schema for declaring offsets outside of code.
//!
//! `offender-core`'s own API is code-first (builder calls with closures
//! for filters/modifications), which a config file can't express. This
//! is sugar over that same API for the subset expressible
//! declaratively: plain name-dependencies (no private nested groups),
//! and the default filter/modification pair (`first_candidate`,
//! `identity`) rather than arbitrary Rust callbacks. Grounded on
//! `pdbtool`'s subcommand-per-options-struct convention, adapted to a
//! whole-config file instead of per-invocation CLI flags since offset
//! declarations are naturally data, not flags.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use offender_core::{BinaryHandle, BinarySet, Chain, Dependency, ElfFilter, OffsetFlavor, OffsetGroup, OffsetSpec};

#[derive(Debug, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub offsets: Vec<OffsetDecl>,
    #[serde(default)]
    pub chains: Vec<ChainDecl>,
}

#[derive(Debug, Deserialize)]
pub struct ChainDecl {
    pub name: String,
    #[serde(default)]
    pub offsets: Vec<OffsetDecl>,
}

#[derive(Debug, Deserialize)]
pub struct OffsetDecl {
    pub name: String,
    pub flavor: FlavorDecl,
    pub data: Option<DataDecl>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub elf: Option<ElfDecl>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlavorDecl {
    Symbol,
    SymbolSize,
    Section,
    SectionSize,
    Opcodes,
}

impl From<FlavorDecl> for OffsetFlavor {
    fn from(decl: FlavorDecl) -> Self {
        match decl {
            FlavorDecl::Symbol => OffsetFlavor::Symbol,
            FlavorDecl::SymbolSize => OffsetFlavor::SymbolSize,
            FlavorDecl::Section => OffsetFlavor::Section,
            FlavorDecl::SectionSize => OffsetFlavor::SectionSize,
            FlavorDecl::Opcodes => OffsetFlavor::Opcodes,
        }
    }
}

/// Either a plain string (assembly/symbol/section name text) or a
/// `{ hex = "..." }` table naming a literal opcode byte pattern.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DataDecl {
    Text(String),
    Bytes { hex: String },
}

/// Either a single ELF name or a list of ELF names (any match).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ElfDecl {
    One(String),
    Many(Vec<String>),
}

impl From<ElfDecl> for ElfFilter {
    fn from(decl: ElfDecl) -> Self {
        match decl {
            ElfDecl::One(name) => ElfFilter::One(name),
            ElfDecl::Many(names) => ElfFilter::Many(names.into_iter().collect()),
        }
    }
}

impl OffsetDecl {
    fn into_spec(self) -> anyhow::Result<OffsetSpec> {
        let mut spec = match self.data {
            Some(DataDecl::Text(text)) => OffsetSpec::new(self.name, self.flavor.into(), text),
            Some(DataDecl::Bytes { hex }) => {
                let bytes = decode_hex(&hex)?;
                OffsetSpec::new(self.name, self.flavor.into(), bytes)
            }
            None => OffsetSpec::derived(self.name, self.flavor.into()),
        };

        spec = spec.optional(self.optional);
        if let Some(elf) = self.elf {
            spec = spec.elf(elf.into());
        }
        if !self.depends_on.is_empty() {
            spec = spec.depends_on(self.depends_on.into_iter().map(Dependency::Name));
        }
        Ok(spec)
    }
}

fn decode_hex(text: &str) -> anyhow::Result<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        anyhow::bail!("hex opcode pattern must have an even number of digits: {text:?}");
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).map_err(|e| anyhow::anyhow!("invalid hex byte in {text:?}: {e}")))
        .collect()
}

impl FileConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn into_config(self) -> anyhow::Result<offender_core::Config> {
        let general = if self.offsets.is_empty() {
            None
        } else {
            let specs = self.offsets.into_iter().map(OffsetDecl::into_spec).collect::<anyhow::Result<Vec<_>>>()?;
            Some(OffsetGroup::anonymous(specs)?)
        };

        let chains = self
            .chains
            .into_iter()
            .map(|chain| {
                let specs = chain.offsets.into_iter().map(OffsetDecl::into_spec).collect::<anyhow::Result<Vec<_>>>()?;
                Ok(Chain::new(chain.name.clone(), OffsetGroup::new(chain.name, specs)?))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(offender_core::Config::new(general, chains)?)
    }
}

/// One version's binary set, as declared in a `find` manifest.
#[derive(Debug, Deserialize)]
pub struct BinaryDecl {
    pub primary: PathBuf,
    #[serde(default)]
    pub companion: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct VersionsManifest {
    pub versions: HashMap<String, Vec<BinaryDecl>>,
}

impl VersionsManifest {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn into_binary_sets(self) -> std::collections::BTreeMap<String, BinarySet> {
        self.versions
            .into_iter()
            .map(|(version, binaries)| {
                let handles = binaries.into_iter().map(|b| BinaryHandle::new(b.primary, b.companion)).collect();
                (version, BinarySet::new(handles))
            })
            .collect()
    }
}
