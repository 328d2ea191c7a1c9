//! Turns an assembly-text [`OffsetData::Text`] opcode pattern into raw
//! bytes via Keystone, the same assembler the ported searcher used
//! (`import keystone`).
//!
//! Grounded on `linux_searcher.py`'s `search_opcodes`, which hard-codes
//! `keystone.KS_ARCH_X86, keystone.KS_MODE_64` with a `# Find Arch?!`
//! comment acknowledging the gap. This port resolves that open question
//! by making the architecture a constructor parameter instead
//! (see DESIGN.md), defaulting to x86-64.

use keystone::{Arch as KsArch, Keystone, Mode as KsMode};

use offender_core::{Error, Result};

/// Target instruction set for assembling opcode text patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerArch {
    X86_64,
    X86_32,
    Arm64,
    Arm,
}

impl Default for AssemblerArch {
    fn default() -> Self {
        AssemblerArch::X86_64
    }
}

impl AssemblerArch {
    fn keystone_arch_mode(self) -> (KsArch, KsMode) {
        match self {
            AssemblerArch::X86_64 => (KsArch::X86, KsMode::MODE_64),
            AssemblerArch::X86_32 => (KsArch::X86, KsMode::MODE_32),
            AssemblerArch::Arm64 => (KsArch::ARM64, KsMode::LITTLE_ENDIAN),
            AssemblerArch::Arm => (KsArch::ARM, KsMode::MODE_ARM),
        }
    }

    pub fn assemble(self, text: &str) -> Result<Vec<u8>> {
        let (arch, mode) = self.keystone_arch_mode();
        let engine = Keystone::new(arch, mode)
            .map_err(|e| Error::FindFailure(format!("failed to initialize assembler: {e}")))?;
        let assembled = engine
            .asm(text.to_owned(), 0)
            .map_err(|e| Error::FindFailure(format!("failed to assemble {text:?}: {e}")))?;
        Ok(assembled.bytes)
    }
}
