//! Binary handles: a primary ELF path plus an optional companion
//! (separated debug info) path, keyed by the primary's file-name
//! basename (the "ELF name") within an ordered binary set.

use std::path::{Path, PathBuf};

/// A primary binary plus an optional companion file carrying separated
/// debug info (typically DWARF).
#[derive(Debug, Clone)]
pub struct BinaryHandle {
    pub primary: PathBuf,
    pub companion: Option<PathBuf>,
}

impl BinaryHandle {
    pub fn new(primary: impl Into<PathBuf>, companion: Option<PathBuf>) -> Self {
        Self { primary: primary.into(), companion }
    }

    /// The file-name basename of the primary path; used in filters,
    /// errors, and results as the "ELF name".
    pub fn elf_name(&self) -> String {
        self.primary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.primary.to_string_lossy().into_owned())
    }
}

/// An ordered list of binary handles making up one version of a
/// program (e.g. an executable plus the shared libraries it links).
#[derive(Debug, Clone, Default)]
pub struct BinarySet {
    handles: Vec<BinaryHandle>,
}

impl BinarySet {
    pub fn new(handles: Vec<BinaryHandle>) -> Self {
        Self { handles }
    }

    pub fn handles(&self) -> &[BinaryHandle] {
        &self.handles
    }

    /// ELF names known to this set, in insertion order.
    pub fn known_elf_names(&self) -> Vec<String> {
        self.handles.iter().map(|h| h.elf_name()).collect()
    }

    /// Looks up a binary handle by its ELF name.
    pub fn get(&self, elf_name: &str) -> Option<&BinaryHandle> {
        self.handles.iter().find(|h| h.elf_name() == elf_name)
    }
}

impl FromIterator<(PathBuf, Option<PathBuf>)> for BinarySet {
    fn from_iter<I: IntoIterator<Item = (PathBuf, Option<PathBuf>)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(p, c)| BinaryHandle::new(p, c)).collect())
    }
}

impl<'a> FromIterator<&'a str> for BinarySet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|p| BinaryHandle::new(Path::new(p), None)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elf_name_is_primary_basename() {
        let handle = BinaryHandle::new("/opt/builds/libc.so.6", Some("/opt/builds/libc.so.6.debug".into()));
        assert_eq!(handle.elf_name(), "libc.so.6");
    }
}
