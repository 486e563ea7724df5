//! Byte sources for mesh data
//!
//! The parser is agnostic to where STL bytes come from; a [`ByteSource`]
//! collaborator resolves an opaque reference (path, URL, catalog id) to a
//! tagged byte buffer.

use crate::stl::{FormatHint, RawMeshBytes};
use std::collections::HashMap;
use std::path::PathBuf;
use stlview_core::{Error, Result};

/// Resolves a mesh reference to raw bytes
pub trait ByteSource: Send + Sync {
    /// Fetch the bytes behind `reference`.
    ///
    /// Fails with [`Error::Fetch`] if the reference is unreachable or
    /// unreadable; the core never retries fetches automatically.
    fn fetch_bytes(&self, reference: &str) -> Result<RawMeshBytes>;
}

/// Reads mesh bytes from the filesystem, relative to a base directory
#[derive(Debug, Clone)]
pub struct FileSource {
    base_dir: PathBuf,
    hint: FormatHint,
}

impl FileSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            hint: FormatHint::Auto,
        }
    }

    /// Force an STL encoding instead of sniffing it per file
    pub fn with_hint(mut self, hint: FormatHint) -> Self {
        self.hint = hint;
        self
    }
}

impl ByteSource for FileSource {
    fn fetch_bytes(&self, reference: &str) -> Result<RawMeshBytes> {
        let path = self.base_dir.join(reference);
        let data = std::fs::read(&path)
            .map_err(|e| Error::Fetch(format!("failed to read {}: {e}", path.display())))?;
        Ok(RawMeshBytes::with_hint(data, self.hint))
    }
}

/// Serves mesh bytes from an in-memory map, mainly for tests
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    entries: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: impl Into<String>, data: Vec<u8>) {
        self.entries.insert(reference.into(), data);
    }
}

impl ByteSource for MemorySource {
    fn fetch_bytes(&self, reference: &str) -> Result<RawMeshBytes> {
        self.entries
            .get(reference)
            .map(|data| RawMeshBytes::new(data.clone()))
            .ok_or_else(|| Error::Fetch(format!("unknown mesh reference: {reference}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stl::StlEncoding;
    use std::io::Write;

    #[test]
    fn memory_source_tags_encoding() {
        let mut source = MemorySource::new();
        source.insert("tri.stl", b"solid tri\nendsolid tri\n".to_vec());
        let raw = source.fetch_bytes("tri.stl").unwrap();
        assert_eq!(raw.encoding, StlEncoding::Ascii);
    }

    #[test]
    fn memory_source_misses_are_fetch_errors() {
        let source = MemorySource::new();
        let err = source.fetch_bytes("nope.stl").unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
    }

    #[test]
    fn file_source_reads_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.stl");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"solid cube\nendsolid cube\n").unwrap();

        let source = FileSource::new(dir.path());
        let raw = source.fetch_bytes("cube.stl").unwrap();
        assert_eq!(raw.encoding, StlEncoding::Ascii);

        let err = source.fetch_bytes("missing.stl").unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
    }
}
