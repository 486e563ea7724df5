//! STL I/O for stlview
//!
//! This crate decodes ASCII and binary STL byte streams into
//! [`stlview_core::Geometry`] triangle soups, re-encodes geometry as binary
//! STL, and abstracts over where mesh bytes come from (file, memory, or any
//! caller-supplied source).

pub mod stl;
pub mod source;

pub use stl::{
    detect_encoding, encode_binary, parse, parse_bytes, FormatHint, RawMeshBytes, StlEncoding,
};
pub use source::{ByteSource, FileSource, MemorySource};
