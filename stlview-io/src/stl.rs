//! STL format support
//!
//! Decodes ASCII and binary STL into triangle-soup geometry and encodes
//! geometry back to binary STL.
//!
//! Binary layout: an 80-byte header (ignored), a little-endian `u32`
//! triangle count, then one 50-byte record per facet (12 bytes facet
//! normal, 36 bytes vertex positions, 2 bytes attribute count, ignored).
//! ASCII layout is line-oriented and parsed tolerantly: `facet normal`
//! lines set the current normal, `vertex` lines append positions, all
//! other lines are skipped.

use stlview_core::{Error, Geometry, Point3f, Result, Vector3f};

/// Detected STL encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StlEncoding {
    Ascii,
    Binary,
}

/// Caller-supplied format hint.
///
/// `Auto` uses the `solid`-token heuristic below; callers who know their
/// input can force an encoding to sidestep the heuristic's false positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatHint {
    #[default]
    Auto,
    Ascii,
    Binary,
}

/// A raw mesh byte buffer tagged with its detected encoding
#[derive(Debug, Clone)]
pub struct RawMeshBytes {
    pub data: Vec<u8>,
    pub encoding: StlEncoding,
}

impl RawMeshBytes {
    /// Tag a byte buffer using the detection heuristic
    pub fn new(data: Vec<u8>) -> Self {
        let encoding = detect_encoding(&data);
        Self { data, encoding }
    }

    /// Tag a byte buffer with an explicit hint, falling back to detection
    /// for `FormatHint::Auto`
    pub fn with_hint(data: Vec<u8>, hint: FormatHint) -> Self {
        let encoding = match hint {
            FormatHint::Auto => detect_encoding(&data),
            FormatHint::Ascii => StlEncoding::Ascii,
            FormatHint::Binary => StlEncoding::Binary,
        };
        Self { data, encoding }
    }
}

/// Detect the STL encoding of a byte buffer.
///
/// The first 80 bytes are decoded lossily as text; if they contain the
/// token `solid` (case-insensitive, leading whitespace ignored) the buffer
/// is treated as ASCII, otherwise as binary. Known limitation: a binary
/// file whose header text happens to contain "solid" is misclassified.
/// Callers who know their input should pass [`FormatHint`] instead.
pub fn detect_encoding(data: &[u8]) -> StlEncoding {
    let head = &data[..data.len().min(80)];
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();
    if text.trim_start().contains("solid") {
        StlEncoding::Ascii
    } else {
        StlEncoding::Binary
    }
}

/// Parse a tagged byte buffer into geometry
pub fn parse(raw: &RawMeshBytes) -> Result<Geometry> {
    match raw.encoding {
        StlEncoding::Ascii => parse_ascii(&raw.data),
        StlEncoding::Binary => parse_binary(&raw.data),
    }
}

/// Detect the encoding of `data` (honoring `hint`) and parse it
pub fn parse_bytes(data: &[u8], hint: FormatHint) -> Result<Geometry> {
    let raw = RawMeshBytes::with_hint(data.to_vec(), hint);
    parse(&raw)
}

const BINARY_HEADER_LEN: usize = 80;
const BINARY_RECORD_LEN: usize = 50;

fn parse_binary(data: &[u8]) -> Result<Geometry> {
    if data.len() < BINARY_HEADER_LEN + 4 {
        return Err(Error::Truncated {
            expected: BINARY_HEADER_LEN + 4,
            actual: data.len(),
        });
    }

    let count_bytes = [data[80], data[81], data[82], data[83]];
    let triangle_count = u32::from_le_bytes(count_bytes) as usize;

    let expected = (BINARY_HEADER_LEN as u64 + 4)
        .checked_add(triangle_count as u64 * BINARY_RECORD_LEN as u64)
        .ok_or(Error::Format("triangle count overflows".to_string()))?;
    if (data.len() as u64) < expected {
        return Err(Error::Truncated {
            expected: expected as usize,
            actual: data.len(),
        });
    }

    let mut geometry = Geometry::with_capacity(triangle_count);
    let mut offset = BINARY_HEADER_LEN + 4;
    for _ in 0..triangle_count {
        let normal = read_vector3(data, offset);
        let v0 = read_point3(data, offset + 12);
        let v1 = read_point3(data, offset + 24);
        let v2 = read_point3(data, offset + 36);
        geometry.push_facet([v0, v1, v2], normal);
        // 2-byte attribute count is skipped
        offset += BINARY_RECORD_LEN;
    }

    Ok(geometry)
}

fn parse_ascii(data: &[u8]) -> Result<Geometry> {
    let text = String::from_utf8_lossy(data);
    let mut geometry = Geometry::new();
    let mut current_normal = Vector3f::new(0.0, 0.0, 1.0);
    let mut pending: Vec<Point3f> = Vec::with_capacity(3);

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = strip_token_prefix(line, &["facet", "normal"]) {
            let [x, y, z] = parse_floats(rest, line)?;
            current_normal = Vector3f::new(x, y, z);
        } else if let Some(rest) = strip_token_prefix(line, &["vertex"]) {
            let [x, y, z] = parse_floats(rest, line)?;
            pending.push(Point3f::new(x, y, z));
            if pending.len() == 3 {
                geometry.push_facet([pending[0], pending[1], pending[2]], current_normal);
                pending.clear();
            }
        }
        // `solid`, `outer loop`, `endloop`, `endfacet`, `endsolid`, comments
        // and anything else are skipped silently.
    }

    if !pending.is_empty() {
        return Err(Error::Format(format!(
            "incomplete facet: {} trailing vertex lines",
            pending.len()
        )));
    }

    Ok(geometry)
}

/// If `line` starts with the given keyword tokens, return the remainder
fn strip_token_prefix<'a>(line: &'a str, tokens: &[&str]) -> Option<&'a str> {
    let mut rest = line;
    for token in tokens {
        rest = rest.trim_start();
        let candidate = rest.get(..token.len())?;
        if !candidate.eq_ignore_ascii_case(token) {
            return None;
        }
        rest = &rest[token.len()..];
        // Keywords must be whole tokens, not prefixes of longer words.
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }
    }
    Some(rest)
}

fn parse_floats(rest: &str, line: &str) -> Result<[f32; 3]> {
    let mut values = [0.0f32; 3];
    let mut tokens = rest.split_whitespace();
    for value in &mut values {
        let token = tokens
            .next()
            .ok_or_else(|| Error::Format(format!("expected 3 numbers in line: {line:?}")))?;
        *value = token
            .parse::<f32>()
            .map_err(|_| Error::Format(format!("invalid number {token:?} in line: {line:?}")))?;
    }
    Ok(values)
}

/// Encode a geometry as binary STL.
///
/// One facet normal per triangle is taken from the first of its three
/// per-vertex normals; attribute byte counts are written as zero.
/// Reparsing the output yields numerically identical positions.
pub fn encode_binary(geometry: &Geometry) -> Vec<u8> {
    let triangle_count = geometry.triangle_count();
    let mut out = Vec::with_capacity(BINARY_HEADER_LEN + 4 + triangle_count * BINARY_RECORD_LEN);

    let mut header = [0u8; BINARY_HEADER_LEN];
    let tag = b"stlview binary export";
    header[..tag.len()].copy_from_slice(tag);
    out.extend_from_slice(&header);
    out.extend_from_slice(&(triangle_count as u32).to_le_bytes());

    for i in 0..triangle_count {
        write_vector3(&mut out, &geometry.normals[i * 3]);
        for j in 0..3 {
            let p = &geometry.positions[i * 3 + j];
            out.extend_from_slice(&p.x.to_le_bytes());
            out.extend_from_slice(&p.y.to_le_bytes());
            out.extend_from_slice(&p.z.to_le_bytes());
        }
        out.extend_from_slice(&0u16.to_le_bytes());
    }

    out
}

fn read_f32(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_point3(data: &[u8], offset: usize) -> Point3f {
    Point3f::new(
        read_f32(data, offset),
        read_f32(data, offset + 4),
        read_f32(data, offset + 8),
    )
}

fn read_vector3(data: &[u8], offset: usize) -> Vector3f {
    Vector3f::new(
        read_f32(data, offset),
        read_f32(data, offset + 4),
        read_f32(data, offset + 8),
    )
}

fn write_vector3(out: &mut Vec<u8>, v: &Vector3f) {
    out.extend_from_slice(&v.x.to_le_bytes());
    out.extend_from_slice(&v.y.to_le_bytes());
    out.extend_from_slice(&v.z.to_le_bytes());
}
