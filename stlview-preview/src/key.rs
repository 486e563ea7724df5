//! Cache key derivation
//!
//! A preview's identity is the fingerprint of its source reference, the
//! caller-supplied id and every recognized option. Equal inputs always
//! yield an equal key; any differing option changes it.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fmt::Write as _;
use stlview_core::PreviewOptions;

const KEY_PREFIX: &str = "preview:";

/// Deterministic fingerprint identifying one preview request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key from a request's identity.
    ///
    /// The inputs are serialized field by field in a fixed order before
    /// hashing, so key equality does not depend on any map or formatting
    /// nondeterminism.
    pub fn derive(source_url: &str, caller_id: Option<&str>, options: &PreviewOptions) -> Self {
        let mut canonical = String::new();
        // write! to a String cannot fail.
        let _ = write!(
            canonical,
            "url={source_url}\nid={}\nw={}\nh={}\nbg={:?}\nmc={:?}\ncam=",
            caller_id.unwrap_or("-"),
            options.width,
            options.height,
            options.background_color,
            options.model_color,
        );
        match options.camera_position {
            Some(p) => {
                let _ = write!(canonical, "{},{},{}", p.x, p.y, p.z);
            }
            None => canonical.push_str("none"),
        }
        let _ = write!(
            canonical,
            "\nal={}\ndl={}\nq={:?}",
            options.lighting.ambient_intensity,
            options.lighting.directional_intensity,
            options.quality,
        );

        let digest = Sha256::digest(canonical.as_bytes());
        CacheKey(format!("{KEY_PREFIX}{digest:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix shared by every preview key, for store-wide listing
    pub fn prefix() -> &'static str {
        KEY_PREFIX
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stlview_core::{Point3f, Quality};

    #[test]
    fn identical_inputs_collide() {
        let a = CacheKey::derive("models/cube.stl", Some("42"), &PreviewOptions::default());
        let b = CacheKey::derive("models/cube.stl", Some("42"), &PreviewOptions::default());
        assert_eq!(a, b);
        assert!(a.as_str().starts_with(CacheKey::prefix()));
    }

    #[test]
    fn every_field_participates_in_the_key() {
        let base = PreviewOptions::default();
        let baseline = CacheKey::derive("m.stl", None, &base);

        let mut variants = Vec::new();
        let mut o = base.clone();
        o.width = 401;
        variants.push(o);
        let mut o = base.clone();
        o.height = 301;
        variants.push(o);
        let mut o = base.clone();
        o.background_color = [0, 0, 0];
        variants.push(o);
        let mut o = base.clone();
        o.model_color = [1, 2, 3];
        variants.push(o);
        let mut o = base.clone();
        o.camera_position = Some(Point3f::new(1.0, 2.0, 3.0));
        variants.push(o);
        let mut o = base.clone();
        o.lighting.ambient_intensity = 0.9;
        variants.push(o);
        let mut o = base.clone();
        o.lighting.directional_intensity = 0.2;
        variants.push(o);
        let mut o = base.clone();
        o.quality = Quality::Low;
        variants.push(o);

        for variant in &variants {
            assert_ne!(baseline, CacheKey::derive("m.stl", None, variant));
        }
    }

    #[test]
    fn source_and_caller_participate_in_the_key() {
        let options = PreviewOptions::default();
        let a = CacheKey::derive("a.stl", None, &options);
        let b = CacheKey::derive("b.stl", None, &options);
        let c = CacheKey::derive("a.stl", Some("7"), &options);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
