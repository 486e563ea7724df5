//! Adaptive framing
//!
//! Maps a model's bounding-box size to a uniform scale factor and a camera
//! placement so that meshes measured in any engineering unit fill a similar
//! fraction of the viewport. The scale policy is a five-bucket piecewise
//! function of the largest bounding-box dimension; the bucket constants are
//! parametrized because the interactive viewer and the still generator use
//! different values of the same shape.

use stlview_core::{BoundingBox, Point3f, Vector3f};

/// Bucket boundaries shared by every profile
const TINY_LIMIT: f32 = 0.1;
const SMALL_LIMIT: f32 = 1.0;
const MEDIUM_LIMIT: f32 = 10.0;
const LARGE_LIMIT: f32 = 100.0;

/// Scale and camera constants for one consumer of the framing policy
#[derive(Debug, Clone)]
pub struct FramingProfile {
    /// Returned for zero or negative dimensions
    pub fallback_scale: f32,
    /// Fixed scale for the very-tiny regime `(0, 0.1)`
    pub tiny_scale: f32,
    /// Scale at the small-regime lower bound (0.1)
    pub small_scale: f32,
    /// Scale at the medium-regime lower bound (1.0)
    pub medium_scale: f32,
    /// Scale at the large-regime lower bound (10.0)
    pub large_scale: f32,
    /// Global floor so a pathological model never disappears
    pub min_scale: f32,
    /// Camera distance as a multiple of the largest scaled dimension
    pub distance_factor: f32,
    /// Minimum camera distance
    pub min_distance: f32,
    /// Unit direction from the look-at origin toward the camera
    pub offset: Vector3f,
}

impl FramingProfile {
    /// Constants for the interactive viewer: front-elevated angle,
    /// moderate scaling.
    pub fn interactive() -> Self {
        Self {
            fallback_scale: 1.0,
            tiny_scale: 50.0,
            small_scale: 50.0,
            medium_scale: 5.0,
            large_scale: 1.5,
            min_scale: 0.05,
            distance_factor: 2.0,
            min_distance: 3.0,
            offset: Vector3f::new(0.0, 0.45, 1.0).normalize(),
        }
    }

    /// Constants for the still-image generator: a 3/4 angle and more
    /// aggressive scaling, since its output canvas is smaller.
    pub fn still() -> Self {
        Self {
            fallback_scale: 1.0,
            tiny_scale: 80.0,
            small_scale: 80.0,
            medium_scale: 8.0,
            large_scale: 2.0,
            min_scale: 0.05,
            distance_factor: 1.8,
            min_distance: 2.5,
            offset: Vector3f::new(1.0, 0.8, 1.0).normalize(),
        }
    }

    /// Compute the uniform scale for a model's largest bounding-box
    /// dimension.
    ///
    /// Piecewise over five buckets, linear inside each bucket, continuous
    /// at every boundary, clamped to `min_scale`. Degenerate input returns
    /// `fallback_scale` and never panics.
    pub fn compute_scale(&self, max_dimension: f32) -> f32 {
        if max_dimension <= 0.0 || !max_dimension.is_finite() {
            return self.fallback_scale;
        }
        let scale = if max_dimension < TINY_LIMIT {
            self.tiny_scale
        } else if max_dimension < SMALL_LIMIT {
            let t = (max_dimension - TINY_LIMIT) / (SMALL_LIMIT - TINY_LIMIT);
            lerp(self.small_scale, self.medium_scale, t)
        } else if max_dimension < MEDIUM_LIMIT {
            let t = (max_dimension - SMALL_LIMIT) / (MEDIUM_LIMIT - SMALL_LIMIT);
            lerp(self.medium_scale, self.large_scale, t)
        } else if max_dimension < LARGE_LIMIT {
            // Converges toward 1.0 at the huge-regime boundary.
            let t = (max_dimension - MEDIUM_LIMIT) / (LARGE_LIMIT - MEDIUM_LIMIT);
            lerp(self.large_scale, 1.0, t)
        } else {
            LARGE_LIMIT / max_dimension
        };
        scale.max(self.min_scale)
    }

    /// Compute camera position and look-at for a scaled model.
    ///
    /// A caller-supplied position is used verbatim. The geometry must
    /// already be centered on its bounding-box centroid; the look-at is
    /// always the origin.
    pub fn camera_placement(
        &self,
        scaled_size: Vector3f,
        custom_position: Option<Point3f>,
    ) -> (Point3f, Point3f) {
        let look_at = Point3f::origin();
        if let Some(position) = custom_position {
            return (position, look_at);
        }
        let max_scaled = scaled_size.x.max(scaled_size.y).max(scaled_size.z);
        let distance = (max_scaled * self.distance_factor).max(self.min_distance);
        (Point3f::origin() + self.offset * distance, look_at)
    }

    /// Full framing result for a model's bounds
    pub fn compute_framing(
        &self,
        bounds: &BoundingBox,
        custom_position: Option<Point3f>,
    ) -> FramingResult {
        let scale = self.compute_scale(bounds.max_dimension());
        let scaled_size = bounds.size() * scale;
        let (camera_position, look_at) = self.camera_placement(scaled_size, custom_position);
        FramingResult {
            scale,
            camera_position,
            look_at,
        }
    }
}

/// Scale and camera placement for one model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramingResult {
    pub scale: f32,
    pub camera_position: Point3f,
    pub look_at: Point3f,
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn degenerate_dimensions_return_fallback() {
        for profile in [FramingProfile::interactive(), FramingProfile::still()] {
            assert_eq!(profile.compute_scale(0.0), profile.fallback_scale);
            assert_eq!(profile.compute_scale(-5.0), profile.fallback_scale);
            assert_eq!(profile.compute_scale(f32::NAN), profile.fallback_scale);
        }
    }

    #[test]
    fn scale_is_continuous_at_bucket_boundaries() {
        for profile in [FramingProfile::interactive(), FramingProfile::still()] {
            for boundary in [0.1f32, 1.0, 10.0, 100.0] {
                let below = profile.compute_scale(boundary - 1e-4);
                let at = profile.compute_scale(boundary);
                assert!(
                    (below - at).abs() < 0.05,
                    "jump at {boundary}: {below} vs {at}"
                );
            }
        }
    }

    #[test]
    fn scale_never_increases_with_size() {
        let profile = FramingProfile::still();
        let mut previous = f32::INFINITY;
        let mut dim = 0.01f32;
        while dim < 10_000.0 {
            let scale = profile.compute_scale(dim);
            assert!(
                scale <= previous + 1e-6,
                "scale increased at {dim}: {previous} -> {scale}"
            );
            assert!(scale >= profile.min_scale);
            previous = scale;
            dim *= 1.07;
        }
    }

    #[test]
    fn huge_models_floor_at_min_scale() {
        let profile = FramingProfile::interactive();
        assert_eq!(profile.compute_scale(1.0e7), profile.min_scale);
    }

    #[test]
    fn cube_of_dimension_two_lands_in_medium_regime() {
        for profile in [FramingProfile::interactive(), FramingProfile::still()] {
            let scale = profile.compute_scale(2.0);
            assert!(scale < profile.small_scale);
            assert!(scale > profile.large_scale);
            assert!(scale < profile.medium_scale);
        }
    }

    #[test]
    fn custom_camera_position_is_verbatim() {
        let profile = FramingProfile::still();
        let custom = Point3f::new(1.0, 2.0, 3.0);
        let (position, look_at) =
            profile.camera_placement(Vector3f::new(1.0, 1.0, 1.0), Some(custom));
        assert_eq!(position, custom);
        assert_eq!(look_at, Point3f::origin());
    }

    #[test]
    fn computed_camera_respects_minimum_distance() {
        let profile = FramingProfile::interactive();
        let (position, _) = profile.camera_placement(Vector3f::new(0.01, 0.01, 0.01), None);
        assert_relative_eq!(
            (position - Point3f::origin()).norm(),
            profile.min_distance,
            epsilon = 1e-5
        );
    }

    #[test]
    fn framing_scales_bounds_before_placing_camera() {
        let profile = FramingProfile::still();
        let bounds = BoundingBox::from_points(&[
            Point3f::new(-1.0, -1.0, -1.0),
            Point3f::new(1.0, 1.0, 1.0),
        ]);
        let result = profile.compute_framing(&bounds, None);
        let expected_distance =
            (2.0 * result.scale * profile.distance_factor).max(profile.min_distance);
        assert_relative_eq!(
            (result.camera_position - Point3f::origin()).norm(),
            expected_distance,
            epsilon = 1e-4
        );
    }
}
