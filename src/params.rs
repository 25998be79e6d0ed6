//! Tracker configuration and the derived 3-D marker model.

use nalgebra::{Point2, Point3, Vector2};

use crate::combination::LineSlot;
use crate::TrackerError;

/// Tuning thresholds and marker-pattern geometry.
///
/// The defaults describe the reference marker layout: a 28.4 × 18.5 plane
/// whose edge markers consist of a line segment spanning positions 0–6 and
/// two dots at positions 8 and 10 (`norm_points`), placed with the per-side
/// margins below. All detection thresholds are in pixels unless noted.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackerParams {
    /// Physical width of the plane, in the units of `norm_points`.
    pub plane_width: f64,
    /// Physical height of the plane.
    pub plane_height: f64,
    /// Offset of the top-left marker from the top-left corner.
    pub top_left_margin: f64,
    /// Offset of the top-right marker from the top-right corner.
    pub top_right_margin: f64,
    /// Offset of the bottom-left marker from the bottom-left corner.
    pub bottom_left_margin: f64,
    /// Offset of the bottom-right marker from the bottom-right corner.
    pub bottom_right_margin: f64,
    /// Offset of the left-edge marker from the top-left corner.
    pub left_top_margin: f64,
    /// Offset of the right-edge marker from the top-right corner.
    pub right_top_margin: f64,
    /// Ascending 1-D positions of the four feature points along a marker;
    /// the first must be 0, the last is the pattern length.
    pub norm_points: [f64; 4],
    /// Global scale applied to pixel-denominated thresholds when the caller
    /// feeds resized frames.
    pub img_size_factor: f64,
    /// Additive constant of the adaptive threshold.
    pub thresh_c: f64,
    /// Half size of the adaptive-threshold window; the window spans
    /// `2 * half + 1` pixels.
    pub thresh_half_kernel_size: u32,
    /// Minimum contour area for the line-candidate pool.
    pub min_area_line: f64,
    /// Maximum contour area for the line-candidate pool.
    pub max_area_line: f64,
    /// Minimum contour area for the dot-candidate pool.
    pub min_area_ellipse: f64,
    /// Maximum contour area for the dot-candidate pool.
    pub max_area_ellipse: f64,
    /// Minimum number of support points for any candidate contour.
    pub min_contour_support: usize,
    /// Maximum mean perpendicular residual of a fragment's line fit; also
    /// the colinearity tolerance when dots are matched to a fragment.
    pub fragments_max_projection_error: f64,
    /// Minimum fragment length.
    pub fragments_min_length: f64,
    /// Maximum fragment length.
    pub fragments_max_length: f64,
    /// Minimum major-axis length of a dot; the minor axis may be half this.
    pub min_ellipse_size: f64,
    /// Maximum major/minor axis ratio of a dot.
    pub max_ellipse_aspect_ratio: f64,
    /// Tolerance on the cross-ratio match (typical 0.01–0.03).
    pub max_cr_error: f64,
    /// Maximum span of a candidate feature line.
    pub max_feature_line_length: f64,
    /// Mean reprojection error below which a pose is accepted.
    pub optimization_error_threshold: f64,
    /// Frames with fewer raw contours are rejected early.
    pub min_contour_count: usize,
    /// Frames with fewer surviving dots are rejected early.
    pub min_ellipse_count: usize,
    /// Frames with fewer feature lines are rejected early.
    pub min_feature_line_count: usize,
}

impl Default for TrackerParams {
    fn default() -> Self {
        TrackerParams {
            plane_width: 28.4,
            plane_height: 18.5,
            top_left_margin: 1.57,
            top_right_margin: 2.1,
            bottom_left_margin: 1.55,
            bottom_right_margin: 1.4,
            left_top_margin: 4.33,
            right_top_margin: 4.6,
            norm_points: [0.0, 6.0, 8.0, 10.0],
            img_size_factor: 1.0,
            thresh_c: 40.0,
            thresh_half_kernel_size: 20,
            min_area_line: 200.0,
            max_area_line: 850.0,
            min_area_ellipse: 24.0,
            max_area_ellipse: 180.0,
            min_contour_support: 6,
            fragments_max_projection_error: 5.0,
            fragments_min_length: 10.0,
            fragments_max_length: 200.0,
            min_ellipse_size: 6.0,
            max_ellipse_aspect_ratio: 2.0,
            max_cr_error: 0.03,
            max_feature_line_length: 200.0,
            optimization_error_threshold: 5.0,
            min_contour_count: 8,
            min_ellipse_count: 8,
            min_feature_line_count: 2,
        }
    }
}

impl TrackerParams {
    /// Checks the configuration for internal consistency.
    pub(crate) fn validate(&self) -> Result<(), TrackerError> {
        if self.norm_points[0] != 0.0 {
            return Err(TrackerError::InvalidConfiguration {
                reason: "norm_points must start at 0",
            });
        }
        if self.norm_points.windows(2).any(|w| w[1] <= w[0]) {
            return Err(TrackerError::InvalidConfiguration {
                reason: "norm_points must be strictly ascending",
            });
        }
        let margins = [
            self.top_left_margin,
            self.top_right_margin,
            self.bottom_left_margin,
            self.bottom_right_margin,
            self.left_top_margin,
            self.right_top_margin,
        ];
        if margins.iter().any(|&m| m < 0.0 || !m.is_finite()) {
            return Err(TrackerError::InvalidConfiguration {
                reason: "margins must be non-negative",
            });
        }
        if self.plane_width <= 0.0 || self.plane_height <= 0.0 {
            return Err(TrackerError::InvalidConfiguration {
                reason: "plane extents must be positive",
            });
        }
        if self.img_size_factor <= 0.0 {
            return Err(TrackerError::InvalidConfiguration {
                reason: "img_size_factor must be positive",
            });
        }
        if self.thresh_half_kernel_size == 0 {
            return Err(TrackerError::InvalidConfiguration {
                reason: "threshold window must be at least one pixel",
            });
        }
        Ok(())
    }

    /// Decodes parameters from the on-disk JSON document. Missing keys fall
    /// back to their defaults.
    #[cfg(feature = "serde")]
    pub fn from_json_str(document: &str) -> Result<TrackerParams, TrackerError> {
        let params: TrackerParams =
            serde_json::from_str(document).map_err(|e| TrackerError::MalformedParams {
                reason: e.to_string(),
            })?;
        params.validate()?;
        Ok(params)
    }

    /// Encodes the parameters as a JSON document.
    #[cfg(feature = "serde")]
    pub fn to_json_string(&self) -> Result<String, TrackerError> {
        serde_json::to_string_pretty(self).map_err(|e| TrackerError::MalformedParams {
            reason: e.to_string(),
        })
    }
}

/// The 3-D object points of the four feature points of each marker,
/// indexed by line slot. Derived from the plane geometry once at tracker
/// construction; all points have z = 0.
#[derive(Clone, Debug)]
pub struct ObjectPointMap {
    points: [[Point3<f64>; 4]; 6],
}

impl ObjectPointMap {
    /// Derives the map from the plane geometry.
    ///
    /// Each marker is parameterized by an anchor (the line segment's free
    /// end) and an in-plane axis running toward the dot pair, mirroring the
    /// canonical point order produced by the orientation classifier.
    pub fn derive(params: &TrackerParams) -> ObjectPointMap {
        let (w, h) = (params.plane_width, params.plane_height);
        let length = params.norm_points[3];

        let frames: [(Point2<f64>, Vector2<f64>); 6] = [
            // TOP_LEFT: runs leftward toward the top-left corner.
            (
                Point2::new(params.top_left_margin + length, 0.0),
                Vector2::new(-1.0, 0.0),
            ),
            // TOP_RIGHT: runs rightward toward the top-right corner.
            (
                Point2::new(w - params.top_right_margin - length, 0.0),
                Vector2::new(1.0, 0.0),
            ),
            // BOTTOM_LEFT
            (
                Point2::new(params.bottom_left_margin + length, h),
                Vector2::new(-1.0, 0.0),
            ),
            // BOTTOM_RIGHT
            (
                Point2::new(w - params.bottom_right_margin - length, h),
                Vector2::new(1.0, 0.0),
            ),
            // LEFT: runs downward from below the top-left corner.
            (
                Point2::new(0.0, params.left_top_margin),
                Vector2::new(0.0, 1.0),
            ),
            // RIGHT: runs upward toward the top-right corner.
            (
                Point2::new(w, params.right_top_margin + length),
                Vector2::new(0.0, -1.0),
            ),
        ];

        let mut points = [[Point3::origin(); 4]; 6];
        for (slot_points, (anchor, axis)) in points.iter_mut().zip(frames) {
            for (point, norm) in slot_points.iter_mut().zip(params.norm_points) {
                let p = anchor + axis * norm;
                *point = Point3::new(p.x, p.y, 0.0);
            }
        }
        ObjectPointMap { points }
    }

    /// Builds a map from caller-measured per-slot point quadruples, in
    /// [`LineSlot::ALL`] order.
    pub fn from_points(points: [[Point3<f64>; 4]; 6]) -> ObjectPointMap {
        ObjectPointMap { points }
    }

    /// The ordered point quadruple of `slot`.
    pub fn slot(&self, slot: LineSlot) -> &[Point3<f64>; 4] {
        &self.points[slot.index()]
    }
}
