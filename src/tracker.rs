//! The per-frame tracking pipeline.

use image::GrayImage;
use nalgebra::{Point2, Point3};

use crate::camera::CameraIntrinsics;
use crate::combination::{enumerate_combinations, LineCombination, LineSlot};
use crate::contour::{self, Contour};
use crate::ellipse::{self, Ellipse};
use crate::feature_line::{assemble_feature_lines, FeatureLine};
use crate::fragment::{self, Fragment};
use crate::params::{ObjectPointMap, TrackerParams};
use crate::pose::{mean_reprojection_error, project_plane, solve_planar_pose, PlaneLocalization};
use crate::threshold::binarize;
use crate::TrackerError;

/// Intermediate results of every pipeline stage, for inspection and
/// visualization by debug tooling.
#[derive(Clone, Debug, Default)]
pub struct DebugData {
    /// The binarized frame.
    pub thresholded: Option<GrayImage>,
    /// All traced contours.
    pub contours: Vec<Contour>,
    /// Indices into `contours` classified as line candidates.
    pub line_contours: Vec<usize>,
    /// Indices into `contours` classified as dot candidates.
    pub ellipse_contours: Vec<usize>,
    /// Fragments before the fit-quality and length gates.
    pub fragments_raw: Vec<Fragment>,
    /// Fragments after filtering.
    pub fragments: Vec<Fragment>,
    /// Ellipses before the shape gates.
    pub ellipses_raw: Vec<Ellipse>,
    /// Ellipses after filtering and deduplication.
    pub ellipses: Vec<Ellipse>,
    /// All assembled feature lines.
    pub feature_lines: Vec<FeatureLine>,
    /// Number of candidate combinations handed to the pose solver.
    pub combination_count: usize,
    /// Mean reprojection error of every attempted combination, in attempt
    /// order.
    pub reprojection_errors: Vec<f64>,
    /// The accepted combination, if any.
    pub combination: Option<LineCombination>,
    /// The projected plane corners, if a pose was accepted.
    pub corners: Option<[Point2<f64>; 4]>,
}

/// The plane tracker: a stateless image-to-pose function bundled with its
/// configuration and the derived marker model.
///
/// `locate` borrows the tracker immutably and allocates all per-frame
/// state locally, so independent frames may be processed concurrently on a
/// single instance.
pub struct Tracker {
    intrinsics: CameraIntrinsics,
    params: TrackerParams,
    object_points: ObjectPointMap,
}

impl Tracker {
    /// Creates a tracker, validating the configuration and deriving the
    /// marker model.
    pub fn new(
        intrinsics: CameraIntrinsics,
        params: TrackerParams,
    ) -> Result<Tracker, TrackerError> {
        params.validate()?;
        let object_points = ObjectPointMap::derive(&params);
        Ok(Tracker {
            intrinsics,
            params,
            object_points,
        })
    }

    /// Creates a tracker with a caller-measured marker model in place of
    /// the one derived from the plane geometry.
    pub fn with_object_points(
        intrinsics: CameraIntrinsics,
        params: TrackerParams,
        object_points: ObjectPointMap,
    ) -> Result<Tracker, TrackerError> {
        params.validate()?;
        Ok(Tracker {
            intrinsics,
            params,
            object_points,
        })
    }

    /// The active configuration.
    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    /// The camera intrinsics supplied at construction.
    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    /// The derived marker model.
    pub fn object_points(&self) -> &ObjectPointMap {
        &self.object_points
    }

    /// Replaces the configuration and re-derives the marker model.
    pub fn set_params(&mut self, params: TrackerParams) -> Result<(), TrackerError> {
        params.validate()?;
        self.object_points = ObjectPointMap::derive(&params);
        self.params = params;
        Ok(())
    }

    /// Localizes the plane in a single grayscale frame.
    ///
    /// Returns `Ok(None)` when no plane consistent with the marker pattern
    /// is found; this is the common case for frames not showing the target.
    pub fn locate(&self, frame: &GrayImage) -> Result<Option<PlaneLocalization>, TrackerError> {
        self.run(frame, None)
    }

    /// Like [`Tracker::locate`], additionally collecting every stage's
    /// intermediate results.
    pub fn locate_with_debug(
        &self,
        frame: &GrayImage,
    ) -> Result<(Option<PlaneLocalization>, DebugData), TrackerError> {
        let mut debug = DebugData::default();
        let localization = self.run(frame, Some(&mut debug))?;
        Ok((localization, debug))
    }

    fn run(
        &self,
        frame: &GrayImage,
        mut debug: Option<&mut DebugData>,
    ) -> Result<Option<PlaneLocalization>, TrackerError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(TrackerError::DegenerateInput {
                reason: "zero-sized image",
            });
        }
        let params = &self.params;

        let binary = binarize(frame, params);
        let contours = contour::extract_contours(&binary);
        if let Some(debug) = debug.as_deref_mut() {
            debug.thresholded = Some(binary);
            debug.contours = contours.clone();
        }
        if contours.len() < params.min_contour_count {
            return Ok(None);
        }

        let (line_indices, ellipse_indices) = contour::classify(&contours, params);
        if let Some(debug) = debug.as_deref_mut() {
            debug.line_contours = line_indices.clone();
            debug.ellipse_contours = ellipse_indices.clone();
        }

        let fragments_raw = fragment::fit_fragments(&contours, &line_indices);
        if let Some(debug) = debug.as_deref_mut() {
            debug.fragments_raw = fragments_raw.clone();
        }
        let fragments = fragment::filter_fragments(fragments_raw, params);
        if let Some(debug) = debug.as_deref_mut() {
            debug.fragments = fragments.clone();
        }

        let ellipses_raw = ellipse::fit_ellipses(&contours, &ellipse_indices);
        if let Some(debug) = debug.as_deref_mut() {
            debug.ellipses_raw = ellipses_raw.clone();
        }
        let ellipses = ellipse::deduplicate(ellipse::filter_ellipses(
            ellipses_raw,
            frame.width(),
            frame.height(),
            params,
        ));
        if let Some(debug) = debug.as_deref_mut() {
            debug.ellipses = ellipses.clone();
        }
        if ellipses.len() < params.min_ellipse_count {
            return Ok(None);
        }

        let feature_lines = assemble_feature_lines(&fragments, &ellipses, params);
        if let Some(debug) = debug.as_deref_mut() {
            debug.feature_lines = feature_lines.clone();
        }
        if feature_lines.len() < params.min_feature_line_count {
            return Ok(None);
        }

        let Some(combinations) = enumerate_combinations(&feature_lines) else {
            return Ok(None);
        };
        if let Some(debug) = debug.as_deref_mut() {
            debug.combination_count = combinations.len();
        }

        let threshold = params.optimization_error_threshold * params.img_size_factor;
        let mut accepted = None;
        for combination in &combinations {
            let (object_points, image_points) =
                self.correspondences(combination, &feature_lines);
            let Some((rvec, tvec)) =
                solve_planar_pose(&object_points, &image_points, &self.intrinsics)
            else {
                continue;
            };
            let Some(error) = mean_reprojection_error(
                &object_points,
                &image_points,
                &rvec,
                &tvec,
                &self.intrinsics,
            ) else {
                continue;
            };
            if let Some(debug) = debug.as_deref_mut() {
                debug.reprojection_errors.push(error);
            }
            if error < threshold {
                accepted = Some((rvec, tvec, combination));
                break;
            }
        }
        let Some((rvec, tvec, combination)) = accepted else {
            return Ok(None);
        };

        let Some(localization) = project_plane(
            &rvec,
            &tvec,
            params.plane_width,
            params.plane_height,
            &self.intrinsics,
        ) else {
            return Ok(None);
        };
        if let Some(debug) = debug.as_deref_mut() {
            debug.combination = Some(combination.clone());
            debug.corners = Some(localization.corners);
        }
        Ok(Some(localization))
    }

    /// Concatenates object and image points of every filled slot, in slot
    /// order.
    fn correspondences(
        &self,
        combination: &LineCombination,
        feature_lines: &[FeatureLine],
    ) -> (Vec<Point3<f64>>, Vec<Point2<f64>>) {
        let mut object_points = Vec::new();
        let mut image_points = Vec::new();
        for slot in LineSlot::ALL {
            if let Some(line_idx) = combination.get(slot) {
                object_points.extend_from_slice(self.object_points.slot(slot));
                image_points.extend_from_slice(feature_lines[line_idx].points());
            }
        }
        (object_points, image_points)
    }
}
