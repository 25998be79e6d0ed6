//! Feature-line assembly: pairing each fragment with two dots whose four
//! collinear positions exhibit the marker's cross-ratio, then classifying
//! the marker orientation from the spacing pattern.

use itertools::Itertools;
use nalgebra::{Point2, Vector2};

use crate::ellipse::Ellipse;
use crate::fragment::Fragment;
use crate::geometry::cross_ratio;
use crate::params::TrackerParams;

/// The cross-ratio built into the physical marker by the dot placement.
const TARGET_CROSS_RATIO: f64 = 0.375;

/// The direction a marker's canonical point sequence runs in the image,
/// from the line segment's free end toward the dot pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    /// Vertical marker whose sequence runs upward.
    Top,
    /// Vertical marker whose sequence runs downward.
    Bottom,
    /// Horizontal marker whose sequence runs leftward.
    Left,
    /// Horizontal marker whose sequence runs rightward.
    Right,
}

/// Four collinear image points (two fragment endpoints and two dot centers)
/// matching the marker's cross-ratio.
///
/// The points are in canonical order: from the line segment's free end
/// toward the dot pair, so the broad spacing comes first. The stored
/// t-values are the ascending 1-D parameters measured along the fragment.
#[derive(Clone, Debug)]
pub struct FeatureLine {
    points: [Point2<f64>; 4],
    ts: [f64; 4],
    cross_ratio: f64,
    orientation: Orientation,
}

impl FeatureLine {
    /// Classifies orientation from points sorted by ascending t and brings
    /// them into canonical order.
    fn from_sorted(mut points: [Point2<f64>; 4], ts: [f64; 4], cross_ratio: f64) -> FeatureLine {
        let span = points[3] - points[0];
        let leading_gap = ts[1] - ts[0];
        let trailing_gap = ts[3] - ts[2];

        let orientation = if span.x.abs() > span.y.abs() {
            if leading_gap > trailing_gap {
                Orientation::Right
            } else {
                points.reverse();
                Orientation::Left
            }
        } else if leading_gap > trailing_gap {
            Orientation::Bottom
        } else {
            points.reverse();
            Orientation::Top
        };

        FeatureLine {
            points,
            ts,
            cross_ratio,
            orientation,
        }
    }

    /// The four points in canonical order.
    pub fn points(&self) -> &[Point2<f64>; 4] {
        &self.points
    }

    /// The canonical first point (the line segment's free end).
    pub fn first(&self) -> Point2<f64> {
        self.points[0]
    }

    /// The canonical last point (the outermost dot).
    pub fn last(&self) -> Point2<f64> {
        self.points[3]
    }

    /// Vector from the canonical first to the canonical last point.
    pub fn direction(&self) -> Vector2<f64> {
        self.points[3] - self.points[0]
    }

    /// The ascending 1-D parameters along the fragment.
    pub fn ts(&self) -> &[f64; 4] {
        &self.ts
    }

    /// The measured cross-ratio.
    pub fn cross_ratio(&self) -> f64 {
        self.cross_ratio
    }

    /// The classified marker orientation.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }
}

/// For every fragment, emits all dot pairs that are colinear with it and
/// whose four projected positions match the target cross-ratio.
pub(crate) fn assemble_feature_lines(
    fragments: &[Fragment],
    ellipses: &[Ellipse],
    params: &TrackerParams,
) -> Vec<FeatureLine> {
    if ellipses.len() < 2 || fragments.is_empty() {
        return Vec::new();
    }

    let max_span = params.max_feature_line_length * params.img_size_factor;
    let mut lines = Vec::new();
    for fragment in fragments {
        let line = fragment.line();
        let candidates: Vec<(f64, Point2<f64>)> = ellipses
            .iter()
            .filter(|e| line.distance_to(e.center) < params.fragments_max_projection_error)
            .map(|e| (line.project_t(e.center), e.center))
            .collect();

        let t_start = line.project_t(fragment.start());
        let t_end = line.project_t(fragment.end());

        for (&(t_i, p_i), &(t_j, p_j)) in candidates.iter().tuple_combinations() {
            // Both dots must lie on the same side of the fragment's far
            // endpoint.
            if (t_i - t_end) * (t_j - t_end) < 0.0 {
                continue;
            }

            let mut entries = [
                (t_start, fragment.start()),
                (t_end, fragment.end()),
                (t_i, p_i),
                (t_j, p_j),
            ];
            entries.sort_by(|a, b| a.0.total_cmp(&b.0));
            let ts = [entries[0].0, entries[1].0, entries[2].0, entries[3].0];
            if ts[3] - ts[0] > max_span {
                continue;
            }

            let cr = cross_ratio(ts);
            if (cr - TARGET_CROSS_RATIO).abs() < params.max_cr_error {
                let points = [entries[0].1, entries[1].1, entries[2].1, entries[3].1];
                lines.push(FeatureLine::from_sorted(points, ts, cr));
            }
        }
    }
    lines
}
