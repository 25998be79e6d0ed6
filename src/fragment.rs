//! Total-least-squares line fitting for marker line-segment contours.

use nalgebra::{Point2, Vector2};

use crate::contour::Contour;
use crate::geometry::LineParams;
use crate::params::TrackerParams;

/// A line-segment candidate fitted to a contour.
///
/// The direction is unit-length; the endpoints are the extreme projections
/// of the support points onto the fitted line.
#[derive(Clone, Debug)]
pub struct Fragment {
    line: LineParams,
    start: Point2<f64>,
    end: Point2<f64>,
    projection_error: f64,
}

impl Fragment {
    /// Fits a line to the support points in the least-squares sense (the
    /// principal axis of the point scatter) and derives endpoints and the
    /// mean perpendicular residual.
    pub fn fit(points: &[Point2<f64>]) -> Option<Fragment> {
        if points.len() < 2 {
            return None;
        }

        let n = points.len() as f64;
        let mut centroid = Vector2::zeros();
        for p in points {
            centroid += p.coords;
        }
        centroid /= n;

        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for p in points {
            let dx = p.x - centroid.x;
            let dy = p.y - centroid.y;
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }
        if sxx + syy < 1e-12 {
            return None;
        }

        let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
        let direction = Vector2::new(theta.cos(), theta.sin());
        let line = LineParams::new(direction, Point2::from(centroid))?;

        let mut t_min = f64::INFINITY;
        let mut t_max = f64::NEG_INFINITY;
        let mut residual = 0.0;
        for p in points {
            let t = line.project_t(*p);
            t_min = t_min.min(t);
            t_max = t_max.max(t);
            residual += line.distance_to(*p);
        }

        Some(Fragment {
            line,
            start: line.point_at(t_min),
            end: line.point_at(t_max),
            projection_error: residual / n,
        })
    }

    /// The fitted infinite line.
    pub fn line(&self) -> &LineParams {
        &self.line
    }

    /// The endpoint at the minimum projection parameter.
    pub fn start(&self) -> Point2<f64> {
        self.start
    }

    /// The endpoint at the maximum projection parameter.
    pub fn end(&self) -> Point2<f64> {
        self.end
    }

    /// Distance between the two endpoints.
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// Mean perpendicular distance of the support points to the line.
    pub fn projection_error(&self) -> f64 {
        self.projection_error
    }
}

/// Fits a fragment to every line-pool contour.
pub(crate) fn fit_fragments(contours: &[Contour], indices: &[usize]) -> Vec<Fragment> {
    indices
        .iter()
        .filter_map(|&idx| Fragment::fit(&contours[idx].points))
        .collect()
}

/// Drops fragments with a poor fit or an implausible length.
pub(crate) fn filter_fragments(fragments: Vec<Fragment>, params: &TrackerParams) -> Vec<Fragment> {
    let min_length = params.fragments_min_length * params.img_size_factor;
    let max_length = params.fragments_max_length * params.img_size_factor;
    fragments
        .into_iter()
        .filter(|f| {
            f.projection_error <= params.fragments_max_projection_error
                && f.length() >= min_length
                && f.length() <= max_length
        })
        .collect()
}
