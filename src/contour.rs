//! Contour extraction and classification into line and dot candidate pools.

use image::GrayImage;
use imageproc::contours::find_contours_with_threshold;
use nalgebra::Point2;

use crate::params::TrackerParams;

/// A traced connected-component border with full point retention.
#[derive(Clone, Debug)]
pub struct Contour {
    /// The ordered border points.
    pub points: Vec<Point2<f64>>,
    /// The enclosed polygon area in square pixels.
    pub area: f64,
}

/// Traces all borders in a binary image and computes their areas.
pub(crate) fn extract_contours(binary: &GrayImage) -> Vec<Contour> {
    find_contours_with_threshold::<i32>(binary, 0)
        .into_iter()
        .map(|c| {
            let points: Vec<Point2<f64>> = c
                .points
                .iter()
                .map(|p| Point2::new(f64::from(p.x), f64::from(p.y)))
                .collect();
            let area = polygon_area(&points);
            Contour { points, area }
        })
        .collect()
}

/// Splits contours into a line-candidate pool and a dot-candidate pool by
/// area and support-point count. The pools may overlap.
pub(crate) fn classify(contours: &[Contour], params: &TrackerParams) -> (Vec<usize>, Vec<usize>) {
    let mut line_indices = Vec::new();
    let mut ellipse_indices = Vec::new();
    for (idx, contour) in contours.iter().enumerate() {
        if contour.points.len() < params.min_contour_support {
            continue;
        }
        if contour.area >= params.min_area_line && contour.area <= params.max_area_line {
            line_indices.push(idx);
        }
        if contour.area >= params.min_area_ellipse && contour.area <= params.max_area_ellipse {
            ellipse_indices.push(idx);
        }
    }
    (line_indices, ellipse_indices)
}

/// Shoelace area of the border polygon.
fn polygon_area(points: &[Point2<f64>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut doubled = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        doubled += p.x * q.y - q.x * p.y;
    }
    doubled.abs() / 2.0
}
