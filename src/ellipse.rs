//! Algebraic ellipse fitting for marker dot contours, plus the shape gates
//! and the concentric-duplicate filter.

use nalgebra::{DMatrix, Point2};

use crate::contour::Contour;
use crate::params::TrackerParams;

/// A fitted ellipse.
///
/// Invariant: `major >= minor > 0`. The angle is the orientation of the
/// major axis in degrees, normalized to `[0, 180)`.
#[derive(Clone, Copy, Debug)]
pub struct Ellipse {
    /// Center in image coordinates.
    pub center: Point2<f64>,
    /// Full length of the major axis.
    pub major: f64,
    /// Full length of the minor axis.
    pub minor: f64,
    /// Major-axis orientation in degrees.
    pub angle: f64,
}

impl Ellipse {
    /// Fits a general conic to the support points (SVD null vector of the
    /// normalized design matrix) and converts it to geometric form.
    ///
    /// Returns `None` when the support is too small or the best-fit conic
    /// is not an ellipse.
    pub fn fit(points: &[Point2<f64>]) -> Option<Ellipse> {
        if points.len() < 6 {
            return None;
        }

        // Condition the system: shift to the centroid, scale isotropically.
        let n = points.len() as f64;
        let mut cx = 0.0;
        let mut cy = 0.0;
        for p in points {
            cx += p.x;
            cy += p.y;
        }
        cx /= n;
        cy /= n;
        let mut mean_dist = 0.0;
        for p in points {
            mean_dist += ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt();
        }
        mean_dist /= n;
        if mean_dist < 1e-9 {
            return None;
        }
        let s = 2.0_f64.sqrt() / mean_dist;

        let mut design = DMatrix::<f64>::zeros(points.len(), 6);
        for (row, p) in points.iter().enumerate() {
            let x = s * (p.x - cx);
            let y = s * (p.y - cy);
            design[(row, 0)] = x * x;
            design[(row, 1)] = x * y;
            design[(row, 2)] = y * y;
            design[(row, 3)] = x;
            design[(row, 4)] = y;
            design[(row, 5)] = 1.0;
        }

        let svd = design.svd(true, true);
        let vt = svd.v_t?;
        let conic = vt.row(vt.nrows().checked_sub(1)?);
        let (a, b, c, d, e, f) = (conic[0], conic[1], conic[2], conic[3], conic[4], conic[5]);

        // A degenerate fit (e.g. collinear support) produces a line pair,
        // whose discriminant is non-negative up to rounding.
        let disc = b * b - 4.0 * a * c;
        if disc >= -1e-9 {
            return None;
        }

        let center_x = (2.0 * c * d - b * e) / disc;
        let center_y = (2.0 * a * e - b * d) / disc;
        let mu = a * center_x * center_x
            + b * center_x * center_y
            + c * center_y * center_y
            + d * center_x
            + e * center_y
            + f;

        let theta = 0.5 * b.atan2(a - c);
        let (sin_t, cos_t) = theta.sin_cos();
        let axis_u = a * cos_t * cos_t + b * cos_t * sin_t + c * sin_t * sin_t;
        let axis_v = a * sin_t * sin_t - b * cos_t * sin_t + c * cos_t * cos_t;

        let semi_u_sq = -mu / axis_u;
        let semi_v_sq = -mu / axis_v;
        if semi_u_sq <= 0.0 || semi_v_sq <= 0.0 {
            return None;
        }

        // Undo the normalization: centers map affinely, lengths by 1/s.
        let semi_u = semi_u_sq.sqrt() / s;
        let semi_v = semi_v_sq.sqrt() / s;
        let center = Point2::new(cx + center_x / s, cy + center_y / s);

        let (major, minor, mut angle) = if semi_u >= semi_v {
            (2.0 * semi_u, 2.0 * semi_v, theta.to_degrees())
        } else {
            (2.0 * semi_v, 2.0 * semi_u, theta.to_degrees() + 90.0)
        };
        angle = angle.rem_euclid(180.0);

        Some(Ellipse {
            center,
            major,
            minor,
            angle,
        })
    }

    /// Ratio of the major to the minor axis.
    pub fn aspect_ratio(&self) -> f64 {
        self.major / self.minor
    }
}

/// Fits an ellipse to every dot-pool contour.
pub(crate) fn fit_ellipses(contours: &[Contour], indices: &[usize]) -> Vec<Ellipse> {
    indices
        .iter()
        .filter_map(|&idx| Ellipse::fit(&contours[idx].points))
        .collect()
}

/// Applies the plausibility gates: aspect ratio, absolute size bounds and
/// center-inside-image.
pub(crate) fn filter_ellipses(
    ellipses: Vec<Ellipse>,
    img_width: u32,
    img_height: u32,
    params: &TrackerParams,
) -> Vec<Ellipse> {
    let max_minor = 0.2 * f64::from(img_width.min(img_height));
    ellipses
        .into_iter()
        .filter(|e| {
            e.aspect_ratio() <= params.max_ellipse_aspect_ratio
                && e.minor <= max_minor
                && e.minor >= 0.5 * params.min_ellipse_size
                && e.major >= params.min_ellipse_size
                && e.center.x >= 0.0
                && e.center.x < f64::from(img_width)
                && e.center.y >= 0.0
                && e.center.y < f64::from(img_height)
        })
        .collect()
}

/// Drops double borders around the same dot: an ellipse is removed when a
/// nearly concentric survivor with a larger minor axis exists.
pub(crate) fn deduplicate(ellipses: Vec<Ellipse>) -> Vec<Ellipse> {
    let keep: Vec<bool> = ellipses
        .iter()
        .map(|e| {
            !ellipses.iter().any(|other| {
                let dist = (e.center.x - other.center.x).abs()
                    + (e.center.y - other.center.y).abs();
                dist < 0.1 * e.minor && other.minor > e.minor
            })
        })
        .collect();
    ellipses
        .into_iter()
        .zip(keep)
        .filter_map(|(e, k)| k.then_some(e))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;

    fn ellipse_points(
        cx: f64,
        cy: f64,
        semi_major: f64,
        semi_minor: f64,
        angle_deg: f64,
        count: usize,
    ) -> Vec<Point2<f64>> {
        let (sin_r, cos_r) = angle_deg.to_radians().sin_cos();
        (0..count)
            .map(|i| {
                let t = i as f64 * std::f64::consts::TAU / count as f64;
                let (x, y) = (semi_major * t.cos(), semi_minor * t.sin());
                Point2::new(cx + x * cos_r - y * sin_r, cy + x * sin_r + y * cos_r)
            })
            .collect()
    }

    #[test]
    fn recovers_a_rotated_ellipse() {
        let points = ellipse_points(50.0, 30.0, 10.0, 4.0, 30.0, 48);
        let e = Ellipse::fit(&points).unwrap();
        assert_close(50.0, e.center.x, 1e-6);
        assert_close(30.0, e.center.y, 1e-6);
        assert_close(20.0, e.major, 1e-6);
        assert_close(8.0, e.minor, 1e-6);
        assert_close(30.0, e.angle, 1e-3);
    }

    #[test]
    fn recovers_a_circle() {
        let points = ellipse_points(-12.0, 200.0, 7.0, 7.0, 0.0, 36);
        let e = Ellipse::fit(&points).unwrap();
        assert_close(-12.0, e.center.x, 1e-6);
        assert_close(200.0, e.center.y, 1e-6);
        assert_close(14.0, e.major, 1e-5);
        assert_close(14.0, e.minor, 1e-5);
        assert!(e.major >= e.minor);
    }

    #[test]
    fn axis_ordering_invariant_holds() {
        for angle in [0.0, 20.0, 95.0, 170.0] {
            let points = ellipse_points(0.0, 0.0, 9.0, 3.0, angle, 40);
            let e = Ellipse::fit(&points).unwrap();
            assert!(e.major >= e.minor && e.minor > 0.0);
            assert!((0.0..180.0).contains(&e.angle));
        }
    }

    #[test]
    fn rejects_degenerate_input() {
        let collinear: Vec<Point2<f64>> =
            (0..12).map(|i| Point2::new(i as f64, 2.0 * i as f64)).collect();
        assert!(Ellipse::fit(&collinear).is_none());
        assert!(Ellipse::fit(&collinear[..4]).is_none());
    }

    #[test]
    fn gates_drop_implausible_shapes() {
        let make = |major: f64, minor: f64, cx: f64| Ellipse {
            center: Point2::new(cx, 50.0),
            major,
            minor,
            angle: 0.0,
        };
        let params = TrackerParams {
            min_ellipse_size: 6.0,
            max_ellipse_aspect_ratio: 2.0,
            ..TrackerParams::default()
        };
        let ellipses = vec![
            make(8.0, 6.0, 50.0),   // ok
            make(20.0, 6.0, 50.0),  // aspect ratio too high
            make(8.0, 2.0, 50.0),   // minor too small
            make(5.0, 4.0, 50.0),   // major too small
            make(90.0, 80.0, 50.0), // absurdly large for a 320x240 image
            make(8.0, 6.0, -3.0),   // center outside the image
        ];
        let kept = filter_ellipses(ellipses, 320, 240, &params);
        assert_eq!(kept.len(), 1);
        assert_close(8.0, kept[0].major, 1e-9);
    }

    #[test]
    fn concentric_duplicates_keep_the_larger() {
        let outer = Ellipse {
            center: Point2::new(100.0, 100.0),
            major: 12.0,
            minor: 10.0,
            angle: 0.0,
        };
        let inner = Ellipse {
            center: Point2::new(100.3, 100.2),
            major: 9.0,
            minor: 8.0,
            angle: 0.0,
        };
        let lone = Ellipse {
            center: Point2::new(200.0, 40.0),
            major: 9.0,
            minor: 8.0,
            angle: 0.0,
        };
        let kept = deduplicate(vec![inner, outer, lone]);
        assert_eq!(kept.len(), 2);
        assert_close(12.0, kept[0].major, 1e-9);
        assert_close(200.0, kept[1].center.x, 1e-9);
    }
}
