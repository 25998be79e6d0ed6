//! Planar geometry primitives shared by the detection stages: fitted lines
//! in direction/anchor form, the four-point cross-ratio, and projective
//! transforms estimated by direct linear transformation.

use nalgebra::{DMatrix, Matrix3, Point2, Vector2, Vector3};

/// A 2-D line in direction/anchor form.
///
/// Invariant: the direction is unit-length.
#[derive(Clone, Copy, Debug)]
pub struct LineParams {
    direction: Vector2<f64>,
    origin: Point2<f64>,
}

impl LineParams {
    /// Creates a line through `origin` along `direction`.
    ///
    /// Returns `None` if the direction vector is (numerically) zero.
    pub fn new(direction: Vector2<f64>, origin: Point2<f64>) -> Option<Self> {
        let norm = direction.norm();
        if norm < 1e-12 {
            return None;
        }
        Some(LineParams {
            direction: direction / norm,
            origin,
        })
    }

    /// The unit direction vector.
    pub fn direction(&self) -> Vector2<f64> {
        self.direction
    }

    /// The anchor point used to parameterize the line.
    pub fn origin(&self) -> Point2<f64> {
        self.origin
    }

    /// The signed 1-D parameter of `point` projected onto the line.
    pub fn project_t(&self, point: Point2<f64>) -> f64 {
        (point - self.origin).dot(&self.direction)
    }

    /// The point at parameter `t`.
    pub fn point_at(&self, t: f64) -> Point2<f64> {
        self.origin + self.direction * t
    }

    /// Perpendicular distance from `point` to the infinite line.
    pub fn distance_to(&self, point: Point2<f64>) -> f64 {
        let delta = point - self.origin;
        (delta.x * self.direction.y - delta.y * self.direction.x).abs()
    }
}

/// Perpendicular distance from `target` to the infinite line through
/// `origin` along `direction` (not necessarily unit-length).
pub fn point_line_distance(
    origin: Point2<f64>,
    direction: Vector2<f64>,
    target: Point2<f64>,
) -> f64 {
    let direction = direction / direction.norm();
    let delta = target - origin;
    let projected = origin + direction * delta.dot(&direction);
    (target - projected).norm()
}

/// The cross-ratio of four collinear points given by ascending 1-D
/// parameters `A < B < C < D`, computed as `(AB / BD) · (CD / AC)`.
///
/// Signed differences are used so that a flipped ordering cannot
/// coincidentally produce the same value.
pub fn cross_ratio(t: [f64; 4]) -> f64 {
    let ab = t[1] - t[0];
    let bd = t[3] - t[1];
    let ac = t[2] - t[0];
    let cd = t[3] - t[2];
    (ab / bd) * (cd / ac)
}

/// A 3×3 projective transform between planes.
#[derive(Clone, Copy, Debug)]
pub struct Homography {
    /// The transform matrix, normalized so that `h33 = 1` where possible.
    pub matrix: Matrix3<f64>,
}

impl Homography {
    /// Wraps an existing matrix.
    pub fn new(matrix: Matrix3<f64>) -> Self {
        Homography { matrix }
    }

    /// Applies the transform to a point, performing the w-divide.
    ///
    /// Returns `None` for points mapped to infinity.
    pub fn apply(&self, point: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.matrix * Vector3::new(point.x, point.y, 1.0);
        if v.z.abs() < 1e-12 {
            return None;
        }
        Some(Point2::new(v.x / v.z, v.y / v.z))
    }

    /// The inverse transform, if the matrix is invertible.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(Homography::new)
    }

    /// Estimates the homography `dst ~ H · src` from `n ≥ 4` point
    /// correspondences by SVD of the stacked DLT system, with Hartley
    /// normalization of both point sets for conditioning.
    pub fn from_points(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Self> {
        if src.len() != dst.len() || src.len() < 4 {
            return None;
        }

        let (src_n, t_src) = normalize_points(src)?;
        let (dst_n, t_dst) = normalize_points(dst)?;

        // Zero-pad to at least nine rows so the thin SVD still carries the
        // full right-singular basis for the minimal four-point system.
        let n = src.len();
        let mut a = DMatrix::<f64>::zeros((2 * n).max(9), 9);
        for k in 0..n {
            let (x, y) = (src_n[k].x, src_n[k].y);
            let (u, v) = (dst_n[k].x, dst_n[k].y);

            // [ -x -y -1   0  0  0   u*x u*y u ]
            a[(2 * k, 0)] = -x;
            a[(2 * k, 1)] = -y;
            a[(2 * k, 2)] = -1.0;
            a[(2 * k, 6)] = u * x;
            a[(2 * k, 7)] = u * y;
            a[(2 * k, 8)] = u;

            // [ 0  0  0  -x -y -1   v*x v*y v ]
            a[(2 * k + 1, 3)] = -x;
            a[(2 * k + 1, 4)] = -y;
            a[(2 * k + 1, 5)] = -1.0;
            a[(2 * k + 1, 6)] = v * x;
            a[(2 * k + 1, 7)] = v * y;
            a[(2 * k + 1, 8)] = v;
        }

        // h is the right singular vector with the smallest singular value.
        let svd = a.svd(true, true);
        let vt = svd.v_t?;
        let h = vt.row(vt.nrows().checked_sub(1)?);
        let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

        // Denormalize: H = T_dst^{-1} * Hn * T_src, then fix the h33 scale.
        let h_den = t_dst.try_inverse()? * hn * t_src;
        if h_den[(2, 2)].abs() < 1e-12 {
            return None;
        }
        Some(Homography::new(h_den / h_den[(2, 2)]))
    }
}

/// Hartley normalization: translate to the centroid, scale so the mean
/// distance from it becomes sqrt(2).
fn normalize_points(points: &[Point2<f64>]) -> Option<(Vec<Point2<f64>>, Matrix3<f64>)> {
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

    let s = if mean_dist > 1e-12 {
        2.0_f64.sqrt() / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);

    let transformed = points
        .iter()
        .map(|p| Point2::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    Some((transformed, t))
}
