//! Pinhole camera intrinsics with the Brown–Conrady distortion model.

use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};

use crate::TrackerError;

/// Calibrated intrinsics of the camera observing the plane.
///
/// Frames are assumed to be pre-undistorted unless distortion coefficients
/// `(k1, k2, p1, p2, k3)` are supplied.
#[derive(Clone, Copy, Debug)]
pub struct CameraIntrinsics {
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
    distortion: [f64; 5],
}

impl CameraIntrinsics {
    /// Creates intrinsics from a 3×3 camera matrix and distortion
    /// coefficients `(k1, k2, p1, p2, k3)`.
    pub fn new(matrix: Matrix3<f64>, distortion: [f64; 5]) -> Result<Self, TrackerError> {
        if matrix.iter().any(|v| !v.is_finite()) || distortion.iter().any(|v| !v.is_finite()) {
            return Err(TrackerError::InvalidIntrinsics {
                reason: "non-finite entries",
            });
        }
        if matrix[(0, 0)].abs() < 1e-9 || matrix[(1, 1)].abs() < 1e-9 {
            return Err(TrackerError::InvalidIntrinsics {
                reason: "zero focal length",
            });
        }
        if matrix[(2, 0)] != 0.0 || matrix[(2, 1)] != 0.0 || matrix[(2, 2)] != 1.0 {
            return Err(TrackerError::InvalidIntrinsics {
                reason: "bottom row must be [0, 0, 1]",
            });
        }
        let inverse = matrix
            .try_inverse()
            .ok_or(TrackerError::InvalidIntrinsics {
                reason: "camera matrix is singular",
            })?;
        Ok(CameraIntrinsics {
            matrix,
            inverse,
            distortion,
        })
    }

    /// Creates distortion-free intrinsics from a 3×3 camera matrix.
    pub fn undistorted(matrix: Matrix3<f64>) -> Result<Self, TrackerError> {
        CameraIntrinsics::new(matrix, [0.0; 5])
    }

    /// Creates distortion-free intrinsics from focal lengths and the
    /// principal point.
    pub fn from_focal_center(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self, TrackerError> {
        CameraIntrinsics::undistorted(Matrix3::new(
            fx, 0.0, cx, //
            0.0, fy, cy, //
            0.0, 0.0, 1.0,
        ))
    }

    /// The 3×3 camera matrix.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// The distortion coefficients `(k1, k2, p1, p2, k3)`.
    pub fn distortion(&self) -> &[f64; 5] {
        &self.distortion
    }

    fn has_distortion(&self) -> bool {
        self.distortion.iter().any(|&k| k != 0.0)
    }

    /// Projects an object-space point into the image under pose
    /// `(rvec, tvec)`, applying the distortion model.
    ///
    /// Returns `None` for points that do not project to a finite pixel
    /// (at or behind the camera plane).
    pub fn project(
        &self,
        rvec: &Vector3<f64>,
        tvec: &Vector3<f64>,
        point: &Point3<f64>,
    ) -> Option<Point2<f64>> {
        let rotation = Rotation3::new(*rvec);
        let cam = rotation * point.coords + tvec;
        if cam.z <= 1e-9 {
            return None;
        }
        let (xd, yd) = self.distort(cam.x / cam.z, cam.y / cam.z);
        let pixel = self.matrix * Vector3::new(xd, yd, 1.0);
        Some(Point2::new(pixel.x, pixel.y))
    }

    /// Applies the forward distortion model to normalized coordinates.
    fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        if !self.has_distortion() {
            return (x, y);
        }
        let [k1, k2, p1, p2, k3] = self.distortion;
        let r2 = x * x + y * y;
        let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
        let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        (xd, yd)
    }

    /// Maps a distorted pixel to ideal normalized coordinates by inverting
    /// the camera matrix and iteratively removing the distortion.
    pub(crate) fn normalize_undistorted(&self, pixel: Point2<f64>) -> Point2<f64> {
        let v = self.inverse * Vector3::new(pixel.x, pixel.y, 1.0);
        let (xd, yd) = (v.x / v.z, v.y / v.z);
        if !self.has_distortion() {
            return Point2::new(xd, yd);
        }

        let [k1, k2, p1, p2, k3] = self.distortion;
        let (mut x, mut y) = (xd, yd);
        for _ in 0..8 {
            let r2 = x * x + y * y;
            let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
            let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
            let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
            x = (xd - dx) / radial;
            y = (yd - dy) / radial;
        }
        Point2::new(x, y)
    }
}
