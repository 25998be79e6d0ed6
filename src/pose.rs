//! Planar pose recovery from slot correspondences and projection of the
//! accepted plane back into the image.

use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};

use crate::camera::CameraIntrinsics;
use crate::geometry::Homography;

/// The accepted localization of the plane for one frame.
#[derive(Clone, Debug)]
pub struct PlaneLocalization {
    /// Rotation of the plane relative to the camera, as a scaled axis.
    pub rvec: Vector3<f64>,
    /// Translation of the plane origin in camera coordinates.
    pub tvec: Vector3<f64>,
    /// The four plane corners projected into the image, in the order
    /// top-left, top-right, bottom-right, bottom-left.
    pub corners: [Point2<f64>; 4],
    /// Homography mapping image pixels to plane-normalized coordinates
    /// in `[0, 1]²`.
    pub img2plane: Matrix3<f64>,
}

impl PlaneLocalization {
    /// Maps an image point (e.g. a gaze sample) to plane-normalized
    /// coordinates. Points on the plane fall into `[0, 1]²`.
    pub fn map_point(&self, point: Point2<f64>) -> Option<Point2<f64>> {
        Homography::new(self.img2plane).apply(point)
    }
}

/// Recovers the pose of the z = 0 plane from object/image correspondences.
///
/// The image points are undistorted and normalized, a DLT homography is
/// fitted from the object plane to the normalized image plane, and the
/// homography is decomposed into `[r1 r2 t]` with the nearest-rotation
/// orthonormalization. Returns `None` on numerical failure.
pub(crate) fn solve_planar_pose(
    object_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
) -> Option<(Vector3<f64>, Vector3<f64>)> {
    if object_points.len() != image_points.len() || object_points.len() < 4 {
        return None;
    }

    let src: Vec<Point2<f64>> = object_points.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let dst: Vec<Point2<f64>> = image_points
        .iter()
        .map(|&p| intrinsics.normalize_undistorted(p))
        .collect();
    let h = Homography::from_points(&src, &dst)?.matrix;

    let h1 = Vector3::new(h[(0, 0)], h[(1, 0)], h[(2, 0)]);
    let h2 = Vector3::new(h[(0, 1)], h[(1, 1)], h[(2, 1)]);
    let h3 = Vector3::new(h[(0, 2)], h[(1, 2)], h[(2, 2)]);

    let scale = 2.0 / (h1.norm() + h2.norm());
    if !scale.is_finite() || scale <= 0.0 {
        return None;
    }
    // The plane must sit in front of the camera.
    let scale = if h3.z * scale < 0.0 { -scale } else { scale };

    let r1 = h1 * scale;
    let r2 = h2 * scale;
    let r3 = r1.cross(&r2);
    let tvec = h3 * scale;

    // Nearest rotation to the (not exactly orthonormal) frame.
    let approx = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = approx.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut rotation = u * v_t;
    if rotation.determinant() < 0.0 {
        rotation = u * Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0)) * v_t;
    }
    if rotation.iter().any(|v| !v.is_finite()) || tvec.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let rvec = Rotation3::from_matrix_unchecked(rotation).scaled_axis();
    Some((rvec, tvec))
}

/// Mean Euclidean reprojection error of the correspondences under the
/// estimated pose, in image pixels.
pub(crate) fn mean_reprojection_error(
    object_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    rvec: &Vector3<f64>,
    tvec: &Vector3<f64>,
    intrinsics: &CameraIntrinsics,
) -> Option<f64> {
    let mut total = 0.0;
    for (obj, img) in object_points.iter().zip(image_points) {
        let projected = intrinsics.project(rvec, tvec, obj)?;
        total += (projected - img).norm();
    }
    Some(total / object_points.len() as f64)
}

/// Projects the plane corners under the accepted pose and derives the
/// image-to-plane homography.
pub(crate) fn project_plane(
    rvec: &Vector3<f64>,
    tvec: &Vector3<f64>,
    plane_width: f64,
    plane_height: f64,
    intrinsics: &CameraIntrinsics,
) -> Option<PlaneLocalization> {
    let object_corners = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(plane_width, 0.0, 0.0),
        Point3::new(plane_width, plane_height, 0.0),
        Point3::new(0.0, plane_height, 0.0),
    ];
    let mut corners = [Point2::origin(); 4];
    for (corner, obj) in corners.iter_mut().zip(&object_corners) {
        *corner = intrinsics.project(rvec, tvec, obj)?;
    }

    let unit_square = [
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(1.0, 1.0),
        Point2::new(0.0, 1.0),
    ];
    let img2plane = Homography::from_points(&corners, &unit_square)?.matrix;

    Some(PlaneLocalization {
        rvec: *rvec,
        tvec: *tvec,
        corners,
        img2plane,
    })
}
