//! End-to-end localization tests on synthetically rendered frames.
//!
//! Frames are rendered by mapping every pixel through the inverse of the
//! ground-truth plane-to-image homography and testing membership in the
//! marker shapes in plane coordinates, so the rendering uses nothing but
//! the intrinsics and the pose being recovered.

use image::{GrayImage, Luma};
use ir_plane_tracker::{CameraIntrinsics, LineSlot, Tracker, TrackerParams};
use nalgebra::{Matrix3, Point2, Rotation3, Vector2, Vector3};

const IMG_WIDTH: u32 = 640;
const IMG_HEIGHT: u32 = 480;
const BACKGROUND: u8 = 128;
const MARKER: u8 = 255;

/// Half thickness of the rendered line segments, in plane units.
const LINE_HALF_WIDTH: f64 = 0.4;
/// Radius of the rendered dots, in plane units.
const DOT_RADIUS: f64 = 0.45;
/// Shrink applied to the rendered segment ends. The traced border runs
/// through the pixels just outside the shape, so pulling the drawn ends in
/// by half a pixel centers the detected endpoints on the true ones.
const END_PAD: f64 = 0.0625;

fn intrinsics() -> CameraIntrinsics {
    CameraIntrinsics::from_focal_center(800.0, 800.0, 320.0, 240.0).unwrap()
}

/// Detection gates tuned to the rendered marker scale (the production
/// defaults assume the reference device's frames).
fn test_params() -> TrackerParams {
    TrackerParams {
        min_contour_count: 4,
        min_ellipse_count: 4,
        max_cr_error: 0.05,
        ..TrackerParams::default()
    }
}

fn tracker_with(params: TrackerParams) -> Tracker {
    Tracker::new(intrinsics(), params).unwrap()
}

/// Additional plane-space shapes rendered in marker polarity.
enum Extra {
    Dot { center: Point2<f64>, radius: f64 },
    Bar { from: Point2<f64>, to: Point2<f64>, half_width: f64 },
}

/// A marker in plane coordinates: anchor at the segment's free end, axis
/// running toward the dot pair.
struct Marker {
    anchor: Point2<f64>,
    axis: Vector2<f64>,
}

fn visible_markers(tracker: &Tracker, skip: &[LineSlot]) -> Vec<Marker> {
    LineSlot::ALL
        .iter()
        .filter(|slot| !skip.contains(slot))
        .map(|&slot| {
            let quad = tracker.object_points().slot(slot);
            let anchor = Point2::new(quad[0].x, quad[0].y);
            let span = Vector2::new(quad[3].x - quad[0].x, quad[3].y - quad[0].y);
            Marker {
                anchor,
                axis: span.normalize(),
            }
        })
        .collect()
}

/// The ground-truth homography `K · [r1 r2 t]` mapping plane coordinates
/// to image pixels.
fn plane_to_image(rvec: &Vector3<f64>, tvec: &Vector3<f64>, intr: &CameraIntrinsics) -> Matrix3<f64> {
    let rotation = Rotation3::new(*rvec);
    let r = rotation.matrix();
    let cols = Matrix3::from_columns(&[
        r.column(0).into_owned(),
        r.column(1).into_owned(),
        *tvec,
    ]);
    intr.matrix() * cols
}

fn render(
    tracker: &Tracker,
    rvec: &Vector3<f64>,
    tvec: &Vector3<f64>,
    skip: &[LineSlot],
    extras: &[Extra],
    occluder: Option<(Point2<f64>, Point2<f64>)>,
) -> GrayImage {
    let markers = visible_markers(tracker, skip);
    let norm = tracker.params().norm_points;
    let h = plane_to_image(rvec, tvec, &intrinsics());
    let h_inv = h.try_inverse().expect("ground-truth homography is invertible");

    GrayImage::from_fn(IMG_WIDTH, IMG_HEIGHT, |x, y| {
        let v = h_inv * Vector3::new(f64::from(x), f64::from(y), 1.0);
        if v.z.abs() < 1e-12 {
            return Luma([BACKGROUND]);
        }
        let p = Point2::new(v.x / v.z, v.y / v.z);

        if let Some((min, max)) = occluder {
            if p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y {
                return Luma([0]);
            }
        }

        let on_marker = markers.iter().any(|m| {
            let delta = p - m.anchor;
            let along = delta.dot(&m.axis);
            let across = (delta.x * m.axis.y - delta.y * m.axis.x).abs();
            let on_segment = along >= norm[0] + END_PAD
                && along <= norm[1] - END_PAD
                && across <= LINE_HALF_WIDTH;
            let on_dot = |t: f64| (p - (m.anchor + m.axis * t)).norm() <= DOT_RADIUS;
            on_segment || on_dot(norm[2]) || on_dot(norm[3])
        });
        let on_extra = extras.iter().any(|extra| match extra {
            Extra::Dot { center, radius } => (p - center).norm() <= *radius,
            Extra::Bar {
                from,
                to,
                half_width,
            } => {
                let axis = (to - from).normalize();
                let delta = p - from;
                let along = delta.dot(&axis);
                let across = (delta.x * axis.y - delta.y * axis.x).abs();
                along >= 0.0 && along <= (to - from).norm() && across <= *half_width
            }
        });

        if on_marker || on_extra {
            Luma([MARKER])
        } else {
            Luma([BACKGROUND])
        }
    })
}

fn assert_vector_close(expected: &Vector3<f64>, actual: &Vector3<f64>, tol: f64) {
    for i in 0..3 {
        assert!(
            (expected[i] - actual[i]).abs() < tol,
            "component {} of {:?} not within {} of {:?}",
            i,
            actual,
            tol,
            expected
        );
    }
}

#[test]
fn nominal_fronto_parallel_plane_is_recovered() {
    let tracker = tracker_with(test_params());
    let rvec = Vector3::zeros();
    let tvec = Vector3::new(0.0, 0.0, 100.0);
    let frame = render(&tracker, &rvec, &tvec, &[], &[], None);

    let (localization, debug) = tracker.locate_with_debug(&frame).unwrap();
    let localization = localization.expect("plane should be found");

    assert_vector_close(&tvec, &localization.tvec, 0.5);
    assert!(localization.rvec.norm() < 0.02);
    assert!(*debug.reprojection_errors.last().unwrap() < 1.0);

    // Corners agree with the ideal projections of the plane outline.
    let h = plane_to_image(&rvec, &tvec, &intrinsics());
    let ideal = [
        Point2::new(0.0, 0.0),
        Point2::new(28.4, 0.0),
        Point2::new(28.4, 18.5),
        Point2::new(0.0, 18.5),
    ];
    for (corner, plane_pt) in localization.corners.iter().zip(ideal) {
        let v = h * Vector3::new(plane_pt.x, plane_pt.y, 1.0);
        let projected = Point2::new(v.x / v.z, v.y / v.z);
        assert!(
            (corner - projected).norm() < 1.5,
            "corner {:?} too far from {:?}",
            corner,
            projected
        );
    }
}

#[test]
fn yawed_plane_fills_all_corner_slots() {
    let tracker = tracker_with(test_params());
    let rvec = Vector3::new(0.0, 30.0_f64.to_radians(), 0.0);
    let tvec = Vector3::new(0.0, 0.0, 100.0);
    let frame = render(&tracker, &rvec, &tvec, &[], &[], None);

    let (localization, debug) = tracker.locate_with_debug(&frame).unwrap();
    let localization = localization.expect("plane should be found");

    assert_vector_close(&tvec, &localization.tvec, 1.0);
    assert_vector_close(&rvec, &localization.rvec, 0.05);
    assert!(*debug.reprojection_errors.last().unwrap() < 1.5);

    let combination = debug.combination.expect("accepted combination recorded");
    for slot in [
        LineSlot::TopLeft,
        LineSlot::TopRight,
        LineSlot::BottomLeft,
        LineSlot::BottomRight,
    ] {
        assert!(
            combination.get(slot).is_some(),
            "corner slot {:?} not filled",
            slot
        );
    }
}

#[test]
fn occluded_left_edge_still_localizes() {
    let tracker = tracker_with(test_params());
    let rvec = Vector3::zeros();
    let tvec = Vector3::new(0.0, 0.0, 100.0);
    // Blank the left-edge marker region of the plane.
    let occluder = Some((Point2::new(-0.8, 3.0), Point2::new(0.8, 16.0)));
    let frame = render(&tracker, &rvec, &tvec, &[LineSlot::Left], &[], occluder);

    let (localization, debug) = tracker.locate_with_debug(&frame).unwrap();
    assert!(localization.is_some());

    let combination = debug.combination.unwrap();
    assert!(combination.get(LineSlot::Left).is_none());
    assert!(combination.filled_count() >= 4);
}

#[test]
fn false_positive_dot_does_not_change_the_pose() {
    let tracker = tracker_with(test_params());
    let rvec = Vector3::zeros();
    let tvec = Vector3::new(0.0, 0.0, 100.0);

    let clean = render(&tracker, &rvec, &tvec, &[], &[], None);
    let with_distractor = render(
        &tracker,
        &rvec,
        &tvec,
        &[],
        &[Extra::Dot {
            center: Point2::new(14.0, 9.0),
            radius: DOT_RADIUS,
        }],
        None,
    );

    let reference = tracker.locate(&clean).unwrap().unwrap();
    let distorted = tracker.locate(&with_distractor).unwrap().unwrap();
    for (a, b) in reference.corners.iter().zip(distorted.corners.iter()) {
        assert!((a - b).norm() < 0.1);
    }
}

#[test]
fn spurious_parallel_line_does_not_break_localization() {
    let tracker = tracker_with(test_params());
    let rvec = Vector3::zeros();
    let tvec = Vector3::new(0.0, 0.0, 100.0);

    // A long bright bar parallel to the top edge, 15 px (1.875 plane
    // units) below the top markers.
    let bar = Extra::Bar {
        from: Point2::new(3.0, 1.875),
        to: Point2::new(16.0, 1.875),
        half_width: 0.3,
    };
    let clean = render(&tracker, &rvec, &tvec, &[], &[], None);
    let with_bar = render(&tracker, &rvec, &tvec, &[], &[bar], None);

    let reference = tracker.locate(&clean).unwrap().unwrap();
    let localization = tracker.locate(&with_bar).unwrap().unwrap();
    for (a, b) in reference.corners.iter().zip(localization.corners.iter()) {
        assert!((a - b).norm() < 0.1);
    }
}

#[test]
fn left_and_right_markers_alone_suffice() {
    let tracker = tracker_with(test_params());
    let rvec = Vector3::zeros();
    let tvec = Vector3::new(0.0, 0.0, 100.0);
    let skip = [
        LineSlot::TopLeft,
        LineSlot::TopRight,
        LineSlot::BottomLeft,
        LineSlot::BottomRight,
    ];
    let frame = render(&tracker, &rvec, &tvec, &skip, &[], None);

    let (localization, debug) = tracker.locate_with_debug(&frame).unwrap();
    let localization = localization.expect("two non-colinear markers suffice");
    assert_vector_close(&tvec, &localization.tvec, 1.0);

    let combination = debug.combination.unwrap();
    assert_eq!(combination.filled_count(), 2);
    assert!(combination.get(LineSlot::Left).is_some());
    assert!(combination.get(LineSlot::Right).is_some());
}

#[test]
fn three_markers_suffice() {
    let tracker = tracker_with(test_params());
    let rvec = Vector3::zeros();
    let tvec = Vector3::new(0.0, 0.0, 100.0);
    let skip = [LineSlot::BottomLeft, LineSlot::BottomRight, LineSlot::Right];
    let frame = render(&tracker, &rvec, &tvec, &skip, &[], None);

    let (localization, debug) = tracker.locate_with_debug(&frame).unwrap();
    let localization = localization.expect("three markers should localize");
    assert_vector_close(&tvec, &localization.tvec, 1.0);
    assert_eq!(debug.combination.unwrap().filled_count(), 3);
}

#[test]
fn a_single_marker_is_rejected() {
    let params = TrackerParams {
        min_ellipse_count: 2,
        min_feature_line_count: 1,
        ..test_params()
    };
    let tracker = tracker_with(params);
    let skip = [
        LineSlot::TopRight,
        LineSlot::BottomLeft,
        LineSlot::BottomRight,
        LineSlot::Left,
        LineSlot::Right,
    ];
    let frame = render(&tracker, &Vector3::zeros(), &Vector3::new(0.0, 0.0, 100.0), &skip, &[], None);
    assert!(tracker.locate(&frame).unwrap().is_none());
}

#[test]
fn two_colinear_markers_are_rejected() {
    let tracker = tracker_with(test_params());
    let skip = [
        LineSlot::BottomLeft,
        LineSlot::BottomRight,
        LineSlot::Left,
        LineSlot::Right,
    ];
    let frame = render(&tracker, &Vector3::zeros(), &Vector3::new(0.0, 0.0, 100.0), &skip, &[], None);
    assert!(tracker.locate(&frame).unwrap().is_none());
}

#[test]
fn zero_cross_ratio_tolerance_rejects_every_frame() {
    let params = TrackerParams {
        max_cr_error: 0.0,
        ..test_params()
    };
    let tracker = tracker_with(params);
    let frame = render(&tracker, &Vector3::zeros(), &Vector3::new(0.0, 0.0, 100.0), &[], &[], None);
    assert!(tracker.locate(&frame).unwrap().is_none());
}
