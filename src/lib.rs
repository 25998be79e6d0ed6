//! `ir_plane_tracker` localizes a rectangular planar target (a display or
//! monitor) in a monocular camera image by detecting a passive infrared
//! marker pattern along the four edges of the plane.
//!
//! Given a single grayscale frame plus known camera intrinsics, the tracker
//! returns the six-degree-of-freedom pose of the plane together with a
//! homography from image pixels to normalized plane coordinates, or reports
//! that no plane was found. The pipeline is stateless per frame; capture,
//! rendering and parameter UIs are left to the caller.

#![deny(missing_docs)]

use thiserror::Error;

pub mod camera;
pub mod combination;
pub mod contour;
pub mod ellipse;
pub mod feature_line;
pub mod fragment;
pub mod geometry;
pub mod params;
pub mod pose;
mod threshold;
pub mod tracker;

pub use camera::CameraIntrinsics;
pub use combination::{LineCombination, LineSlot};
pub use ellipse::Ellipse;
pub use feature_line::{FeatureLine, Orientation};
pub use fragment::Fragment;
pub use params::{ObjectPointMap, TrackerParams};
pub use pose::PlaneLocalization;
pub use tracker::{DebugData, Tracker};

/// Possible errors that may occur while configuring or running the tracker.
///
/// Ordinary geometric failure — a frame in which no plane can be found — is
/// not an error; [`Tracker::locate`] reports it by returning `Ok(None)`.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The input frame cannot be processed at all (e.g. zero-sized axes).
    #[error("degenerate input image: {reason}")]
    DegenerateInput {
        #[doc(hidden)]
        reason: &'static str,
    },
    /// The camera matrix or distortion coefficients are malformed.
    #[error("invalid camera intrinsics: {reason}")]
    InvalidIntrinsics {
        #[doc(hidden)]
        reason: &'static str,
    },
    /// The tracker parameters are inconsistent.
    #[error("invalid tracker configuration: {reason}")]
    InvalidConfiguration {
        #[doc(hidden)]
        reason: &'static str,
    },
    /// A persisted parameter document could not be decoded.
    #[cfg(feature = "serde")]
    #[error("malformed parameter document: {reason}")]
    MalformedParams {
        #[doc(hidden)]
        reason: String,
    },
}

#[cfg(test)]
#[inline(always)]
fn assert_close(expected: f64, value: f64, tolerance: f64) {
    assert!(
        (expected - value).abs() < tolerance,
        "Expected {}, got {}",
        expected,
        value
    );
}
