//! Adaptive binarization of the input frame.
//!
//! The markers are bright in the raw infrared frame, so the frame is
//! inverted first; a pixel is foreground when it exceeds its
//! Gaussian-weighted local mean minus the configured offset. Uniform
//! regions therefore binarize to foreground and the markers become black
//! holes, whose borders the contour stage retrieves.

use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;

use crate::params::TrackerParams;

/// Inverts `frame` and applies adaptive Gaussian thresholding.
pub(crate) fn binarize(frame: &GrayImage, params: &TrackerParams) -> GrayImage {
    let inverted = GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        Luma([255 - frame.get_pixel(x, y).0[0]])
    });

    let half = (f64::from(params.thresh_half_kernel_size) * params.img_size_factor).round();
    let window = 2.0 * half.max(1.0) + 1.0;
    let sigma = 0.3 * ((window - 1.0) * 0.5 - 1.0) + 0.8;
    let local_mean = gaussian_blur_f32(&inverted, sigma as f32);

    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let value = f64::from(inverted.get_pixel(x, y).0[0]);
        let mean = f64::from(local_mean.get_pixel(x, y).0[0]);
        if value > mean - params.thresh_c {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}
