//! Decode-and-scale stage.
//!
//! Decoding runs in two steps:
//!
//! 1. A coarse decode at an integer subsampling factor chosen by
//!    [`calculate_in_sample_size`], which keeps peak memory close to the
//!    requested size.
//! 2. A precise float scale (and, for `Fill`, a centre crop) to the exact
//!    requested box.
//!
//! Scratch buffers are dropped as soon as the next buffer in the chain
//! exists.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::trace;

use crate::cache::VariantKey;
use crate::error::DecodeError;

use super::bitmap::Bitmap;
use super::decoder::DecodeBackend;
use super::sample::{calculate_in_sample_size, SizeMode};

/// Decodes raw bytes into a bitmap sized for a [`VariantKey`].
#[derive(Clone)]
pub struct ScaledDecoder {
    backend: Arc<dyn DecodeBackend>,
}

impl ScaledDecoder {
    pub fn new(backend: Arc<dyn DecodeBackend>) -> Self {
        Self { backend }
    }

    /// Probe, coarse-decode and scale `data` to the variant's box.
    ///
    /// This is blocking; run it on a blocking worker.
    pub fn decode(&self, data: &[u8], variant: &VariantKey) -> Result<Bitmap, DecodeError> {
        let (width, height) = self.backend.probe_size(data)?;

        let sample = calculate_in_sample_size(
            width,
            height,
            variant.width,
            variant.height,
            variant.size_mode,
            variant.downsample,
        );

        let coarse = self.backend.decode(data, sample)?;
        if coarse.width() == 0 || coarse.height() == 0 {
            return Err(DecodeError::EmptyImage);
        }

        let scaled = fit_to_box(
            coarse,
            (width, height),
            variant.width,
            variant.height,
            variant.size_mode,
            variant.scale_up,
        );

        trace!(
            natural_width = width,
            natural_height = height,
            sample,
            mode = %variant.size_mode,
            width = scaled.width(),
            height = scaled.height(),
            "Decoded bitmap"
        );

        Ok(Bitmap::new(scaled))
    }
}

/// Scale (and for `Fill`, crop) a decoded image to the requested box.
///
/// `natural` is the source's full size before any subsampling. Target
/// dimensions are computed from it, so a coarse decode is scaled back up as
/// far as the source allows. `scale_up` only permits going past the natural
/// size.
pub fn fit_to_box(
    image: RgbaImage,
    natural: (u32, u32),
    req_width: u32,
    req_height: u32,
    mode: SizeMode,
    scale_up: bool,
) -> RgbaImage {
    let (natural_width, natural_height) = natural;
    if natural_width == 0 || natural_height == 0 {
        return image;
    }

    match mode.effective(req_width, req_height) {
        SizeMode::None => image,

        mode @ (SizeMode::Max | SizeMode::Fit) => {
            let mut scale = contain_scale(natural_width, natural_height, req_width, req_height);
            if scale > 1.0 && !(mode == SizeMode::Fit && scale_up) {
                scale = 1.0;
            }
            let new_width = ((natural_width as f64 * scale).round() as u32).max(1);
            let new_height = ((natural_height as f64 * scale).round() as u32).max(1);
            resize_to(image, new_width, new_height)
        }

        SizeMode::Fill => {
            let mut scale = f64::max(
                req_width as f64 / natural_width as f64,
                req_height as f64 / natural_height as f64,
            );
            if !scale_up {
                scale = scale.min(1.0);
            }

            // Cover: never round below the requested box.
            let new_width = ((natural_width as f64 * scale - 1e-6).ceil() as u32).max(1);
            let new_height = ((natural_height as f64 * scale - 1e-6).ceil() as u32).max(1);
            let scaled = resize_to(image, new_width, new_height);

            let (scaled_width, scaled_height) = scaled.dimensions();
            let crop_width = req_width.min(scaled_width);
            let crop_height = req_height.min(scaled_height);
            if crop_width == scaled_width && crop_height == scaled_height {
                return scaled;
            }

            let x = (scaled_width - crop_width) / 2;
            let y = (scaled_height - crop_height) / 2;
            let cropped = imageops::crop_imm(&scaled, x, y, crop_width, crop_height).to_image();
            drop(scaled);
            cropped
        }
    }
}

/// Largest scale at which the image fits inside the constrained axes.
fn contain_scale(width: u32, height: u32, req_width: u32, req_height: u32) -> f64 {
    let by_width = (req_width > 0).then(|| req_width as f64 / width as f64);
    let by_height = (req_height > 0).then(|| req_height as f64 / height as f64);
    match (by_width, by_height) {
        (Some(w), Some(h)) => w.min(h),
        (Some(w), None) => w,
        (None, Some(h)) => h,
        (None, None) => 1.0,
    }
}

fn resize_to(image: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image;
    }
    let resized = imageops::resize(&image, width, height, FilterType::Triangle);
    drop(image);
    resized
}
