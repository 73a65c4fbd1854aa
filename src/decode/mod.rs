//! Decode/scale stage.
//!
//! Turns raw bytes into a [`Bitmap`] sized for a variant:
//!
//! ```text
//!   raw bytes ──► probe size ──► calculate_in_sample_size ──► coarse decode
//!                                                                 │
//!                             Bitmap ◄── centre crop ◄── float scale
//! ```
//!
//! - [`DecodeBackend`]: probe + subsampled decode (implemented by [`RasterDecoder`])
//! - [`ScaledDecoder`]: drives a backend and applies the [`SizeMode`] rules
//! - [`Bitmap`]: shared, immutable RGBA pixels

mod bitmap;
mod decoder;
mod sample;
mod scaler;

pub use bitmap::{Bitmap, BYTES_PER_PIXEL};
pub use decoder::{DecodeBackend, RasterDecoder};
pub use sample::{calculate_in_sample_size, SizeMode};
pub use scaler::{fit_to_box, ScaledDecoder};
