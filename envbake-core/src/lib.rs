//! envbake-core: CPU image-based-lighting precomputation
//!
//! **This is a pure numeric core** - it converts an HDR environment cubemap
//! into the precomputed assets a PBR renderer consumes at runtime. File
//! decoding, encoding and container packaging are handled by the caller
//! (envbake-ktx and the envbake tool).
//!
//! # Components
//!
//! - [`Image`] - owned linear-RGB float pixel buffer
//! - [`Cubemap`] - six square faces over one shared buffer, with seamless
//!   borders so bilinear taps can cross face edges
//! - [`cubemap_utils`] - projections between cubemap, cross, equirectangular
//!   and octahedral layouts, mirroring, box-filter downsampling
//! - [`sh`] - spherical-harmonics projection and reconstruction, including
//!   the pre-scaled 3-band irradiance variant for direct shader consumption
//! - [`ibl`] - Monte-Carlo importance-sampled filters: GGX roughness
//!   prefiltering, diffuse irradiance, and the split-sum DFG LUT
//! - [`rgbm`] - 8-bit RGBM HDR encoding used for container payloads
//!
//! # Numeric conventions
//!
//! Pixel storage is `f32`; all spherical integration and SH coefficients are
//! `f64` (low SH bands dominate the energy, and f32 accumulation over large
//! faces visibly biases them). The importance samplers use a Hammersley
//! sequence, so every filter is deterministic for a given sample count.

pub mod cubemap;
pub mod cubemap_utils;
pub mod ibl;
pub mod image;
pub mod rgbm;
pub mod sh;

pub use cubemap::{Cubemap, Face};
pub use image::Image;

use thiserror::Error;

/// Errors reported by the numeric core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cubemap dimension must be a power of two, got {0}")]
    InvalidDimension(usize),
}

/// True for any power of two (1 included).
pub fn is_pot(x: usize) -> bool {
    x != 0 && (x & (x - 1)) == 0
}
