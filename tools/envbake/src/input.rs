//! Input loading: image decode, projection detection, synthetic patterns.

use std::path::Path;

use anyhow::{bail, Context, Result};
use envbake_core::cubemap_utils::{
    cross_to_cubemap, equirectangular_to_cubemap, generate_uv_grid,
};
use envbake_core::{ibl, is_pot, Cubemap, Image};

/// Projection of a loaded environment image, detected from its aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// 2:1 latitude/longitude
    Equirectangular,
    /// 4:3 horizontal or 3:4 vertical cross
    Cross,
}

/// Decodes an image file into a linear RGB buffer. 8-bit sources are
/// converted from sRGB; HDR and EXR are taken as linear. Inputs must carry
/// exactly 3 color channels.
pub fn load_image(path: &Path) -> Result<Image> {
    let decoded = image::open(path).with_context(|| format!("unable to open image {:?}", path))?;
    if decoded.color().channel_count() != 3 {
        bail!(
            "input image must be RGB (3 channels), {:?} has {}",
            path,
            decoded.color().channel_count()
        );
    }
    let srgb = matches!(
        decoded,
        image::DynamicImage::ImageRgb8(_) | image::DynamicImage::ImageRgb16(_)
    );
    let rgb = decoded.to_rgb32f();
    let (w, h) = rgb.dimensions();
    let mut data = rgb.into_raw();
    if srgb {
        for v in &mut data {
            *v = srgb_to_linear(*v);
        }
    }
    let mut img = Image::from_data(w as usize, h as usize, data);
    img.clamp();
    Ok(img)
}

fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// Classifies an input image by aspect ratio, or errors listing the
/// supported ratios.
pub fn detect_projection(width: usize, height: usize) -> Result<Projection> {
    if (is_pot(width) && width * 3 == height * 4) || (is_pot(height) && height * 3 == width * 4) {
        Ok(Projection::Cross)
    } else if width == 2 * height {
        Ok(Projection::Equirectangular)
    } else {
        bail!(
            "aspect ratio not supported: {}x{}\nsupported aspect ratios:\n  \
             2:1, lat/long or equirectangular\n  \
             3:4, vertical cross (height must be a power of two)\n  \
             4:3, horizontal cross (width must be a power of two)",
            width,
            height
        )
    }
}

/// Projects a decoded environment image onto a cubemap of the given size.
pub fn image_to_cubemap(img: &Image, projection: Projection, dim: usize) -> Result<Cubemap> {
    let mut cm = Cubemap::new(dim)?;
    match projection {
        Projection::Cross => cross_to_cubemap(&mut cm, img),
        Projection::Equirectangular => equirectangular_to_cubemap(&mut cm, img),
    }
    Ok(cm)
}

/// Generates a synthetic cubemap keyed on a missing input's filename stem:
/// `uvN` / `uN` / `vN` UV grids, `brdfN` GGX lobes, plain grid otherwise.
pub fn synthetic_cubemap(stem: &str, dim: usize) -> Result<Cubemap> {
    let mut cm = Cubemap::new(dim)?;
    if let Some(n) = parse_suffix(stem, "uv") {
        generate_uv_grid(&mut cm, n, n);
    } else if let Some(n) = parse_suffix(stem, "u") {
        generate_uv_grid(&mut cm, n, 1);
    } else if let Some(n) = parse_suffix(stem, "v") {
        generate_uv_grid(&mut cm, 1, n);
    } else if let Some(n) = parse_suffix(stem, "brdf") {
        let linear_roughness = (n as f64 / (dim as f64).log2()).powi(2);
        ibl::brdf(&mut cm, linear_roughness);
    } else {
        generate_uv_grid(&mut cm, 1, 1);
    }
    Ok(cm)
}

fn parse_suffix(stem: &str, prefix: &str) -> Option<usize> {
    stem.strip_prefix(prefix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_projection() {
        assert_eq!(detect_projection(512, 256).unwrap(), Projection::Equirectangular);
        assert_eq!(detect_projection(1024, 768).unwrap(), Projection::Cross);
        assert_eq!(detect_projection(768, 1024).unwrap(), Projection::Cross);
        assert!(detect_projection(500, 300).is_err());
        // 4:3 but width not POT
        assert!(detect_projection(768, 576).is_err());
    }

    #[test]
    fn test_synthetic_stems() {
        assert!(synthetic_cubemap("uv8", 16).is_ok());
        assert!(synthetic_cubemap("u4", 16).is_ok());
        assert!(synthetic_cubemap("v2", 16).is_ok());
        assert!(synthetic_cubemap("brdf2", 16).is_ok());
        assert!(synthetic_cubemap("whatever", 16).is_ok());
    }

    #[test]
    fn test_parse_suffix() {
        assert_eq!(parse_suffix("uv16", "uv"), Some(16));
        assert_eq!(parse_suffix("uv", "uv"), None);
        assert_eq!(parse_suffix("brdfx", "brdf"), None);
    }

    #[test]
    fn test_srgb_to_linear_endpoints() {
        assert_eq!(srgb_to_linear(0.0), 0.0);
        assert!((srgb_to_linear(1.0) - 1.0).abs() < 1e-6);
        assert!(srgb_to_linear(0.5) < 0.5);
    }
}
