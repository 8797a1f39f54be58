//! Compression descriptor grammar and encoder dispatch.
//!
//! The command line accepts one of:
//!
//! ```text
//! astc_[fast|thorough]_[ldr|hdr]_WxH   (W, H in the ASTC block set)
//! etc_FORMAT_METRIC_EFFORT             (effort 0..=100; FORMAT is
//!                                       rgb8_alpha, srgb8_alpha, rgba8
//!                                       or srgb8_alpha8)
//! s3tc_rgba_dxt5
//! ```
//!
//! All three families parse; only `s3tc_rgba_dxt5` currently has an encoder
//! (ISPC BC3 via intel_tex_2). Selecting ASTC or ETC is reported as a
//! configuration error at parse time so the pipeline never discovers it
//! mid-bake.

use std::fmt;
use std::str::FromStr;

use intel_tex_2::{bc3, RgbaSurface};

use crate::container::GL_COMPRESSED_RGBA_S3TC_DXT5;
use crate::Error;

/// ASTC block footprints with their GL internal formats
/// (COMPRESSED_RGBA_ASTC_4x4_KHR and friends).
const ASTC_BLOCKS: &[(u32, u32, u32)] = &[
    (4, 4, 0x93B0),
    (5, 4, 0x93B1),
    (5, 5, 0x93B2),
    (6, 5, 0x93B3),
    (6, 6, 0x93B4),
    (8, 5, 0x93B5),
    (8, 6, 0x93B6),
    (8, 8, 0x93B7),
    (10, 5, 0x93B8),
    (10, 6, 0x93B9),
    (10, 8, 0x93BA),
    (10, 10, 0x93BB),
    (12, 10, 0x93BC),
    (12, 12, 0x93BD),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstcSpeed {
    Fast,
    Thorough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtcFormat {
    /// COMPRESSED_RGB8_PUNCHTHROUGH_ALPHA1_ETC2
    Rgb8Alpha,
    /// COMPRESSED_SRGB8_PUNCHTHROUGH_ALPHA1_ETC2
    Srgb8Alpha,
    /// COMPRESSED_RGBA8_ETC2_EAC
    Rgba8,
    /// COMPRESSED_SRGB8_ALPHA8_ETC2_EAC
    Srgb8Alpha8,
}

impl EtcFormat {
    pub fn gl_internal_format(self) -> u32 {
        match self {
            EtcFormat::Rgb8Alpha => 0x9276,
            EtcFormat::Srgb8Alpha => 0x9277,
            EtcFormat::Rgba8 => 0x9278,
            EtcFormat::Srgb8Alpha8 => 0x9279,
        }
    }

    fn token(self) -> &'static str {
        match self {
            EtcFormat::Rgb8Alpha => "rgb8_alpha",
            EtcFormat::Srgb8Alpha => "srgb8_alpha",
            EtcFormat::Rgba8 => "rgba8",
            EtcFormat::Srgb8Alpha8 => "srgb8_alpha8",
        }
    }
}

/// Error metric steering an ETC encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtcMetric {
    Rgba,
    Rgbx,
    Rec709,
    Numeric,
    NormalXyz,
}

/// A parsed compression request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionFormat {
    Astc {
        speed: AstcSpeed,
        hdr: bool,
        block_w: u32,
        block_h: u32,
        gl_internal_format: u32,
    },
    Etc {
        format: EtcFormat,
        metric: EtcMetric,
        effort: u8,
    },
    /// BC3, the only format with a live encoder.
    S3tcDxt5,
}

/// Validated compression configuration, produced by [`FromStr`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionConfig {
    pub format: CompressionFormat,
}

impl CompressionConfig {
    /// GL internal format to stamp into the KTX header.
    pub fn gl_internal_format(&self) -> u32 {
        match &self.format {
            CompressionFormat::Astc {
                gl_internal_format, ..
            } => *gl_internal_format,
            CompressionFormat::Etc { format, .. } => format.gl_internal_format(),
            CompressionFormat::S3tcDxt5 => GL_COMPRESSED_RGBA_S3TC_DXT5,
        }
    }

    /// True when [`Self::compress`] can actually encode this format.
    pub fn encodable(&self) -> bool {
        matches!(self.format, CompressionFormat::S3tcDxt5)
    }

    /// Block-compresses a tightly packed RGBA8 image. Dimensions below the
    /// 4x4 block size are edge-padded first.
    pub fn compress(&self, rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>, Error> {
        if !self.encodable() {
            return Err(Error::UnsupportedCompression(self.format.clone()));
        }
        debug_assert_eq!(rgba.len(), (width * height * 4) as usize);

        let w = width as usize;
        let h = height as usize;
        let padded_w = w.div_ceil(4) * 4;
        let padded_h = h.div_ceil(4) * 4;

        let padded: Vec<u8>;
        let data = if padded_w == w && padded_h == h {
            rgba
        } else {
            let mut buf = vec![0u8; padded_w * padded_h * 4];
            for y in 0..padded_h {
                for x in 0..padded_w {
                    let sx = x.min(w - 1);
                    let sy = y.min(h - 1);
                    let src = (sy * w + sx) * 4;
                    let dst = (y * padded_w + x) * 4;
                    buf[dst..dst + 4].copy_from_slice(&rgba[src..src + 4]);
                }
            }
            padded = buf;
            &padded
        };

        let surface = RgbaSurface {
            width: padded_w as u32,
            height: padded_h as u32,
            stride: (padded_w * 4) as u32,
            data,
        };
        Ok(bc3::compress_blocks(&surface))
    }
}

impl FromStr for CompressionConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let bad = || Error::BadCompressionSpec(s.to_owned());
        let parts: Vec<&str> = s.split('_').collect();
        let format = match parts.as_slice() {
            ["astc", speed, range, block] => {
                let speed = match *speed {
                    "fast" => AstcSpeed::Fast,
                    "thorough" => AstcSpeed::Thorough,
                    _ => return Err(bad()),
                };
                let hdr = match *range {
                    "ldr" => false,
                    "hdr" => true,
                    _ => return Err(bad()),
                };
                let (bw, bh) = block.split_once('x').ok_or_else(bad)?;
                let bw: u32 = bw.parse().map_err(|_| bad())?;
                let bh: u32 = bh.parse().map_err(|_| bad())?;
                let (_, _, gl) = *ASTC_BLOCKS
                    .iter()
                    .find(|(w, h, _)| *w == bw && *h == bh)
                    .ok_or_else(bad)?;
                CompressionFormat::Astc {
                    speed,
                    hdr,
                    block_w: bw,
                    block_h: bh,
                    gl_internal_format: gl,
                }
            }
            // ETC format names carry underscores (rgb8_alpha, srgb8_alpha8),
            // so metric and effort are taken from the right
            ["etc", rest @ ..] if rest.len() >= 3 => {
                let (format, tail) = rest.split_at(rest.len() - 2);
                let format = match format.join("_").as_str() {
                    "rgb8_alpha" => EtcFormat::Rgb8Alpha,
                    "srgb8_alpha" => EtcFormat::Srgb8Alpha,
                    "rgba8" => EtcFormat::Rgba8,
                    "srgb8_alpha8" => EtcFormat::Srgb8Alpha8,
                    _ => return Err(bad()),
                };
                let metric = match tail[0] {
                    "rgba" => EtcMetric::Rgba,
                    "rgbx" => EtcMetric::Rgbx,
                    "rec709" => EtcMetric::Rec709,
                    "numeric" => EtcMetric::Numeric,
                    "normalxyz" => EtcMetric::NormalXyz,
                    _ => return Err(bad()),
                };
                let effort: u8 = tail[1].parse().map_err(|_| bad())?;
                if effort > 100 {
                    return Err(bad());
                }
                CompressionFormat::Etc {
                    format,
                    metric,
                    effort,
                }
            }
            ["s3tc", "rgba", "dxt5"] => CompressionFormat::S3tcDxt5,
            _ => return Err(bad()),
        };
        Ok(Self { format })
    }
}

impl fmt::Display for CompressionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.format {
            CompressionFormat::Astc {
                speed,
                hdr,
                block_w,
                block_h,
                ..
            } => {
                let speed = match speed {
                    AstcSpeed::Fast => "fast",
                    AstcSpeed::Thorough => "thorough",
                };
                let range = if *hdr { "hdr" } else { "ldr" };
                write!(f, "astc_{}_{}_{}x{}", speed, range, block_w, block_h)
            }
            CompressionFormat::Etc {
                format,
                metric,
                effort,
            } => {
                let format = format.token();
                let metric = match metric {
                    EtcMetric::Rgba => "rgba",
                    EtcMetric::Rgbx => "rgbx",
                    EtcMetric::Rec709 => "rec709",
                    EtcMetric::Numeric => "numeric",
                    EtcMetric::NormalXyz => "normalxyz",
                };
                write!(f, "etc_{}_{}_{}", format, metric, effort)
            }
            CompressionFormat::S3tcDxt5 => write!(f, "s3tc_rgba_dxt5"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3tc() {
        let c: CompressionConfig = "s3tc_rgba_dxt5".parse().unwrap();
        assert_eq!(c.format, CompressionFormat::S3tcDxt5);
        assert!(c.encodable());
        assert_eq!(c.gl_internal_format(), GL_COMPRESSED_RGBA_S3TC_DXT5);
    }

    #[test]
    fn test_parse_astc() {
        let c: CompressionConfig = "astc_fast_ldr_4x4".parse().unwrap();
        assert_eq!(c.gl_internal_format(), 0x93B0);
        assert!(!c.encodable());

        let c: CompressionConfig = "astc_thorough_hdr_12x12".parse().unwrap();
        assert_eq!(c.gl_internal_format(), 0x93BD);

        assert!("astc_fast_ldr_7x7".parse::<CompressionConfig>().is_err());
        assert!("astc_slow_ldr_4x4".parse::<CompressionConfig>().is_err());
    }

    #[test]
    fn test_parse_etc() {
        let c: CompressionConfig = "etc_rgba8_rec709_50".parse().unwrap();
        assert_eq!(c.gl_internal_format(), 0x9278);
        assert!(!c.encodable());

        // underscored format names
        let c: CompressionConfig = "etc_rgb8_alpha_rgba_80".parse().unwrap();
        assert_eq!(c.gl_internal_format(), 0x9276);
        let c: CompressionConfig = "etc_srgb8_alpha8_rec709_100".parse().unwrap();
        assert_eq!(c.gl_internal_format(), 0x9279);

        assert!("etc_rgba8_rec709_101".parse::<CompressionConfig>().is_err());
        assert!("etc_rgb5_rgba_10".parse::<CompressionConfig>().is_err());
        assert!("etc_rgba8_rec709".parse::<CompressionConfig>().is_err());
    }

    #[test]
    fn test_parse_rejects_noise() {
        assert!("".parse::<CompressionConfig>().is_err());
        assert!("dxt5".parse::<CompressionConfig>().is_err());
        assert!("s3tc_rgba_dxt1".parse::<CompressionConfig>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for s in [
            "astc_fast_ldr_8x8",
            "etc_srgb8_alpha_numeric_90",
            "etc_srgb8_alpha8_rgbx_75",
            "s3tc_rgba_dxt5",
        ] {
            let c: CompressionConfig = s.parse().unwrap();
            assert_eq!(c.to_string(), s);
        }
    }

    #[test]
    fn test_dxt5_output_size() {
        let c: CompressionConfig = "s3tc_rgba_dxt5".parse().unwrap();
        // 8x8 -> 4 blocks, 16 bytes each
        let out = c.compress(&[128u8; 8 * 8 * 4], 8, 8).unwrap();
        assert_eq!(out.len(), 4 * 16);
        // 2x2 pads up to a single block
        let out = c.compress(&[128u8; 2 * 2 * 4], 2, 2).unwrap();
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn test_unencodable_formats_error() {
        let c: CompressionConfig = "astc_fast_ldr_4x4".parse().unwrap();
        assert!(c.compress(&[0u8; 16 * 4], 4, 4).is_err());
    }
}
