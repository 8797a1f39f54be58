//! Output encoding: image save dispatch, cubemap cross layout, the SH
//! coefficient listing and the DFG half-float text dump.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use envbake_core::sh::sh_index;
use envbake_core::{rgbm, Cubemap, Face, Image};
use glam::DVec3;
use half::f16;

use crate::config::OutputFormat;

/// Saves a linear image in the requested format. The KTX variant is not an
/// image codec; containers are assembled in the pipeline, so hitting it here
/// is a usage error.
pub fn save_image(path: &Path, format: OutputFormat, img: &Image) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let w = img.width() as u32;
    let h = img.height() as u32;
    match format {
        OutputFormat::Png => {
            let mut out = image::RgbImage::new(w, h);
            for (x, y, px) in out.enumerate_pixels_mut() {
                let c = img.get_pixel(x as usize, y as usize);
                *px = image::Rgb([
                    linear_to_srgb_u8(c[0]),
                    linear_to_srgb_u8(c[1]),
                    linear_to_srgb_u8(c[2]),
                ]);
            }
            out.save_with_format(path, image::ImageFormat::Png)
                .with_context(|| format!("writing {:?}", path))?;
        }
        OutputFormat::Hdr => {
            let file = BufWriter::new(File::create(path)?);
            let pixels: Vec<image::Rgb<f32>> = img
                .data()
                .chunks_exact(3)
                .map(|c| image::Rgb([c[0], c[1], c[2]]))
                .collect();
            image::codecs::hdr::HdrEncoder::new(file)
                .encode(&pixels, img.width(), img.height())
                .with_context(|| format!("writing {:?}", path))?;
        }
        OutputFormat::Exr => {
            let buf = image::Rgb32FImage::from_raw(w, h, img.data().to_vec())
                .expect("image buffer length matches dimensions");
            image::DynamicImage::ImageRgb32F(buf)
                .save(path)
                .with_context(|| format!("writing {:?}", path))?;
        }
        OutputFormat::Rgbm => {
            let mut out = image::RgbaImage::new(w, h);
            for (x, y, px) in out.enumerate_pixels_mut() {
                let c = img.get_pixel(x as usize, y as usize);
                *px = image::Rgba(rgbm::encode(c));
            }
            // RGBM rides in a PNG; keep the extension the caller chose
            out.save_with_format(path, image::ImageFormat::Png)
                .with_context(|| format!("writing {:?}", path))?;
        }
        OutputFormat::Dds => {
            write_dds_rgba32f(path, img).with_context(|| format!("writing {:?}", path))?;
        }
        OutputFormat::Ktx => bail!("KTX output is container-based, not a per-image format"),
    }
    Ok(())
}

fn linear_to_srgb_u8(v: f32) -> u8 {
    let v = v.clamp(0.0, 1.0);
    let s = if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    (s * 255.0 + 0.5) as u8
}

// DDS constants for an uncompressed A32B32G32R32F surface
const DDS_MAGIC: &[u8; 4] = b"DDS ";
const DDSD_FLAGS: u32 = 0x1 | 0x2 | 0x4 | 0x1000; // CAPS|HEIGHT|WIDTH|PIXELFORMAT
const DDPF_FOURCC: u32 = 0x4;
const D3DFMT_A32B32G32R32F: u32 = 116;
const DDSCAPS_TEXTURE: u32 = 0x1000;

/// Minimal DDS writer: 124-byte header + RGBA float32 payload, alpha 1.
fn write_dds_rgba32f(path: &Path, img: &Image) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let w = img.width() as u32;
    let h = img.height() as u32;

    let mut header = [0u32; 31];
    header[0] = 124; // dwSize
    header[1] = DDSD_FLAGS;
    header[2] = h;
    header[3] = w;
    // dwPitchOrLinearSize..dwReserved1 stay zero
    header[18] = 32; // ddspf.dwSize
    header[19] = DDPF_FOURCC;
    header[20] = D3DFMT_A32B32G32R32F;
    header[26] = DDSCAPS_TEXTURE;

    out.write_all(DDS_MAGIC)?;
    for v in header {
        out.write_all(&v.to_le_bytes())?;
    }
    let mut row = Vec::with_capacity(img.width() * 16);
    for y in 0..img.height() {
        row.clear();
        for x in 0..img.width() {
            let c = img.get_pixel(x, y);
            row.extend_from_slice(bytemuck::bytes_of(&[c[0], c[1], c[2], 1.0f32]));
        }
        out.write_all(&row)?;
    }
    Ok(())
}

/// Lays out all six faces as a horizontal cross (4x3 face grid, -Z on the
/// far right).
pub fn to_cross_image(cm: &Cubemap) -> Image {
    let dim = cm.dim();
    let mut img = Image::new(dim * 4, dim * 3);
    for face in Face::ALL {
        let (ox, oy) = match face {
            Face::Nx => (0, 1),
            Face::Px => (2, 1),
            Face::Py => (1, 0),
            Face::Ny => (1, 2),
            Face::Pz => (1, 1),
            Face::Nz => (3, 1),
        };
        for y in 0..dim {
            for x in 0..dim {
                let c = cm.texel(face, x as isize, y as isize);
                img.put_pixel(
                    ox * dim + x,
                    oy * dim + y,
                    [c.x as f32, c.y as f32, c.z as f32],
                );
            }
        }
    }
    img
}

/// Converts one RGBA8 RGBM buffer from a cubemap face, for KTX payloads.
pub fn face_to_rgbm_bytes(cm: &Cubemap, face: Face) -> Vec<u8> {
    let dim = cm.dim();
    let mut out = Vec::with_capacity(dim * dim * 4);
    for y in 0..dim {
        for x in 0..dim {
            let c = cm.texel(face, x as isize, y as isize);
            out.extend_from_slice(&rgbm::encode([c.x as f32, c.y as f32, c.z as f32]));
        }
    }
    out
}

/// Writes the SH coefficient listing, one line per coefficient:
/// `(r, g, b); // L<l><m>[, irradiance][, pre-scaled base]`.
pub fn write_sh_text<W: Write>(
    out: &mut W,
    sh: &[DVec3],
    num_bands: usize,
    irradiance: bool,
    pre_scaled: bool,
) -> Result<()> {
    for l in 0..num_bands {
        for m in -(l as i64)..=l as i64 {
            let c = sh[sh_index(m, l)];
            let mut name = format!("L{}{}", l, m);
            if irradiance {
                name.push_str(", irradiance");
            }
            if pre_scaled {
                name.push_str(", pre-scaled base");
            }
            writeln!(
                out,
                "({:18.15}, {:18.15}, {:18.15}); // {}",
                c.x, c.y, c.z, name
            )?;
        }
    }
    Ok(())
}

/// Serializes SH coefficients as KTX `sh` metadata: `r g b\n` per
/// coefficient in index order.
pub fn sh_metadata_string(sh: &[DVec3], num_bands: usize) -> String {
    let mut s = String::new();
    for l in 0..num_bands {
        for m in -(l as i64)..=l as i64 {
            let c = sh[sh_index(m, l)];
            s.push_str(&format!("{} {} {}\n", c.x, c.y, c.z));
        }
    }
    s
}

/// Writes the DFG LUT as half-float hex text: RG pairs, bottom row first
/// (GL texture order), four texels per line. `.inc` files omit the array
/// declaration.
pub fn write_dfg_text(path: &Path, img: &Image) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let is_include = path.extension().and_then(|e| e.to_str()) == Some("inc");
    let mut out = BufWriter::new(File::create(path)?);

    writeln!(out, "// generated with: envbake --ibl-dfg={}", path.display())?;
    writeln!(out, "// DFG LUT stored as an RG16F texture, in GL order")?;
    if !is_include {
        write!(out, "const uint16_t DFG_LUT[] = {{")?;
    }
    let size = img.height();
    for y in 0..size {
        for x in 0..img.width() {
            if x % 4 == 0 {
                write!(out, "\n    ")?;
            }
            let c = img.get_pixel(x, size - 1 - y);
            let r = f16::from_f32(c[0]).to_bits();
            let g = f16::from_f32(c[1]).to_bits();
            write!(out, "0x{:04x}, 0x{:04x}, ", r, g)?;
        }
    }
    if !is_include {
        writeln!(out, "\n}};")?;
    }
    writeln!(out)?;
    Ok(())
}

/// True when the DFG output path asks for the text form.
pub fn is_text_dfg(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("h" | "hpp" | "c" | "cpp" | "inc" | "txt")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_to_srgb_endpoints() {
        assert_eq!(linear_to_srgb_u8(0.0), 0);
        assert_eq!(linear_to_srgb_u8(1.0), 255);
        assert_eq!(linear_to_srgb_u8(2.0), 255);
        // mid grey lands well above 128 after encoding
        assert!(linear_to_srgb_u8(0.5) > 180);
    }

    #[test]
    fn test_is_text_dfg() {
        assert!(is_text_dfg(Path::new("dfg.h")));
        assert!(is_text_dfg(Path::new("lut.inc")));
        assert!(is_text_dfg(Path::new("lut.txt")));
        assert!(!is_text_dfg(Path::new("dfg.png")));
        assert!(!is_text_dfg(Path::new("dfg")));
    }

    #[test]
    fn test_sh_text_layout() {
        let sh = vec![DVec3::new(1.0, 2.0, 3.0); 4];
        let mut buf = Vec::new();
        write_sh_text(&mut buf, &sh, 2, true, false).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("// L00, irradiance"));
        assert!(lines[1].ends_with("// L1-1, irradiance"));
        assert!(lines[3].ends_with("// L11, irradiance"));
        assert!(lines[0].starts_with('('));
        assert!(lines[0].contains("1.000000000000000"));
    }

    #[test]
    fn test_sh_metadata_string() {
        let sh = vec![DVec3::new(0.5, 1.0, 1.5); 9];
        let s = sh_metadata_string(&sh, 3);
        assert_eq!(s.lines().count(), 9);
        assert!(s.starts_with("0.5 1 1.5\n"));
    }

    #[test]
    fn test_cross_image_dimensions() {
        let mut cm = Cubemap::new(4).unwrap();
        cm.generate(|_, _, _| DVec3::splat(0.5));
        cm.make_seamless();
        let img = to_cross_image(&cm);
        assert_eq!(img.width(), 16);
        assert_eq!(img.height(), 12);
        // face area carries data, dead corners stay zero
        assert!(img.get_pixel(6, 6)[0] > 0.0);
        assert_eq!(img.get_pixel(0, 0), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_rgbm_face_bytes_size() {
        let mut cm = Cubemap::new(4).unwrap();
        cm.generate(|_, _, _| DVec3::splat(1.0));
        cm.make_seamless();
        let bytes = face_to_rgbm_bytes(&cm, Face::Px);
        assert_eq!(bytes.len(), 4 * 4 * 4);
    }
}
