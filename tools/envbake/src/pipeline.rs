//! Bake orchestration: sequences the stages selected by a [`Config`].
//!
//! Stage order matters: SH runs before the prefilter so the coefficients
//! can ride along as `sh` metadata inside the prefiltered KTX container.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use envbake_core::cubemap_utils::{
    cubemap_to_equirectangular, cubemap_to_octahedron, downsample_boxfilter, mirror_cubemap,
};
use envbake_core::{ibl, sh, Cubemap, Face, Image};
use glam::DVec3;

use crate::config::{Config, OutputFormat, OutputType, ShFile};
use crate::encode::{
    face_to_rgbm_bytes, is_text_dfg, save_image, sh_metadata_string, to_cross_image,
    write_dfg_text, write_sh_text,
};
use crate::input;
use envbake_ktx::{KtxContainer, KtxInfo};

/// Runs the whole bake described by `config`.
pub fn run(config: &Config) -> Result<()> {
    if let Some(dfg_file) = &config.dfg_file {
        ibl_lut_dfg(config, dfg_file)?;
    }
    let Some(input_path) = &config.input else {
        return Ok(());
    };

    let levels = load_levels(config, input_path)?;

    let coefficients = match config.sh_bands {
        Some(bands) => Some(spherical_harmonics(config, &levels[0], bands)?),
        None => None,
    };

    if let Some(dir) = &config.is_mipmap_dir {
        tracing::info!("IBL mipmaps for prefiltered importance sampling...");
        ibl_mipmap_prefilter(config, &levels, dir)?;
    }

    if let Some(dir) = &config.prefilter_dir {
        tracing::info!("IBL prefiltering...");
        ibl_roughness_prefilter(config, &levels, coefficients.as_deref(), dir)?;
    }

    if let Some(dir) = &config.irradiance_dir {
        tracing::info!("IBL diffuse irradiance...");
        ibl_diffuse_irradiance(config, &levels, dir)?;
    }

    if let Some(dir) = &config.extract_dir {
        extract_cubemap_faces(config, &levels, dir)?;
    }

    Ok(())
}

/// Loads (or synthesizes) the base cubemap, applies mirroring, and builds
/// the seamless mip chain down to 1x1.
fn load_levels(config: &Config, input_path: &Path) -> Result<Vec<Cubemap>> {
    let dim = config.cubemap_size();
    let mut base = if input_path.exists() {
        tracing::info!("Decoding image {:?}...", input_path);
        let img = input::load_image(input_path)?;
        let projection = input::detect_projection(img.width(), img.height())?;
        tracing::info!("Projecting {:?} input onto a {}x{} cubemap...", projection, dim, dim);
        input::image_to_cubemap(&img, projection, dim)?
    } else {
        tracing::info!("{:?} does not exist; generating a synthetic environment...", input_path);
        input::synthetic_cubemap(config.input_stem(), dim)?
    };

    if config.mirror {
        tracing::info!("Mirroring...");
        let mut mirrored = Cubemap::new(base.dim())?;
        mirror_cubemap(&mut mirrored, &base);
        base = mirrored;
    } else {
        tracing::info!("Skipped mirroring.");
    }
    base.make_seamless();

    let mut levels = vec![base];
    let mut dim = levels[0].dim();
    while dim > 1 {
        dim /= 2;
        let mut dst = Cubemap::new(dim)?;
        downsample_boxfilter(&mut dst, levels.last().expect("chain is never empty"));
        levels.push(dst);
    }
    Ok(levels)
}

/// SH stage: projects the base cubemap, prints/writes the listing, renders
/// the reconstruction if a cross image was requested, and returns the
/// coefficients for later KTX embedding.
fn spherical_harmonics(config: &Config, cm: &Cubemap, bands: usize) -> Result<Vec<DVec3>> {
    tracing::info!("Spherical harmonics ({} bands)...", bands);
    let coefficients = if config.sh_shader {
        sh::compute_irradiance_sh3_bands(cm)
    } else {
        sh::compute_sh(cm, bands, config.sh_irradiance)
    };

    if !config.quiet {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        write_sh_text(
            &mut out,
            &coefficients,
            bands,
            config.sh_irradiance,
            config.sh_shader,
        )?;
        out.flush()?;
    }

    if let Some((path, kind)) = &config.sh_file {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        match kind {
            ShFile::Text => {
                let mut file = fs::File::create(path)
                    .with_context(|| format!("creating SH listing {:?}", path))?;
                write_sh_text(
                    &mut file,
                    &coefficients,
                    bands,
                    config.sh_irradiance,
                    config.sh_shader,
                )?;
            }
            ShFile::Cross => {
                let dim = config.size.unwrap_or(cm.dim());
                let mut rendered = Cubemap::new(dim)?;
                if config.sh_shader {
                    sh::render_pre_scaled_sh3_bands(&mut rendered, &coefficients);
                } else {
                    sh::render_sh(&mut rendered, &coefficients, bands);
                }
                let format = format_for_path(path, config.image_format());
                save_image(path, format, &to_cross_image(&rendered))?;
            }
        }
    }

    if config.debug {
        let out_dir = config
            .sh_file
            .as_ref()
            .and_then(|(p, _)| p.parent())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let dim = config.size.unwrap_or(cm.dim());
        let stem = config.input_stem();

        // the requested flavor and its counterpart, for visual comparison
        let mut rendered = Cubemap::new(dim)?;
        if config.sh_shader {
            sh::render_pre_scaled_sh3_bands(&mut rendered, &coefficients);
        } else {
            sh::render_sh(&mut rendered, &coefficients, bands);
        }
        let tag = if config.sh_irradiance { "i" } else { "r" };
        save_image(
            &out_dir.join(format!("{}_sh_{}.hdr", stem, tag)),
            OutputFormat::Hdr,
            &to_cross_image(&rendered),
        )?;

        let other = sh::compute_sh(cm, bands, !config.sh_irradiance);
        sh::render_sh(&mut rendered, &other, bands);
        let tag = if config.sh_irradiance { "r" } else { "i" };
        save_image(
            &out_dir.join(format!("{}_sh_{}.hdr", stem, tag)),
            OutputFormat::Hdr,
            &to_cross_image(&rendered),
        )?;
    }

    Ok(coefficients)
}

/// Exports the raw mip chain, for engines that importance-sample at runtime.
fn ibl_mipmap_prefilter(config: &Config, levels: &[Cubemap], dir: &Path) -> Result<()> {
    let out_dir = dir.join(config.input_stem());
    fs::create_dir_all(&out_dir)?;
    let stem = config.input_stem();

    for (level, cm) in levels.iter().enumerate() {
        if config.debug {
            save_image(
                &out_dir.join(format!("{}_is_m{}.hdr", stem, level)),
                OutputFormat::Hdr,
                &to_cross_image(cm),
            )?;
        }
        save_cubemap(config, &out_dir, &format!("is_m{}", level), cm)?;
    }
    Ok(())
}

/// GGX roughness prefilter: one output level per roughness step, written as
/// face images or gathered into a `*_ibl.ktx` container.
fn ibl_roughness_prefilter(
    config: &Config,
    levels: &[Cubemap],
    coefficients: Option<&[DVec3]>,
    dir: &Path,
) -> Result<()> {
    let out_dir = dir.join(config.input_stem());
    fs::create_dir_all(&out_dir)?;
    let stem = config.input_stem();

    let base_dim = config.cubemap_size();
    let num_levels = base_dim.ilog2() as usize + 1;
    let mut num_samples = config.num_samples;

    let mut container = if config.output_type == OutputType::Ktx {
        let mut info = ktx_info(config);
        info.pixel_width = base_dim as u32;
        info.pixel_height = base_dim as u32;
        info.num_faces = 6;
        info.num_mip_levels = num_levels as u32;
        Some(KtxContainer::new(info))
    } else {
        None
    };

    for level in 0..num_levels {
        let dim = base_dim >> level;
        if level >= 2 {
            // the filter gets wider every level while the work per level
            // shrinks 4x, so doubling the samples costs little
            num_samples *= 2;
        }
        let lod = if num_levels > 1 {
            (level as f64 / (num_levels - 1) as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let linear_roughness = lod * lod;
        tracing::info!(
            "Level {}, roughness(lin) = {:.3}, roughness = {:.3}",
            level,
            linear_roughness,
            linear_roughness.sqrt()
        );

        let mut dst = Cubemap::new(dim)?;
        ibl::roughness_filter(&mut dst, levels, linear_roughness, num_samples);

        if config.debug {
            save_image(
                &out_dir.join(format!("{}_roughness_m{}.hdr", stem, level)),
                OutputFormat::Hdr,
                &to_cross_image(&dst),
            )?;
        }

        match &mut container {
            Some(container) => export_ktx_faces(config, container, level, &dst)?,
            None => save_cubemap(config, &out_dir, &format!("m{}", level), &dst)?,
        }
    }

    if let Some(mut container) = container {
        if let (Some(sh), Some(bands)) = (coefficients, config.sh_bands) {
            container.set_metadata("sh", &sh_metadata_string(sh, bands));
        }
        let path = out_dir.join(format!("{}_ibl.ktx", stem));
        fs::write(&path, container.serialize())
            .with_context(|| format!("writing {:?}", path))?;
    }
    Ok(())
}

/// Monte-Carlo diffuse irradiance, written as `i_<face>` images.
fn ibl_diffuse_irradiance(config: &Config, levels: &[Cubemap], dir: &Path) -> Result<()> {
    let out_dir = dir.join(config.input_stem());
    fs::create_dir_all(&out_dir)?;
    let stem = config.input_stem();

    let dim = config.cubemap_size();
    let mut dst = Cubemap::new(dim)?;
    ibl::diffuse_irradiance(&mut dst, levels, config.num_samples);

    let ext = config.image_format().extension();
    for face in Face::ALL {
        let path = out_dir.join(format!("i_{}.{}", face.name(), ext));
        save_image(&path, config.image_format(), &dst.face_image(face))?;
    }

    if config.debug {
        save_image(
            &out_dir.join(format!("{}_diffuse_irradiance.hdr", stem)),
            OutputFormat::Hdr,
            &to_cross_image(&dst),
        )?;

        // reconstruct the same signal through SH to compare both paths
        let bands = config.sh_bands.unwrap_or(3);
        let sh = sh::compute_sh(&dst, bands, false);
        let mut rendered = Cubemap::new(dim)?;
        sh::render_sh(&mut rendered, &sh, bands);
        save_image(
            &out_dir.join(format!("{}_diffuse_irradiance_sh.hdr", stem)),
            OutputFormat::Hdr,
            &to_cross_image(&rendered),
        )?;
    }
    Ok(())
}

/// Skybox extraction, optionally blurred, as faces / single projection /
/// `*_skybox.ktx`.
fn extract_cubemap_faces(config: &Config, levels: &[Cubemap], dir: &Path) -> Result<()> {
    let out_dir = dir.join(config.input_stem());
    fs::create_dir_all(&out_dir)?;
    let stem = config.input_stem();

    let blurred;
    let cm = if config.extract_blur != 0.0 {
        tracing::info!("Blurring (roughness {})...", config.extract_blur);
        let linear_roughness = config.extract_blur * config.extract_blur;
        let dim = config.size.unwrap_or(levels[0].dim());
        let mut dst = Cubemap::new(dim)?;
        ibl::roughness_filter(&mut dst, levels, linear_roughness, config.num_samples);
        blurred = dst;
        &blurred
    } else {
        &levels[0]
    };
    tracing::info!("Extracting faces...");

    if config.output_type == OutputType::Ktx {
        let mut info = ktx_info(config);
        info.pixel_width = cm.dim() as u32;
        info.pixel_height = cm.dim() as u32;
        info.num_faces = 6;
        let mut container = KtxContainer::new(info);
        export_ktx_faces(config, &mut container, 0, cm)?;
        let path = out_dir.join(format!("{}_skybox.ktx", stem));
        fs::write(&path, container.serialize())
            .with_context(|| format!("writing {:?}", path))?;
        return Ok(());
    }

    let format = config.image_format();
    let ext = format.extension();
    match config.output_type {
        OutputType::Equirect => {
            let mut img = Image::new(cm.dim() * 2, cm.dim());
            cubemap_to_equirectangular(&mut img, cm);
            save_image(&out_dir.join(format!("skybox.{}", ext)), format, &img)?;
        }
        OutputType::Octahedron => {
            let mut img = Image::new(cm.dim(), cm.dim());
            cubemap_to_octahedron(&mut img, cm);
            save_image(&out_dir.join(format!("skybox.{}", ext)), format, &img)?;
        }
        _ => {
            for face in Face::ALL {
                let path = out_dir.join(format!("{}.{}", face.name(), ext));
                save_image(&path, format, &cm.face_image(face))?;
            }
        }
    }
    Ok(())
}

/// DFG LUT: text dump for source inclusion, or an image.
fn ibl_lut_dfg(config: &Config, path: &Path) -> Result<()> {
    tracing::info!("Generating IBL DFG LUT...");
    let size = config.dfg_size();
    let mut lut = Image::new(size, size);
    ibl::dfg(&mut lut, config.dfg_multiscatter);

    if is_text_dfg(path) {
        write_dfg_text(path, &lut)
    } else {
        save_image(path, format_for_path(path, config.image_format()), &lut)
    }
}

/// Writes one cubemap as the configured layout, with the given filename
/// base (`m3` becomes `m3_px.png` per face or `m3.png` projected).
fn save_cubemap(config: &Config, out_dir: &Path, base: &str, cm: &Cubemap) -> Result<()> {
    let format = config.image_format();
    let ext = format.extension();
    match config.output_type {
        OutputType::Equirect => {
            let mut img = Image::new(cm.dim() * 2, cm.dim());
            cubemap_to_equirectangular(&mut img, cm);
            save_image(&out_dir.join(format!("{}.{}", base, ext)), format, &img)
        }
        OutputType::Octahedron => {
            let mut img = Image::new(cm.dim(), cm.dim());
            cubemap_to_octahedron(&mut img, cm);
            save_image(&out_dir.join(format!("{}.{}", base, ext)), format, &img)
        }
        _ => {
            for face in Face::ALL {
                let path = out_dir.join(format!("{}_{}.{}", base, face.name(), ext));
                save_image(&path, format, &cm.face_image(face))?;
            }
            Ok(())
        }
    }
}

/// Header template for the containers we emit: RGBM payloads are RGBA8,
/// block compression overrides the internal format.
fn ktx_info(config: &Config) -> KtxInfo {
    match &config.compression {
        Some(c) => KtxInfo::compressed(c.gl_internal_format()),
        None => KtxInfo::rgba8(),
    }
}

/// Stores all six faces of one mip level as RGBM (optionally
/// block-compressed) payloads.
fn export_ktx_faces(
    config: &Config,
    container: &mut KtxContainer,
    mip: usize,
    cm: &Cubemap,
) -> Result<()> {
    for (j, face) in Face::ALL.into_iter().enumerate() {
        let rgbm = face_to_rgbm_bytes(cm, face);
        let blob = match &config.compression {
            Some(c) => c.compress(&rgbm, cm.dim() as u32, cm.dim() as u32)?,
            None => rgbm,
        };
        container.set_blob(mip, 0, j, blob);
    }
    Ok(())
}

/// Picks an output format from a filename extension, falling back to the
/// configured format.
fn format_for_path(path: &Path, fallback: OutputFormat) -> OutputFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => OutputFormat::Png,
        Some("hdr") => OutputFormat::Hdr,
        Some("exr") => OutputFormat::Exr,
        Some("rgbm") => OutputFormat::Rgbm,
        Some("dds") => OutputFormat::Dds,
        _ => fallback,
    }
}

impl Config {
    /// Format used at image-save sites. `--format ktx` selects the container
    /// path; plain images written alongside it stay PNG.
    pub fn image_format(&self) -> OutputFormat {
        if self.format == OutputFormat::Ktx {
            OutputFormat::Png
        } else {
            self.format
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_for_path() {
        assert_eq!(
            format_for_path(Path::new("a/b.exr"), OutputFormat::Png),
            OutputFormat::Exr
        );
        assert_eq!(
            format_for_path(Path::new("a/b"), OutputFormat::Hdr),
            OutputFormat::Hdr
        );
    }

    #[test]
    fn test_image_format_never_ktx() {
        use clap::Parser;
        let args = crate::config::Args::try_parse_from(["envbake", "--format", "ktx", "env.hdr"]);
        let config = Config::from_args(args.unwrap()).unwrap();
        assert_eq!(config.image_format(), OutputFormat::Png);
    }
}
