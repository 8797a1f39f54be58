//! Command-line surface and the validated, immutable bake configuration.
//!
//! All option validation happens in [`Config::from_args`], before the
//! pipeline touches the filesystem: bad aspect ratios are the only errors
//! left to discover at load time.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use envbake_core::is_pot;
use envbake_ktx::CompressionConfig;

pub const IBL_DEFAULT_SIZE: usize = 256;
pub const DFG_DEFAULT_SIZE: usize = 128;

/// envbake - bakes HDR environments into IBL assets
#[derive(Parser, Debug)]
#[command(name = "envbake")]
#[command(about = "Bakes HDR environment maps into prefiltered cubemaps, SH coefficients and KTX containers")]
#[command(version)]
pub struct Args {
    /// Input environment image (equirectangular 2:1 or cubemap cross 3:4 /
    /// 4:3). A missing file generates a synthetic pattern from the name
    /// (uv16, u8, v4, brdf2, ...)
    pub input: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output layout
    #[arg(short = 't', long = "type", value_enum, default_value_t = OutputType::Cubemap)]
    pub output_type: OutputType,

    /// Output image format (ktx implies --type ktx)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Compression spec, e.g. s3tc_rgba_dxt5, astc_fast_ldr_4x4,
    /// etc_rgba8_rec709_60
    #[arg(short, long)]
    pub compression: Option<String>,

    /// Output dimension (must be a power of two)
    #[arg(short, long)]
    pub size: Option<usize>,

    /// Generate the deployment preset into <DIR>: extracted faces,
    /// prefiltered levels and pre-scaled SH text
    #[arg(short = 'x', long, value_name = "DIR")]
    pub deploy: Option<PathBuf>,

    /// Extract the skybox faces into <DIR>
    #[arg(short = 'e', long, value_name = "DIR")]
    pub extract: Option<PathBuf>,

    /// Blur the extracted skybox with this roughness (0..=1)
    #[arg(long, value_name = "ROUGHNESS", default_value_t = 0.0)]
    pub extract_blur: f64,

    /// Skip the default horizontal mirroring of the input
    #[arg(long)]
    pub no_mirror: bool,

    /// Importance sample count for the IBL filters
    #[arg(long, value_name = "N", default_value_t = 1024)]
    pub ibl_samples: usize,

    /// Write the DFG LUT to <FILE> (.h/.hpp/.c/.cpp/.inc/.txt emit hex
    /// half-float text, anything else an image)
    #[arg(long, value_name = "FILE")]
    pub ibl_dfg: Option<PathBuf>,

    /// Bake the multiscatter variant of the DFG LUT
    #[arg(long)]
    pub ibl_dfg_multiscatter: bool,

    /// Export the mip chain for importance sampling at runtime into <DIR>
    #[arg(long, value_name = "DIR")]
    pub ibl_is_mipmap: Option<PathBuf>,

    /// GGX roughness prefilter into <DIR>
    #[arg(long, value_name = "DIR")]
    pub ibl_ld: Option<PathBuf>,

    /// Diffuse irradiance cubemap into <DIR>
    #[arg(long, value_name = "DIR")]
    pub ibl_irradiance: Option<PathBuf>,

    /// SH decomposition of the input with this many bands (--sh=N)
    #[arg(long, value_name = "BANDS", num_args = 0..=1, require_equals = true, default_missing_value = "3")]
    pub sh: Option<usize>,

    /// SH output file (.txt emits a coefficient listing, anything else a
    /// reconstructed cross image)
    #[arg(long, value_name = "FILE")]
    pub sh_output: Option<PathBuf>,

    /// Output irradiance SH coefficients instead of radiance
    #[arg(short = 'i', long)]
    pub sh_irradiance: bool,

    /// Pre-scaled 3-band irradiance SH for direct use in shader code
    #[arg(long)]
    pub sh_shader: bool,

    /// Write extra debug images next to the regular outputs
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    /// One image per cubemap face
    Cubemap,
    /// Single 2:1 latitude/longitude image
    Equirect,
    /// Single square octahedral-projection image
    Octahedron,
    /// KTX container with all faces (and mip levels)
    Ktx,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Hdr,
    Exr,
    /// RGBM-encoded HDR carried in an RGBA PNG
    Rgbm,
    /// Minimal uncompressed 32-bit float DDS
    Dds,
    Ktx,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Hdr => "hdr",
            OutputFormat::Exr => "exr",
            OutputFormat::Rgbm => "rgbm",
            OutputFormat::Dds => "dds",
            OutputFormat::Ktx => "ktx",
        }
    }
}

/// How `--sh-output` writes its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShFile {
    /// Coefficient listing, one line per coefficient
    Text,
    /// Reconstructed cubemap as a horizontal-cross image
    Cross,
}

/// Validated bake plan. Built once, never mutated; the pipeline reads it.
#[derive(Debug)]
pub struct Config {
    pub quiet: bool,
    pub input: Option<PathBuf>,
    pub output_type: OutputType,
    pub format: OutputFormat,
    pub compression: Option<CompressionConfig>,
    pub size: Option<usize>,
    pub extract_dir: Option<PathBuf>,
    pub extract_blur: f64,
    pub mirror: bool,
    pub num_samples: usize,
    pub dfg_file: Option<PathBuf>,
    pub dfg_multiscatter: bool,
    pub is_mipmap_dir: Option<PathBuf>,
    pub prefilter_dir: Option<PathBuf>,
    pub irradiance_dir: Option<PathBuf>,
    /// SH band count; `Some` enables the SH stage
    pub sh_bands: Option<usize>,
    pub sh_file: Option<(PathBuf, ShFile)>,
    pub sh_irradiance: bool,
    pub sh_shader: bool,
    pub debug: bool,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self> {
        if let Some(size) = args.size {
            if !is_pot(size) {
                bail!("output size must be a power of two, got {}", size);
            }
        }
        if !(0.0..=1.0).contains(&args.extract_blur) {
            bail!(
                "roughness (blur) parameter must be between 0.0 and 1.0, got {}",
                args.extract_blur
            );
        }
        if args.ibl_samples == 0 {
            bail!("sample count must be non-zero");
        }

        let compression = args
            .compression
            .as_deref()
            .map(|s| {
                let c: CompressionConfig = s.parse()?;
                if !c.encodable() {
                    bail!("no encoder for '{}' in this build (only s3tc_rgba_dxt5)", s);
                }
                Ok(c)
            })
            .transpose()
            .context("invalid --compression")?;

        let mut output_type = args.output_type;
        let mut format = args.format;
        if format == Some(OutputFormat::Ktx) {
            output_type = OutputType::Ktx;
        }
        if args.deploy.is_some() && format.is_none() {
            format = Some(OutputFormat::Rgbm);
        }
        let format = format.unwrap_or(OutputFormat::Png);

        let mut sh_bands = args.sh;
        let mut sh_file = args.sh_output.map(|path| {
            let kind = match path.extension().and_then(|e| e.to_str()) {
                Some("txt") => ShFile::Text,
                _ => ShFile::Cross,
            };
            (path, kind)
        });
        let mut sh_irradiance = args.sh_irradiance;
        let mut sh_shader = args.sh_shader;
        if sh_shader {
            sh_irradiance = true;
        }
        if (sh_file.is_some() || sh_irradiance) && sh_bands.is_none() {
            sh_bands = Some(3);
        }

        let mut extract_dir = args.extract;
        let mut prefilter_dir = args.ibl_ld;
        let mut is_mipmap_dir = args.ibl_is_mipmap;

        if let Some(deploy) = &args.deploy {
            let stem = args
                .input
                .as_deref()
                .and_then(|p| p.file_stem())
                .and_then(|s| s.to_str())
                .map(str::to_owned)
                .unwrap_or_default();
            sh_bands = Some(3);
            sh_shader = true;
            sh_irradiance = true;
            sh_file = Some((deploy.join(&stem).join("sh.txt"), ShFile::Text));
            extract_dir = Some(deploy.clone());
            prefilter_dir = Some(deploy.clone());
        }

        // debug prefilter wants the unfiltered chain next to it for comparison
        if args.debug && prefilter_dir.is_some() && is_mipmap_dir.is_none() {
            is_mipmap_dir = prefilter_dir.clone();
        }

        if let Some(bands) = sh_bands {
            if bands == 0 {
                bail!("SH band count must be at least 1");
            }
            if sh_shader && bands != 3 {
                bail!("--sh-shader requires 3 SH bands");
            }
        }

        if args.input.is_none() && args.ibl_dfg.is_none() {
            bail!("no input image and nothing to generate (see --help)");
        }

        Ok(Self {
            quiet: args.quiet,
            input: args.input,
            output_type,
            format,
            compression,
            size: args.size,
            extract_dir,
            extract_blur: args.extract_blur,
            mirror: !args.no_mirror,
            num_samples: args.ibl_samples,
            dfg_file: args.ibl_dfg,
            dfg_multiscatter: args.ibl_dfg_multiscatter,
            is_mipmap_dir,
            prefilter_dir,
            irradiance_dir: args.ibl_irradiance,
            sh_bands,
            sh_file,
            sh_irradiance,
            sh_shader,
            debug: args.debug,
        })
    }

    /// Cubemap face dimension for generated cubemaps.
    pub fn cubemap_size(&self) -> usize {
        self.size.unwrap_or(IBL_DEFAULT_SIZE)
    }

    /// DFG LUT dimension.
    pub fn dfg_size(&self) -> usize {
        self.size.unwrap_or(DFG_DEFAULT_SIZE)
    }

    /// Input filename without extension, used as the output subdirectory
    /// and container file prefix.
    pub fn input_stem(&self) -> &str {
        self.input
            .as_deref()
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or("envbake")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config> {
        let mut argv = vec!["envbake"];
        argv.extend_from_slice(args);
        Config::from_args(Args::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_defaults() {
        let c = parse(&["env.hdr"]).unwrap();
        assert_eq!(c.output_type, OutputType::Cubemap);
        assert_eq!(c.format, OutputFormat::Png);
        assert!(c.mirror);
        assert_eq!(c.num_samples, 1024);
        assert_eq!(c.cubemap_size(), IBL_DEFAULT_SIZE);
        assert_eq!(c.dfg_size(), DFG_DEFAULT_SIZE);
        assert!(c.sh_bands.is_none());
    }

    #[test]
    fn test_ktx_format_implies_ktx_type() {
        let c = parse(&["--format", "ktx", "env.hdr"]).unwrap();
        assert_eq!(c.output_type, OutputType::Ktx);
        assert_eq!(c.format, OutputFormat::Ktx);
    }

    #[test]
    fn test_non_pot_size_rejected() {
        assert!(parse(&["--size", "100", "env.hdr"]).is_err());
        assert!(parse(&["--size", "128", "env.hdr"]).is_ok());
    }

    #[test]
    fn test_blur_range() {
        assert!(parse(&["--extract-blur", "1.5", "env.hdr"]).is_err());
        assert!(parse(&["--extract-blur", "0.5", "env.hdr"]).is_ok());
    }

    #[test]
    fn test_bad_compression_is_config_error() {
        assert!(parse(&["--compression", "bogus", "env.hdr"]).is_err());
        // parses, but no encoder shipped
        assert!(parse(&["--compression", "astc_fast_ldr_4x4", "env.hdr"]).is_err());
        assert!(parse(&["--compression", "s3tc_rgba_dxt5", "env.hdr"]).is_ok());
    }

    #[test]
    fn test_deploy_preset() {
        let c = parse(&["--deploy", "out", "env.hdr"]).unwrap();
        assert_eq!(c.format, OutputFormat::Rgbm);
        assert_eq!(c.sh_bands, Some(3));
        assert!(c.sh_shader && c.sh_irradiance);
        assert_eq!(c.extract_dir.as_deref(), Some(std::path::Path::new("out")));
        assert_eq!(c.prefilter_dir.as_deref(), Some(std::path::Path::new("out")));
        let (sh_path, kind) = c.sh_file.as_ref().unwrap();
        assert_eq!(kind, &ShFile::Text);
        assert!(sh_path.ends_with("env/sh.txt"));
    }

    #[test]
    fn test_sh_shader_implies_irradiance() {
        let c = parse(&["--sh-shader", "env.hdr"]).unwrap();
        assert!(c.sh_irradiance);
        assert_eq!(c.sh_bands, Some(3));
    }

    #[test]
    fn test_sh_optional_band_count() {
        let c = parse(&["--sh", "env.hdr"]).unwrap();
        assert_eq!(c.sh_bands, Some(3));
        let c = parse(&["--sh=2", "env.hdr"]).unwrap();
        assert_eq!(c.sh_bands, Some(2));
    }

    #[test]
    fn test_sh_output_kind_from_extension() {
        let c = parse(&["--sh-output", "sh.txt", "env.hdr"]).unwrap();
        assert_eq!(c.sh_file.as_ref().unwrap().1, ShFile::Text);
        let c = parse(&["--sh-output", "sh.png", "env.hdr"]).unwrap();
        assert_eq!(c.sh_file.as_ref().unwrap().1, ShFile::Cross);
    }

    #[test]
    fn test_requires_input_or_dfg() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--ibl-dfg", "dfg.h"]).is_ok());
    }
}
