//! Integration tests for envbake
//!
//! Drives full bakes end to end: generate an HDR environment -> bake ->
//! verify the emitted artifacts.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use clap::Parser;
use envbake::config::{Args, Config};
use envbake::pipeline;
use envbake_ktx::KtxContainer;
use tempfile::tempdir;

/// Writes a 512x256 equirectangular HDR with a smooth directional gradient.
fn generate_test_environment(path: &Path, width: usize, height: usize) {
    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let u = x as f32 / width as f32;
            let v = y as f32 / height as f32;
            pixels.push(image::Rgb([0.2 + u, 0.2 + v, 1.5 - v]));
        }
    }
    let file = BufWriter::new(File::create(path).expect("create hdr"));
    image::codecs::hdr::HdrEncoder::new(file)
        .encode(&pixels, width, height)
        .expect("encode hdr");
}

fn run_bake(args: &[&str]) {
    let mut argv = vec!["envbake"];
    argv.extend_from_slice(args);
    let config = Config::from_args(Args::try_parse_from(argv).expect("parse args"))
        .expect("build config");
    pipeline::run(&config).expect("bake");
}

#[test]
fn test_ktx_prefilter_end_to_end() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("env.hdr");
    generate_test_environment(&input, 512, 256);

    let out = dir.path().join("out");
    run_bake(&[
        "--quiet",
        "--format",
        "ktx",
        "--size",
        "256",
        "--ibl-samples",
        "16",
        "--sh-shader",
        "--ibl-ld",
        out.to_str().unwrap(),
        input.to_str().unwrap(),
    ]);

    let ktx_path = out.join("env").join("env_ibl.ktx");
    assert!(ktx_path.exists(), "container should exist at {:?}", ktx_path);

    let bytes = std::fs::read(&ktx_path).expect("read container");
    let container = KtxContainer::from_bytes(&bytes).expect("parse container");
    let info = container.info();
    assert_eq!(info.pixel_width, 256);
    assert_eq!(info.pixel_height, 256);
    assert_eq!(info.num_faces, 6);
    // 256 -> 9 levels (256..1)
    assert_eq!(info.num_mip_levels, 9);

    // 3-band pre-scaled SH rides along as metadata, 9 coefficients
    let sh = container.metadata("sh").expect("sh metadata");
    assert_eq!(sh.lines().count(), 9);
    for line in sh.lines() {
        assert_eq!(line.split_whitespace().count(), 3);
    }

    // RGBA8 RGBM payloads at every level
    for mip in 0..9usize {
        let dim = 256usize >> mip;
        for face in 0..6 {
            assert_eq!(container.blob(mip, 0, face).len(), dim * dim * 4);
        }
    }
}

#[test]
fn test_face_extraction_and_irradiance() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("env.hdr");
    generate_test_environment(&input, 128, 64);

    let out = dir.path().join("out");
    run_bake(&[
        "--quiet",
        "--format",
        "hdr",
        "--size",
        "32",
        "--ibl-samples",
        "64",
        "--extract",
        out.to_str().unwrap(),
        "--ibl-irradiance",
        out.to_str().unwrap(),
        input.to_str().unwrap(),
    ]);

    for face in ["px", "nx", "py", "ny", "pz", "nz"] {
        assert!(out.join("env").join(format!("{}.hdr", face)).exists());
        assert!(out.join("env").join(format!("i_{}.hdr", face)).exists());
    }
}

#[test]
fn test_deploy_preset_outputs() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("studio.hdr");
    generate_test_environment(&input, 128, 64);

    let out = dir.path().join("deploy");
    run_bake(&[
        "--quiet",
        "--size",
        "16",
        "--ibl-samples",
        "64",
        "--deploy",
        out.to_str().unwrap(),
        input.to_str().unwrap(),
    ]);

    let sh_txt = out.join("studio").join("sh.txt");
    assert!(sh_txt.exists(), "deploy writes the SH listing");
    let text = std::fs::read_to_string(&sh_txt).expect("read sh.txt");
    assert_eq!(text.lines().count(), 9);
    assert!(text.lines().next().unwrap().contains("pre-scaled base"));

    // deploy defaults to rgbm faces plus the prefiltered chain
    assert!(out.join("studio").join("px.rgbm").exists());
    assert!(out.join("studio").join("m0_px.rgbm").exists());
    assert!(out.join("studio").join("m4_nz.rgbm").exists());
}

#[test]
fn test_debug_sh_shader_images_reconstruct_constant() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("env.hdr");
    // constant radiance: its irradiance is the same constant, and both SH
    // contracts must reconstruct it
    let pixels = vec![image::Rgb([1.0f32, 1.0, 1.0]); 64 * 32];
    let file = BufWriter::new(File::create(&input).expect("create hdr"));
    image::codecs::hdr::HdrEncoder::new(file)
        .encode(&pixels, 64, 32)
        .expect("encode hdr");

    let out = dir.path().join("out");
    run_bake(&[
        "--quiet",
        "--debug",
        "--size",
        "16",
        "--sh-shader",
        "--sh-output",
        out.join("sh.txt").to_str().unwrap(),
        input.to_str().unwrap(),
    ]);

    // the pre-scaled coefficients must be rendered with the pre-scaled
    // evaluator; mixing in the normalized one scales the image by ~0.28
    let debug_img = image::open(out.join("env_sh_i.hdr"))
        .expect("debug image")
        .to_rgb32f();
    assert_eq!(debug_img.dimensions(), (64, 48));
    let px = debug_img.get_pixel(24, 24);
    assert!(
        (px[0] - 1.0).abs() < 0.05,
        "irradiance reconstruction should stay at 1.0, got {}",
        px[0]
    );

    let radiance_img = image::open(out.join("env_sh_r.hdr"))
        .expect("counterpart image")
        .to_rgb32f();
    let px = radiance_img.get_pixel(24, 24);
    assert!((px[0] - 1.0).abs() < 0.05, "radiance counterpart, got {}", px[0]);
}

#[test]
fn test_dfg_text_output() {
    let dir = tempdir().expect("tempdir");
    let lut = dir.path().join("dfg.inc");
    run_bake(&["--quiet", "--size", "8", "--ibl-dfg", lut.to_str().unwrap()]);

    let text = std::fs::read_to_string(&lut).expect("read LUT");
    assert!(text.contains("RG16F"));
    // 8x8 texels, two hex values each
    assert_eq!(text.matches("0x").count(), 8 * 8 * 2);
    // .inc files carry no array declaration
    assert!(!text.contains("DFG_LUT"));
}

#[test]
fn test_synthetic_input_via_binary() {
    let dir = tempdir().expect("tempdir");
    let out = dir.path().join("out");

    // "uv8" does not exist on disk; the tool synthesizes a UV grid
    let status = std::process::Command::new(env!("CARGO_BIN_EXE_envbake"))
        .current_dir(dir.path())
        .args([
            "--quiet",
            "--size",
            "16",
            "--extract",
            out.to_str().unwrap(),
            "uv8",
        ])
        .status()
        .expect("run envbake");
    assert!(status.success());
    assert!(out.join("uv8").join("px.png").exists());
}

#[test]
fn test_bad_aspect_ratio_fails() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("bad.hdr");
    generate_test_environment(&input, 100, 90);

    let status = std::process::Command::new(env!("CARGO_BIN_EXE_envbake"))
        .args(["--quiet", input.to_str().unwrap()])
        .status()
        .expect("run envbake");
    assert!(!status.success(), "unsupported aspect ratio must fail");
}
