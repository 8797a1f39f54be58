//! Monte-Carlo importance-sampled IBL filters.
//!
//! Three precomputations for the split-sum specular approximation plus a
//! diffuse companion:
//!
//! - [`roughness_filter`]: GGX-prefiltered specular cubemap, one invocation
//!   per target roughness level
//! - [`diffuse_irradiance`]: cosine-weighted irradiance cubemap
//! - [`dfg`]: the 2D scale/bias LUT of the environment BRDF, indexed by
//!   `(NoV, roughness)`
//!
//! All samplers draw from the Hammersley low-discrepancy sequence, so output
//! is a pure function of the inputs and the sample count. Sample directions
//! are generated in tangent space around `N = +Z` once per filter invocation
//! and rotated into place per texel, which keeps the per-texel loop down to
//! a dot product and a cubemap fetch.

use std::f64::consts::PI;

use glam::{DVec2, DVec3};

use crate::cubemap::{face_direction, trilinear_filter_at};
use crate::Cubemap;

/// i-th point of the N-point Hammersley set. `i_over_n` is `1/N`.
#[inline]
fn hammersley(i: u32, i_over_n: f64) -> DVec2 {
    const ONE_OVER_2_32: f64 = 1.0 / 4294967296.0;
    DVec2::new(i as f64 * i_over_n, i.reverse_bits() as f64 * ONE_OVER_2_32)
}

/// GGX half-vector importance sample around +Z. `a` is linear roughness
/// (α); the returned direction follows the D(h)·cosθ density.
fn hemisphere_importance_sample_dggx(u: DVec2, a: f64) -> DVec3 {
    let phi = 2.0 * PI * u.x;
    // pdf = D(a) * cos(theta)
    let cos_theta2 = (1.0 - u.y) / (1.0 + (a + 1.0) * ((a - 1.0) * u.y));
    let cos_theta = cos_theta2.sqrt();
    let sin_theta = (1.0 - cos_theta2).sqrt();
    DVec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

/// Cosine-weighted hemisphere sample around +Z (pdf = cosθ/π).
fn hemisphere_cos_sample(u: DVec2) -> DVec3 {
    let phi = 2.0 * PI * u.x;
    let cos_theta2 = 1.0 - u.y;
    let cos_theta = cos_theta2.sqrt();
    let sin_theta = (1.0 - cos_theta2).sqrt();
    DVec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

/// GGX normal distribution, `a` = linear roughness.
fn distribution_ggx(no_h: f64, a: f64) -> f64 {
    let f = (a - 1.0) * ((a + 1.0) * (no_h * no_h)) + 1.0;
    (a * a) / (PI * f * f)
}

/// Height-correlated Smith visibility term (V = G / (4 NoV NoL)).
fn visibility(no_v: f64, no_l: f64, a: f64) -> f64 {
    let a2 = a * a;
    let ggx_l = no_v * ((no_l - no_l * a2) * no_l + a2).sqrt();
    let ggx_v = no_l * ((no_v - no_v * a2) * no_v + a2).sqrt();
    0.5 / (ggx_v + ggx_l)
}

/// Orthonormal tangent frame with `n` as the third column.
fn tangent_frame(n: DVec3) -> [DVec3; 3] {
    let up = if n.z.abs() < 0.999 { DVec3::Z } else { DVec3::X };
    let t = up.cross(n).normalize();
    let b = n.cross(t);
    [t, b, n]
}

struct CacheEntry {
    l: DVec3,
    weight: f64,
    mip: f64,
}

/// Selects the source mip for a sample whose solid angle is `omega_s`,
/// given the per-texel solid angle `omega_p` of the base level. Pre-filtering
/// from an already filtered mip keeps sample counts practical without
/// visible banding.
fn mip_for_sample(omega_s: f64, omega_p: f64, num_levels: usize) -> f64 {
    const K: f64 = 4.0;
    (0.5 * (K * omega_s / omega_p).log2()).clamp(0.0, (num_levels - 1) as f64)
}

/// Prefilters the environment for one GGX roughness level.
///
/// `levels` is the seamless mip chain of the source environment (level 0 at
/// full resolution). Every texel of `dst` integrates `max_samples` GGX
/// importance samples around its direction, each fetched trilinearly from
/// the mip matching the sample's solid angle, weighted by `NoL` and
/// normalized by the weight sum.
///
/// A linear roughness of exactly 0 degenerates to a mirror lookup and is
/// handled as a plain per-texel resample of level 0.
pub fn roughness_filter(
    dst: &mut Cubemap,
    levels: &[Cubemap],
    linear_roughness: f64,
    max_samples: usize,
) {
    assert!(!levels.is_empty(), "need at least one source level");
    let dim = dst.dim();

    if linear_roughness == 0.0 {
        let src = &levels[0];
        dst.generate(|face, x, y| {
            let n = face_direction(dim, face, x as f64 + 0.5, y as f64 + 0.5);
            src.sample_at(n)
        });
        dst.make_seamless();
        return;
    }

    // tangent-space sample cache, shared by every texel
    let num_levels = levels.len();
    let dim0 = levels[0].dim() as f64;
    let omega_p = 4.0 * PI / (6.0 * dim0 * dim0);
    let inv_samples = 1.0 / max_samples as f64;

    let mut cache = Vec::with_capacity(max_samples);
    let mut weight_sum = 0.0;
    for i in 0..max_samples as u32 {
        let u = hammersley(i, inv_samples);
        let h = hemisphere_importance_sample_dggx(u, linear_roughness);
        // N = V = +Z in tangent space, L = reflect(-V, H)
        let l = DVec3::new(0.0, 0.0, -1.0) + h * (2.0 * h.z);
        let no_l = l.z;
        if no_l <= 0.0 {
            continue;
        }
        let no_h = h.z;
        let pdf = distribution_ggx(no_h, linear_roughness) / 4.0;
        let omega_s = 1.0 / (max_samples as f64 * pdf);
        let mip = mip_for_sample(omega_s, omega_p, num_levels);
        cache.push(CacheEntry {
            l,
            weight: no_l,
            mip,
        });
        weight_sum += no_l;
    }
    for entry in &mut cache {
        entry.weight /= weight_sum;
    }

    dst.generate(|face, x, y| {
        let n = face_direction(dim, face, x as f64 + 0.5, y as f64 + 0.5);
        let frame = tangent_frame(n);
        let mut c = DVec3::ZERO;
        for entry in &cache {
            let l = frame[0] * entry.l.x + frame[1] * entry.l.y + frame[2] * entry.l.z;
            c += trilinear_filter_at(levels, entry.mip, l) * entry.weight;
        }
        c
    });
    dst.make_seamless();
}

/// Cosine-weighted (Lambertian) irradiance of the environment, the
/// Monte-Carlo counterpart of the SH irradiance path. Also mip-selects per
/// sample to tame variance.
pub fn diffuse_irradiance(dst: &mut Cubemap, levels: &[Cubemap], max_samples: usize) {
    assert!(!levels.is_empty(), "need at least one source level");
    let dim = dst.dim();
    let num_levels = levels.len();
    let dim0 = levels[0].dim() as f64;
    let omega_p = 4.0 * PI / (6.0 * dim0 * dim0);
    let inv_samples = 1.0 / max_samples as f64;

    // cosine sampling needs no per-sample weight: the pdf cancels the
    // cosine and the 1/π, so the estimator is a plain average
    let mut cache: Vec<(DVec3, f64)> = Vec::with_capacity(max_samples);
    for i in 0..max_samples as u32 {
        let u = hammersley(i, inv_samples);
        let l = hemisphere_cos_sample(u);
        let no_l = l.z;
        if no_l <= 0.0 {
            continue;
        }
        let pdf = no_l / PI;
        let omega_s = 1.0 / (max_samples as f64 * pdf);
        cache.push((l, mip_for_sample(omega_s, omega_p, num_levels)));
    }
    let norm = 1.0 / cache.len() as f64;

    dst.generate(|face, x, y| {
        let n = face_direction(dim, face, x as f64 + 0.5, y as f64 + 0.5);
        let frame = tangent_frame(n);
        let mut c = DVec3::ZERO;
        for &(dir, mip) in &cache {
            let l = frame[0] * dir.x + frame[1] * dir.y + frame[2] * dir.z;
            c += trilinear_filter_at(levels, mip, l);
        }
        c * norm
    });
    dst.make_seamless();
}

/// One texel of the DFG LUT: the Fresnel scale (x) and bias (y) of the
/// split-sum environment BRDF at the given view angle and roughness.
fn dfv(no_v: f64, linear_roughness: f64, num_samples: usize, multiscatter: bool) -> DVec2 {
    let mut r = DVec2::ZERO;
    let v = DVec3::new((1.0 - no_v * no_v).sqrt(), 0.0, no_v);
    let inv_samples = 1.0 / num_samples as f64;
    for i in 0..num_samples as u32 {
        let u = hammersley(i, inv_samples);
        let h = hemisphere_importance_sample_dggx(u, linear_roughness);
        let l = h * (2.0 * v.dot(h)) - v;
        let vo_h = v.dot(h).clamp(0.0, 1.0);
        let no_l = l.z.clamp(0.0, 1.0);
        let no_h = h.z.clamp(0.0, 1.0);
        if no_l > 0.0 {
            // importance-sampled estimator of V(v,l)·NoL with the D·NoH/(4·VoH)
            // pdf already divided out
            let vis = visibility(no_v, no_l, linear_roughness) * no_l * (vo_h / no_h);
            let fc = (1.0 - vo_h).powi(5);
            if multiscatter {
                r.x += vis * fc;
                r.y += vis;
            } else {
                r.x += vis * (1.0 - fc);
                r.y += vis * fc;
            }
        }
    }
    r * (4.0 / num_samples as f64)
}

/// Fills the DFG LUT. Rows run from rough (top) to smooth (bottom), columns
/// from grazing to head-on view, matching how runtime shaders index it.
/// Output channels land in R and G; B is zero.
pub fn dfg(dst: &mut crate::Image, multiscatter: bool) {
    const SAMPLES: usize = 1024;
    let width = dst.width();
    let height = dst.height();
    for y in 0..height {
        let coord = ((height - y) as f64 - 0.5) / height as f64;
        // roughness ramps quadratically so the LUT spends resolution where
        // the BRDF changes fastest
        let linear_roughness = coord * coord;
        for x in 0..width {
            let no_v = (x as f64 + 0.5) / width as f64;
            let r = dfv(no_v, linear_roughness, SAMPLES, multiscatter);
            dst.put_pixel(x, y, [r.x as f32, r.y as f32, 0.0]);
        }
    }
}

/// Renders a synthetic GGX highlight (the full D·V·NoL lobe around +Z) into
/// a cubemap. Debug aid for eyeballing filter kernels at a given roughness.
pub fn brdf(dst: &mut Cubemap, linear_roughness: f64) {
    let dim = dst.dim();
    dst.generate(|face, x, y| {
        let d = face_direction(dim, face, x as f64 + 0.5, y as f64 + 0.5);
        if d.z <= 0.0 {
            return DVec3::ZERO;
        }
        let h = (d + DVec3::Z).normalize();
        let no_l = d.z;
        let no_h = h.z;
        let v = distribution_ggx(no_h, linear_roughness)
            * visibility(1.0, no_l, linear_roughness)
            * no_l;
        DVec3::splat(v.max(0.0))
    });
    dst.make_seamless();
}
