//! Spherical-harmonics projection and reconstruction.
//!
//! Two distinct numeric contracts live here and must not be mixed:
//!
//! - [`compute_sh`] / [`render_sh`]: coefficients are the plain projection
//!   `c_i = ∫ L(s) Y_i(s) dΩ` onto the fully normalized real SH basis,
//!   optionally attenuated per band by the truncated cosine lobe so that
//!   reconstruction yields irradiance (divided by π, i.e. the value a
//!   Lambertian shader wants) instead of radiance.
//! - [`compute_irradiance_sh3_bands`] / [`render_pre_scaled_sh3_bands`]:
//!   3-band irradiance coefficients additionally pre-multiplied by the basis
//!   normalization constants, so a consumer evaluates irradiance with the
//!   raw monomials `1, y, z, x, xy, yz, 3z²-1, xz, x²-y²` and a dot
//!   product - no further scaling anywhere.
//!
//! Everything here accumulates in `f64`: the low bands carry almost all the
//! energy and f32 summation over a 256² face measurably biases them.

use std::f64::consts::PI;

use glam::DVec3;
use rayon::prelude::*;

use crate::cubemap_utils::solid_angle;
use crate::{Cubemap, Face};

/// Canonical linear index of band `l`, order `m` (`-l ≤ m ≤ l`).
#[inline]
pub fn sh_index(m: i64, l: usize) -> usize {
    (l as i64 * (l as i64 + 1) + m) as usize
}

/// Number of coefficients for `num_bands` bands.
#[inline]
pub fn sh_count(num_bands: usize) -> usize {
    num_bands * num_bands
}

/// `n! / d!` as f64 (with `n ≥ d`).
fn factorial_quotient(mut n: usize, d: usize) -> f64 {
    let mut r = 1.0;
    while n > d {
        r *= n as f64;
        n -= 1;
    }
    r
}

/// Normalization constant K(m, l) of the real SH basis.
fn k_ml(m: i64, l: usize) -> f64 {
    let m = m.unsigned_abs() as usize;
    let k = (2 * l + 1) as f64 * factorial_quotient(l - m, l + m);
    k.sqrt() * (1.0 / (2.0 * PI.sqrt()))
}

/// Per-coefficient scale factors folding K(m, l) and the √2 of the m ≠ 0
/// terms into the basis.
fn k_i(num_bands: usize) -> Vec<f64> {
    let mut k = vec![0.0; sh_count(num_bands)];
    for l in 0..num_bands {
        k[sh_index(0, l)] = k_ml(0, l);
        for m in 1..=l as i64 {
            let v = std::f64::consts::SQRT_2 * k_ml(m, l);
            k[sh_index(-m, l)] = v;
            k[sh_index(m, l)] = v;
        }
    }
    k
}

/// SH coefficients A_l of the truncated cosine lobe max(0, cosθ).
/// Odd bands above 1 vanish; even bands decay fast (π, 2π/3, π/4, 0, -π/24).
fn truncated_cos_sh(l: usize) -> f64 {
    if l == 0 {
        return PI;
    }
    if l == 1 {
        return 2.0 * PI / 3.0;
    }
    if l % 2 == 1 {
        return 0.0;
    }
    let l_2 = l / 2;
    let a0 = if l_2 % 2 == 1 { 1.0 } else { -1.0 } / ((l + 2) * (l - 1)) as f64;
    let a1 = factorial_quotient(l, l_2) / (factorial_quotient(l_2, 0) * (1u64 << l) as f64);
    2.0 * PI * a0 * a1
}

/// Evaluates the un-normalized real SH basis at unit direction `s` into
/// `out[0..num_bands²]`: associated Legendre recurrence in `z`, then the
/// `cos(mφ)` / `sin(mφ)` terms built iteratively from `s.x`, `s.y`. Multiply
/// by [`k_i`] for the orthonormal basis (Condon-Shortley phase included).
fn compute_sh_basis(out: &mut [f64], num_bands: usize, s: DVec3) {
    debug_assert!(out.len() >= sh_count(num_bands));

    // m = 0: P(0,0) then the l recurrence straight up the band ladder
    let mut pml_2 = 0.0;
    let mut pml_1 = 1.0;
    out[0] = pml_1;
    for l in 1..num_bands {
        let lf = l as f64;
        let pml = ((2.0 * lf - 1.0) * pml_1 * s.z - (lf - 1.0) * pml_2) / lf;
        pml_2 = pml_1;
        pml_1 = pml;
        out[sh_index(0, l)] = pml;
    }

    // m > 0: P(m,m) seeds, divided through by sin(θ)^m which the azimuthal
    // terms below reintroduce
    let mut pmm = 1.0;
    for m in 1..num_bands {
        let mf = m as f64;
        pmm *= 1.0 - 2.0 * mf;
        let mut pml_2 = pmm;
        let mut pml_1 = (2.0 * mf + 1.0) * pmm * s.z;
        out[sh_index(-(m as i64), m)] = pml_2;
        out[sh_index(m as i64, m)] = pml_2;
        if m + 1 < num_bands {
            out[sh_index(-(m as i64), m + 1)] = pml_1;
            out[sh_index(m as i64, m + 1)] = pml_1;
            for l in m + 2..num_bands {
                let lf = l as f64;
                let pml =
                    ((2.0 * lf - 1.0) * pml_1 * s.z - (lf + mf - 1.0) * pml_2) / (lf - mf);
                pml_2 = pml_1;
                pml_1 = pml;
                out[sh_index(-(m as i64), l)] = pml;
                out[sh_index(m as i64, l)] = pml;
            }
        }
    }

    // azimuthal part: cos(mφ)·sin^m(θ) and sin(mφ)·sin^m(θ) by recurrence
    let mut cm = s.x;
    let mut sm = s.y;
    for m in 1..num_bands {
        for l in m..num_bands {
            out[sh_index(-(m as i64), l)] *= sm;
            out[sh_index(m as i64, l)] *= cm;
        }
        let cm1 = cm * s.x - sm * s.y;
        let sm1 = sm * s.x + cm * s.y;
        cm = cm1;
        sm = sm1;
    }
}

/// Projects a cubemap's radiance onto the SH basis with solid-angle-weighted
/// texel quadrature. With `irradiance`, band `l` is additionally scaled by
/// `A_l / π` (truncated cosine over π) so [`render_sh`] reconstructs the
/// irradiance a Lambertian shader consumes; a constant-radiance cubemap then
/// reconstructs to exactly its input value.
pub fn compute_sh(cm: &Cubemap, num_bands: usize, irradiance: bool) -> Vec<DVec3> {
    assert!(num_bands > 0, "need at least one SH band");
    let num_coefs = sh_count(num_bands);
    let dim = cm.dim();

    // one partial projection per scanline, reduced in fixed row order so the
    // result does not depend on thread scheduling
    let partials: Vec<Vec<DVec3>> = (0..6 * dim)
        .into_par_iter()
        .map(|row| {
            let face = Face::ALL[row / dim];
            let y = row % dim;
            let mut basis = vec![0.0; num_coefs];
            let mut acc = vec![DVec3::ZERO; num_coefs];
            for x in 0..dim {
                let s = cm.direction_for(face, x, y);
                let weight = solid_angle(dim, x, y);
                compute_sh_basis(&mut basis, num_bands, s);
                let c = cm.texel(face, x as isize, y as isize) * weight;
                for i in 0..num_coefs {
                    acc[i] += c * basis[i];
                }
            }
            acc
        })
        .collect();

    let mut sh = vec![DVec3::ZERO; num_coefs];
    for partial in partials {
        for (a, p) in sh.iter_mut().zip(partial) {
            *a += p;
        }
    }

    let mut k = k_i(num_bands);
    if irradiance {
        for l in 0..num_bands {
            let a_hat = truncated_cos_sh(l) / PI;
            for m in -(l as i64)..=l as i64 {
                k[sh_index(m, l)] *= a_hat;
            }
        }
    }
    for (c, ki) in sh.iter_mut().zip(&k) {
        *c *= *ki;
    }
    sh
}

/// Reconstructs the truncated SH series into a cubemap, one evaluation per
/// texel direction.
pub fn render_sh(dst: &mut Cubemap, sh: &[DVec3], num_bands: usize) {
    let num_coefs = sh_count(num_bands);
    assert!(sh.len() >= num_coefs);
    let dim = dst.dim();
    let k = k_i(num_bands);
    dst.generate(|face, x, y| {
        let s = crate::cubemap::face_direction(dim, face, x as f64 + 0.5, y as f64 + 0.5);
        let mut basis = vec![0.0; num_coefs];
        compute_sh_basis(&mut basis, num_bands, s);
        let mut c = DVec3::ZERO;
        for i in 0..num_coefs {
            c += sh[i] * (k[i] * basis[i]);
        }
        c
    });
    dst.make_seamless();
}

/// Basis normalization constants of the nine 3-band coefficients, signs
/// included, paired with the monomials `1, y, z, x, xy, yz, 3z²-1, xz,
/// x²-y²`.
fn pre_scale_constants() -> [f64; 9] {
    let sqrt_pi = PI.sqrt();
    let sqrt_3 = 3.0f64.sqrt();
    let sqrt_5 = 5.0f64.sqrt();
    let sqrt_15 = 15.0f64.sqrt();
    [
        1.0 / (2.0 * sqrt_pi),
        -sqrt_3 / (2.0 * sqrt_pi),
        sqrt_3 / (2.0 * sqrt_pi),
        -sqrt_3 / (2.0 * sqrt_pi),
        sqrt_15 / (2.0 * sqrt_pi),
        -sqrt_15 / (2.0 * sqrt_pi),
        sqrt_5 / (4.0 * sqrt_pi),
        -sqrt_15 / (2.0 * sqrt_pi),
        sqrt_15 / (4.0 * sqrt_pi),
    ]
}

/// 3-band irradiance coefficients pre-scaled by the basis constants for
/// direct shader consumption. See the module docs: these are *not*
/// interchangeable with [`compute_sh`] output.
pub fn compute_irradiance_sh3_bands(cm: &Cubemap) -> Vec<DVec3> {
    let mut sh = compute_sh(cm, 3, true);
    for (c, k) in sh.iter_mut().zip(pre_scale_constants()) {
        *c *= k;
    }
    sh
}

/// Reconstructs a cubemap from pre-scaled 3-band coefficients using the
/// monomial basis, mirroring what a shader does at runtime.
pub fn render_pre_scaled_sh3_bands(dst: &mut Cubemap, sh: &[DVec3]) {
    assert!(sh.len() >= 9);
    let dim = dst.dim();
    dst.generate(|face, x, y| {
        let s = crate::cubemap::face_direction(dim, face, x as f64 + 0.5, y as f64 + 0.5);
        sh[0]
            + sh[1] * s.y
            + sh[2] * s.z
            + sh[3] * s.x
            + sh[4] * (s.x * s.y)
            + sh[5] * (s.y * s.z)
            + sh[6] * (3.0 * s.z * s.z - 1.0)
            + sh[7] * (s.x * s.z)
            + sh[8] * (s.x * s.x - s.y * s.y)
    });
    dst.make_seamless();
}
