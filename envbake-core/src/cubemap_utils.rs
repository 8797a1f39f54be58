//! Conversions between cubemaps and other environment-map layouts, plus the
//! box-filter downsampling used to build mip chains and a few synthetic
//! debug patterns.
//!
//! All converters are pure: they fill an already-allocated destination from
//! a source and never resize either. Callers are expected to run
//! [`Cubemap::make_seamless`] on a cubemap after writing into it.

use std::f64::consts::PI;

use glam::{DVec2, DVec3};

use crate::cubemap::face_direction;
use crate::{Cubemap, Face, Image};

/// Fills a cubemap from an equirectangular (2:1) source image. Each
/// destination texel direction is projected to longitude/latitude texture
/// coordinates and bilinearly sampled from the source.
pub fn equirectangular_to_cubemap(dst: &mut Cubemap, src: &Image) {
    let w = src.width() as f64;
    let h = src.height() as f64;
    let to_rectilinear = |s: DVec3| -> DVec2 {
        let xf = s.x.atan2(s.z) / PI; // [-1, 1]
        let yf = s.y.asin() * (2.0 / PI); // [-1, 1]
        DVec2::new((xf + 1.0) * 0.5 * w, (1.0 - yf) * 0.5 * h)
    };
    let dim = dst.dim();
    dst.generate(|face, x, y| {
        let dir = face_direction(dim, face, x as f64 + 0.5, y as f64 + 0.5);
        let p = to_rectilinear(dir);
        let c = src.filter_at(p.x, p.y);
        DVec3::new(c[0] as f64, c[1] as f64, c[2] as f64)
    });
    dst.make_seamless();
}

/// Renders a cubemap into an equirectangular (2:1) destination image.
/// The cubemap must be seamless; taps cross face edges.
pub fn cubemap_to_equirectangular(dst: &mut Image, src: &Cubemap) {
    let w = dst.width();
    let h = dst.height();
    for y in 0..h {
        let el = (1.0 - 2.0 * (y as f64 + 0.5) / h as f64) * (PI / 2.0);
        for x in 0..w {
            let az = (2.0 * (x as f64 + 0.5) / w as f64 - 1.0) * PI;
            let dir = DVec3::new(el.cos() * az.sin(), el.sin(), el.cos() * az.cos());
            let c = src.filter_at_direction(dir);
            dst.put_pixel(x, y, [c.x as f32, c.y as f32, c.z as f32]);
        }
    }
}

/// Renders a cubemap into a square octahedral-projection image.
pub fn cubemap_to_octahedron(dst: &mut Image, src: &Cubemap) {
    let dim = dst.width();
    debug_assert_eq!(dst.height(), dim);
    for y in 0..dim {
        let v = 2.0 * (y as f64 + 0.5) / dim as f64 - 1.0;
        for x in 0..dim {
            let u = 2.0 * (x as f64 + 0.5) / dim as f64 - 1.0;
            let dir = octahedron_to_direction(u, v);
            let c = src.filter_at_direction(dir);
            dst.put_pixel(x, y, [c.x as f32, c.y as f32, c.z as f32]);
        }
    }
}

/// Inverse octahedral mapping: unit square in `[-1, 1]²` to a direction.
fn octahedron_to_direction(u: f64, v: f64) -> DVec3 {
    let z = 1.0 - u.abs() - v.abs();
    let (x, y) = if z < 0.0 {
        (
            (1.0 - v.abs()) * u.signum(),
            (1.0 - u.abs()) * v.signum(),
        )
    } else {
        (u, v)
    };
    DVec3::new(x, y, z).normalize()
}

/// Fills a cubemap from a cross-layout source: 4:3 horizontal or 3:4
/// vertical. The source face size may differ from the destination's; faces
/// are bilinearly resampled. The bottom face of a vertical cross is stored
/// rotated 180°.
pub fn cross_to_cubemap(dst: &mut Cubemap, src: &Image) {
    let horizontal = src.width() > src.height();
    let src_dim = (src.width().min(src.height()) / 3) as f64;
    let scale = src_dim / dst.dim() as f64;
    dst.generate(|face, x, y| {
        let (ox, oy) = match face {
            Face::Nx => (0.0, 1.0),
            Face::Px => (2.0, 1.0),
            Face::Py => (1.0, 0.0),
            Face::Ny => (1.0, 2.0),
            Face::Pz => (1.0, 1.0),
            Face::Nz if horizontal => (3.0, 1.0),
            Face::Nz => (1.0, 3.0),
        };
        let mut fx = (x as f64 + 0.5) * scale;
        let mut fy = (y as f64 + 0.5) * scale;
        if !horizontal && face == Face::Nz {
            fx = src_dim - fx;
            fy = src_dim - fy;
        }
        let c = src.filter_at(ox * src_dim + fx, oy * src_dim + fy);
        DVec3::new(c[0] as f64, c[1] as f64, c[2] as f64)
    });
    dst.make_seamless();
}

/// Flips the handedness of a cubemap (mirrors the X axis). The default
/// cubemap convention is mirrored relative to most authored sources, so the
/// pipeline applies this once per load unless disabled.
pub fn mirror_cubemap(dst: &mut Cubemap, src: &Cubemap) {
    let dim = dst.dim();
    dst.generate(|face, x, y| {
        let n = face_direction(dim, face, x as f64 + 0.5, y as f64 + 0.5);
        src.sample_at(DVec3::new(-n.x, n.y, n.z))
    });
    dst.make_seamless();
}

/// Box-filters `src` into `dst` at half (or any power-of-two fraction of)
/// the linear size. Each destination texel bilinearly averages the source
/// 2×2 footprint center; edge footprints read the seamless border, which
/// preserves cross-face continuity.
pub fn downsample_boxfilter(dst: &mut Cubemap, src: &Cubemap) {
    debug_assert!(src.dim() >= dst.dim() * 2);
    let scale = (src.dim() / dst.dim()) as f64;
    dst.generate(|face, x, y| src.filter_at(face, (x as f64 + 0.5) * scale, (y as f64 + 0.5) * scale));
    dst.make_seamless();
}

/// Procedural UV grid used when no input file exists: per-face base colors
/// with grid lines at the given horizontal/vertical frequencies.
pub fn generate_uv_grid(dst: &mut Cubemap, freq_x: usize, freq_y: usize) {
    const FACE_COLORS: [[f64; 3]; 6] = [
        [0.8, 0.2, 0.2], // +X red
        [0.4, 0.1, 0.1], // -X dark red
        [0.2, 0.8, 0.2], // +Y green
        [0.1, 0.4, 0.1], // -Y dark green
        [0.2, 0.2, 0.8], // +Z blue
        [0.1, 0.1, 0.4], // -Z dark blue
    ];
    let dim = dst.dim();
    let fx = freq_x.max(1);
    let fy = freq_y.max(1);
    dst.generate(|face, x, y| {
        let cell_w = (dim / (2 * fx)).max(1);
        let cell_h = (dim / (2 * fy)).max(1);
        let on_line = x % cell_w == 0 || y % cell_h == 0 || x == dim - 1 || y == dim - 1;
        if on_line {
            DVec3::splat(1.0)
        } else {
            let c = FACE_COLORS[face as usize];
            DVec3::new(c[0], c[1], c[2])
        }
    });
    dst.make_seamless();
}

/// Exact solid angle subtended by texel `(x, y)` of a `dim`-sized face.
/// Used as the quadrature weight for spherical integration.
pub fn solid_angle(dim: usize, x: usize, y: usize) -> f64 {
    let inv_dim = 1.0 / dim as f64;
    let s = (x as f64 + 0.5) * 2.0 * inv_dim - 1.0;
    let t = (y as f64 + 0.5) * 2.0 * inv_dim - 1.0;
    let x0 = s - inv_dim;
    let y0 = t - inv_dim;
    let x1 = s + inv_dim;
    let y1 = t + inv_dim;
    sphere_quadrant_area(x0, y0) - sphere_quadrant_area(x0, y1) - sphere_quadrant_area(x1, y0)
        + sphere_quadrant_area(x1, y1)
}

/// Area on the unit sphere of the quadrant below the plane point `(x, y, 1)`.
fn sphere_quadrant_area(x: f64, y: f64) -> f64 {
    (x * y).atan2((x * x + y * y + 1.0).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_cubemap(dim: usize, value: DVec3) -> Cubemap {
        let mut cm = Cubemap::new(dim).unwrap();
        cm.generate(|_, _, _| value);
        cm.make_seamless();
        cm
    }

    #[test]
    fn test_solid_angles_sum_to_sphere() {
        for dim in [1usize, 4, 16, 64] {
            let mut sum = 0.0;
            for y in 0..dim {
                for x in 0..dim {
                    sum += solid_angle(dim, x, y);
                }
            }
            sum *= 6.0;
            assert!(
                (sum - 4.0 * PI).abs() < 1e-9,
                "dim {}: sum {} != 4π",
                dim,
                sum
            );
        }
    }

    #[test]
    fn test_equirect_roundtrip() {
        // paint a smooth directional gradient, go to equirect and back
        let mut src = Cubemap::new(32).unwrap();
        src.generate(|face, x, y| {
            let d = dst_direction_for_test(32, face, x, y);
            DVec3::new(d.x * 0.5 + 0.5, d.y * 0.5 + 0.5, d.z * 0.5 + 0.5)
        });
        src.make_seamless();

        let mut equirect = Image::new(128, 64);
        cubemap_to_equirectangular(&mut equirect, &src);

        let mut back = Cubemap::new(32).unwrap();
        equirectangular_to_cubemap(&mut back, &equirect);

        let mut max_err: f64 = 0.0;
        for face in Face::ALL {
            for y in 0..32 {
                for x in 0..32 {
                    let a = src.texel(face, x as isize, y as isize);
                    let b = back.texel(face, x as isize, y as isize);
                    max_err = max_err.max((a - b).abs().max_element());
                }
            }
        }
        // bilinear resampling tolerance, no systematic bias
        assert!(max_err < 0.05, "max error {}", max_err);
    }

    #[test]
    fn test_mirror_flips_x() {
        let mut src = Cubemap::new(8).unwrap();
        src.generate(|face, x, y| {
            let d = dst_direction_for_test(8, face, x, y);
            DVec3::new(d.x, 0.0, 0.0)
        });
        src.make_seamless();
        let mut dst = Cubemap::new(8).unwrap();
        mirror_cubemap(&mut dst, &src);
        let dir = dst.direction_for(Face::Px, 4, 4);
        let c = dst.sample_at(dir);
        // +X direction now carries -X's (negative) value
        assert!(c.x < 0.0);
    }

    #[test]
    fn test_downsample_preserves_constant() {
        let src = constant_cubemap(8, DVec3::new(0.3, 0.6, 0.9));
        let mut dst = Cubemap::new(4).unwrap();
        downsample_boxfilter(&mut dst, &src);
        let c = dst.texel(Face::Nz, 0, 3);
        assert!((c - DVec3::new(0.3, 0.6, 0.9)).abs().max_element() < 1e-6);
    }

    #[test]
    fn test_downsample_averages_2x2() {
        let mut src = Cubemap::new(4).unwrap();
        src.generate(|_, x, y| {
            if x < 2 && y < 2 {
                DVec3::splat(1.0)
            } else {
                DVec3::ZERO
            }
        });
        src.make_seamless();
        let mut dst = Cubemap::new(2).unwrap();
        downsample_boxfilter(&mut dst, &src);
        assert!((dst.texel(Face::Px, 0, 0).x - 1.0).abs() < 1e-6);
        assert!(dst.texel(Face::Px, 1, 1).x.abs() < 1e-6);
    }

    #[test]
    fn test_octahedron_direction_poles() {
        let up = octahedron_to_direction(0.0, 0.0);
        assert!((up - DVec3::Z).length() < 1e-12);
        let down = octahedron_to_direction(1.0, 1.0);
        assert!((down + DVec3::Z).length() < 1e-9);
    }

    fn dst_direction_for_test(dim: usize, face: Face, x: usize, y: usize) -> DVec3 {
        face_direction(dim, face, x as f64 + 0.5, y as f64 + 0.5)
    }
}
