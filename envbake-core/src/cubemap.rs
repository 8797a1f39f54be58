//! Cubemap: six square faces over one shared pixel buffer.
//!
//! Each face is stored as a `(dim+2)²` slab with a one-texel border on every
//! side. [`Cubemap::make_seamless`] fills the borders with the neighboring
//! face's edge texels, so bilinear taps near an edge read across the face
//! boundary with no visible seam. Borders must be refreshed once after any
//! content change; all the filters in this crate rely on them.
//!
//! # Layout
//! ```text
//! data: [face 0 slab][face 1 slab] ... [face 5 slab]
//! slab: (dim+2) rows of (dim+2) RGB texels, texel (x, y) at (x+1, y+1)
//! face order: +X, -X, +Y, -Y, +Z, -Z
//! ```

use glam::DVec3;
use rayon::prelude::*;

use crate::{is_pot, Error, Image};

/// Cubemap face, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Face {
    Px = 0,
    Nx = 1,
    Py = 2,
    Ny = 3,
    Pz = 4,
    Nz = 5,
}

impl Face {
    pub const ALL: [Face; 6] = [Face::Px, Face::Nx, Face::Py, Face::Ny, Face::Pz, Face::Nz];

    /// Short name used in output filenames.
    pub fn name(self) -> &'static str {
        match self {
            Face::Px => "px",
            Face::Nx => "nx",
            Face::Py => "py",
            Face::Ny => "ny",
            Face::Pz => "pz",
            Face::Nz => "nz",
        }
    }
}

/// Resolved cubemap address: face plus texture coordinates in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct Address {
    pub face: Face,
    pub s: f64,
    pub t: f64,
}

/// Six power-of-two faces sharing one backing buffer.
#[derive(Debug, Clone)]
pub struct Cubemap {
    dim: usize,
    data: Vec<f32>,
}

impl Cubemap {
    /// Allocates a zeroed cubemap. `dim` must be a power of two; the mip and
    /// roughness-level arithmetic downstream assumes exact log2 behavior.
    pub fn new(dim: usize) -> Result<Self, Error> {
        if !is_pot(dim) {
            return Err(Error::InvalidDimension(dim));
        }
        let slab = (dim + 2) * (dim + 2) * 3;
        Ok(Self {
            dim,
            data: vec![0.0; slab * 6],
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    fn stride(&self) -> usize {
        self.dim + 2
    }

    /// Index of texel `(x, y)` of `face`; border texels are at -1 and `dim`.
    #[inline]
    fn index(&self, face: Face, x: isize, y: isize) -> usize {
        debug_assert!(x >= -1 && x <= self.dim as isize);
        debug_assert!(y >= -1 && y <= self.dim as isize);
        let stride = self.stride();
        let slab = stride * stride * 3;
        face as usize * slab + (((y + 1) as usize) * stride + (x + 1) as usize) * 3
    }

    /// Reads a texel; `x`/`y` may address the one-texel border.
    #[inline]
    pub fn texel(&self, face: Face, x: isize, y: isize) -> DVec3 {
        let i = self.index(face, x, y);
        DVec3::new(
            self.data[i] as f64,
            self.data[i + 1] as f64,
            self.data[i + 2] as f64,
        )
    }

    /// Writes an interior texel.
    #[inline]
    pub fn set_texel(&mut self, face: Face, x: usize, y: usize, c: DVec3) {
        let i = self.index(face, x as isize, y as isize);
        self.data[i] = c.x as f32;
        self.data[i + 1] = c.y as f32;
        self.data[i + 2] = c.z as f32;
    }

    /// Direction through the center of texel `(x, y)`.
    #[inline]
    pub fn direction_for(&self, face: Face, x: usize, y: usize) -> DVec3 {
        self.direction_for_coords(face, x as f64 + 0.5, y as f64 + 0.5)
    }

    /// Direction for continuous face coordinates in `[0, dim]`. Coordinates
    /// outside that range extend the face plane past its edges, which is how
    /// the seamless pass finds the neighboring face's texels.
    pub fn direction_for_coords(&self, face: Face, x: f64, y: f64) -> DVec3 {
        face_direction(self.dim, face, x, y)
    }

    /// Maps a direction to the face it hits and the texture coordinates on
    /// that face. Inverse of [`Self::direction_for_coords`].
    pub fn address_of(r: DVec3) -> Address {
        let rx = r.x.abs();
        let ry = r.y.abs();
        let rz = r.z.abs();
        let (face, ma, sc, tc) = if rx >= ry && rx >= rz {
            if r.x >= 0.0 {
                (Face::Px, rx, -r.z, -r.y)
            } else {
                (Face::Nx, rx, r.z, -r.y)
            }
        } else if ry >= rx && ry >= rz {
            if r.y >= 0.0 {
                (Face::Py, ry, r.x, r.z)
            } else {
                (Face::Ny, ry, r.x, -r.z)
            }
        } else if r.z >= 0.0 {
            (Face::Pz, rz, r.x, -r.y)
        } else {
            (Face::Nz, rz, -r.x, -r.y)
        };
        Address {
            face,
            s: (sc / ma + 1.0) * 0.5,
            t: (tc / ma + 1.0) * 0.5,
        }
    }

    /// Nearest-texel fetch along a direction.
    pub fn sample_at(&self, direction: DVec3) -> DVec3 {
        let addr = Self::address_of(direction);
        let dim = self.dim;
        let x = ((addr.s * dim as f64) as usize).min(dim - 1);
        let y = ((addr.t * dim as f64) as usize).min(dim - 1);
        self.texel(addr.face, x as isize, y as isize)
    }

    /// Bilinear fetch at continuous face coordinates in `[0, dim]`. Texel
    /// centers sit at integer + 0.5; taps may land in the seamless border.
    pub fn filter_at(&self, face: Face, x: f64, y: f64) -> DVec3 {
        let xf = x - 0.5;
        let yf = y - 0.5;
        let x0 = xf.floor();
        let y0 = yf.floor();
        let u = xf - x0;
        let v = yf - y0;
        let x0 = (x0 as isize).clamp(-1, self.dim as isize - 1);
        let y0 = (y0 as isize).clamp(-1, self.dim as isize - 1);
        let c00 = self.texel(face, x0, y0);
        let c10 = self.texel(face, x0 + 1, y0);
        let c01 = self.texel(face, x0, y0 + 1);
        let c11 = self.texel(face, x0 + 1, y0 + 1);
        (c00 * (1.0 - u) + c10 * u) * (1.0 - v) + (c01 * (1.0 - u) + c11 * u) * v
    }

    /// Bilinear fetch along a direction, seamless across face edges.
    pub fn filter_at_direction(&self, direction: DVec3) -> DVec3 {
        let addr = Self::address_of(direction);
        let dim = self.dim as f64;
        self.filter_at(addr.face, addr.s * dim, addr.t * dim)
    }

    /// Rewrites the border texels of every face with the neighboring face's
    /// edge texels. Border texel centers lie just past the ±1 face plane;
    /// extending the plane and re-resolving that direction lands on the
    /// adjacent face, so no explicit edge table is needed.
    pub fn make_seamless(&mut self) {
        let dim = self.dim as isize;
        let mut border: Vec<(Face, isize, isize, DVec3)> =
            Vec::with_capacity(6 * 4 * (self.dim + 2));
        for face in Face::ALL {
            let mut stitch = |x: isize, y: isize| {
                let dir =
                    self.direction_for_coords(face, x as f64 + 0.5, y as f64 + 0.5);
                let addr = Self::address_of(dir);
                let sx = ((addr.s * dim as f64) as isize).clamp(0, dim - 1);
                let sy = ((addr.t * dim as f64) as isize).clamp(0, dim - 1);
                border.push((face, x, y, self.texel(addr.face, sx, sy)));
            };
            for x in -1..=dim {
                stitch(x, -1);
                stitch(x, dim);
            }
            for y in 0..dim {
                stitch(-1, y);
                stitch(dim, y);
            }
        }
        for (face, x, y, c) in border {
            let i = self.index(face, x, y);
            self.data[i] = c.x as f32;
            self.data[i + 1] = c.y as f32;
            self.data[i + 2] = c.z as f32;
        }
    }

    /// Fills every interior texel from `f(face, x, y)`, in parallel across
    /// rows. Borders are left untouched; call [`Self::make_seamless`] after.
    pub fn generate<F>(&mut self, f: F)
    where
        F: Fn(Face, usize, usize) -> DVec3 + Sync,
    {
        let dim = self.dim;
        let stride = self.stride();
        self.data
            .par_chunks_mut(stride * 3)
            .enumerate()
            .for_each(|(row, out)| {
                let face = Face::ALL[row / stride];
                let ry = row % stride;
                if ry == 0 || ry == stride - 1 {
                    return; // border row
                }
                let y = ry - 1;
                for x in 0..dim {
                    let c = f(face, x, y);
                    let i = (x + 1) * 3;
                    out[i] = c.x as f32;
                    out[i + 1] = c.y as f32;
                    out[i + 2] = c.z as f32;
                }
            });
    }

    /// Copies one face's interior into a standalone image.
    pub fn face_image(&self, face: Face) -> Image {
        let dim = self.dim;
        let mut img = Image::new(dim, dim);
        for y in 0..dim {
            for x in 0..dim {
                let c = self.texel(face, x as isize, y as isize);
                img.put_pixel(x, y, [c.x as f32, c.y as f32, c.z as f32]);
            }
        }
        img
    }
}

/// Direction through continuous face coordinates of a `dim`-sized face.
/// Standalone so texel-fill closures can compute directions without holding
/// a borrow of the cubemap they are writing into.
pub fn face_direction(dim: usize, face: Face, x: f64, y: f64) -> DVec3 {
    let scale = 2.0 / dim as f64;
    // map [0, dim] to [-1, 1], +Y texture rows grow downward
    let cx = x * scale - 1.0;
    let cy = 1.0 - y * scale;
    let dir = match face {
        Face::Px => DVec3::new(1.0, cy, -cx),
        Face::Nx => DVec3::new(-1.0, cy, cx),
        Face::Py => DVec3::new(cx, 1.0, -cy),
        Face::Ny => DVec3::new(cx, -1.0, cy),
        Face::Pz => DVec3::new(cx, cy, 1.0),
        Face::Nz => DVec3::new(-cx, cy, -1.0),
    };
    dir / (cx * cx + cy * cy + 1.0).sqrt()
}

/// Trilinear fetch from a mip chain at fractional `lod` (0 = base level).
pub fn trilinear_filter_at(levels: &[Cubemap], lod: f64, direction: DVec3) -> DVec3 {
    debug_assert!(!levels.is_empty());
    let lod = lod.clamp(0.0, (levels.len() - 1) as f64);
    let l0 = lod.floor() as usize;
    let l1 = (l0 + 1).min(levels.len() - 1);
    let frac = lod - l0 as f64;
    let c0 = levels[l0].filter_at_direction(direction);
    if frac == 0.0 {
        return c0;
    }
    let c1 = levels[l1].filter_at_direction(direction);
    c0 * (1.0 - frac) + c1 * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_pot_dimension() {
        assert!(Cubemap::new(96).is_err());
        assert!(Cubemap::new(0).is_err());
        assert!(Cubemap::new(64).is_ok());
    }

    #[test]
    fn test_direction_address_roundtrip() {
        let cm = Cubemap::new(16).unwrap();
        for face in Face::ALL {
            for y in 0..16 {
                for x in 0..16 {
                    let dir = cm.direction_for(face, x, y);
                    assert!((dir.length() - 1.0).abs() < 1e-12);
                    let addr = Cubemap::address_of(dir);
                    assert_eq!(addr.face, face, "face mismatch at {:?} {} {}", face, x, y);
                    let bx = (addr.s * 16.0) as usize;
                    let by = (addr.t * 16.0) as usize;
                    assert_eq!((bx, by), (x, y));
                }
            }
        }
    }

    #[test]
    fn test_sample_at_reads_back_written_texel() {
        let mut cm = Cubemap::new(8).unwrap();
        cm.set_texel(Face::Py, 3, 5, DVec3::new(1.0, 2.0, 3.0));
        let dir = cm.direction_for(Face::Py, 3, 5);
        assert_eq!(cm.sample_at(dir), DVec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_seamless_border_duplicates_neighbor_edge() {
        let mut cm = Cubemap::new(4).unwrap();
        cm.generate(|face, x, y| DVec3::splat((face as usize * 16 + y * 4 + x) as f64));
        cm.make_seamless();
        // the border column past +Z's right edge must come from +X's left column
        for y in 0..4isize {
            let border = cm.texel(Face::Pz, 4, y);
            let neighbor = cm.texel(Face::Px, 0, y);
            assert_eq!(border, neighbor);
        }
    }

    #[test]
    fn test_filter_at_direction_constant_field() {
        let mut cm = Cubemap::new(8).unwrap();
        cm.generate(|_, _, _| DVec3::new(0.25, 0.5, 0.75));
        cm.make_seamless();
        // bilinear taps across edges of a constant cubemap stay constant
        let dir = cm.direction_for_coords(Face::Px, 0.01, 7.99).normalize();
        let c = cm.filter_at_direction(dir);
        assert!((c - DVec3::new(0.25, 0.5, 0.75)).abs().max_element() < 1e-6);
    }

    #[test]
    fn test_trilinear_blends_levels() {
        let mut l0 = Cubemap::new(4).unwrap();
        let mut l1 = Cubemap::new(2).unwrap();
        l0.generate(|_, _, _| DVec3::splat(1.0));
        l1.generate(|_, _, _| DVec3::splat(3.0));
        l0.make_seamless();
        l1.make_seamless();
        let levels = vec![l0, l1];
        let dir = DVec3::new(0.3, -0.2, 0.93).normalize();
        let c = trilinear_filter_at(&levels, 0.5, dir);
        assert!((c.x - 2.0).abs() < 1e-6);
        // lod clamps to the last level
        let c = trilinear_filter_at(&levels, 5.0, dir);
        assert!((c.x - 3.0).abs() < 1e-6);
    }
}
