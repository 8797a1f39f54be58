//! Linear-RGB float image buffer.
//!
//! Rows are tightly packed: stride is always `width * 3` floats. The buffer
//! is exclusively owned by the image; faces of a [`crate::Cubemap`] use their
//! own shared buffer and only convert to `Image` on export.

/// Owned 2D image, 3 channels (linear RGB), `f32` per channel.
#[derive(Debug, Clone)]
pub struct Image {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Image {
    /// Allocates a zeroed `width`×`height` RGB image.
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "image dimensions must be non-zero");
        Self {
            width,
            height,
            data: vec![0.0; width * height * 3],
        }
    }

    /// Wraps an existing pixel buffer. `data.len()` must be `width*height*3`.
    pub fn from_data(width: usize, height: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), width * height * 3, "pixel buffer size mismatch");
        Self { width, height, data }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    pub fn get_pixel(&self, x: usize, y: usize) -> [f32; 3] {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    #[inline]
    pub fn put_pixel(&mut self, x: usize, y: usize, px: [f32; 3]) {
        let i = (y * self.width + x) * 3;
        self.data[i..i + 3].copy_from_slice(&px);
    }

    /// Bilinear fetch at continuous pixel coordinates, clamped to the image.
    /// Texel centers sit at integer + 0.5.
    pub fn filter_at(&self, x: f64, y: f64) -> [f32; 3] {
        let xf = x - 0.5;
        let yf = y - 0.5;
        let x0 = xf.floor();
        let y0 = yf.floor();
        let u = (xf - x0) as f32;
        let v = (yf - y0) as f32;
        let cx = |t: f64| (t.max(0.0) as usize).min(self.width - 1);
        let cy = |t: f64| (t.max(0.0) as usize).min(self.height - 1);
        let (x0i, x1i) = (cx(x0), cx(x0 + 1.0));
        let (y0i, y1i) = (cy(y0), cy(y0 + 1.0));
        let c00 = self.get_pixel(x0i, y0i);
        let c10 = self.get_pixel(x1i, y0i);
        let c01 = self.get_pixel(x0i, y1i);
        let c11 = self.get_pixel(x1i, y1i);
        let mut out = [0.0f32; 3];
        for (i, o) in out.iter_mut().enumerate() {
            let top = c00[i] * (1.0 - u) + c10[i] * u;
            let bot = c01[i] * (1.0 - u) + c11[i] * u;
            *o = top * (1.0 - v) + bot * v;
        }
        out
    }

    /// Replaces non-finite samples with 0 and clamps negatives to 0.
    /// HDR decoders occasionally hand back NaN or negative radiance.
    pub fn clamp(&mut self) {
        for v in &mut self.data {
            if !v.is_finite() || *v < 0.0 {
                *v = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_roundtrip() {
        let mut img = Image::new(4, 2);
        img.put_pixel(3, 1, [1.0, 2.0, 3.0]);
        assert_eq!(img.get_pixel(3, 1), [1.0, 2.0, 3.0]);
        assert_eq!(img.get_pixel(0, 0), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_clamp_removes_bad_samples() {
        let mut img = Image::from_data(2, 1, vec![1.0, -0.5, f32::NAN, f32::INFINITY, 0.25, 2.0]);
        img.clamp();
        assert_eq!(img.data(), &[1.0, 0.0, 0.0, 0.0, 0.25, 2.0]);
    }

    #[test]
    fn test_filter_at_center_is_exact() {
        let mut img = Image::new(2, 2);
        img.put_pixel(0, 0, [1.0, 0.0, 0.0]);
        img.put_pixel(1, 0, [0.0, 1.0, 0.0]);
        // dead center of texel (0,0)
        let c = img.filter_at(0.5, 0.5);
        assert!((c[0] - 1.0).abs() < 1e-6);
        // halfway between the two texels
        let m = img.filter_at(1.0, 0.5);
        assert!((m[0] - 0.5).abs() < 1e-6 && (m[1] - 0.5).abs() < 1e-6);
    }
}
