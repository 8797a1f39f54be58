//! RGBM encoding: HDR radiance in four 8-bit channels.
//!
//! The shared multiplier lives in alpha and scales the maximum
//! representable value to 16. RGB is stored with a sqrt transfer curve,
//! which spends precision on the dark end where banding shows first.
//! Decoding is `(rgb * a * 16)²`.

/// Multiplier range. With the sqrt transfer the largest representable
/// linear value is `RGBM_RANGE²`.
pub const RGBM_RANGE: f32 = 16.0;

/// Encodes one linear RGB sample to RGBM bytes.
///
/// Alpha is quantized upward so the encoded RGB stays within [0, 1];
/// rounding the multiplier down would clip the brightest channel.
pub fn encode(rgb: [f32; 3]) -> [u8; 4] {
    let r = rgb[0].max(0.0).sqrt();
    let g = rgb[1].max(0.0).sqrt();
    let b = rgb[2].max(0.0).sqrt();
    let max = r.max(g).max(b).min(RGBM_RANGE);
    let a = (max * (255.0 / RGBM_RANGE)).ceil() / 255.0;
    if a <= 0.0 {
        return [0, 0, 0, 0];
    }
    let scale = 1.0 / (a * RGBM_RANGE);
    let q = |v: f32| ((v * scale).clamp(0.0, 1.0) * 255.0).round() as u8;
    [q(r), q(g), q(b), (a * 255.0).round() as u8]
}

/// Decodes RGBM bytes back to linear RGB.
pub fn decode(rgbm: [u8; 4]) -> [f32; 3] {
    let a = rgbm[3] as f32 / 255.0;
    let d = |v: u8| {
        let c = (v as f32 / 255.0) * a * RGBM_RANGE;
        c * c
    };
    [d(rgbm[0]), d(rgbm[1]), d(rgbm[2])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_encodes_to_zero() {
        assert_eq!(encode([0.0, 0.0, 0.0]), [0, 0, 0, 0]);
        assert_eq!(decode([0, 0, 0, 0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_roundtrip_within_quantization() {
        for rgb in [
            [0.5, 0.25, 0.125],
            [1.0, 1.0, 1.0],
            [4.0, 0.01, 2.5],
            [100.0, 0.0, 0.5],
        ] {
            let back = decode(encode(rgb));
            for c in 0..3 {
                let expected = rgb[c].min(RGBM_RANGE * RGBM_RANGE);
                // sqrt curve: absolute error grows with magnitude
                let tol = 0.01 + expected * 0.03;
                assert!(
                    (back[c] - expected).abs() < tol,
                    "{:?} channel {}: {} vs {}",
                    rgb,
                    c,
                    back[c],
                    expected
                );
            }
        }
    }

    #[test]
    fn test_negative_input_clamps() {
        let e = encode([-1.0, 0.5, 0.0]);
        let back = decode(e);
        assert_eq!(back[0], 0.0);
        assert!(back[1] > 0.4);
    }
}
