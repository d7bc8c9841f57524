//! Image registration
//!
//! Measures how far image content moved between a reference frame and a
//! comparison frame. A failed measurement is an error, never a zero shift.

use image::GrayImage;
use sbemkit_core::ShiftVector;
use thiserror::Error;

/// Registration failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// The two frames have different dimensions
    #[error("Frame sizes differ: {reference:?} vs {comparison:?}")]
    SizeMismatch {
        /// Reference frame (width, height).
        reference: (u32, u32),
        /// Comparison frame (width, height).
        comparison: (u32, u32),
    },

    /// A frame has no contrast to match against
    #[error("The {frame} frame has no structure to register against")]
    Featureless {
        /// Which frame ("reference" or "comparison").
        frame: &'static str,
    },

    /// No candidate shift produced a usable correlation
    #[error("No correlation peak within ±{max_shift} px")]
    NoPeak {
        /// Search radius used.
        max_shift: u32,
    },
}

/// Computes the pixel displacement of `comparison` relative to `reference`
pub trait ImageRegistration: Send + Sync {
    /// Shift that maps features in `reference` onto `comparison`.
    fn shift(
        &self,
        reference: &GrayImage,
        comparison: &GrayImage,
    ) -> Result<ShiftVector, RegistrationError>;
}

/// Zero-normalised cross-correlation over a square search window, refined
/// to sub-pixel precision with a parabola through the peak and its
/// neighbours.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationRegistration {
    /// Largest displacement searched along each axis (px).
    pub max_shift: u32,
    /// Minimum fraction of the frame that must overlap for a candidate.
    pub min_overlap: f64,
}

impl Default for CorrelationRegistration {
    fn default() -> Self {
        Self {
            max_shift: 24,
            min_overlap: 0.25,
        }
    }
}

struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_image(image: &GrayImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            data: image.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    fn variance(&self) -> f64 {
        let n = self.data.len().max(1) as f64;
        let mean = self.data.iter().map(|&v| v as f64).sum::<f64>() / n;
        self.data
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / n
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x] as f64
    }
}

impl CorrelationRegistration {
    /// Create with a given search radius.
    pub fn new(max_shift: u32) -> Self {
        Self {
            max_shift,
            ..Default::default()
        }
    }

    /// ZNCC between `a(x, y)` and `b(x + dx, y + dy)` over their overlap.
    fn score(&self, a: &Plane, b: &Plane, dx: i64, dy: i64) -> Option<f64> {
        let (w, h) = (a.width as i64, a.height as i64);
        let x0 = (-dx).max(0);
        let x1 = (w - dx).min(w);
        let y0 = (-dy).max(0);
        let y1 = (h - dy).min(h);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        let n = ((x1 - x0) * (y1 - y0)) as f64;
        if n < self.min_overlap * (w * h) as f64 {
            return None;
        }

        let (mut sa, mut sb, mut saa, mut sbb, mut sab) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for y in y0..y1 {
            for x in x0..x1 {
                let va = a.at(x as usize, y as usize);
                let vb = b.at((x + dx) as usize, (y + dy) as usize);
                sa += va;
                sb += vb;
                saa += va * va;
                sbb += vb * vb;
                sab += va * vb;
            }
        }
        let cov = sab - sa * sb / n;
        let var_a = saa - sa * sa / n;
        let var_b = sbb - sb * sb / n;
        if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
            return None;
        }
        Some(cov / (var_a * var_b).sqrt())
    }
}

/// Vertex offset of the parabola through three equally spaced samples.
fn parabola_offset(left: Option<f64>, centre: f64, right: Option<f64>) -> f64 {
    match (left, right) {
        (Some(l), Some(r)) => {
            let denom = l - 2.0 * centre + r;
            if denom < 0.0 {
                (0.5 * (l - r) / denom).clamp(-0.5, 0.5)
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

impl ImageRegistration for CorrelationRegistration {
    fn shift(
        &self,
        reference: &GrayImage,
        comparison: &GrayImage,
    ) -> Result<ShiftVector, RegistrationError> {
        if reference.dimensions() != comparison.dimensions() {
            return Err(RegistrationError::SizeMismatch {
                reference: reference.dimensions(),
                comparison: comparison.dimensions(),
            });
        }
        let a = Plane::from_image(reference);
        let b = Plane::from_image(comparison);
        if a.variance() < 1e-6 {
            return Err(RegistrationError::Featureless { frame: "reference" });
        }
        if b.variance() < 1e-6 {
            return Err(RegistrationError::Featureless { frame: "comparison" });
        }

        let radius = (self.max_shift as i64)
            .min(a.width as i64 / 2)
            .min(a.height as i64 / 2);
        let side = (2 * radius + 1) as usize;
        let mut scores = vec![None; side * side];
        let mut best: Option<(usize, usize, f64)> = None;
        for (j, dy) in (-radius..=radius).enumerate() {
            for (i, dx) in (-radius..=radius).enumerate() {
                let score = self.score(&a, &b, dx, dy);
                scores[j * side + i] = score;
                if let Some(s) = score {
                    if best.is_none_or(|(_, _, top)| s > top) {
                        best = Some((i, j, s));
                    }
                }
            }
        }

        let (i, j, peak) = best.ok_or(RegistrationError::NoPeak {
            max_shift: self.max_shift,
        })?;
        let sample = |i: Option<usize>, j: Option<usize>| match (i, j) {
            (Some(i), Some(j)) if i < side && j < side => scores[j * side + i],
            _ => None,
        };
        let sub_x = parabola_offset(
            sample(i.checked_sub(1), Some(j)),
            peak,
            sample(Some(i + 1), Some(j)),
        );
        let sub_y = parabola_offset(
            sample(Some(i), j.checked_sub(1)),
            peak,
            sample(Some(i), Some(j + 1)),
        );

        let shift = ShiftVector::new(
            i as f64 - radius as f64 + sub_x,
            j as f64 - radius as f64 + sub_y,
        );
        tracing::debug!("Registered shift {} (peak {:.3})", shift, peak);
        Ok(shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blob_image(cx: f64, cy: f64) -> GrayImage {
        GrayImage::from_fn(48, 48, |x, y| {
            let r2 = (x as f64 - cx).powi(2) + (y as f64 - cy).powi(2);
            let r2b = (x as f64 - cx - 9.0).powi(2) + (y as f64 - cy + 6.0).powi(2);
            let v = 20.0 + 200.0 * (-r2 / 8.0).exp() + 120.0 * (-r2b / 12.0).exp();
            Luma([v.round().clamp(0.0, 255.0) as u8])
        })
    }

    #[test]
    fn test_integer_shift() {
        let reg = CorrelationRegistration::new(12);
        let shift = reg
            .shift(&blob_image(20.0, 24.0), &blob_image(26.0, 21.0))
            .expect("registration");
        assert!((shift.dx - 6.0).abs() < 0.3, "dx = {}", shift.dx);
        assert!((shift.dy + 3.0).abs() < 0.3, "dy = {}", shift.dy);
    }

    #[test]
    fn test_flat_frame_is_an_error() {
        let flat = GrayImage::from_pixel(48, 48, Luma([100]));
        let reg = CorrelationRegistration::default();
        assert_eq!(
            reg.shift(&flat, &blob_image(20.0, 20.0)),
            Err(RegistrationError::Featureless { frame: "reference" })
        );
    }

    #[test]
    fn test_size_mismatch() {
        let reg = CorrelationRegistration::default();
        let small = GrayImage::from_pixel(10, 10, Luma([0]));
        assert!(matches!(
            reg.shift(&small, &blob_image(20.0, 20.0)),
            Err(RegistrationError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_parabola_offset() {
        assert_eq!(parabola_offset(Some(0.5), 1.0, Some(0.5)), 0.0);
        assert!(parabola_offset(Some(0.8), 1.0, Some(0.9)) > 0.0);
        assert_eq!(parabola_offset(None, 1.0, Some(0.9)), 0.0);
    }
}
