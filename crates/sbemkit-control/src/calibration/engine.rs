//! Stage calibration math
//!
//! Two shift vectors (image motion caused by a known stage move along X and
//! along Y) give one rotation and one scale factor per axis:
//!
//! ```text
//! rotation_x = atan(|dy_x| / |dx_x|)     rotation_y = atan(|dx_y| / |dy_y|)
//! scale_x    = d / (|shift_x| * px / 1000)
//! ```
//!
//! with `d` the stage move in µm and `px` the pixel size in nm.

use image::GrayImage;
use sbemkit_core::{Axis, CalibrationError, ShiftVector, StageCalibration, ValidationError};
use sbemkit_hardware::ImageRegistration;

/// A feature's pixel position in the reference frame and in a shifted frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPair {
    pub reference: (f64, f64),
    pub shifted: (f64, f64),
}

impl PointPair {
    pub fn new(reference: (f64, f64), shifted: (f64, f64)) -> Self {
        Self { reference, shifted }
    }

    /// Displacement from the reference position to the shifted one.
    pub fn shift(&self) -> ShiftVector {
        ShiftVector::between(
            self.reference.0,
            self.reference.1,
            self.shifted.0,
            self.shifted.1,
        )
    }
}

fn require_primary(shift: &ShiftVector, axis: Axis) -> Result<(), CalibrationError> {
    let primary = shift.primary(axis);
    if !primary.is_finite() || !shift.secondary(axis).is_finite() {
        return Err(ValidationError::invalid(format!("shift_{}", axis), "must be finite").into());
    }
    if primary == 0.0 {
        return Err(CalibrationError::DegenerateShift { axis });
    }
    Ok(())
}

/// Rotation and scale for both axes.
///
/// `shift_distance_um` is how far the stage moved along each axis;
/// `pixel_size_nm` is the pixel size of the frames the shifts were measured
/// in. A zero primary component on either axis is rejected.
pub fn compute_parameters(
    shift_x: ShiftVector,
    shift_y: ShiftVector,
    shift_distance_um: f64,
    pixel_size_nm: f64,
) -> Result<StageCalibration, CalibrationError> {
    let distance = ValidationError::require_positive("shift_distance", shift_distance_um)?;
    let pixel_um = ValidationError::require_positive("pixel_size", pixel_size_nm)? / 1000.0;
    require_primary(&shift_x, Axis::X)?;
    require_primary(&shift_y, Axis::Y)?;

    let x = shift_x.abs();
    let y = shift_y.abs();
    let calibration = StageCalibration {
        scale_x: distance / (x.norm() * pixel_um),
        scale_y: distance / (y.norm() * pixel_um),
        rotation_x: (x.dy / x.dx).atan(),
        rotation_y: (y.dx / y.dy).atan(),
    };
    tracing::debug!(
        "Calibration from shifts {} / {}: {}",
        shift_x,
        shift_y,
        calibration
    );
    Ok(calibration)
}

/// Shift vectors of the X and Y frames relative to the reference frame.
///
/// A registration failure is returned with its cause; it never becomes a
/// zero shift.
pub fn measure_shifts(
    registration: &dyn ImageRegistration,
    reference: &GrayImage,
    shifted_x: &GrayImage,
    shifted_y: &GrayImage,
) -> Result<(ShiftVector, ShiftVector), CalibrationError> {
    let measure = |axis: Axis, frame: &GrayImage| {
        registration
            .shift(reference, frame)
            .map_err(|e| CalibrationError::Registration {
                reason: format!("{} shift: {}", axis, e),
            })
    };
    Ok((measure(Axis::X, shifted_x)?, measure(Axis::Y, shifted_y)?))
}

/// Shift vectors from feature positions picked by the operator.
pub fn measure_shifts_from_points(
    x_points: PointPair,
    y_points: PointPair,
) -> Result<(ShiftVector, ShiftVector), CalibrationError> {
    let shift_x = x_points.shift();
    let shift_y = y_points.shift();
    require_primary(&shift_x, Axis::X)?;
    require_primary(&shift_y, Axis::Y)?;
    Ok((shift_x, shift_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_axis_aligned_shift() {
        // 1.6 µm move seen as 16 px at 100 nm/px: unit scale, no rotation.
        let cal = compute_parameters(
            ShiftVector::new(16.0, 0.0),
            ShiftVector::new(0.0, -16.0),
            1.6,
            100.0,
        )
        .expect("valid shifts");
        assert!((cal.scale_x - 1.0).abs() < 1e-12);
        assert!((cal.scale_y - 1.0).abs() < 1e-12);
        assert_eq!(cal.rotation_x, 0.0);
        assert_eq!(cal.rotation_y, 0.0);
    }

    #[test]
    fn test_zero_primary_is_rejected() {
        let err = compute_parameters(
            ShiftVector::new(0.0, 5.0),
            ShiftVector::new(1.0, 16.0),
            1.6,
            100.0,
        )
        .expect_err("degenerate");
        assert_eq!(err, CalibrationError::DegenerateShift { axis: Axis::X });

        let err = compute_parameters(
            ShiftVector::new(16.0, 1.0),
            ShiftVector::new(3.0, 0.0),
            1.6,
            100.0,
        )
        .expect_err("degenerate");
        assert_eq!(err, CalibrationError::DegenerateShift { axis: Axis::Y });
    }

    #[test]
    fn test_invalid_distance_is_rejected() {
        let result = compute_parameters(
            ShiftVector::new(16.0, 0.0),
            ShiftVector::new(0.0, 16.0),
            0.0,
            100.0,
        );
        assert!(matches!(result, Err(CalibrationError::Validation(_))));
    }

    #[test]
    fn test_points_with_no_primary_motion() {
        let x = PointPair::new((10.0, 10.0), (10.0, 25.0));
        let y = PointPair::new((10.0, 10.0), (12.0, 30.0));
        assert_eq!(
            measure_shifts_from_points(x, y),
            Err(CalibrationError::DegenerateShift { axis: Axis::X })
        );

        let x = PointPair::new((10.0, 10.0), (26.0, 11.0));
        let (sx, sy) = measure_shifts_from_points(x, y).expect("valid");
        assert_eq!(sx, ShiftVector::new(16.0, 1.0));
        assert_eq!(sy, ShiftVector::new(2.0, 20.0));
    }

    fn component() -> impl Strategy<Value = f64> {
        prop_oneof![-500.0..-0.01f64, 0.01..500.0f64]
    }

    proptest! {
        #[test]
        fn prop_deterministic_and_scale_invariant(
            xdx in component(), xdy in -500.0..500.0f64,
            ydx in -500.0..500.0f64, ydy in component(),
            dist in 0.1..100.0f64, px in 1.0..1000.0f64,
        ) {
            let sx = ShiftVector::new(xdx, xdy);
            let sy = ShiftVector::new(ydx, ydy);
            let a = compute_parameters(sx, sy, dist, px).unwrap();
            let b = compute_parameters(sx, sy, dist, px).unwrap();
            prop_assert_eq!(a, b);

            let doubled = compute_parameters(sx, sy, 2.0 * dist, 2.0 * px).unwrap();
            prop_assert!((doubled.scale_x - a.scale_x).abs() <= 1e-12 * a.scale_x);
            prop_assert!((doubled.scale_y - a.scale_y).abs() <= 1e-12 * a.scale_y);
            prop_assert_eq!(doubled.rotation_x, a.rotation_x);
            prop_assert_eq!(doubled.rotation_y, a.rotation_y);
        }

        #[test]
        fn prop_rotation_in_first_quadrant(
            xdx in component(), xdy in -500.0..500.0f64,
            ydx in -500.0..500.0f64, ydy in component(),
        ) {
            let cal = compute_parameters(
                ShiftVector::new(xdx, xdy),
                ShiftVector::new(ydx, ydy),
                1.6,
                100.0,
            ).unwrap();
            prop_assert!((0.0..FRAC_PI_2).contains(&cal.rotation_x));
            prop_assert!((0.0..FRAC_PI_2).contains(&cal.rotation_y));
            prop_assert!(cal.validate().is_ok());
        }
    }
}
