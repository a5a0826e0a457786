//! Absolute-coordinate calibration matrix (spec §4.2).

use crate::utils::{Calibrated, Point, Raw};

use super::raw::AbsInfo;

/// A 3x3 affine transform matrix, stored row-major with the implicit
/// bottom row `[0, 0, 1]` per spec §4.2.
///
/// `CalibrationMatrix` itself is just the linear algebra; [`EffectiveCalibration`]
/// is what a device actually keeps, since applying a user matrix requires
/// knowing the device's absolute range to normalize against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationMatrix {
    rows: [[f64; 3]; 3],
}

const IDENTITY_ROWS: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

impl Default for CalibrationMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl CalibrationMatrix {
    /// The identity matrix.
    pub fn identity() -> Self {
        CalibrationMatrix { rows: IDENTITY_ROWS }
    }

    /// Build a matrix from the 6 row-major coefficients `a, b, c, d, e, f`
    /// of the top two rows, with an implicit bottom row `[0, 0, 1]`.
    pub fn from_6_floats(coeffs: [f32; 6]) -> Self {
        let [a, b, c, d, e, f] = coeffs.map(|v| v as f64);
        CalibrationMatrix {
            rows: [[a, b, c], [d, e, f], [0.0, 0.0, 1.0]],
        }
    }

    /// The 6 row-major coefficients of the top two rows.
    pub fn to_6_floats(self) -> [f32; 6] {
        let r = self.rows;
        [
            r[0][0] as f32,
            r[0][1] as f32,
            r[0][2] as f32,
            r[1][0] as f32,
            r[1][1] as f32,
            r[1][2] as f32,
        ]
    }

    /// Bit-exact check against the identity matrix.
    pub fn is_identity(&self) -> bool {
        self.rows == IDENTITY_ROWS
    }

    /// Matrix product `self * other`, applied right-to-left to coordinates
    /// (i.e. `other` is applied first).
    pub fn multiply(&self, other: &CalibrationMatrix) -> CalibrationMatrix {
        let mut rows = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                rows[i][j] = (0..3).map(|k| self.rows[i][k] * other.rows[k][j]).sum();
            }
        }
        CalibrationMatrix { rows }
    }

    /// Apply the transform to a raw device coordinate.
    pub fn apply(&self, p: Point<i32, Raw>) -> Point<f64, Calibrated> {
        let (x, y) = (p.x as f64, p.y as f64);
        let r = &self.rows;
        (
            r[0][0] * x + r[0][1] * y + r[0][2],
            r[1][0] * x + r[1][1] * y + r[1][2],
        )
            .into()
    }
}

/// Normalize a device's absolute range `[min, min + span)` to the unit
/// square, or its inverse (spec §4.2: "Normalize"/"Unnormalize").
fn normalize(x_span: i32, y_span: i32, x_min: i32, y_min: i32) -> CalibrationMatrix {
    let (sx, sy) = (x_span as f64, y_span as f64);
    CalibrationMatrix {
        rows: [
            [1.0 / sx, 0.0, -(x_min as f64) / sx],
            [0.0, 1.0 / sy, -(y_min as f64) / sy],
            [0.0, 0.0, 1.0],
        ],
    }
}

fn unnormalize(x_span: i32, y_span: i32, x_min: i32, y_min: i32) -> CalibrationMatrix {
    let (sx, sy) = (x_span as f64, y_span as f64);
    CalibrationMatrix {
        rows: [
            [sx, 0.0, x_min as f64],
            [0.0, sy, y_min as f64],
            [0.0, 0.0, 1.0],
        ],
    }
}

/// The three matrices a device with absolute axes keeps (spec §3, §4.2):
/// the user-supplied matrix, the environment-provided default, and the
/// effective composition actually applied to coordinates.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveCalibration {
    user: CalibrationMatrix,
    default: CalibrationMatrix,
    effective: CalibrationMatrix,
    apply_calibration: bool,
}

impl Default for EffectiveCalibration {
    fn default() -> Self {
        EffectiveCalibration {
            user: CalibrationMatrix::identity(),
            default: CalibrationMatrix::identity(),
            effective: CalibrationMatrix::identity(),
            apply_calibration: false,
        }
    }
}

impl EffectiveCalibration {
    /// Set the user calibration matrix given the device's absolute range
    /// on both axes, recomputing the effective matrix (spec §4.2).
    pub fn set_user_matrix(&mut self, matrix: CalibrationMatrix, abs_x: &AbsInfo, abs_y: &AbsInfo) {
        self.user = matrix;
        self.recompute(matrix, abs_x, abs_y);
    }

    /// Set the environment-provided default matrix, applying it as both
    /// the default and the effective matrix (spec §6: "Environment-driven defaults").
    pub fn set_default_matrix(&mut self, matrix: CalibrationMatrix, abs_x: &AbsInfo, abs_y: &AbsInfo) {
        self.default = matrix;
        self.user = matrix;
        self.recompute(matrix, abs_x, abs_y);
    }

    fn recompute(&mut self, user: CalibrationMatrix, abs_x: &AbsInfo, abs_y: &AbsInfo) {
        let norm = normalize(abs_x.span(), abs_y.span(), abs_x.minimum, abs_y.minimum);
        let unnorm = unnormalize(abs_x.span(), abs_y.span(), abs_x.minimum, abs_y.minimum);
        self.effective = unnorm.multiply(&user).multiply(&norm);
        self.apply_calibration = !user.is_identity();
    }

    /// The user-supplied matrix, returned bit-exact (spec P6).
    pub fn user_matrix(&self) -> CalibrationMatrix {
        self.user
    }

    /// The environment-provided default matrix.
    pub fn default_matrix(&self) -> CalibrationMatrix {
        self.default
    }

    /// Whether the effective matrix is anything other than identity (I5).
    pub fn applies_calibration(&self) -> bool {
        self.apply_calibration
    }

    /// Transform a raw device coordinate. A no-op when the effective
    /// matrix is identity (spec I5, P5).
    pub fn transform(&self, p: Point<i32, Raw>) -> Point<f64, Calibrated> {
        if self.apply_calibration {
            self.effective.apply(p)
        } else {
            p.to_f64().cast()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn abs(min: i32, max: i32) -> AbsInfo {
        AbsInfo {
            value: 0,
            minimum: min,
            maximum: max,
            fuzz: 0,
            flat: 0,
            resolution: 0,
        }
    }

    #[test]
    fn identity_is_noop() {
        let cal = EffectiveCalibration::default();
        assert_eq!(cal.transform((750, 1250).into()), (750.0, 1250.0).into());
        assert!(!cal.applies_calibration());
    }

    #[test]
    fn round_trip_user_matrix() {
        let mut cal = EffectiveCalibration::default();
        let m = CalibrationMatrix::from_6_floats([1.2, 3.4, 5.6, 7.8, 9.10, 11.12]);
        cal.set_user_matrix(m, &abs(0, 1500), &abs(0, 2500));
        assert_eq!(cal.user_matrix(), m);
        assert_eq!(cal.user_matrix().to_6_floats(), m.to_6_floats());
    }

    #[test]
    fn calibration_applied_to_raw_point() {
        // x: min=0 max=1023 (span 1024 = 2^10), y: min=0 max=511 (span 512
        // = 2^9). Every span here is a power of two, so Normalize's
        // divisions are exact binary fractions and the expected value
        // below is computed independently by hand, not by calling
        // normalize/unnormalize/multiply/apply themselves: for this
        // input, effective = [[2.0, 0.0, 256.0], [0.0, 3.0, 256.0], [0, 0,
        // 1]] (Unnormalize's diagonal scale cancels Normalize's exactly on
        // the linear terms, and scales M's translation terms by the same
        // factor Normalize divided them by: 0.25*1024 = 0.5*512 = 256).
        let mut cal = EffectiveCalibration::default();
        let m = CalibrationMatrix::from_6_floats([2.0, 0.0, 0.25, 0.0, 3.0, 0.5]);
        let abs_x = abs(0, 1023);
        let abs_y = abs(0, 511);
        cal.set_user_matrix(m, &abs_x, &abs_y);
        assert!(cal.applies_calibration());

        assert_eq!(cal.transform((512, 256).into()), (1280.0, 1024.0).into());
    }

    #[test]
    fn matrix_multiply_by_identity_is_identity() {
        let m = CalibrationMatrix::from_6_floats([1.2, 3.4, 5.6, 7.8, 9.10, 11.12]);
        assert_eq!(m.multiply(&CalibrationMatrix::identity()), m);
        assert_eq!(CalibrationMatrix::identity().multiply(&m), m);
    }
}
