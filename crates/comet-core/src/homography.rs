use std::ops::Mul;

use crate::consts::{DRIZZLE_PIXEL_CENTER_SHIFT, SINGULAR_EPSILON};
use crate::error::{CometError, Result};
use crate::frame::Delta;

/// 3x3 projective transform mapping output pixel coordinates to source
/// sampling coordinates.
///
/// ```text
/// | m00 m01 m02 |
/// | m10 m11 m12 |
/// | m20 m21 m22 |
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    m: [[f64; 3]; 3],
}

impl Default for Homography {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Homography {
    pub const IDENTITY: Homography = Homography {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    pub fn new(m: [[f64; 3]; 3]) -> Self {
        Self { m }
    }

    pub fn from_row_major(values: [f64; 9]) -> Self {
        Self {
            m: [
                [values[0], values[1], values[2]],
                [values[3], values[4], values[5]],
                [values[6], values[7], values[8]],
            ],
        }
    }

    pub fn to_row_major(&self) -> [f64; 9] {
        let m = &self.m;
        [
            m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
        ]
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            m: [[1.0, 0.0, dx], [0.0, 1.0, dy], [0.0, 0.0, 1.0]],
        }
    }

    /// Comet motion matrix for a frame displaced by `delta` from the reference.
    pub fn from_delta(delta: Delta) -> Self {
        Self::translation(delta.dx, delta.dy)
    }

    /// Converts drizzle integration pixel coordinates to star alignment ones.
    pub fn drizzle_correction() -> Self {
        Self::translation(DRIZZLE_PIXEL_CENTER_SHIFT, DRIZZLE_PIXEL_CENTER_SHIFT)
    }

    pub fn matrix(&self) -> &[[f64; 3]; 3] {
        &self.m
    }

    /// Map a point through the transform with perspective division.
    pub fn apply(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let m = &self.m;
        let w = m[2][0] * x + m[2][1] * y + m[2][2];
        if 1.0 + w == 1.0 {
            return Err(CometError::DegenerateTransform { x, y });
        }
        Ok((
            (m[0][0] * x + m[0][1] * y + m[0][2]) / w,
            (m[1][0] * x + m[1][1] * y + m[1][2]) / w,
        ))
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Matrix inverse via the adjugate.
    pub fn inverse(&self) -> Result<Self> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < SINGULAR_EPSILON {
            return Err(CometError::SingularMatrix);
        }
        let m = &self.m;
        let inv_det = 1.0 / det;
        Ok(Self {
            m: [
                [
                    (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
                    (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
                    (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
                ],
                [
                    (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
                    (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
                    (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
                ],
                [
                    (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
                    (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
                    (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
                ],
            ],
        })
    }

    /// `self · other`, renormalized so that element [2][2] is 1.
    pub fn compose(&self, other: &Homography) -> Self {
        let mut out = [[0.0; 3]; 3];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = (0..3).map(|k| self.m[r][k] * other.m[k][c]).sum();
            }
        }
        let scale = out[2][2];
        if scale != 0.0 && scale.is_finite() {
            for value in out.iter_mut().flatten() {
                *value /= scale;
            }
        }
        Self { m: out }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Mul for Homography {
    type Output = Homography;

    fn mul(self, rhs: Homography) -> Homography {
        self.compose(&rhs)
    }
}

impl std::fmt::Display for Homography {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = &self.m;
        write!(
            f,
            "[[{:.6}, {:.6}, {:.6}], [{:.6}, {:.6}, {:.6}], [{:.6}, {:.6}, {:.6}]]",
            m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2]
        )
    }
}
