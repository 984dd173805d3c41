//! Scaled rigid-body transforms.
//!
//! Every entity in the scene, every device pose and every world anchor is
//! described by a [`Transform3D`]: a translation, a unit-quaternion rotation
//! and a per-axis scale.  Points are mapped by scaling, then rotating, then
//! translating.
//!
//! Pose providers usually hand out column-major 4x4 matrices; see
//! [`Transform3D::from_matrix`] and [`Transform3D::to_matrix`].
//!
//! # Example
//!
//! ```rust
//! use anchorsight_perception::transform::{Quaternion, Transform3D, Vec3};
//!
//! // Device 1.6 m above the world origin, looking straight ahead.
//! let device = Transform3D::from_translation(Vec3::new(0.0, 1.6, 0.0));
//!
//! // Ray origin tilted 15° downwards, parented to the device.
//! let tilt = Transform3D::from_rotation(Quaternion::from_axis_angle(
//!     Vec3::new(1.0, 0.0, 0.0),
//!     -15f32.to_radians(),
//! ));
//!
//! let ray_origin = device.compose(tilt);
//! let forward = ray_origin.z_axis().neg().normalize();
//! assert!(forward.y < 0.0 && forward.z < 0.0);
//! ```

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Create a new vector.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// `(1, 1, 1)`, the neutral scale.
    pub const fn one() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }

    /// Multiply every component by `s`.
    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    /// Component-wise product.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction.  The zero vector is returned
    /// unchanged.
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            self
        } else {
            self.scale(1.0 / len)
        }
    }

    pub fn min(self, rhs: Self) -> Self {
        Self::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    pub fn max(self, rhs: Self) -> Self {
        Self::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle_rad` radians (right-handed) around `axis`.
    pub fn from_axis_angle(axis: Vec3, angle_rad: f32) -> Self {
        let axis = axis.normalize();
        let (sin, cos) = (angle_rad * 0.5).sin_cos();
        Self::new(cos, axis.x * sin, axis.y * sin, axis.z * sin)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rescale to unit length, guarding against drift after many products.
    pub fn normalize(self) -> Self {
        let norm = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if norm <= f32::EPSILON {
            Self::identity()
        } else {
            Self::new(self.w / norm, self.x / norm, self.y / norm, self.z / norm)
        }
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Build a rotation from three orthonormal basis columns.
    fn from_basis(c0: Vec3, c1: Vec3, c2: Vec3) -> Self {
        // r[row][col]
        let r = [[c0.x, c1.x, c2.x], [c0.y, c1.y, c2.y], [c0.z, c1.z, c2.z]];
        let trace = r[0][0] + r[1][1] + r[2][2];
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new(
                0.25 * s,
                (r[2][1] - r[1][2]) / s,
                (r[0][2] - r[2][0]) / s,
                (r[1][0] - r[0][1]) / s,
            )
        } else if r[0][0] > r[1][1] && r[0][0] > r[2][2] {
            let s = (1.0 + r[0][0] - r[1][1] - r[2][2]).sqrt() * 2.0;
            Self::new(
                (r[2][1] - r[1][2]) / s,
                0.25 * s,
                (r[0][1] + r[1][0]) / s,
                (r[0][2] + r[2][0]) / s,
            )
        } else if r[1][1] > r[2][2] {
            let s = (1.0 + r[1][1] - r[0][0] - r[2][2]).sqrt() * 2.0;
            Self::new(
                (r[0][2] - r[2][0]) / s,
                (r[0][1] + r[1][0]) / s,
                0.25 * s,
                (r[1][2] + r[2][1]) / s,
            )
        } else {
            let s = (1.0 + r[2][2] - r[0][0] - r[1][1]).sqrt() * 2.0;
            Self::new(
                (r[1][0] - r[0][1]) / s,
                (r[0][2] + r[2][0]) / s,
                (r[1][2] + r[2][1]) / s,
                0.25 * s,
            )
        };
        q.normalize()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D transform: scale, then rotation, then translation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, scale it by `scale`, rotate it by
/// `rotation` then add `translation`.
///
/// Composition and inversion are exact for uniform scale, which is all the
/// scene ever uses for placed content.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
    pub scale: Vec3,
}

/// A column-major 4x4 matrix: `m[column][row]`.
pub type Matrix4 = [[f32; 4]; 4];

impl Transform3D {
    /// Create a unit-scale transform from a translation and rotation.
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
            scale: Vec3::one(),
        }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quaternion::identity())
    }

    pub fn from_rotation(rotation: Quaternion) -> Self {
        Self::new(Vec3::zero(), rotation)
    }

    /// Replace the scale component.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Compose two transforms: `self` applied first, then `other`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self
            .translation
            .add(self.rotation.rotate(self.scale.mul(other.translation)));
        let rotated = self.rotation.mul(other.rotation).normalize();
        Self {
            translation: translated,
            rotation: rotated,
            scale: self.scale.mul(other.scale),
        }
    }

    /// The inverse transform, so that `t.inverse().compose(t)` is identity.
    pub fn inverse(self) -> Self {
        let inv_scale = Vec3::new(1.0 / self.scale.x, 1.0 / self.scale.y, 1.0 / self.scale.z);
        let inv_rotation = self.rotation.conjugate();
        let inv_translation = inv_scale.mul(inv_rotation.rotate(self.translation)).neg();
        Self {
            translation: inv_translation,
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// Map a point from this transform's local frame into its parent frame.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.translation.add(self.rotation.rotate(self.scale.mul(p)))
    }

    /// Local +X axis expressed in the parent frame (scaled).
    pub fn x_axis(&self) -> Vec3 {
        self.rotation.rotate(Vec3::new(self.scale.x, 0.0, 0.0))
    }

    /// Local +Y axis expressed in the parent frame (scaled).
    pub fn y_axis(&self) -> Vec3 {
        self.rotation.rotate(Vec3::new(0.0, self.scale.y, 0.0))
    }

    /// Local +Z axis expressed in the parent frame (scaled).  Content faces
    /// down −Z, so the forward direction is `z_axis().neg()`.
    pub fn z_axis(&self) -> Vec3 {
        self.rotation.rotate(Vec3::new(0.0, 0.0, self.scale.z))
    }

    /// Column-major 4x4 matrix equivalent of this transform.
    pub fn to_matrix(&self) -> Matrix4 {
        let (x, y, z, t) = (self.x_axis(), self.y_axis(), self.z_axis(), self.translation);
        [
            [x.x, x.y, x.z, 0.0],
            [y.x, y.y, y.z, 0.0],
            [z.x, z.y, z.z, 0.0],
            [t.x, t.y, t.z, 1.0],
        ]
    }

    /// Decompose a column-major affine matrix (no shear) into a transform.
    pub fn from_matrix(m: &Matrix4) -> Self {
        let column = |i: usize| Vec3::new(m[i][0], m[i][1], m[i][2]);
        let (c0, c1, c2) = (column(0), column(1), column(2));
        let scale = Vec3::new(c0.length(), c1.length(), c2.length());
        let rotation = Quaternion::from_basis(c0.normalize(), c1.normalize(), c2.normalize());
        Self {
            translation: column(3),
            rotation,
            scale,
        }
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_1_SQRT_2, FRAC_PI_2};

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert!((a.x - b.x).abs() < 1e-4, "x: {} vs {}", a.x, b.x);
        assert!((a.y - b.y).abs() < 1e-4, "y: {} vs {}", a.y, b.y);
        assert!((a.z - b.z).abs() < 1e-4, "z: {} vs {}", a.z, b.z);
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_identity_rotate_is_noop() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_vec_eq(Quaternion::identity().rotate(v), v);
    }

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        assert_vec_eq(q.rotate(Vec3::new(1.0, 0.0, 0.0)), Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn axis_angle_matches_explicit_quaternion() {
        let q = Quaternion::from_axis_angle(Vec3::new(0.0, 0.0, 2.0), FRAC_PI_2);
        assert!((q.w - FRAC_1_SQRT_2).abs() < 1e-5);
        assert!((q.z - FRAC_1_SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn negative_pitch_tilts_forward_downwards() {
        let q = Quaternion::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), -15f32.to_radians());
        let forward = q.rotate(Vec3::new(0.0, 0.0, -1.0));
        let (sin, cos) = 15f32.to_radians().sin_cos();
        assert_vec_eq(forward, Vec3::new(0.0, -sin, -cos));
    }

    #[test]
    fn quaternion_conjugate_is_inverse() {
        let q = Quaternion::from_axis_angle(Vec3::new(0.3, 1.0, -0.2), 1.1);
        let prod = q.mul(q.conjugate());
        assert!((prod.w - 1.0).abs() < 1e-5);
        assert!(prod.x.abs() < 1e-5 && prod.y.abs() < 1e-5 && prod.z.abs() < 1e-5);
    }

    // ── Transform3D ─────────────────────────────────────────────────────────

    #[test]
    fn transform_compose_translations_add() {
        let t1 = Transform3D::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let t2 = Transform3D::from_translation(Vec3::new(2.0, 0.0, 0.0));
        assert_vec_eq(t1.compose(t2).translation, Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn compose_respects_parent_rotation_and_scale() {
        let q90z = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let parent = Transform3D::from_rotation(q90z).with_scale(Vec3::new(2.0, 2.0, 2.0));
        let child = Transform3D::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let world = parent.compose(child);
        assert_vec_eq(world.translation, Vec3::new(0.0, 2.0, 0.0));
        assert_vec_eq(world.scale, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn inverse_undoes_transform() {
        let t = Transform3D::new(
            Vec3::new(1.0, -2.0, 0.5),
            Quaternion::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), 0.7),
        )
        .with_scale(Vec3::new(1.5, 1.5, 1.5));
        let p = Vec3::new(0.3, 0.4, -0.9);
        let round = t.inverse().transform_point(t.transform_point(p));
        assert_vec_eq(round, p);
    }

    #[test]
    fn matrix_roundtrip_preserves_pose() {
        let t = Transform3D::new(
            Vec3::new(-1.0, 1.6, 2.0),
            Quaternion::from_axis_angle(Vec3::new(0.2, 1.0, 0.1), 2.4),
        )
        .with_scale(Vec3::new(0.5, 0.5, 0.5));
        let back = Transform3D::from_matrix(&t.to_matrix());
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_vec_eq(back.transform_point(p), t.transform_point(p));
        assert_vec_eq(back.scale, t.scale);
    }

    #[test]
    fn matrix_translation_lives_in_last_column() {
        let t = Transform3D::from_translation(Vec3::new(4.0, 5.0, 6.0));
        let m = t.to_matrix();
        assert_eq!([m[3][0], m[3][1], m[3][2], m[3][3]], [4.0, 5.0, 6.0, 1.0]);
    }

    #[test]
    fn normalize_zero_vector_is_noop() {
        assert_eq!(Vec3::zero().normalize(), Vec3::zero());
    }
}
