//! Root-space transforms and rotation encodings.
//!
//! A [`RootTransform`] is the character's ground-projected root: a translation
//! with `y = 0` followed by a rotation about +Y. Every feature the pipeline
//! exports is expressed relative to one of these. The 2D projections used by
//! the trajectory features map world `(x, z)` onto `(x, y)`.

use glam::{Mat3, Mat4, Quat, Vec2, Vec3};

use super::animation::{Animation, Skeleton};

/// Canonical forward direction of an unrotated root.
pub const FORWARD: Vec3 = Vec3::Z;

/// Drop the vertical component of `v`.
#[inline]
pub fn project_on_ground(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Rigid ground transform with a cached inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootTransform {
    matrix: Mat4,
    inverse: Mat4,
}

impl Default for RootTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RootTransform {
    pub const IDENTITY: Self = Self {
        matrix: Mat4::IDENTITY,
        inverse: Mat4::IDENTITY,
    };

    /// Build `translate(position) * rotate(rotation)`.
    ///
    /// The caller is responsible for passing a ground position and a yaw-only
    /// rotation; the transform itself does not enforce either.
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        let matrix = Mat4::from_rotation_translation(rotation.normalize(), position);
        Self {
            matrix,
            inverse: matrix.inverse(),
        }
    }

    /// Root at `position` (projected on the ground) facing `yaw` radians
    /// away from +Z, counter-clockwise seen from above.
    pub fn from_yaw(position: Vec3, yaw: f32) -> Self {
        Self::new(project_on_ground(position), Quat::from_rotation_y(yaw))
    }

    #[inline]
    pub fn matrix(&self) -> &Mat4 {
        &self.matrix
    }

    #[inline]
    pub fn inverse(&self) -> &Mat4 {
        &self.inverse
    }

    #[inline]
    pub fn translation(&self) -> Vec3 {
        self.matrix.w_axis.truncate()
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_mat4(&self.matrix)
    }

    /// World-space direction the root faces.
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.matrix.transform_vector3(FORWARD)
    }

    /// Heading in radians, `atan2(forward.x, forward.z)`.
    pub fn yaw(&self) -> f32 {
        let f = self.forward();
        f.x.atan2(f.z)
    }

    /// World point into root space: subtract the translation, then un-rotate.
    #[inline]
    pub fn local_position(&self, point: Vec3) -> Vec3 {
        self.inverse.transform_point3(point)
    }

    /// World direction into root space. Only the rotation is undone.
    #[inline]
    pub fn local_direction(&self, direction: Vec3) -> Vec3 {
        self.inverse.transform_vector3(direction)
    }

    /// Velocities transform like directions.
    #[inline]
    pub fn local_velocity(&self, velocity: Vec3) -> Vec3 {
        self.local_direction(velocity)
    }

    /// Root-space point back into world space.
    #[inline]
    pub fn world_position(&self, local: Vec3) -> Vec3 {
        self.matrix.transform_point3(local)
    }

    #[inline]
    pub fn world_direction(&self, local: Vec3) -> Vec3 {
        self.matrix.transform_vector3(local)
    }

    /// Ground position of `other` in this root's frame, as `(x, z)`.
    pub fn relative_position(&self, other: &RootTransform) -> Vec2 {
        let p = self.local_position(other.translation());
        Vec2::new(p.x, p.z)
    }

    /// Facing of `other` in this root's frame, as a unit `(x, z)` vector.
    pub fn relative_forward(&self, other: &RootTransform) -> Vec2 {
        let f = self.local_direction(other.forward());
        Vec2::new(f.x, f.z).normalize_or_zero()
    }

    /// Signed angle from local forward `(0, 1)` to `other`'s relative
    /// forward. Counter-clockwise is positive.
    pub fn relative_angle(&self, other: &RootTransform) -> f32 {
        signed_angle(Vec2::Y, self.relative_forward(other))
    }
}

/// Signed angle from `from` to `to`, `atan2(perp_dot, dot)`.
#[inline]
pub fn signed_angle(from: Vec2, to: Vec2) -> f32 {
    from.perp_dot(to).atan2(from.dot(to))
}

/// Continuous 6D rotation encoding: the first two columns of a rotation
/// matrix, `[c0.x, c0.y, c0.z, c1.x, c1.y, c1.z]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation6D(pub [f32; 6]);

impl Rotation6D {
    pub const IDENTITY: Self = Self([1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);

    /// Encode a world rotation relative to `root`.
    pub fn from_world(rotation: Quat, root: &RootTransform) -> Self {
        let m = Mat3::from_quat(rotation.normalize());
        let c0 = root.local_direction(m.x_axis.normalize());
        let c1 = root.local_direction(m.y_axis.normalize());
        Self([c0.x, c0.y, c0.z, c1.x, c1.y, c1.z])
    }

    /// Encode a rotation as-is.
    pub fn from_quat(rotation: Quat) -> Self {
        Self::from_world(rotation, &RootTransform::IDENTITY)
    }

    #[inline]
    pub fn first_column(&self) -> Vec3 {
        Vec3::new(self.0[0], self.0[1], self.0[2])
    }

    #[inline]
    pub fn second_column(&self) -> Vec3 {
        Vec3::new(self.0[3], self.0[4], self.0[5])
    }

    /// Rebuild the full rotation matrix with Gram-Schmidt.
    pub fn to_mat3(&self) -> Mat3 {
        let x = self.first_column().normalize();
        let y = (self.second_column() - x * x.dot(self.second_column())).normalize();
        Mat3::from_cols(x, y, x.cross(y))
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// World transforms of every bone at `frame`.
///
/// Bones are visited parent-first, so each world transform is the parent's
/// world transform times the bone's local track sample. Bones without a track
/// use the identity as their local transform.
pub fn forward_kinematics(skeleton: &Skeleton, animation: &Animation, frame: usize) -> Vec<Mat4> {
    let mut world = vec![Mat4::IDENTITY; skeleton.num_bones()];
    for &bone in skeleton.traversal_order() {
        let local = animation
            .tracks
            .get(bone)
            .map_or(Mat4::IDENTITY, |track| track.local_transform(frame));
        world[bone] = match skeleton.parent(bone) {
            Some(parent) => world[parent] * local,
            None => local,
        };
    }
    world
}

/// World rotation part of a transform produced by [`forward_kinematics`].
#[inline]
pub fn world_rotation(transform: &Mat4) -> Quat {
    let (_, rotation, _) = transform.to_scale_rotation_translation();
    rotation
}
