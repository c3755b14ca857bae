//! Root-relative joint features.

use glam::Vec3;

use crate::core::animation::{Animation, JointVelocitySequence, PoseSequence, ReadyInputs, Skeleton};
use crate::core::transforms::{forward_kinematics, world_rotation, RootTransform, Rotation6D};

use super::trajectory::View;

/// Floats per joint: position (3), 6D rotation (6), velocity (3).
pub const JOINT_FEATURE_WIDTH: usize = 12;

/// Joint features of one frame, in bone-index order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointFeatures {
    pub positions: Vec<Vec3>,
    pub rotations: Vec<Rotation6D>,
    pub velocities: Vec<Vec3>,
}

impl JointFeatures {
    pub fn num_joints(&self) -> usize {
        self.positions.len()
    }

    /// Append `[pos, rot6d, vel]` per joint to `row`.
    pub fn flatten_into(&self, row: &mut Vec<f32>) {
        row.reserve(self.num_joints() * JOINT_FEATURE_WIDTH);
        for ((p, r), v) in self
            .positions
            .iter()
            .zip(&self.rotations)
            .zip(&self.velocities)
        {
            row.extend_from_slice(&p.to_array());
            row.extend_from_slice(r.as_slice());
            row.extend_from_slice(&v.to_array());
        }
    }
}

/// Encodes joint positions, rotations and velocities relative to a root.
#[derive(Debug, Clone, Copy)]
pub struct JointFeatureEncoder<'a> {
    skeleton: &'a Skeleton,
    poses: &'a PoseSequence,
    animation: &'a Animation,
    velocities: &'a JointVelocitySequence,
}

impl<'a> JointFeatureEncoder<'a> {
    pub fn new(inputs: ReadyInputs<'a>) -> Self {
        Self {
            skeleton: inputs.skeleton,
            poses: inputs.poses,
            animation: inputs.animation,
            velocities: inputs.velocities,
        }
    }

    /// Floats emitted per row.
    pub fn width(&self) -> usize {
        self.skeleton.num_bones() * JOINT_FEATURE_WIDTH
    }

    /// Features of the frame `view` selects around `reference`.
    ///
    /// Positions come from the pose sequence, rotations from forward
    /// kinematics of the animation and velocities from the velocity
    /// sequence, all sampled at the same frame. Frames past the end of a
    /// source hold its last frame.
    pub fn encode(&self, reference: usize, root: &RootTransform, view: View) -> JointFeatures {
        let frame = view.frame(reference);
        let bones = self.skeleton.num_bones();

        let positions = match last_valid(self.poses.len(), frame) {
            Some(f) => self.poses.poses[f]
                .positions
                .iter()
                .map(|&p| root.local_position(p))
                .collect(),
            None => vec![Vec3::ZERO; bones],
        };

        let rotations = forward_kinematics(self.skeleton, self.animation, frame)
            .iter()
            .map(|world| Rotation6D::from_world(world_rotation(world), root))
            .collect();

        let velocities = match last_valid(self.velocities.len(), frame) {
            Some(f) => self.velocities.frames[f]
                .iter()
                .map(|&v| root.local_velocity(v))
                .collect(),
            None => vec![Vec3::ZERO; bones],
        };

        JointFeatures {
            positions,
            rotations,
            velocities,
        }
    }
}

#[inline]
fn last_valid(len: usize, frame: usize) -> Option<usize> {
    len.checked_sub(1).map(|last| frame.min(last))
}
