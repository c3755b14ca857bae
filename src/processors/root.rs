//! Per-frame root transform estimation.
//!
//! The root of every frame is the hip joint dropped onto the ground, facing
//! the direction perpendicular to the averaged hip and shoulder axes. The
//! facing is smoothed over time with a Gaussian quaternion filter so the
//! trajectory features do not pick up gait sway.

use glam::{Quat, Vec3};
use log::debug;
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{RigConfig, SmoothingConfig};
use crate::core::animation::{InputError, PoseSequence, Skeleton};
use crate::core::transforms::{project_on_ground, RootTransform};

/// Below this length a ground-projected axis counts as vertical.
const MIN_AXIS_LENGTH: f32 = 1e-6;

/// Geometry that has no well-defined facing direction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DegenerateInputError {
    #[error("pose sequence has no frames")]
    EmptySequence,

    #[error("frame {frame}: {axis} axis has no horizontal extent")]
    VerticalAxis { frame: usize, axis: &'static str },

    #[error("frame {frame}: hip and shoulder axes cancel out")]
    OpposedAxes { frame: usize },

    #[error("frame {frame}: pose has no position for bone {bone}")]
    MissingJoint { frame: usize, bone: usize },

    #[error("frame {frame}: non-finite value for bone {bone}")]
    NonFinite { frame: usize, bone: usize },

    #[error("frame {frame}: bone {bone} has a zero-length rotation")]
    ZeroRotation { frame: usize, bone: usize },
}

/// Bone indices of the joints that define the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RigBones {
    pub hip: usize,
    pub left_hip: usize,
    pub right_hip: usize,
    pub left_shoulder: usize,
    pub right_shoulder: usize,
}

impl RigBones {
    /// Look up the rig bones by name.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::MissingBone`] for the first name the skeleton
    /// does not contain.
    pub fn resolve(skeleton: &Skeleton, rig: &RigConfig) -> Result<Self, InputError> {
        let find = |name: &str| {
            skeleton
                .index_of(name)
                .ok_or_else(|| InputError::MissingBone(name.to_string()))
        };
        Ok(Self {
            hip: find(&rig.hip)?,
            left_hip: find(&rig.left_hip)?,
            right_hip: find(&rig.right_hip)?,
            left_shoulder: find(&rig.left_shoulder)?,
            right_shoulder: find(&rig.right_shoulder)?,
        })
    }
}

/// Computes smoothed root transforms for whole pose sequences.
#[derive(Debug, Clone)]
pub struct RootTransformEstimator {
    bones: RigBones,
    smoothing: SmoothingConfig,
    parallel: bool,
}

impl RootTransformEstimator {
    pub fn new(bones: RigBones, smoothing: SmoothingConfig) -> Self {
        Self {
            bones,
            smoothing,
            parallel: true,
        }
    }

    /// Resolve the rig against `skeleton` and build an estimator.
    pub fn for_skeleton(
        skeleton: &Skeleton,
        rig: &RigConfig,
        smoothing: SmoothingConfig,
    ) -> Result<Self, InputError> {
        Ok(Self::new(RigBones::resolve(skeleton, rig)?, smoothing))
    }

    /// Use rayon for the smoothing passes (default) or stay on this thread.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn bones(&self) -> &RigBones {
        &self.bones
    }

    /// One root transform per frame of `poses`.
    ///
    /// # Errors
    ///
    /// Fails on an empty sequence and on any frame whose hip or shoulder axis
    /// has no usable horizontal direction.
    pub fn estimate(&self, poses: &PoseSequence) -> Result<Vec<RootTransform>, DegenerateInputError> {
        if poses.is_empty() {
            return Err(DegenerateInputError::EmptySequence);
        }

        let mut positions = Vec::with_capacity(poses.len());
        let mut rotations = Vec::with_capacity(poses.len());
        for frame in 0..poses.len() {
            let forward = self.facing(poses, frame)?;
            rotations.push(Quat::from_rotation_y(forward.x.atan2(forward.z)));
            positions.push(project_on_ground(self.joint(poses, frame, self.bones.hip)?));
        }

        let smoothed = gaussian_filter_quaternions(
            &rotations,
            self.smoothing.sigma,
            self.smoothing.passes,
            self.parallel,
        );
        debug!(
            "Estimated {} root transforms ({} smoothing passes, sigma {})",
            smoothed.len(),
            self.smoothing.passes,
            self.smoothing.sigma
        );

        Ok(positions
            .into_iter()
            .zip(smoothed)
            .map(|(position, rotation)| RootTransform::new(position, rotation))
            .collect())
    }

    /// Unsmoothed ground facing of one frame.
    pub fn facing(&self, poses: &PoseSequence, frame: usize) -> Result<Vec3, DegenerateInputError> {
        let hip = self.joint(poses, frame, self.bones.right_hip)?
            - self.joint(poses, frame, self.bones.left_hip)?;
        let shoulder = self.joint(poses, frame, self.bones.right_shoulder)?
            - self.joint(poses, frame, self.bones.left_shoulder)?;

        let hip = ground_axis(hip).ok_or(DegenerateInputError::VerticalAxis { frame, axis: "hip" })?;
        let shoulder = ground_axis(shoulder).ok_or(DegenerateInputError::VerticalAxis {
            frame,
            axis: "shoulder",
        })?;
        let across = ground_axis(hip + shoulder).ok_or(DegenerateInputError::OpposedAxes { frame })?;

        ground_axis(Vec3::Y.cross(across)).ok_or(DegenerateInputError::OpposedAxes { frame })
    }

    fn joint(&self, poses: &PoseSequence, frame: usize, bone: usize) -> Result<Vec3, DegenerateInputError> {
        let p = poses
            .position(frame, bone)
            .ok_or(DegenerateInputError::MissingJoint { frame, bone })?;
        if !p.is_finite() {
            return Err(DegenerateInputError::NonFinite { frame, bone });
        }
        Ok(p)
    }
}

/// Normalized ground projection, or `None` if it is too short.
fn ground_axis(v: Vec3) -> Option<Vec3> {
    let g = project_on_ground(v);
    let length = g.length();
    (length > MIN_AXIS_LENGTH).then(|| g / length)
}

/// Gaussian filter over a quaternion sequence.
///
/// Each pass replaces every sample by the Gaussian-weighted spherical average
/// of its neighbourhood: starting from the first neighbour, the accumulator is
/// slerped towards each further neighbour by `w / Σw`. Neighbour indices are
/// clamped to the sequence, the kernel radius is `ceil(3σ)`. A constant
/// sequence is returned unchanged.
pub fn gaussian_filter_quaternions(
    rotations: &[Quat],
    sigma: f32,
    passes: usize,
    parallel: bool,
) -> Vec<Quat> {
    let mut current: Vec<Quat> = rotations.iter().map(|q| q.normalize()).collect();
    if current.len() < 2 || passes == 0 || sigma <= 0.0 {
        return current;
    }

    let kernel = gaussian_kernel(sigma);
    for _ in 0..passes {
        current = if parallel {
            (0..current.len())
                .into_par_iter()
                .map(|i| filter_sample(&current, &kernel, i))
                .collect()
        } else {
            (0..current.len())
                .map(|i| filter_sample(&current, &kernel, i))
                .collect()
        };
    }
    current
}

/// Weights for offsets `-r..=r`, `r = ceil(3σ)`.
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil() as i64;
    let denom = 2.0 * sigma * sigma;
    (-radius..=radius)
        .map(|k| (-((k * k) as f32) / denom).exp())
        .collect()
}

fn filter_sample(rotations: &[Quat], kernel: &[f32], index: usize) -> Quat {
    let radius = (kernel.len() / 2) as i64;
    let last = rotations.len() as i64 - 1;
    let at = |offset: i64| rotations[(index as i64 + offset).clamp(0, last) as usize];

    let mut acc = at(-radius);
    let mut total = kernel[0];
    for (k, &weight) in kernel.iter().enumerate().skip(1) {
        total += weight;
        acc = acc.slerp(at(k as i64 - radius), weight / total);
    }
    acc.normalize()
}
