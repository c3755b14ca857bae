//! Derived input channels for clips that only carry local animation.

use glam::Vec3;
use rayon::prelude::*;

use crate::config::SequenceConfig;
use crate::core::animation::{Animation, JointVelocitySequence, Pose, PoseSequence, SequenceInfo, Skeleton};
use crate::core::transforms::forward_kinematics;

/// World joint positions of every animation frame, on the rayon pool when
/// `parallel` is set.
pub fn derive_pose_sequence(
    skeleton: &Skeleton,
    animation: &Animation,
    info: SequenceInfo,
    parallel: bool,
) -> PoseSequence {
    let pose_at = |frame| {
        let world = forward_kinematics(skeleton, animation, frame);
        Pose::new(world.iter().map(|m| m.w_axis.truncate()).collect())
    };
    let frames = 0..animation.duration_frames;
    let poses = if parallel {
        frames.into_par_iter().map(pose_at).collect()
    } else {
        frames.map(pose_at).collect()
    };
    PoseSequence::new(info, poses)
}

/// Backward-difference joint velocities in metres per second.
///
/// `(p[t] - p[t-1]) * fps / unit_scale`; the first frame is at rest.
pub fn derive_joint_velocities(poses: &PoseSequence, sequence: &SequenceConfig) -> JointVelocitySequence {
    let scale = sequence.fps / sequence.unit_scale;
    let frames = (0..poses.len())
        .map(|t| {
            let current = &poses.poses[t].positions;
            match t.checked_sub(1) {
                Some(prev) => current
                    .iter()
                    .zip(&poses.poses[prev].positions)
                    .map(|(p, q)| (*p - *q) * scale)
                    .collect(),
                None => vec![Vec3::ZERO; current.len()],
            }
        })
        .collect();
    JointVelocitySequence::new(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::animation::BoneTrack;
    use glam::Quat;

    #[test]
    fn test_poses_from_tracks() {
        let skeleton = Skeleton::from_named_parents(&[("hip", None), ("toe", Some("hip"))]).unwrap();
        let animation = Animation::new(
            2,
            vec![
                BoneTrack {
                    positions: vec![Vec3::new(0.0, 90.0, 0.0), Vec3::new(0.0, 90.0, 10.0)],
                    rotations: vec![Quat::IDENTITY, Quat::from_rotation_y(std::f32::consts::PI)],
                    scales: vec![],
                },
                BoneTrack {
                    positions: vec![Vec3::new(0.0, -90.0, 15.0)],
                    ..Default::default()
                },
            ],
        );

        let poses = derive_pose_sequence(&skeleton, &animation, SequenceInfo::default(), true);
        assert_eq!(poses.len(), 2);
        assert!(poses.poses[0].positions[1].abs_diff_eq(Vec3::new(0.0, 0.0, 15.0), 1e-4));
        assert!(poses.poses[1].positions[1].abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-3));

        let sequential = derive_pose_sequence(&skeleton, &animation, SequenceInfo::default(), false);
        assert_eq!(sequential.poses, poses.poses);
    }

    #[test]
    fn test_velocities_in_metres_per_second() {
        let poses = PoseSequence::new(
            SequenceInfo::default(),
            vec![
                Pose::new(vec![Vec3::ZERO]),
                Pose::new(vec![Vec3::new(0.0, 0.0, 2.5)]),
            ],
        );
        let velocities = derive_joint_velocities(&poses, &SequenceConfig::default());
        assert_eq!(velocities.frames[0], vec![Vec3::ZERO]);
        assert!(velocities.frames[1][0].abs_diff_eq(Vec3::new(0.0, 0.0, 1.5), 1e-6));
    }
}
