//! Synthetic walking clips.
//!
//! A six-bone rig (hip, both pelvis joints, spine, both shoulders) translating
//! at constant speed along a fixed heading. Useful as a known-answer input:
//! every root delta is the same and every trajectory speed equals the walking
//! speed.

use glam::{Quat, Vec3};

use crate::config::SequenceConfig;
use crate::core::animation::InputBundle;
use crate::core::loaders::{self, BoneDocument, ClipDocument, SequenceDocument, TrackDocument};

const HIP_HEIGHT: f32 = 90.0;

/// `(bone, parent, local offset)` in centimetres. Right-side bones sit at -X
/// so the rig faces +Z when unrotated.
const RIG: [(&str, Option<&str>, [f32; 3]); 6] = [
    ("hip", None, [0.0, 0.0, 0.0]),
    ("pelvis_L", Some("hip"), [10.0, -5.0, 0.0]),
    ("pelvis_R", Some("hip"), [-10.0, -5.0, 0.0]),
    ("spine", Some("hip"), [0.0, 30.0, 0.0]),
    ("shoulder_L", Some("spine"), [15.0, 20.0, 0.0]),
    ("shoulder_R", Some("spine"), [-15.0, 20.0, 0.0]),
];

/// Clip document of a straight walk.
///
/// `speed` is in metres per second, `heading` in radians from +Z. Positions
/// use the unit scale of `sequence` (centimetres by default). Poses and
/// velocities are left out and derived on load.
pub fn walking_clip_document(
    frames: usize,
    speed: f32,
    heading: f32,
    sequence: &SequenceConfig,
) -> ClipDocument {
    let rotation = Quat::from_rotation_y(heading);
    let step = rotation * Vec3::Z * (speed * sequence.unit_scale / sequence.fps);

    let tracks = RIG
        .iter()
        .map(|&(name, parent, offset)| match parent {
            None => TrackDocument {
                bone: name.to_string(),
                positions: (0..frames)
                    .map(|f| Vec3::new(0.0, HIP_HEIGHT, 0.0) + step * f as f32)
                    .collect(),
                rotations: vec![rotation],
                scales: Vec::new(),
            },
            Some(_) => TrackDocument {
                bone: name.to_string(),
                positions: vec![Vec3::from_array(offset)],
                ..Default::default()
            },
        })
        .collect();

    ClipDocument {
        sequence: SequenceDocument {
            sequence_id: 0,
            source_name: "synthetic_walk".to_string(),
            dataset_id: "synthetic".to_string(),
        },
        skeleton: RIG
            .iter()
            .map(|&(name, parent, _)| BoneDocument {
                name: name.to_string(),
                parent: parent.map(str::to_string),
            })
            .collect(),
        frames,
        tracks,
        poses: None,
        velocities: None,
    }
}

/// Ready input bundle of a straight walk at the default frame rate and units.
pub fn walking_clip(frames: usize, speed: f32, heading: f32) -> loaders::Result<InputBundle> {
    let sequence = SequenceConfig::default();
    walking_clip_document(frames, speed, heading, &sequence).into_bundle(&sequence, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walking_clip_is_ready() {
        let bundle = walking_clip(10, 1.0, 0.0).unwrap();
        assert!(bundle.is_ready());
        assert_eq!(bundle.skeleton.as_ref().unwrap().num_bones(), 6);
        assert_eq!(bundle.poses.as_ref().unwrap().len(), 10);
    }

    #[test]
    fn test_walking_clip_moves_along_heading() {
        let heading = std::f32::consts::FRAC_PI_2;
        let bundle = walking_clip(61, 1.5, heading).unwrap();
        let poses = bundle.poses.unwrap();

        // One second at 1.5 m/s along +X.
        let hip = poses.poses[60].positions[0];
        assert!(hip.abs_diff_eq(Vec3::new(150.0, HIP_HEIGHT, 0.0), 1e-2));

        // Unrotated right side is -X; a quarter turn puts it at +Z.
        let right = poses.poses[0].positions[5];
        assert!(right.z > 0.0);

        let velocities = bundle.velocities.unwrap();
        assert!(velocities.frames[30][0].abs_diff_eq(Vec3::new(1.5, 0.0, 0.0), 1e-3));
    }
}
