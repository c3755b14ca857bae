//! Animation data model: skeleton, poses, bone tracks and joint velocities.
//!
//! These types are the inputs of the feature pipeline. They are built once by
//! a loader (or by the caller) and only read afterwards.

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};
use thiserror::Error;

/// Malformed or mutually inconsistent pipeline inputs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("bone names and parents differ in length ({names} names, {parents} parents)")]
    LengthMismatch { names: usize, parents: usize },

    #[error("duplicate bone name '{0}'")]
    DuplicateName(String),

    #[error("bone '{bone}' references missing parent index {parent}")]
    MissingParent { bone: String, parent: usize },

    #[error("bone hierarchy contains a cycle")]
    Cycle,

    /// A bone required by the rig is absent from the skeleton.
    #[error("skeleton has no bone named '{0}'")]
    MissingBone(String),

    #[error("{what} has {found} joints per frame, skeleton has {expected} bones")]
    JointCountMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{what} covers {found} frames, animation lasts {expected}")]
    FrameCountMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Result type for input validation.
pub type Result<T> = std::result::Result<T, InputError>;

/// Bone hierarchy with a bidirectional name/index mapping.
#[derive(Debug, Clone)]
pub struct Skeleton {
    names: Vec<String>,
    indices: HashMap<String, usize>,
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    /// Parent-before-child traversal order.
    order: Vec<usize>,
}

impl Skeleton {
    /// Build a skeleton from bone names and per-bone parent indices.
    ///
    /// # Errors
    ///
    /// Fails on duplicate names, dangling parent indices or cycles.
    pub fn new(names: Vec<String>, parents: Vec<Option<usize>>) -> Result<Self> {
        if names.len() != parents.len() {
            return Err(InputError::LengthMismatch {
                names: names.len(),
                parents: parents.len(),
            });
        }

        let mut indices = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if indices.insert(name.clone(), i).is_some() {
                return Err(InputError::DuplicateName(name.clone()));
            }
        }

        let mut children = vec![Vec::new(); names.len()];
        for (i, parent) in parents.iter().enumerate() {
            if let Some(p) = *parent {
                if p >= names.len() || p == i {
                    return Err(InputError::MissingParent {
                        bone: names[i].clone(),
                        parent: p,
                    });
                }
                children[p].push(i);
            }
        }

        // Depth-first from every root; bones on a cycle are never reached.
        let mut order = Vec::with_capacity(names.len());
        let mut stack: Vec<usize> = parents
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_none())
            .map(|(i, _)| i)
            .rev()
            .collect();
        while let Some(bone) = stack.pop() {
            order.push(bone);
            stack.extend(children[bone].iter().rev().copied());
        }
        if order.len() != names.len() {
            return Err(InputError::Cycle);
        }

        Ok(Self {
            names,
            indices,
            parents,
            children,
            order,
        })
    }

    /// Build a skeleton from `(name, parent name)` pairs.
    pub fn from_named_parents(bones: &[(&str, Option<&str>)]) -> Result<Self> {
        let names: Vec<String> = bones.iter().map(|(n, _)| n.to_string()).collect();
        let mut parents = Vec::with_capacity(bones.len());
        for (_, parent) in bones {
            let index = match parent {
                Some(p) => Some(
                    bones
                        .iter()
                        .position(|(n, _)| n == p)
                        .ok_or_else(|| InputError::MissingBone(p.to_string()))?,
                ),
                None => None,
            };
            parents.push(index);
        }
        Self::new(names, parents)
    }

    #[inline]
    pub fn num_bones(&self) -> usize {
        self.names.len()
    }

    /// Index of the bone with the given name.
    #[inline]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.indices.get(name).copied()
    }

    /// Name of the bone at `index`.
    #[inline]
    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.parents.get(index).copied().flatten()
    }

    pub fn parents(&self) -> &[Option<usize>] {
        &self.parents
    }

    pub fn children(&self, index: usize) -> &[usize] {
        &self.children[index]
    }

    /// Bones ordered so that every parent precedes its children.
    pub fn traversal_order(&self) -> &[usize] {
        &self.order
    }
}

/// Identity of a clip, carried through to the sequences file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceInfo {
    pub sequence_id: i64,
    pub source_name: String,
    pub dataset_id: String,
}

impl Default for SequenceInfo {
    fn default() -> Self {
        Self {
            sequence_id: -1,
            source_name: String::new(),
            dataset_id: String::new(),
        }
    }
}

/// World-space joint positions for one frame, indexed by bone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pose {
    pub positions: Vec<Vec3>,
}

impl Pose {
    pub fn new(positions: Vec<Vec3>) -> Self {
        Self { positions }
    }

    #[inline]
    pub fn num_joints(&self) -> usize {
        self.positions.len()
    }
}

/// Ordered poses of one clip.
#[derive(Debug, Clone, Default)]
pub struct PoseSequence {
    pub info: SequenceInfo,
    pub poses: Vec<Pose>,
}

impl PoseSequence {
    pub fn new(info: SequenceInfo, poses: Vec<Pose>) -> Self {
        Self { info, poses }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Joint count of the first pose (0 for an empty sequence).
    pub fn num_joints(&self) -> usize {
        self.poses.first().map_or(0, Pose::num_joints)
    }

    /// Position of `bone` at `frame`, if both are in range.
    #[inline]
    pub fn position(&self, frame: usize, bone: usize) -> Option<Vec3> {
        self.poses.get(frame)?.positions.get(bone).copied()
    }
}

/// Per-frame local keys of one bone.
///
/// Sampling past the last key holds the last key; an empty channel samples
/// as identity.
#[derive(Debug, Clone, Default)]
pub struct BoneTrack {
    pub positions: Vec<Vec3>,
    pub rotations: Vec<Quat>,
    pub scales: Vec<Vec3>,
}

impl BoneTrack {
    pub fn position(&self, frame: usize) -> Vec3 {
        sample_held(&self.positions, frame).unwrap_or(Vec3::ZERO)
    }

    pub fn rotation(&self, frame: usize) -> Quat {
        sample_held(&self.rotations, frame).unwrap_or(Quat::IDENTITY)
    }

    pub fn scale(&self, frame: usize) -> Vec3 {
        sample_held(&self.scales, frame).unwrap_or(Vec3::ONE)
    }

    /// Local transform `T * R * S` at `frame`.
    pub fn local_transform(&self, frame: usize) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.scale(frame),
            self.rotation(frame),
            self.position(frame),
        )
    }
}

#[inline]
fn sample_held<T: Copy>(keys: &[T], frame: usize) -> Option<T> {
    keys.get(frame).or_else(|| keys.last()).copied()
}

/// Local joint animation of a clip.
#[derive(Debug, Clone, Default)]
pub struct Animation {
    pub duration_frames: usize,
    /// One track per skeleton bone, in bone-index order.
    pub tracks: Vec<BoneTrack>,
}

impl Animation {
    pub fn new(duration_frames: usize, tracks: Vec<BoneTrack>) -> Self {
        Self {
            duration_frames,
            tracks,
        }
    }

    #[inline]
    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }
}

/// Per-frame joint velocities, index-aligned with a [`PoseSequence`].
#[derive(Debug, Clone, Default)]
pub struct JointVelocitySequence {
    pub frames: Vec<Vec<Vec3>>,
}

impl JointVelocitySequence {
    pub fn new(frames: Vec<Vec<Vec3>>) -> Self {
        Self { frames }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn num_joints(&self) -> usize {
        self.frames.first().map_or(0, Vec::len)
    }
}

/// The four inputs of a pipeline run. Any of them may still be missing.
#[derive(Debug, Clone, Default)]
pub struct InputBundle {
    pub skeleton: Option<Skeleton>,
    pub poses: Option<PoseSequence>,
    pub animation: Option<Animation>,
    pub velocities: Option<JointVelocitySequence>,
}

/// Borrowed view of a bundle with every input present.
#[derive(Debug, Clone, Copy)]
pub struct ReadyInputs<'a> {
    pub skeleton: &'a Skeleton,
    pub poses: &'a PoseSequence,
    pub animation: &'a Animation,
    pub velocities: &'a JointVelocitySequence,
}

impl InputBundle {
    pub fn with_skeleton(mut self, skeleton: Skeleton) -> Self {
        self.skeleton = Some(skeleton);
        self
    }

    pub fn with_poses(mut self, poses: PoseSequence) -> Self {
        self.poses = Some(poses);
        self
    }

    pub fn with_animation(mut self, animation: Animation) -> Self {
        self.animation = Some(animation);
        self
    }

    pub fn with_velocities(mut self, velocities: JointVelocitySequence) -> Self {
        self.velocities = Some(velocities);
        self
    }

    pub fn is_ready(&self) -> bool {
        self.ready().is_some()
    }

    /// All four inputs, or `None` while any is missing.
    pub fn ready(&self) -> Option<ReadyInputs<'_>> {
        Some(ReadyInputs {
            skeleton: self.skeleton.as_ref()?,
            poses: self.poses.as_ref()?,
            animation: self.animation.as_ref()?,
            velocities: self.velocities.as_ref()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Skeleton {
        Skeleton::from_named_parents(&[
            ("hip", None),
            ("spine", Some("hip")),
            ("head", Some("spine")),
            ("leg", Some("hip")),
        ])
        .unwrap()
    }

    #[test]
    fn test_skeleton_lookup() {
        let skeleton = chain();
        assert_eq!(skeleton.num_bones(), 4);
        assert_eq!(skeleton.index_of("spine"), Some(1));
        assert_eq!(skeleton.name_of(3), Some("leg"));
        assert_eq!(skeleton.index_of("tail"), None);
        assert_eq!(skeleton.parent(2), Some(1));
        assert_eq!(skeleton.parent(0), None);
        assert_eq!(skeleton.children(0), &[1, 3]);
    }

    #[test]
    fn test_traversal_order_parents_first() {
        // Parents listed after their children still come first in the order.
        let skeleton = Skeleton::new(
            vec!["hand".into(), "arm".into(), "root".into()],
            vec![Some(1), Some(2), None],
        )
        .unwrap();

        assert_eq!(skeleton.traversal_order(), &[2, 1, 0]);
    }

    #[test]
    fn test_skeleton_rejects_bad_hierarchy() {
        let dup = Skeleton::new(vec!["a".into(), "a".into()], vec![None, None]);
        assert_eq!(dup.unwrap_err(), InputError::DuplicateName("a".into()));

        let dangling = Skeleton::new(vec!["a".into()], vec![Some(4)]);
        assert!(matches!(dangling, Err(InputError::MissingParent { .. })));

        let cycle = Skeleton::new(vec!["a".into(), "b".into()], vec![Some(1), Some(0)]);
        assert_eq!(cycle.unwrap_err(), InputError::Cycle);
    }

    #[test]
    fn test_bone_track_holds_last_key() {
        let track = BoneTrack {
            positions: vec![Vec3::ZERO, Vec3::X],
            rotations: vec![],
            scales: vec![],
        };

        assert_eq!(track.position(1), Vec3::X);
        assert_eq!(track.position(50), Vec3::X);
        assert_eq!(track.rotation(3), Quat::IDENTITY);
        assert_eq!(track.scale(0), Vec3::ONE);
    }

    #[test]
    fn test_input_bundle_readiness() {
        let bundle = InputBundle::default()
            .with_skeleton(chain())
            .with_animation(Animation::default())
            .with_poses(PoseSequence::default());
        assert!(!bundle.is_ready());

        let bundle = bundle.with_velocities(JointVelocitySequence::default());
        assert!(bundle.is_ready());
    }
}
