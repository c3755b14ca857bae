//! Loaders for animation clips and exported datasets.
//!
//! This module provides parsers for:
//! - Clip documents (JSON or YAML, chosen by extension) describing a skeleton,
//!   its local animation tracks and optional world poses and joint velocities
//! - Dataset metadata files written by [`DatasetWriter`](super::writers::DatasetWriter)
//! - Binary `f32` payloads

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{PipelineConfig, SequenceConfig};
use crate::processors::derive::{derive_joint_velocities, derive_pose_sequence};

use super::animation::{
    Animation, BoneTrack, InputBundle, InputError, JointVelocitySequence, Pose, PoseSequence,
    SequenceInfo, Skeleton,
};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported clip format: {0} (expected .json, .yaml or .yml)")]
    UnsupportedFormat(PathBuf),

    #[error("Track for unknown bone '{0}'")]
    UnknownBone(String),

    #[error("Track '{bone}' has an unusable {channel} key at frame {frame}")]
    InvalidKey {
        bone: String,
        channel: &'static str,
        frame: usize,
    },

    #[error("Invalid clip: {0}")]
    Input(#[from] InputError),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("'{path}' is {bytes} bytes, not a multiple of the {row_bytes}-byte row size")]
    Truncated {
        path: PathBuf,
        bytes: usize,
        row_bytes: usize,
    },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Clip file formats, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipFormat {
    Json,
    Yaml,
}

impl ClipFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(ClipFormat::Json),
            "yaml" | "yml" => Some(ClipFormat::Yaml),
            _ => None,
        }
    }
}

/// Identity block of a clip document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceDocument {
    #[serde(default = "default_sequence_id")]
    pub sequence_id: i64,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub dataset_id: String,
}

fn default_sequence_id() -> i64 {
    -1
}

impl Default for SequenceDocument {
    fn default() -> Self {
        Self {
            sequence_id: default_sequence_id(),
            source_name: String::new(),
            dataset_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoneDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Local keys of one bone. Vectors are `[x, y, z]`, quaternions `[x, y, z, w]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackDocument {
    pub bone: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<Vec3>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rotations: Vec<Quat>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scales: Vec<Vec3>,
}

impl TrackDocument {
    /// Every key must be finite and every rotation must normalize.
    fn check_keys(&self) -> Result<()> {
        let invalid = |channel, frame| LoaderError::InvalidKey {
            bone: self.bone.clone(),
            channel,
            frame,
        };
        if let Some(frame) = self.positions.iter().position(|p| !p.is_finite()) {
            return Err(invalid("position", frame));
        }
        if let Some(frame) = self
            .rotations
            .iter()
            .position(|q| !q.is_finite() || q.length_squared() <= f32::EPSILON)
        {
            return Err(invalid("rotation", frame));
        }
        if let Some(frame) = self.scales.iter().position(|s| !s.is_finite()) {
            return Err(invalid("scale", frame));
        }
        Ok(())
    }
}

/// On-disk description of one animation clip.
///
/// `poses` and `velocities` are optional; when absent they are derived from
/// the animation tracks on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipDocument {
    #[serde(default)]
    pub sequence: SequenceDocument,
    pub skeleton: Vec<BoneDocument>,
    pub frames: usize,
    #[serde(default)]
    pub tracks: Vec<TrackDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poses: Option<Vec<Vec<Vec3>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocities: Option<Vec<Vec<Vec3>>>,
}

impl ClipDocument {
    pub fn parse(content: &str, format: ClipFormat) -> Result<Self> {
        Ok(match format {
            ClipFormat::Json => serde_json::from_str(content)?,
            ClipFormat::Yaml => serde_yaml::from_str(content)?,
        })
    }

    pub fn skeleton(&self) -> Result<Skeleton> {
        let names: Vec<String> = self.skeleton.iter().map(|b| b.name.clone()).collect();
        let parents = self
            .skeleton
            .iter()
            .map(|b| match &b.parent {
                Some(p) => names
                    .iter()
                    .position(|n| n == p)
                    .map(Some)
                    .ok_or_else(|| InputError::MissingBone(p.clone())),
                None => Ok(None),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Skeleton::new(names, parents)?)
    }

    /// Tracks in bone-index order; bones without a track get an empty one.
    pub fn animation(&self, skeleton: &Skeleton) -> Result<Animation> {
        let mut tracks = vec![BoneTrack::default(); skeleton.num_bones()];
        for doc in &self.tracks {
            let index = skeleton
                .index_of(&doc.bone)
                .ok_or_else(|| LoaderError::UnknownBone(doc.bone.clone()))?;
            doc.check_keys()?;
            tracks[index] = BoneTrack {
                positions: doc.positions.clone(),
                rotations: doc.rotations.iter().map(|q| q.normalize()).collect(),
                scales: doc.scales.clone(),
            };
        }
        Ok(Animation::new(self.frames, tracks))
    }

    pub fn info(&self) -> SequenceInfo {
        SequenceInfo {
            sequence_id: self.sequence.sequence_id,
            source_name: self.sequence.source_name.clone(),
            dataset_id: self.sequence.dataset_id.clone(),
        }
    }

    /// Build a complete input bundle, deriving missing poses and velocities.
    ///
    /// Forward kinematics runs on the rayon pool when `parallel` is set.
    pub fn into_bundle(self, sequence: &SequenceConfig, parallel: bool) -> Result<InputBundle> {
        let skeleton = self.skeleton()?;
        let animation = self.animation(&skeleton)?;
        let info = self.info();

        let poses = match self.poses {
            Some(frames) => PoseSequence::new(info, frames.into_iter().map(Pose::new).collect()),
            None => {
                log::debug!("Clip has no poses, deriving them from the animation");
                derive_pose_sequence(&skeleton, &animation, info, parallel)
            }
        };
        let velocities = match self.velocities {
            Some(frames) => JointVelocitySequence::new(frames),
            None => {
                log::debug!("Clip has no velocities, deriving them from the poses");
                derive_joint_velocities(&poses, sequence)
            }
        };

        Ok(InputBundle::default()
            .with_skeleton(skeleton)
            .with_animation(animation)
            .with_poses(poses)
            .with_velocities(velocities))
    }
}

/// Load a clip document from a `.json`, `.yaml` or `.yml` file.
pub fn load_clip_document(path: &Path) -> Result<ClipDocument> {
    let format =
        ClipFormat::from_path(path).ok_or_else(|| LoaderError::UnsupportedFormat(path.to_path_buf()))?;
    ClipDocument::parse(&read_to_string(path)?, format)
}

/// Load a clip and convert it into a ready [`InputBundle`].
///
/// Poses missing from the file are computed by forward kinematics of the
/// animation tracks; missing velocities are finite differences of the poses,
/// in metres per second.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, its skeleton is
/// malformed or a track names a bone the skeleton does not have.
///
/// # Example
///
/// ```no_run
/// use locomotion_dataset::config::PipelineConfig;
/// use locomotion_dataset::core::loaders::load_clip;
/// use std::path::Path;
///
/// let bundle = load_clip(Path::new("walk.json"), &PipelineConfig::default()).unwrap();
/// assert!(bundle.is_ready());
/// ```
pub fn load_clip(path: &Path, config: &PipelineConfig) -> Result<InputBundle> {
    let mut document = load_clip_document(path)?;
    if document.sequence.source_name.is_empty() {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            document.sequence.source_name = stem.to_string();
        }
    }
    document.into_bundle(&config.sequence, config.processing.parallel)
}

/// Row widths and column names recorded in `metadata.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetMetadata {
    pub input_width: usize,
    pub input_columns: Vec<String>,
    pub output_width: usize,
    pub output_columns: Vec<String>,
}

impl DatasetMetadata {
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let (input_width, input_columns) = parse_metadata_line(lines.next(), "input")?;
        let (output_width, output_columns) = parse_metadata_line(lines.next(), "output")?;
        Ok(Self {
            input_width,
            input_columns,
            output_width,
            output_columns,
        })
    }
}

fn parse_metadata_line(line: Option<&str>, kind: &str) -> Result<(usize, Vec<String>)> {
    let line = line.ok_or_else(|| LoaderError::InvalidMetadata(format!("missing {kind} line")))?;
    let mut fields = line.trim_end().split(',');
    let width = fields
        .next()
        .and_then(|w| w.trim().parse::<usize>().ok())
        .ok_or_else(|| LoaderError::InvalidMetadata(format!("{kind} line has no leading width")))?;
    let columns: Vec<String> = fields.map(str::to_string).collect();
    if !columns.is_empty() && columns.len() != width {
        return Err(LoaderError::InvalidMetadata(format!(
            "{kind} line records width {width} but names {} columns",
            columns.len()
        )));
    }
    Ok((width, columns))
}

/// Read a dataset `metadata.txt`.
pub fn read_metadata(path: &Path) -> Result<DatasetMetadata> {
    DatasetMetadata::parse(&read_to_string(path)?)
}

/// Read a little-endian `f32` payload as rows of `width` floats.
pub fn read_payload(path: &Path, width: usize) -> Result<Vec<Vec<f32>>> {
    let bytes = fs::read(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let row_bytes = width * std::mem::size_of::<f32>();
    if row_bytes == 0 || bytes.len() % row_bytes != 0 {
        return Err(LoaderError::Truncated {
            path: path.to_path_buf(),
            bytes: bytes.len(),
            row_bytes,
        });
    }

    Ok(bytes
        .chunks_exact(row_bytes)
        .map(|row| {
            row.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        })
        .collect())
}
