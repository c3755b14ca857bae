//! Per-sequence feature extraction and export.
//!
//! [`FeaturePipeline::run`] is the single entry point: it checks that every
//! input is present, validates them against each other, estimates the root
//! transforms, encodes one input/output row pair per reference frame and
//! hands the resulting [`FeatureTable`] to the [`DatasetWriter`].

use log::{debug, info, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{ConfigError, PipelineConfig};
use crate::core::animation::{InputBundle, InputError, ReadyInputs, SequenceInfo};
use crate::core::transforms::RootTransform;
use crate::core::writers::{DatasetWriter, ExportSummary, WriteError};

use super::features::{FeatureLayout, FeatureTable, FrameFeatures, RootDelta, DELTA_WIDTH};
use super::joints::JointFeatureEncoder;
use super::root::{DegenerateInputError, RootTransformEstimator};
use super::trajectory::{TrajectoryEncoder, View};

/// Errors that abort a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    Input(#[from] InputError),

    #[error("degenerate input: {0}")]
    Degenerate(#[from] DegenerateInputError),

    #[error("export failed: {0}")]
    Storage(#[from] WriteError),
}

/// Result type for pipeline runs.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// At least one input was missing; nothing was computed or written.
    NotReady,
    /// Rows were extracted and exported.
    Complete(ExportSummary),
}

/// Lifecycle of a [`SequenceAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Complete,
}

/// Collects the rows of one sequence.
///
/// An accumulator goes `Idle -> Running -> Complete` exactly once and is
/// owned by a single run.
#[derive(Debug)]
pub struct SequenceAccumulator {
    state: RunState,
    table: Option<FeatureTable>,
}

impl Default for SequenceAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceAccumulator {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            table: None,
        }
    }

    #[inline]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Start collecting rows for `info`. Ignored unless idle.
    pub fn begin(&mut self, info: SequenceInfo, layout: FeatureLayout) {
        if self.state == RunState::Idle {
            self.table = Some(FeatureTable::new(info, layout));
            self.state = RunState::Running;
        }
    }

    /// Append rows in frame order. Ignored unless running.
    pub fn extend<I: IntoIterator<Item = FrameFeatures>>(&mut self, rows: I) {
        if let (RunState::Running, Some(table)) = (self.state, self.table.as_mut()) {
            table.frames.extend(rows);
        }
    }

    /// Stop collecting and take the table. `None` if the run never started.
    pub fn finish(&mut self) -> Option<FeatureTable> {
        if self.state != RunState::Running {
            return None;
        }
        self.state = RunState::Complete;
        self.table.take()
    }
}

/// Reference frames processed for a clip of `frame_count` frames.
///
/// The first and last `margin` frames only ever appear inside windows.
pub fn reference_frames(frame_count: usize, margin: usize) -> std::ops::RangeInclusive<usize> {
    if frame_count > 2 * margin {
        margin..=frame_count - margin
    } else {
        // Empty.
        1..=0
    }
}

/// Extracts locomotion features from input bundles and exports them.
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    config: PipelineConfig,
}

impl FeaturePipeline {
    /// Build a pipeline after validating `config`.
    pub fn new(config: PipelineConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Mutable access for per-run export settings (directory, overwrite).
    pub fn config_mut(&mut self) -> &mut PipelineConfig {
        &mut self.config
    }

    /// Extract features and export them.
    ///
    /// Returns [`RunOutcome::NotReady`] without touching the filesystem if
    /// any input is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The inputs disagree on joint count or length, or the rig bones are
    ///   missing from the skeleton
    /// - Any pose, velocity or animation key is non-finite, or a rotation key
    ///   has zero length
    /// - A frame has no well-defined facing direction
    /// - The dataset cannot be written
    pub fn run(&self, bundle: &InputBundle) -> Result<RunOutcome> {
        let Some(table) = self.extract(bundle)? else {
            debug!("Inputs not ready, skipping run");
            return Ok(RunOutcome::NotReady);
        };

        let summary = DatasetWriter::new(self.config.export.clone()).write(&table)?;
        info!(
            "Exported {} rows for sequence {} ({} input / {} output floats per row)",
            summary.rows_written, summary.sequence_id, summary.input_width, summary.output_width
        );
        Ok(RunOutcome::Complete(summary))
    }

    /// Extract the feature table without writing it. `None` if any input is
    /// missing.
    pub fn extract(&self, bundle: &InputBundle) -> Result<Option<FeatureTable>> {
        let Some(inputs) = bundle.ready() else {
            return Ok(None);
        };
        self.validate_inputs(&inputs)?;
        check_finite(&inputs)?;

        let mut accumulator = SequenceAccumulator::new();
        accumulator.begin(
            inputs.poses.info.clone(),
            FeatureLayout::new(&self.config.window, inputs.skeleton),
        );

        let estimator =
            RootTransformEstimator::for_skeleton(inputs.skeleton, &self.config.rig, self.config.smoothing.clone())?
                .with_parallel(self.config.processing.parallel);
        let roots = estimator.estimate(inputs.poses)?;

        let frames = reference_frames(inputs.animation.duration_frames, self.config.sequence.boundary_margin);
        if frames.is_empty() {
            warn!(
                "Sequence {} has {} frames, too short for a {}-frame margin; no rows extracted",
                inputs.poses.info.sequence_id,
                inputs.animation.duration_frames,
                self.config.sequence.boundary_margin
            );
        }

        let encoder = FrameEncoder::new(&self.config, inputs, &roots);
        if self.config.processing.parallel {
            let rows: Vec<FrameFeatures> = frames.into_par_iter().map(|f| encoder.encode(f)).collect();
            accumulator.extend(rows);
        } else {
            accumulator.extend(frames.map(|f| encoder.encode(f)));
        }

        let table = accumulator.finish();
        if let Some(table) = &table {
            debug!(
                "Extracted {} rows from sequence {}",
                table.len(),
                table.info.sequence_id
            );
        }
        Ok(table)
    }

    fn validate_inputs(&self, inputs: &ReadyInputs<'_>) -> std::result::Result<(), InputError> {
        let bones = inputs.skeleton.num_bones();
        let frames = inputs.animation.duration_frames;

        if inputs.animation.num_tracks() != bones {
            return Err(InputError::JointCountMismatch {
                what: "animation",
                expected: bones,
                found: inputs.animation.num_tracks(),
            });
        }
        if inputs.poses.len() != frames {
            return Err(InputError::FrameCountMismatch {
                what: "pose sequence",
                expected: frames,
                found: inputs.poses.len(),
            });
        }
        if inputs.velocities.len() != frames {
            return Err(InputError::FrameCountMismatch {
                what: "velocity sequence",
                expected: frames,
                found: inputs.velocities.len(),
            });
        }
        if let Some(pose) = inputs.poses.poses.iter().find(|p| p.num_joints() != bones) {
            return Err(InputError::JointCountMismatch {
                what: "pose sequence",
                expected: bones,
                found: pose.num_joints(),
            });
        }
        if let Some(frame) = inputs.velocities.frames.iter().find(|v| v.len() != bones) {
            return Err(InputError::JointCountMismatch {
                what: "velocity sequence",
                expected: bones,
                found: frame.len(),
            });
        }
        Ok(())
    }
}

/// Reject inputs that would put NaN or infinity into a payload.
///
/// Every joint of every frame is checked, not only the rig bones, since all
/// of them are encoded. Zero-length rotation keys are rejected because they
/// normalize to NaN.
fn check_finite(inputs: &ReadyInputs<'_>) -> std::result::Result<(), DegenerateInputError> {
    for (frame, pose) in inputs.poses.poses.iter().enumerate() {
        if let Some(bone) = pose.positions.iter().position(|p| !p.is_finite()) {
            return Err(DegenerateInputError::NonFinite { frame, bone });
        }
    }
    for (frame, velocities) in inputs.velocities.frames.iter().enumerate() {
        if let Some(bone) = velocities.iter().position(|v| !v.is_finite()) {
            return Err(DegenerateInputError::NonFinite { frame, bone });
        }
    }
    for (bone, track) in inputs.animation.tracks.iter().enumerate() {
        for keys in [&track.positions, &track.scales] {
            if let Some(frame) = keys.iter().position(|v| !v.is_finite()) {
                return Err(DegenerateInputError::NonFinite { frame, bone });
            }
        }
        for (frame, q) in track.rotations.iter().enumerate() {
            if !q.is_finite() {
                return Err(DegenerateInputError::NonFinite { frame, bone });
            }
            if q.length_squared() <= f32::EPSILON {
                return Err(DegenerateInputError::ZeroRotation { frame, bone });
            }
        }
    }
    Ok(())
}

/// Builds the row pair of one reference frame.
struct FrameEncoder<'a> {
    roots: &'a [RootTransform],
    trajectory: TrajectoryEncoder<'a>,
    joints: JointFeatureEncoder<'a>,
    input_width: usize,
    output_width: usize,
}

impl<'a> FrameEncoder<'a> {
    fn new(config: &PipelineConfig, inputs: ReadyInputs<'a>, roots: &'a [RootTransform]) -> Self {
        let trajectory = TrajectoryEncoder::new(roots, &config.window, &config.sequence);
        let joints = JointFeatureEncoder::new(inputs);
        Self {
            roots,
            input_width: trajectory.width(View::Input) + joints.width(),
            output_width: DELTA_WIDTH + trajectory.width(View::Output) + joints.width(),
            trajectory,
            joints,
        }
    }

    fn encode(&self, frame: usize) -> FrameFeatures {
        let last = self.roots.len() - 1;
        let root = &self.roots[frame.min(last)];
        let next = &self.roots[(frame + 1).min(last)];

        let mut input = Vec::with_capacity(self.input_width);
        input.extend(self.trajectory.encode(frame, root, View::Input));
        self.joints.encode(frame, root, View::Input).flatten_into(&mut input);

        let delta = RootDelta {
            position: root.relative_position(next),
            angle: root.relative_angle(next),
        };
        let mut output = Vec::with_capacity(self.output_width);
        output.extend_from_slice(&delta.to_array());
        output.extend(self.trajectory.encode(frame, next, View::Output));
        self.joints.encode(frame, next, View::Output).flatten_into(&mut output);

        FrameFeatures { frame, input, output }
    }
}
