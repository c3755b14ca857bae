//! Feature extraction stages.

pub mod derive;
pub mod features;
pub mod frame_range;
pub mod joints;
pub mod root;
pub mod sequence;
pub mod trajectory;

// Re-export key types for convenience
pub use features::{FeatureLayout, FeatureTable, FrameFeatures};
pub use frame_range::FrameRange;
pub use joints::{JointFeatureEncoder, JointFeatures};
pub use root::{DegenerateInputError, RootTransformEstimator};
pub use sequence::{FeaturePipeline, PipelineError, RunOutcome, SequenceAccumulator};
pub use trajectory::{TrajectoryEncoder, View};
