//! Core data types and I/O operations.

pub mod animation;
pub mod loaders;
pub mod transforms;
pub mod writers;

pub use animation::{Animation, InputBundle, JointVelocitySequence, PoseSequence, Skeleton};
pub use transforms::{RootTransform, Rotation6D};
pub use writers::{DatasetWriter, ExportSummary, WriteError};
