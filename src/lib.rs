//! Locomotion feature extraction and dataset export.
//!
//! This crate provides tools for:
//! - Estimating smoothed, ground-projected root transforms from joint poses
//! - Encoding root-relative trajectory windows and joint features
//! - Exporting input/output row pairs as flat little-endian `f32` datasets
//! - Loading animation clips from JSON or YAML
//!
//! # Example
//!
//! ```no_run
//! use locomotion_dataset::{FeaturePipeline, PipelineConfig, Preset, RunOutcome};
//! use locomotion_dataset::core::loaders::load_clip;
//! use std::path::Path;
//!
//! let config = PipelineConfig::preset(Preset::Locomotion);
//! let bundle = load_clip(Path::new("walk.json"), &config).unwrap();
//! let pipeline = FeaturePipeline::new(config).unwrap();
//! if let RunOutcome::Complete(summary) = pipeline.run(&bundle).unwrap() {
//!     println!("{} rows", summary.rows_written);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod synthetic;

pub use crate::config::{PipelineConfig, Preset};
pub use crate::core::animation::InputBundle;
pub use crate::processors::sequence::{FeaturePipeline, PipelineError, RunOutcome};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
