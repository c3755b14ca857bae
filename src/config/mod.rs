//! Configuration types for the feature pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading, saving or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Named parameter sets for the two preprocessing variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// 13-sample window, the layout consumed by the locomotion network.
    Locomotion,
    /// 12-sample window (6 past, pivot, 5 future) of the mode-adaptive network.
    ModeAdaptive,
}

/// Temporal window sampled around each reference frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Number of trajectory samples in the window (past + pivot + future)
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,

    /// Frames covered on either side of the reference frame
    #[serde(default = "default_window_radius")]
    pub window_radius: usize,
}

fn default_num_samples() -> usize {
    13
}

fn default_window_radius() -> usize {
    60
}

impl WindowConfig {
    /// Index of the sample that lands on the reference frame.
    #[inline]
    pub fn pivot(&self) -> usize {
        self.num_samples / 2
    }

    /// First sample emitted for the output view (the future half).
    #[inline]
    pub fn future_start(&self) -> usize {
        self.pivot() + 1
    }

    /// Number of samples emitted for the output view.
    #[inline]
    pub fn future_samples(&self) -> usize {
        self.num_samples - self.future_start()
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            num_samples: default_num_samples(),
            window_radius: default_window_radius(),
        }
    }
}

/// Sequence-level constants: boundary handling and units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Frames skipped at both ends of a sequence
    #[serde(default = "default_boundary_margin")]
    pub boundary_margin: usize,

    /// Sampling rate of the source animation
    #[serde(default = "default_fps")]
    pub fps: f32,

    /// Native length units per meter (100 for centimetre rigs)
    #[serde(default = "default_unit_scale")]
    pub unit_scale: f32,
}

fn default_boundary_margin() -> usize {
    60
}

fn default_fps() -> f32 {
    60.0
}

fn default_unit_scale() -> f32 {
    100.0
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            boundary_margin: default_boundary_margin(),
            fps: default_fps(),
            unit_scale: default_unit_scale(),
        }
    }
}

/// Gaussian smoothing of the per-frame root rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Number of filter passes
    #[serde(default = "default_passes")]
    pub passes: usize,

    /// Kernel standard deviation in frames
    #[serde(default = "default_sigma")]
    pub sigma: f32,
}

fn default_passes() -> usize {
    5
}

fn default_sigma() -> f32 {
    30.0
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            passes: default_passes(),
            sigma: default_sigma(),
        }
    }
}

/// Bone names the root estimator looks up in the skeleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigConfig {
    #[serde(default = "default_hip")]
    pub hip: String,

    #[serde(default = "default_left_hip")]
    pub left_hip: String,

    #[serde(default = "default_right_hip")]
    pub right_hip: String,

    #[serde(default = "default_left_shoulder")]
    pub left_shoulder: String,

    #[serde(default = "default_right_shoulder")]
    pub right_shoulder: String,
}

fn default_hip() -> String {
    "hip".to_string()
}

fn default_left_hip() -> String {
    "pelvis_L".to_string()
}

fn default_right_hip() -> String {
    "pelvis_R".to_string()
}

fn default_left_shoulder() -> String {
    "shoulder_L".to_string()
}

fn default_right_shoulder() -> String {
    "shoulder_R".to_string()
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            hip: default_hip(),
            left_hip: default_left_hip(),
            right_hip: default_right_hip(),
            left_shoulder: default_left_shoulder(),
            right_shoulder: default_right_shoulder(),
        }
    }
}

/// Where and how the dataset artifacts are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Export directory
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Suffix of the sequences file (`sequences_<name>.txt`)
    #[serde(default = "default_dataset_name")]
    pub dataset_name: String,

    /// Replace existing artifacts instead of appending to them
    #[serde(default)]
    pub overwrite: bool,
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_dataset_name() -> String {
    "locomotion".to_string()
}

impl ExportConfig {
    pub fn metadata_path(&self) -> PathBuf {
        self.directory.join("metadata.txt")
    }

    pub fn sequences_path(&self) -> PathBuf {
        self.directory
            .join(format!("sequences_{}.txt", self.dataset_name))
    }

    pub fn data_x_path(&self) -> PathBuf {
        self.directory.join("data_X.bin")
    }

    pub fn data_y_path(&self) -> PathBuf {
        self.directory.join("data_Y.bin")
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            dataset_name: default_dataset_name(),
            overwrite: false,
        }
    }
}

/// Execution options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Compute frames on the rayon pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_parallel() -> bool {
    true
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub sequence: SequenceConfig,

    #[serde(default)]
    pub smoothing: SmoothingConfig,

    #[serde(default)]
    pub rig: RigConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl PipelineConfig {
    /// Configuration for one of the named preprocessing variants.
    pub fn preset(preset: Preset) -> Self {
        let mut config = Self::default();
        match preset {
            Preset::Locomotion => {}
            Preset::ModeAdaptive => {
                config.window.num_samples = 12;
                config.export.dataset_name = "mann".to_string();
            }
        }
        config
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Reject parameter combinations the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.window.num_samples < 3 {
            return Err(ConfigError::Invalid(format!(
                "window.num_samples must be at least 3, got {}",
                self.window.num_samples
            )));
        }
        if self.window.window_radius < self.window.pivot() {
            return Err(ConfigError::Invalid(format!(
                "window.window_radius ({}) must cover one frame per past sample ({})",
                self.window.window_radius,
                self.window.pivot()
            )));
        }
        if self.sequence.boundary_margin == 0 {
            return Err(ConfigError::Invalid(
                "sequence.boundary_margin must leave room for the next frame".to_string(),
            ));
        }
        if !is_positive(self.sequence.fps) || !is_positive(self.sequence.unit_scale) {
            return Err(ConfigError::Invalid(
                "sequence.fps and sequence.unit_scale must be positive".to_string(),
            ));
        }
        if !is_positive(self.smoothing.sigma) {
            return Err(ConfigError::Invalid(format!(
                "smoothing.sigma must be positive, got {}",
                self.smoothing.sigma
            )));
        }
        if self.export.dataset_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "export.dataset_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// NaN fails this check too.
fn is_positive(value: f32) -> bool {
    value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.window.num_samples, 13);
        assert_eq!(config.window.pivot(), 6);
        assert_eq!(config.window.future_start(), 7);
        assert_eq!(config.window.future_samples(), 6);
        assert_eq!(config.sequence.boundary_margin, 60);
        assert_eq!(config.smoothing.passes, 5);
        assert_eq!(config.rig.right_shoulder, "shoulder_R");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_adaptive_preset() {
        let config = PipelineConfig::preset(Preset::ModeAdaptive);
        assert_eq!(config.window.num_samples, 12);
        assert_eq!(config.window.pivot(), 6);
        assert_eq!(config.window.future_samples(), 5);
        assert!(config
            .export
            .sequences_path()
            .ends_with("sequences_mann.txt"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, "window:\n  num_samples: 9\nexport:\n  overwrite: true\n").unwrap();

        let config = PipelineConfig::from_yaml(&path).unwrap();

        assert_eq!(config.window.num_samples, 9);
        assert_eq!(config.window.window_radius, 60);
        assert!(config.export.overwrite);
        assert_eq!(config.export.dataset_name, "locomotion");
    }

    #[test]
    fn test_yaml_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        let config = PipelineConfig::preset(Preset::ModeAdaptive);

        config.to_yaml(&path).unwrap();
        let loaded = PipelineConfig::from_yaml(&path).unwrap();

        assert_eq!(loaded.window.num_samples, 12);
        assert_eq!(loaded.export.dataset_name, "mann");
    }

    #[test]
    fn test_validate_rejects_narrow_window() {
        let mut config = PipelineConfig::default();
        config.window.window_radius = 3;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PipelineConfig::default();
        config.window.num_samples = 2;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.smoothing.sigma = 0.0;
        assert!(config.validate().is_err());
    }
}
