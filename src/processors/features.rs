//! Feature rows, tables and their column layout.

use glam::Vec2;

use crate::config::WindowConfig;
use crate::core::animation::{SequenceInfo, Skeleton};

use super::joints::JOINT_FEATURE_WIDTH;
use super::trajectory::{View, TRAJECTORY_SAMPLE_WIDTH};

/// Floats of the root delta that prefixes every output row.
pub const DELTA_WIDTH: usize = 3;

const TRAJECTORY_COLUMNS: [&str; TRAJECTORY_SAMPLE_WIDTH] = [
    "root_pos_x",
    "root_pos_y",
    "root_fwd_x",
    "root_fwd_y",
    "root_vel_x",
    "root_vel_y",
    "root_speed",
];

const JOINT_COLUMNS: [&str; JOINT_FEATURE_WIDTH] = [
    "jpos_x", "jpos_y", "jpos_z", "jrot_0", "jrot_1", "jrot_2", "jrot_3", "jrot_4", "jrot_5",
    "jvel_x", "jvel_y", "jvel_z",
];

/// Motion of the root from one frame to the next, in the current root's
/// frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RootDelta {
    pub position: Vec2,
    /// Signed turn in radians, counter-clockwise positive.
    pub angle: f32,
}

impl RootDelta {
    pub fn to_array(&self) -> [f32; DELTA_WIDTH] {
        [self.position.x, self.position.y, self.angle]
    }
}

/// Input and output rows of one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameFeatures {
    pub frame: usize,
    pub input: Vec<f32>,
    /// Delta first, then the output trajectory and joints.
    pub output: Vec<f32>,
}

/// Column names of the input and output rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLayout {
    pub input_columns: Vec<String>,
    pub output_columns: Vec<String>,
}

impl FeatureLayout {
    pub fn new(window: &WindowConfig, skeleton: &Skeleton) -> Self {
        let bones = skeleton.names();

        let mut input_columns = trajectory_columns("", 0..window.num_samples);
        input_columns.extend(joint_columns("", bones));

        let mut output_columns: Vec<String> =
            ["delta_x", "delta_y", "delta_angle"].iter().map(|s| s.to_string()).collect();
        output_columns.extend(trajectory_columns(
            "out_",
            View::Output.start_sample(window)..window.num_samples,
        ));
        output_columns.extend(joint_columns("out_", bones));

        Self {
            input_columns,
            output_columns,
        }
    }

    #[inline]
    pub fn input_width(&self) -> usize {
        self.input_columns.len()
    }

    #[inline]
    pub fn output_width(&self) -> usize {
        self.output_columns.len()
    }
}

fn trajectory_columns(prefix: &str, samples: std::ops::Range<usize>) -> Vec<String> {
    samples
        .flat_map(|i| {
            TRAJECTORY_COLUMNS
                .iter()
                .map(move |name| format!("{prefix}{name}_{i}"))
        })
        .collect()
}

fn joint_columns(prefix: &str, bones: &[String]) -> Vec<String> {
    bones
        .iter()
        .flat_map(|bone| {
            JOINT_COLUMNS
                .iter()
                .map(move |name| format!("{prefix}{name}_{bone}"))
        })
        .collect()
}

/// All rows extracted from one sequence, in frame order.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub info: SequenceInfo,
    pub layout: FeatureLayout,
    pub frames: Vec<FrameFeatures>,
}

impl FeatureTable {
    pub fn new(info: SequenceInfo, layout: FeatureLayout) -> Self {
        Self {
            info,
            layout,
            frames: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn input_width(&self) -> usize {
        self.layout.input_width()
    }

    #[inline]
    pub fn output_width(&self) -> usize {
        self.layout.output_width()
    }

    /// Input rows concatenated into one buffer.
    pub fn flat_inputs(&self) -> Vec<f32> {
        let mut data = Vec::with_capacity(self.len() * self.input_width());
        for f in &self.frames {
            data.extend_from_slice(&f.input);
        }
        data
    }

    /// Output rows concatenated into one buffer.
    pub fn flat_outputs(&self) -> Vec<f32> {
        let mut data = Vec::with_capacity(self.len() * self.output_width());
        for f in &self.frames {
            data.extend_from_slice(&f.output);
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_widths() {
        let skeleton = Skeleton::from_named_parents(&[("hip", None), ("spine", Some("hip"))]).unwrap();
        let layout = FeatureLayout::new(&WindowConfig::default(), &skeleton);

        assert_eq!(layout.input_width(), 91 + 24);
        assert_eq!(layout.output_width(), 3 + 42 + 24);

        assert_eq!(layout.input_columns[0], "root_pos_x_0");
        assert_eq!(layout.input_columns[90], "root_speed_12");
        assert_eq!(layout.input_columns[91], "jpos_x_hip");
        assert_eq!(layout.input_columns[114], "jvel_z_spine");

        assert_eq!(&layout.output_columns[..3], &["delta_x", "delta_y", "delta_angle"]);
        assert_eq!(layout.output_columns[3], "out_root_pos_x_7");
        assert_eq!(layout.output_columns[3 + 42], "out_jpos_x_hip");
    }

    #[test]
    fn test_mode_adaptive_window() {
        let skeleton = Skeleton::from_named_parents(&[("hip", None)]).unwrap();
        let window = WindowConfig {
            num_samples: 12,
            window_radius: 60,
        };
        let layout = FeatureLayout::new(&window, &skeleton);
        assert_eq!(layout.input_width(), 7 * 12 + 12);
        assert_eq!(layout.output_width(), 3 + 7 * 5 + 12);
    }
}
