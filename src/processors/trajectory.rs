//! Root trajectory features.
//!
//! A trajectory row is a window of root samples, each expressed relative to
//! the root of the reference frame:
//!
//! ```text
//! [pos.x, pos.y, fwd.x, fwd.y, vel.x, vel.y, speed] * samples
//! ```
//!
//! Positions stay in the clip's native units. Velocities are converted to
//! metres per second using the sequence frame rate and unit scale.

use glam::Vec2;

use crate::config::{SequenceConfig, WindowConfig};
use crate::core::transforms::RootTransform;

use super::frame_range::FrameRange;

/// Floats per trajectory sample.
pub const TRAJECTORY_SAMPLE_WIDTH: usize = 7;

/// Which half of a training pair a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    /// Full window around the current frame.
    Input,
    /// Future half of the window around the next frame.
    Output,
}

impl View {
    /// Frame whose data feeds this view.
    #[inline]
    pub fn frame(self, reference: usize) -> usize {
        match self {
            View::Input => reference,
            View::Output => reference + 1,
        }
    }

    /// First window sample emitted for this view.
    #[inline]
    pub fn start_sample(self, window: &WindowConfig) -> usize {
        match self {
            View::Input => 0,
            View::Output => window.future_start(),
        }
    }

    /// Trajectory samples emitted for this view.
    #[inline]
    pub fn sample_count(self, window: &WindowConfig) -> usize {
        window.num_samples - self.start_sample(window)
    }
}

/// One root sample relative to a reference root.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrajectorySample {
    pub position: Vec2,
    pub forward: Vec2,
    /// Metres per second.
    pub velocity: Vec2,
    pub speed: f32,
}

impl TrajectorySample {
    pub fn to_array(&self) -> [f32; TRAJECTORY_SAMPLE_WIDTH] {
        [
            self.position.x,
            self.position.y,
            self.forward.x,
            self.forward.y,
            self.velocity.x,
            self.velocity.y,
            self.speed,
        ]
    }
}

/// Encodes trajectory windows over a sequence of root transforms.
#[derive(Debug, Clone)]
pub struct TrajectoryEncoder<'a> {
    roots: &'a [RootTransform],
    window: WindowConfig,
    fps: f32,
    unit_scale: f32,
}

impl<'a> TrajectoryEncoder<'a> {
    pub fn new(roots: &'a [RootTransform], window: &WindowConfig, sequence: &SequenceConfig) -> Self {
        Self {
            roots,
            window: window.clone(),
            fps: sequence.fps,
            unit_scale: sequence.unit_scale,
        }
    }

    /// Floats emitted per row for `view`.
    pub fn width(&self, view: View) -> usize {
        TRAJECTORY_SAMPLE_WIDTH * view.sample_count(&self.window)
    }

    /// Window frames for `view` around `reference`.
    pub fn frames(&self, reference: usize, view: View) -> FrameRange {
        FrameRange::new(
            self.window.num_samples,
            self.window.window_radius,
            view.frame(reference),
            view.start_sample(&self.window),
            self.roots.len(),
        )
    }

    /// Window samples for `view` around `reference`, relative to `root`.
    pub fn samples(&self, reference: usize, root: &RootTransform, view: View) -> Vec<TrajectorySample> {
        self.frames(reference, view)
            .map(|frame| self.sample(frame, root))
            .collect()
    }

    /// Flattened row for `view` around `reference`, relative to `root`.
    pub fn encode(&self, reference: usize, root: &RootTransform, view: View) -> Vec<f32> {
        let mut row = Vec::with_capacity(self.width(view));
        for frame in self.frames(reference, view) {
            row.extend_from_slice(&self.sample(frame, root).to_array());
        }
        row
    }

    fn sample(&self, frame: usize, root: &RootTransform) -> TrajectorySample {
        if self.roots.is_empty() {
            return TrajectorySample::default();
        }
        let frame = frame.min(self.roots.len() - 1);
        let current = &self.roots[frame];
        let previous = &self.roots[frame.saturating_sub(1)];

        let world_velocity = (current.translation() - previous.translation()) * self.fps;
        let local = root.local_velocity(world_velocity);
        let velocity = Vec2::new(local.x, local.z) / self.unit_scale;

        TrajectorySample {
            position: root.relative_position(current),
            forward: root.relative_forward(current),
            velocity,
            speed: velocity.length(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_relative_eq;
    use glam::Vec3;

    use super::*;

    /// Roots moving `step` cm per frame along `yaw`.
    fn straight_line(frames: usize, step: f32, yaw: f32) -> Vec<RootTransform> {
        let dir = glam::Quat::from_rotation_y(yaw) * Vec3::Z;
        (0..frames)
            .map(|i| RootTransform::from_yaw(dir * step * i as f32, yaw))
            .collect()
    }

    #[test]
    fn test_widths() {
        let roots = straight_line(10, 1.0, 0.0);
        let enc = TrajectoryEncoder::new(&roots, &WindowConfig::default(), &SequenceConfig::default());
        assert_eq!(enc.width(View::Input), 91);
        assert_eq!(enc.width(View::Output), 42);
        assert_eq!(enc.encode(5, &roots[5], View::Input).len(), 91);
        assert_eq!(enc.encode(5, &roots[5], View::Output).len(), 42);
    }

    #[test]
    fn test_straight_walk_samples() {
        // 1 m/s at 60 fps in centimetres.
        let roots = straight_line(300, 100.0 / 60.0, FRAC_PI_2);
        let enc = TrajectoryEncoder::new(&roots, &WindowConfig::default(), &SequenceConfig::default());

        let samples = enc.samples(150, &roots[150], View::Input);
        assert_eq!(samples.len(), 13);

        // Pivot sits on the root itself.
        assert!(samples[6].position.abs_diff_eq(Vec2::ZERO, 1e-3));
        // One second ahead is one metre straight forward.
        assert!(samples[12].position.abs_diff_eq(Vec2::new(0.0, 100.0), 1e-2));
        assert!(samples[0].position.abs_diff_eq(Vec2::new(0.0, -100.0), 1e-2));

        for s in &samples {
            assert!(s.forward.abs_diff_eq(Vec2::Y, 1e-5));
            assert!(s.velocity.abs_diff_eq(Vec2::new(0.0, 1.0), 1e-3));
            assert_relative_eq!(s.speed, 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_output_view_is_future_of_next_frame() {
        let roots = straight_line(300, 1.0, 0.0);
        let enc = TrajectoryEncoder::new(&roots, &WindowConfig::default(), &SequenceConfig::default());

        let frames: Vec<usize> = enc.frames(100, View::Output).collect();
        assert_eq!(frames, vec![111, 121, 131, 141, 151, 161]);

        let row = enc.encode(100, &roots[101], View::Output);
        // First future sample is 10 frames ahead of the next root.
        assert_relative_eq!(row[1], 10.0, epsilon = 1e-3);
    }

    #[test]
    fn test_first_frame_velocity_is_zero() {
        let roots = straight_line(20, 5.0, 0.0);
        let enc = TrajectoryEncoder::new(&roots, &WindowConfig::default(), &SequenceConfig::default());

        let samples = enc.samples(0, &roots[0], View::Input);
        assert_eq!(samples[0].speed, 0.0);
        assert!(samples[0].position.abs_diff_eq(Vec2::ZERO, 1e-5));
    }
}
