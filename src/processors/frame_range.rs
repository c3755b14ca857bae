//! Clamped temporal windows around a reference frame.

use std::iter::FusedIterator;

/// Frame indices of a fixed-width window centred on a reference frame.
///
/// The window has `num_samples` samples spaced `window_radius / pivot` frames
/// apart, where `pivot = num_samples / 2` is the sample that lands on the
/// reference frame. Iteration starts at `start_sample`; every yielded index is
/// clamped into `[0, frame_count - 1]`, so the number of items never depends
/// on where the reference sits in the clip.
///
/// The range is `Copy`: iterate a copy to restart it.
///
/// # Example
///
/// ```
/// use locomotion_dataset::processors::frame_range::FrameRange;
///
/// let frames: Vec<usize> = FrameRange::new(13, 60, 100, 0, 500).collect();
/// assert_eq!(frames.first(), Some(&40));
/// assert_eq!(frames[6], 100);
/// assert_eq!(frames.last(), Some(&160));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    reference: usize,
    pivot: usize,
    step: usize,
    last_frame: usize,
    next: usize,
    end: usize,
}

impl FrameRange {
    pub fn new(
        num_samples: usize,
        window_radius: usize,
        reference: usize,
        start_sample: usize,
        frame_count: usize,
    ) -> Self {
        let pivot = num_samples / 2;
        let step = if pivot == 0 {
            1
        } else {
            (window_radius / pivot).max(1)
        };
        Self {
            reference,
            pivot,
            step,
            last_frame: frame_count.saturating_sub(1),
            next: start_sample.min(num_samples),
            end: num_samples,
        }
    }

    #[inline]
    pub fn pivot(&self) -> usize {
        self.pivot
    }

    /// Frame spacing between consecutive samples.
    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Clamped frame index of window sample `sample`.
    pub fn frame_at(&self, sample: usize) -> usize {
        let offset = (sample as i64 - self.pivot as i64) * self.step as i64;
        let frame = (self.reference as i64 + offset).max(0) as usize;
        frame.min(self.last_frame)
    }
}

impl Iterator for FrameRange {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.next >= self.end {
            return None;
        }
        let frame = self.frame_at(self.next);
        self.next += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FrameRange {}

impl FusedIterator for FrameRange {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window() {
        let range = FrameRange::new(13, 60, 100, 0, 1000);
        assert_eq!(range.pivot(), 6);
        assert_eq!(range.step(), 10);
        assert_eq!(range.len(), 13);

        let frames: Vec<usize> = range.collect();
        assert_eq!(frames, (40..=160).step_by(10).collect::<Vec<_>>());
    }

    #[test]
    fn test_future_half() {
        let frames: Vec<usize> = FrameRange::new(13, 60, 101, 7, 1000).collect();
        assert_eq!(frames, vec![111, 121, 131, 141, 151, 161]);
    }

    #[test]
    fn test_clamping_keeps_length() {
        let early: Vec<usize> = FrameRange::new(13, 60, 5, 0, 30).collect();
        assert_eq!(early.len(), 13);
        assert_eq!(&early[..6], &[0; 6]);
        assert_eq!(early[6], 5);
        assert_eq!(&early[9..], &[29; 4]);

        assert!(FrameRange::new(13, 60, 500, 0, 1).all(|f| f == 0));
    }

    #[test]
    fn test_restartable() {
        let range = FrameRange::new(12, 60, 70, 0, 200);
        let first: Vec<usize> = range.collect();
        let second: Vec<usize> = range.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 12);
        assert_eq!(first[6], 70);
    }

    #[test]
    fn test_exhausted_stays_exhausted() {
        let mut range = FrameRange::new(3, 2, 10, 2, 100);
        assert_eq!(range.next(), Some(12));
        assert_eq!(range.len(), 0);
        assert_eq!(range.next(), None);
        assert_eq!(range.next(), None);
    }
}
