//! Energy-based voice activity detection for segmented capture.
//!
//! The original overlay sampled the analyser's byte frequency data and
//! compared the average against a threshold; here the same idea runs on
//! raw f32 samples as mean absolute amplitude.

/// Mean absolute amplitude of a chunk. Speech at normal levels sits
/// well above 0.01; room noise below it.
pub fn level(chunk: &[f32]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    chunk.iter().map(|s| s.abs()).sum::<f32>() / chunk.len() as f32
}

/// Tracks consecutive silent polls and reports when silence has
/// persisted long enough to close the segment. Counting polls instead
/// of wall time keeps detection deterministic at the fixed poll
/// interval.
pub struct SilenceDetector {
    threshold: f32,
    required_polls: u32,
    silent_polls: u32,
}

impl SilenceDetector {
    /// `required_polls` = silence duration / poll interval, rounded up.
    pub fn new(threshold: f32, required_polls: u32) -> Self {
        Self {
            threshold,
            required_polls: required_polls.max(1),
            silent_polls: 0,
        }
    }

    /// Feed one poll's energy. Returns true once silence has persisted
    /// for the required number of consecutive polls.
    pub fn observe(&mut self, energy: f32) -> bool {
        if energy < self.threshold {
            self.silent_polls += 1;
            self.silent_polls >= self.required_polls
        } else {
            self.silent_polls = 0;
            false
        }
    }

    pub fn reset(&mut self) {
        self.silent_polls = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_of_silence_is_zero() {
        assert_eq!(level(&[]), 0.0);
        assert_eq!(level(&[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn level_averages_magnitudes() {
        let l = level(&[0.5, -0.5, 0.5, -0.5]);
        assert!((l - 0.5).abs() < 1e-6);
    }

    #[test]
    fn silence_must_be_consecutive() {
        let mut det = SilenceDetector::new(0.01, 3);
        assert!(!det.observe(0.0));
        assert!(!det.observe(0.0));
        // Speech resets the run.
        assert!(!det.observe(0.5));
        assert!(!det.observe(0.0));
        assert!(!det.observe(0.0));
        assert!(det.observe(0.0));
    }

    #[test]
    fn triggers_exactly_at_required_polls() {
        let mut det = SilenceDetector::new(0.01, 15);
        for _ in 0..14 {
            assert!(!det.observe(0.001));
        }
        assert!(det.observe(0.001));
    }
}
