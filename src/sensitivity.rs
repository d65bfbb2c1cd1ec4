// sensitivity.rs — Closed-loop sensitivity control.
//
// The controller drives a detector's normalized sensitivity so that the
// mean observed keypoint count converges to an expected value within a
// relative tolerance band. The plant is a black box: feature count as a
// function of sensitivity, expensive to evaluate, monotone in practice
// but noisy. A proportional step on the normalized count error, with a
// dead band the width of the tolerance and saturation at the [0, 1]
// sensitivity bounds, is enough — observations arrive once per detection
// so there is no benefit to anything fancier.
//
// The controller is an observer of the downloader's count stream: the
// pipeline feeds every pre-truncation total into `observe()`, which
// publishes the corrected sensitivity to all subscribers and returns it.
// Dropping the controller detaches everything; no subscription outlives
// it.

/// Proportional gain on the normalized count error.
const GAIN: f32 = 0.3;

/// Exponential smoothing factor for the observed count (weight of the
/// newest observation).
const SMOOTHING: f32 = 0.5;

/// Default relative tolerance band when the caller specifies none.
pub const DEFAULT_TOLERANCE: f32 = 0.10;

/// Closed-loop controller converting observed feature counts into
/// sensitivity corrections.
pub struct SensitivityController {
    expected: f32,
    tolerance: f32,
    sensitivity: f32,
    /// Running mean of observed counts. `None` until the first
    /// observation (and again after `reset()`), so the next observation
    /// re-anchors the filter instead of averaging against stale state.
    mean_count: Option<f32>,
    subscribers: Vec<Box<dyn FnMut(f32) + Send>>,
}

impl SensitivityController {
    /// Create a controller targeting `expected` features ± `tolerance`
    /// (relative), starting from the given sensitivity.
    pub fn new(expected: f32, tolerance: f32, initial_sensitivity: f32) -> Self {
        SensitivityController {
            expected: expected.max(0.0),
            tolerance: tolerance.max(0.0),
            sensitivity: initial_sensitivity.clamp(0.0, 1.0),
            mean_count: None,
            subscribers: Vec::new(),
        }
    }

    pub fn expected(&self) -> f32 {
        self.expected
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// The last published sensitivity.
    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    /// Retarget the controller. The smoothed count estimate is kept —
    /// the plant did not change, only the goal.
    pub fn set_expected(&mut self, expected: f32) {
        self.expected = expected.max(0.0);
    }

    pub fn set_tolerance(&mut self, tolerance: f32) {
        self.tolerance = tolerance.max(0.0);
    }

    /// Register a subscriber for published sensitivity values. The
    /// owning pipeline is the sole subscriber in practice, but the
    /// contract supports any number.
    pub fn subscribe(&mut self, subscriber: impl FnMut(f32) + Send + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Feed one observed (pre-truncation) keypoint count. Updates the
    /// running mean, applies a proportional correction when the mean is
    /// outside the tolerance band, publishes to subscribers, and returns
    /// the current sensitivity.
    pub fn observe(&mut self, count: usize) -> f32 {
        let count = count as f32;
        let mean = match self.mean_count {
            Some(prev) => prev * (1.0 - SMOOTHING) + count * SMOOTHING,
            None => count,
        };
        self.mean_count = Some(mean);

        // Normalized error; expected == 0 means "as few as possible",
        // handled by driving the error purely from the observation.
        let error = if self.expected > 0.0 {
            (self.expected - mean) / self.expected
        } else if mean > 0.0 {
            -1.0
        } else {
            0.0
        };

        if error.abs() > self.tolerance {
            let corrected = (self.sensitivity + GAIN * error).clamp(0.0, 1.0);
            if corrected != self.sensitivity {
                log::trace!(
                    "sensitivity correction: mean count {mean:.1}, expected {}, {} -> {corrected}",
                    self.expected,
                    self.sensitivity,
                );
                self.sensitivity = corrected;
                for subscriber in &mut self.subscribers {
                    subscriber(corrected);
                }
            }
        }
        self.sensitivity
    }

    /// Forget the running count estimate. Safe after a context loss —
    /// the next observation re-anchors the filter, so convergence
    /// guarantees are unaffected.
    pub fn reset(&mut self) {
        self.mean_count = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_too_few_features_raises_sensitivity() {
        let mut c = SensitivityController::new(100.0, 0.1, 0.5);
        let s = c.observe(10);
        assert!(s > 0.5, "sensitivity should rise, got {s}");
    }

    #[test]
    fn test_too_many_features_lowers_sensitivity() {
        let mut c = SensitivityController::new(100.0, 0.1, 0.5);
        let s = c.observe(400);
        assert!(s < 0.5, "sensitivity should drop, got {s}");
    }

    #[test]
    fn test_dead_band_holds_sensitivity() {
        let mut c = SensitivityController::new(100.0, 0.1, 0.5);
        assert_eq!(c.observe(95), 0.5);
        assert_eq!(c.observe(105), 0.5);
    }

    #[test]
    fn test_saturates_at_bounds() {
        let mut c = SensitivityController::new(1000.0, 0.1, 0.9);
        for _ in 0..10 {
            c.observe(0);
        }
        assert_eq!(c.sensitivity(), 1.0);

        let mut c = SensitivityController::new(1.0, 0.1, 0.1);
        for _ in 0..10 {
            c.observe(10_000);
        }
        assert_eq!(c.sensitivity(), 0.0);
    }

    #[test]
    fn test_converges_on_monotone_plant() {
        // Plant: count = 1000 * s², deterministic and monotone.
        let expected = 200.0;
        let mut c = SensitivityController::new(expected, 0.1, 0.5);
        let mut s = c.sensitivity();
        let mut count = 0usize;
        for _ in 0..100 {
            count = (1000.0 * s * s).round() as usize;
            s = c.observe(count);
        }
        assert!(
            (count as f32) >= expected * 0.9 && (count as f32) <= expected * 1.1,
            "count {count} outside [180, 220]",
        );
    }

    #[test]
    fn test_subscribers_receive_published_values() {
        let hits = Arc::new(AtomicU32::new(0));
        let mut c = SensitivityController::new(100.0, 0.1, 0.5);
        let h = hits.clone();
        c.subscribe(move |v| {
            assert!((0.0..=1.0).contains(&v));
            h.fetch_add(1, Ordering::SeqCst);
        });
        c.observe(10); // outside the band → publish
        c.observe(100); // the mean is still off → may publish
        assert!(hits.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_reset_reanchors_mean() {
        let mut c = SensitivityController::new(100.0, 0.1, 0.5);
        c.observe(1000);
        c.reset();
        // After reset the mean is exactly the next observation, which is
        // in band, so the sensitivity holds.
        let before = c.sensitivity();
        assert_eq!(c.observe(100), before);
    }

    #[test]
    fn test_expected_zero_drives_sensitivity_down() {
        let mut c = SensitivityController::new(0.0, 0.1, 0.8);
        for _ in 0..5 {
            c.observe(50);
        }
        assert!(c.sensitivity() < 0.8);
        // No features observed: nothing to correct.
        let mut c = SensitivityController::new(0.0, 0.1, 0.3);
        assert_eq!(c.observe(0), 0.3);
    }
}
