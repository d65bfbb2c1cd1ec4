// fast.rs — FAST corner detector (Features from Accelerated Segment Test).
//
// Reference: Rosten & Drummond, "Machine learning for high-speed corner
// detection" (ECCV 2006).
//
// Algorithm:
//   For each pixel, sample 16 points on a Bresenham circle of radius 3.
//   Classify each as BRIGHTER, DARKER, or SIMILAR relative to the center ±
//   threshold. A corner exists if ≥ N contiguous circle pixels are all
//   BRIGHTER or all DARKER.
//
// The "contiguous" check must wrap around the circle (index 15 is adjacent
// to index 0). The bitmask trick below doubles the 16-bit classification
// mask into a u32 and scans for a run of length N with repeated AND-shift.
//
// Intensities are the normalized luma channel in [0, 1]. The detector's
// threshold is derived from the pipeline sensitivity as 1 − sensitivity,
// so sensitivity 0 gives a threshold no pair of in-range intensities can
// exceed and detection yields nothing on any image.

use crate::algorithm::FeatureDetector;
use crate::context::Context;
use crate::download::{encode_keypoints, Feature};
use crate::texture::Texture;

/// Bresenham circle of radius 3: 16 (dx, dy) offsets.
/// Listed clockwise starting from 12 o'clock, matching Rosten's convention.
const CIRCLE_OFFSETS: [(isize, isize); 16] = [
    ( 0, -3), ( 1, -3), ( 2, -2), ( 3, -1),
    ( 3,  0), ( 3,  1), ( 2,  2), ( 1,  3),
    ( 0,  3), (-1,  3), (-2,  2), (-3,  1),
    (-3,  0), (-3, -1), (-2, -2), (-1, -3),
];

/// Circle radius; detection skips a border this wide.
const BORDER: usize = 3;

/// FAST-N corner detector over normalized greyscale textures.
///
/// Common choices: FAST-9 (more features, some noise) or FAST-12 (fewer,
/// more robust).
pub struct FastDetector {
    /// Intensity difference threshold in [0, 1]. A circle pixel is
    /// classified as BRIGHTER/DARKER only if it differs from the center
    /// by more than this value.
    threshold: f32,
    /// Minimum number of contiguous circle pixels required.
    /// Must be in [9, 12].
    arc_length: usize,
}

impl Default for FastDetector {
    /// FAST-9 at sensitivity 0 (detects nothing until raised).
    fn default() -> Self {
        FastDetector::new(9)
    }
}

impl FastDetector {
    /// Create a FAST-N detector with `arc_length = n`.
    ///
    /// # Panics
    /// Panics if `n` is not in the range [9, 12].
    pub fn new(n: usize) -> Self {
        assert!((9..=12).contains(&n), "arc_length must be 9..=12 (got {n})");
        FastDetector { threshold: 1.0, arc_length: n }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Run the segment test over the luma channel, returning the
    /// surviving corners after 3×3 non-maximum suppression.
    fn corners(&self, image: &Texture) -> Vec<Feature> {
        let w = image.width();
        let h = image.height();
        if w <= 2 * BORDER || h <= 2 * BORDER {
            return Vec::new();
        }

        let min_cardinals: u8 = if self.arc_length >= 12 { 3 } else { 2 };
        let mut scores = vec![0.0f32; w * h];

        for y in BORDER..(h - BORDER) {
            for x in BORDER..(w - BORDER) {
                let center = image.luma(x, y);
                let sample = |dx: isize, dy: isize| {
                    image.luma((x as isize + dx) as usize, (y as isize + dy) as usize)
                };

                // Quick rejection (Rosten's high-speed test): check the
                // 4 cardinal points first.
                let mut bright_count = 0u8;
                let mut dark_count = 0u8;
                for i in [0usize, 4, 8, 12] {
                    let (dx, dy) = CIRCLE_OFFSETS[i];
                    let p = sample(dx, dy);
                    bright_count += (p > center + self.threshold) as u8;
                    dark_count += (p < center - self.threshold) as u8;
                }
                if bright_count < min_cardinals && dark_count < min_cardinals {
                    continue;
                }

                // Full 16-point test.
                let mut circle = [0.0f32; 16];
                for (i, &(dx, dy)) in CIRCLE_OFFSETS.iter().enumerate() {
                    circle[i] = sample(dx, dy);
                }

                let (is_corner, score) = self.check_contiguous_and_score(center, &circle);
                if is_corner {
                    scores[y * w + x] = score;
                }
            }
        }

        self.suppress(&scores, w, h)
    }

    /// Check whether N contiguous circle pixels are all brighter or all
    /// darker than center ± threshold, and compute the corner score.
    ///
    /// Uses a bitmask approach instead of a doubled-array scan:
    ///   1. Build u16 bright_mask / dark_mask from threshold classification.
    ///   2. Check for N contiguous set bits via repeated AND-shift.
    ///   3. If corner, find the longest run and score it.
    ///
    /// Returns (is_corner, score). Score = sum of (|diff| - threshold)
    /// for the qualifying pixels on the best arc.
    fn check_contiguous_and_score(&self, center: f32, circle: &[f32; 16]) -> (bool, f32) {
        let n = self.arc_length;

        let mut bright_mask: u16 = 0;
        let mut dark_mask: u16 = 0;
        for (i, &p) in circle.iter().enumerate() {
            let diff = p - center;
            if diff > self.threshold {
                bright_mask |= 1 << i;
            } else if diff < -self.threshold {
                dark_mask |= 1 << i;
            }
        }

        // Quick popcount rejection: need at least N bits set.
        let mut best_score = -1.0f32;
        for mask in [bright_mask, dark_mask] {
            if (mask.count_ones() as usize) < n {
                continue;
            }
            // N contiguous set bits in a circular 16-bit pattern: double
            // the mask into u32 to handle wrap-around, then AND-shift
            // N-1 times. Nonzero result means a run of N exists.
            let m32 = (mask as u32) | ((mask as u32) << 16);
            let mut acc = m32;
            for _ in 1..n {
                acc &= acc >> 1;
            }
            if acc != 0 {
                best_score = best_score.max(self.best_arc_score(center, circle, mask));
            }
        }

        if best_score >= 0.0 {
            (true, best_score)
        } else {
            (false, 0.0)
        }
    }

    /// Find the longest contiguous arc in a circular 16-bit mask and
    /// compute its score. Used only for confirmed corners (rare path).
    #[inline]
    fn best_arc_score(&self, center: f32, circle: &[f32; 16], mask: u16) -> f32 {
        let m32 = (mask as u32) | ((mask as u32) << 16);
        let mut best_start = 0usize;
        let mut best_len = 0usize;
        let mut i = 0u32;
        while i < 16 {
            if m32 & (1 << i) == 0 {
                i += 1;
                continue;
            }
            let start = i;
            while i < 32 && (m32 & (1 << i)) != 0 {
                i += 1;
            }
            let run_len = (i - start) as usize;
            if run_len > best_len {
                best_len = run_len;
                best_start = start as usize;
            }
        }
        // A full ring doubles into a single 32-bit run; the arc can never
        // be longer than the circle itself.
        let best_len = best_len.min(16);

        let mut score = 0.0f32;
        for j in best_start..best_start + best_len {
            let diff = (circle[j % 16] - center).abs() - self.threshold;
            score += diff.max(0.0);
        }
        score
    }

    /// 3×3 non-maximum suppression over the score map. Plateau ties are
    /// broken in scan order so a flat maximum yields one corner.
    fn suppress(&self, scores: &[f32], w: usize, h: usize) -> Vec<Feature> {
        let mut features = Vec::new();
        for y in BORDER..(h - BORDER) {
            for x in BORDER..(w - BORDER) {
                let s = scores[y * w + x];
                if s <= 0.0 {
                    continue;
                }
                let mut is_max = true;
                'window: for dy in -1isize..=1 {
                    for dx in -1isize..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = (x as isize + dx) as usize;
                        let ny = (y as isize + dy) as usize;
                        let n = scores[ny * w + nx];
                        let earlier = dy < 0 || (dy == 0 && dx < 0);
                        if (earlier && n >= s) || (!earlier && n > s) {
                            is_max = false;
                            break 'window;
                        }
                    }
                }
                if is_max {
                    features.push(Feature {
                        x: x as f32,
                        y: y as f32,
                        score: s,
                        descriptor: None,
                    });
                }
            }
        }
        features
    }
}

impl FeatureDetector for FastDetector {
    fn on_sensitivity_change(&mut self, sensitivity: f32) {
        self.threshold = 1.0 - sensitivity.clamp(0.0, 1.0);
        log::trace!("fast threshold set to {}", self.threshold);
    }

    fn detect(&mut self, _ctx: &Context, image: &Texture) -> Texture {
        let features = self.corners(image);
        log::trace!("fast: {} corners", features.len());
        encode_keypoints(&features, 0)
    }
}
