// texture.rs — Host model of an accelerator-resident RGBA texture.
//
// Every filter program in this crate reads one `Texture` and produces a
// new one; textures are never mutated in place once handed to a filter.
// Pixels are four f32 channels (RGBA). Filters operate on the first three
// channels and pass the fourth through from the center pixel.
//
// BORDER HANDLING: `sample_clamped` replicates edge pixels — out-of-range
// coordinates are clamped to [0, w-1] × [0, h-1], never wrapped and never
// zero-padded. This is the only addressing mode the convolution programs
// use, matching clamp-to-edge texture sampling on the device.

use std::fmt;

/// Number of channels per pixel.
pub const CHANNELS: usize = 4;

/// A 2D grid of RGBA f32 pixels with runtime dimensions.
///
/// Stored row-major, channel-interleaved: the pixel at (x, y) occupies
/// `data[(y * width + x) * 4 .. +4]`.
pub struct Texture {
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl Clone for Texture {
    fn clone(&self) -> Self {
        Texture {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
        }
    }
}

impl Texture {
    /// Create a zero-initialized texture (alpha included).
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "texture dimensions must be nonzero");
        Texture {
            data: vec![0.0; width * height * CHANNELS],
            width,
            height,
        }
    }

    /// Create a texture filled with a constant pixel value.
    pub fn filled(width: usize, height: usize, pixel: [f32; 4]) -> Self {
        let mut t = Texture::new(width, height);
        for p in t.data.chunks_exact_mut(CHANNELS) {
            p.copy_from_slice(&pixel);
        }
        t
    }

    /// Create a texture from interleaved RGBA data.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height * 4`.
    pub fn from_rgba(width: usize, height: usize, data: Vec<f32>) -> Self {
        assert!(width > 0 && height > 0, "texture dimensions must be nonzero");
        assert_eq!(
            data.len(),
            width * height * CHANNELS,
            "data length ({}) must equal width * height * 4 ({})",
            data.len(),
            width * height * CHANNELS,
        );
        Texture { data, width, height }
    }

    /// Create a greyscale texture from single-channel luma values.
    /// Each value is replicated into R, G and B; alpha is set to 1.
    pub fn from_luma(width: usize, height: usize, luma: Vec<f32>) -> Self {
        assert_eq!(
            luma.len(),
            width * height,
            "luma length ({}) must equal width * height ({})",
            luma.len(),
            width * height,
        );
        let mut data = Vec::with_capacity(luma.len() * CHANNELS);
        for v in luma {
            data.extend_from_slice(&[v, v, v, 1.0]);
        }
        Texture { data, width, height }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Read the pixel at (x, y).
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> [f32; 4] {
        self.bounds_check(x, y);
        let i = (y * self.width + x) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Write the pixel at (x, y).
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, pixel: [f32; 4]) {
        self.bounds_check(x, y);
        let i = (y * self.width + x) * CHANNELS;
        self.data[i..i + CHANNELS].copy_from_slice(&pixel);
    }

    /// Read a pixel with replicate-edge addressing: signed coordinates are
    /// clamped to the valid range, so every (x, y) in ℤ² resolves to a
    /// pixel inside the image.
    #[inline]
    pub fn sample_clamped(&self, x: isize, y: isize) -> [f32; 4] {
        let x = x.clamp(0, (self.width - 1) as isize) as usize;
        let y = y.clamp(0, (self.height - 1) as isize) as usize;
        let i = (y * self.width + x) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// The first channel at (x, y). Convenience for greyscale consumers
    /// (detectors run on preprocessed single-channel textures).
    #[inline]
    pub fn luma(&self, x: usize, y: usize) -> f32 {
        self.bounds_check(x, y);
        self.data[(y * self.width + x) * CHANNELS]
    }

    /// Iterate over all pixels as `(x, y, rgba)` tuples in scan order.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, [f32; 4])> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| (x, y, self.get(x, y))))
    }

    /// The underlying interleaved channel data.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable access to the underlying channel data.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Maximum absolute channel difference against another texture.
    /// Used by tests comparing filter outputs.
    pub fn max_difference(&self, other: &Texture) -> f32 {
        assert_eq!(self.width, other.width, "width mismatch");
        assert_eq!(self.height, other.height, "height mismatch");
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max)
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for texture {}×{}",
            self.width,
            self.height,
        );
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Texture {{ {}×{} }}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let t = Texture::new(4, 3);
        assert_eq!(t.width(), 4);
        assert_eq!(t.height(), 3);
        for (_, _, p) in t.pixels() {
            assert_eq!(p, [0.0; 4]);
        }
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut t = Texture::new(4, 3);
        t.set(0, 0, [0.1, 0.2, 0.3, 1.0]);
        t.set(3, 2, [1.0, 0.0, 0.5, 0.25]);
        assert_eq!(t.get(0, 0), [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(t.get(3, 2), [1.0, 0.0, 0.5, 0.25]);
        assert_eq!(t.get(1, 1), [0.0; 4]);
    }

    #[test]
    fn test_from_luma_replicates_channels() {
        let t = Texture::from_luma(2, 1, vec![0.25, 0.75]);
        assert_eq!(t.get(0, 0), [0.25, 0.25, 0.25, 1.0]);
        assert_eq!(t.get(1, 0), [0.75, 0.75, 0.75, 1.0]);
        assert_eq!(t.luma(1, 0), 0.75);
    }

    #[test]
    fn test_clamped_sampling_replicates_edges() {
        let t = Texture::from_luma(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        // Out of range on every side resolves to the nearest edge pixel.
        assert_eq!(t.sample_clamped(-5, -5)[0], 1.0);
        assert_eq!(t.sample_clamped(7, 0)[0], 2.0);
        assert_eq!(t.sample_clamped(0, 9)[0], 3.0);
        assert_eq!(t.sample_clamped(9, 9)[0], 4.0);
        // In range is an ordinary read.
        assert_eq!(t.sample_clamped(1, 1)[0], 4.0);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_get_out_of_bounds() {
        let t = Texture::new(4, 4);
        t.get(4, 0);
    }

    #[test]
    #[should_panic(expected = "must equal")]
    fn test_from_rgba_wrong_length() {
        let _ = Texture::from_rgba(2, 2, vec![0.0; 15]);
    }

    #[test]
    fn test_max_difference() {
        let a = Texture::from_luma(2, 1, vec![0.0, 1.0]);
        let mut b = a.clone();
        b.set(1, 0, [0.5, 1.0, 1.0, 1.0]);
        assert!((a.max_difference(&b) - 0.5).abs() < 1e-6);
    }
}
