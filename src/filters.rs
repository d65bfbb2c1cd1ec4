// filters.rs — Fixed filter programs used by the detection pipeline.
//
// Everything here is built from the convolution factory with retained
// kernels, so the whole suite can be regenerated after a context loss.
// The Gaussians are separable and run as X/Y 1D pairs — the 2-pass
// composition is numerically equivalent to the full 2D program and costs
// O(k) per pixel instead of O(k²).

use crate::context::Context;
use crate::convolution::Conv1D;
use crate::kernel::{self, Axis, KernelError};
use crate::texture::Texture;

/// Rec. 601 luma weights for greyscale conversion.
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Half-size of the local-mean window for illumination normalization.
const ILLUMINATION_RADIUS: usize = 7;

/// Guard against division by zero in dark regions.
const ILLUMINATION_EPS: f32 = 1e-3;

/// A separable blur: one X pass followed by one Y pass.
struct SeparablePair {
    x: Conv1D,
    y: Conv1D,
}

impl SeparablePair {
    fn new(ctx: &Context, kernel: &[f32]) -> Result<Self, KernelError> {
        Ok(SeparablePair {
            x: Conv1D::new(ctx, Axis::X, kernel, 1.0)?,
            y: Conv1D::new(ctx, Axis::Y, kernel, 1.0)?,
        })
    }

    fn run(&self, ctx: &Context, src: &Texture) -> Texture {
        self.y.run(ctx, &self.x.run(ctx, src))
    }

    fn rebuild(&mut self, ctx: &Context) {
        self.x.rebuild(ctx);
        self.y.rebuild(ctx);
    }
}

/// The fixed texture→texture transforms the pipeline composes:
/// denoising (gauss5), light smoothing (gauss3), greyscale conversion
/// and illumination normalization.
pub struct FilterSuite {
    gauss5: SeparablePair,
    gauss3: SeparablePair,
    local_mean: SeparablePair,
}

impl FilterSuite {
    pub fn new(ctx: &Context) -> Self {
        // These kernels are fixed and always valid, so construction
        // cannot fail at runtime.
        let gauss5 = SeparablePair::new(ctx, &kernel::gaussian_kernel_1d(2, 1.0))
            .expect("gauss5 kernel is statically valid");
        let gauss3 = SeparablePair::new(ctx, &kernel::gaussian_kernel_1d(1, 0.8))
            .expect("gauss3 kernel is statically valid");
        let local_mean = SeparablePair::new(ctx, &kernel::box_kernel_1d(ILLUMINATION_RADIUS))
            .expect("box kernel is statically valid");
        FilterSuite { gauss5, gauss3, local_mean }
    }

    /// Regenerate every program after a context loss. Kernel parameters
    /// were retained at construction, so the rebuilt programs are
    /// identical to the originals.
    pub fn rebuild(&mut self, ctx: &Context) {
        self.gauss5.rebuild(ctx);
        self.gauss3.rebuild(ctx);
        self.local_mean.rebuild(ctx);
        log::debug!("filter suite rebuilt (generation {})", ctx.generation());
    }

    /// 5-tap Gaussian blur, σ = 1.0. The pipeline's denoising step.
    pub fn gauss5(&self, ctx: &Context, src: &Texture) -> Texture {
        self.gauss5.run(ctx, src)
    }

    /// 3-tap Gaussian blur, σ = 0.8. The light post-enhancement smoothing.
    pub fn gauss3(&self, ctx: &Context, src: &Texture) -> Texture {
        self.gauss3.run(ctx, src)
    }

    /// Convert to single-channel luma (Rec. 601), replicated into R, G
    /// and B. Alpha passes through.
    pub fn greyscale(&self, _ctx: &Context, src: &Texture) -> Texture {
        let mut dst = Texture::new(src.width(), src.height());
        for (x, y, p) in src.pixels() {
            let l = p[0] * LUMA_WEIGHTS[0] + p[1] * LUMA_WEIGHTS[1] + p[2] * LUMA_WEIGHTS[2];
            dst.set(x, y, [l, l, l, p[3]]);
        }
        dst
    }

    /// Flatten uneven lighting by dividing each channel by twice its
    /// local mean. Uniformly lit regions land near 0.5 regardless of
    /// their absolute brightness; a flat image becomes a flat 0.5 image.
    pub fn normalize_illumination(&self, ctx: &Context, src: &Texture) -> Texture {
        let mean = self.local_mean.run(ctx, src);
        let mut dst = Texture::new(src.width(), src.height());
        for (x, y, p) in src.pixels() {
            let m = mean.get(x, y);
            let norm = |c: f32, mc: f32| (c / (2.0 * mc + ILLUMINATION_EPS)).clamp(0.0, 1.0);
            dst.set(x, y, [norm(p[0], m[0]), norm(p[1], m[1]), norm(p[2], m[2]), p[3]]);
        }
        dst
    }
}
