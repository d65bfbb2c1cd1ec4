// convolution.rs — Runtime-built convolution programs.
//
// The original system synthesized per-pixel filter source text at runtime.
// Here each program shape is a builder that validates its kernel once and
// bakes the weights into a typed tap list; evaluation walks the taps with
// clamp-to-edge sampling. Four shapes are exposed:
//
//   Conv2D        — square array kernel, footprint [-N, N]²
//   Conv1D        — 1D array kernel along one axis, footprint [-N, N]
//   tex_conv_2d   — square kernel fetched from a texture at eval time
//   TexConv1D     — 1D texture kernel along one axis
//
// KERNEL ORIENTATION: the device coordinate system grows downward while
// kernels are authored with the mathematically conventional orientation,
// so the vertical kernel index is inverted when a weight is mapped to its
// offset: row = size - 1 - (dy + N). The same inversion is applied by the
// 2D generator, the Y-axis 1D generator and the texture-kernel packer —
// dropping it anywhere would vertically mirror the filter.
//
// WEIGHT BAKING: the normalization constant is multiplied into every
// weight once, at build time. Zero-weight taps are elided; correctness
// never depends on the elision, only evaluation cost.
//
// SEPARABILITY: composing an X pass and a Y pass built from a separable
// decomposition is numerically equivalent to the single 2D program within
// floating-point rounding, at O(k) per pixel instead of O(k²). This is a
// contract, not a hint — tests/test_convolution.rs holds it.

use crate::context::Context;
use crate::kernel::{self, Axis, KernelError};
use crate::texture::Texture;

// ---------------------------------------------------------------------------
// Conv2D — square array kernel
// ---------------------------------------------------------------------------

/// A baked 2D tap: sample offset plus pre-normalized weight.
#[derive(Debug, Clone, Copy)]
struct Tap2 {
    dx: isize,
    dy: isize,
    weight: f32,
}

/// A 2D convolution program built from a flat square kernel.
///
/// The kernel and normalization constant are retained so the program can
/// be rebuilt verbatim after a context loss.
pub struct Conv2D {
    kernel: Vec<f32>,
    norm: f32,
    size: usize,
    taps: Vec<Tap2>,
    generation: u64,
}

impl Conv2D {
    /// Build a 2D convolution program.
    ///
    /// # Errors
    /// Returns a fatal [`KernelError`] if `kernel.len()` is not an odd
    /// perfect square.
    pub fn new(ctx: &Context, kernel: &[f32], norm: f32) -> Result<Self, KernelError> {
        let size = kernel::validate_2d(kernel.len())?;
        let mut program = Conv2D {
            kernel: kernel.to_vec(),
            norm,
            size,
            taps: Vec::new(),
            generation: ctx.generation(),
        };
        program.taps = program.bake();
        Ok(program)
    }

    /// Kernel side (k for a k×k kernel).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Rebuild the program against the current context generation from
    /// the retained kernel parameters.
    pub fn rebuild(&mut self, ctx: &Context) {
        self.taps = self.bake();
        self.generation = ctx.generation();
    }

    fn bake(&self) -> Vec<Tap2> {
        let n = (self.size / 2) as isize;
        let size = self.size as isize;
        let mut taps = Vec::with_capacity(self.size * self.size);
        for dy in -n..=n {
            // Vertical kernel index inversion.
            let row = size - 1 - (dy + n);
            for dx in -n..=n {
                let weight = self.kernel[(row * size + (dx + n)) as usize] * self.norm;
                if weight != 0.0 {
                    taps.push(Tap2 { dx, dy, weight });
                }
            }
        }
        taps
    }

    /// Apply the program, producing a new texture of the same size.
    /// Total over the image domain — no evaluation-time error paths.
    pub fn run(&self, ctx: &Context, src: &Texture) -> Texture {
        debug_assert_eq!(
            self.generation,
            ctx.generation(),
            "stale convolution program: rebuild() after context loss",
        );
        let (w, h) = (src.width(), src.height());
        let mut dst = Texture::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let center = src.get(x, y);
                let (mut r, mut g, mut b) = (0.0f32, 0.0f32, 0.0f32);
                for tap in &self.taps {
                    let p = src.sample_clamped(x as isize + tap.dx, y as isize + tap.dy);
                    r += p[0] * tap.weight;
                    g += p[1] * tap.weight;
                    b += p[2] * tap.weight;
                }
                // Alpha passes through from the center pixel.
                dst.set(x, y, [r, g, b, center[3]]);
            }
        }
        dst
    }
}

// ---------------------------------------------------------------------------
// Conv1D — 1D array kernel along one axis
// ---------------------------------------------------------------------------

/// A 1D convolution program along a single axis. The other coordinate is
/// held at the pixel's own value.
pub struct Conv1D {
    kernel: Vec<f32>,
    norm: f32,
    axis: Axis,
    taps: Vec<(isize, f32)>,
    generation: u64,
}

impl Conv1D {
    /// Build a 1D convolution program along `axis`.
    ///
    /// # Errors
    /// Returns a fatal [`KernelError`] if `kernel.len()` is even or zero.
    pub fn new(ctx: &Context, axis: Axis, kernel: &[f32], norm: f32) -> Result<Self, KernelError> {
        kernel::validate_1d(kernel.len())?;
        let mut program = Conv1D {
            kernel: kernel.to_vec(),
            norm,
            axis,
            taps: Vec::new(),
            generation: ctx.generation(),
        };
        program.taps = program.bake();
        Ok(program)
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Rebuild against the current context generation.
    pub fn rebuild(&mut self, ctx: &Context) {
        self.taps = self.bake();
        self.generation = ctx.generation();
    }

    fn bake(&self) -> Vec<(isize, f32)> {
        let len = self.kernel.len() as isize;
        let n = len / 2;
        let mut taps = Vec::with_capacity(self.kernel.len());
        for i in -n..=n {
            let idx = match self.axis {
                Axis::X => i + n,
                // Vertical kernel index inversion, as in Conv2D.
                Axis::Y => len - 1 - (i + n),
            };
            let weight = self.kernel[idx as usize] * self.norm;
            if weight != 0.0 {
                taps.push((i, weight));
            }
        }
        taps
    }

    /// Apply the program, producing a new texture of the same size.
    pub fn run(&self, ctx: &Context, src: &Texture) -> Texture {
        debug_assert_eq!(
            self.generation,
            ctx.generation(),
            "stale convolution program: rebuild() after context loss",
        );
        let (w, h) = (src.width(), src.height());
        let mut dst = Texture::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let center = src.get(x, y);
                let (mut r, mut g, mut b) = (0.0f32, 0.0f32, 0.0f32);
                for &(i, weight) in &self.taps {
                    let p = match self.axis {
                        Axis::X => src.sample_clamped(x as isize + i, y as isize),
                        Axis::Y => src.sample_clamped(x as isize, y as isize + i),
                    };
                    r += p[0] * weight;
                    g += p[1] * weight;
                    b += p[2] * weight;
                }
                dst.set(x, y, [r, g, b, center[3]]);
            }
        }
        dst
    }
}

// ---------------------------------------------------------------------------
// Texture kernels — weights resident on the accelerator
// ---------------------------------------------------------------------------
//
// Texture-kernel programs record no context generation: they bake nothing
// at build time — the weights are fetched at evaluation time from the
// caller-owned kernel texture — so a context loss leaves them nothing to
// go stale. Only the kernel texture itself must be re-packed by its owner.

/// Pack a flat array of `[0, 1]` weights into a sampling-ready k×k kernel
/// texture, applying the same row inversion as the array generators. The
/// weight is replicated into R, G and B; alpha is 1.
///
/// All entries of `values` are assumed to lie in `[0, 1]` and
/// `values.len()` must be at least `size * size`.
///
/// # Errors
/// Returns a fatal [`KernelError`] if `size` is even or zero.
pub fn pack_kernel_2d(_ctx: &Context, size: usize, values: &[f32]) -> Result<Texture, KernelError> {
    kernel::validate_1d(size)?; // side oddness check
    assert!(
        values.len() >= size * size,
        "kernel array too short: {} < {}",
        values.len(),
        size * size,
    );
    let mut tex = Texture::new(size, size);
    for y in 0..size {
        let row = size - 1 - y;
        for x in 0..size {
            let k = values[row * size + x];
            tex.set(x, y, [k, k, k, 1.0]);
        }
    }
    Ok(tex)
}

/// Pack a flat array of `[0, 1]` weights into a 1-row kernel texture in
/// natural order. Axis-dependent inversion happens at evaluation time in
/// [`TexConv1D`].
///
/// # Errors
/// Returns a fatal [`KernelError`] if `values.len()` is even or zero.
pub fn pack_kernel_1d(_ctx: &Context, values: &[f32]) -> Result<Texture, KernelError> {
    kernel::validate_1d(values.len())?;
    let mut tex = Texture::new(values.len(), 1);
    for (x, &k) in values.iter().enumerate() {
        tex.set(x, 0, [k, k, k, 1.0]);
    }
    Ok(tex)
}

/// 2D convolution with a texture-resident kernel of side `kernel_size`.
///
/// Kernel weights are fetched at evaluation time and rescaled as
/// `w = raw * scale + offset`, enabling kernels whose values are
/// themselves computed on the accelerator. Footprint and boundary
/// semantics match [`Conv2D`]; the row inversion was applied when the
/// kernel was packed.
///
/// # Errors
/// Returns a fatal [`KernelError`] if `kernel_size` is even or zero.
pub fn tex_conv_2d(
    _ctx: &Context,
    image: &Texture,
    tex_kernel: &Texture,
    kernel_size: usize,
    scale: f32,
    offset: f32,
) -> Result<Texture, KernelError> {
    kernel::validate_1d(kernel_size)?;
    let n = (kernel_size / 2) as isize;
    let (w, h) = (image.width(), image.height());
    let mut dst = Texture::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let center = image.get(x, y);
            let (mut r, mut g, mut b) = (0.0f32, 0.0f32, 0.0f32);
            for dy in -n..=n {
                for dx in -n..=n {
                    let p = image.sample_clamped(x as isize + dx, y as isize + dy);
                    let k = tex_kernel.get((dx + n) as usize, (dy + n) as usize);
                    r += p[0] * (k[0] * scale + offset);
                    g += p[1] * (k[1] * scale + offset);
                    b += p[2] * (k[2] * scale + offset);
                }
            }
            dst.set(x, y, [r, g, b, center[3]]);
        }
    }
    Ok(dst)
}

/// A 1D convolution program whose kernel lives in a 1-row texture.
///
/// The axis is fixed at construction; kernel size, scale and offset are
/// evaluation-time inputs because the kernel contents may change between
/// calls without rebuilding the program.
pub struct TexConv1D {
    axis: Axis,
}

impl TexConv1D {
    pub fn new(_ctx: &Context, axis: Axis) -> Self {
        TexConv1D { axis }
    }

    /// Apply the program. `tex_kernel` holds the weights in row 0; they
    /// are rescaled as `w = raw * scale + offset` per tap.
    ///
    /// # Errors
    /// Returns a fatal [`KernelError`] if `kernel_size` is even or zero.
    pub fn run(
        &self,
        _ctx: &Context,
        image: &Texture,
        tex_kernel: &Texture,
        kernel_size: usize,
        scale: f32,
        offset: f32,
    ) -> Result<Texture, KernelError> {
        kernel::validate_1d(kernel_size)?;
        let len = kernel_size as isize;
        let n = len / 2;
        let (w, h) = (image.width(), image.height());
        let mut dst = Texture::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let center = image.get(x, y);
                let (mut r, mut g, mut b) = (0.0f32, 0.0f32, 0.0f32);
                for i in -n..=n {
                    let (p, idx) = match self.axis {
                        Axis::X => (image.sample_clamped(x as isize + i, y as isize), i + n),
                        // Same vertical inversion as the array generator.
                        Axis::Y => (
                            image.sample_clamped(x as isize, y as isize + i),
                            len - 1 - (i + n),
                        ),
                    };
                    let k = tex_kernel.get(idx as usize, 0);
                    r += p[0] * (k[0] * scale + offset);
                    g += p[1] * (k[1] * scale + offset);
                    b += p[2] * (k[2] * scale + offset);
                }
                dst.set(x, y, [r, g, b, center[3]]);
            }
        }
        Ok(dst)
    }
}
