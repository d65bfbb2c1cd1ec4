// kernel.rs — Kernel validation and kernel construction helpers.
//
// A kernel is a flat sequence of f32 weights: length k² for a 2D square
// kernel, length k for a 1D kernel, with k odd and ≥ 1. Validation happens
// once, at program-generation time — the system never builds a program
// from an invalid kernel, and the generated programs have no
// evaluation-time error paths.

use std::fmt;

/// Which image axis a 1D convolution runs along.
///
/// For an X-axis program the kernel offsets perturb the pixel's x
/// coordinate and y is held fixed; for Y-axis the reverse. The original
/// system accepted an axis *token* and treated unknown tokens as a fatal
/// error; the enum makes that state unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Fatal configuration errors raised at program-generation time.
///
/// These indicate programmer error (a malformed kernel reached the
/// generator) and abort construction — there is no degraded-program
/// fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// 2D kernel whose length is not a perfect square.
    NotSquare { len: usize },
    /// Kernel side (2D) or length (1D) is even or zero.
    EvenOrEmpty { size: usize },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::NotSquare { len } => {
                write!(f, "invalid 2D convolution kernel of {len} elements (expected: square)")
            }
            KernelError::EvenOrEmpty { size } => {
                write!(f, "can't perform a convolution with an invalid kernel size of {size}")
            }
        }
    }
}

impl std::error::Error for KernelError {}

/// Validate a 2D kernel length: ≥ 1, a perfect square, odd side.
/// Returns the kernel side on success.
pub fn validate_2d(len: usize) -> Result<usize, KernelError> {
    let side = (len as f64).sqrt() as usize;
    if side * side != len {
        return Err(KernelError::NotSquare { len });
    }
    if side < 1 || side % 2 == 0 {
        return Err(KernelError::EvenOrEmpty { size: side });
    }
    Ok(side)
}

/// Validate a 1D kernel length: ≥ 1 and odd. Returns the length.
pub fn validate_1d(len: usize) -> Result<usize, KernelError> {
    if len < 1 || len % 2 == 0 {
        return Err(KernelError::EvenOrEmpty { size: len });
    }
    Ok(len)
}

/// Generate a 1D Gaussian kernel of length `2 * half_size + 1`,
/// normalized so the coefficients sum to 1.0.
///
/// # Examples
/// ```
/// let k = comet_vision::kernel::gaussian_kernel_1d(2, 1.0);
/// assert_eq!(k.len(), 5);
/// assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
/// ```
pub fn gaussian_kernel_1d(half_size: usize, sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "sigma must be positive");
    let len = 2 * half_size + 1;
    let mut kernel = Vec::with_capacity(len);
    let two_sigma_sq = 2.0 * sigma * sigma;

    for i in 0..len {
        let x = i as f32 - half_size as f32;
        kernel.push((-x * x / two_sigma_sq).exp());
    }

    // Normalize so coefficients sum to 1 (preserves image brightness).
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// A 1D box (mean) kernel of length `2 * half_size + 1`, coefficients
/// summing to 1.0. Used for local-mean illumination estimates.
pub fn box_kernel_1d(half_size: usize) -> Vec<f32> {
    let len = 2 * half_size + 1;
    vec![1.0 / len as f32; len]
}

/// The outer product of two 1D kernels, flattened row-major: the 2D
/// kernel K[r][c] = col[r] * row[c]. Handy for building the 2D form of a
/// separable kernel when comparing the two evaluation paths.
pub fn outer_product(col: &[f32], row: &[f32]) -> Vec<f32> {
    let mut out = Vec::with_capacity(col.len() * row.len());
    for &c in col {
        for &r in row {
            out.push(c * r);
        }
    }
    out
}
