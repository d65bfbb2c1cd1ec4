// comet-vision: runtime-built convolution programs and a closed-loop
// feature detection pipeline.
//
// The crate has two halves. The convolution half (kernel, convolution,
// filters) turns flat numeric kernels into executable per-pixel filter
// programs with replicate-edge boundary handling. The detection half
// (algorithm, sensitivity, download, fast) sequences the
// preprocess → enhance → detect → describe → download pipeline and closes
// the loop between a requested feature count and the detector threshold.
//
// Everything that touches an accelerator does so through an explicit
// `Context` handle — there is no ambient GPU state, and every program
// retains the inputs it was built from so it can be rebuilt after a
// context loss.

pub mod algorithm;
pub mod context;
pub mod convolution;
pub mod download;
pub mod fast;
pub mod filters;
pub mod kernel;
pub mod sensitivity;
pub mod texture;
