// download.rs — Keypoint encoding and GPU→host feature download.
//
// WIRE FORMAT
// ────────────
// Detected keypoints travel as a compact RGBA f32 texture:
//
//   pixel 0            [count, descriptor_size, 0, 0]        (header)
//   per keypoint       [x, y, score, 1.0]                    (position)
//                      ⌈descriptor_size / 4⌉ pixels of descriptor bytes,
//                      bit-packed four per channel (little-endian u32
//                      reinterpreted as f32)
//
// Keypoints are laid out in scan order; truncation by `max` keeps the
// first `max` entries of that order, nothing more. The header count is
// the total number of encoded keypoints, so a capped download still
// reports the uncapped total to the sensitivity feedback loop.
//
// ASYNC TRANSFERS
// ────────────────
// `use_async = true` requests a double-buffered readback: the transfer
// for the current frame is handed to a worker (standing in for the DMA
// engine) and the call returns the *previously* completed transfer —
// one extra frame of latency instead of a pipeline stall. The very first
// asynchronous download has no completed transfer to return, so it
// decodes immediately to anchor the buffer. `use_async = false` forces
// an immediate, blocking transfer.

use std::sync::mpsc;
use std::thread;

use bytemuck::{Pod, Zeroable};

use crate::context::Context;
use crate::texture::Texture;

/// Width of the encoded-keypoints texture. Height grows as needed.
const ENCODER_WIDTH: usize = 64;

/// A feature point downloaded to host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub x: f32,
    pub y: f32,
    pub score: f32,
    /// Descriptor bytes, `descriptor_size` long; `None` when the
    /// algorithm attaches no descriptor.
    pub descriptor: Option<Vec<u8>>,
}

/// One RGBA pixel of the encoded texture, viewed as a keypoint record.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct KeypointPixel {
    x: f32,
    y: f32,
    score: f32,
    flag: f32,
}

/// The decoded outcome of one download.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    /// Decoded features, possibly truncated by `max`.
    pub features: Vec<Feature>,
    /// Total number of keypoints the texture encodes, pre-truncation.
    /// This is what feeds the sensitivity controller.
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Encoding / decoding
// ---------------------------------------------------------------------------

/// Number of pixels one keypoint occupies for a given descriptor size.
fn record_pixels(descriptor_size: usize) -> usize {
    1 + descriptor_size.div_ceil(4)
}

/// Encode keypoints into the wire-format texture. Used by detectors to
/// publish their results and by tests to fabricate encoded inputs.
pub fn encode_keypoints(features: &[Feature], descriptor_size: usize) -> Texture {
    let stride = record_pixels(descriptor_size);
    let needed = 1 + features.len() * stride;
    let height = needed.div_ceil(ENCODER_WIDTH).max(1);
    let mut tex = Texture::new(ENCODER_WIDTH, height);

    let mut write = |idx: usize, pixel: [f32; 4]| {
        tex.set(idx % ENCODER_WIDTH, idx / ENCODER_WIDTH, pixel);
    };

    write(0, [features.len() as f32, descriptor_size as f32, 0.0, 0.0]);

    for (i, f) in features.iter().enumerate() {
        let base = 1 + i * stride;
        write(base, [f.x, f.y, f.score, 1.0]);

        if descriptor_size > 0 {
            let empty: &[u8] = &[];
            let bytes = f.descriptor.as_deref().unwrap_or(empty);
            for (j, chunk_idx) in (0..descriptor_size).step_by(4).enumerate() {
                let mut word = [0u8; 4];
                for (k, b) in word.iter_mut().enumerate() {
                    *b = bytes.get(chunk_idx + k).copied().unwrap_or(0);
                }
                let packed = f32::from_bits(u32::from_le_bytes(word));
                write(base + 1 + j, [packed, 0.0, 0.0, 1.0]);
            }
        }
    }
    tex
}

/// Decode the wire-format texture. `max = Some(n)` truncates the decoded
/// sequence to the first `n` keypoints in scan order; the returned total
/// is always the pre-truncation header count.
pub fn decode_keypoints(encoded: &Texture, max: Option<usize>) -> DownloadResult {
    let pixels: &[KeypointPixel] = bytemuck::cast_slice(encoded.as_slice());

    let header = pixels[0];
    let total = header.x as usize;
    let descriptor_size = header.y as usize;
    let stride = record_pixels(descriptor_size);

    let take = match max {
        Some(n) => total.min(n),
        None => total,
    };

    let mut features = Vec::with_capacity(take);
    for i in 0..take {
        let base = 1 + i * stride;
        let p = pixels[base];
        debug_assert!(p.flag != 0.0, "keypoint {i} missing its valid flag");

        let descriptor = if descriptor_size > 0 {
            let mut bytes = Vec::with_capacity(descriptor_size);
            for j in 0..descriptor_size.div_ceil(4) {
                let word = pixels[base + 1 + j].x.to_bits().to_le_bytes();
                bytes.extend_from_slice(&word);
            }
            bytes.truncate(descriptor_size);
            Some(bytes)
        } else {
            None
        };

        features.push(Feature { x: p.x, y: p.y, score: p.score, descriptor });
    }

    DownloadResult { features, total }
}

// ---------------------------------------------------------------------------
// FeatureDownloader
// ---------------------------------------------------------------------------

/// Moves encoded keypoints off the accelerator and decodes them into
/// host-side [`Feature`] values. One downloader serves one pipeline.
pub struct FeatureDownloader {
    descriptor_size: usize,
    /// The in-flight asynchronous transfer, if any.
    pending: Option<mpsc::Receiver<DownloadResult>>,
}

impl FeatureDownloader {
    pub fn new(descriptor_size: usize) -> Self {
        FeatureDownloader { descriptor_size, pending: None }
    }

    pub fn descriptor_size(&self) -> usize {
        self.descriptor_size
    }

    /// Download the encoded keypoints.
    ///
    /// With `use_async`, the current texture is submitted for background
    /// decode and the previously completed transfer is returned (one
    /// frame of latency, no stall). Without it, the transfer is
    /// immediate and blocking. `max = Some(n)` caps the decoded
    /// sequence; the reported `total` is never capped.
    pub fn download(
        &mut self,
        _ctx: &Context,
        encoded: &Texture,
        use_async: bool,
        max: Option<usize>,
    ) -> DownloadResult {
        if !use_async {
            // A pending transfer from an earlier async call is stale
            // from the caller's point of view; discard it.
            if self.pending.take().is_some() {
                log::trace!("discarding pending async transfer for a blocking download");
            }
            return decode_keypoints(encoded, max);
        }

        let (tx, rx) = mpsc::channel();
        let snapshot = encoded.clone();
        thread::spawn(move || {
            // The receiver may have been dropped if the downloader was
            // discarded mid-flight; that is fine.
            let _ = tx.send(decode_keypoints(&snapshot, max));
        });

        match self.pending.replace(rx) {
            Some(prev) => prev.recv().expect("keypoint transfer worker disconnected"),
            // First async download: nothing completed yet, decode now to
            // anchor the double buffer.
            None => decode_keypoints(encoded, max),
        }
    }
}
