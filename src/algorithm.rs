// algorithm.rs — Feature detection pipeline contract.
//
// A concrete detector implements the `FeatureDetector` capability trait;
// `FeaturePipeline` wraps it with the fixed stage ordering
//
//   preprocess → enhance → detect → describe → download
//
// and owns the shared state the stages communicate through: the clamped
// sensitivity value, the downloader, and (while automatic mode is on)
// the sensitivity controller. Stages within one invocation run in that
// order; invocations sharing one pipeline must be serialized by the
// caller, because sensitivity is mutable state consumed by detect.
//
// Automatic sensitivity is an explicit enable/disable pair rather than a
// property with construction side effects. The controller exists exactly
// while the mode is active; `expected()` reports `Some` exactly then.

use crate::context::Context;
use crate::download::{Feature, FeatureDownloader};
use crate::filters::FilterSuite;
use crate::sensitivity::{SensitivityController, DEFAULT_TOLERANCE};
use crate::texture::Texture;

/// Capability interface a concrete feature detector fulfills.
///
/// Detection and description run on the accelerator and exchange data as
/// textures; only `download` leaves the device.
pub trait FeatureDetector {
    /// Size in bytes of the attached descriptor; 0 when the algorithm
    /// produces none.
    fn descriptor_size(&self) -> usize {
        0
    }

    /// Map a normalized sensitivity in [0, 1] to the algorithm-specific
    /// threshold. Higher sensitivity means more features.
    fn on_sensitivity_change(&mut self, sensitivity: f32);

    /// Detect feature points in a preprocessed greyscale image,
    /// returning an encoded-keypoints texture.
    fn detect(&mut self, ctx: &Context, image: &Texture) -> Texture;

    /// Attach descriptors to the encoded keypoints. The default attaches
    /// none and returns the keypoints unchanged.
    fn describe(&mut self, _ctx: &Context, _image: &Texture, keypoints: Texture) -> Texture {
        keypoints
    }
}

/// Automatic-sensitivity target: expected mean keypoint count and
/// relative tolerance band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedFeatures {
    pub number: f32,
    pub tolerance: f32,
}

impl ExpectedFeatures {
    /// Target a count with the default ±10% tolerance band.
    pub fn new(number: f32) -> Self {
        ExpectedFeatures { number, tolerance: DEFAULT_TOLERANCE }
    }
}

/// The feature detection pipeline: one detector, one downloader, the
/// fixed filter stages, and at most one sensitivity controller.
pub struct FeaturePipeline {
    detector: Box<dyn FeatureDetector>,
    downloader: FeatureDownloader,
    filters: FilterSuite,
    sensitivity: f32,
    auto: Option<SensitivityController>,
}

impl FeaturePipeline {
    pub fn new(ctx: &Context, mut detector: Box<dyn FeatureDetector>) -> Self {
        let descriptor_size = detector.descriptor_size();
        // Establish the detector's threshold for the initial sensitivity.
        detector.on_sensitivity_change(0.0);
        FeaturePipeline {
            detector,
            downloader: FeatureDownloader::new(descriptor_size),
            filters: FilterSuite::new(ctx),
            sensitivity: 0.0,
            auto: None,
        }
    }

    pub fn descriptor_size(&self) -> usize {
        self.downloader.descriptor_size()
    }

    // -----------------------------------------------------------------------
    // Pipeline stages
    // -----------------------------------------------------------------------

    /// Prepare an image for detection and description: optional gauss5
    /// denoising, then optional greyscale conversion — smoothing first,
    /// since the order affects sub-pixel values at edges. Stateless
    /// across calls.
    pub fn preprocess(
        &self,
        ctx: &Context,
        image: &Texture,
        denoise: bool,
        to_greyscale: bool,
    ) -> Texture {
        let mut texture = image.clone();
        if denoise {
            texture = self.filters.gauss5(ctx, &texture);
        }
        if to_greyscale {
            texture = self.filters.greyscale(ctx, &texture);
        }
        texture
    }

    /// Enhance an image for DETECTION only — the output must not feed
    /// `describe`. When enabled: illumination normalization followed by
    /// a light gauss3 smoothing. A no-op otherwise.
    pub fn enhance(&self, ctx: &Context, image: &Texture, enhance_illumination: bool) -> Texture {
        if !enhance_illumination {
            return image.clone();
        }
        let normalized = self.filters.normalize_illumination(ctx, image);
        self.filters.gauss3(ctx, &normalized)
    }

    /// Detect feature points, producing an encoded-keypoints texture.
    pub fn detect(&mut self, ctx: &Context, image: &Texture) -> Texture {
        self.detector.detect(ctx, image)
    }

    /// Attach descriptors to detected keypoints.
    pub fn describe(&mut self, ctx: &Context, image: &Texture, keypoints: Texture) -> Texture {
        self.detector.describe(ctx, image, keypoints)
    }

    /// Download encoded keypoints to host memory. Feeds the observed
    /// (pre-truncation) total into the sensitivity controller when
    /// automatic mode is active, so the correction is in place before
    /// the next `detect`.
    pub fn download(
        &mut self,
        ctx: &Context,
        encoded: &Texture,
        use_async: bool,
        max: Option<usize>,
    ) -> Vec<Feature> {
        let result = self.downloader.download(ctx, encoded, use_async, max);
        if let Some(controller) = self.auto.as_mut() {
            let corrected = controller.observe(result.total);
            self.set_sensitivity(corrected);
        }
        result.features
    }

    // -----------------------------------------------------------------------
    // Sensitivity
    // -----------------------------------------------------------------------

    /// The current sensitivity, always in [0, 1].
    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    /// Assign the sensitivity. Out-of-range values are clamped into
    /// [0, 1] — deliberately permissive, not an error — and the clamped
    /// value is forwarded to the detector's threshold mapping.
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        let clamped = if sensitivity.is_nan() { 0.0 } else { sensitivity.clamp(0.0, 1.0) };
        self.sensitivity = clamped;
        self.detector.on_sensitivity_change(clamped);
    }

    /// Enable automatic sensitivity targeting `expected.number` features
    /// within ±`expected.tolerance` (relative). Calling again while
    /// active retargets the existing controller in place, preserving its
    /// running count estimate.
    pub fn enable_automatic_sensitivity(&mut self, expected: ExpectedFeatures) {
        match self.auto.as_mut() {
            Some(controller) => {
                controller.set_expected(expected.number);
                controller.set_tolerance(expected.tolerance);
            }
            None => {
                log::debug!(
                    "automatic sensitivity on: {} features ±{:.0}%",
                    expected.number,
                    expected.tolerance * 100.0,
                );
                self.auto = Some(SensitivityController::new(
                    expected.number,
                    expected.tolerance,
                    self.sensitivity,
                ));
            }
        }
    }

    /// Disable automatic sensitivity and discard the controller. No
    /// further corrections are applied; the last sensitivity sticks.
    pub fn disable_automatic_sensitivity(&mut self) {
        if self.auto.take().is_some() {
            log::debug!("automatic sensitivity off");
        }
    }

    /// The automatic-sensitivity target while the mode is active, `None`
    /// otherwise.
    pub fn expected(&self) -> Option<ExpectedFeatures> {
        self.auto.as_ref().map(|controller| ExpectedFeatures {
            number: controller.expected(),
            tolerance: controller.tolerance(),
        })
    }

    // -----------------------------------------------------------------------
    // Context loss
    // -----------------------------------------------------------------------

    /// Recover after the accelerator context was invalidated: rebuild
    /// every retained filter program and re-forward the (unchanged)
    /// sensitivity to the detector. The expected-count target and the
    /// detector's host-side parameters survive as they are; the
    /// controller's running estimate is re-anchored.
    pub fn handle_context_loss(&mut self, ctx: &Context) {
        self.filters.rebuild(ctx);
        if let Some(controller) = self.auto.as_mut() {
            controller.reset();
        }
        self.detector.on_sensitivity_change(self.sensitivity);
    }
}

/// Dispatch table mapping detection-method names to detectors. Unknown
/// methods yield `None`; the caller decides whether that is fatal.
pub fn detector_for_method(method: &str) -> Option<Box<dyn FeatureDetector>> {
    match method {
        "fast" => Some(Box::new(crate::fast::FastDetector::default())),
        _ => None,
    }
}
