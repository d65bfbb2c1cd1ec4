// tests/test_pipeline.rs — Integration tests for the feature pipeline.
//
// Covers the full preprocess → enhance → detect → download flow with the
// real FAST detector, plus the closed-loop sensitivity behavior with a
// synthetic detector whose response curve is known exactly.

use comet_vision::algorithm::{detector_for_method, ExpectedFeatures, FeatureDetector, FeaturePipeline};
use comet_vision::context::Context;
use comet_vision::download::{encode_keypoints, Feature};
use comet_vision::texture::Texture;

/// A scene with bright rectangles on a dark background — rectangle
/// corners have the large contiguous dark arc FAST looks for.
fn make_scene() -> Texture {
    let w = 96;
    let h = 72;
    let mut luma = vec![0.1f32; w * h];
    let rects: [(usize, usize, usize, usize, f32); 4] = [
        (12, 10, 18, 14, 0.9),
        (50, 12, 20, 16, 0.85),
        (14, 40, 22, 18, 0.8),
        (55, 42, 16, 16, 0.95),
    ];
    for &(rx, ry, rw, rh, v) in &rects {
        for y in ry..ry + rh {
            for x in rx..rx + rw {
                luma[y * w + x] = v;
            }
        }
    }
    Texture::from_luma(w, h, luma)
}

fn fast_pipeline(ctx: &Context) -> FeaturePipeline {
    let _ = env_logger::builder().is_test(true).try_init();
    FeaturePipeline::new(ctx, detector_for_method("fast").expect("fast is registered"))
}

/// Synthetic detector with the exactly-known monotone response
/// count = round(1000 · s²). Lets the closed-loop tests assert
/// convergence without depending on image content.
struct PlantDetector {
    sensitivity: f32,
}

impl FeatureDetector for PlantDetector {
    fn on_sensitivity_change(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity;
    }

    fn detect(&mut self, _ctx: &Context, _image: &Texture) -> Texture {
        let count = (1000.0 * self.sensitivity * self.sensitivity).round() as usize;
        let features: Vec<Feature> = (0..count)
            .map(|i| Feature { x: i as f32, y: 0.0, score: 1.0, descriptor: None })
            .collect();
        encode_keypoints(&features, 0)
    }
}

fn plant_pipeline(ctx: &Context) -> FeaturePipeline {
    let _ = env_logger::builder().is_test(true).try_init();
    FeaturePipeline::new(ctx, Box::new(PlantDetector { sensitivity: 0.0 }))
}

// ===== End-to-end detection =====

#[test]
fn scene_corners_found_end_to_end() {
    let ctx = Context::new();
    let mut pipeline = fast_pipeline(&ctx);
    pipeline.set_sensitivity(0.75);

    let scene = make_scene();
    let grey = pipeline.preprocess(&ctx, &scene, false, true);
    let enhanced = pipeline.enhance(&ctx, &grey, false);
    let keypoints = pipeline.detect(&ctx, &enhanced);
    let keypoints = pipeline.describe(&ctx, &grey, keypoints);
    let features = pipeline.download(&ctx, &keypoints, false, None);

    assert!(features.len() >= 4, "expected corners from 4 rectangles, got {}", features.len());
    for f in &features {
        assert!(f.x >= 3.0 && f.y >= 3.0, "feature inside the border margin");
        assert!(f.score > 0.0);
        assert!(f.descriptor.is_none(), "FAST attaches no descriptor");
    }
}

#[test]
fn flat_image_at_zero_sensitivity_yields_nothing() {
    let ctx = Context::new();
    let mut pipeline = fast_pipeline(&ctx);
    pipeline.set_sensitivity(0.0);

    let flat = Texture::filled(64, 48, [0.5, 0.5, 0.5, 1.0]);
    let grey = pipeline.preprocess(&ctx, &flat, true, true);
    let enhanced = pipeline.enhance(&ctx, &grey, true);
    let keypoints = pipeline.detect(&ctx, &enhanced);
    let features = pipeline.download(&ctx, &keypoints, false, None);

    assert!(features.is_empty());
}

#[test]
fn preprocess_is_idempotent_on_grey_images() {
    let ctx = Context::new();
    let pipeline = fast_pipeline(&ctx);
    let scene = make_scene();

    let once = pipeline.preprocess(&ctx, &scene, false, true);
    let twice = pipeline.preprocess(&ctx, &once, false, true);
    assert!(twice.max_difference(&once) < 1e-6, "greyscale of grey must be a fixed point");
}

#[test]
fn async_download_lags_one_frame_through_pipeline() {
    let ctx = Context::new();
    let mut pipeline = plant_pipeline(&ctx);
    let scene = make_scene();

    pipeline.set_sensitivity(0.1); // plant emits 10
    let frame1 = pipeline.detect(&ctx, &scene);
    pipeline.set_sensitivity(0.2); // plant emits 40
    let frame2 = pipeline.detect(&ctx, &scene);

    assert_eq!(pipeline.download(&ctx, &frame1, true, None).len(), 10);
    // Second async call returns the first frame's transfer.
    assert_eq!(pipeline.download(&ctx, &frame2, true, None).len(), 10);
}

// ===== Truncation and the feedback loop =====

#[test]
fn capped_download_still_reports_full_count() {
    let ctx = Context::new();
    let mut pipeline = plant_pipeline(&ctx);
    pipeline.set_sensitivity(0.7071); // plant emits ~500
    // Target matches the uncapped count, so a correct controller sees an
    // in-band observation and holds the sensitivity still.
    pipeline.enable_automatic_sensitivity(ExpectedFeatures { number: 500.0, tolerance: 0.1 });

    let before = pipeline.sensitivity();
    let keypoints = pipeline.detect(&ctx, &Texture::new(8, 8));
    let features = pipeline.download(&ctx, &keypoints, false, Some(50));

    assert_eq!(features.len(), 50, "download must honor the cap");
    assert_eq!(
        pipeline.sensitivity(),
        before,
        "controller must see the pre-truncation total, not the capped 50",
    );
}

#[test]
fn automatic_sensitivity_converges_to_target() {
    let ctx = Context::new();
    let mut pipeline = plant_pipeline(&ctx);
    pipeline.set_sensitivity(0.5);
    pipeline.enable_automatic_sensitivity(ExpectedFeatures { number: 200.0, tolerance: 0.1 });

    let scene = Texture::new(8, 8);
    let mut count = 0usize;
    for _ in 0..100 {
        let keypoints = pipeline.detect(&ctx, &scene);
        count = pipeline.download(&ctx, &keypoints, false, None).len();
    }

    assert!(
        (180..=220).contains(&count),
        "count {count} did not converge into the ±10% band around 200",
    );
    assert!((0.0..=1.0).contains(&pipeline.sensitivity()));
}

#[test]
fn disabled_controller_leaves_sensitivity_alone() {
    let ctx = Context::new();
    let mut pipeline = plant_pipeline(&ctx);
    pipeline.set_sensitivity(0.5);
    pipeline.enable_automatic_sensitivity(ExpectedFeatures::new(200.0));
    pipeline.disable_automatic_sensitivity();

    let keypoints = pipeline.detect(&ctx, &Texture::new(8, 8));
    pipeline.download(&ctx, &keypoints, false, None);
    assert_eq!(pipeline.sensitivity(), 0.5);
    assert_eq!(pipeline.expected(), None);
}

// ===== Context loss =====

#[test]
fn context_loss_recovery_is_deterministic() {
    let mut ctx = Context::new();
    let mut pipeline = fast_pipeline(&ctx);
    pipeline.set_sensitivity(0.7);
    let scene = make_scene();

    let run = |ctx: &Context, p: &mut FeaturePipeline| {
        let grey = p.preprocess(ctx, &scene, true, true);
        let enhanced = p.enhance(ctx, &grey, true);
        let keypoints = p.detect(ctx, &enhanced);
        p.download(ctx, &keypoints, false, None)
    };

    let before = run(&ctx, &mut pipeline);
    ctx.invalidate();
    pipeline.handle_context_loss(&ctx);
    let after = run(&ctx, &mut pipeline);

    assert_eq!(before, after, "rebuilt programs must reproduce the same features");
    assert_eq!(pipeline.sensitivity(), 0.7, "sensitivity survives a context loss");
}

#[test]
fn context_loss_preserves_automatic_target() {
    let mut ctx = Context::new();
    let mut pipeline = fast_pipeline(&ctx);
    pipeline.enable_automatic_sensitivity(ExpectedFeatures { number: 200.0, tolerance: 0.1 });

    ctx.invalidate();
    pipeline.handle_context_loss(&ctx);

    assert_eq!(
        pipeline.expected(),
        Some(ExpectedFeatures { number: 200.0, tolerance: 0.1 }),
    );
}
