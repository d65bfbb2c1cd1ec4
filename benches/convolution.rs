// benches/convolution.rs -- Convolution program benchmarks.
//
// The headline comparison is the separability payoff: a k×k 2D program
// versus the X/Y pair of k-tap 1D programs it factors into. The pair
// costs O(k) per pixel instead of O(k²), at the price of one
// intermediate texture.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use comet_vision::context::Context;
use comet_vision::convolution::{Conv1D, Conv2D};
use comet_vision::kernel::{self, Axis};
use comet_vision::texture::Texture;

/// Synthetic test image: gradient plus rectangles, enough structure to
/// defeat any zero-weight shortcuts.
fn make_scene(w: usize, h: usize) -> Texture {
    let mut luma = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            luma[y * w + x] = (x as f32 / w as f32) * 0.6 + (y as f32 / h as f32) * 0.2;
        }
    }
    for rect in 0..6usize {
        let rx = (50 + rect * 100) % w;
        let ry = (40 + (rect % 3) * 120) % h;
        for y in ry..(ry + 60).min(h) {
            for x in rx..(rx + 80).min(w) {
                luma[y * w + x] = 0.9;
            }
        }
    }
    Texture::from_luma(w, h, luma)
}

fn bench_full_2d(c: &mut Criterion) {
    let ctx = Context::new();
    let scene = make_scene(640, 480);
    let mut group = c.benchmark_group("conv2d_full");
    for half in [1usize, 2, 4] {
        let side = 2 * half + 1;
        let g = kernel::gaussian_kernel_1d(half, half as f32 * 0.5);
        let conv = Conv2D::new(&ctx, &kernel::outer_product(&g, &g), 1.0).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(side), &conv, |b, conv| {
            b.iter(|| conv.run(&ctx, &scene));
        });
    }
    group.finish();
}

fn bench_separated_pair(c: &mut Criterion) {
    let ctx = Context::new();
    let scene = make_scene(640, 480);
    let mut group = c.benchmark_group("conv1d_pair");
    for half in [1usize, 2, 4] {
        let side = 2 * half + 1;
        let g = kernel::gaussian_kernel_1d(half, half as f32 * 0.5);
        let pair = (
            Conv1D::new(&ctx, Axis::X, &g, 1.0).unwrap(),
            Conv1D::new(&ctx, Axis::Y, &g, 1.0).unwrap(),
        );
        group.bench_with_input(BenchmarkId::from_parameter(side), &pair, |b, (px, py)| {
            b.iter(|| py.run(&ctx, &px.run(&ctx, &scene)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_full_2d, bench_separated_pair);
criterion_main!(benches);
