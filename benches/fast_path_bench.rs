//! Fast-Path Signature Cache benchmarks.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use imagewave_core::cache::signature::{compute_perceptual_hash, hamming_distance};
use imagewave_core::cache::{CachedSignature, SignatureCache};
use imagewave_core::decode::DecodedImage;
use imagewave_core::motion::{detect_scenes, detect_text_change_frames};
use std::time::Duration;

fn checkerboard(width: u32, height: u32) -> DecodedImage {
    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let on = (x / 8 + y / 8) % 2 == 0;
            let v = if on { 220 } else { 20 };
            rgba.extend_from_slice(&[v, v, v, 255]);
        }
    }
    DecodedImage::still(width, height, rgba, "png")
}

fn animated(width: u32, height: u32, frame_count: usize) -> DecodedImage {
    let mut image = checkerboard(width, height);
    image.is_animated = true;
    image.frames = (1..frame_count)
        .map(|i| {
            let mut frame = image.rgba.clone();
            let shift = (i * 7) % frame.len().max(1);
            frame.rotate_left(shift - shift % 4);
            frame
        })
        .collect();
    image
}

fn bench_perceptual_hash(c: &mut Criterion) {
    let image = checkerboard(256, 256);
    c.bench_function("perceptual_hash_256x256", |b| {
        b.iter(|| black_box(compute_perceptual_hash(black_box(&image))));
    });
}

fn bench_hamming_distance(c: &mut Criterion) {
    c.bench_function("hamming_distance", |b| {
        b.iter(|| black_box(hamming_distance(black_box(0x0F0F_0F0F_0F0F_0F0F), black_box(0xFF00_FF00_FF00_FF00))));
    });
}

fn bench_cache_set_and_get(c: &mut Criterion) {
    c.bench_function("cache_set_then_get_1000_entries", |b| {
        b.iter(|| {
            let cache = SignatureCache::new(2_000, Duration::from_secs(3600));
            for i in 0..1_000u64 {
                let key = format!("content-{i}:{i:016x}");
                cache.set(key.clone(), CachedSignature::new(format!("content-{i}"), i));
                black_box(cache.get(&key));
            }
        });
    });
}

fn bench_find_similar(c: &mut Criterion) {
    let cache = SignatureCache::new(2_000, Duration::from_secs(3600));
    for i in 0..500u64 {
        let key = format!("content-{i}:{i:016x}");
        cache.set(key, CachedSignature::new(format!("content-{i}"), i));
    }
    c.bench_function("find_similar_within_500_entries", |b| {
        b.iter(|| black_box(cache.find_similar(black_box(250), black_box(2))));
    });
}

fn bench_detect_scenes(c: &mut Criterion) {
    let image = animated(128, 128, 40);
    c.bench_function("detect_scenes_40_frames", |b| {
        b.iter(|| black_box(detect_scenes(black_box(&image), black_box(16))));
    });
}

fn bench_detect_text_change_frames(c: &mut Criterion) {
    let image = animated(128, 128, 40);
    c.bench_function("detect_text_change_frames_40_frames", |b| {
        b.iter(|| black_box(detect_text_change_frames(black_box(&image), black_box(16))));
    });
}

criterion_group!(
    benches,
    bench_perceptual_hash,
    bench_hamming_distance,
    bench_cache_set_and_get,
    bench_find_similar,
    bench_detect_scenes,
    bench_detect_text_change_frames,
);
criterion_main!(benches);
