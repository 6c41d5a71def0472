// tests/test_window.rs — Integration tests for the sliding-window engine.
//
// The streaming engine is checked against the direct whole-image reference
// (`convolve_zero_border`) and against the stream contract: one output per
// input, the flag on output W*H-1 only, and a border that never depends on
// the kernel.

use nightblob::blob::LogDetection;
use nightblob::convolution::{convolve_zero_border, BoxMean, BoxSum, FixedKernel};
use nightblob::fixed::FixedFormat;
use nightblob::image::Image;
use nightblob::stream::{run_to_vec, FrameShape, Sample};
use nightblob::window::{SlidingWindowEngine, Window};

fn noise(w: usize, h: usize, seed: u32) -> Image<u8> {
    // LCG, high byte of each state.
    let mut state = seed;
    Image::from_fn(w, h, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 24) as u8
    })
}

// ===== Engine vs reference =====

#[test]
fn box_mean_matches_reference() {
    for &(w, h) in &[(5, 5), (17, 9), (32, 32), (40, 7)] {
        let img = noise(w, h, 7);
        let mut engine = SlidingWindowEngine::new(img.shape(), 5, 5, BoxMean);
        let out = run_to_vec(&mut engine, img.samples()).unwrap();
        let streamed = Image::from_samples(w, h, out).unwrap();
        assert_eq!(streamed, convolve_zero_border(&img, 5, 5, &BoxMean), "{w}x{h}");
    }
}

#[test]
fn rectangular_kernel_matches_reference() {
    let img = noise(13, 11, 99);
    let mut engine = SlidingWindowEngine::new(img.shape(), 3, 7, BoxSum);
    let out = run_to_vec(&mut engine, img.samples()).unwrap();
    let streamed = Image::from_samples(13, 11, out).unwrap();
    let reference: Image<i32> = convolve_zero_border(&img, 3, 7, &BoxSum);
    assert_eq!(streamed, reference);
}

#[test]
fn fixed_kernel_matches_reference() {
    let coeffs: Vec<f32> = (0..25).map(|i| (i as f32 - 12.0) / 64.0).collect();
    let kernel = FixedKernel::new(5, 5, &coeffs, FixedFormat::default());
    let img = noise(24, 16, 3);
    let mut engine = SlidingWindowEngine::new(img.shape(), 5, 5, kernel.clone());
    let out = run_to_vec(&mut engine, img.samples()).unwrap();
    let streamed = Image::from_samples(24, 16, out).unwrap();
    assert_eq!(streamed, convolve_zero_border(&img, 5, 5, &kernel));
}

// ===== Stream contract =====

#[test]
fn one_output_per_input_with_single_flag() {
    for &(w, h, k) in &[(5, 5, 5), (9, 6, 3), (64, 48, 5), (7, 1, 1)] {
        let img = noise(w, h, 11);
        let mut engine = SlidingWindowEngine::new(img.shape(), k, k, BoxMean);
        let out = run_to_vec(&mut engine, img.samples()).unwrap();
        assert_eq!(out.len(), w * h);
        let flagged: Vec<usize> = out.iter().enumerate().filter(|(_, s)| s.last).map(|(i, _)| i).collect();
        assert_eq!(flagged, vec![w * h - 1], "{w}x{h} kernel {k}");
    }
}

#[test]
fn border_independent_of_kernel() {
    // A window function that is never zero: every zero in the output is
    // border, and every border position must be zero.
    let img = noise(20, 12, 5);
    let mut engine = SlidingWindowEngine::new(img.shape(), 5, 3, |_: &Window<'_, u8>| 42u8);
    let out = run_to_vec(&mut engine, img.samples()).unwrap();
    let out = Image::from_samples(20, 12, out).unwrap();
    for (x, y, v) in out.pixels() {
        let border = x < 1 || x >= 19 || y < 2 || y >= 10;
        assert_eq!(v == 0, border, "at ({x}, {y})");
    }
}

#[test]
fn output_timing_follows_latency() {
    // Output p must appear on input step p + L.
    let shape = FrameShape::new(10, 8);
    let mut engine = SlidingWindowEngine::new(shape, 5, 5, |w: &Window<'_, u32>| w.center());
    let latency = engine.latency();
    assert_eq!(latency, 2 + 10 * 2);

    let img = Image::from_fn(10, 8, |x, y| (y * 10 + x) as u32);
    let mut produced_at = Vec::new();
    for (t, sample) in img.samples().enumerate() {
        let mut emitted = 0;
        nightblob::stream::Stage::push(&mut engine, sample, &mut |_: Sample<u32>| {
            emitted += 1;
            Ok(())
        })
        .unwrap();
        produced_at.push(emitted);
        if t < latency {
            assert_eq!(emitted, 0, "no output during fill (step {t})");
        }
    }
    assert_eq!(produced_at[latency], 1);
    assert_eq!(*produced_at.last().unwrap(), 1 + latency);
    assert_eq!(produced_at.iter().sum::<usize>(), 80);
}

#[test]
fn log_engine_on_constant_masks() {
    let detection = LogDetection::reference(FixedFormat::default());
    for value in [false, true] {
        let mask = Image::from_vec(16, 16, vec![value; 256]);
        let mut engine = SlidingWindowEngine::new(mask.shape(), 5, 5, detection.clone());
        let out = run_to_vec(&mut engine, mask.samples()).unwrap();
        assert!(out.iter().all(|s| !s.value));
    }
}
