// tests/test_pyramid.rs — Integration tests for the block-mean pyramid.

use nightblob::image::Image;
use nightblob::pyramid::{downscale_block_mean, plan_levels, Pyramid, PyramidBuilder};
use nightblob::stream::{run_to_vec, FrameShape, Sample};
use nightblob::ConfigError;

// ===== Streaming builder =====

#[test]
fn constant_8x8_survives_factor_2_and_4() {
    let img = Image::from_vec(8, 8, vec![8u8; 64]);
    for factor in [2, 4] {
        let mut builder = PyramidBuilder::new(img.shape(), factor);
        let out = run_to_vec(&mut builder, img.samples()).unwrap();
        assert_eq!(out.len(), 64 / (factor * factor));
        assert!(out.iter().all(|s| s.value == 8), "factor {factor}");
    }
}

#[test]
fn output_count_and_flag() {
    let img = Image::from_fn(24, 16, |x, y| (x ^ y) as u8);
    let mut builder = PyramidBuilder::new(img.shape(), 2);
    let out = run_to_vec(&mut builder, img.samples()).unwrap();
    assert_eq!(out.len(), 12 * 8);
    let flagged: Vec<usize> = out.iter().enumerate().filter(|(_, s)| s.last).map(|(i, _)| i).collect();
    assert_eq!(flagged, vec![95]);
}

#[test]
fn chained_builders_match_reference_pyramid() {
    let img = Image::from_fn(64, 32, |x, y| ((x * 7 + y * 13) % 256) as u8);
    let reference = Pyramid::build(&img, 2, 4);

    let mut stream: Vec<Sample<u8>> = img.samples().collect();
    let (mut w, mut h) = (64, 32);
    for k in 1..4 {
        let mut builder = PyramidBuilder::new(FrameShape::new(w, h), 2);
        stream = run_to_vec(&mut builder, stream).unwrap();
        w /= 2;
        h /= 2;
        let level = Image::from_samples(w, h, stream.iter().copied()).unwrap();
        assert_eq!(level, reference.levels[k], "level {k}");
    }
}

#[test]
fn bright_block_averages_down() {
    // A 4×4 white square on black, aligned to the 4×4 grid, stays white at
    // factor 4 and is a 2×2 white square at factor 2.
    let img = Image::from_fn(16, 16, |x, y| if (4..8).contains(&x) && (8..12).contains(&y) { 255 } else { 0 });
    let half = downscale_block_mean(&img, 2);
    let quarter = downscale_block_mean(&img, 4);
    assert_eq!(half.pixels().filter(|&(_, _, v)| v == 255).count(), 4);
    assert_eq!(quarter.get(1, 2), 255);
    assert_eq!(quarter.pixels().filter(|&(_, _, v)| v != 0).count(), 1);
}

// ===== Level planning =====

#[test]
fn plan_cumulative_scale() {
    let levels = plan_levels(1280, 720, 2, 4, 5).unwrap();
    assert_eq!(levels.iter().map(|l| l.scale).collect::<Vec<_>>(), vec![1, 2, 4, 8]);
    assert_eq!((levels[3].width, levels[3].height), (160, 90));

    let levels = plan_levels(81, 81, 3, 3, 5).unwrap();
    assert_eq!((levels[2].width, levels[2].scale), (9, 9));
}

#[test]
fn plan_rejects_indivisible_height() {
    // 720 / 16 = 45, 720 / 32 = 22.5.
    let err = plan_levels(1280, 720, 2, 6, 5).unwrap_err();
    assert_eq!(
        err,
        ConfigError::NotDivisible { level: 5, width: 1280, height: 720, scale: 32 }
    );
}
