//! Property-based tests for lighting normalization.
//!
//! Run with: cargo test -p shapegen --test proptest_lighting

use image::{Rgba, RgbaImage};
use proptest::prelude::*;
use shapegen::lighting::{blend, clahe, color_transfer, histogram_lut, match_histograms};

fn arb_image(max_side: u32) -> impl Strategy<Value = RgbaImage> {
    (1..=max_side, 1..=max_side).prop_flat_map(|(w, h)| {
        prop::collection::vec(prop::array::uniform4(any::<u8>()), (w * h) as usize).prop_map(
            move |pixels| {
                let mut img = RgbaImage::new(w, h);
                for (px, value) in img.pixels_mut().zip(pixels) {
                    *px = Rgba(value);
                }
                img
            },
        )
    })
}

fn arb_histogram() -> impl Strategy<Value = [u64; 256]> {
    prop::collection::vec(0u64..50, 256).prop_map(|v| {
        let mut hist = [0u64; 256];
        hist.copy_from_slice(&v);
        hist
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn matching_against_itself_is_identity(img in arb_image(24)) {
        prop_assert_eq!(match_histograms(&img, &img), img);
    }

    #[test]
    fn lut_is_monotone(src in arb_histogram(), reference in arb_histogram()) {
        let lut = histogram_lut(&src, &reference);
        for pair in lut.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn corrections_keep_alpha_and_size(a in arb_image(16), b in arb_image(16)) {
        for out in [match_histograms(&a, &b), color_transfer(&a, &b)] {
            prop_assert_eq!(out.dimensions(), a.dimensions());
            for (o, s) in out.pixels().zip(a.pixels()) {
                prop_assert_eq!(o.0[3], s.0[3]);
            }
        }
    }

    #[test]
    fn zero_strength_blend_is_original(a in arb_image(12)) {
        let inverted = RgbaImage::from_fn(a.width(), a.height(), |x, y| {
            let p = a.get_pixel(x, y).0;
            Rgba([255 - p[0], 255 - p[1], 255 - p[2], p[3]])
        });
        prop_assert_eq!(blend(&a, &inverted, 0.0), a.clone());
        prop_assert_eq!(blend(&a, &inverted, 1.0), inverted);
    }

    #[test]
    fn clahe_preserves_plane_size(
        (w, h, plane) in (1u32..40, 1u32..40).prop_flat_map(|(w, h)| {
            (Just(w), Just(h), prop::collection::vec(any::<u8>(), (w * h) as usize))
        }),
        tiles in 1u32..9,
    ) {
        prop_assert_eq!(clahe(&plane, w, h, 2.0, tiles).len(), plane.len());
    }
}
