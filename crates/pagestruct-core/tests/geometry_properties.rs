//! Property tests for the geometry kernel.

use pagestruct_core::BoundingBox;
use proptest::prelude::*;

fn arb_box() -> impl Strategy<Value = BoundingBox> {
    (0.0f32..1000.0, 0.0f32..1000.0, 0.1f32..500.0, 0.1f32..500.0).prop_map(
        |(ulx, uly, width, height)| {
            BoundingBox::new_absolute(ulx, uly, ulx + width, uly + height).unwrap()
        },
    )
}

proptest! {
    #[test]
    fn iou_stays_in_unit_interval(a in arb_box(), b in arb_box()) {
        let value = a.iou(&b);
        prop_assert!((0.0..=1.0).contains(&value));
    }

    #[test]
    fn iou_is_symmetric(a in arb_box(), b in arb_box()) {
        prop_assert!((a.iou(&b) - b.iou(&a)).abs() < 1e-6);
    }

    #[test]
    fn iou_with_self_is_one(a in arb_box()) {
        prop_assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ioa_stays_in_unit_interval(a in arb_box(), b in arb_box()) {
        let value = a.ioa(&b);
        prop_assert!((0.0..=1.0).contains(&value));
    }

    #[test]
    fn intersection_is_contained_in_both(a in arb_box(), b in arb_box()) {
        if let Some(inter) = a.intersection(&b) {
            prop_assert!(inter.ulx() >= a.ulx().max(b.ulx()) - 1e-3);
            prop_assert!(inter.lrx() <= a.lrx().min(b.lrx()) + 1e-3);
            prop_assert!(inter.uly() >= a.uly().max(b.uly()) - 1e-3);
            prop_assert!(inter.lry() <= a.lry().min(b.lry()) + 1e-3);
        } else {
            prop_assert!(a.intersection_area(&b) == 0.0);
        }
    }

    #[test]
    fn merge_encloses_all_inputs(a in arb_box(), b in arb_box(), c in arb_box()) {
        let merged = BoundingBox::merge([&a, &b, &c]).unwrap();
        for bbox in [&a, &b, &c] {
            prop_assert!(merged.ulx() <= bbox.ulx());
            prop_assert!(merged.uly() <= bbox.uly());
            prop_assert!(merged.lrx() >= bbox.lrx());
            prop_assert!(merged.lry() >= bbox.lry());
        }
    }

    #[test]
    fn local_global_transforms_round_trip(a in arb_box(), origin in arb_box()) {
        let there_and_back = a.to_global(&origin).to_local(&origin);
        prop_assert_eq!(a, there_and_back);
    }
}

#[test]
fn strict_subset_makes_ioa_asymmetric() {
    let outer = BoundingBox::new_absolute(0.0, 0.0, 100.0, 100.0).unwrap();
    let inner = BoundingBox::new_absolute(25.0, 25.0, 75.0, 75.0).unwrap();
    assert!((inner.ioa(&outer) - 1.0).abs() < 1e-6);
    assert!((outer.ioa(&inner) - 0.25).abs() < 1e-6);
}

#[test]
fn zero_area_box_never_produces_nan() {
    let degenerate = BoundingBox::new_absolute(50.0, 50.0, 50.0, 50.0).unwrap();
    let other = BoundingBox::new_absolute(0.0, 0.0, 100.0, 100.0).unwrap();
    assert_eq!(degenerate.iou(&degenerate), 0.0);
    assert_eq!(degenerate.iou(&other), 0.0);
    assert_eq!(degenerate.ioa(&other), 0.0);
}
