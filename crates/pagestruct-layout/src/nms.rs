//! Cross-category non-maximum suppression.
//!
//! Resolves conflicts between overlapping detections of configured category
//! pairs by deactivating one side. Deactivation is a tombstone on the arena
//! entry, so a second pass sees the survivor set and suppresses nothing new.

use crate::config::NmsPair;
use crate::spatial::BoxIndex;
use log::debug;
use pagestruct_core::{AnnotationId, BoundingBox, Category, ImageAnnotation, Page, Result};
use rustc_hash::FxHashSet;

/// Apply every suppression pair to the page, in order.
///
/// Returns the ids that were deactivated. A priority category always survives
/// its pair; otherwise the lower-score annotation loses, with score ties
/// resolved against the higher id.
///
/// # Errors
///
/// Returns [`pagestruct_core::StructError::UnknownAnnotation`] only if the
/// arena index is inconsistent, which does not happen for pages built through
/// [`Page::add`].
pub fn suppress(page: &mut Page, pairs: &[NmsPair]) -> Result<Vec<AnnotationId>> {
    let mut deactivated: Vec<AnnotationId> = Vec::new();
    for pair in pairs {
        suppress_pair(page, pair, &mut deactivated)?;
    }
    if !deactivated.is_empty() {
        debug!(
            "nms deactivated {} annotations on page {}",
            deactivated.len(),
            page.page_no
        );
    }
    Ok(deactivated)
}

fn suppress_pair(
    page: &mut Page,
    pair: &NmsPair,
    deactivated: &mut Vec<AnnotationId>,
) -> Result<()> {
    let first_ids = page.ids_of_type(pair.first);
    let second_ids = if pair.first == pair.second {
        first_ids.clone()
    } else {
        page.ids_of_type(pair.second)
    };
    if first_ids.is_empty() || second_ids.is_empty() {
        return Ok(());
    }

    let mut second_boxes: Vec<(AnnotationId, BoundingBox)> = Vec::with_capacity(second_ids.len());
    for &id in &second_ids {
        second_boxes.push((id, page.try_get(id)?.bounding_box));
    }
    let index = BoxIndex::build(second_boxes);
    let second_set: FxHashSet<AnnotationId> = second_ids.iter().copied().collect();

    let mut dead: FxHashSet<AnnotationId> = FxHashSet::default();
    for &a in &first_ids {
        if dead.contains(&a) {
            continue;
        }
        let a_box = page.try_get(a)?.bounding_box;
        let mut candidates: Vec<AnnotationId> = index
            .candidates(&a_box)
            .filter(|&b| b != a && second_set.contains(&b) && !dead.contains(&b))
            .collect();
        candidates.sort_unstable_by_key(|id| id.0);
        for b in candidates {
            if dead.contains(&a) {
                break;
            }
            let b_box = page.try_get(b)?.bounding_box;
            if a_box.iou(&b_box) < pair.threshold {
                continue;
            }
            let loser = pick_loser(page.try_get(a)?, page.try_get(b)?, pair);
            dead.insert(loser);
        }
    }

    for id in first_ids.iter().chain(second_ids.iter()) {
        if dead.remove(id) {
            page.deactivate(*id)?;
            deactivated.push(*id);
        }
    }
    Ok(())
}

fn pick_loser(a: &ImageAnnotation, b: &ImageAnnotation, pair: &NmsPair) -> AnnotationId {
    if let Some(priority) = pair.priority {
        let a_wins = a.category_type() == Category::Layout(priority);
        let b_wins = b.category_type() == Category::Layout(priority);
        if a_wins != b_wins {
            return if a_wins { b.id } else { a.id };
        }
    }
    let a_score = a.score().unwrap_or(0.0);
    let b_score = b.score().unwrap_or(0.0);
    if a_score < b_score {
        a.id
    } else if b_score < a_score {
        b.id
    } else if a.id.0 < b.id.0 {
        b.id
    } else {
        a.id
    }
}
