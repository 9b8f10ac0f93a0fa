//! Parent/child matching over annotation boxes.
//!
//! Computes the overlap matrix between a parent set and a child set and turns
//! sufficiently overlapping pairs into `Child` relationship edges on the
//! parents. A separate distance mode links each child to its nearest parent by
//! center distance, used for caption linking.

use crate::config::{MatchRule, MatchingConfig};
use crate::spatial::BoxIndex;
use log::debug;
use ordered_float::OrderedFloat;
use pagestruct_core::{AnnotationId, BoundingBox, Page, RelationshipKey, Result};
use rustc_hash::FxHashMap;

/// One accepted parent/child edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchEdge {
    /// Containing annotation
    pub parent: AnnotationId,
    /// Contained annotation
    pub child: AnnotationId,
    /// Overlap under the configured rule
    pub overlap: f32,
}

/// Overlap of `child` against `parent` under `rule`. IoA normalizes by the
/// child's own area.
#[inline]
#[must_use]
pub fn overlap(rule: MatchRule, child: &BoundingBox, parent: &BoundingBox) -> f32 {
    match rule {
        MatchRule::Iou => child.iou(parent),
        MatchRule::Ioa => child.ioa(parent),
    }
}

/// Match `children` to `parents` and write `Child` edges on the parents.
///
/// With `max_parent_only` each child links to its single best parent; ties on
/// overlap go to the higher-scored parent, then to the parent listed first.
/// Otherwise every parent at or above the threshold gets an edge.
///
/// # Errors
///
/// Returns [`pagestruct_core::StructError::UnknownAnnotation`] if any id is
/// not in the page.
pub fn match_children(
    page: &mut Page,
    parents: &[AnnotationId],
    children: &[AnnotationId],
    config: &MatchingConfig,
) -> Result<Vec<MatchEdge>> {
    let mut parent_boxes: Vec<(AnnotationId, BoundingBox)> = Vec::with_capacity(parents.len());
    let mut parent_rank: FxHashMap<AnnotationId, usize> = FxHashMap::default();
    let mut parent_score: FxHashMap<AnnotationId, f32> = FxHashMap::default();
    for (rank, &id) in parents.iter().enumerate() {
        let parent = page.try_get(id)?;
        parent_boxes.push((id, parent.bounding_box));
        parent_rank.insert(id, rank);
        parent_score.insert(id, parent.score().unwrap_or(0.0));
    }
    let index = BoxIndex::build(parent_boxes.iter().copied());
    let boxes_by_id: FxHashMap<AnnotationId, BoundingBox> =
        parent_boxes.iter().copied().collect();

    let mut edges: Vec<MatchEdge> = Vec::new();
    for &child_id in children {
        let child_box = page.try_get(child_id)?.bounding_box;
        let mut scored: Vec<(AnnotationId, f32)> = index
            .candidates(&child_box)
            .filter_map(|parent_id| {
                let value = overlap(config.spec.rule, &child_box, &boxes_by_id[&parent_id]);
                (value >= config.spec.threshold).then_some((parent_id, value))
            })
            .collect();
        if scored.is_empty() {
            continue;
        }
        if config.max_parent_only {
            scored.sort_by_key(|&(id, value)| {
                (
                    OrderedFloat(-value),
                    OrderedFloat(-parent_score[&id]),
                    parent_rank[&id],
                )
            });
            scored.truncate(1);
        } else {
            scored.sort_by_key(|&(id, _)| parent_rank[&id]);
        }
        for (parent_id, value) in scored {
            edges.push(MatchEdge {
                parent: parent_id,
                child: child_id,
                overlap: value,
            });
        }
    }

    debug!(
        "matched {} of {} children against {} parents",
        edges.len(),
        children.len(),
        parents.len()
    );
    for edge in &edges {
        page.add_relationship(edge.parent, RelationshipKey::Child, edge.child)?;
    }
    Ok(edges)
}

/// Link each child to its single nearest parent by Euclidean center distance,
/// with no threshold. Writes `key` edges on the parents.
///
/// Ties on distance go to the parent listed first. Children are skipped when
/// `parents` is empty.
///
/// # Errors
///
/// Returns [`pagestruct_core::StructError::UnknownAnnotation`] if any id is
/// not in the page.
pub fn match_nearest(
    page: &mut Page,
    parents: &[AnnotationId],
    children: &[AnnotationId],
    key: RelationshipKey,
) -> Result<Vec<MatchEdge>> {
    let parent_centers: Vec<(AnnotationId, (f32, f32))> = parents
        .iter()
        .map(|&id| Ok((id, page.try_get(id)?.bounding_box.center())))
        .collect::<Result<_>>()?;

    let mut edges: Vec<MatchEdge> = Vec::new();
    for &child_id in children {
        let (cx, cy) = page.try_get(child_id)?.bounding_box.center();
        let nearest = parent_centers
            .iter()
            .map(|&(id, (px, py))| {
                let dist = (px - cx).hypot(py - cy);
                (id, dist)
            })
            .min_by_key(|&(_, dist)| OrderedFloat(dist));
        if let Some((parent_id, dist)) = nearest {
            edges.push(MatchEdge {
                parent: parent_id,
                child: child_id,
                overlap: dist,
            });
        }
    }
    for edge in &edges {
        page.add_relationship(edge.parent, key, edge.child)?;
    }
    Ok(edges)
}
