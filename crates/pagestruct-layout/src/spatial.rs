//! R-tree candidate index over annotation boxes.
//!
//! Pairwise overlap passes (matching, suppression, duplicate removal) first ask
//! the index for envelope-intersecting candidates and only then compute exact
//! IoU/IoA, so pages with many words stay near-linear.

use pagestruct_core::{AnnotationId, BoundingBox};
use rstar::{RTree, AABB};

/// Envelope wrapper stored in the R-tree.
#[derive(Debug, Clone, Copy)]
struct BoxEnvelope {
    aabb: AABB<[f32; 2]>,
    id: AnnotationId,
}

impl rstar::RTreeObject for BoxEnvelope {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Spatial index over a fixed set of annotation boxes.
#[derive(Debug)]
pub struct BoxIndex {
    tree: RTree<BoxEnvelope>,
}

impl BoxIndex {
    /// Bulk-load an index from `(id, box)` pairs.
    #[must_use]
    pub fn build(items: impl IntoIterator<Item = (AnnotationId, BoundingBox)>) -> Self {
        let envelopes = items
            .into_iter()
            .map(|(id, bbox)| BoxEnvelope {
                aabb: Self::aabb_of(&bbox),
                id,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(envelopes),
        }
    }

    /// Ids whose envelopes intersect `bbox`. Includes touching boxes; callers
    /// filter those out with the exact metric.
    pub fn candidates(&self, bbox: &BoundingBox) -> impl Iterator<Item = AnnotationId> + '_ {
        self.tree
            .locate_in_envelope_intersecting(&Self::aabb_of(bbox))
            .map(|envelope| envelope.id)
    }

    fn aabb_of(bbox: &BoundingBox) -> AABB<[f32; 2]> {
        AABB::from_corners([bbox.ulx(), bbox.uly()], [bbox.lrx(), bbox.lry()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagestruct_core::BoundingBox;

    fn bbox(ulx: f32, uly: f32, lrx: f32, lry: f32) -> BoundingBox {
        BoundingBox::new_absolute(ulx, uly, lrx, lry).unwrap()
    }

    #[test]
    fn candidates_exclude_disjoint_boxes() {
        let index = BoxIndex::build([
            (AnnotationId(0), bbox(0.0, 0.0, 10.0, 10.0)),
            (AnnotationId(1), bbox(100.0, 100.0, 110.0, 110.0)),
            (AnnotationId(2), bbox(5.0, 5.0, 15.0, 15.0)),
        ]);
        let mut hits: Vec<u32> = index
            .candidates(&bbox(4.0, 4.0, 8.0, 8.0))
            .map(|id| id.0)
            .collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 2]);
    }

    #[test]
    fn empty_index_yields_nothing() {
        let index = BoxIndex::build(std::iter::empty());
        assert_eq!(index.candidates(&bbox(0.0, 0.0, 1.0, 1.0)).count(), 0);
    }
}
