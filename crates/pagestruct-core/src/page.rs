//! Page: the arena that owns all annotations of one document page.
//!
//! Annotations live in an ordered vector; a side index maps ids to slots.
//! Superseded annotations are tombstoned through their `active` flag and the
//! arena never shrinks, so ids stay stable for the page's lifetime.

use crate::annotation::{AnnotationId, CategoryAnnotation, ImageAnnotation};
use crate::category::{Category, LayoutType, RelationshipKey};
use crate::error::{Result, StructError};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// One document page and its annotation graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based page number within the document
    pub page_no: usize,
    /// Page pixel width
    pub width: f32,
    /// Page pixel height
    pub height: f32,
    annotations: Vec<ImageAnnotation>,
    summary: CategoryAnnotation,
    #[serde(skip)]
    index: FxHashMap<AnnotationId, usize>,
    next_id: u32,
}

impl Page {
    /// New empty page.
    ///
    /// # Errors
    ///
    /// Returns [`StructError::MalformedInput`] for non-positive dimensions.
    pub fn new(page_no: usize, width: f32, height: f32) -> Result<Self> {
        if !(width > 0.0 && height > 0.0) {
            return Err(StructError::MalformedInput {
                reason: format!("non-positive page dimensions {width}x{height}"),
            });
        }
        Ok(Self {
            page_no,
            width,
            height,
            annotations: Vec::new(),
            summary: CategoryAnnotation::new(LayoutType::Page),
            index: FxHashMap::default(),
            next_id: 0,
        })
    }

    /// Add an annotation, assigning its id. Ids are sequential and never
    /// reused, including after deactivation.
    pub fn add(&mut self, mut annotation: ImageAnnotation) -> AnnotationId {
        let id = AnnotationId(self.next_id);
        self.next_id += 1;
        annotation.id = id;
        self.index.insert(id, self.annotations.len());
        self.annotations.push(annotation);
        id
    }

    /// Annotation by id, tombstones included.
    #[must_use]
    pub fn get(&self, id: AnnotationId) -> Option<&ImageAnnotation> {
        self.index.get(&id).map(|&slot| &self.annotations[slot])
    }

    /// Mutable annotation by id, tombstones included.
    pub fn get_mut(&mut self, id: AnnotationId) -> Option<&mut ImageAnnotation> {
        let slot = *self.index.get(&id)?;
        Some(&mut self.annotations[slot])
    }

    /// Annotation by id, failing on unknown ids.
    ///
    /// # Errors
    ///
    /// Returns [`StructError::UnknownAnnotation`] if the id was never assigned.
    pub fn try_get(&self, id: AnnotationId) -> Result<&ImageAnnotation> {
        self.get(id)
            .ok_or(StructError::UnknownAnnotation { id: id.0 })
    }

    /// Mutable annotation by id, failing on unknown ids.
    ///
    /// # Errors
    ///
    /// Returns [`StructError::UnknownAnnotation`] if the id was never assigned.
    pub fn try_get_mut(&mut self, id: AnnotationId) -> Result<&mut ImageAnnotation> {
        let slot = *self
            .index
            .get(&id)
            .ok_or(StructError::UnknownAnnotation { id: id.0 })?;
        Ok(&mut self.annotations[slot])
    }

    /// Tombstone an annotation. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StructError::UnknownAnnotation`] if the id was never assigned.
    pub fn deactivate(&mut self, id: AnnotationId) -> Result<()> {
        self.try_get_mut(id)?.deactivate();
        Ok(())
    }

    /// All annotations in insertion order, tombstones included.
    #[must_use]
    pub fn all(&self) -> &[ImageAnnotation] {
        &self.annotations
    }

    /// Active annotations in insertion order.
    pub fn iter_active(&self) -> impl Iterator<Item = &ImageAnnotation> {
        self.annotations.iter().filter(|a| a.active)
    }

    /// Ids of active annotations with the given category.
    #[must_use]
    pub fn ids_of_type(&self, layout_type: LayoutType) -> Vec<AnnotationId> {
        self.ids_matching(|a| a.category_type() == Category::Layout(layout_type))
    }

    /// Ids of active annotations accepted by the filter, in insertion order.
    pub fn ids_matching(&self, filter: impl Fn(&ImageAnnotation) -> bool) -> Vec<AnnotationId> {
        self.iter_active()
            .filter(|a| filter(a))
            .map(|a| a.id)
            .collect()
    }

    /// Write a relationship edge on `parent` pointing at `child`.
    ///
    /// # Errors
    ///
    /// Returns [`StructError::UnknownAnnotation`] if either id is not in the
    /// arena; relationships may only reference ids of the same page.
    pub fn add_relationship(
        &mut self,
        parent: AnnotationId,
        key: RelationshipKey,
        child: AnnotationId,
    ) -> Result<()> {
        if !self.index.contains_key(&child) {
            return Err(StructError::UnknownAnnotation { id: child.0 });
        }
        self.try_get_mut(parent)?
            .category
            .add_relationship(key, child);
        Ok(())
    }

    /// Page summary annotation.
    #[inline]
    #[must_use]
    pub const fn summary(&self) -> &CategoryAnnotation {
        &self.summary
    }

    /// Mutable page summary annotation.
    #[inline]
    pub fn summary_mut(&mut self) -> &mut CategoryAnnotation {
        &mut self.summary
    }

    /// Number of annotations in the arena, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    /// True if the arena holds no annotations at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Number of active annotations.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.iter_active().count()
    }

    /// Serialize the full graph (tombstones included) to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StructError::MalformedInput`] if serialization fails, which
    /// only happens on non-finite floats smuggled past the constructors.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| StructError::MalformedInput {
            reason: format!("page serialization failed: {e}"),
        })
    }

    /// Rebuild a page from its JSON export.
    ///
    /// # Errors
    ///
    /// Returns [`StructError::MalformedInput`] on invalid JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut page: Self = serde_json::from_str(json).map_err(|e| StructError::MalformedInput {
            reason: format!("page deserialization failed: {e}"),
        })?;
        page.index = page
            .annotations
            .iter()
            .enumerate()
            .map(|(slot, a)| (a.id, slot))
            .collect();
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    fn bbox(ulx: f32, uly: f32, lrx: f32, lry: f32) -> BoundingBox {
        BoundingBox::new_absolute(ulx, uly, lrx, lry).unwrap()
    }

    fn page_with_two_words() -> Page {
        let mut page = Page::new(0, 1000.0, 800.0).unwrap();
        page.add(ImageAnnotation::new(LayoutType::Word, bbox(0.0, 0.0, 10.0, 10.0)).with_score(0.9));
        page.add(ImageAnnotation::new(LayoutType::Word, bbox(20.0, 0.0, 30.0, 10.0)).with_score(0.8));
        page
    }

    #[test]
    fn rejects_bad_dimensions() {
        assert!(Page::new(0, 0.0, 100.0).is_err());
        assert!(Page::new(0, 100.0, -1.0).is_err());
    }

    #[test]
    fn ids_are_sequential_and_stable() {
        let mut page = page_with_two_words();
        let id2 = page.add(ImageAnnotation::new(
            LayoutType::Text,
            bbox(0.0, 0.0, 100.0, 100.0),
        ));
        assert_eq!(id2, AnnotationId(2));
        assert_eq!(page.get(AnnotationId(0)).unwrap().id, AnnotationId(0));
        assert!(page.get(AnnotationId(99)).is_none());
    }

    #[test]
    fn deactivation_tombstones_but_keeps_id() {
        let mut page = page_with_two_words();
        page.deactivate(AnnotationId(0)).unwrap();
        assert_eq!(page.active_count(), 1);
        assert_eq!(page.len(), 2);
        // Tombstone still resolvable by id
        assert!(!page.get(AnnotationId(0)).unwrap().active);
        // Ids keep advancing, never reused
        let id = page.add(ImageAnnotation::new(
            LayoutType::Word,
            bbox(40.0, 0.0, 50.0, 10.0),
        ));
        assert_eq!(id, AnnotationId(2));
    }

    #[test]
    fn relationship_requires_known_ids() {
        let mut page = page_with_two_words();
        page.add_relationship(AnnotationId(0), RelationshipKey::Child, AnnotationId(1))
            .unwrap();
        assert_eq!(
            page.get(AnnotationId(0))
                .unwrap()
                .category
                .relationship(RelationshipKey::Child),
            &[AnnotationId(1)]
        );
        let err = page
            .add_relationship(AnnotationId(0), RelationshipKey::Child, AnnotationId(42))
            .unwrap_err();
        assert!(matches!(err, StructError::UnknownAnnotation { id: 42 }));
    }

    #[test]
    fn type_filter_skips_tombstones() {
        let mut page = page_with_two_words();
        page.deactivate(AnnotationId(1)).unwrap();
        assert_eq!(page.ids_of_type(LayoutType::Word), vec![AnnotationId(0)]);
    }

    #[test]
    fn json_round_trip_restores_index() {
        let mut page = page_with_two_words();
        page.deactivate(AnnotationId(0)).unwrap();
        let json = page.to_json().unwrap();
        let restored = Page::from_json(&json).unwrap();
        assert_eq!(restored.len(), 2);
        assert!(!restored.get(AnnotationId(0)).unwrap().active);
        assert_eq!(restored.get(AnnotationId(1)).unwrap().id, AnnotationId(1));
    }
}
