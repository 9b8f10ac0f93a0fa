//! Annotation types of the page graph.
//!
//! Annotations have a stable arena-assigned identity and an `active` flag.
//! Superseded annotations (merged cells, suppression losers) are deactivated,
//! never removed, so ids stay valid for the lifetime of a page.

use crate::category::{Category, RelationshipKey, SubCategoryKey};
use crate::geometry::BoundingBox;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identity of an annotation within one page arena.
///
/// Ids are assigned sequentially by the page and never reused within the
/// page's lifetime, including for deactivated annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(pub u32);

impl AnnotationId {
    /// Sentinel for annotations not yet added to a page.
    pub const UNASSIGNED: Self = Self(u32::MAX);
}

impl fmt::Display for AnnotationId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Category payload of an annotation: type, confidence, typed sub-categories
/// and typed relationship edges.
///
/// Sub-categories are nested `CategoryAnnotation`s under a closed key set
/// (`BTreeMap` for deterministic iteration); relationships are id lists that
/// must reference annotations in the same page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAnnotation {
    /// Category of this annotation
    pub category: Category,
    /// Detector confidence; `None` for annotations synthesized in-core
    pub score: Option<f32>,
    /// Numeric payload (row/column numbers, spans, reading order rank)
    pub index: Option<u32>,
    /// Text payload (recognized characters on words)
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    sub_categories: BTreeMap<SubCategoryKey, CategoryAnnotation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    relationships: BTreeMap<RelationshipKey, Vec<AnnotationId>>,
}

impl CategoryAnnotation {
    /// Category annotation with no payload.
    #[must_use]
    pub fn new(category: impl Into<Category>) -> Self {
        Self {
            category: category.into(),
            score: None,
            index: None,
            text: None,
            sub_categories: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Category annotation carrying a numeric payload (e.g. a row number).
    #[must_use]
    pub fn with_index(category: impl Into<Category>, index: u32) -> Self {
        let mut ann = Self::new(category);
        ann.index = Some(index);
        ann
    }

    /// Category annotation carrying a text payload.
    #[must_use]
    pub fn with_text(category: impl Into<Category>, text: impl Into<String>) -> Self {
        let mut ann = Self::new(category);
        ann.text = Some(text.into());
        ann
    }

    /// Typed sub-category, if set.
    #[inline]
    #[must_use]
    pub fn sub_category(&self, key: SubCategoryKey) -> Option<&CategoryAnnotation> {
        self.sub_categories.get(&key)
    }

    /// Set (or replace) a typed sub-category.
    pub fn set_sub_category(&mut self, key: SubCategoryKey, value: CategoryAnnotation) {
        self.sub_categories.insert(key, value);
    }

    /// Numeric payload of a sub-category, if set.
    #[inline]
    #[must_use]
    pub fn sub_category_index(&self, key: SubCategoryKey) -> Option<u32> {
        self.sub_categories.get(&key).and_then(|s| s.index)
    }

    /// Ids related under the given key (empty slice if none).
    #[must_use]
    pub fn relationship(&self, key: RelationshipKey) -> &[AnnotationId] {
        self.relationships.get(&key).map_or(&[], Vec::as_slice)
    }

    /// Append a relationship edge, keeping insertion order and skipping
    /// duplicates. Id validity against the page is checked by the page.
    pub fn add_relationship(&mut self, key: RelationshipKey, id: AnnotationId) {
        let ids = self.relationships.entry(key).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Iterate all sub-categories in key order.
    pub fn sub_categories(&self) -> impl Iterator<Item = (SubCategoryKey, &CategoryAnnotation)> {
        self.sub_categories.iter().map(|(k, v)| (*k, v))
    }
}

/// Coordinate frame of an annotation's nested sub-image.
///
/// `origin` locates the sub-image inside the owning page (absolute page
/// coordinates); `width`/`height` are the sub-image's own pixel dimensions.
/// Boxes local to the sub-image translate to page coordinates through
/// [`BoundingBox::to_global`] with `origin`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubImageFrame {
    /// Location of the sub-image in page coordinates
    pub origin: BoundingBox,
    /// Sub-image pixel width
    pub width: f32,
    /// Sub-image pixel height
    pub height: f32,
}

impl SubImageFrame {
    /// Map a box in sub-image-local coordinates to page coordinates.
    #[inline]
    #[must_use]
    pub fn to_page(&self, local: &BoundingBox) -> BoundingBox {
        local.to_global(&self.origin)
    }

    /// Map a box in page coordinates into the sub-image's local frame.
    #[inline]
    #[must_use]
    pub fn to_sub_image(&self, global: &BoundingBox) -> BoundingBox {
        global.to_local(&self.origin)
    }
}

/// An annotation with spatial extent: category payload plus bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnnotation {
    /// Arena identity; [`AnnotationId::UNASSIGNED`] until added to a page
    pub id: AnnotationId,
    /// Identifier supplied by an upstream detector, kept verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Soft-delete flag; deactivated annotations stay in the arena
    pub active: bool,
    /// Category payload
    pub category: CategoryAnnotation,
    /// Spatial extent
    pub bounding_box: BoundingBox,
    /// Nested sub-image coordinate frame, if the annotation owns a crop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_image: Option<SubImageFrame>,
}

impl ImageAnnotation {
    /// New active annotation, not yet attached to a page.
    #[must_use]
    pub fn new(category: impl Into<Category>, bounding_box: BoundingBox) -> Self {
        Self {
            id: AnnotationId::UNASSIGNED,
            external_id: None,
            active: true,
            category: CategoryAnnotation::new(category),
            bounding_box,
            sub_image: None,
        }
    }

    /// Builder-style score.
    #[must_use]
    pub fn with_score(mut self, score: f32) -> Self {
        self.category.score = Some(score);
        self
    }

    /// Builder-style external id.
    #[must_use]
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Category of this annotation.
    #[inline]
    #[must_use]
    pub fn category_type(&self) -> Category {
        self.category.category
    }

    /// Detector confidence, if any.
    #[inline]
    #[must_use]
    pub fn score(&self) -> Option<f32> {
        self.category.score
    }

    /// Mark as superseded. Idempotent.
    #[inline]
    pub fn deactivate(&mut self) {
        self.active = false;
    }
}
