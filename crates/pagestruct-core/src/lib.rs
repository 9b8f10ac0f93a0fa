//! # pagestruct-core
//!
//! Annotation graph and geometry kernel for page structure reconstruction.
//! This crate owns the data model shared by all layout algorithms:
//!
//! - [`BoundingBox`]: fixed-point axis-aligned boxes with IoU/IoA metrics and
//!   exact local/global transforms for embedded sub-images.
//! - [`Category`] / [`LayoutType`]: closed category taxonomy plus a per-run
//!   [`CategoryRegistry`] for open extension at the data-model boundary.
//! - [`ImageAnnotation`] / [`CategoryAnnotation`]: typed sub-categories and
//!   relationship edges.
//! - [`Page`]: the per-page arena with stable ids and tombstoning.
//!
//! Upstream detectors and OCR are out of scope; their only contract with this
//! crate is a finite set of typed, scored, axis-aligned boxes per page.
//!
//! ## Quick start
//!
//! ```
//! use pagestruct_core::{BoundingBox, ImageAnnotation, LayoutType, Page};
//!
//! # fn main() -> pagestruct_core::Result<()> {
//! let mut page = Page::new(0, 612.0, 792.0)?;
//! let bbox = BoundingBox::new_absolute(72.0, 72.0, 540.0, 120.0)?;
//! let title = page.add(ImageAnnotation::new(LayoutType::Title, bbox).with_score(0.97));
//! assert!(page.get(title).unwrap().active);
//! # Ok(())
//! # }
//! ```

pub mod annotation;
pub mod category;
pub mod error;
pub mod geometry;
pub mod page;

pub use annotation::{AnnotationId, CategoryAnnotation, ImageAnnotation, SubImageFrame};
pub use category::{
    Category, CategoryRegistry, CustomCategoryId, LayoutType, RelationshipKey, SubCategoryKey,
};
pub use error::{Result, StructError};
pub use geometry::{BoundingBox, CoordMode};
pub use page::Page;
