//! Layout structure recovery over detected page annotations.
//!
//! Takes raw detector and OCR output for a page and produces an enriched
//! annotation graph: suppression of conflicting detections, word-to-block
//! matching, table segmentation and refinement with an HTML rendition, and a
//! total reading order. All per-page work is pure and synchronous; pages are
//! independent and may be processed in parallel.
//!
//! ```
//! use pagestruct_layout::{Detection, LayoutPipeline, PipelineConfig};
//! use pagestruct_core::CategoryRegistry;
//!
//! let pipeline = LayoutPipeline::new(PipelineConfig::default())?;
//! let registry = CategoryRegistry::new();
//! let detections = vec![Detection {
//!     category: "text".to_string(),
//!     ulx: 10.0,
//!     uly: 10.0,
//!     lrx: 400.0,
//!     lry: 200.0,
//!     score: Some(0.98),
//!     text: None,
//!     external_id: None,
//! }];
//! let mut page = pagestruct_layout::build_page(0, 600.0, 800.0, detections, &registry)?;
//! pipeline.process_page(&mut page)?;
//! # Ok::<(), pagestruct_core::StructError>(())
//! ```

pub mod config;
pub mod matching;
pub mod nms;
pub mod reading_order;
pub mod spatial;
pub mod table;
mod union_find;

pub use config::{
    MatchRule, MatchSpec, MatchingConfig, NmsPair, PipelineConfig, ReadingOrderConfig,
    ResidualWordPolicy, StretchRule, TableSegmentConfig,
};
pub use table::{CellSpan, SegmentedTable};

use log::{debug, warn};
use pagestruct_core::{
    AnnotationId, BoundingBox, Category, CategoryAnnotation, CategoryRegistry, ImageAnnotation,
    LayoutType, Page, RelationshipKey, Result, StructError, SubCategoryKey,
};
use rayon::prelude::*;

/// One raw detection as delivered by an upstream detector.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Detection {
    /// Category name, resolved against the built-in categories and the
    /// registry
    pub category: String,
    /// Left edge in absolute pixels
    pub ulx: f32,
    /// Top edge in absolute pixels
    pub uly: f32,
    /// Right edge in absolute pixels
    pub lrx: f32,
    /// Bottom edge in absolute pixels
    pub lry: f32,
    /// Detector confidence
    pub score: Option<f32>,
    /// Recognized text, for words from the OCR layer
    pub text: Option<String>,
    /// Upstream identifier, kept verbatim
    pub external_id: Option<String>,
}

/// Build a page from raw detections.
///
/// Detections with a malformed box or an unknown category are rejected one by
/// one with a warning; the rest of the page is kept. Category names resolve
/// against the built-in set first, then against `registry`.
///
/// # Errors
///
/// Returns [`StructError::MalformedInput`] only for non-positive page
/// dimensions; bad detections never fail the page.
pub fn build_page(
    page_no: usize,
    width: f32,
    height: f32,
    detections: Vec<Detection>,
    registry: &CategoryRegistry,
) -> Result<Page> {
    let mut page = Page::new(page_no, width, height)?;
    for detection in detections {
        let category = match detection.category.parse::<LayoutType>() {
            Ok(layout) => Category::Layout(layout),
            Err(_) => match registry.get(&detection.category) {
                Some(custom) => Category::Custom(custom),
                None => {
                    warn!(
                        "page {page_no}: rejecting detection with unknown category '{}'",
                        detection.category
                    );
                    continue;
                }
            },
        };
        let bbox = match BoundingBox::new_absolute(
            detection.ulx,
            detection.uly,
            detection.lrx,
            detection.lry,
        ) {
            Ok(bbox) => bbox,
            Err(err) => {
                warn!("page {page_no}: rejecting detection with malformed box: {err}");
                continue;
            }
        };
        let mut annotation = ImageAnnotation::new(category, bbox);
        annotation.category.score = detection.score;
        annotation.external_id = detection.external_id;
        if let Some(text) = detection.text {
            annotation.category.set_sub_category(
                SubCategoryKey::Characters,
                CategoryAnnotation::with_text(category, text.clone()),
            );
            annotation.category.text = Some(text);
        }
        page.add(annotation);
    }
    Ok(page)
}

/// The per-page processing pipeline.
///
/// Construction validates the configuration; processing never mutates the
/// pipeline, so one instance can serve parallel pages.
#[derive(Debug, Clone)]
pub struct LayoutPipeline {
    config: PipelineConfig,
}

impl LayoutPipeline {
    /// Validate `config` and build a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StructError::Config`] for any out-of-range knob.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on one page.
    ///
    /// Table segmentation failures are degraded, not fatal: the failing table
    /// keeps its unsegmented region and the page still gets matching and
    /// reading order.
    ///
    /// # Errors
    ///
    /// Propagates only errors that indicate a broken page graph, not
    /// geometric trouble inside a single table.
    pub fn process_page(&self, page: &mut Page) -> Result<()> {
        nms::suppress(page, &self.config.nms_pairs)?;

        let blocks = page.ids_matching(|a| match a.category_type() {
            Category::Layout(layout) => layout.is_floating_text(),
            Category::Custom(_) => false,
        });
        let words = page.ids_of_type(LayoutType::Word);
        matching::match_children(page, &blocks, &words, &self.config.matching)?;

        let anchors: Vec<AnnotationId> = page.ids_matching(|a| {
            matches!(
                a.category_type(),
                Category::Layout(LayoutType::Figure | LayoutType::Table)
            )
        });
        let captions = page.ids_of_type(LayoutType::Caption);
        matching::match_nearest(page, &anchors, &captions, RelationshipKey::LayoutLink)?;

        for table_id in page.ids_of_type(LayoutType::Table) {
            let checkpoint = page.clone();
            match self.segment_one_table(page, table_id) {
                Ok(()) => {}
                Err(err @ StructError::AmbiguousGeometry { .. }) => {
                    // discard partial structure, the table region stays
                    // unsegmented
                    *page = checkpoint;
                    warn!(
                        "page {}: table {table_id} left unsegmented: {err}",
                        page.page_no
                    );
                }
                Err(err) => return Err(err),
            }
        }

        reading_order::order_page(page, &self.config.reading_order)?;
        debug!(
            "page {}: processed, {} active annotations",
            page.page_no,
            page.active_count()
        );
        Ok(())
    }

    /// Run the pipeline on independent pages in parallel.
    ///
    /// Each page owns its graph exclusively, so results never merge across
    /// pages. Returns one result per page, in input order.
    pub fn process_pages(&self, pages: &mut [Page]) -> Vec<Result<()>> {
        pages
            .par_iter_mut()
            .map(|page| self.process_page(page))
            .collect()
    }

    /// Segment, refine and render one table, choosing the variant by what the
    /// detectors delivered: explicit cells drive the classic path, spanning
    /// cells and headers the intersection path.
    fn segment_one_table(&self, page: &mut Page, table_id: AnnotationId) -> Result<()> {
        let table_box = page.try_get(table_id)?.bounding_box;
        let has_structure_detections = page.iter_active().any(|a| {
            matches!(
                a.category_type(),
                Category::Layout(layout) if layout.is_cell() && layout != LayoutType::Cell
            ) && a.bounding_box.ioa(&table_box) >= 0.5
        });

        let segmented = if has_structure_detections {
            table::intersect::segment_table_intersect(page, table_id, &self.config.segmentation)?
        } else {
            table::segment::segment_table(page, table_id, &self.config.segmentation)?
        };
        if segmented.rows == 0 || segmented.columns == 0 {
            debug!("table {table_id} has no grid items, skipping refinement");
            return Ok(());
        }
        let refined =
            table::refine::refine_table(page, &segmented, self.config.refine_iteration_cap)?;
        let html = table::html::table_html(page, &refined)?;
        for &cell in &refined.cells {
            page.add_relationship(table_id, RelationshipKey::Child, cell)?;
        }
        page.try_get_mut(table_id)?.category.text = Some(html);
        Ok(())
    }
}
