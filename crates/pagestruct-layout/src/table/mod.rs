//! Table structure recovery.
//!
//! Two segmentation variants share the row/column preparation in [`stretch`]:
//! [`segment`] assigns detected cells to rows and columns by overlap, while
//! [`intersect`] materializes the grid from row×column intersections and
//! overlays spanning-cell detections. [`refine`] then forces the result into
//! a strictly rectangular grid that [`html`] can emit.

pub mod html;
pub mod intersect;
pub mod refine;
pub mod segment;
pub mod stretch;

use pagestruct_core::{
    AnnotationId, Category, CategoryAnnotation, ImageAnnotation, LayoutType, Page, Result,
    SubCategoryKey,
};

/// Grid position of one cell. Numbers are 1-based, spans at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSpan {
    /// First row the cell occupies
    pub row_number: u32,
    /// First column the cell occupies
    pub column_number: u32,
    /// Number of rows covered
    pub row_span: u32,
    /// Number of columns covered
    pub column_span: u32,
}

impl CellSpan {
    /// Single-tile span at `(row, column)`.
    #[inline]
    #[must_use]
    pub const fn unit(row: u32, column: u32) -> Self {
        Self {
            row_number: row,
            column_number: column,
            row_span: 1,
            column_span: 1,
        }
    }

    /// Whether the span covers grid tile `(row, column)`.
    #[inline]
    #[must_use]
    pub const fn covers(&self, row: u32, column: u32) -> bool {
        row >= self.row_number
            && row < self.row_number + self.row_span
            && column >= self.column_number
            && column < self.column_number + self.column_span
    }

    /// Whether two spans share at least one grid tile.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.row_number < other.row_number + other.row_span
            && other.row_number < self.row_number + self.row_span
            && self.column_number < other.column_number + other.column_span
            && other.column_number < self.column_number + self.column_span
    }
}

/// Result of segmenting one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentedTable {
    /// The table annotation
    pub table: AnnotationId,
    /// Grid height
    pub rows: u32,
    /// Grid width
    pub columns: u32,
    /// Active cells after segmentation, in grid order
    pub cells: Vec<AnnotationId>,
}

/// Persist a span as the four numbering sub-categories on a cell annotation.
pub(crate) fn write_span(page: &mut Page, id: AnnotationId, span: CellSpan) -> Result<()> {
    let cell = page.try_get_mut(id)?;
    let row = Category::Layout(LayoutType::Row);
    let column = Category::Layout(LayoutType::Column);
    cell.category.set_sub_category(
        SubCategoryKey::RowNumber,
        CategoryAnnotation::with_index(row, span.row_number),
    );
    cell.category.set_sub_category(
        SubCategoryKey::RowSpan,
        CategoryAnnotation::with_index(row, span.row_span),
    );
    cell.category.set_sub_category(
        SubCategoryKey::ColumnNumber,
        CategoryAnnotation::with_index(column, span.column_number),
    );
    cell.category.set_sub_category(
        SubCategoryKey::ColumnSpan,
        CategoryAnnotation::with_index(column, span.column_span),
    );
    Ok(())
}

/// Read the numbering sub-categories back from a cell, if all four are set.
#[must_use]
pub fn read_span(annotation: &ImageAnnotation) -> Option<CellSpan> {
    Some(CellSpan {
        row_number: annotation.category.sub_category_index(SubCategoryKey::RowNumber)?,
        column_number: annotation
            .category
            .sub_category_index(SubCategoryKey::ColumnNumber)?,
        row_span: annotation.category.sub_category_index(SubCategoryKey::RowSpan)?,
        column_span: annotation
            .category
            .sub_category_index(SubCategoryKey::ColumnSpan)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_matches_extent() {
        let span = CellSpan {
            row_number: 2,
            column_number: 1,
            row_span: 2,
            column_span: 1,
        };
        assert!(span.covers(2, 1));
        assert!(span.covers(3, 1));
        assert!(!span.covers(4, 1));
        assert!(!span.covers(2, 2));
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = CellSpan::unit(1, 1);
        let b = CellSpan {
            row_number: 1,
            column_number: 1,
            row_span: 2,
            column_span: 2,
        };
        let c = CellSpan::unit(3, 3);
        assert!(a.overlaps(&b) && b.overlaps(&a));
        assert!(!a.overlaps(&c) && !c.overlaps(&a));
    }
}
