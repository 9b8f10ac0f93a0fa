//! Classic table segmentation over an explicit cell detector.
//!
//! Rows and columns are stretched to cover the table, then every detected
//! cell is assigned to the rows and columns it sufficiently overlaps. The
//! cell's numbering is the minimum assigned index, its span the assignment
//! count.

use crate::config::TableSegmentConfig;
use crate::matching::overlap;
use crate::table::stretch::{prepare_items, Axis, GridItem};
use crate::table::{write_span, CellSpan, SegmentedTable};
use log::{debug, trace};
use pagestruct_core::{
    AnnotationId, BoundingBox, Category, CategoryAnnotation, LayoutType, Page, Result,
    SubCategoryKey,
};

/// Minimum IoA of an item against the table box for the item to count as
/// belonging to that table.
const TABLE_MEMBER_IOA: f32 = 0.5;

/// Active annotations of `layout_type` lying inside the table region.
pub(crate) fn members_of(
    page: &Page,
    table_box: &BoundingBox,
    layout_type: LayoutType,
) -> Vec<(AnnotationId, BoundingBox)> {
    page.iter_active()
        .filter(|a| {
            a.category_type() == Category::Layout(layout_type)
                && a.bounding_box.ioa(table_box) >= TABLE_MEMBER_IOA
        })
        .map(|a| (a.id, a.bounding_box))
        .collect()
}

/// Stretch, persist, and number the table's rows and columns.
pub(crate) fn build_grid(
    page: &mut Page,
    table_id: AnnotationId,
    config: &TableSegmentConfig,
) -> Result<(Vec<GridItem>, Vec<GridItem>)> {
    let table_box = page.try_get(table_id)?.bounding_box;
    let rows = prepare_items(
        &table_box,
        members_of(page, &table_box, LayoutType::Row),
        Axis::Rows,
        config,
    )?;
    let columns = prepare_items(
        &table_box,
        members_of(page, &table_box, LayoutType::Column),
        Axis::Columns,
        config,
    )?;
    for item in &rows {
        let annotation = page.try_get_mut(item.id)?;
        annotation.bounding_box = item.bbox;
        annotation.category.set_sub_category(
            SubCategoryKey::RowNumber,
            CategoryAnnotation::with_index(Category::Layout(LayoutType::Row), item.number),
        );
    }
    for item in &columns {
        let annotation = page.try_get_mut(item.id)?;
        annotation.bounding_box = item.bbox;
        annotation.category.set_sub_category(
            SubCategoryKey::ColumnNumber,
            CategoryAnnotation::with_index(Category::Layout(LayoutType::Column), item.number),
        );
    }
    Ok((rows, columns))
}

/// Assigned indices of `cell` along one item list: 1-based start plus count.
fn assign(cell: &BoundingBox, items: &[GridItem], config: &TableSegmentConfig) -> Option<(u32, u32)> {
    let assigned: Vec<u32> = items
        .iter()
        .filter(|item| {
            overlap(config.cell_assignment.rule, cell, &item.bbox)
                >= config.cell_assignment.threshold
        })
        .map(|item| item.number)
        .collect();
    let first = assigned.iter().copied().min()?;
    Some((first, assigned.len() as u32))
}

/// Segment one table from explicit row, column and cell detections.
///
/// Cells overlapping no row or no column are left unnumbered and excluded
/// from the result. A table without rows or columns yields an empty grid.
///
/// # Errors
///
/// Returns [`pagestruct_core::StructError::UnknownAnnotation`] if `table_id`
/// is not in the page.
pub fn segment_table(
    page: &mut Page,
    table_id: AnnotationId,
    config: &TableSegmentConfig,
) -> Result<SegmentedTable> {
    let table_box = page.try_get(table_id)?.bounding_box;
    let (rows, columns) = build_grid(page, table_id, config)?;

    let cell_ids = members_of(page, &table_box, LayoutType::Cell);
    let mut cells: Vec<AnnotationId> = Vec::with_capacity(cell_ids.len());
    for (id, bbox) in cell_ids {
        let row_assignment = assign(&bbox, &rows, config);
        let column_assignment = assign(&bbox, &columns, config);
        match (row_assignment, column_assignment) {
            (Some((row_number, row_span)), Some((column_number, column_span))) => {
                write_span(
                    page,
                    id,
                    CellSpan {
                        row_number,
                        column_number,
                        row_span,
                        column_span,
                    },
                )?;
                cells.push(id);
            }
            _ => trace!("cell {id} matches no grid item, left unnumbered"),
        }
    }

    debug!(
        "segmented table {table_id}: {} rows, {} columns, {} cells",
        rows.len(),
        columns.len(),
        cells.len()
    );
    Ok(SegmentedTable {
        table: table_id,
        rows: rows.len() as u32,
        columns: columns.len() as u32,
        cells,
    })
}
