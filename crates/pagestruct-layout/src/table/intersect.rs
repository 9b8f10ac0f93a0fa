//! Intersection-based table segmentation over a spanning-cell detector.
//!
//! The grid itself is synthesized: one simple cell per row×column
//! intersection. Spanning-cell detections are then matched onto the grid and
//! replace the simple cells under their footprint. Header detections mark the
//! cells they cover.

use crate::config::{MatchSpec, TableSegmentConfig};
use crate::matching::overlap;
use crate::table::segment::{build_grid, members_of};
use crate::table::stretch::GridItem;
use crate::table::{read_span, write_span, CellSpan, SegmentedTable};
use log::{debug, trace};
use pagestruct_core::{
    AnnotationId, BoundingBox, Category, CategoryAnnotation, ImageAnnotation, LayoutType, Page,
    Result, SubCategoryKey,
};
use rustc_hash::FxHashMap;

const HEADER_TYPES: [LayoutType; 3] = [
    LayoutType::ColumnHeader,
    LayoutType::RowHeader,
    LayoutType::ProjectedRowHeader,
];

/// Assign a detection to grid items, trying the primary tier first and the
/// fallback tier only when the primary matches nothing.
fn assign_two_tier(
    detection: &BoundingBox,
    items: &[GridItem],
    primary: MatchSpec,
    fallback: MatchSpec,
) -> Option<(u32, u32)> {
    for spec in [primary, fallback] {
        let assigned: Vec<u32> = items
            .iter()
            .filter(|item| overlap(spec.rule, detection, &item.bbox) >= spec.threshold)
            .map(|item| item.number)
            .collect();
        if let Some(first) = assigned.iter().copied().min() {
            return Some((first, assigned.len() as u32));
        }
    }
    None
}

fn footprint_of(
    detection: &BoundingBox,
    rows: &[GridItem],
    columns: &[GridItem],
    config: &TableSegmentConfig,
) -> Option<CellSpan> {
    let (row_number, row_span) = assign_two_tier(
        detection,
        rows,
        config.grid_match_primary,
        config.grid_match_fallback,
    )?;
    let (column_number, column_span) = assign_two_tier(
        detection,
        columns,
        config.grid_match_primary,
        config.grid_match_fallback,
    )?;
    Some(CellSpan {
        row_number,
        column_number,
        row_span,
        column_span,
    })
}

/// Segment one table from row, column, spanning-cell and header detections.
///
/// Simple cells are synthesized for every grid intersection and carry no
/// score. Spanning cells deactivate the simple cells under their footprint.
/// Cells covered by a header detection get a header sub-category.
///
/// # Errors
///
/// Returns [`pagestruct_core::StructError::UnknownAnnotation`] if `table_id`
/// is not in the page.
pub fn segment_table_intersect(
    page: &mut Page,
    table_id: AnnotationId,
    config: &TableSegmentConfig,
) -> Result<SegmentedTable> {
    let table_box = page.try_get(table_id)?.bounding_box;
    let spanning = members_of(page, &table_box, LayoutType::SpanningCell);
    let headers: Vec<(LayoutType, BoundingBox)> = HEADER_TYPES
        .into_iter()
        .flat_map(|layout| {
            members_of(page, &table_box, layout)
                .into_iter()
                .map(move |(_, bbox)| (layout, bbox))
        })
        .collect();

    let (rows, columns) = build_grid(page, table_id, config)?;
    if rows.is_empty() || columns.is_empty() {
        debug!("table {table_id} has no grid, skipping intersection segmentation");
        return Ok(SegmentedTable {
            table: table_id,
            rows: rows.len() as u32,
            columns: columns.len() as u32,
            cells: Vec::new(),
        });
    }

    // one synthesized simple cell per grid tile
    let mut tile_cells: FxHashMap<(u32, u32), AnnotationId> = FxHashMap::default();
    for row in &rows {
        for column in &columns {
            let Some(intersection) = row.bbox.intersection(&column.bbox) else {
                continue;
            };
            let id = page.add(ImageAnnotation::new(
                Category::Layout(LayoutType::Cell),
                intersection,
            ));
            write_span(page, id, CellSpan::unit(row.number, column.number))?;
            tile_cells.insert((row.number, column.number), id);
        }
    }

    let mut cells: Vec<AnnotationId> = Vec::new();
    for (spanning_id, detection) in spanning {
        let Some(span) = footprint_of(&detection, &rows, &columns, config) else {
            trace!("spanning cell {spanning_id} matches no grid tile, ignored");
            continue;
        };
        for row in span.row_number..span.row_number + span.row_span {
            for column in span.column_number..span.column_number + span.column_span {
                if let Some(&simple) = tile_cells.get(&(row, column)) {
                    page.try_get_mut(simple)?.deactivate();
                }
            }
        }
        write_span(page, spanning_id, span)?;
        cells.push(spanning_id);
    }

    for id in tile_cells.into_values() {
        if page.try_get(id)?.active {
            cells.push(id);
        }
    }

    for (header_type, detection) in headers {
        let Some(footprint) = footprint_of(&detection, &rows, &columns, config) else {
            continue;
        };
        for &id in &cells {
            let annotation = page.try_get(id)?;
            let covered = read_span(annotation)
                .is_some_and(|span| span.overlaps(&footprint));
            if covered {
                page.try_get_mut(id)?.category.set_sub_category(
                    SubCategoryKey::Header,
                    CategoryAnnotation::new(Category::Layout(header_type)),
                );
            }
        }
    }

    cells.sort_by_key(|&id| {
        page.get(id)
            .and_then(read_span)
            .map_or((u32::MAX, u32::MAX), |span| {
                (span.row_number, span.column_number)
            })
    });

    debug!(
        "intersection-segmented table {table_id}: {}x{} grid, {} cells",
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

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(ulx: f32, uly: f32, lrx: f32, lry: f32) -> BoundingBox {
        BoundingBox::new_absolute(ulx, uly, lrx, lry).unwrap()
    }

    fn add(page: &mut Page, layout: LayoutType, b: BoundingBox) -> AnnotationId {
        page.add(ImageAnnotation::new(Category::Layout(layout), b))
    }

    /// 3 rows x 2 columns, 100 wide, 150 tall.
    fn grid_table(page: &mut Page) -> AnnotationId {
        let table = add(page, LayoutType::Table, bbox(0.0, 0.0, 100.0, 150.0));
        add(page, LayoutType::Row, bbox(0.0, 0.0, 100.0, 50.0));
        add(page, LayoutType::Row, bbox(0.0, 50.0, 100.0, 100.0));
        add(page, LayoutType::Row, bbox(0.0, 100.0, 100.0, 150.0));
        add(page, LayoutType::Column, bbox(0.0, 0.0, 50.0, 150.0));
        add(page, LayoutType::Column, bbox(50.0, 0.0, 100.0, 150.0));
        table
    }

    #[test]
    fn plain_grid_synthesizes_one_cell_per_tile() {
        let mut page = Page::new(1, 200.0, 200.0).unwrap();
        let table = grid_table(&mut page);
        let result =
            segment_table_intersect(&mut page, table, &TableSegmentConfig::default()).unwrap();
        assert_eq!(result.cells.len(), 6);
        let spans: Vec<CellSpan> = result
            .cells
            .iter()
            .map(|&id| read_span(page.get(id).unwrap()).unwrap())
            .collect();
        assert_eq!(spans[0], CellSpan::unit(1, 1));
        assert_eq!(spans[5], CellSpan::unit(3, 2));
        // synthesized cells carry no detector score
        assert!(page.get(result.cells[0]).unwrap().score().is_none());
    }

    #[test]
    fn spanning_cell_replaces_covered_simple_cells() {
        let mut page = Page::new(1, 200.0, 200.0).unwrap();
        let table = grid_table(&mut page);
        // covers rows 1-2 of column 1
        let spanning = add(&mut page, LayoutType::SpanningCell, bbox(0.0, 0.0, 50.0, 100.0));
        let result =
            segment_table_intersect(&mut page, table, &TableSegmentConfig::default()).unwrap();
        assert_eq!(result.cells.len(), 5);
        assert!(result.cells.contains(&spanning));
        let span = read_span(page.get(spanning).unwrap()).unwrap();
        assert_eq!(span.row_span, 2);
        assert_eq!(span.column_span, 1);
        let deactivated = page
            .all()
            .iter()
            .filter(|a| {
                !a.active && a.category_type() == Category::Layout(LayoutType::Cell)
            })
            .count();
        assert_eq!(deactivated, 2);
    }

    #[test]
    fn column_header_marks_first_row_cells() {
        let mut page = Page::new(1, 200.0, 200.0).unwrap();
        let table = grid_table(&mut page);
        add(&mut page, LayoutType::ColumnHeader, bbox(0.0, 0.0, 100.0, 50.0));
        let result =
            segment_table_intersect(&mut page, table, &TableSegmentConfig::default()).unwrap();
        let headed: Vec<CellSpan> = result
            .cells
            .iter()
            .filter(|&&id| {
                page.get(id)
                    .unwrap()
                    .category
                    .sub_category(SubCategoryKey::Header)
                    .is_some()
            })
            .map(|&id| read_span(page.get(id).unwrap()).unwrap())
            .collect();
        assert_eq!(headed.len(), 2);
        assert!(headed.iter().all(|span| span.row_number == 1));
    }
}
