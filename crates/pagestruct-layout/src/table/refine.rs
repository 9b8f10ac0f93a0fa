//! Grid refinement to a strictly rectangular, gap-free table.
//!
//! Cell spans straight out of segmentation may overlap in tile space or leave
//! tiles uncovered. Refinement groups span-sharing cells into connected
//! components, expands every component to its enclosing tile rectangle, and
//! repeats until the rectangles are pairwise disjoint. Cells under one final
//! rectangle are merged into a single cell; uncovered tiles get synthesized
//! empty cells.

use crate::table::stretch::GridItem;
use crate::table::{read_span, write_span, CellSpan, SegmentedTable};
use crate::union_find::UnionFind;
use log::{debug, trace};
use pagestruct_core::{
    AnnotationId, BoundingBox, Category, ImageAnnotation, LayoutType, Page, Result, StructError,
    SubCategoryKey,
};
use rustc_hash::FxHashMap;

/// Refine a segmented table in place and return the final cell set.
///
/// Idempotent: refining an already-refined table changes nothing.
///
/// # Errors
///
/// Returns [`StructError::AmbiguousGeometry`] when the expansion fixed point
/// is not reached within `iteration_cap` rounds. Spans are only rewritten
/// after the fixed point is found, so on error the table keeps its
/// pre-refinement segmentation.
pub fn refine_table(
    page: &mut Page,
    segmented: &SegmentedTable,
    iteration_cap: usize,
) -> Result<SegmentedTable> {
    let spans: Vec<(AnnotationId, CellSpan)> = segmented
        .cells
        .iter()
        .filter_map(|&id| {
            let annotation = page.get(id)?;
            annotation
                .active
                .then(|| read_span(annotation).map(|span| (id, span)))
                .flatten()
        })
        .collect();

    let rectangles = merge_to_rectangles(&spans, segmented.table, iteration_cap)?;

    let mut cells: Vec<AnnotationId> = Vec::with_capacity(rectangles.len());
    for (members, rectangle) in rectangles {
        if members.len() == 1 {
            let id = members[0];
            write_span(page, id, rectangle)?;
            cells.push(id);
            continue;
        }
        let boxes: Vec<BoundingBox> = members
            .iter()
            .filter_map(|&id| page.get(id).map(|a| a.bounding_box))
            .collect();
        let Some(merged_box) = BoundingBox::merge(boxes.iter()) else {
            continue;
        };
        let header = members.iter().find_map(|&id| {
            page.get(id)?
                .category
                .sub_category(SubCategoryKey::Header)
                .cloned()
        });
        for &id in &members {
            page.try_get_mut(id)?.deactivate();
        }
        let merged = page.add(ImageAnnotation::new(
            Category::Layout(LayoutType::Cell),
            merged_box,
        ));
        write_span(page, merged, rectangle)?;
        if let Some(header) = header {
            page.try_get_mut(merged)?
                .category
                .set_sub_category(SubCategoryKey::Header, header);
        }
        trace!("merged {} cells into {merged}", members.len());
        cells.push(merged);
    }

    fill_missing_tiles(page, segmented, &mut cells)?;

    cells.sort_by_key(|&id| {
        page.get(id)
            .and_then(read_span)
            .map_or((u32::MAX, u32::MAX), |span| {
                (span.row_number, span.column_number)
            })
    });
    debug!(
        "refined table {}: {} cells on a {}x{} grid",
        segmented.table,
        cells.len(),
        segmented.rows,
        segmented.columns
    );
    Ok(SegmentedTable {
        table: segmented.table,
        rows: segmented.rows,
        columns: segmented.columns,
        cells,
    })
}

/// Group overlapping spans and expand each group to its enclosing rectangle,
/// iterating to a fixed point.
fn merge_to_rectangles(
    spans: &[(AnnotationId, CellSpan)],
    table_id: AnnotationId,
    iteration_cap: usize,
) -> Result<Vec<(Vec<AnnotationId>, CellSpan)>> {
    let mut uf: UnionFind<AnnotationId> = UnionFind::new();
    for &(id, _) in spans {
        uf.insert(id);
    }
    let by_id: FxHashMap<AnnotationId, CellSpan> = spans.iter().copied().collect();

    let mut round = 0usize;
    loop {
        if round >= iteration_cap {
            return Err(StructError::AmbiguousGeometry {
                table_id: table_id.0,
                reason: format!("cell merge did not converge within {iteration_cap} rounds"),
            });
        }
        let components = uf.components(spans.iter().map(|&(id, _)| id));
        let rectangles: Vec<CellSpan> = components
            .iter()
            .map(|members| enclosing(members.iter().map(|id| by_id[id])))
            .collect();

        let mut changed = false;
        for i in 0..rectangles.len() {
            for j in i + 1..rectangles.len() {
                if rectangles[i].overlaps(&rectangles[j]) {
                    uf.union(components[i][0], components[j][0]);
                    changed = true;
                }
            }
        }
        if !changed {
            return Ok(components.into_iter().zip(rectangles).collect());
        }
        round += 1;
    }
}

fn enclosing(spans: impl IntoIterator<Item = CellSpan>) -> CellSpan {
    let mut row_min = u32::MAX;
    let mut row_max = 0;
    let mut column_min = u32::MAX;
    let mut column_max = 0;
    for span in spans {
        row_min = row_min.min(span.row_number);
        row_max = row_max.max(span.row_number + span.row_span);
        column_min = column_min.min(span.column_number);
        column_max = column_max.max(span.column_number + span.column_span);
    }
    CellSpan {
        row_number: row_min,
        column_number: column_min,
        row_span: row_max - row_min,
        column_span: column_max - column_min,
    }
}

/// Synthesize an empty cell for every tile no final cell covers.
fn fill_missing_tiles(
    page: &mut Page,
    segmented: &SegmentedTable,
    cells: &mut Vec<AnnotationId>,
) -> Result<()> {
    let mut covered = vec![false; (segmented.rows * segmented.columns) as usize];
    for &id in cells.iter() {
        if let Some(span) = page.get(id).and_then(read_span) {
            for row in span.row_number..span.row_number + span.row_span {
                for column in span.column_number..span.column_number + span.column_span {
                    if row >= 1 && column >= 1 && row <= segmented.rows && column <= segmented.columns {
                        covered[((row - 1) * segmented.columns + column - 1) as usize] = true;
                    }
                }
            }
        }
    }
    if covered.iter().all(|&c| c) {
        return Ok(());
    }

    let table_box = page.try_get(segmented.table)?.bounding_box;
    let (rows, columns) = grid_items(page, &table_box);
    for row in 1..=segmented.rows {
        for column in 1..=segmented.columns {
            if covered[((row - 1) * segmented.columns + column - 1) as usize] {
                continue;
            }
            let bbox = tile_box(&rows, &columns, row, column);
            let Some(bbox) = bbox else { continue };
            let id = page.add(ImageAnnotation::new(
                Category::Layout(LayoutType::Cell),
                bbox,
            ));
            write_span(page, id, CellSpan::unit(row, column))?;
            trace!("filled uncovered tile ({row},{column}) with {id}");
            cells.push(id);
        }
    }
    Ok(())
}

/// Numbered row/column items of the table, read back from the page.
fn grid_items(page: &Page, table_box: &BoundingBox) -> (Vec<GridItem>, Vec<GridItem>) {
    let collect = |layout: LayoutType, key: SubCategoryKey| -> Vec<GridItem> {
        page.iter_active()
            .filter(|a| {
                a.category_type() == Category::Layout(layout)
                    && a.bounding_box.ioa(table_box) >= 0.5
            })
            .filter_map(|a| {
                Some(GridItem {
                    id: a.id,
                    bbox: a.bounding_box,
                    number: a.category.sub_category_index(key)?,
                })
            })
            .collect()
    };
    (
        collect(LayoutType::Row, SubCategoryKey::RowNumber),
        collect(LayoutType::Column, SubCategoryKey::ColumnNumber),
    )
}

fn tile_box(rows: &[GridItem], columns: &[GridItem], row: u32, column: u32) -> Option<BoundingBox> {
    let row_box = rows.iter().find(|item| item.number == row)?.bbox;
    let column_box = columns.iter().find(|item| item.number == column)?.bbox;
    row_box.intersection(&column_box)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableSegmentConfig;
    use crate::table::segment::segment_table;

    fn bbox(ulx: f32, uly: f32, lrx: f32, lry: f32) -> BoundingBox {
        BoundingBox::new_absolute(ulx, uly, lrx, lry).unwrap()
    }

    fn add(page: &mut Page, layout: LayoutType, b: BoundingBox) -> AnnotationId {
        page.add(ImageAnnotation::new(Category::Layout(layout), b))
    }

    /// 3x2 grid, one cell detection per tile except where `skip` matches.
    fn detected_table(page: &mut Page, skip: &[(u32, u32)]) -> AnnotationId {
        let table = add(page, LayoutType::Table, bbox(0.0, 0.0, 100.0, 150.0));
        for r in 0..3 {
            let top = r as f32 * 50.0;
            add(page, LayoutType::Row, bbox(0.0, top, 100.0, top + 50.0));
        }
        add(page, LayoutType::Column, bbox(0.0, 0.0, 50.0, 150.0));
        add(page, LayoutType::Column, bbox(50.0, 0.0, 100.0, 150.0));
        for r in 0..3u32 {
            for c in 0..2u32 {
                if skip.contains(&(r + 1, c + 1)) {
                    continue;
                }
                let top = r as f32 * 50.0;
                let left = c as f32 * 50.0;
                add(
                    page,
                    LayoutType::Cell,
                    bbox(left + 2.0, top + 2.0, left + 48.0, top + 48.0),
                );
            }
        }
        table
    }

    #[test]
    fn spanning_cell_scenario_yields_five_cells() {
        let mut page = Page::new(1, 200.0, 200.0).unwrap();
        // rows 1-2 of column 1 covered by one detection, 4 simple cells elsewhere
        let table = detected_table(&mut page, &[(1, 1), (2, 1)]);
        add(&mut page, LayoutType::Cell, bbox(2.0, 2.0, 48.0, 98.0));
        let segmented = segment_table(&mut page, table, &TableSegmentConfig::default()).unwrap();
        let refined = refine_table(&mut page, &segmented, 10).unwrap();
        assert_eq!(refined.cells.len(), 5);
        let spans: Vec<CellSpan> = refined
            .cells
            .iter()
            .map(|&id| read_span(page.get(id).unwrap()).unwrap())
            .collect();
        let tall = spans.iter().filter(|span| span.row_span == 2).count();
        assert_eq!(tall, 1);
        assert!(spans.iter().filter(|span| span.row_span == 1).all(|s| s.column_span == 1));
    }

    #[test]
    fn refinement_is_idempotent() {
        let mut page = Page::new(1, 200.0, 200.0).unwrap();
        let table = detected_table(&mut page, &[(1, 1), (2, 1)]);
        add(&mut page, LayoutType::Cell, bbox(2.0, 2.0, 48.0, 98.0));
        let segmented = segment_table(&mut page, table, &TableSegmentConfig::default()).unwrap();
        let first = refine_table(&mut page, &segmented, 10).unwrap();
        let second = refine_table(&mut page, &first, 10).unwrap();
        assert_eq!(first.cells, second.cells);
        let spans_equal = first.cells.iter().all(|&id| {
            read_span(page.get(id).unwrap()).is_some()
        });
        assert!(spans_equal);
    }

    #[test]
    fn uncovered_tile_gets_synthesized_cell() {
        let mut page = Page::new(1, 200.0, 200.0).unwrap();
        let table = detected_table(&mut page, &[(3, 2)]);
        let segmented = segment_table(&mut page, table, &TableSegmentConfig::default()).unwrap();
        assert_eq!(segmented.cells.len(), 5);
        let refined = refine_table(&mut page, &segmented, 10).unwrap();
        assert_eq!(refined.cells.len(), 6);
        let filled = refined
            .cells
            .iter()
            .map(|&id| read_span(page.get(id).unwrap()).unwrap())
            .any(|span| span == CellSpan::unit(3, 2));
        assert!(filled);
    }

    #[test]
    fn iteration_cap_of_zero_rounds_reports_ambiguous_geometry() {
        let mut page = Page::new(1, 200.0, 200.0).unwrap();
        let table = detected_table(&mut page, &[]);
        let segmented = segment_table(&mut page, table, &TableSegmentConfig::default()).unwrap();
        let err = refine_table(&mut page, &segmented, 0).unwrap_err();
        assert!(matches!(err, StructError::AmbiguousGeometry { .. }));
    }
}
