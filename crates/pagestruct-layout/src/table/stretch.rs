//! Row/column preparation: stretching, tiling, duplicate removal, numbering.

use crate::config::{StretchRule, TableSegmentConfig};
use log::trace;
use ordered_float::OrderedFloat;
use pagestruct_core::{AnnotationId, BoundingBox, Result};

/// Which grid axis an item set describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Horizontal bands, ordered top to bottom
    Rows,
    /// Vertical bands, ordered left to right
    Columns,
}

/// One stretched and numbered row or column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridItem {
    /// Backing annotation
    pub id: AnnotationId,
    /// Stretched extent
    pub bbox: BoundingBox,
    /// 1-based position along the axis
    pub number: u32,
}

/// Turn raw row/column detections into a stretched, deduplicated, numbered
/// item list covering the table along `axis`.
///
/// Near-duplicates above the removal IoU are dropped first, keeping the
/// earlier item; the duplicate check runs on the raw main-axis extents, before
/// stretching makes neighboring detections disjoint. Survivors are stretched
/// to the table edges on the cross axis, gaps along the main axis are closed
/// per the stretch rule, the table is optionally tiled end to end, and items
/// are numbered by ascending center. Center ties keep input order.
///
/// # Errors
///
/// Returns [`pagestruct_core::StructError::MalformedInput`] if a rebuilt box
/// is degenerate, which only happens for non-finite input coordinates.
pub fn prepare_items(
    table: &BoundingBox,
    items: Vec<(AnnotationId, BoundingBox)>,
    axis: Axis,
    config: &TableSegmentConfig,
) -> Result<Vec<GridItem>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let mut ordered = items;
    ordered.sort_by_key(|(_, bbox)| OrderedFloat(main_center(bbox, axis)));

    let removal_iou = match axis {
        Axis::Rows => config.row_removal_iou,
        Axis::Columns => config.column_removal_iou,
    };
    let mut kept: Vec<(AnnotationId, BoundingBox)> = Vec::with_capacity(ordered.len());
    for (id, bbox) in ordered {
        let span = main_span(&bbox, axis);
        let duplicate = kept
            .iter()
            .any(|(_, prior)| interval_iou(main_span(prior, axis), span) >= removal_iou);
        if duplicate {
            trace!("dropping near-duplicate grid item {id}");
        } else {
            kept.push((id, bbox));
        }
    }

    let mut spans: Vec<(f32, f32)> = kept
        .iter()
        .map(|(_, bbox)| main_span(bbox, axis))
        .collect();

    match config.stretch_rule {
        StretchRule::Equal => {
            for i in 0..spans.len().saturating_sub(1) {
                let mid = (spans[i].1 + spans[i + 1].0) / 2.0;
                spans[i].1 = mid;
                spans[i + 1].0 = mid;
            }
        }
        StretchRule::Left => {
            for i in 0..spans.len().saturating_sub(1) {
                spans[i].1 = spans[i].1.max(spans[i + 1].0);
            }
        }
    }

    if config.tile_table {
        let (table_start, table_end) = main_span(table, axis);
        if let Some(first) = spans.first_mut() {
            first.0 = first.0.min(table_start);
        }
        if let Some(last) = spans.last_mut() {
            last.1 = last.1.max(table_end);
        }
    }

    let mut items: Vec<GridItem> = Vec::with_capacity(kept.len());
    for (i, ((id, bbox), (start, end))) in kept.into_iter().zip(spans).enumerate() {
        let end = end.max(start);
        items.push(GridItem {
            id,
            bbox: rebuild(table, &bbox, axis, start, end)?,
            number: i as u32 + 1,
        });
    }
    Ok(items)
}

/// IoU of two 1-D intervals.
#[inline]
fn interval_iou((a_start, a_end): (f32, f32), (b_start, b_end): (f32, f32)) -> f32 {
    let intersection = a_end.min(b_end) - a_start.max(b_start);
    if intersection <= 0.0 {
        return 0.0;
    }
    let union = a_end.max(b_end) - a_start.min(b_start);
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

#[inline]
fn main_span(bbox: &BoundingBox, axis: Axis) -> (f32, f32) {
    match axis {
        Axis::Rows => (bbox.uly(), bbox.lry()),
        Axis::Columns => (bbox.ulx(), bbox.lrx()),
    }
}

#[inline]
fn main_center(bbox: &BoundingBox, axis: Axis) -> f32 {
    let (start, end) = main_span(bbox, axis);
    (start + end) / 2.0
}

fn rebuild(
    table: &BoundingBox,
    original: &BoundingBox,
    axis: Axis,
    start: f32,
    end: f32,
) -> Result<BoundingBox> {
    match axis {
        Axis::Rows => {
            BoundingBox::new(table.ulx(), start, table.lrx(), end, original.mode())
        }
        Axis::Columns => {
            BoundingBox::new(start, table.uly(), end, table.lry(), original.mode())
        }
    }
}
