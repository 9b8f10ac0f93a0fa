//! HTML rendition of a refined table grid.

use crate::table::{read_span, CellSpan, SegmentedTable};
use pagestruct_core::{AnnotationId, Page, Result, StructError, SubCategoryKey};
use rustc_hash::FxHashMap;

/// Render the grid as an HTML table.
///
/// Walks the grid row by row and emits one `<td>` (or `<th>` for cells with a
/// header sub-category) per cell at that cell's anchor tile, with `rowspan`/
/// `colspan` attributes when above 1. Tiles covered by an earlier anchor are
/// skipped, so each tile is emitted exactly once.
///
/// # Errors
///
/// Returns [`StructError::MalformedInput`] if two cells claim the same anchor
/// tile, which refinement rules out.
pub fn table_html(page: &Page, segmented: &SegmentedTable) -> Result<String> {
    let mut anchors: FxHashMap<(u32, u32), (AnnotationId, CellSpan)> = FxHashMap::default();
    let mut covered: FxHashMap<(u32, u32), AnnotationId> = FxHashMap::default();
    for &id in &segmented.cells {
        let Some(annotation) = page.get(id) else {
            continue;
        };
        if !annotation.active {
            continue;
        }
        let Some(span) = read_span(annotation) else {
            continue;
        };
        let anchor = (span.row_number, span.column_number);
        if let Some(&(other, _)) = anchors.get(&anchor) {
            return Err(StructError::MalformedInput {
                reason: format!(
                    "cells {other} and {id} both anchored at tile {anchor:?}"
                ),
            });
        }
        anchors.insert(anchor, (id, span));
        for row in span.row_number..span.row_number + span.row_span {
            for column in span.column_number..span.column_number + span.column_span {
                covered.insert((row, column), id);
            }
        }
    }

    let mut html = String::from("<table>");
    for row in 1..=segmented.rows {
        html.push_str("<tr>");
        for column in 1..=segmented.columns {
            if let Some(&(id, span)) = anchors.get(&(row, column)) {
                push_cell(&mut html, page, id, span);
            } else if !covered.contains_key(&(row, column)) {
                html.push_str("<td></td>");
            }
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    Ok(html)
}

fn push_cell(html: &mut String, page: &Page, id: AnnotationId, span: CellSpan) {
    let annotation = page.get(id);
    let is_header = annotation.is_some_and(|a| {
        a.category.sub_category(SubCategoryKey::Header).is_some()
    });
    let tag = if is_header { "th" } else { "td" };
    html.push('<');
    html.push_str(tag);
    if span.row_span > 1 {
        html.push_str(&format!(" rowspan=\"{}\"", span.row_span));
    }
    if span.column_span > 1 {
        html.push_str(&format!(" colspan=\"{}\"", span.column_span));
    }
    html.push('>');
    if let Some(text) = annotation.and_then(|a| a.category.text.as_deref()) {
        html.push_str(&escape(text));
    }
    html.push_str("</");
    html.push_str(tag);
    html.push('>');
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
