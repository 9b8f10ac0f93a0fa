//! Reading-order assignment.
//!
//! Stateless per page. Words are grouped into lines inside each floating text
//! block, blocks are arranged into columns and column groups, and every
//! block, line and word receives a monotonically increasing rank. The order
//! is total and deterministic: vertical ties break left first, horizontal
//! ties by score then by annotation id.

use crate::config::{ReadingOrderConfig, ResidualWordPolicy, TableSegmentConfig};
use crate::spatial::BoxIndex;
use crate::table::stretch::{prepare_items, Axis, GridItem};
use crate::union_find::UnionFind;
use log::debug;
use ordered_float::OrderedFloat;
use pagestruct_core::{
    AnnotationId, BoundingBox, Category, CategoryAnnotation, ImageAnnotation, LayoutType, Page,
    RelationshipKey, Result, SubCategoryKey,
};
use rustc_hash::FxHashMap;

/// Minimum IoA of a word against a block for the word to belong to it.
const WORD_MEMBER_IOA: f32 = 0.5;

#[derive(Debug, Clone, Copy)]
struct WordRef {
    id: AnnotationId,
    bbox: BoundingBox,
    score: f32,
}

impl WordRef {
    fn center_y(&self) -> f32 {
        self.bbox.center().1
    }
}

/// Deterministic word order inside one line: left first, then score, then id.
fn line_sort_key(word: &WordRef) -> (OrderedFloat<f32>, OrderedFloat<f32>, u32) {
    (
        OrderedFloat(word.bbox.ulx()),
        OrderedFloat(-word.score),
        word.id.0,
    )
}

/// Group words into lines by vertical-center bands.
///
/// Words are visited top to bottom; a word joins the first open line whose
/// band (seed center ± `height_tolerance` × seed half-height) contains its
/// center. A word outside every band still continues a line it follows
/// horizontally when its center deviates by at most `broken_line_tolerance ×
/// page_height`; otherwise it opens a new line. Lines are then split at
/// horizontal gaps wider than `paragraph_break × container_width`.
fn group_lines(
    words: &[WordRef],
    config: &ReadingOrderConfig,
    container_width: f32,
    page_height: f32,
) -> Vec<Vec<WordRef>> {
    let mut ordered: Vec<WordRef> = words.to_vec();
    ordered.sort_by_key(|word| {
        (
            OrderedFloat(word.center_y()),
            OrderedFloat(word.bbox.ulx()),
            OrderedFloat(-word.score),
            word.id.0,
        )
    });

    let broken_reach = config.broken_line_tolerance * page_height;
    let mut lines: Vec<Vec<WordRef>> = Vec::new();
    let mut bands: Vec<(f32, f32)> = Vec::new();
    for word in ordered {
        let center = word.center_y();
        let band = bands.iter().position(|&(lo, hi)| center >= lo && center <= hi);
        // a word outside every band may still continue the line it follows
        // horizontally, as a broken line
        let joined = band.or_else(|| {
            lines.iter().position(|line| {
                line.last().map_or(false, |last| {
                    word.bbox.ulx() >= last.bbox.lrx()
                        && (center - last.center_y()).abs() <= broken_reach
                })
            })
        });
        match joined {
            Some(i) => lines[i].push(word),
            None => {
                let half_height = word.bbox.height() / 2.0;
                let reach = config.height_tolerance * half_height;
                bands.push((center - reach, center + reach));
                lines.push(vec![word]);
            }
        }
    }

    for line in &mut lines {
        line.sort_by_key(line_sort_key);
    }

    if config.paragraph_break > 0.0 {
        let max_gap = config.paragraph_break * container_width;
        lines = lines
            .into_iter()
            .flat_map(|line| split_at_gaps(line, max_gap))
            .collect();
    }
    lines
}

fn split_at_gaps(line: Vec<WordRef>, max_gap: f32) -> Vec<Vec<WordRef>> {
    let mut out: Vec<Vec<WordRef>> = Vec::new();
    for word in line {
        match out.last_mut() {
            Some(current) if word.bbox.ulx() - current.last().map_or(0.0, |w| w.bbox.lrx()) <= max_gap => {
                current.push(word);
            }
            _ => out.push(vec![word]),
        }
    }
    out
}

/// Synthesize a line annotation over `words` and wire the child edges.
fn add_line(page: &mut Page, words: &[WordRef]) -> Result<Option<AnnotationId>> {
    let boxes: Vec<BoundingBox> = words.iter().map(|w| w.bbox).collect();
    let Some(bbox) = BoundingBox::merge(boxes.iter()) else {
        return Ok(None);
    };
    let line = page.add(ImageAnnotation::new(Category::Layout(LayoutType::Line), bbox));
    for word in words {
        page.add_relationship(line, RelationshipKey::Child, word.id)?;
    }
    Ok(Some(line))
}

/// Column membership of each block, derived with the table stretching logic
/// over the full page extent.
fn column_of_blocks(
    page: &Page,
    blocks: &[(AnnotationId, BoundingBox)],
) -> Result<FxHashMap<AnnotationId, u32>> {
    let page_box = BoundingBox::new_absolute(0.0, 0.0, page.width, page.height)?;
    let strip_config = TableSegmentConfig {
        tile_table: false,
        column_removal_iou: 0.5,
        ..TableSegmentConfig::default()
    };
    let strips: Vec<GridItem> = prepare_items(
        &page_box,
        blocks.to_vec(),
        Axis::Columns,
        &strip_config,
    )?;

    let mut assignment: FxHashMap<AnnotationId, u32> = FxHashMap::default();
    for &(id, bbox) in blocks {
        let best = strips
            .iter()
            .map(|strip| (strip.number, bbox.ioa(&strip.bbox)))
            .max_by_key(|&(number, coverage)| (OrderedFloat(coverage), std::cmp::Reverse(number)));
        if let Some((number, _)) = best {
            assignment.insert(id, number);
        }
    }
    Ok(assignment)
}

/// Bucketed sort key: values within one `step` of each other compare equal,
/// so the next key decides.
#[inline]
fn quantized(value: f32, step: f32) -> OrderedFloat<f32> {
    if step > 0.0 {
        OrderedFloat((value / step).floor())
    } else {
        OrderedFloat(value)
    }
}

/// Arrange blocks into reading sequence: vertically overlapping blocks form
/// one group, groups run top to bottom, columns inside a group left to right,
/// blocks inside a column top to bottom. Tops within the starting-point
/// tolerance count as the same height, so the leftmost of them starts the
/// column.
fn order_blocks(
    page: &Page,
    blocks: &[(AnnotationId, BoundingBox)],
    config: &ReadingOrderConfig,
) -> Result<Vec<AnnotationId>> {
    if blocks.is_empty() {
        return Ok(Vec::new());
    }
    let columns = column_of_blocks(page, blocks)?;
    let start_step = config.starting_point_tolerance * page.height;

    let mut uf: UnionFind<AnnotationId> = UnionFind::new();
    for &(id, _) in blocks {
        uf.insert(id);
    }
    for (i, &(a, a_box)) in blocks.iter().enumerate() {
        for &(b, b_box) in &blocks[i + 1..] {
            let overlap = a_box.lry().min(b_box.lry()) - a_box.uly().max(b_box.uly());
            if overlap > 0.0 {
                uf.union(a, b);
            }
        }
    }
    let mut groups = uf.components(blocks.iter().map(|&(id, _)| id));

    let boxes: FxHashMap<AnnotationId, BoundingBox> = blocks.iter().copied().collect();
    groups.sort_by_key(|group| {
        let top = group
            .iter()
            .map(|id| OrderedFloat(boxes[id].uly()))
            .min()
            .unwrap_or(OrderedFloat(0.0));
        let left = group
            .iter()
            .map(|id| OrderedFloat(boxes[id].ulx()))
            .min()
            .unwrap_or(OrderedFloat(0.0));
        let lowest = group.iter().map(|id| id.0).min().unwrap_or(0);
        (top, left, lowest)
    });

    let mut ordered: Vec<AnnotationId> = Vec::with_capacity(blocks.len());
    for group in groups {
        let mut members = group;
        members.sort_by_key(|id| {
            let bbox = &boxes[id];
            (
                columns.get(id).copied().unwrap_or(u32::MAX),
                quantized(bbox.uly(), start_step),
                OrderedFloat(bbox.ulx()),
                id.0,
            )
        });
        ordered.extend(members);
    }
    Ok(ordered)
}

/// Assign reading order to every floating block, line and word on the page.
///
/// Lines are synthesized from the words each block claims; the returned list
/// holds all ranked annotations in rank order. The same order is recorded as
/// `Child` edges on the page summary, and every ranked annotation gets a
/// `ReadingOrder` sub-category with its rank.
///
/// # Errors
///
/// Returns [`pagestruct_core::StructError::MalformedInput`] for degenerate
/// page geometry; id lookups cannot fail for annotations the page owns.
pub fn order_page(page: &mut Page, config: &ReadingOrderConfig) -> Result<Vec<AnnotationId>> {
    let blocks: Vec<(AnnotationId, BoundingBox)> = page
        .iter_active()
        .filter(|a| match a.category_type() {
            Category::Layout(layout) => layout.is_floating_text(),
            Category::Custom(_) => false,
        })
        .map(|a| (a.id, a.bounding_box))
        .collect();
    let words: Vec<WordRef> = page
        .iter_active()
        .filter(|a| a.category_type() == Category::Layout(LayoutType::Word))
        .map(|a| WordRef {
            id: a.id,
            bbox: a.bounding_box,
            score: a.score().unwrap_or(0.0),
        })
        .collect();

    // claim words for blocks by best coverage
    let index = BoxIndex::build(blocks.iter().copied());
    let block_boxes: FxHashMap<AnnotationId, BoundingBox> = blocks.iter().copied().collect();
    let mut claimed: FxHashMap<AnnotationId, Vec<WordRef>> = FxHashMap::default();
    let mut residual: Vec<WordRef> = Vec::new();
    for word in words {
        let best = index
            .candidates(&word.bbox)
            .map(|block_id| (block_id, word.bbox.ioa(&block_boxes[&block_id])))
            .filter(|&(_, coverage)| coverage >= WORD_MEMBER_IOA)
            .max_by_key(|&(block_id, coverage)| {
                (OrderedFloat(coverage), std::cmp::Reverse(block_id.0))
            });
        match best {
            Some((block_id, _)) => claimed.entry(block_id).or_default().push(word),
            None => residual.push(word),
        }
    }

    let block_order = order_blocks(page, &blocks, config)?;

    let mut ranked: Vec<AnnotationId> = Vec::new();
    for block_id in block_order {
        ranked.push(block_id);
        let block_width = block_boxes[&block_id].width();
        let members = claimed.remove(&block_id).unwrap_or_default();
        for line_words in group_lines(&members, config, block_width, page.height) {
            if let Some(line_id) = add_line(page, &line_words)? {
                page.add_relationship(block_id, RelationshipKey::Child, line_id)?;
                ranked.push(line_id);
                ranked.extend(line_words.iter().map(|w| w.id));
            }
        }
    }

    match config.residual_words {
        ResidualWordPolicy::AppendLines => {
            for line_words in group_lines(&residual, config, page.width, page.height) {
                if let Some(line_id) = add_line(page, &line_words)? {
                    ranked.push(line_id);
                    ranked.extend(line_words.iter().map(|w| w.id));
                }
            }
        }
        ResidualWordPolicy::Drop => {
            if !residual.is_empty() {
                debug!("dropping {} residual words from reading order", residual.len());
            }
        }
    }

    for (rank, &id) in ranked.iter().enumerate() {
        let annotation = page.try_get_mut(id)?;
        let category = annotation.category.category;
        annotation.category.set_sub_category(
            SubCategoryKey::ReadingOrder,
            CategoryAnnotation::with_index(category, rank as u32 + 1),
        );
        page.summary_mut().add_relationship(RelationshipKey::Child, id);
    }
    debug!("page {}: ranked {} annotations", page.page_no, ranked.len());
    Ok(ranked)
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

    fn word(ulx: f32, uly: f32, lrx: f32, lry: f32, id: u32) -> WordRef {
        WordRef {
            id: AnnotationId(id),
            bbox: bbox(ulx, uly, lrx, lry),
            score: 0.9,
        }
    }

    #[test]
    fn band_grouping_yields_two_lines() {
        // centers 10,10,10,50,50 with bands [0,20] and [40,60]
        let words = vec![
            word(0.0, 0.0, 10.0, 20.0, 0),
            word(12.0, 0.0, 22.0, 20.0, 1),
            word(24.0, 0.0, 34.0, 20.0, 2),
            word(0.0, 40.0, 10.0, 60.0, 3),
            word(12.0, 40.0, 22.0, 60.0, 4),
        ];
        let config = ReadingOrderConfig {
            height_tolerance: 1.0,
            paragraph_break: 0.0,
            ..ReadingOrderConfig::default()
        };
        let lines = group_lines(&words, &config, 100.0, 1000.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 3);
        assert_eq!(lines[1].len(), 2);
    }

    #[test]
    fn broken_line_continues_within_tolerance() {
        // second word sags below the first word's band but follows it
        let words = vec![
            word(0.0, 0.0, 40.0, 20.0, 0),
            word(45.0, 14.0, 85.0, 34.0, 1),
        ];
        let lenient = ReadingOrderConfig {
            height_tolerance: 0.5,
            paragraph_break: 0.0,
            broken_line_tolerance: 0.2,
            ..ReadingOrderConfig::default()
        };
        assert_eq!(group_lines(&words, &lenient, 100.0, 100.0).len(), 1);
        let strict = ReadingOrderConfig {
            height_tolerance: 0.5,
            paragraph_break: 0.0,
            broken_line_tolerance: 0.0,
            ..ReadingOrderConfig::default()
        };
        assert_eq!(group_lines(&words, &strict, 100.0, 100.0).len(), 2);
    }

    #[test]
    fn words_in_line_run_left_to_right() {
        let words = vec![
            word(24.0, 0.0, 34.0, 20.0, 0),
            word(0.0, 1.0, 10.0, 19.0, 1),
            word(12.0, 0.0, 22.0, 20.0, 2),
        ];
        let config = ReadingOrderConfig {
            paragraph_break: 0.0,
            ..ReadingOrderConfig::default()
        };
        let lines = group_lines(&words, &config, 100.0, 1000.0);
        assert_eq!(lines.len(), 1);
        let ids: Vec<u32> = lines[0].iter().map(|w| w.id.0).collect();
        assert_eq!(ids, vec![1, 2, 0]);
    }

    #[test]
    fn wide_gap_splits_paragraphs() {
        let words = vec![
            word(0.0, 0.0, 10.0, 20.0, 0),
            word(12.0, 0.0, 22.0, 20.0, 1),
            word(80.0, 0.0, 90.0, 20.0, 2),
        ];
        let config = ReadingOrderConfig {
            paragraph_break: 0.2,
            ..ReadingOrderConfig::default()
        };
        let lines = group_lines(&words, &config, 100.0, 1000.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1][0].id.0, 2);
    }

    #[test]
    fn two_column_page_reads_left_column_first() {
        let mut page = Page::new(1, 1000.0, 1000.0).unwrap();
        let left_top = add(&mut page, LayoutType::Text, bbox(50.0, 100.0, 450.0, 500.0));
        let left_bottom = add(&mut page, LayoutType::Text, bbox(50.0, 520.0, 450.0, 900.0));
        let right = add(&mut page, LayoutType::Text, bbox(550.0, 100.0, 950.0, 900.0));
        let title = add(&mut page, LayoutType::Title, bbox(50.0, 10.0, 950.0, 80.0));
        let ranked = order_page(&mut page, &ReadingOrderConfig::default()).unwrap();
        assert_eq!(ranked, vec![title, left_top, left_bottom, right]);
        assert_eq!(
            page.get(title)
                .unwrap()
                .category
                .sub_category_index(SubCategoryKey::ReadingOrder),
            Some(1)
        );
    }

    #[test]
    fn near_equal_starting_points_break_left_first() {
        let build = |tolerance: f32| {
            let mut page = Page::new(1, 1000.0, 1000.0).unwrap();
            let left = add(&mut page, LayoutType::Text, bbox(100.0, 102.0, 400.0, 300.0));
            let right = add(&mut page, LayoutType::Text, bbox(150.0, 100.0, 380.0, 280.0));
            let config = ReadingOrderConfig {
                starting_point_tolerance: tolerance,
                ..ReadingOrderConfig::default()
            };
            let ranked = order_page(&mut page, &config).unwrap();
            (ranked, left, right)
        };
        // tops 102 and 100 count as the same starting point at the default
        // tolerance, so the leftmost block leads
        let (ranked, left, right) = build(0.005);
        assert_eq!(ranked, vec![left, right]);
        // with the tolerance off the strictly higher block leads
        let (ranked, left, right) = build(0.0);
        assert_eq!(ranked, vec![right, left]);
    }

    #[test]
    fn order_is_deterministic_across_runs() {
        let build = || {
            let mut page = Page::new(1, 1000.0, 1000.0).unwrap();
            add(&mut page, LayoutType::Text, bbox(50.0, 100.0, 450.0, 500.0));
            add(&mut page, LayoutType::Text, bbox(550.0, 100.0, 950.0, 500.0));
            let block = add(&mut page, LayoutType::Text, bbox(50.0, 600.0, 950.0, 700.0));
            for i in 0..4 {
                let left = 60.0 + i as f32 * 50.0;
                add(&mut page, LayoutType::Word, bbox(left, 610.0, left + 40.0, 630.0));
            }
            let ranked = order_page(&mut page, &ReadingOrderConfig::default()).unwrap();
            (ranked, block)
        };
        let (first, _) = build();
        let (second, _) = build();
        assert_eq!(first, second);
    }

    #[test]
    fn residual_words_append_as_lines() {
        let mut page = Page::new(1, 1000.0, 1000.0).unwrap();
        let block = add(&mut page, LayoutType::Text, bbox(0.0, 0.0, 500.0, 100.0));
        let inside = add(&mut page, LayoutType::Word, bbox(10.0, 10.0, 60.0, 30.0));
        let stray = add(&mut page, LayoutType::Word, bbox(700.0, 700.0, 760.0, 720.0));
        let ranked = order_page(&mut page, &ReadingOrderConfig::default()).unwrap();
        // block, its line, its word, then a synthesized residual line and the stray word
        assert_eq!(ranked[0], block);
        assert_eq!(ranked[2], inside);
        assert_eq!(*ranked.last().unwrap(), stray);
        let residual_line = ranked[ranked.len() - 2];
        let line = page.get(residual_line).unwrap();
        assert_eq!(line.category_type(), Category::Layout(LayoutType::Line));
        assert_eq!(line.category.relationship(RelationshipKey::Child), &[stray]);
    }

    #[test]
    fn drop_policy_skips_residual_words() {
        let mut page = Page::new(1, 1000.0, 1000.0).unwrap();
        add(&mut page, LayoutType::Text, bbox(0.0, 0.0, 500.0, 100.0));
        let stray = add(&mut page, LayoutType::Word, bbox(700.0, 700.0, 760.0, 720.0));
        let config = ReadingOrderConfig {
            residual_words: ResidualWordPolicy::Drop,
            ..ReadingOrderConfig::default()
        };
        let ranked = order_page(&mut page, &config).unwrap();
        assert!(!ranked.contains(&stray));
        assert!(page
            .get(stray)
            .unwrap()
            .category
            .sub_category(SubCategoryKey::ReadingOrder)
            .is_none());
    }
}
