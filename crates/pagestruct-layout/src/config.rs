//! Configuration surface of the layout pipeline.
//!
//! All knobs are plain serde structs with defaults; [`PipelineConfig::validate`]
//! runs before any page is processed and turns bad values into
//! [`StructError::Config`], so configuration errors abort the whole run while
//! geometric errors stay local to one table or page.

use pagestruct_core::{LayoutType, Result, StructError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Overlap metric used when matching children to parents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchRule {
    /// Symmetric intersection-over-union
    #[default]
    Iou,
    /// Intersection over the child's own area
    Ioa,
}

impl fmt::Display for MatchRule {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iou => write!(f, "iou"),
            Self::Ioa => write!(f, "ioa"),
        }
    }
}

impl FromStr for MatchRule {
    type Err = StructError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "iou" => Ok(Self::Iou),
            "ioa" => Ok(Self::Ioa),
            _ => Err(StructError::Config {
                reason: format!("unknown match rule '{s}' (expected: iou, ioa)"),
            }),
        }
    }
}

/// How detected rows/columns are stretched to the table edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StretchRule {
    /// Distribute the gap at the midpoint between consecutive items
    #[default]
    Equal,
    /// Extend each item up to the next item's start
    Left,
}

impl FromStr for StretchRule {
    type Err = StructError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "equal" => Ok(Self::Equal),
            "left" => Ok(Self::Left),
            _ => Err(StructError::Config {
                reason: format!("unknown stretch rule '{s}' (expected: equal, left)"),
            }),
        }
    }
}

/// What happens to words no layout block claimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualWordPolicy {
    /// Synthesize pseudo line blocks and append them after all ordered blocks
    #[default]
    AppendLines,
    /// Drop residual words from the reading order
    Drop,
}

impl FromStr for ResidualWordPolicy {
    type Err = StructError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "append_lines" | "append" => Ok(Self::AppendLines),
            "drop" => Ok(Self::Drop),
            _ => Err(StructError::Config {
                reason: format!("unknown residual word policy '{s}' (expected: append_lines, drop)"),
            }),
        }
    }
}

/// Rule + threshold for one matching pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchSpec {
    /// Overlap metric
    pub rule: MatchRule,
    /// Minimum overlap for a parent/child edge, in [0, 1]
    pub threshold: f32,
}

impl MatchSpec {
    /// Convenience constructor.
    #[inline]
    #[must_use]
    pub const fn new(rule: MatchRule, threshold: f32) -> Self {
        Self { rule, threshold }
    }

    fn validate(&self, what: &str) -> Result<()> {
        validate_ratio(self.threshold, what)
    }
}

/// Word-to-block matching configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Metric and threshold for word/block containment edges
    pub spec: MatchSpec,
    /// Link each child only to its single best parent
    pub max_parent_only: bool,
}

impl Default for MatchingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            spec: MatchSpec::new(MatchRule::Ioa, 0.6),
            max_parent_only: true,
        }
    }
}

/// One cross-category suppression pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NmsPair {
    /// First category of the pair
    pub first: LayoutType,
    /// Second category of the pair
    pub second: LayoutType,
    /// IoU above which one of the two is suppressed
    pub threshold: f32,
    /// Category that always wins, irrespective of score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<LayoutType>,
}

impl NmsPair {
    /// Score-decided pair.
    #[must_use]
    pub const fn new(first: LayoutType, second: LayoutType, threshold: f32) -> Self {
        Self {
            first,
            second,
            threshold,
            priority: None,
        }
    }

    /// Pair where `priority` always survives.
    #[must_use]
    pub const fn with_priority(
        first: LayoutType,
        second: LayoutType,
        threshold: f32,
        priority: LayoutType,
    ) -> Self {
        Self {
            first,
            second,
            threshold,
            priority: Some(priority),
        }
    }
}

/// Table segmentation configuration, shared by both variants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableSegmentConfig {
    /// How rows/columns are stretched to the table edges
    pub stretch_rule: StretchRule,
    /// Rows above this mutual IoU are near-duplicates; the earlier one is kept
    pub row_removal_iou: f32,
    /// Columns above this mutual IoU are near-duplicates
    pub column_removal_iou: f32,
    /// Tile the full table after stretching to eliminate residual gaps
    pub tile_table: bool,
    /// Cell-to-row/column assignment metric and threshold (variant A)
    pub cell_assignment: MatchSpec,
    /// First-tier spanning-cell/header to grid matching (variant B)
    pub grid_match_primary: MatchSpec,
    /// Fallback tier used when the primary tier matches nothing (variant B)
    pub grid_match_fallback: MatchSpec,
}

impl Default for TableSegmentConfig {
    fn default() -> Self {
        Self {
            stretch_rule: StretchRule::Equal,
            row_removal_iou: 0.6,
            column_removal_iou: 0.6,
            tile_table: true,
            cell_assignment: MatchSpec::new(MatchRule::Ioa, 0.3),
            grid_match_primary: MatchSpec::new(MatchRule::Iou, 0.4),
            grid_match_fallback: MatchSpec::new(MatchRule::Ioa, 0.4),
        }
    }
}

/// Reading-order tolerances.
///
/// All tolerances are fractions of the relevant extent (page height for the
/// vertical ones, block width for `paragraph_break`), except `height_tolerance`
/// which is a multiplier on the line seed's half-height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingOrderConfig {
    /// Vertical tolerance when picking the starting block of a column
    pub starting_point_tolerance: f32,
    /// Vertical tolerance when deciding two words continue one broken line
    pub broken_line_tolerance: f32,
    /// Multiplier on a line's seed half-height for the band that captures
    /// further words into the line
    pub height_tolerance: f32,
    /// Horizontal gap, as a fraction of block width, that splits a line into
    /// separate paragraphs; 0 disables splitting
    pub paragraph_break: f32,
    /// What happens to words no block claimed
    pub residual_words: ResidualWordPolicy,
}

impl Default for ReadingOrderConfig {
    fn default() -> Self {
        Self {
            starting_point_tolerance: 0.005,
            broken_line_tolerance: 0.003,
            height_tolerance: 2.0,
            paragraph_break: 0.035,
            residual_words: ResidualWordPolicy::AppendLines,
        }
    }
}

/// Hard cap on refinement expansion/re-component rounds. A rectangle fixed
/// point on real tables converges in two or three rounds.
pub const DEFAULT_REFINE_ITERATION_CAP: usize = 10;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Word-to-block matching
    pub matching: MatchingConfig,
    /// Cross-category suppression pairs
    pub nms_pairs: Vec<NmsPair>,
    /// Table segmentation
    pub segmentation: TableSegmentConfig,
    /// Refinement fixed-point iteration cap
    pub refine_iteration_cap: usize,
    /// Reading order
    pub reading_order: ReadingOrderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            matching: MatchingConfig::default(),
            nms_pairs: Vec::new(),
            segmentation: TableSegmentConfig::default(),
            refine_iteration_cap: DEFAULT_REFINE_ITERATION_CAP,
            reading_order: ReadingOrderConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Check every knob before any page runs.
    ///
    /// # Errors
    ///
    /// Returns [`StructError::Config`] on the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.matching.spec.validate("matching threshold")?;
        for (i, pair) in self.nms_pairs.iter().enumerate() {
            validate_ratio(pair.threshold, &format!("nms pair {i} threshold"))?;
            if let Some(priority) = pair.priority {
                if priority != pair.first && priority != pair.second {
                    return Err(StructError::Config {
                        reason: format!(
                            "nms pair {i}: priority category {priority} is neither {} nor {}",
                            pair.first, pair.second
                        ),
                    });
                }
            }
        }
        let seg = &self.segmentation;
        validate_ratio(seg.row_removal_iou, "row removal iou")?;
        validate_ratio(seg.column_removal_iou, "column removal iou")?;
        seg.cell_assignment.validate("cell assignment threshold")?;
        seg.grid_match_primary.validate("grid match primary threshold")?;
        seg.grid_match_fallback.validate("grid match fallback threshold")?;
        if self.refine_iteration_cap == 0 {
            return Err(StructError::Config {
                reason: "refine iteration cap must be at least 1".to_string(),
            });
        }
        let ro = &self.reading_order;
        validate_ratio(ro.starting_point_tolerance, "starting point tolerance")?;
        validate_ratio(ro.broken_line_tolerance, "broken line tolerance")?;
        validate_ratio(ro.paragraph_break, "paragraph break")?;
        if !(ro.height_tolerance > 0.0 && ro.height_tolerance.is_finite()) {
            return Err(StructError::Config {
                reason: format!(
                    "height tolerance {} must be a positive finite multiplier",
                    ro.height_tolerance
                ),
            });
        }
        Ok(())
    }
}

fn validate_ratio(value: f32, what: &str) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(StructError::Config {
            reason: format!("{what} {value} outside [0, 1]"),
        })
    }
}
