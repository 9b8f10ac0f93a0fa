//! Category taxonomy for layout annotations.
//!
//! The categories the algorithms reason about are a closed enum
//! ([`LayoutType`]); open extension for upstream detectors happens through an
//! explicit [`CategoryRegistry`] that is injected per pipeline run. There is
//! no module-level registry singleton.

use crate::error::{Result, StructError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Intrinsic layout categories produced by detectors or synthesized in-core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutType {
    /// Body text block in the narrative reading flow
    Text,
    /// Title or section header block
    Title,
    /// List block
    List,
    /// Figure or picture region
    Figure,
    /// Caption attached to a figure or table
    Caption,
    /// Table region
    Table,
    /// Table row (detected or synthesized)
    Row,
    /// Table column (detected or synthesized)
    Column,
    /// Simple table cell
    Cell,
    /// Cell spanning more than one row and/or column
    SpanningCell,
    /// Column header cell
    ColumnHeader,
    /// Row header cell
    RowHeader,
    /// Projected row header (section row spanning the table width)
    ProjectedRowHeader,
    /// Text line (synthesized from words)
    Line,
    /// Single word with recognized text
    Word,
    /// Whole-page category, carried by the page summary annotation
    Page,
}

impl LayoutType {
    /// True for the cell-like categories a table grid is built from.
    #[inline]
    #[must_use]
    pub const fn is_cell(self) -> bool {
        matches!(
            self,
            Self::Cell
                | Self::SpanningCell
                | Self::ColumnHeader
                | Self::RowHeader
                | Self::ProjectedRowHeader
        )
    }

    /// True for block categories that take part in the reading flow.
    #[inline]
    #[must_use]
    pub const fn is_floating_text(self) -> bool {
        matches!(self, Self::Text | Self::Title | Self::List)
    }

    /// Canonical snake_case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Title => "title",
            Self::List => "list",
            Self::Figure => "figure",
            Self::Caption => "caption",
            Self::Table => "table",
            Self::Row => "row",
            Self::Column => "column",
            Self::Cell => "cell",
            Self::SpanningCell => "spanning_cell",
            Self::ColumnHeader => "column_header",
            Self::RowHeader => "row_header",
            Self::ProjectedRowHeader => "projected_row_header",
            Self::Line => "line",
            Self::Word => "word",
            Self::Page => "page",
        }
    }
}

impl fmt::Display for LayoutType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayoutType {
    type Err = StructError;

    fn from_str(s: &str) -> Result<Self> {
        // Normalize: lowercase, hyphens/spaces to underscores
        let normalized = s.to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "text" => Ok(Self::Text),
            "title" | "section_header" => Ok(Self::Title),
            "list" | "list_item" => Ok(Self::List),
            "figure" | "picture" => Ok(Self::Figure),
            "caption" => Ok(Self::Caption),
            "table" => Ok(Self::Table),
            "row" | "table_row" => Ok(Self::Row),
            "column" | "table_column" => Ok(Self::Column),
            "cell" | "table_cell" => Ok(Self::Cell),
            "spanning_cell" | "merged_cell" => Ok(Self::SpanningCell),
            "column_header" => Ok(Self::ColumnHeader),
            "row_header" => Ok(Self::RowHeader),
            "projected_row_header" => Ok(Self::ProjectedRowHeader),
            "line" => Ok(Self::Line),
            "word" => Ok(Self::Word),
            "page" => Ok(Self::Page),
            _ => Err(StructError::MalformedInput {
                reason: format!("unknown layout category '{s}'"),
            }),
        }
    }
}

/// Annotation category: a closed intrinsic type or a registered custom one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Category {
    /// Intrinsic category the core algorithms understand
    Layout(LayoutType),
    /// Open-extension category, resolved through a [`CategoryRegistry`]
    Custom(CustomCategoryId),
}

impl Category {
    /// The intrinsic layout type, if any.
    #[inline]
    #[must_use]
    pub const fn layout_type(self) -> Option<LayoutType> {
        match self {
            Self::Layout(t) => Some(t),
            Self::Custom(_) => None,
        }
    }
}

impl From<LayoutType> for Category {
    #[inline]
    fn from(t: LayoutType) -> Self {
        Self::Layout(t)
    }
}

/// Identifier of a custom category inside one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomCategoryId(pub u16);

/// Keys of typed sub-category slots on an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubCategoryKey {
    /// 1-based row number of a cell
    RowNumber,
    /// 1-based column number of a cell
    ColumnNumber,
    /// Number of rows a cell spans
    RowSpan,
    /// Number of columns a cell spans
    ColumnSpan,
    /// Header role of a cell (value category marks the header kind)
    Header,
    /// Position in the deterministic reading order
    ReadingOrder,
    /// Recognized text attached by the OCR layer
    Characters,
}

/// Keys of typed relationship edges on an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKey {
    /// Parent-to-child containment edge written by the matching engine
    Child,
    /// Caption-to-figure/table link from nearest-neighbor matching
    LayoutLink,
}

/// Per-run registry mapping custom category names to ids.
///
/// Upstream detectors may emit categories the core has no intrinsic meaning
/// for; those are registered here so annotations can carry them through the
/// graph untouched. One registry per pipeline run, passed explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryRegistry {
    names: Vec<String>,
}

impl CategoryRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom category name, returning its id.
    ///
    /// Registering an existing name returns the existing id.
    pub fn register(&mut self, name: &str) -> CustomCategoryId {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            return CustomCategoryId(pos as u16);
        }
        self.names.push(name.to_string());
        CustomCategoryId((self.names.len() - 1) as u16)
    }

    /// Look up a registered name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<CustomCategoryId> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|p| CustomCategoryId(p as u16))
    }

    /// Name for a registered id.
    #[must_use]
    pub fn name(&self, id: CustomCategoryId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    /// Resolve a detector-supplied category name to a [`Category`]:
    /// intrinsic if the name parses as a [`LayoutType`], custom otherwise.
    pub fn resolve(&mut self, name: &str) -> Category {
        LayoutType::from_str(name)
            .map(Category::Layout)
            .unwrap_or_else(|_| Category::Custom(self.register(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_names() {
        assert_eq!("Spanning-Cell".parse::<LayoutType>().unwrap(), LayoutType::SpanningCell);
        assert_eq!("TABLE".parse::<LayoutType>().unwrap(), LayoutType::Table);
        assert!("flux_capacitor".parse::<LayoutType>().is_err());
    }

    #[test]
    fn cell_predicate() {
        assert!(LayoutType::SpanningCell.is_cell());
        assert!(LayoutType::ColumnHeader.is_cell());
        assert!(!LayoutType::Row.is_cell());
        assert!(!LayoutType::Table.is_cell());
    }

    #[test]
    fn registry_is_idempotent() {
        let mut reg = CategoryRegistry::new();
        let a = reg.register("stamp");
        let b = reg.register("stamp");
        assert_eq!(a, b);
        assert_eq!(reg.name(a), Some("stamp"));
        assert_eq!(reg.get("stamp"), Some(a));
        assert_eq!(reg.get("signature"), None);
    }

    #[test]
    fn resolve_prefers_intrinsic() {
        let mut reg = CategoryRegistry::new();
        assert_eq!(reg.resolve("table"), Category::Layout(LayoutType::Table));
        let custom = reg.resolve("signature");
        assert!(matches!(custom, Category::Custom(_)));
    }
}
