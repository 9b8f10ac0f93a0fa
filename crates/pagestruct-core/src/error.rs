//! Error types for page structure reconstruction.
//!
//! All public APIs use the [`Result`] alias which wraps [`StructError`].
//! Errors fall into three propagation classes:
//!
//! - **Configuration errors** abort the whole run before any page is touched.
//! - **Malformed input** is local to a single annotation: the offending
//!   annotation is rejected and the page continues.
//! - **Ambiguous geometry** is local to a single table: segmentation for that
//!   table fails, the page keeps its layout without table structure.

use thiserror::Error;

/// Errors that can occur while building page structure.
#[derive(Debug, Error)]
pub enum StructError {
    /// An input annotation violates a basic invariant (negative-area box,
    /// unknown category name). Reject the annotation, continue the page.
    #[error("malformed input: {reason}")]
    MalformedInput {
        /// What invariant was violated
        reason: String,
    },

    /// The refinement fixed point did not converge within the iteration cap.
    /// Table segmentation fails for this table only; partial results are
    /// discarded, never emitted.
    #[error("ambiguous geometry in table {table_id}: {reason}")]
    AmbiguousGeometry {
        /// Arena id of the table annotation that failed
        table_id: u32,
        /// Why the geometry could not be resolved
        reason: String,
    },

    /// Invalid configuration (threshold outside [0, 1], unknown rule name).
    /// Fails fast before any page is processed.
    #[error("invalid configuration: {reason}")]
    Config {
        /// What is invalid in the configuration
        reason: String,
    },

    /// A relationship or operation referenced an annotation id that is not
    /// present in the page arena.
    #[error("unknown annotation id {id}")]
    UnknownAnnotation {
        /// The id that failed to resolve
        id: u32,
    },
}

impl StructError {
    /// True if this error is user-fixable configuration.
    #[inline]
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// True if this error is local to one table and should not abort the page.
    #[inline]
    #[must_use]
    pub const fn is_table_local(&self) -> bool {
        matches!(self, Self::AmbiguousGeometry { .. })
    }
}

/// Type alias for `Result` with [`StructError`].
pub type Result<T> = std::result::Result<T, StructError>;
