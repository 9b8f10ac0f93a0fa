//! Geometry kernel: axis-aligned bounding boxes and overlap metrics.
//!
//! Coordinates are stored as fixed-point scaled integers so that repeated
//! local/global transforms of embedded sub-images round-trip exactly and
//! relative coordinates do not accumulate float drift. Accessors expose `f32`
//! values; all ratio metrics guard division and return 0, never NaN.

use crate::error::{Result, StructError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-point scale for internal coordinate storage.
///
/// Relative coordinates in [0, 1] resolve to 1/100000 of the page side;
/// absolute pixel coordinates resolve to 1/100000 of a pixel, which is far
/// below any detector's precision.
const COORD_SCALE: f64 = 100_000.0;

/// Coordinate mode of a bounding box.
///
/// Absolute boxes are in pixels of the owning image; relative boxes are
/// normalized to [0, 1] against the image width/height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordMode {
    /// Pixel coordinates of the owning image
    #[default]
    #[serde(rename = "ABSOLUTE")]
    Absolute,
    /// Normalized coordinates in [0, 1]
    #[serde(rename = "RELATIVE")]
    Relative,
}

impl fmt::Display for CoordMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => write!(f, "absolute"),
            Self::Relative => write!(f, "relative"),
        }
    }
}

/// Axis-aligned bounding box.
///
/// Invariant: `lrx >= ulx` and `lry >= uly`. Zero-area boxes are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    mode: CoordMode,
    // Fixed-point, scaled by COORD_SCALE.
    ulx: i64,
    uly: i64,
    lrx: i64,
    lry: i64,
}

#[inline]
fn to_fixed(v: f32) -> i64 {
    (f64::from(v) * COORD_SCALE).round() as i64
}

#[inline]
fn from_fixed(v: i64) -> f32 {
    (v as f64 / COORD_SCALE) as f32
}

impl BoundingBox {
    /// Create a box in absolute pixel coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`StructError::MalformedInput`] if any coordinate is not
    /// finite or the lower-right corner lies above/left of the upper-left.
    pub fn new_absolute(ulx: f32, uly: f32, lrx: f32, lry: f32) -> Result<Self> {
        Self::new(ulx, uly, lrx, lry, CoordMode::Absolute)
    }

    /// Create a box in normalized [0, 1] coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`StructError::MalformedInput`] on non-finite or inverted
    /// coordinates, or coordinates outside [0, 1].
    pub fn new_relative(ulx: f32, uly: f32, lrx: f32, lry: f32) -> Result<Self> {
        for v in [ulx, uly, lrx, lry] {
            if !(0.0..=1.0).contains(&v) {
                return Err(StructError::MalformedInput {
                    reason: format!("relative coordinate {v} outside [0, 1]"),
                });
            }
        }
        Self::new(ulx, uly, lrx, lry, CoordMode::Relative)
    }

    /// Create a box with an explicit coordinate mode.
    ///
    /// # Errors
    ///
    /// Returns [`StructError::MalformedInput`] on non-finite or inverted
    /// coordinates.
    pub fn new(ulx: f32, uly: f32, lrx: f32, lry: f32, mode: CoordMode) -> Result<Self> {
        for v in [ulx, uly, lrx, lry] {
            if !v.is_finite() {
                return Err(StructError::MalformedInput {
                    reason: format!("non-finite coordinate {v}"),
                });
            }
        }
        let bx = Self {
            mode,
            ulx: to_fixed(ulx),
            uly: to_fixed(uly),
            lrx: to_fixed(lrx),
            lry: to_fixed(lry),
        };
        if bx.lrx < bx.ulx || bx.lry < bx.uly {
            return Err(StructError::MalformedInput {
                reason: format!(
                    "lower-right corner ({lrx}, {lry}) above or left of upper-left ({ulx}, {uly})"
                ),
            });
        }
        Ok(bx)
    }

    const fn from_fixed_parts(mode: CoordMode, ulx: i64, uly: i64, lrx: i64, lry: i64) -> Self {
        Self {
            mode,
            ulx,
            uly,
            lrx,
            lry,
        }
    }

    /// Coordinate mode of this box.
    #[inline]
    #[must_use]
    pub const fn mode(&self) -> CoordMode {
        self.mode
    }

    /// True if the box is in absolute pixel coordinates.
    #[inline]
    #[must_use]
    pub const fn is_absolute(&self) -> bool {
        matches!(self.mode, CoordMode::Absolute)
    }

    /// Upper-left x coordinate.
    #[inline]
    #[must_use]
    pub fn ulx(&self) -> f32 {
        from_fixed(self.ulx)
    }

    /// Upper-left y coordinate.
    #[inline]
    #[must_use]
    pub fn uly(&self) -> f32 {
        from_fixed(self.uly)
    }

    /// Lower-right x coordinate.
    #[inline]
    #[must_use]
    pub fn lrx(&self) -> f32 {
        from_fixed(self.lrx)
    }

    /// Lower-right y coordinate.
    #[inline]
    #[must_use]
    pub fn lry(&self) -> f32 {
        from_fixed(self.lry)
    }

    /// Box width (always >= 0).
    #[inline]
    #[must_use]
    pub fn width(&self) -> f32 {
        from_fixed(self.lrx - self.ulx)
    }

    /// Box height (always >= 0).
    #[inline]
    #[must_use]
    pub fn height(&self) -> f32 {
        from_fixed(self.lry - self.uly)
    }

    /// Box area. Zero-area boxes are valid.
    #[inline]
    #[must_use]
    pub fn area(&self) -> f32 {
        // Multiply in f64 to avoid precision loss on large pixel boxes.
        let w = (self.lrx - self.ulx) as f64 / COORD_SCALE;
        let h = (self.lry - self.uly) as f64 / COORD_SCALE;
        (w * h) as f32
    }

    /// Center point `(cx, cy)`.
    #[inline]
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (
            from_fixed((self.ulx + self.lrx) / 2),
            from_fixed((self.uly + self.lry) / 2),
        )
    }

    /// True if the box has zero width or zero height.
    #[inline]
    #[must_use]
    pub const fn is_zero_area(&self) -> bool {
        self.lrx == self.ulx || self.lry == self.uly
    }

    /// Intersection box, or `None` if the boxes are disjoint.
    ///
    /// Touching edges produce a valid zero-area intersection. Boxes in
    /// different coordinate modes never intersect; the mismatch is logged.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        if self.mode != other.mode {
            log::warn!(
                "intersection of {} and {} box skipped (mixed coordinate modes)",
                self.mode,
                other.mode
            );
            return None;
        }
        let ulx = self.ulx.max(other.ulx);
        let uly = self.uly.max(other.uly);
        let lrx = self.lrx.min(other.lrx);
        let lry = self.lry.min(other.lry);
        if lrx < ulx || lry < uly {
            return None;
        }
        Some(Self::from_fixed_parts(self.mode, ulx, uly, lrx, lry))
    }

    /// Intersection area with another box (0 if disjoint or mixed modes).
    #[inline]
    #[must_use]
    pub fn intersection_area(&self, other: &Self) -> f32 {
        self.intersection(other).map_or(0.0, |b| b.area())
    }

    /// Intersection-over-union. Symmetric, in [0, 1], never NaN.
    #[must_use]
    pub fn iou(&self, other: &Self) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }

    /// Intersection-over-area, normalized by this box's own area.
    ///
    /// Asymmetric: `self` is the smaller/child element. In [0, 1], never NaN.
    #[must_use]
    pub fn ioa(&self, other: &Self) -> f32 {
        let own = self.area();
        if own <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / own
    }

    /// Smallest box enclosing all boxes in the iterator.
    ///
    /// Returns `None` for an empty iterator. All boxes must share one
    /// coordinate mode; boxes in the other mode are skipped with a warning.
    #[must_use]
    pub fn merge<'a>(boxes: impl IntoIterator<Item = &'a Self>) -> Option<Self> {
        let mut iter = boxes.into_iter();
        let first = *iter.next()?;
        let mut acc = first;
        for b in iter {
            if b.mode != acc.mode {
                log::warn!("merge skipped a {} box among {} boxes", b.mode, acc.mode);
                continue;
            }
            acc.ulx = acc.ulx.min(b.ulx);
            acc.uly = acc.uly.min(b.uly);
            acc.lrx = acc.lrx.max(b.lrx);
            acc.lry = acc.lry.max(b.lry);
        }
        Some(acc)
    }

    /// Translate local sub-image coordinates into the embedding image.
    ///
    /// `origin` is the sub-image's box in the embedding image's coordinates.
    /// Integer translation: `to_global(origin).to_local(origin)` round-trips
    /// exactly.
    #[inline]
    #[must_use]
    pub const fn to_global(&self, origin: &Self) -> Self {
        Self::from_fixed_parts(
            self.mode,
            self.ulx + origin.ulx,
            self.uly + origin.uly,
            self.lrx + origin.ulx,
            self.lry + origin.uly,
        )
    }

    /// Translate embedding-image coordinates into a sub-image's local frame.
    ///
    /// Inverse of [`BoundingBox::to_global`].
    #[inline]
    #[must_use]
    pub const fn to_local(&self, origin: &Self) -> Self {
        Self::from_fixed_parts(
            self.mode,
            self.ulx - origin.ulx,
            self.uly - origin.uly,
            self.lrx - origin.ulx,
            self.lry - origin.uly,
        )
    }

    /// Convert a relative box to absolute pixels for an image of the given size.
    ///
    /// Already-absolute boxes are returned unchanged.
    #[must_use]
    pub fn to_absolute(&self, image_width: f32, image_height: f32) -> Self {
        if self.is_absolute() {
            return *self;
        }
        let w = f64::from(image_width);
        let h = f64::from(image_height);
        Self::from_fixed_parts(
            CoordMode::Absolute,
            (self.ulx as f64 * w).round() as i64,
            (self.uly as f64 * h).round() as i64,
            (self.lrx as f64 * w).round() as i64,
            (self.lry as f64 * h).round() as i64,
        )
    }

    /// Convert an absolute box to coordinates relative to the given image size.
    ///
    /// Already-relative boxes are returned unchanged. Zero image dimensions
    /// produce a zero box rather than NaN.
    #[must_use]
    pub fn to_relative(&self, image_width: f32, image_height: f32) -> Self {
        if !self.is_absolute() {
            return *self;
        }
        if image_width <= 0.0 || image_height <= 0.0 {
            return Self::from_fixed_parts(CoordMode::Relative, 0, 0, 0, 0);
        }
        let w = f64::from(image_width);
        let h = f64::from(image_height);
        Self::from_fixed_parts(
            CoordMode::Relative,
            (self.ulx as f64 / w).round() as i64,
            (self.uly as f64 / h).round() as i64,
            (self.lrx as f64 / w).round() as i64,
            (self.lry as f64 / h).round() as i64,
        )
    }

    /// Pixel bounds for cropping: floor on the upper-left, ceil on the
    /// lower-right, clamped to be non-negative.
    ///
    /// Floor/ceil is applied consistently so a geometric box and its pixel
    /// crop align exactly at the edges.
    #[must_use]
    pub fn pixel_bounds(&self) -> (u32, u32, u32, u32) {
        let scale = COORD_SCALE as i64;
        let floor_px = |v: i64| (v.div_euclid(scale)).max(0) as u32;
        let ceil_px = |v: i64| ((v + scale - 1).div_euclid(scale)).max(0) as u32;
        (
            floor_px(self.ulx),
            floor_px(self.uly),
            ceil_px(self.lrx),
            ceil_px(self.lry),
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.2}, {:.2}, {:.2}, {:.2}] ({})",
            self.ulx(),
            self.uly(),
            self.lrx(),
            self.lry(),
            self.mode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abs(ulx: f32, uly: f32, lrx: f32, lry: f32) -> BoundingBox {
        BoundingBox::new_absolute(ulx, uly, lrx, lry).unwrap()
    }

    #[test]
    fn rejects_inverted_box() {
        assert!(BoundingBox::new_absolute(10.0, 10.0, 5.0, 20.0).is_err());
        assert!(BoundingBox::new_absolute(10.0, 10.0, 20.0, 5.0).is_err());
    }

    #[test]
    fn rejects_non_finite() {
        assert!(BoundingBox::new_absolute(f32::NAN, 0.0, 1.0, 1.0).is_err());
        assert!(BoundingBox::new_absolute(0.0, 0.0, f32::INFINITY, 1.0).is_err());
    }

    #[test]
    fn zero_area_is_valid() {
        let b = abs(5.0, 5.0, 5.0, 10.0);
        assert!(b.is_zero_area());
        assert_eq!(b.area(), 0.0);
    }

    #[test]
    fn iou_identity_and_symmetry() {
        let a = abs(0.0, 0.0, 10.0, 10.0);
        let b = abs(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!((a.iou(&b) - b.iou(&a)).abs() < 1e-6);
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn iou_zero_area_never_nan() {
        let a = abs(5.0, 5.0, 5.0, 5.0);
        let b = abs(5.0, 5.0, 5.0, 5.0);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(a.ioa(&b), 0.0);
    }

    #[test]
    fn ioa_is_asymmetric_for_strict_subset() {
        let child = abs(2.0, 2.0, 8.0, 8.0);
        let parent = abs(0.0, 0.0, 10.0, 10.0);
        assert!((child.ioa(&parent) - 1.0).abs() < 1e-6);
        assert!((parent.ioa(&child) - 0.36).abs() < 1e-6);
    }

    #[test]
    fn disjoint_boxes_do_not_intersect() {
        let a = abs(0.0, 0.0, 10.0, 10.0);
        let b = abs(20.0, 20.0, 30.0, 30.0);
        assert!(a.intersection(&b).is_none());
        assert_eq!(a.intersection_area(&b), 0.0);
    }

    #[test]
    fn touching_edges_give_zero_area_intersection() {
        let a = abs(0.0, 0.0, 10.0, 10.0);
        let b = abs(10.0, 0.0, 20.0, 10.0);
        let inter = a.intersection(&b).unwrap();
        assert!(inter.is_zero_area());
    }

    #[test]
    fn mixed_modes_never_intersect() {
        let a = abs(0.0, 0.0, 10.0, 10.0);
        let r = BoundingBox::new_relative(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(a.intersection(&r).is_none());
        assert_eq!(a.iou(&r), 0.0);
    }

    #[test]
    fn merge_encloses_all() {
        let a = abs(0.0, 0.0, 10.0, 10.0);
        let b = abs(5.0, 5.0, 20.0, 8.0);
        let m = BoundingBox::merge([&a, &b]).unwrap();
        assert_eq!(m.ulx(), 0.0);
        assert_eq!(m.uly(), 0.0);
        assert_eq!(m.lrx(), 20.0);
        assert_eq!(m.lry(), 10.0);
        assert!(BoundingBox::merge(std::iter::empty()).is_none());
    }

    #[test]
    fn local_global_round_trip_is_exact() {
        let origin = abs(100.25, 50.75, 400.0, 300.0);
        let local = abs(3.125, 7.875, 42.5, 99.0);
        let global = local.to_global(&origin);
        assert_eq!(global.to_local(&origin), local);
        // Repeated transforms stay exact (no float drift)
        let mut b = local;
        for _ in 0..1000 {
            b = b.to_global(&origin).to_local(&origin);
        }
        assert_eq!(b, local);
    }

    #[test]
    fn relative_rejects_out_of_range() {
        assert!(BoundingBox::new_relative(-0.1, 0.0, 0.5, 0.5).is_err());
        assert!(BoundingBox::new_relative(0.0, 0.0, 1.2, 0.5).is_err());
    }

    #[test]
    fn pixel_bounds_floor_ceil() {
        let b = abs(1.2, 2.8, 10.1, 20.0);
        assert_eq!(b.pixel_bounds(), (1, 2, 11, 20));
    }

    #[test]
    fn center_of_box() {
        let b = abs(0.0, 0.0, 10.0, 20.0);
        assert_eq!(b.center(), (5.0, 10.0));
    }
}
