use serde::{Deserialize, Serialize};

use crate::error::InvalidDetectionError;

/// Axis-aligned box in pixel coordinates.
///
/// Stored as top-left corner plus size. Conversions cover the corner form
/// `(x1, y1, x2, y2)` used for detections and the `(cx, cy, aspect, h)`
/// form the Kalman filter measures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    #[inline]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box from its corners `(x1, y1)` and `(x2, y2)`.
    #[inline]
    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Box of the given size centred on `(cx, cy)`.
    #[inline]
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    #[inline]
    pub fn from_xyah(cx: f32, cy: f32, aspect_ratio: f32, height: f32) -> Self {
        Self::from_center(cx, cy, aspect_ratio * height, height)
    }

    /// Smallest box containing every point, grown by `padding` on each side.
    /// Returns `None` for an empty point set.
    pub fn enclosing<I>(points: I, padding: f32) -> Option<Self>
    where
        I: IntoIterator<Item = (f32, f32)>,
    {
        let mut points = points.into_iter();
        let (x, y) = points.next()?;
        let (mut x1, mut y1, mut x2, mut y2) = (x, y, x, y);
        for (x, y) in points {
            x1 = x1.min(x);
            y1 = y1.min(y);
            x2 = x2.max(x);
            y2 = y2.max(y);
        }
        Some(Self::from_tlbr(
            x1 - padding,
            y1 - padding,
            x2 + padding,
            y2 + padding,
        ))
    }

    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    #[inline]
    pub fn to_xyah(&self) -> [f32; 4] {
        let (cx, cy) = self.center();
        let aspect_ratio = if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        };
        [cx, cy, aspect_ratio, self.height]
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Checks the box can take part in association.
    pub fn validate(&self) -> Result<(), InvalidDetectionError> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(InvalidDetectionError::NonFinite);
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(InvalidDetectionError::NonPositiveSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Intersection over union, 0.0 for disjoint or degenerate boxes.
    pub fn iou(&self, other: &Rect) -> f32 {
        let [ax1, ay1, ax2, ay2] = self.to_tlbr();
        let [bx1, by1, bx2, by2] = other.to_tlbr();

        let inter_w = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
        let inter_h = (ay2.min(by2) - ay1.max(by1)).max(0.0);
        let inter = inter_w * inter_h;
        let union = self.area() + other.area() - inter;

        if union > 0.0 { inter / union } else { 0.0 }
    }
}
