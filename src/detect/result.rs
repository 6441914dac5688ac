use std::cmp::Ordering;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in raster pixel space (origin top-left, rows grow downward).
///
/// `(x1, y1)` is one diagonal corner and `(x2, y2)` the opposite one, with
/// `x1 < x2` and `y1 < y2`. Serialized as `[x1, y1, x2, y2]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct PixelBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl PixelBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self> {
        if !(x1.is_finite() && y1.is_finite() && x2.is_finite() && y2.is_finite()) {
            return Err(anyhow!("box [{x1}, {y1}, {x2}, {y2}] has non-finite corners"));
        }
        if x2 <= x1 || y2 <= y1 {
            return Err(anyhow!(
                "box [{x1}, {y1}, {x2}, {y2}] must satisfy x1 < x2 and y1 < y2"
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &PixelBox) -> f64 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

impl TryFrom<[f64; 4]> for PixelBox {
    type Error = anyhow::Error;

    fn try_from([x1, y1, x2, y2]: [f64; 4]) -> Result<Self> {
        Self::new(x1, y1, x2, y2)
    }
}

impl From<PixelBox> for [f64; 4] {
    fn from(b: PixelBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// One raw detector output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: PixelBox,
    pub class_id: u32,
    /// 0..=1
    pub confidence: f32,
}

/// Greedy per-class non-maximum suppression.
///
/// Keeps the highest-confidence box of every overlapping group (IoU above
/// `iou_threshold`, same class), returning at most `max_detections` in
/// descending confidence order.
pub fn non_max_suppression(
    mut candidates: Vec<Detection>,
    iou_threshold: f64,
    max_detections: usize,
) -> Vec<Detection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for cand in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && k.bbox.iou(&cand.bbox) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}
