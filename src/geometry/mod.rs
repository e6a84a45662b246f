//! Geometry utilities for zone containment
//!
//! ## Responsibilities
//!
//! - Bounding-box arithmetic (area, intersection, IoU)
//! - Transitive bounding-box merging with margin
//! - Point-in-polygon and box-in-polygon tests
//!
//! Everything here is pure; pixel coordinates are in the working resolution.

use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle. Invariant: `x1 <= x2`, `y1 <= y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Grow the box by `margin` pixels on all four sides.
    pub fn expanded(&self, margin: i32) -> Self {
        Self {
            x1: self.x1 - margin,
            y1: self.y1 - margin,
            x2: self.x2 + margin,
            y2: self.y2 + margin,
        }
    }

    /// Strict overlap test: boxes that merely touch at an edge do not overlap.
    pub fn intersects(&self, other: &Self) -> bool {
        if self.x1 >= other.x2 || other.x1 >= self.x2 {
            return false;
        }
        if self.y1 >= other.y2 || other.y1 >= self.y2 {
            return false;
        }
        true
    }

    /// Minimal rectangle enclosing both boxes.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Intersection-over-union, 0.0 when disjoint.
    pub fn iou(&self, other: &Self) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let iw = (ix2 - ix1).max(0) as i64;
        let ih = (iy2 - iy1).max(0) as i64;
        let inter = iw * ih;
        if inter == 0 {
            return 0.0;
        }

        let union = self.area() + other.area() - inter;
        inter as f64 / union as f64
    }
}

/// Ordered polygon vertex list, not necessarily convex.
pub type Polygon = Vec<[i32; 2]>;

/// How a box is judged to overlap the trigger polygon.
///
/// Deployments differ: close-range cameras use the stricter corner-fraction
/// test, long-range ones accept a single diagonal corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ContainmentPolicy {
    /// Fraction of the box's corners inside the polygon must exceed `threshold`.
    CornerFraction { threshold: f32 },
    /// Either diagonal corner (top-left or bottom-right) inside the polygon.
    EitherCorner,
}

impl Default for ContainmentPolicy {
    fn default() -> Self {
        ContainmentPolicy::CornerFraction { threshold: 0.4 }
    }
}

/// Even-odd ray-casting point-in-polygon test.
pub fn point_in_polygon(x: i32, y: i32, polygon: &[[i32; 2]]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let (px, py) = (x as f64, y as f64);
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (polygon[i][0] as f64, polygon[i][1] as f64);
        let (xj, yj) = (polygon[j][0] as f64, polygon[j][1] as f64);

        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Test whether a box overlaps the polygon under the given policy.
pub fn box_in_polygon(bbox: &BoundingBox, polygon: &[[i32; 2]], policy: ContainmentPolicy) -> bool {
    match policy {
        ContainmentPolicy::EitherCorner => {
            point_in_polygon(bbox.x1, bbox.y1, polygon)
                || point_in_polygon(bbox.x2, bbox.y2, polygon)
        }
        ContainmentPolicy::CornerFraction { threshold } => {
            let corners = [
                (bbox.x1, bbox.y1),
                (bbox.x2, bbox.y1),
                (bbox.x2, bbox.y2),
                (bbox.x1, bbox.y2),
            ];
            let inside = corners
                .iter()
                .filter(|(x, y)| point_in_polygon(*x, *y, polygon))
                .count();
            (inside as f32 / corners.len() as f32) > threshold
        }
    }
}

/// Merge all boxes that transitively overlap once grown by `margin`.
///
/// Each pass grows one box, collects every other box its grown bounds
/// intersect, and replaces the whole cluster by the minimal enclosing
/// rectangle of the original corner points. Passes repeat until nothing
/// merges, so the final set does not depend on input order. O(n^2) per pass,
/// fine at frame-rate box counts.
pub fn merge_boxes(mut boxes: Vec<BoundingBox>, margin: i32) -> Vec<BoundingBox> {
    let mut finished = false;
    while !finished {
        finished = true;

        let mut index = 0;
        while index < boxes.len() {
            let grown = boxes[index].expanded(margin);

            let overlaps: Vec<usize> = (0..boxes.len())
                .filter(|&i| i != index && grown.intersects(&boxes[i]))
                .collect();

            if !overlaps.is_empty() {
                let mut merged = boxes[index];
                for &i in &overlaps {
                    merged = merged.union(&boxes[i]);
                }

                let mut cluster: Vec<usize> = overlaps;
                cluster.push(index);
                cluster.sort_unstable_by(|a, b| b.cmp(a));
                for i in cluster {
                    boxes.remove(i);
                }
                boxes.push(merged);

                finished = false;
                break;
            }

            index += 1;
        }
    }
    boxes
}
