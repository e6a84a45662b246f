//! ZoneDetector - Frame-Diff Intrusion Decision
//!
//! ## Responsibilities
//!
//! - Frame differencing between a baseline and the current frame
//! - Noise suppression (median blur, threshold, dilate, area floor)
//! - Candidate box extraction and merging, seeded by an optional external
//!   object detector
//! - Trigger-polygon containment decision and frame annotation
//!
//! The detector is pure given its inputs: it performs no I/O and never
//! blocks. All output coordinates are in the working resolution.

pub mod draw;

use image::{imageops, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::geometry::{self, BoundingBox, ContainmentPolicy, Polygon};

/// Tunables for the frame-diff pipeline.
///
/// The area floor is the primary false-positive suppressor for sensor noise
/// and lighting flicker; raise it for close-range cameras.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Working resolution; frames are resized here before comparison.
    pub working_width: u32,
    pub working_height: u32,
    /// Binarization threshold applied to the blurred diff.
    pub diff_threshold: u8,
    /// Median blur kernel (odd).
    pub median_kernel: u32,
    /// Binary dilation passes closing gaps in the mask.
    pub dilate_iterations: u32,
    /// Minimum component pixel area to survive the noise floor.
    pub min_contour_area: u64,
    /// Margin for transitive box merging.
    pub merge_margin: i32,
    /// Containment policy for the trigger polygon.
    pub containment: ContainmentPolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            working_width: 1280,
            working_height: 720,
            diff_threshold: 25,
            median_kernel: 15,
            dilate_iterations: 3,
            min_contour_area: 50,
            merge_margin: 30,
            containment: ContainmentPolicy::default(),
        }
    }
}

/// Per-frame decision output.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// True when any merged box overlaps the trigger polygon.
    pub inside_zone: bool,
    /// Merged candidate boxes in working-resolution pixels.
    pub merged_boxes: Vec<BoundingBox>,
    /// Current frame with boxes drawn in.
    pub annotated: RgbImage,
}

/// Pluggable external object detector seeding the candidate list.
///
/// Implementations are expected to pre-filter by class and confidence; the
/// zone detector treats every returned box as a candidate.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Vec<BoundingBox>;
}

/// Disabled detector used when no model is configured.
pub struct NullObjectDetector;

impl ObjectDetector for NullObjectDetector {
    fn detect(&self, _frame: &RgbImage) -> Vec<BoundingBox> {
        Vec::new()
    }
}

/// ZoneDetector instance, one per camera.
pub struct ZoneDetector {
    config: DetectorConfig,
    trigger_zone: Polygon,
}

impl ZoneDetector {
    pub fn new(config: DetectorConfig, trigger_zone: Polygon) -> Self {
        Self {
            config,
            trigger_zone,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Compare baseline and current frame, decide zone intrusion.
    pub fn detect(
        &self,
        baseline: &RgbImage,
        current: &RgbImage,
        external_boxes: &[BoundingBox],
    ) -> DetectionResult {
        let baseline = self.to_working(baseline);
        let current = self.to_working(current);
        let mut annotated = current.clone();

        let diff = abs_diff_luma(&baseline, &current);
        let blurred = median_blur(&diff, self.config.median_kernel);
        let mask = binarize(blurred, self.config.diff_threshold);
        let mask = dilate(&mask, self.config.dilate_iterations);

        let mut candidates = connected_component_boxes(&mask, self.config.min_contour_area);
        candidates.extend_from_slice(external_boxes);

        let merged_boxes = geometry::merge_boxes(candidates, self.config.merge_margin);

        let mut inside_zone = false;
        for bbox in &merged_boxes {
            if geometry::box_in_polygon(bbox, &self.trigger_zone, self.config.containment) {
                inside_zone = true;
            }
            draw::draw_box(&mut annotated, bbox, draw::BOX_COLOR);
            draw::draw_text(
                &mut annotated,
                bbox.x1,
                bbox.y1 - 10,
                "UNDEFINED OBJECT",
                draw::BOX_COLOR,
                1,
            );
        }

        DetectionResult {
            inside_zone,
            merged_boxes,
            annotated,
        }
    }

    fn to_working(&self, frame: &RgbImage) -> RgbImage {
        if frame.width() == self.config.working_width
            && frame.height() == self.config.working_height
        {
            frame.clone()
        } else {
            imageops::resize(
                frame,
                self.config.working_width,
                self.config.working_height,
                imageops::FilterType::Triangle,
            )
        }
    }
}

/// Draw the status banner and display-zone overlay onto a frame.
///
/// Danger keeps the red overlay even during the hysteresis window so the
/// preview stream reflects the alarm state, not the raw per-frame decision.
pub fn annotate_status(frame: &mut RgbImage, danger: bool, display_zone: &[[i32; 2]]) {
    if danger {
        draw::draw_zone_overlay(frame, display_zone, draw::ZONE_ALARM_FILL);
        draw::draw_text(frame, 50, 50, "DANGER: OBJECT IN FENCE", draw::DANGER_TEXT, 3);
    } else {
        draw::draw_zone_overlay(frame, display_zone, draw::ZONE_SAFE_FILL);
        draw::draw_text(frame, 50, 50, "SAFE", draw::SAFE_TEXT, 3);
    }
}

/// Absolute per-channel difference collapsed to luma.
fn abs_diff_luma(a: &RgbImage, b: &RgbImage) -> GrayImage {
    let (w, h) = (a.width(), a.height());
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let pa = a.get_pixel(x, y).0;
            let pb = b.get_pixel(x, y).0;
            let dr = pa[0].abs_diff(pb[0]) as f32;
            let dg = pa[1].abs_diff(pb[1]) as f32;
            let db = pa[2].abs_diff(pb[2]) as f32;
            let luma = 0.299 * dr + 0.587 * dg + 0.114 * db;
            out.put_pixel(x, y, image::Luma([luma.round() as u8]));
        }
    }
    out
}

/// Median blur with a square kernel, moving-histogram sweep per row.
///
/// Border windows shrink to the in-bounds pixels instead of mirroring.
fn median_blur(src: &GrayImage, kernel: u32) -> GrayImage {
    let kernel = kernel.max(1) | 1; // force odd
    let r = (kernel / 2) as i32;
    let (w, h) = (src.width() as i32, src.height() as i32);
    let mut out = GrayImage::new(src.width(), src.height());

    let column = |hist: &mut [u32; 256], count: &mut u32, x: i32, y: i32, add: bool| {
        if x < 0 || x >= w {
            return;
        }
        for wy in (y - r).max(0)..=(y + r).min(h - 1) {
            let v = src.get_pixel(x as u32, wy as u32).0[0] as usize;
            if add {
                hist[v] += 1;
                *count += 1;
            } else {
                hist[v] -= 1;
                *count -= 1;
            }
        }
    };

    for y in 0..h {
        let mut hist = [0u32; 256];
        let mut count = 0u32;
        for wx in -r..=r {
            column(&mut hist, &mut count, wx, y, true);
        }

        for x in 0..w {
            if x > 0 {
                column(&mut hist, &mut count, x - 1 - r, y, false);
                column(&mut hist, &mut count, x + r, y, true);
            }

            // Lower median: first bin reaching half the window population.
            let target = count / 2 + 1;
            let mut seen = 0u32;
            let mut median = 0u8;
            for (v, n) in hist.iter().enumerate() {
                seen += n;
                if seen >= target {
                    median = v as u8;
                    break;
                }
            }
            out.put_pixel(x as u32, y as u32, image::Luma([median]));
        }
    }
    out
}

/// Fixed-threshold binarization, in place.
fn binarize(mut img: GrayImage, threshold: u8) -> GrayImage {
    for px in img.pixels_mut() {
        px.0[0] = if px.0[0] > threshold { 255 } else { 0 };
    }
    img
}

/// Binary 3x3 dilation, `iterations` passes.
fn dilate(src: &GrayImage, iterations: u32) -> GrayImage {
    let (w, h) = (src.width() as i32, src.height() as i32);
    let mut cur = src.clone();
    for _ in 0..iterations {
        let mut next = cur.clone();
        for y in 0..h {
            for x in 0..w {
                if cur.get_pixel(x as u32, y as u32).0[0] != 0 {
                    continue;
                }
                'probe: for dy in -1..=1 {
                    for dx in -1..=1 {
                        let (nx, ny) = (x + dx, y + dy);
                        if nx >= 0
                            && ny >= 0
                            && nx < w
                            && ny < h
                            && cur.get_pixel(nx as u32, ny as u32).0[0] != 0
                        {
                            next.put_pixel(x as u32, y as u32, image::Luma([255]));
                            break 'probe;
                        }
                    }
                }
            }
        }
        cur = next;
    }
    cur
}

/// Bounding boxes of 8-connected foreground components above the area floor.
fn connected_component_boxes(mask: &GrayImage, min_area: u64) -> Vec<BoundingBox> {
    let (w, h) = (mask.width() as i32, mask.height() as i32);
    let mut visited = vec![false; (w * h) as usize];
    let mut boxes = Vec::new();
    let mut stack: Vec<(i32, i32)> = Vec::new();

    for sy in 0..h {
        for sx in 0..w {
            let idx = (sy * w + sx) as usize;
            if visited[idx] || mask.get_pixel(sx as u32, sy as u32).0[0] == 0 {
                continue;
            }

            let (mut min_x, mut min_y, mut max_x, mut max_y) = (sx, sy, sx, sy);
            let mut area = 0u64;
            visited[idx] = true;
            stack.push((sx, sy));

            while let Some((x, y)) = stack.pop() {
                area += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);

                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let (nx, ny) = (x + dx, y + dy);
                        if nx < 0 || ny < 0 || nx >= w || ny >= h {
                            continue;
                        }
                        let nidx = (ny * w + nx) as usize;
                        if !visited[nidx] && mask.get_pixel(nx as u32, ny as u32).0[0] != 0 {
                            visited[nidx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            if area >= min_area {
                boxes.push(BoundingBox::new(min_x, min_y, max_x, max_y));
            }
        }
    }
    boxes
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn blank(w: u32, h: u32) -> RgbImage {
        RgbImage::new(w, h)
    }

    fn with_rect(w: u32, h: u32, x0: u32, y0: u32, rw: u32, rh: u32) -> RgbImage {
        let mut img = RgbImage::new(w, h);
        for y in y0..(y0 + rh).min(h) {
            for x in x0..(x0 + rw).min(w) {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        img
    }

    fn small_config() -> DetectorConfig {
        DetectorConfig {
            working_width: 128,
            working_height: 96,
            median_kernel: 5,
            min_contour_area: 50,
            ..DetectorConfig::default()
        }
    }

    #[test]
    fn test_median_blur_removes_salt_noise() {
        let mut img = GrayImage::new(32, 32);
        img.put_pixel(16, 16, Luma([255]));
        let blurred = median_blur(&img, 5);
        assert_eq!(blurred.get_pixel(16, 16).0[0], 0);
    }

    #[test]
    fn test_median_blur_preserves_solid_regions() {
        let mut img = GrayImage::new(32, 32);
        for y in 4..28 {
            for x in 4..28 {
                img.put_pixel(x, y, Luma([200]));
            }
        }
        let blurred = median_blur(&img, 5);
        assert_eq!(blurred.get_pixel(16, 16).0[0], 200);
    }

    #[test]
    fn test_dilate_grows_component() {
        let mut img = GrayImage::new(16, 16);
        img.put_pixel(8, 8, Luma([255]));
        let grown = dilate(&img, 2);
        assert_eq!(grown.get_pixel(6, 8).0[0], 255);
        assert_eq!(grown.get_pixel(8, 6).0[0], 255);
        assert_eq!(grown.get_pixel(3, 8).0[0], 0);
    }

    #[test]
    fn test_connected_components_area_floor() {
        let mut img = GrayImage::new(64, 64);
        // Large blob: 10x10 = 100 px.
        for y in 5..15 {
            for x in 5..15 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        // Speck: 2x2 = 4 px, below the floor.
        for y in 40..42 {
            for x in 40..42 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let boxes = connected_component_boxes(&img, 50);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0], BoundingBox::new(5, 5, 14, 14));
    }

    #[test]
    fn test_detect_flags_intrusion_inside_polygon() {
        let config = small_config();
        // Trigger zone covers the whole working frame.
        let zone = vec![[0, 0], [127, 0], [127, 95], [0, 95]];
        let detector = ZoneDetector::new(config, zone);

        let baseline = blank(128, 96);
        let current = with_rect(128, 96, 40, 30, 40, 40);
        let result = detector.detect(&baseline, &current, &[]);

        assert!(result.inside_zone);
        assert_eq!(result.merged_boxes.len(), 1);
        let expected = BoundingBox::new(40, 30, 79, 69);
        assert!(result.merged_boxes[0].iou(&expected) > 0.5);
    }

    #[test]
    fn test_detect_ignores_motion_outside_polygon() {
        let config = small_config();
        // Trigger zone confined to the left edge, motion on the right.
        let zone = vec![[0, 0], [20, 0], [20, 95], [0, 95]];
        let detector = ZoneDetector::new(config, zone);

        let baseline = blank(128, 96);
        let current = with_rect(128, 96, 80, 30, 30, 30);
        let result = detector.detect(&baseline, &current, &[]);

        assert!(!result.inside_zone);
        assert!(!result.merged_boxes.is_empty());
    }

    #[test]
    fn test_detect_identical_frames_are_quiet() {
        let config = small_config();
        let zone = vec![[0, 0], [127, 0], [127, 95], [0, 95]];
        let detector = ZoneDetector::new(config, zone);

        let frame = with_rect(128, 96, 10, 10, 50, 50);
        let result = detector.detect(&frame, &frame, &[]);

        assert!(!result.inside_zone);
        assert!(result.merged_boxes.is_empty());
    }

    #[test]
    fn test_external_boxes_seed_candidates() {
        let config = small_config();
        let zone = vec![[0, 0], [127, 0], [127, 95], [0, 95]];
        let detector = ZoneDetector::new(config, zone);

        let baseline = blank(128, 96);
        let current = blank(128, 96);
        let seeded = [BoundingBox::new(10, 10, 60, 60)];
        let result = detector.detect(&baseline, &current, &seeded);

        assert!(result.inside_zone);
        assert_eq!(result.merged_boxes, vec![seeded[0]]);
    }

    #[test]
    fn test_null_object_detector_returns_nothing() {
        let det = NullObjectDetector;
        assert!(det.detect(&blank(8, 8)).is_empty());
    }
}
