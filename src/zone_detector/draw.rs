//! Frame annotation primitives
//!
//! Box outlines, translucent polygon fills and the status banner are drawn
//! directly into the RGB buffer; annotated frames are evidence artifacts, so
//! no display stack is involved.

use image::{Rgb, RgbImage};

use crate::geometry::BoundingBox;

/// Fill color for the display zone while in alarm.
pub const ZONE_ALARM_FILL: Rgb<u8> = Rgb([231, 76, 60]);
/// Fill color for the display zone while safe.
pub const ZONE_SAFE_FILL: Rgb<u8> = Rgb([243, 156, 18]);
/// Zone border color.
pub const ZONE_OUTLINE: Rgb<u8> = Rgb([52, 73, 94]);
/// Banner text while an object is inside the fence.
pub const DANGER_TEXT: Rgb<u8> = Rgb([255, 0, 0]);
/// Banner text while clear.
pub const SAFE_TEXT: Rgb<u8> = Rgb([0, 255, 0]);
/// Outline for motion boxes.
pub const BOX_COLOR: Rgb<u8> = Rgb([0, 200, 255]);

/// Zone overlay opacity.
const ZONE_ALPHA: f32 = 0.3;

fn put_pixel_checked(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn blend_pixel_checked(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>, alpha: f32) {
    if x < 0 || y < 0 || x as u32 >= img.width() || y as u32 >= img.height() {
        return;
    }
    let px = img.get_pixel_mut(x as u32, y as u32);
    for c in 0..3 {
        let base = px.0[c] as f32;
        let over = color.0[c] as f32;
        px.0[c] = (base * (1.0 - alpha) + over * alpha).round() as u8;
    }
}

/// Bresenham line.
pub fn draw_line(img: &mut RgbImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);

    loop {
        put_pixel_checked(img, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Rectangle outline, clamped to the frame.
pub fn draw_box(img: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    for x in bbox.x1..=bbox.x2 {
        put_pixel_checked(img, x, bbox.y1, color);
        put_pixel_checked(img, x, bbox.y2, color);
    }
    for y in bbox.y1..=bbox.y2 {
        put_pixel_checked(img, bbox.x1, y, color);
        put_pixel_checked(img, bbox.x2, y, color);
    }
}

/// Translucent polygon fill with a solid border, scanline even-odd rule.
pub fn draw_zone_overlay(img: &mut RgbImage, polygon: &[[i32; 2]], fill: Rgb<u8>) {
    let n = polygon.len();
    if n < 3 {
        return;
    }

    let y_min = polygon.iter().map(|p| p[1]).min().unwrap_or(0).max(0);
    let y_max = polygon
        .iter()
        .map(|p| p[1])
        .max()
        .unwrap_or(0)
        .min(img.height() as i32 - 1);

    for y in y_min..=y_max {
        // Sample the scanline at pixel center to dodge vertex degeneracies.
        let yc = y as f64 + 0.5;
        let mut crossings: Vec<f64> = Vec::new();
        for i in 0..n {
            let (x0, y0) = (polygon[i][0] as f64, polygon[i][1] as f64);
            let j = (i + 1) % n;
            let (x1, y1) = (polygon[j][0] as f64, polygon[j][1] as f64);
            if (y0 <= yc && y1 > yc) || (y1 <= yc && y0 > yc) {
                crossings.push(x0 + (yc - y0) / (y1 - y0) * (x1 - x0));
            }
        }
        crossings.sort_by(|a, b| a.partial_cmp(b).unwrap());

        for pair in crossings.chunks_exact(2) {
            let xs = pair[0].ceil() as i32;
            let xe = pair[1].floor() as i32;
            for x in xs..=xe {
                blend_pixel_checked(img, x, y, fill, ZONE_ALPHA);
            }
        }
    }

    for i in 0..n {
        let j = (i + 1) % n;
        draw_line(
            img,
            polygon[i][0],
            polygon[i][1],
            polygon[j][0],
            polygon[j][1],
            ZONE_OUTLINE,
        );
    }
}

/// 5x7 bitmap glyphs, one u8 row per scanline, low 5 bits used.
fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x1B, 0x11],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        _ => [0x00; 7],
    }
}

/// Draw `text` with the bitmap font at `scale` pixels per font dot.
pub fn draw_text(img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>, scale: i32) {
    let scale = scale.max(1);
    let mut cursor = x;
    for c in text.chars() {
        let rows = glyph(c);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..5 {
                if bits & (0x10 >> col) != 0 {
                    for dy in 0..scale {
                        for dx in 0..scale {
                            put_pixel_checked(
                                img,
                                cursor + col as i32 * scale + dx,
                                y + row as i32 * scale + dy,
                                color,
                            );
                        }
                    }
                }
            }
        }
        cursor += 6 * scale; // 5 dots + 1 dot spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_box_stays_in_bounds() {
        let mut img = RgbImage::new(20, 20);
        // Partially outside the frame, must not panic.
        draw_box(&mut img, &BoundingBox::new(-5, -5, 25, 25), BOX_COLOR);
        draw_box(&mut img, &BoundingBox::new(2, 2, 8, 8), BOX_COLOR);
        assert_eq!(*img.get_pixel(2, 2), BOX_COLOR);
        assert_eq!(*img.get_pixel(8, 5), BOX_COLOR);
    }

    #[test]
    fn test_zone_overlay_blends_interior() {
        let mut img = RgbImage::new(40, 40);
        draw_zone_overlay(&mut img, &[[5, 5], [35, 5], [35, 35], [5, 35]], ZONE_ALARM_FILL);
        // Interior pixel blended toward the fill, exterior untouched.
        assert_ne!(*img.get_pixel(20, 20), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(1, 1), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_text_marks_pixels() {
        let mut img = RgbImage::new(60, 20);
        draw_text(&mut img, 1, 1, "SAFE", SAFE_TEXT, 2);
        let lit = img.pixels().filter(|p| **p == SAFE_TEXT).count();
        assert!(lit > 0);
    }

    #[test]
    fn test_degenerate_polygon_is_ignored() {
        let mut img = RgbImage::new(10, 10);
        draw_zone_overlay(&mut img, &[[1, 1], [8, 8]], ZONE_SAFE_FILL);
        assert!(img.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
