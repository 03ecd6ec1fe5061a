use image::RgbaImage;

use super::font;
use super::{Color, Rect};

/// Integer pixel bounds, `right`/`bottom` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PixelRect {
    pub(crate) left: i32,
    pub(crate) top: i32,
    pub(crate) right: i32,
    pub(crate) bottom: i32,
}

impl PixelRect {
    pub(crate) fn from_rect(rect: Rect) -> Self {
        Self {
            left: round_to_pixel(rect.x),
            top: round_to_pixel(rect.y),
            right: round_to_pixel(rect.x + rect.width),
            bottom: round_to_pixel(rect.y + rect.height),
        }
    }

    fn width(&self) -> i64 {
        i64::from(self.right) - i64::from(self.left)
    }

    fn height(&self) -> i64 {
        i64::from(self.bottom) - i64::from(self.top)
    }

    fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

pub(crate) fn round_to_pixel(value: f64) -> i32 {
    if value.is_finite() {
        value.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
    } else {
        0
    }
}

const OUT_LEFT: u8 = 1;
const OUT_RIGHT: u8 = 2;
const OUT_TOP: u8 = 4;
const OUT_BOTTOM: u8 = 8;

/// RGBA8 frame view with clipping and alpha blending.
pub(crate) struct Canvas<'a> {
    frame: &'a mut [u8],
    width: u32,
    height: u32,
    opacity: f32,
}

impl<'a> Canvas<'a> {
    pub(crate) fn new(frame: &'a mut [u8], width: u32, height: u32, opacity: f32) -> Self {
        Self {
            frame,
            width,
            height,
            opacity,
        }
    }

    pub(crate) fn clear(&mut self, color: Color) {
        let rgba = color.to_array();
        for pixel in self.frame.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
    }

    pub(crate) fn blend_pixel(&mut self, x: i32, y: i32, rgba: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let Some(dst) = self.frame.get_mut(offset..offset + 4) else {
            return;
        };

        let alpha = (rgba[3] as f32 / 255.0) * self.opacity;
        if alpha <= 0.0 {
            return;
        }
        if alpha >= 1.0 {
            dst.copy_from_slice(&rgba);
            return;
        }
        for channel in 0..3 {
            let src = rgba[channel] as f32;
            let old = dst[channel] as f32;
            dst[channel] = (src * alpha + old * (1.0 - alpha)).round() as u8;
        }
        dst[3] = 255;
    }

    pub(crate) fn fill_rect(&mut self, bounds: PixelRect, color: Color) {
        let rgba = color.to_array();
        let left = bounds.left.max(0);
        let top = bounds.top.max(0);
        let right = bounds.right.min(self.width as i32);
        let bottom = bounds.bottom.min(self.height as i32);
        for y in top..bottom {
            for x in left..right {
                self.blend_pixel(x, y, rgba);
            }
        }
    }

    pub(crate) fn stroke_rect(&mut self, bounds: PixelRect, color: Color) {
        if bounds.is_empty() {
            return;
        }
        let rgba = color.to_array();
        let (right, bottom) = (bounds.right - 1, bounds.bottom - 1);
        let (frame_width, frame_height) = (self.width as i32, self.height as i32);

        let span_left = bounds.left.max(0);
        let span_right = right.min(frame_width - 1);
        for x in span_left..=span_right {
            self.blend_pixel(x, bounds.top, rgba);
            if bottom != bounds.top {
                self.blend_pixel(x, bottom, rgba);
            }
        }

        let span_top = (bounds.top + 1).max(0);
        let span_bottom = bottom.min(frame_height);
        for y in span_top..span_bottom {
            self.blend_pixel(bounds.left, y, rgba);
            if right != bounds.left {
                self.blend_pixel(right, y, rgba);
            }
        }
    }

    /// Bresenham over the part of the segment that lies inside the frame.
    pub(crate) fn line(&mut self, from: (i32, i32), to: (i32, i32), color: Color) {
        let Some((from, to)) = self.clip_segment(from, to) else {
            return;
        };
        let rgba = color.to_array();
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let step_x = if x < to.0 { 1 } else { -1 };
        let step_y = if y < to.1 { 1 } else { -1 };
        let mut error = dx + dy;

        loop {
            self.blend_pixel(x, y, rgba);
            if x == to.0 && y == to.1 {
                break;
            }
            let doubled = 2 * error;
            if doubled >= dy {
                error += dy;
                x += step_x;
            }
            if doubled <= dx {
                error += dx;
                y += step_y;
            }
        }
    }

    /// Cohen-Sutherland against the pixel centers of the frame.
    fn clip_segment(&self, from: (i32, i32), to: (i32, i32)) -> Option<((i32, i32), (i32, i32))> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let max_x = f64::from(self.width - 1);
        let max_y = f64::from(self.height - 1);
        let outcode = |x: f64, y: f64| {
            let mut code = 0u8;
            if x < 0.0 {
                code |= OUT_LEFT;
            } else if x > max_x {
                code |= OUT_RIGHT;
            }
            if y < 0.0 {
                code |= OUT_TOP;
            } else if y > max_y {
                code |= OUT_BOTTOM;
            }
            code
        };

        let (mut x0, mut y0) = (f64::from(from.0), f64::from(from.1));
        let (mut x1, mut y1) = (f64::from(to.0), f64::from(to.1));
        let mut code0 = outcode(x0, y0);
        let mut code1 = outcode(x1, y1);

        // Each pass pins one endpoint to one edge, so a few passes settle it.
        for _ in 0..8 {
            if code0 | code1 == 0 {
                let snap = |value: f64, max: f64| value.round().clamp(0.0, max) as i32;
                return Some((
                    (snap(x0, max_x), snap(y0, max_y)),
                    (snap(x1, max_x), snap(y1, max_y)),
                ));
            }
            if code0 & code1 != 0 {
                return None;
            }

            let outside = if code0 != 0 { code0 } else { code1 };
            let (x, y) = if outside & OUT_TOP != 0 {
                (x0 + (x1 - x0) * (0.0 - y0) / (y1 - y0), 0.0)
            } else if outside & OUT_BOTTOM != 0 {
                (x0 + (x1 - x0) * (max_y - y0) / (y1 - y0), max_y)
            } else if outside & OUT_LEFT != 0 {
                (0.0, y0 + (y1 - y0) * (0.0 - x0) / (x1 - x0))
            } else {
                (max_x, y0 + (y1 - y0) * (max_x - x0) / (x1 - x0))
            };

            if outside == code0 {
                (x0, y0) = (x, y);
                code0 = outcode(x0, y0);
            } else {
                (x1, y1) = (x, y);
                code1 = outcode(x1, y1);
            }
        }
        None
    }

    pub(crate) fn fill_ellipse(&mut self, bounds: PixelRect, color: Color) {
        if bounds.is_empty() {
            return;
        }
        let rgba = color.to_array();
        let rx = bounds.width() as f64 / 2.0;
        let ry = bounds.height() as f64 / 2.0;
        let cx = bounds.left as f64 + rx;
        let cy = bounds.top as f64 + ry;

        for y in bounds.top.max(0)..bounds.bottom.min(self.height as i32) {
            let ny = (y as f64 + 0.5 - cy) / ry;
            let span = 1.0 - ny * ny;
            if span < 0.0 {
                continue;
            }
            let half = rx * span.sqrt();
            let left = ((cx - half).round() as i32).max(bounds.left).max(0);
            let right = ((cx + half).round() as i32)
                .min(bounds.right)
                .min(self.width as i32);
            for x in left..right {
                self.blend_pixel(x, y, rgba);
            }
        }
    }

    pub(crate) fn stroke_ellipse(&mut self, bounds: PixelRect, color: Color) {
        if bounds.is_empty() {
            return;
        }
        let rx = (bounds.width() - 1) as f64 / 2.0;
        let ry = (bounds.height() - 1) as f64 / 2.0;
        let cx = bounds.left as f64 + rx;
        let cy = bounds.top as f64 + ry;
        let segments = ((rx.max(ry) * std::f64::consts::TAU).ceil() as usize).clamp(12, 4096);

        let point_at = |step: usize| {
            let angle = step as f64 / segments as f64 * std::f64::consts::TAU;
            (
                round_to_pixel(cx + rx * angle.cos()),
                round_to_pixel(cy + ry * angle.sin()),
            )
        };
        let mut previous = point_at(0);
        for step in 1..=segments {
            let next = point_at(step);
            if next != previous {
                self.line(previous, next, color);
            }
            previous = next;
        }
    }

    /// Nearest-neighbour scaled copy of `image` into `bounds`.
    pub(crate) fn blit(&mut self, image: &RgbaImage, bounds: PixelRect) {
        if bounds.is_empty() || image.width() == 0 || image.height() == 0 {
            return;
        }
        let draw_left = bounds.left.max(0);
        let draw_top = bounds.top.max(0);
        let draw_right = bounds.right.min(self.width as i32);
        let draw_bottom = bounds.bottom.min(self.height as i32);
        if draw_left >= draw_right || draw_top >= draw_bottom {
            return;
        }

        let x_ratio = image.width() as f64 / bounds.width() as f64;
        let y_ratio = image.height() as f64 / bounds.height() as f64;
        for out_y in draw_top..draw_bottom {
            let offset_y = (i64::from(out_y) - i64::from(bounds.top)) as f64;
            let src_y = ((offset_y * y_ratio) as u32).min(image.height() - 1);
            for out_x in draw_left..draw_right {
                let offset_x = (i64::from(out_x) - i64::from(bounds.left)) as f64;
                let src_x = ((offset_x * x_ratio) as u32).min(image.width() - 1);
                self.blend_pixel(out_x, out_y, image.get_pixel(src_x, src_y).0);
            }
        }
    }

    pub(crate) fn text(&mut self, text: &str, left: i32, top: i32, scale: u32, color: Color) {
        let scale = scale.max(1) as i32;
        font::for_each_lit_cell(text, |x, y| {
            let cell_left = left.saturating_add(x as i32 * scale);
            let cell_top = top.saturating_add(y as i32 * scale);
            self.fill_rect(
                PixelRect {
                    left: cell_left,
                    top: cell_top,
                    right: cell_left.saturating_add(scale),
                    bottom: cell_top.saturating_add(scale),
                },
                color,
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    const W: u32 = 8;
    const H: u32 = 6;

    fn frame() -> Vec<u8> {
        vec![0; (W * H * 4) as usize]
    }

    fn pixel(frame: &[u8], x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * W + x) * 4) as usize;
        [
            frame[offset],
            frame[offset + 1],
            frame[offset + 2],
            frame[offset + 3],
        ]
    }

    fn rect(left: i32, top: i32, right: i32, bottom: i32) -> PixelRect {
        PixelRect {
            left,
            top,
            right,
            bottom,
        }
    }

    #[test]
    fn fill_rect_is_clipped_to_the_frame() {
        let mut buffer = frame();
        Canvas::new(&mut buffer, W, H, 1.0).fill_rect(rect(-3, -3, 2, 2), Color::WHITE);

        assert_eq!(pixel(&buffer, 0, 0), [255, 255, 255, 255]);
        assert_eq!(pixel(&buffer, 1, 1), [255, 255, 255, 255]);
        assert_eq!(pixel(&buffer, 2, 2), [0, 0, 0, 0]);
    }

    #[test]
    fn opacity_blends_with_existing_pixels() {
        let mut buffer = frame();
        let mut canvas = Canvas::new(&mut buffer, W, H, 0.5);
        canvas.clear(Color::BLACK);
        canvas.blend_pixel(3, 3, [200, 100, 0, 255]);

        assert_eq!(pixel(&buffer, 3, 3), [100, 50, 0, 255]);
    }

    #[test]
    fn zero_opacity_draws_nothing() {
        let mut buffer = frame();
        Canvas::new(&mut buffer, W, H, 0.0).fill_rect(rect(0, 0, 8, 6), Color::WHITE);
        assert!(buffer.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn line_covers_both_endpoints() {
        let mut buffer = frame();
        Canvas::new(&mut buffer, W, H, 1.0).line((0, 0), (7, 5), Color::RED);
        assert_eq!(pixel(&buffer, 0, 0), Color::RED.to_array());
        assert_eq!(pixel(&buffer, 7, 5), Color::RED.to_array());
    }

    #[test]
    fn stroke_rect_leaves_the_inside_empty() {
        let mut buffer = frame();
        Canvas::new(&mut buffer, W, H, 1.0).stroke_rect(rect(1, 1, 6, 5), Color::GREEN);
        assert_eq!(pixel(&buffer, 1, 1), Color::GREEN.to_array());
        assert_eq!(pixel(&buffer, 5, 4), Color::GREEN.to_array());
        assert_eq!(pixel(&buffer, 3, 2), [0, 0, 0, 0]);
    }

    #[test]
    fn filled_ellipse_covers_center_not_corners() {
        let mut buffer = frame();
        Canvas::new(&mut buffer, W, H, 1.0).fill_ellipse(rect(0, 0, 6, 6), Color::BLUE);
        assert_eq!(pixel(&buffer, 3, 3), Color::BLUE.to_array());
        assert_eq!(pixel(&buffer, 0, 0), [0, 0, 0, 0]);
        assert_eq!(pixel(&buffer, 5, 5), [0, 0, 0, 0]);
    }

    #[test]
    fn blit_scales_with_nearest_neighbour() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([0, 0, 255, 255]));

        let mut buffer = frame();
        Canvas::new(&mut buffer, W, H, 1.0).blit(&image, rect(0, 0, 4, 2));

        assert_eq!(pixel(&buffer, 1, 1), [255, 0, 0, 255]);
        assert_eq!(pixel(&buffer, 2, 0), [0, 0, 255, 255]);
        assert_eq!(pixel(&buffer, 4, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn transparent_image_pixels_are_skipped() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 0]));
        let mut buffer = frame();
        Canvas::new(&mut buffer, W, H, 1.0).blit(&image, rect(0, 0, 2, 2));
        assert_eq!(pixel(&buffer, 0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn text_plots_scaled_cells() {
        let mut buffer = frame();
        Canvas::new(&mut buffer, W, H, 1.0).text("!", 0, 0, 1, Color::WHITE);
        assert_eq!(pixel(&buffer, 1, 0), Color::WHITE.to_array());
        assert_eq!(pixel(&buffer, 1, 3), [0, 0, 0, 0]);
        assert_eq!(pixel(&buffer, 1, 4), Color::WHITE.to_array());
    }

    #[test]
    fn lines_far_outside_the_frame_are_clipped() {
        let mut buffer = frame();
        let mut canvas = Canvas::new(&mut buffer, W, H, 1.0);
        canvas.line((0, 0), (200_000_000, 0), Color::RED);
        canvas.line((i32::MIN, 3), (i32::MAX, 3), Color::GREEN);
        canvas.line((-10, -10), (-1, -20), Color::BLUE);
        canvas.line((20, 0), (40, 5), Color::BLUE);

        for x in 0..W {
            assert_eq!(pixel(&buffer, x, 0), Color::RED.to_array());
            assert_eq!(pixel(&buffer, x, 3), Color::GREEN.to_array());
            assert_eq!(pixel(&buffer, x, 1), [0, 0, 0, 0]);
        }
        assert!(!buffer
            .chunks_exact(4)
            .any(|rgba| rgba == Color::BLUE.to_array()));
    }

    #[test]
    fn diagonal_line_entering_the_frame_keeps_its_slope() {
        let mut buffer = frame();
        Canvas::new(&mut buffer, W, H, 1.0).line((-2, -2), (10, 10), Color::RED);
        for step in 0..H {
            assert_eq!(pixel(&buffer, step, step), Color::RED.to_array());
        }
        assert_eq!(pixel(&buffer, 1, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn huge_ellipse_fills_only_visible_rows() {
        let mut buffer = frame();
        let bounds = PixelRect::from_rect(Rect::new(-3.0e9, 0.0, 6.0e9, 2.0));
        Canvas::new(&mut buffer, W, H, 1.0).fill_ellipse(bounds, Color::WHITE);

        for x in 0..W {
            assert_eq!(pixel(&buffer, x, 0), Color::WHITE.to_array());
            assert_eq!(pixel(&buffer, x, 1), Color::WHITE.to_array());
            assert_eq!(pixel(&buffer, x, 2), [0, 0, 0, 0]);
        }
    }

    #[test]
    fn huge_outlines_draw_only_visible_edges() {
        let mut buffer = frame();
        let mut canvas = Canvas::new(&mut buffer, W, H, 1.0);
        canvas.stroke_rect(rect(i32::MIN, 1, i32::MAX, 5), Color::GREEN);
        canvas.stroke_ellipse(
            PixelRect::from_rect(Rect::new(-1.0e12, -1.0e12, 2.0e12, 2.0e12)),
            Color::RED,
        );

        for x in 0..W {
            assert_eq!(pixel(&buffer, x, 1), Color::GREEN.to_array());
            assert_eq!(pixel(&buffer, x, 4), Color::GREEN.to_array());
            assert_eq!(pixel(&buffer, x, 2), [0, 0, 0, 0]);
        }
    }

    #[test]
    fn outline_straddling_the_corner_keeps_its_visible_sides() {
        let mut buffer = frame();
        Canvas::new(&mut buffer, W, H, 1.0).stroke_rect(rect(-4, -4, 3, 3), Color::GREEN);
        assert_eq!(pixel(&buffer, 0, 2), Color::GREEN.to_array());
        assert_eq!(pixel(&buffer, 2, 0), Color::GREEN.to_array());
        assert_eq!(pixel(&buffer, 1, 1), [0, 0, 0, 0]);
        assert_eq!(pixel(&buffer, 3, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn pixel_rect_rounds_edges() {
        let bounds = PixelRect::from_rect(Rect::new(0.4, 1.6, 2.2, 2.0));
        assert_eq!(bounds, rect(0, 2, 3, 4));
    }
}
