use image::RgbaImage;

use super::{clamp_opacity, Color, Point, Rect, RenderBackend};

/// Per-frame drawing handle passed to render hooks.
///
/// Hooks draw in base-resolution units; every coordinate and size is
/// multiplied by the display scale factor before it reaches the backend.
pub struct Draw<'a> {
    backend: &'a mut dyn RenderBackend,
    scale: f64,
}

impl<'a> Draw<'a> {
    pub fn new(backend: &'a mut dyn RenderBackend, scale: f64) -> Self {
        let scale = if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            1.0
        };
        Self { backend, scale }
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale
    }

    fn point(&self, point: Point) -> Point {
        Point::new(point.x * self.scale, point.y * self.scale)
    }

    pub fn line(&mut self, from: Point, to: Point, color: Color) {
        let (from, to) = (self.point(from), self.point(to));
        self.backend.draw_line(from, to, color);
    }

    pub fn rect(&mut self, rect: Rect, color: Color) {
        self.backend.draw_rect(rect.scaled(self.scale), color);
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.backend.fill_rect(rect.scaled(self.scale), color);
    }

    pub fn oval(&mut self, bounds: Rect, color: Color) {
        self.backend.draw_oval(bounds.scaled(self.scale), color);
    }

    pub fn fill_oval(&mut self, bounds: Rect, color: Color) {
        self.backend.fill_oval(bounds.scaled(self.scale), color);
    }

    pub fn circle(&mut self, center: Point, radius: f64, color: Color) {
        self.oval(Rect::centered(center, radius * 2.0, radius * 2.0), color);
    }

    pub fn fill_circle(&mut self, center: Point, radius: f64, color: Color) {
        self.fill_oval(Rect::centered(center, radius * 2.0, radius * 2.0), color);
    }

    pub fn text(&mut self, text: &str, origin: Point, size: f64, color: Color) {
        let origin = self.point(origin);
        self.backend.draw_text(text, origin, size * self.scale, color);
    }

    /// Width of `text` in base-resolution units.
    pub fn text_width(&self, text: &str, size: f64) -> f64 {
        self.backend.text_width(text, size * self.scale) / self.scale
    }

    pub fn centered_text(&mut self, text: &str, center_x: f64, top: f64, size: f64, color: Color) {
        let width = self.text_width(text, size);
        self.text(text, Point::new(center_x - width / 2.0, top), size, color);
    }

    pub fn image(&mut self, image: &RgbaImage, bounds: Rect) {
        self.backend.draw_image(image, bounds.scaled(self.scale));
    }

    /// Draws `image` at its natural size with its top-left corner at `origin`.
    pub fn image_at(&mut self, image: &RgbaImage, origin: Point) {
        let bounds = Rect::new(
            origin.x,
            origin.y,
            image.width() as f64,
            image.height() as f64,
        );
        self.image(image, bounds);
    }

    pub fn set_opacity(&mut self, alpha: f32) {
        self.backend.set_opacity(clamp_opacity(alpha));
    }

    pub fn opacity(&self) -> f32 {
        self.backend.opacity()
    }

    /// Runs `draw` with `alpha` applied, then restores the previous opacity.
    pub fn with_opacity(&mut self, alpha: f32, draw: impl FnOnce(&mut Draw<'a>)) {
        let previous = self.opacity();
        self.set_opacity(alpha);
        draw(self);
        self.set_opacity(previous);
    }
}
