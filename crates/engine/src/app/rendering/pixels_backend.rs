use std::sync::Arc;

use image::RgbaImage;
use pixels::{Pixels, SurfaceTexture};
use winit::window::Window;

use super::raster::{round_to_pixel, Canvas, PixelRect};
use super::{clamp_opacity, font, Color, Point, Rect, RenderBackend, RenderError};
use crate::app::display::DisplayContext;

/// Software backend: primitives are rasterised into a `pixels` frame buffer
/// sized to the window, and presented at the end of each draw cycle.
pub struct PixelsBackend {
    window: Arc<Window>,
    display: Arc<DisplayContext>,
    pixels: Pixels<'static>,
    size: (u32, u32),
    opacity: f32,
}

impl PixelsBackend {
    pub fn new(window: Arc<Window>, display: Arc<DisplayContext>) -> Result<Self, pixels::Error> {
        let inner = window.inner_size();
        let size = (inner.width.max(1), inner.height.max(1));
        let pixels = Self::build_pixels(Arc::clone(&window), size.0, size.1)?;
        Ok(Self {
            window,
            display,
            pixels,
            size,
            opacity: 1.0,
        })
    }

    fn build_pixels(
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, pixels::Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }

    // The host thread records resizes in the display context; the surface
    // follows at the start of the next frame.
    fn sync_surface_size(&mut self) -> Result<(), RenderError> {
        let size = self.display.current_size();
        if size == self.size || size.0 == 0 || size.1 == 0 {
            return Ok(());
        }
        self.pixels.resize_surface(size.0, size.1)?;
        self.pixels.resize_buffer(size.0, size.1)?;
        self.size = size;
        Ok(())
    }

    fn canvas(&mut self) -> Canvas<'_> {
        let (width, height) = self.size;
        Canvas::new(self.pixels.frame_mut(), width, height, self.opacity)
    }
}

impl RenderBackend for PixelsBackend {
    fn start_draw_cycle(&mut self, clear: Color) -> Result<(), RenderError> {
        self.sync_surface_size()?;
        self.canvas().clear(clear);
        Ok(())
    }

    fn end_draw_cycle(&mut self) -> Result<(), RenderError> {
        self.window.pre_present_notify();
        self.pixels.render()?;
        Ok(())
    }

    fn draw_line(&mut self, from: Point, to: Point, color: Color) {
        let from = (round_to_pixel(from.x), round_to_pixel(from.y));
        let to = (round_to_pixel(to.x), round_to_pixel(to.y));
        self.canvas().line(from, to, color);
    }

    fn draw_rect(&mut self, rect: Rect, color: Color) {
        self.canvas().stroke_rect(PixelRect::from_rect(rect), color);
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.canvas().fill_rect(PixelRect::from_rect(rect), color);
    }

    fn draw_oval(&mut self, bounds: Rect, color: Color) {
        self.canvas().stroke_ellipse(PixelRect::from_rect(bounds), color);
    }

    fn fill_oval(&mut self, bounds: Rect, color: Color) {
        self.canvas().fill_ellipse(PixelRect::from_rect(bounds), color);
    }

    fn draw_text(&mut self, text: &str, origin: Point, size: f64, color: Color) {
        let scale = font::glyph_scale(size);
        self.canvas().text(
            text,
            round_to_pixel(origin.x),
            round_to_pixel(origin.y),
            scale,
            color,
        );
    }

    fn text_width(&self, text: &str, size: f64) -> f64 {
        font::text_width(text, font::glyph_scale(size)) as f64
    }

    fn draw_image(&mut self, image: &RgbaImage, bounds: Rect) {
        self.canvas().blit(image, PixelRect::from_rect(bounds));
    }

    fn set_opacity(&mut self, alpha: f32) {
        self.opacity = clamp_opacity(alpha);
    }

    fn opacity(&self) -> f32 {
        self.opacity
    }
}
