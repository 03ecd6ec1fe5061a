mod draw;
mod font;
mod image_io;
mod pixels_backend;
mod raster;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use draw::Draw;
pub use image_io::{load_image, ImageLoadError};
pub use pixels_backend::PixelsBackend;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn centered(center: Point, width: f64, height: f64) -> Self {
        Self::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    fn scaled(&self, factor: f64) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub a: u8,
}

fn opaque() -> u8 {
    255
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(220, 60, 60);
    pub const GREEN: Color = Color::rgb(80, 200, 110);
    pub const BLUE: Color = Color::rgb(70, 120, 230);
    pub const YELLOW: Color = Color::rgb(240, 210, 80);
    pub const GRAY: Color = Color::rgb(128, 128, 128);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render surface error: {0}")]
    Surface(String),
    #[error("render failed: {0}")]
    Object(String),
    #[error("render pass panicked: {0}")]
    Panic(String),
}

impl From<pixels::Error> for RenderError {
    fn from(error: pixels::Error) -> Self {
        RenderError::Surface(error.to_string())
    }
}

impl From<pixels::TextureError> for RenderError {
    fn from(error: pixels::TextureError) -> Self {
        RenderError::Surface(error.to_string())
    }
}

/// Drawing surface driven by the render clock.
///
/// Coordinates reaching a backend are already in window pixels; scaling from
/// base resolution happens in [`Draw`].
pub trait RenderBackend: Send {
    fn start_draw_cycle(&mut self, clear: Color) -> Result<(), RenderError>;
    fn end_draw_cycle(&mut self) -> Result<(), RenderError>;

    fn draw_line(&mut self, from: Point, to: Point, color: Color);
    fn draw_rect(&mut self, rect: Rect, color: Color);
    fn fill_rect(&mut self, rect: Rect, color: Color);
    fn draw_oval(&mut self, bounds: Rect, color: Color);
    fn fill_oval(&mut self, bounds: Rect, color: Color);
    /// `origin` is the top-left corner of the text and `size` its cap height.
    fn draw_text(&mut self, text: &str, origin: Point, size: f64, color: Color);
    fn text_width(&self, text: &str, size: f64) -> f64;
    fn draw_image(&mut self, image: &RgbaImage, bounds: Rect);

    /// Global opacity applied to every following primitive, clamped to `[0, 1]`.
    fn set_opacity(&mut self, alpha: f32);
    fn opacity(&self) -> f32;
}

/// Backend that draws nothing and counts what it was asked to do.
#[derive(Debug, Clone)]
pub struct NullBackend {
    pub frames_started: u64,
    pub frames_finished: u64,
    pub primitives: u64,
    pub last_clear: Option<Color>,
    opacity: f32,
}

impl Default for NullBackend {
    fn default() -> Self {
        Self {
            frames_started: 0,
            frames_finished: 0,
            primitives: 0,
            last_clear: None,
            opacity: 1.0,
        }
    }
}

impl RenderBackend for NullBackend {
    fn start_draw_cycle(&mut self, clear: Color) -> Result<(), RenderError> {
        self.frames_started += 1;
        self.last_clear = Some(clear);
        Ok(())
    }

    fn end_draw_cycle(&mut self) -> Result<(), RenderError> {
        self.frames_finished += 1;
        Ok(())
    }

    fn draw_line(&mut self, _from: Point, _to: Point, _color: Color) {
        self.primitives += 1;
    }

    fn draw_rect(&mut self, _rect: Rect, _color: Color) {
        self.primitives += 1;
    }

    fn fill_rect(&mut self, _rect: Rect, _color: Color) {
        self.primitives += 1;
    }

    fn draw_oval(&mut self, _bounds: Rect, _color: Color) {
        self.primitives += 1;
    }

    fn fill_oval(&mut self, _bounds: Rect, _color: Color) {
        self.primitives += 1;
    }

    fn draw_text(&mut self, _text: &str, _origin: Point, _size: f64, _color: Color) {
        self.primitives += 1;
    }

    fn text_width(&self, text: &str, size: f64) -> f64 {
        font::text_width(text, font::glyph_scale(size)) as f64
    }

    fn draw_image(&mut self, _image: &RgbaImage, _bounds: Rect) {
        self.primitives += 1;
    }

    fn set_opacity(&mut self, alpha: f32) {
        self.opacity = clamp_opacity(alpha);
    }

    fn opacity(&self) -> f32 {
        self.opacity
    }
}

pub(crate) fn clamp_opacity(alpha: f32) -> f32 {
    if alpha.is_nan() {
        1.0
    } else {
        alpha.clamp(0.0, 1.0)
    }
}
