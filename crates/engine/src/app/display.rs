use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::lock::lock_or_recover;

/// Refresh rate assumed when the monitor does not report one.
pub const FALLBACK_REFRESH_HZ: f64 = 60.0;

/// How often the render clock produces a frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderRate {
    /// Follow the current monitor's refresh rate.
    #[default]
    Monitor,
    /// A fixed rate in frames per second.
    Fixed(f64),
    /// No pacing: one frame per render loop iteration.
    Unlimited,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DisplayError {
    #[error("no monitor at index {index} ({available} available)")]
    NoSuchMonitor { index: usize, available: usize },
    #[error("invalid window size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("invalid window icon: {0}")]
    InvalidIcon(String),
}

/// Display state shared by the host, the render clock and input sampling.
///
/// Holds the base resolution the game is authored against and the current
/// window size; their ratio is the scale factor applied to drawing and to
/// cursor positions.
#[derive(Debug)]
pub struct DisplayContext {
    base_width: u32,
    base_height: u32,
    current_width: AtomicU32,
    current_height: AtomicU32,
    fullscreen: AtomicBool,
    show_render_errors: AtomicBool,
    monitor_refresh_hz: Mutex<Option<f64>>,
    render_rate: Mutex<RenderRate>,
}

impl DisplayContext {
    pub fn new(base_width: u32, base_height: u32, monitor_refresh_hz: Option<f64>) -> Self {
        let base_width = base_width.max(1);
        let base_height = base_height.max(1);
        Self {
            base_width,
            base_height,
            current_width: AtomicU32::new(base_width),
            current_height: AtomicU32::new(base_height),
            fullscreen: AtomicBool::new(false),
            show_render_errors: AtomicBool::new(false),
            monitor_refresh_hz: Mutex::new(monitor_refresh_hz.filter(|hz| *hz > 0.0)),
            render_rate: Mutex::new(RenderRate::Monitor),
        }
    }

    pub fn base_size(&self) -> (u32, u32) {
        (self.base_width, self.base_height)
    }

    pub fn current_size(&self) -> (u32, u32) {
        (
            self.current_width.load(Ordering::Relaxed),
            self.current_height.load(Ordering::Relaxed),
        )
    }

    pub fn set_current_size(&self, width: u32, height: u32) {
        self.current_width.store(width, Ordering::Relaxed);
        self.current_height.store(height, Ordering::Relaxed);
    }

    /// `current_width / base_width`. Falls back to 1 while the window is
    /// minimised.
    pub fn scale_factor(&self) -> f64 {
        match self.current_width.load(Ordering::Relaxed) {
            0 => 1.0,
            width => width as f64 / self.base_width as f64,
        }
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen.load(Ordering::Relaxed)
    }

    pub(crate) fn set_fullscreen(&self, fullscreen: bool) {
        self.fullscreen.store(fullscreen, Ordering::Relaxed);
    }

    pub fn show_render_errors(&self) -> bool {
        self.show_render_errors.load(Ordering::Relaxed)
    }

    pub fn set_show_render_errors(&self, show: bool) {
        self.show_render_errors.store(show, Ordering::Relaxed);
    }

    pub fn monitor_refresh_hz(&self) -> Option<f64> {
        *lock_or_recover(&self.monitor_refresh_hz, "display.monitor_refresh_hz")
    }

    pub fn set_monitor_refresh_hz(&self, hz: Option<f64>) {
        *lock_or_recover(&self.monitor_refresh_hz, "display.monitor_refresh_hz") =
            hz.filter(|hz| *hz > 0.0);
    }

    pub fn render_rate(&self) -> RenderRate {
        *lock_or_recover(&self.render_rate, "display.render_rate")
    }

    pub fn set_render_rate(&self, rate: RenderRate) {
        let rate = match rate {
            RenderRate::Fixed(hz) if !hz.is_finite() || hz <= 0.0 => RenderRate::Unlimited,
            other => other,
        };
        *lock_or_recover(&self.render_rate, "display.render_rate") = rate;
        info!(render_rate = ?rate, "render_rate_changed");
    }

    /// Goes back to following the monitor's refresh rate.
    pub fn reset_render_rate(&self) {
        self.set_render_rate(RenderRate::Monitor);
    }

    /// Frames per second the render clock should aim for; `None` means
    /// unpaced.
    pub fn target_frame_rate(&self) -> Option<f64> {
        match self.render_rate() {
            RenderRate::Monitor => Some(self.monitor_refresh_hz().unwrap_or(FALLBACK_REFRESH_HZ)),
            RenderRate::Fixed(hz) => Some(hz),
            RenderRate::Unlimited => None,
        }
    }
}

/// Window and display-mode management.
pub trait DisplayBackend: Send + Sync {
    fn context(&self) -> &Arc<DisplayContext>;

    fn resize(&self, width: u32, height: u32) -> Result<(), DisplayError>;

    fn enter_fullscreen(&self, monitor: usize) -> Result<(), DisplayError>;

    fn exit_fullscreen(&self);

    fn toggle_fullscreen(&self, monitor: usize) -> Result<(), DisplayError> {
        if self.is_fullscreen() {
            self.exit_fullscreen();
            Ok(())
        } else {
            self.enter_fullscreen(monitor)
        }
    }

    fn is_fullscreen(&self) -> bool {
        self.context().is_fullscreen()
    }

    fn scale_factor(&self) -> f64 {
        self.context().scale_factor()
    }

    fn set_icon(&self, icon: &RgbaImage) -> Result<(), DisplayError>;

    /// Releases the window. Called once by the render clock on its way out.
    fn shutdown(&self);
}

pub(crate) fn validate_size(width: u32, height: u32) -> Result<(), DisplayError> {
    if width == 0 || height == 0 {
        return Err(DisplayError::InvalidSize { width, height });
    }
    Ok(())
}

/// Display without a window, for tests and headless runs. It pretends to
/// have a single monitor.
pub struct HeadlessDisplay {
    context: Arc<DisplayContext>,
    windowed_size: Mutex<Option<(u32, u32)>>,
    icon_size: Mutex<Option<(u32, u32)>>,
    shut_down: AtomicBool,
}

const HEADLESS_MONITOR_SIZE: (u32, u32) = (1920, 1080);

impl HeadlessDisplay {
    pub fn new(context: Arc<DisplayContext>) -> Self {
        Self {
            context,
            windowed_size: Mutex::new(None),
            icon_size: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Relaxed)
    }

    pub fn icon_size(&self) -> Option<(u32, u32)> {
        *lock_or_recover(&self.icon_size, "headless.icon_size")
    }
}

impl DisplayBackend for HeadlessDisplay {
    fn context(&self) -> &Arc<DisplayContext> {
        &self.context
    }

    fn resize(&self, width: u32, height: u32) -> Result<(), DisplayError> {
        validate_size(width, height)?;
        self.context.set_current_size(width, height);
        Ok(())
    }

    fn enter_fullscreen(&self, monitor: usize) -> Result<(), DisplayError> {
        if monitor != 0 {
            return Err(DisplayError::NoSuchMonitor {
                index: monitor,
                available: 1,
            });
        }
        if self.context.is_fullscreen() {
            return Ok(());
        }
        *lock_or_recover(&self.windowed_size, "headless.windowed_size") =
            Some(self.context.current_size());
        self.context
            .set_current_size(HEADLESS_MONITOR_SIZE.0, HEADLESS_MONITOR_SIZE.1);
        self.context.set_fullscreen(true);
        Ok(())
    }

    fn exit_fullscreen(&self) {
        if !self.context.is_fullscreen() {
            return;
        }
        if let Some((width, height)) =
            lock_or_recover(&self.windowed_size, "headless.windowed_size").take()
        {
            self.context.set_current_size(width, height);
        }
        self.context.set_fullscreen(false);
    }

    fn set_icon(&self, icon: &RgbaImage) -> Result<(), DisplayError> {
        if icon.width() == 0 || icon.height() == 0 {
            return Err(DisplayError::InvalidIcon("icon has no pixels".to_string()));
        }
        *lock_or_recover(&self.icon_size, "headless.icon_size") = Some(icon.dimensions());
        Ok(())
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Relaxed);
    }
}
