use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbaImage;
use tracing::{debug, info, warn};
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{
    ElementState, Event, MouseButton as WinitButton, MouseScrollDelta, WindowEvent,
};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, Icon, Window, WindowBuilder};

use super::audio::SilentAudio;
use super::config::LoopConfig;
use super::context::EngineContext;
use super::display::{validate_size, DisplayBackend, DisplayContext, DisplayError};
use super::handler::Handler;
use super::input::{Key, MouseButton};
use super::lock::lock_or_recover;
use super::loop_runner::{AppError, GameLoop, LoopSummary};
use super::rendering::{PixelsBackend, Point};
use super::scene::Scene;

/// Scroll distance of one wheel notch for devices that report pixels.
const PIXELS_PER_SCROLL_LINE: f64 = 40.0;

/// Window commands raised off the event thread and applied on it.
#[derive(Debug)]
enum HostEvent {
    ShutdownRequested,
    EnterFullscreen(usize),
    ExitFullscreen,
    Resize(u32, u32),
    SetIcon(Icon),
    Hide,
}

/// [`DisplayBackend`] for a winit window. Requests are forwarded to the event
/// thread, so clock threads never block on the window system.
pub struct WinitDisplay {
    context: Arc<DisplayContext>,
    proxy: Mutex<EventLoopProxy<HostEvent>>,
    monitor_count: AtomicUsize,
}

impl WinitDisplay {
    fn new(
        context: Arc<DisplayContext>,
        proxy: EventLoopProxy<HostEvent>,
        monitor_count: usize,
    ) -> Self {
        Self {
            context,
            proxy: Mutex::new(proxy),
            monitor_count: AtomicUsize::new(monitor_count),
        }
    }

    fn send(&self, event: HostEvent) {
        if lock_or_recover(&self.proxy, "host.proxy")
            .send_event(event)
            .is_err()
        {
            debug!("host_event_dropped; event loop closed");
        }
    }

    fn set_monitor_count(&self, count: usize) {
        self.monitor_count.store(count, Ordering::Relaxed);
    }
}

impl DisplayBackend for WinitDisplay {
    fn context(&self) -> &Arc<DisplayContext> {
        &self.context
    }

    fn resize(&self, width: u32, height: u32) -> Result<(), DisplayError> {
        validate_size(width, height)?;
        self.send(HostEvent::Resize(width, height));
        Ok(())
    }

    fn enter_fullscreen(&self, monitor: usize) -> Result<(), DisplayError> {
        let available = self.monitor_count.load(Ordering::Relaxed);
        if monitor >= available {
            return Err(DisplayError::NoSuchMonitor {
                index: monitor,
                available,
            });
        }
        if !self.context.is_fullscreen() {
            self.context.set_fullscreen(true);
            self.send(HostEvent::EnterFullscreen(monitor));
        }
        Ok(())
    }

    fn exit_fullscreen(&self) {
        if self.context.is_fullscreen() {
            self.context.set_fullscreen(false);
            self.send(HostEvent::ExitFullscreen);
        }
    }

    fn set_icon(&self, icon: &RgbaImage) -> Result<(), DisplayError> {
        let icon = Icon::from_rgba(icon.as_raw().clone(), icon.width(), icon.height())
            .map_err(|error| DisplayError::InvalidIcon(error.to_string()))?;
        self.send(HostEvent::SetIcon(icon));
        Ok(())
    }

    fn shutdown(&self) {
        self.send(HostEvent::Hide);
    }
}

/// Opens the window, starts both clocks with the scene built by `make_scene`
/// and runs the host event loop on the calling thread until shutdown.
pub fn run_app(
    config: LoopConfig,
    make_scene: impl FnOnce(&Arc<EngineContext>) -> Arc<dyn Scene>,
) -> Result<LoopSummary, AppError> {
    config.validate()?;

    let event_loop = EventLoopBuilder::<HostEvent>::with_user_event()
        .build()
        .map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );

    let context = Arc::new(DisplayContext::new(
        config.window_width,
        config.window_height,
        monitor_refresh_hz(&window),
    ));
    let inner = window.inner_size();
    context.set_current_size(inner.width, inner.height);

    let display = Arc::new(WinitDisplay::new(
        Arc::clone(&context),
        event_loop.create_proxy(),
        window.available_monitors().count(),
    ));
    let engine = EngineContext::new(
        &config,
        Arc::clone(&display) as Arc<dyn DisplayBackend>,
        Arc::new(SilentAudio::new()),
    );
    let wake_proxy = Mutex::new(event_loop.create_proxy());
    engine.shutdown().set_wake_hook(move || {
        let _ = lock_or_recover(&wake_proxy, "host.wake_proxy")
            .send_event(HostEvent::ShutdownRequested);
    });

    let backend = PixelsBackend::new(Arc::clone(&window), Arc::clone(&context))
        .map_err(AppError::CreateRenderer)?;

    let handler = Handler::with_remove_queue_capacity(config.remove_queue_capacity);
    handler.set_active_scene(make_scene(&engine), false);

    info!(
        title = %config.window_title,
        width = inner.width,
        height = inner.height,
        monitor_refresh_hz = ?context.monitor_refresh_hz(),
        "window_opened"
    );

    let mut game_loop = Some(GameLoop::start(
        &config,
        Arc::clone(&engine),
        handler,
        Box::new(backend),
    )?);
    let summary = Rc::new(Cell::new(LoopSummary::default()));
    let summary_out = Rc::clone(&summary);
    let raw = Arc::clone(engine.raw_input());

    event_loop.set_control_flow(ControlFlow::Wait);
    event_loop
        .run(move |event, window_target| {
            let mut stop = |reason: &'static str| {
                if let Some(running) = game_loop.take() {
                    info!(reason, "host_stopping");
                    summary.set(running.shutdown());
                }
                window_target.exit();
            };

            match event {
                Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                    WindowEvent::CloseRequested => {
                        info!(reason = "window_close", "shutdown_requested");
                        engine.request_shutdown();
                    }
                    WindowEvent::Resized(size) => {
                        context.set_current_size(size.width, size.height);
                    }
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = window.inner_size();
                        context.set_current_size(size.width, size.height);
                    }
                    WindowEvent::Moved(_) => {
                        context.set_monitor_refresh_hz(monitor_refresh_hz(&window));
                        display.set_monitor_count(window.available_monitors().count());
                    }
                    WindowEvent::Focused(false) => raw.release_all(),
                    WindowEvent::CursorMoved { position, .. } => {
                        raw.set_cursor(Point::new(position.x, position.y));
                    }
                    WindowEvent::MouseInput { state, button, .. } => {
                        if let Some(button) = map_button(button) {
                            raw.set_button(button, state == ElementState::Pressed);
                        }
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        raw.add_scroll(wheel_amount(delta));
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if let PhysicalKey::Code(code) = event.physical_key {
                            if let Some(key) = map_key(code) {
                                raw.set_key(key, event.state == ElementState::Pressed);
                            }
                        }
                    }
                    _ => {}
                },
                Event::UserEvent(command) => match command {
                    HostEvent::ShutdownRequested => stop("shutdown_signal"),
                    HostEvent::EnterFullscreen(index) => {
                        match window.available_monitors().nth(index) {
                            Some(monitor) => {
                                window.set_fullscreen(Some(Fullscreen::Borderless(Some(monitor))));
                                info!(monitor = index, "fullscreen_entered");
                            }
                            None => {
                                context.set_fullscreen(false);
                                warn!(monitor = index, "fullscreen_monitor_missing");
                            }
                        }
                    }
                    HostEvent::ExitFullscreen => {
                        window.set_fullscreen(None);
                        info!("fullscreen_exited");
                    }
                    HostEvent::Resize(width, height) => {
                        let _ = window.request_inner_size(PhysicalSize::new(width, height));
                    }
                    HostEvent::SetIcon(icon) => window.set_window_icon(Some(icon)),
                    HostEvent::Hide => window.set_visible(false),
                },
                Event::AboutToWait => {
                    if engine.shutdown().is_requested() {
                        stop("shutdown_signal");
                    }
                }
                Event::LoopExiting => {
                    stop("loop_exiting");
                    info!("shutdown");
                }
                _ => {}
            }
        })
        .map_err(AppError::EventLoopRun)?;

    Ok(summary_out.get())
}

fn monitor_refresh_hz(window: &Window) -> Option<f64> {
    window
        .current_monitor()
        .and_then(|monitor| monitor.refresh_rate_millihertz())
        .map(|millihertz| f64::from(millihertz) / 1000.0)
}

/// Positive amounts scroll down, towards the user.
fn wheel_amount(delta: MouseScrollDelta) -> f64 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => -f64::from(y),
        MouseScrollDelta::PixelDelta(position) => -position.y / PIXELS_PER_SCROLL_LINE,
    }
}

fn map_button(button: WinitButton) -> Option<MouseButton> {
    match button {
        WinitButton::Left => Some(MouseButton::Left),
        WinitButton::Right => Some(MouseButton::Right),
        WinitButton::Middle => Some(MouseButton::Middle),
        WinitButton::Back => Some(MouseButton::Back),
        WinitButton::Forward => Some(MouseButton::Forward),
        WinitButton::Other(_) => None,
    }
}

fn map_key(code: KeyCode) -> Option<Key> {
    let key = match code {
        KeyCode::KeyA => Key::A,
        KeyCode::KeyB => Key::B,
        KeyCode::KeyC => Key::C,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyE => Key::E,
        KeyCode::KeyF => Key::F,
        KeyCode::KeyG => Key::G,
        KeyCode::KeyH => Key::H,
        KeyCode::KeyI => Key::I,
        KeyCode::KeyJ => Key::J,
        KeyCode::KeyK => Key::K,
        KeyCode::KeyL => Key::L,
        KeyCode::KeyM => Key::M,
        KeyCode::KeyN => Key::N,
        KeyCode::KeyO => Key::O,
        KeyCode::KeyP => Key::P,
        KeyCode::KeyQ => Key::Q,
        KeyCode::KeyR => Key::R,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyT => Key::T,
        KeyCode::KeyU => Key::U,
        KeyCode::KeyV => Key::V,
        KeyCode::KeyW => Key::W,
        KeyCode::KeyX => Key::X,
        KeyCode::KeyY => Key::Y,
        KeyCode::KeyZ => Key::Z,
        KeyCode::Digit0 => Key::Digit0,
        KeyCode::Digit1 => Key::Digit1,
        KeyCode::Digit2 => Key::Digit2,
        KeyCode::Digit3 => Key::Digit3,
        KeyCode::Digit4 => Key::Digit4,
        KeyCode::Digit5 => Key::Digit5,
        KeyCode::Digit6 => Key::Digit6,
        KeyCode::Digit7 => Key::Digit7,
        KeyCode::Digit8 => Key::Digit8,
        KeyCode::Digit9 => Key::Digit9,
        KeyCode::ArrowUp => Key::Up,
        KeyCode::ArrowDown => Key::Down,
        KeyCode::ArrowLeft => Key::Left,
        KeyCode::ArrowRight => Key::Right,
        KeyCode::Space => Key::Space,
        KeyCode::Enter | KeyCode::NumpadEnter => Key::Enter,
        KeyCode::Escape => Key::Escape,
        KeyCode::Tab => Key::Tab,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::ShiftLeft => Key::ShiftLeft,
        KeyCode::ShiftRight => Key::ShiftRight,
        KeyCode::ControlLeft => Key::ControlLeft,
        KeyCode::ControlRight => Key::ControlRight,
        KeyCode::AltLeft => Key::AltLeft,
        KeyCode::AltRight => Key::AltRight,
        KeyCode::F1 => Key::F1,
        KeyCode::F2 => Key::F2,
        KeyCode::F3 => Key::F3,
        KeyCode::F4 => Key::F4,
        KeyCode::F5 => Key::F5,
        KeyCode::F6 => Key::F6,
        KeyCode::F7 => Key::F7,
        KeyCode::F8 => Key::F8,
        KeyCode::F9 => Key::F9,
        KeyCode::F10 => Key::F10,
        KeyCode::F11 => Key::F11,
        KeyCode::F12 => Key::F12,
        _ => return None,
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use winit::dpi::PhysicalPosition;

    use super::*;

    #[test]
    fn wheel_towards_the_user_is_positive() {
        assert_eq!(wheel_amount(MouseScrollDelta::LineDelta(0.0, -2.0)), 2.0);
        assert_eq!(wheel_amount(MouseScrollDelta::LineDelta(0.0, 1.0)), -1.0);
        assert_eq!(
            wheel_amount(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 80.0))),
            -2.0
        );
    }

    #[test]
    fn keys_map_by_physical_position() {
        assert_eq!(map_key(KeyCode::KeyW), Some(Key::W));
        assert_eq!(map_key(KeyCode::Digit7), Some(Key::Digit7));
        assert_eq!(map_key(KeyCode::ArrowLeft), Some(Key::Left));
        assert_eq!(map_key(KeyCode::NumpadEnter), Some(Key::Enter));
        assert_eq!(map_key(KeyCode::F11), Some(Key::F11));
        assert_eq!(map_key(KeyCode::CapsLock), None);
    }

    #[test]
    fn extra_mouse_buttons_are_ignored() {
        assert_eq!(map_button(WinitButton::Middle), Some(MouseButton::Middle));
        assert_eq!(map_button(WinitButton::Forward), Some(MouseButton::Forward));
        assert_eq!(map_button(WinitButton::Other(9)), None);
    }

    #[test]
    fn every_mapped_key_is_distinct() {
        let codes = [
            KeyCode::KeyA,
            KeyCode::KeyZ,
            KeyCode::Digit0,
            KeyCode::Space,
            KeyCode::Escape,
            KeyCode::ShiftLeft,
            KeyCode::ShiftRight,
            KeyCode::F1,
        ];
        let mut indices: Vec<usize> = codes
            .iter()
            .filter_map(|code| map_key(*code))
            .map(Key::index)
            .collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), codes.len());
    }
}
