use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::info;

use super::audio::{AudioBackend, SilentAudio, SoundBoard};
use super::config::LoopConfig;
use super::display::{DisplayBackend, DisplayContext, HeadlessDisplay};
use super::input::RawInput;
use super::lock::lock_or_recover;
use super::metrics::MetricsHandle;

type WakeHook = Box<dyn Fn() + Send + Sync>;

/// One-way stop flag shared by both clocks and the host. An optional wake
/// hook lets a sleeping event loop notice the request immediately.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
    wake: Arc<Mutex<Option<WakeHook>>>,
}

impl fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("requested", &self.is_requested())
            .finish()
    }
}

impl ShutdownSignal {
    /// Returns true for the call that flipped the flag.
    pub fn request(&self) -> bool {
        let first = !self.requested.swap(true, Ordering::SeqCst);
        if first {
            info!("shutdown_requested");
            if let Some(wake) = lock_or_recover(&self.wake, "shutdown.wake").as_ref() {
                wake();
            }
        }
        first
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub(crate) fn set_wake_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *lock_or_recover(&self.wake, "shutdown.wake") = Some(Box::new(hook));
    }
}

/// Engine-wide services handed to every hook through the tick context:
/// display, raw input, audio, metrics and the shutdown signal.
pub struct EngineContext {
    tick_rate: f64,
    display: Arc<dyn DisplayBackend>,
    raw_input: Arc<RawInput>,
    audio: SoundBoard,
    metrics: MetricsHandle,
    shutdown: ShutdownSignal,
    ticks_passed: AtomicU64,
}

impl EngineContext {
    pub fn new(
        config: &LoopConfig,
        display: Arc<dyn DisplayBackend>,
        audio: Arc<dyn AudioBackend>,
    ) -> Arc<Self> {
        let context = display.context();
        context.set_render_rate(config.render_rate);
        context.set_show_render_errors(config.show_render_errors);

        Arc::new(Self {
            tick_rate: config.tick_rate,
            display,
            raw_input: Arc::new(RawInput::default()),
            audio: SoundBoard::new(audio),
            metrics: MetricsHandle::default(),
            shutdown: ShutdownSignal::default(),
            ticks_passed: AtomicU64::new(0),
        })
    }

    /// Context with no window and no audio device.
    pub fn headless(config: &LoopConfig) -> Arc<Self> {
        let display = Arc::new(HeadlessDisplay::new(Arc::new(DisplayContext::new(
            config.window_width,
            config.window_height,
            None,
        ))));
        Self::new(config, display, Arc::new(SilentAudio::new()))
    }

    pub fn tick_rate(&self) -> f64 {
        self.tick_rate
    }

    pub fn display(&self) -> &Arc<dyn DisplayBackend> {
        &self.display
    }

    pub fn display_context(&self) -> &Arc<DisplayContext> {
        self.display.context()
    }

    pub fn raw_input(&self) -> &Arc<RawInput> {
        &self.raw_input
    }

    pub fn audio(&self) -> &SoundBoard {
        &self.audio
    }

    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Asks both clocks to stop after their current pass.
    pub fn request_shutdown(&self) {
        self.shutdown.request();
    }

    /// Completed simulation ticks since start.
    pub fn ticks_passed(&self) -> u64 {
        self.ticks_passed.load(Ordering::Acquire)
    }

    pub(crate) fn record_tick(&self) -> u64 {
        self.ticks_passed.fetch_add(1, Ordering::AcqRel) + 1
    }
}
