use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use winit::error::{EventLoopError, OsError};

use super::clock::{idle_sleep, FixedRateClock};
use super::config::{ConfigError, LoopConfig};
use super::context::EngineContext;
use super::handler::{Handler, RenderReport};
use super::input::InputSampler;
use super::metrics::MetricsAccumulator;
use super::rendering::{Color, Draw, NullBackend, RenderBackend, RenderError};
use super::scene::Scene;

pub const SIM_THREAD_NAME: &str = "sim-ticks";
pub const RENDER_THREAD_NAME: &str = "renderer";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("failed to spawn {name} thread: {source}")]
    SpawnThread {
        name: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

/// Totals reported once both clocks have stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub ticks: u64,
    pub frames: u64,
    pub render_failures: u64,
}

#[derive(Debug, Clone, Copy)]
struct SimSettings {
    max_catch_up_ticks: Option<u32>,
    metrics_interval: Duration,
}

#[derive(Debug, Clone, Copy)]
struct RenderSettings {
    clear_color: Color,
    metrics_interval: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
struct RenderTotals {
    frames: u64,
    failures: u64,
}

/// The two running clocks. The simulation clock ticks the handler at the
/// configured rate on its own thread; the render clock draws it at the
/// display's target frame rate on another.
pub struct GameLoop {
    engine: Arc<EngineContext>,
    handler: Arc<Handler>,
    sim_thread: Option<JoinHandle<()>>,
    render_thread: Option<JoinHandle<RenderTotals>>,
}

impl GameLoop {
    pub fn start(
        config: &LoopConfig,
        engine: Arc<EngineContext>,
        handler: Arc<Handler>,
        backend: Box<dyn RenderBackend>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let sim_settings = SimSettings {
            max_catch_up_ticks: config.max_catch_up_ticks,
            metrics_interval: config.metrics_log_interval(),
        };
        let render_settings = RenderSettings {
            clear_color: config.clear_color,
            metrics_interval: config.metrics_log_interval(),
        };

        let sim_thread = {
            let engine = Arc::clone(&engine);
            let handler = Arc::clone(&handler);
            thread::Builder::new()
                .name(SIM_THREAD_NAME.to_string())
                .spawn(move || run_simulation(engine, handler, sim_settings))
                .map_err(|source| AppError::SpawnThread {
                    name: SIM_THREAD_NAME,
                    source,
                })?
        };

        let render_thread = {
            let engine = Arc::clone(&engine);
            let handler = Arc::clone(&handler);
            thread::Builder::new()
                .name(RENDER_THREAD_NAME.to_string())
                .spawn(move || run_render(engine, handler, backend, render_settings))
        };
        let render_thread = match render_thread {
            Ok(thread) => thread,
            Err(source) => {
                engine.request_shutdown();
                if sim_thread.join().is_err() {
                    error!("sim_thread_panicked");
                }
                return Err(AppError::SpawnThread {
                    name: RENDER_THREAD_NAME,
                    source,
                });
            }
        };

        info!(
            tick_rate = engine.tick_rate(),
            render_rate = ?engine.display_context().render_rate(),
            "game_loop_started"
        );

        Ok(Self {
            engine,
            handler,
            sim_thread: Some(sim_thread),
            render_thread: Some(render_thread),
        })
    }

    pub fn engine(&self) -> &Arc<EngineContext> {
        &self.engine
    }

    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }

    pub fn ticks_passed(&self) -> u64 {
        self.engine.ticks_passed()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.engine.shutdown().is_requested()
    }

    /// Stops both clocks, waits for them and releases audio.
    pub fn shutdown(mut self) -> LoopSummary {
        self.stop()
    }

    fn stop(&mut self) -> LoopSummary {
        self.engine.request_shutdown();

        if let Some(thread) = self.sim_thread.take() {
            if thread.join().is_err() {
                error!("sim_thread_panicked");
            }
        }
        let totals = match self.render_thread.take() {
            Some(thread) => thread.join().unwrap_or_else(|_| {
                error!("render_thread_panicked");
                RenderTotals::default()
            }),
            None => RenderTotals::default(),
        };

        self.engine.audio().cleanup();

        let summary = LoopSummary {
            ticks: self.engine.ticks_passed(),
            frames: totals.frames,
            render_failures: totals.failures,
        };
        info!(
            ticks = summary.ticks,
            frames = summary.frames,
            render_failures = summary.render_failures,
            "game_loop_stopped"
        );
        summary
    }
}

impl Drop for GameLoop {
    fn drop(&mut self) {
        if self.sim_thread.is_some() || self.render_thread.is_some() {
            self.stop();
        }
    }
}

fn run_simulation(engine: Arc<EngineContext>, handler: Arc<Handler>, settings: SimSettings) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        simulation_loop(&engine, &handler, settings)
    }));
    if let Err(payload) = outcome {
        error!(panic = %panic_message(payload.as_ref()), "sim_thread_panicked");
        engine.request_shutdown();
    }
    handler.clear_all_immediate();
    info!(ticks_passed = engine.ticks_passed(), "sim_clock_stopped");
}

fn simulation_loop(engine: &Arc<EngineContext>, handler: &Handler, settings: SimSettings) {
    let mut input = InputSampler::new(
        Arc::clone(engine.raw_input()),
        Arc::clone(engine.display_context()),
    );
    let start = Instant::now();
    let mut clock = FixedRateClock::new(engine.tick_rate(), settings.max_catch_up_ticks, start);
    let mut metrics = MetricsAccumulator::new(settings.metrics_interval, start);
    info!(
        tick_rate = engine.tick_rate(),
        max_catch_up_ticks = ?settings.max_catch_up_ticks,
        "sim_clock_started"
    );

    let shutdown = engine.shutdown();
    while !shutdown.is_requested() {
        let plan = clock.poll(Instant::now());
        for _ in 0..plan.steps {
            if shutdown.is_requested() {
                break;
            }
            input.tick();
            handler.tick_pass(&input, engine);
            engine.record_tick();
            metrics.record_tick();
        }

        if plan.dropped > 0.0 {
            warn!(
                dropped_ticks = plan.dropped as u64,
                max_catch_up_ticks = ?settings.max_catch_up_ticks,
                "sim_clamp_triggered"
            );
        }

        if let Some(interval) = metrics.maybe_snapshot(Instant::now()) {
            engine.metrics().publish_simulation(&interval);
            info!(
                tps = interval.ticks_per_second,
                live_objects = handler.live_count(),
                ticks_passed = engine.ticks_passed(),
                "sim_metrics"
            );
        }

        let wait = idle_sleep(clock.until_next_step(Instant::now()));
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}

fn run_render(
    engine: Arc<EngineContext>,
    handler: Arc<Handler>,
    mut backend: Box<dyn RenderBackend>,
    settings: RenderSettings,
) -> RenderTotals {
    let display_ctx = Arc::clone(engine.display_context());
    let mut totals = RenderTotals::default();
    let mut clock: Option<FixedRateClock> = None;
    let mut metrics = MetricsAccumulator::new(settings.metrics_interval, Instant::now());
    info!(target_fps = ?display_ctx.target_frame_rate(), "render_clock_started");

    let shutdown = engine.shutdown();
    while !shutdown.is_requested() {
        let now = Instant::now();
        let frame_due = match display_ctx.target_frame_rate() {
            Some(hz) => {
                // At most one frame per poll; a late renderer skips frames
                // instead of drawing the same state several times.
                let clock = clock.get_or_insert_with(|| FixedRateClock::new(hz, Some(1), now));
                if clock.rate_hz() != hz {
                    debug!(target_fps = hz, "render_rate_applied");
                    clock.set_rate(hz);
                }
                clock.poll(now).steps > 0
            }
            None => {
                clock = None;
                true
            }
        };

        if frame_due {
            let frame_start = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                render_frame(
                    backend.as_mut(),
                    &handler,
                    display_ctx.scale_factor(),
                    settings.clear_color,
                )
            }))
            .unwrap_or_else(|payload| {
                Err(RenderError::Panic(panic_message(payload.as_ref())))
            });
            metrics.record_frame(frame_start.elapsed());
            totals.frames += 1;

            let failures = match outcome {
                Ok(report) => {
                    log_report(&report, display_ctx.show_render_errors());
                    report.failure_count()
                }
                Err(error) => {
                    log_frame_error(&error, display_ctx.show_render_errors());
                    1
                }
            };
            for _ in 0..failures {
                metrics.record_render_failure();
            }
            totals.failures += failures as u64;
        }

        if let Some(interval) = metrics.maybe_snapshot(Instant::now()) {
            engine.metrics().publish_render(&interval);
            info!(
                fps = interval.frames_per_second,
                frame_time_ms = interval.frame_time_ms,
                render_failures = interval.render_failures,
                "render_metrics"
            );
        }

        match &clock {
            Some(clock) => {
                let wait = idle_sleep(clock.until_next_step(Instant::now()));
                if !wait.is_zero() {
                    thread::sleep(wait);
                }
            }
            None => thread::yield_now(),
        }
    }

    let display_backend = engine.display();
    if display_backend.is_fullscreen() {
        display_backend.exit_fullscreen();
    }
    display_backend.shutdown();
    info!(frames = totals.frames, "render_clock_stopped");
    totals
}

fn render_frame(
    backend: &mut dyn RenderBackend,
    handler: &Handler,
    scale: f64,
    clear: Color,
) -> Result<RenderReport, RenderError> {
    backend.start_draw_cycle(clear)?;
    backend.set_opacity(1.0);
    let report = {
        let mut draw = Draw::new(backend, scale);
        handler.render_pass(&mut draw)
    };
    backend.end_draw_cycle()?;
    Ok(report)
}

fn log_report(report: &RenderReport, detailed: bool) {
    if report.failure_count() == 0 {
        return;
    }

    if detailed {
        for failure in &report.failures {
            warn!(
                object = %failure.object,
                layer = %failure.layer,
                error = ?failure.error,
                "object_render_failed"
            );
        }
        if let Some(error) = &report.scene_failure {
            warn!(error = ?error, "scene_render_failed");
        }
    } else {
        let first = report
            .failures
            .first()
            .map(|failure| &failure.error)
            .or(report.scene_failure.as_ref());
        if let Some(first) = first {
            warn!(
                failures = report.failure_count(),
                first = %first,
                "render_failures"
            );
        }
    }
}

fn log_frame_error(error: &RenderError, detailed: bool) {
    if detailed {
        warn!(error = ?error, "render_frame_failed");
    } else {
        warn!(error = %error, "render_frame_failed");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs the engine without a window for `duration` or until something
/// requests shutdown, drawing into a [`NullBackend`].
pub fn run_headless(
    config: &LoopConfig,
    make_scene: impl FnOnce(&Arc<EngineContext>) -> Arc<dyn Scene>,
    duration: Duration,
) -> Result<LoopSummary, AppError> {
    config.validate()?;
    let engine = EngineContext::headless(config);
    let handler = Handler::with_remove_queue_capacity(config.remove_queue_capacity);
    handler.set_active_scene(make_scene(&engine), false);

    let game_loop = GameLoop::start(
        config,
        Arc::clone(&engine),
        handler,
        Box::new(NullBackend::default()),
    )?;

    let deadline = Instant::now() + duration;
    while Instant::now() < deadline && !game_loop.is_shutdown_requested() {
        thread::sleep(idle_sleep(deadline.saturating_duration_since(Instant::now())));
    }

    Ok(game_loop.shutdown())
}
