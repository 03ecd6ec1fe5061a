//! Dual-clock game loop engine.
//!
//! A [`Handler`] owns layered game objects and applies structural changes in
//! one flush at the end of every simulation tick. A simulation clock ticks it
//! at a fixed rate while a render clock draws it at the display's frame rate,
//! each on its own thread.

pub mod app;

pub use image::{Rgba, RgbaImage};

pub use app::{
    load_image, read_tokens, run_app, run_headless, write_rows, Animation, AnimationError,
    AppError, AudioBackend, AudioError, ClipHandle, Color, ConfigError, DiagnosticsSink,
    DisplayBackend, DisplayContext, DisplayError, Draw, DrawLayer, EngineContext, GameLoop,
    GameObject, Handler, HandlerError, HeadlessDisplay, ImageLoadError, InputSampler, Key,
    LoopConfig, LoopMetricsSnapshot, LoopSummary, MetricsHandle, MouseButton, NullBackend,
    ObjectId, ObjectRef, ObjectRenderFailure, PixelsBackend, Point, RawInput, Rect,
    RenderBackend, RenderError, RenderRate, RenderReport, Scene, ShutdownSignal, SilentAudio,
    SoundBoard, TextFileError, TickContext, WinitDisplay, DEFAULT_REMOVE_QUEUE_CAPACITY,
    FALLBACK_REFRESH_HZ, LAYER_COUNT, RENDER_THREAD_NAME, SIM_THREAD_NAME,
};
