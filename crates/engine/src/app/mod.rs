mod animation;
mod audio;
mod clock;
mod config;
mod context;
mod display;
mod handler;
mod host;
mod input;
mod lock;
mod loop_runner;
mod metrics;
mod object;
mod rendering;
mod scene;
mod text_file;

pub use animation::{Animation, AnimationError};
pub use audio::{AudioBackend, AudioError, ClipHandle, SilentAudio, SoundBoard};
pub use config::{ConfigError, DiagnosticsSink, LoopConfig};
pub use context::{EngineContext, ShutdownSignal};
pub use display::{
    DisplayBackend, DisplayContext, DisplayError, HeadlessDisplay, RenderRate,
    FALLBACK_REFRESH_HZ,
};
pub use handler::{
    DrawLayer, Handler, HandlerError, ObjectRenderFailure, RenderReport,
    DEFAULT_REMOVE_QUEUE_CAPACITY, LAYER_COUNT,
};
pub use host::{run_app, WinitDisplay};
pub use input::{InputSampler, Key, MouseButton, RawInput};
pub use loop_runner::{
    run_headless, AppError, GameLoop, LoopSummary, RENDER_THREAD_NAME, SIM_THREAD_NAME,
};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use object::{GameObject, ObjectId, ObjectRef};
pub use rendering::{
    load_image, Color, Draw, ImageLoadError, NullBackend, PixelsBackend, Point, Rect,
    RenderBackend, RenderError,
};
pub use scene::{Scene, TickContext};
pub use text_file::{read_tokens, write_rows, TextFileError};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::{EngineContext, Handler, InputSampler, LoopConfig};

    pub(crate) struct Harness {
        pub(crate) handler: Arc<Handler>,
        pub(crate) engine: Arc<EngineContext>,
        pub(crate) input: InputSampler,
    }

    pub(crate) fn harness() -> Harness {
        let engine = EngineContext::headless(&LoopConfig::default());
        let input = InputSampler::new(
            Arc::clone(engine.raw_input()),
            Arc::clone(engine.display_context()),
        );
        Harness {
            handler: Handler::new(),
            engine,
            input,
        }
    }
}
