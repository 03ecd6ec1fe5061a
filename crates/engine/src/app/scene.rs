use super::context::EngineContext;
use super::handler::Handler;
use super::input::InputSampler;
use super::object::ObjectRef;
use super::rendering::{Draw, RenderError};

/// Everything a tick hook may look at: the handler (to queue structural
/// changes), this tick's input sample, the engine services and, for object
/// hooks, the object being ticked.
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    handler: &'a Handler,
    input: &'a InputSampler,
    engine: &'a EngineContext,
    tick_index: u64,
    this: Option<&'a ObjectRef>,
}

impl<'a> TickContext<'a> {
    pub(crate) fn new(
        handler: &'a Handler,
        input: &'a InputSampler,
        engine: &'a EngineContext,
        tick_index: u64,
    ) -> Self {
        Self {
            handler,
            input,
            engine,
            tick_index,
            this: None,
        }
    }

    pub(crate) fn for_object<'b>(&self, object: &'b ObjectRef) -> TickContext<'b>
    where
        'a: 'b,
    {
        TickContext {
            handler: self.handler,
            input: self.input,
            engine: self.engine,
            tick_index: self.tick_index,
            this: Some(object),
        }
    }

    pub fn handler(&self) -> &'a Handler {
        self.handler
    }

    pub fn input(&self) -> &'a InputSampler {
        self.input
    }

    pub fn engine(&self) -> &'a EngineContext {
        self.engine
    }

    /// Number of ticks completed before this one.
    pub fn tick_index(&self) -> u64 {
        self.tick_index
    }

    /// The object whose hook is running. `None` inside a scene hook.
    pub fn this(&self) -> Option<&'a ObjectRef> {
        self.this
    }

    /// Fixed simulation step in seconds.
    pub fn tick_seconds(&self) -> f64 {
        1.0 / self.engine.tick_rate()
    }
}

/// A game state: populates the handler when activated and gets its own tick
/// and render hooks after every object.
pub trait Scene: Send + Sync + 'static {
    fn initialise(&self, handler: &Handler);

    fn tick(&self, _ctx: &TickContext<'_>) {}

    fn render(&self, _draw: &mut Draw<'_>) -> Result<(), RenderError> {
        Ok(())
    }

    fn debug_name(&self) -> &'static str {
        "scene"
    }
}
