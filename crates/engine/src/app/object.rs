use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use super::handler::{DrawLayer, Handler};
use super::lock::lock_or_recover;
use super::rendering::{Draw, RenderError};
use super::scene::TickContext;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a game object. Allocated once per [`ObjectRef`] and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl ObjectId {
    fn allocate() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Anything the [`Handler`] can own and drive.
///
/// Both hooks default to doing nothing, so a purely decorative object only
/// implements `render` and an invisible controller only implements `tick`.
/// Hooks take `&self`: the tick pass and the render pass run on different
/// threads and may observe the same object at the same time, so objects keep
/// their mutable state behind their own `Mutex`/atomics.
pub trait GameObject: Send + Sync + 'static {
    fn tick(&self, _ctx: &TickContext<'_>) {}

    fn render(&self, _draw: &mut Draw<'_>) -> Result<(), RenderError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Binding {
    layer: DrawLayer,
    handler: Weak<Handler>,
}

struct ObjectCell {
    id: ObjectId,
    binding: Mutex<Option<Binding>>,
    object: Arc<dyn GameObject>,
}

/// Shared, identity-compared handle to a game object.
///
/// Cloning is cheap and every clone refers to the same identity. The handle
/// also carries the non-owning back-reference to the handler that admitted
/// the object: it is bound when the object becomes live and cleared when it
/// is evicted.
#[derive(Clone)]
pub struct ObjectRef {
    cell: Arc<ObjectCell>,
}

impl ObjectRef {
    pub fn new<T: GameObject>(object: T) -> Self {
        Self::from_shared(Arc::new(object))
    }

    /// Wraps an object the caller keeps a typed `Arc` to. Each call creates a
    /// new identity, so wrap a given object once and clone the handle.
    pub fn from_shared(object: Arc<dyn GameObject>) -> Self {
        Self {
            cell: Arc::new(ObjectCell {
                id: ObjectId::allocate(),
                binding: Mutex::new(None),
                object,
            }),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.cell.id
    }

    pub fn object(&self) -> &Arc<dyn GameObject> {
        &self.cell.object
    }

    /// Layer the object was admitted to, `None` while not live.
    pub fn layer(&self) -> Option<DrawLayer> {
        lock_or_recover(&self.cell.binding, "object.binding")
            .as_ref()
            .map(|binding| binding.layer)
    }

    /// Handler that currently owns the object, if it is live and the handler
    /// still exists.
    pub fn handler(&self) -> Option<Arc<Handler>> {
        lock_or_recover(&self.cell.binding, "object.binding")
            .as_ref()
            .and_then(|binding| binding.handler.upgrade())
    }

    pub(crate) fn bind(&self, handler: Weak<Handler>, layer: DrawLayer) {
        *lock_or_recover(&self.cell.binding, "object.binding") = Some(Binding { layer, handler });
    }

    pub(crate) fn unbind(&self) {
        *lock_or_recover(&self.cell.binding, "object.binding") = None;
    }

    pub(crate) fn tick(&self, ctx: &TickContext<'_>) {
        self.cell.object.tick(ctx);
    }

    pub(crate) fn render(&self, draw: &mut Draw<'_>) -> Result<(), RenderError> {
        self.cell.object.render(draw)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.cell.id == other.cell.id
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("id", &self.cell.id)
            .field("layer", &self.layer())
            .finish()
    }
}
