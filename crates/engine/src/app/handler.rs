use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, RwLock, Weak};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::animation::Animation;
use super::context::EngineContext;
use super::input::InputSampler;
use super::lock::{lock_or_recover, read_or_recover, write_or_recover};
use super::object::{ObjectId, ObjectRef};
use super::rendering::{Draw, RenderError};
use super::scene::{Scene, TickContext};

/// Number of draw layers. Valid layers are `0..LAYER_COUNT`.
pub const LAYER_COUNT: usize = 10;
pub const DEFAULT_REMOVE_QUEUE_CAPACITY: usize = 65_536;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("draw layer {layer} out of bounds for {} layers", LAYER_COUNT)]
    LayerOutOfBounds { layer: i64 },
}

/// A validated draw layer. Layer 0 is ticked and drawn first (bottom), the
/// last layer is drawn on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawLayer(u8);

impl DrawLayer {
    pub const BOTTOM: DrawLayer = DrawLayer(0);
    pub const TOP: DrawLayer = DrawLayer((LAYER_COUNT - 1) as u8);

    pub fn new(layer: i32) -> Result<Self, HandlerError> {
        if layer < 0 || layer as usize >= LAYER_COUNT {
            return Err(HandlerError::LayerOutOfBounds {
                layer: i64::from(layer),
            });
        }
        Ok(Self(layer as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn all() -> impl Iterator<Item = DrawLayer> {
        (0..LAYER_COUNT as u8).map(DrawLayer)
    }
}

impl TryFrom<i32> for DrawLayer {
    type Error = HandlerError;

    fn try_from(layer: i32) -> Result<Self, Self::Error> {
        Self::new(layer)
    }
}

impl fmt::Display for DrawLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Committed live state. Traversals work on a shared snapshot of this; the
/// flush copies on write and swaps the new state in under the write lock.
#[derive(Clone, Default)]
struct LayerBuckets {
    layers: [Vec<ObjectRef>; LAYER_COUNT],
    live: HashMap<ObjectId, DrawLayer>,
}

impl LayerBuckets {
    fn admit(&mut self, object: ObjectRef, layer: DrawLayer) {
        // Re-admitting a live object moves it; it never sits in two buckets.
        if let Some(previous) = self.live.get(&object.id()).copied() {
            self.layers[previous.index()].retain(|live| live.id() != object.id());
        }
        self.live.insert(object.id(), layer);
        self.layers[layer.index()].push(object);
    }

    fn evict(&mut self, id: ObjectId) -> Option<ObjectRef> {
        let layer = self.live.remove(&id)?;
        let bucket = &mut self.layers[layer.index()];
        let position = bucket.iter().position(|live| live.id() == id)?;
        Some(bucket.remove(position))
    }

    fn clear(&mut self) -> Vec<ObjectRef> {
        self.live.clear();
        self.layers.iter_mut().flat_map(mem::take).collect()
    }

    fn contains(&self, id: ObjectId) -> bool {
        self.live.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.live.len()
    }

    fn iter(&self) -> impl Iterator<Item = (DrawLayer, &ObjectRef)> {
        DrawLayer::all().flat_map(move |layer| {
            self.layers[layer.index()]
                .iter()
                .map(move |object| (layer, object))
        })
    }
}

/// Pending admissions keyed by identity. Re-requesting an object keeps its
/// original queue position and overwrites the target layer.
#[derive(Default)]
struct PendingAdds {
    order: Vec<ObjectId>,
    entries: HashMap<ObjectId, (ObjectRef, DrawLayer)>,
}

impl PendingAdds {
    fn insert(&mut self, object: &ObjectRef, layer: DrawLayer) {
        match self.entries.entry(object.id()) {
            Entry::Occupied(mut entry) => entry.get_mut().1 = layer,
            Entry::Vacant(entry) => {
                self.order.push(object.id());
                entry.insert((object.clone(), layer));
            }
        }
    }

    fn drain(&mut self) -> Vec<(ObjectRef, DrawLayer)> {
        let mut entries = mem::take(&mut self.entries);
        self.order
            .drain(..)
            .filter_map(|id| entries.remove(&id))
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Default)]
struct PendingChanges {
    adds: PendingAdds,
    post_clear_adds: PendingAdds,
    removals: Vec<ObjectRef>,
    clear_requested: bool,
}

impl PendingChanges {
    fn is_empty(&self) -> bool {
        self.adds.is_empty()
            && self.post_clear_adds.is_empty()
            && self.removals.is_empty()
            && !self.clear_requested
    }
}

#[derive(Debug)]
pub struct ObjectRenderFailure {
    pub object: ObjectId,
    pub layer: DrawLayer,
    pub error: RenderError,
}

/// Outcome of one render pass. A failing object does not stop the pass.
#[derive(Debug, Default)]
pub struct RenderReport {
    pub rendered: usize,
    pub failures: Vec<ObjectRenderFailure>,
    pub scene_failure: Option<RenderError>,
}

impl RenderReport {
    pub fn failure_count(&self) -> usize {
        self.failures.len() + usize::from(self.scene_failure.is_some())
    }
}

/// Owner of every live game object, the running animations and the active
/// scene.
///
/// Structural changes requested through `request_*` are buffered and applied
/// in a single flush at the end of each tick pass. The tick pass and the
/// render pass iterate an immutable snapshot of the layer buckets, so hooks
/// run without any handler lock held and may freely call back into the
/// handler.
pub struct Handler {
    self_ref: Weak<Handler>,
    buckets: RwLock<Arc<LayerBuckets>>,
    pending: Mutex<PendingChanges>,
    animations: Mutex<Vec<Animation>>,
    scene: RwLock<Option<Arc<dyn Scene>>>,
    remove_queue_capacity: usize,
}

impl Handler {
    pub fn new() -> Arc<Self> {
        Self::with_remove_queue_capacity(DEFAULT_REMOVE_QUEUE_CAPACITY)
    }

    pub fn with_remove_queue_capacity(remove_queue_capacity: usize) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            buckets: RwLock::new(Arc::new(LayerBuckets::default())),
            pending: Mutex::new(PendingChanges::default()),
            animations: Mutex::new(Vec::new()),
            scene: RwLock::new(None),
            remove_queue_capacity: remove_queue_capacity.max(1),
        })
    }

    /// Queues `object` for admission to `layer` at the next flush.
    ///
    /// While a clear is pending the request goes to the post-clear set, so
    /// objects queued after [`Handler::request_clear_all`] survive the clear.
    pub fn request_add(&self, object: &ObjectRef, layer: i32) -> Result<(), HandlerError> {
        let layer = DrawLayer::new(layer)?;
        let mut pending = lock_or_recover(&self.pending, "handler.pending");
        if pending.clear_requested {
            pending.post_clear_adds.insert(object, layer);
        } else {
            pending.adds.insert(object, layer);
        }
        Ok(())
    }

    /// Like [`Handler::request_add`], but does nothing and returns `false`
    /// when the object is already live on any layer.
    pub fn request_add_unique(&self, object: &ObjectRef, layer: i32) -> Result<bool, HandlerError> {
        let layer_checked = DrawLayer::new(layer)?;
        if self.is_present(object) {
            debug!(object = %object.id(), layer = %layer_checked, "add_unique_skipped");
            return Ok(false);
        }
        self.request_add(object, layer)?;
        Ok(true)
    }

    /// Queues `object` for removal at the next flush. Never blocks and never
    /// fails towards the caller: a saturated queue is reported as a warning.
    pub fn request_remove(&self, object: &ObjectRef) {
        let mut pending = lock_or_recover(&self.pending, "handler.pending");
        if pending.removals.len() >= self.remove_queue_capacity {
            warn!(
                object = %object.id(),
                capacity = self.remove_queue_capacity,
                "remove_queue_full; removal request dropped"
            );
            return;
        }
        pending.removals.push(object.clone());
    }

    /// Requests that every live object be removed at the next flush.
    pub fn request_clear_all(&self) {
        lock_or_recover(&self.pending, "handler.pending").clear_requested = true;
    }

    pub fn is_clear_pending(&self) -> bool {
        lock_or_recover(&self.pending, "handler.pending").clear_requested
    }

    /// Empties every layer right now, bypassing the pending queues.
    ///
    /// Meant for the end of a tick or for shutdown. A tick or render pass
    /// that is already underway keeps iterating the snapshot it started with,
    /// so objects cleared mid-pass still receive that pass's hooks.
    pub fn clear_all_immediate(&self) {
        let evicted = {
            let mut buckets = write_or_recover(&self.buckets, "handler.buckets");
            Arc::make_mut(&mut *buckets).clear()
        };
        for object in &evicted {
            object.unbind();
        }
        debug!(evicted = evicted.len(), "layers_cleared_immediately");
    }

    /// Installs `scene` as the active scene and runs its initialiser.
    ///
    /// With `clear_first`, a clear is requested before the initialiser runs,
    /// so everything the new scene adds lands in the post-clear set and
    /// survives the flush that wipes the previous scene's objects.
    pub fn set_active_scene(&self, scene: Arc<dyn Scene>, clear_first: bool) {
        if clear_first {
            self.request_clear_all();
        }
        *write_or_recover(&self.scene, "handler.scene") = Some(Arc::clone(&scene));
        info!(scene = scene.debug_name(), clear_first, "scene_activated");
        scene.initialise(self);
    }

    pub fn active_scene(&self) -> Option<Arc<dyn Scene>> {
        read_or_recover(&self.scene, "handler.scene").clone()
    }

    pub fn is_present(&self, object: &ObjectRef) -> bool {
        self.snapshot().contains(object.id())
    }

    pub fn live_count(&self) -> usize {
        self.snapshot().len()
    }

    pub fn layer_len(&self, layer: DrawLayer) -> usize {
        self.snapshot().layers[layer.index()].len()
    }

    /// Live objects of `layer` in tick/render order.
    pub fn layer_snapshot(&self, layer: DrawLayer) -> Vec<ObjectRef> {
        self.snapshot().layers[layer.index()].clone()
    }

    /// Prefer [`Animation::start`], which keeps the animation's own state in sync.
    pub fn register_animation(&self, animation: &Animation) {
        lock_or_recover(&self.animations, "handler.animations").push(animation.clone());
    }

    /// Prefer [`Animation::stop`]. Returns whether the animation was registered.
    pub fn unregister_animation(&self, animation: &Animation) -> bool {
        let mut animations = lock_or_recover(&self.animations, "handler.animations");
        match animations.iter().position(|running| running.same_as(animation)) {
            Some(position) => {
                animations.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn animation_count(&self) -> usize {
        lock_or_recover(&self.animations, "handler.animations").len()
    }

    /// One simulation step: object ticks in layer order, animation advance,
    /// scene tick, then the flush. Driven by the simulation clock.
    ///
    /// Objects queued for admission during the pass are not ticked until the
    /// next pass; they only become live in the flush.
    pub fn tick_pass(&self, input: &InputSampler, engine: &EngineContext) {
        let snapshot = self.snapshot();
        let ctx = TickContext::new(self, input, engine, engine.ticks_passed());

        for (_, object) in snapshot.iter() {
            object.tick(&ctx.for_object(object));
        }
        drop(snapshot);

        for animation in lock_or_recover(&self.animations, "handler.animations").iter() {
            animation.advance();
        }

        if let Some(scene) = self.active_scene() {
            scene.tick(&ctx);
        }

        self.flush();
    }

    /// One frame: object renders in layer order, then the scene. Performs no
    /// structural change. Driven by the render clock.
    pub fn render_pass(&self, draw: &mut Draw<'_>) -> RenderReport {
        let snapshot = self.snapshot();
        let mut report = RenderReport::default();

        for (layer, object) in snapshot.iter() {
            match object.render(draw) {
                Ok(()) => report.rendered += 1,
                Err(error) => report.failures.push(ObjectRenderFailure {
                    object: object.id(),
                    layer,
                    error,
                }),
            }
        }

        if let Some(scene) = self.active_scene() {
            if let Err(error) = scene.render(draw) {
                report.scene_failure = Some(error);
            }
        }

        report
    }

    pub(crate) fn downgrade(&self) -> Weak<Handler> {
        self.self_ref.clone()
    }

    fn snapshot(&self) -> Arc<LayerBuckets> {
        Arc::clone(&read_or_recover(&self.buckets, "handler.buckets"))
    }

    /// Applies queued changes: removals, admissions, then a pending clear
    /// followed by the post-clear admissions.
    fn flush(&self) {
        let mut changes = {
            let mut pending = lock_or_recover(&self.pending, "handler.pending");
            if pending.is_empty() {
                return;
            }
            mem::take(&mut *pending)
        };

        let mut evicted = Vec::new();
        let mut admitted = Vec::new();
        {
            let mut guard = write_or_recover(&self.buckets, "handler.buckets");
            let buckets = Arc::make_mut(&mut *guard);

            let mut seen = HashSet::new();
            for object in changes.removals.drain(..) {
                if seen.insert(object.id()) {
                    if let Some(removed) = buckets.evict(object.id()) {
                        evicted.push(removed);
                    }
                }
            }

            for (object, layer) in changes.adds.drain() {
                buckets.admit(object.clone(), layer);
                admitted.push((object, layer));
            }

            if changes.clear_requested {
                evicted.extend(buckets.clear());
                admitted.clear();
                for (object, layer) in changes.post_clear_adds.drain() {
                    buckets.admit(object.clone(), layer);
                    admitted.push((object, layer));
                }
            }
        }

        for object in &evicted {
            object.unbind();
        }
        for (object, layer) in admitted {
            object.bind(self.downgrade(), layer);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::app::rendering::NullBackend;
    use crate::app::test_support::{harness, Harness};
    use crate::app::GameObject;

    type TickAction = Box<dyn Fn(&TickContext<'_>) + Send + Sync>;

    #[derive(Default)]
    struct Recorder {
        ticks: AtomicUsize,
        on_tick: Mutex<Option<TickAction>>,
        render_log: Option<Arc<Mutex<Vec<&'static str>>>>,
        label: &'static str,
        fail_render: bool,
    }

    impl Recorder {
        fn ticks(&self) -> usize {
            self.ticks.load(Ordering::SeqCst)
        }

        fn set_on_tick(&self, action: impl Fn(&TickContext<'_>) + Send + Sync + 'static) {
            *self.on_tick.lock().expect("on_tick") = Some(Box::new(action));
        }
    }

    impl GameObject for Recorder {
        fn tick(&self, ctx: &TickContext<'_>) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            if let Some(action) = self.on_tick.lock().expect("on_tick").as_ref() {
                action(ctx);
            }
        }

        fn render(&self, _draw: &mut Draw<'_>) -> Result<(), RenderError> {
            if let Some(log) = &self.render_log {
                log.lock().expect("render log").push(self.label);
            }
            if self.fail_render {
                return Err(RenderError::Object(format!("{} failed", self.label)));
            }
            Ok(())
        }
    }

    fn recorder() -> (Arc<Recorder>, ObjectRef) {
        let recorder = Arc::new(Recorder::default());
        let object = ObjectRef::from_shared(recorder.clone());
        (recorder, object)
    }

    fn logging_recorder(
        label: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        fail_render: bool,
    ) -> ObjectRef {
        ObjectRef::new(Recorder {
            render_log: Some(Arc::clone(log)),
            label,
            fail_render,
            ..Recorder::default()
        })
    }

    fn tick(h: &Harness) {
        h.handler.tick_pass(&h.input, &h.engine);
        h.engine.record_tick();
    }

    #[test]
    fn layer_bounds_are_validated_at_request_time() {
        let h = harness();
        let (_, object) = recorder();

        assert_eq!(
            h.handler.request_add(&object, 10),
            Err(HandlerError::LayerOutOfBounds { layer: 10 })
        );
        assert_eq!(
            h.handler.request_add(&object, -1),
            Err(HandlerError::LayerOutOfBounds { layer: -1 })
        );
        assert!(h.handler.request_add(&object, 0).is_ok());
        assert!(h.handler.request_add(&object, 9).is_ok());
    }

    #[test]
    fn out_of_bounds_error_names_the_rejected_layer() {
        let error = DrawLayer::new(42).expect_err("layer 42 is invalid");
        assert_eq!(error.to_string(), "draw layer 42 out of bounds for 10 layers");
    }

    #[test]
    fn requests_only_take_effect_at_flush() {
        let h = harness();
        let (_, object) = recorder();
        h.handler.request_add(&object, 3).expect("add");

        assert!(!h.handler.is_present(&object));
        assert!(object.layer().is_none());

        tick(&h);

        assert!(h.handler.is_present(&object));
        assert_eq!(object.layer(), Some(DrawLayer::new(3).expect("layer")));
        assert!(object.handler().is_some());
    }

    #[test]
    fn mutations_requested_mid_tick_are_invisible_until_flush() {
        let h = harness();
        let (watcher_recorder, watcher) = recorder();
        let (_, newcomer) = recorder();
        h.handler.request_add(&watcher, 0).expect("add watcher");
        tick(&h);

        let observations = Arc::new(Mutex::new(Vec::new()));
        {
            let newcomer = newcomer.clone();
            let watcher = watcher.clone();
            let observations = Arc::clone(&observations);
            watcher_recorder.set_on_tick(move |ctx| {
                let handler = ctx.handler();
                if ctx.tick_index() == 1 {
                    handler.request_clear_all();
                    handler.request_add(&newcomer, 1).expect("add newcomer");
                    handler.request_remove(&watcher);
                }
                observations.lock().expect("observations").push((
                    handler.is_present(&newcomer),
                    handler.is_present(&watcher),
                    handler.live_count(),
                ));
            });
        }

        tick(&h);

        assert_eq!(
            *observations.lock().expect("observations"),
            vec![(false, true, 1)]
        );
        assert!(!h.handler.is_present(&watcher));
        assert!(h.handler.is_present(&newcomer));
    }

    #[test]
    fn object_added_mid_tick_is_ticked_from_the_next_tick() {
        let h = harness();
        let (spawner_recorder, spawner) = recorder();
        let (child_recorder, child) = recorder();
        h.handler.request_add(&spawner, 5).expect("add spawner");
        tick(&h);

        {
            let child = child.clone();
            spawner_recorder.set_on_tick(move |ctx| {
                if ctx.tick_index() == 1 {
                    ctx.handler().request_add(&child, 0).expect("add child");
                }
            });
        }

        tick(&h);
        assert_eq!(child_recorder.ticks(), 0);
        assert!(h.handler.is_present(&child));

        tick(&h);
        assert_eq!(child_recorder.ticks(), 1);
        // The spawner went live at the first tick's flush, so that tick
        // skipped it.
        assert_eq!(spawner_recorder.ticks(), 2);
    }

    #[test]
    fn add_unique_skips_objects_live_on_any_layer() {
        let h = harness();
        let (_, object) = recorder();
        h.handler.request_add(&object, 2).expect("add");
        tick(&h);

        assert_eq!(h.handler.request_add_unique(&object, 7), Ok(false));
        tick(&h);

        assert_eq!(h.handler.layer_len(DrawLayer::new(2).expect("layer")), 1);
        assert_eq!(h.handler.layer_len(DrawLayer::new(7).expect("layer")), 0);
        assert_eq!(object.layer(), Some(DrawLayer::new(2).expect("layer")));
    }

    #[test]
    fn add_unique_adds_objects_that_are_not_live() {
        let h = harness();
        let (_, object) = recorder();

        assert_eq!(h.handler.request_add_unique(&object, 4), Ok(true));
        tick(&h);
        assert_eq!(object.layer(), Some(DrawLayer::new(4).expect("layer")));
        assert!(h.handler.request_add_unique(&object, 11).is_err());
    }

    #[test]
    fn clear_then_add_in_same_tick_keeps_only_the_new_object() {
        let h = harness();
        let (_, old_a) = recorder();
        let (_, old_b) = recorder();
        let (_, fresh) = recorder();
        h.handler.request_add(&old_a, 0).expect("add");
        h.handler.request_add(&old_b, 9).expect("add");
        tick(&h);

        h.handler.request_clear_all();
        h.handler.request_add(&fresh, 6).expect("add");
        tick(&h);

        assert_eq!(h.handler.live_count(), 1);
        assert!(h.handler.is_present(&fresh));
        assert_eq!(fresh.layer(), Some(DrawLayer::new(6).expect("layer")));
        assert!(old_a.layer().is_none());
        assert!(!h.handler.is_clear_pending());
    }

    #[test]
    fn adds_queued_before_a_clear_are_wiped_by_it() {
        let h = harness();
        let (_, early) = recorder();
        let (_, late) = recorder();

        h.handler.request_add(&early, 1).expect("add");
        h.handler.request_clear_all();
        h.handler.request_add(&late, 1).expect("add");
        tick(&h);

        assert!(!h.handler.is_present(&early));
        assert!(h.handler.is_present(&late));
    }

    #[test]
    fn repeated_add_requests_keep_the_last_layer() {
        let h = harness();
        let (_, object) = recorder();
        h.handler.request_add(&object, 1).expect("add");
        h.handler.request_add(&object, 8).expect("add");
        tick(&h);

        assert_eq!(h.handler.live_count(), 1);
        assert_eq!(object.layer(), Some(DrawLayer::new(8).expect("layer")));
    }

    #[test]
    fn readding_a_live_object_moves_it_instead_of_duplicating() {
        let h = harness();
        let (_, object) = recorder();
        h.handler.request_add(&object, 1).expect("add");
        tick(&h);
        h.handler.request_add(&object, 3).expect("add again");
        tick(&h);

        assert_eq!(h.handler.live_count(), 1);
        assert_eq!(h.handler.layer_len(DrawLayer::new(1).expect("layer")), 0);
        assert_eq!(h.handler.layer_len(DrawLayer::new(3).expect("layer")), 1);
    }

    #[test]
    fn duplicate_removals_are_applied_once() {
        let h = harness();
        let (_, doomed) = recorder();
        let (_, survivor) = recorder();
        h.handler.request_add(&doomed, 0).expect("add");
        h.handler.request_add(&survivor, 0).expect("add");
        tick(&h);

        h.handler.request_remove(&doomed);
        h.handler.request_remove(&doomed);
        h.handler.request_remove(&doomed);
        tick(&h);

        assert_eq!(h.handler.live_count(), 1);
        assert!(h.handler.is_present(&survivor));
        assert!(doomed.layer().is_none());
        assert!(doomed.handler().is_none());
    }

    #[test]
    fn removing_an_object_that_is_not_live_is_harmless() {
        let h = harness();
        let (_, stranger) = recorder();
        h.handler.request_remove(&stranger);
        tick(&h);
        assert_eq!(h.handler.live_count(), 0);
    }

    #[test]
    fn saturated_remove_queue_drops_requests_without_failing() {
        let h = harness();
        let handler = Handler::with_remove_queue_capacity(1);
        let (_, first) = recorder();
        let (_, second) = recorder();
        handler.request_add(&first, 0).expect("add");
        handler.request_add(&second, 0).expect("add");
        handler.tick_pass(&h.input, &h.engine);

        handler.request_remove(&first);
        handler.request_remove(&second);
        handler.tick_pass(&h.input, &h.engine);

        assert!(!handler.is_present(&first));
        assert!(handler.is_present(&second));
    }

    #[test]
    fn self_removal_through_the_back_reference() {
        let h = harness();
        let (recorder_state, object) = recorder();
        recorder_state.set_on_tick(|ctx| {
            let this = ctx.this().expect("object tick has a self reference");
            if let Some(handler) = this.handler() {
                handler.request_remove(this);
            }
        });
        h.handler.request_add(&object, 2).expect("add");
        tick(&h);
        assert!(h.handler.is_present(&object));

        tick(&h);
        assert!(!h.handler.is_present(&object));
        assert_eq!(recorder_state.ticks(), 1);
    }

    #[test]
    fn clear_all_immediate_empties_every_layer_at_once() {
        let h = harness();
        let (_, a) = recorder();
        let (_, b) = recorder();
        h.handler.request_add(&a, 0).expect("add");
        h.handler.request_add(&b, 9).expect("add");
        tick(&h);

        h.handler.clear_all_immediate();

        assert_eq!(h.handler.live_count(), 0);
        assert!(a.layer().is_none());
        assert!(b.handler().is_none());
    }

    #[test]
    fn render_pass_walks_layers_bottom_to_top_in_insertion_order() {
        let h = harness();
        let log = Arc::new(Mutex::new(Vec::new()));
        let top = logging_recorder("top", &log, false);
        let bottom_first = logging_recorder("bottom_first", &log, false);
        let bottom_second = logging_recorder("bottom_second", &log, false);
        h.handler.request_add(&top, 9).expect("add");
        h.handler.request_add(&bottom_first, 0).expect("add");
        h.handler.request_add(&bottom_second, 0).expect("add");
        tick(&h);

        let mut backend = NullBackend::default();
        let report = h.handler.render_pass(&mut Draw::new(&mut backend, 1.0));

        assert_eq!(report.rendered, 3);
        assert_eq!(
            *log.lock().expect("log"),
            vec!["bottom_first", "bottom_second", "top"]
        );
    }

    #[test]
    fn failing_object_does_not_stop_the_render_pass() {
        let h = harness();
        let log = Arc::new(Mutex::new(Vec::new()));
        let broken = logging_recorder("broken", &log, true);
        let healthy = logging_recorder("healthy", &log, false);
        h.handler.request_add(&broken, 1).expect("add");
        h.handler.request_add(&healthy, 2).expect("add");
        tick(&h);

        let mut backend = NullBackend::default();
        let report = h.handler.render_pass(&mut Draw::new(&mut backend, 1.0));

        assert_eq!(report.rendered, 1);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failures[0].object, broken.id());
        assert_eq!(*log.lock().expect("log"), vec!["broken", "healthy"]);
    }

    #[test]
    fn render_pass_leaves_pending_changes_alone() {
        let h = harness();
        let (_, object) = recorder();
        h.handler.request_add(&object, 0).expect("add");

        let mut backend = NullBackend::default();
        let _ = h.handler.render_pass(&mut Draw::new(&mut backend, 1.0));

        assert!(!h.handler.is_present(&object));
    }

    /// Records its label on render and reads handler state from the render
    /// thread while doing so.
    struct Census {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        handler: Weak<Handler>,
    }

    impl GameObject for Census {
        fn render(&self, _draw: &mut Draw<'_>) -> Result<(), RenderError> {
            if let Some(handler) = self.handler.upgrade() {
                let _ = handler.live_count();
                let _ = handler.is_clear_pending();
            }
            self.log.lock().expect("census log").push(self.label);
            Ok(())
        }
    }

    #[test]
    fn concurrent_render_passes_see_whole_flushes_only() {
        const ROUNDS: usize = 400;
        let h = harness();
        let log = Arc::new(Mutex::new(Vec::new()));
        let census = |label, count| -> Vec<ObjectRef> {
            (0..count)
                .map(|_| {
                    ObjectRef::new(Census {
                        label,
                        log: Arc::clone(&log),
                        handler: Arc::downgrade(&h.handler),
                    })
                })
                .collect()
        };
        let first = census("first", 4);
        let second = census("second", 6);
        let admit = |population: &[ObjectRef], base: i32| {
            for (index, object) in population.iter().enumerate() {
                h.handler
                    .request_add(object, base + index as i32)
                    .expect("add");
            }
        };

        admit(&first, 0);
        tick(&h);

        let stop = AtomicBool::new(false);
        let passes = thread::scope(|scope| {
            let renderer = scope.spawn(|| {
                let mut backend = NullBackend::default();
                let mut passes = 0usize;
                loop {
                    let last = stop.load(Ordering::SeqCst);
                    log.lock().expect("census log").clear();
                    let report = h.handler.render_pass(&mut Draw::new(&mut backend, 1.0));
                    let seen = mem::take(&mut *log.lock().expect("census log"));
                    let whole_first = seen.len() == 4 && seen.iter().all(|l| *l == "first");
                    let whole_second = seen.len() == 6 && seen.iter().all(|l| *l == "second");
                    assert!(whole_first || whole_second, "mixed pass: {seen:?}");
                    assert_eq!(report.rendered, seen.len());
                    passes += 1;
                    if last {
                        break passes;
                    }
                }
            });

            for round in 0..ROUNDS {
                if round % 2 == 0 {
                    // first -> second through removals and plain adds
                    for object in &first {
                        h.handler.request_remove(object);
                    }
                    admit(&second, 2);
                } else {
                    // second -> first through a clear and post-clear adds
                    h.handler.request_clear_all();
                    admit(&first, 0);
                }
                tick(&h);
            }

            stop.store(true, Ordering::SeqCst);
            renderer.join().expect("render thread")
        });

        assert!(passes > 0);
        assert_eq!(h.handler.live_count(), 4);
        assert!(first.iter().all(|object| h.handler.is_present(object)));
    }
}
