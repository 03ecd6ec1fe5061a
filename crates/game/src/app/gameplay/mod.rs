use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use twinloop::{EngineContext, Scene};

mod objects;
mod scenes;

use scenes::{ArenaScene, DemoAssets};

/// Demo objects keep plain state behind mutexes; a panic in one tick must not
/// wedge every later frame.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn build_scene(engine: &Arc<EngineContext>) -> Arc<dyn Scene> {
    let assets = DemoAssets::new(engine.tick_rate(), engine.display_context().base_size());
    Arc::new(ArenaScene::new(assets))
}
