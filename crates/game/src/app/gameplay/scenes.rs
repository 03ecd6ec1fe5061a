use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};
use twinloop::{
    Animation, Color, Draw, Handler, Key, ObjectRef, Point, Rect, RenderError, RenderRate,
    Rgba, RgbaImage, Scene, TickContext,
};

use super::lock;
use super::objects::{Body, Bouncer, Hud, Player, Spinner};

pub(crate) const SPINNER_LAYER: i32 = 1;
pub(crate) const BOUNCER_LAYER: i32 = 3;
pub(crate) const PLAYER_LAYER: i32 = 5;
pub(crate) const HUD_LAYER: i32 = 9;

pub(crate) const INITIAL_BOUNCERS: u64 = 4;
pub(crate) const BOUNCER_LIFETIME_SECONDS: f64 = 12.0;
const PLAYER_SPEED: f64 = 180.0;
const SPINNER_FRAMES: usize = 8;
const SPINNER_FRAME_SIZE: u32 = 16;

const PALETTE: [Color; 4] = [Color::RED, Color::GREEN, Color::BLUE, Color::YELLOW];

/// Data shared by every scene instance for the whole run.
pub(crate) struct DemoAssets {
    tick_rate: f64,
    arena: (f64, f64),
    spinner_frames: Vec<Arc<RgbaImage>>,
}

impl DemoAssets {
    pub(crate) fn new(tick_rate: f64, arena: (u32, u32)) -> Arc<Self> {
        Arc::new(Self {
            tick_rate,
            arena: (f64::from(arena.0), f64::from(arena.1)),
            spinner_frames: spinner_frames(SPINNER_FRAMES, SPINNER_FRAME_SIZE)
                .into_iter()
                .map(Arc::new)
                .collect(),
        })
    }

    #[cfg(test)]
    pub(crate) fn spinner_frame_count(&self) -> usize {
        self.spinner_frames.len()
    }

    fn spinner(&self, fps: f64) -> Option<Animation> {
        match Animation::from_shared_frames(self.spinner_frames.clone(), self.tick_rate, fps) {
            Ok(animation) => Some(animation),
            Err(error) => {
                warn!(error = %error, "spinner_unavailable");
                None
            }
        }
    }
}

/// A rotating bar, one frame per `PI / frames` step.
pub(crate) fn spinner_frames(frames: usize, size: u32) -> Vec<RgbaImage> {
    let center = f64::from(size) / 2.0 - 0.5;
    let radius = f64::from(size) / 2.0;
    (0..frames)
        .map(|frame| {
            let angle = PI * frame as f64 / frames as f64;
            let (sin, cos) = angle.sin_cos();
            RgbaImage::from_fn(size, size, |x, y| {
                let dx = f64::from(x) - center;
                let dy = f64::from(y) - center;
                let across = (dx * sin - dy * cos).abs();
                if across <= 1.0 && dx.hypot(dy) <= radius {
                    Rgba([240, 240, 255, 255])
                } else {
                    Rgba([0, 0, 0, 0])
                }
            })
        })
        .collect()
}

/// Keys every scene answers to: quit, fullscreen, render rate and verbose
/// render errors.
fn handle_common_keys(ctx: &TickContext<'_>) {
    let input = ctx.input();
    let engine = ctx.engine();

    if input.key_pressed(Key::Escape) {
        engine.request_shutdown();
    }
    if input.key_pressed(Key::F11) {
        if let Err(error) = engine.display().toggle_fullscreen(0) {
            warn!(error = %error, "fullscreen_toggle_failed");
        }
    }
    if input.key_pressed(Key::R) {
        let display = engine.display_context();
        match next_render_rate(display.render_rate()) {
            RenderRate::Monitor => display.reset_render_rate(),
            rate => display.set_render_rate(rate),
        }
    }
    if input.key_pressed(Key::F3) {
        let display = engine.display_context();
        let show = !display.show_render_errors();
        display.set_show_render_errors(show);
        info!(show, "render_error_detail_toggled");
    }
}

/// Monitor, then a fixed 30 fps, then unlimited, then back.
pub(crate) fn next_render_rate(current: RenderRate) -> RenderRate {
    match current {
        RenderRate::Monitor => RenderRate::Fixed(30.0),
        RenderRate::Fixed(_) => RenderRate::Unlimited,
        RenderRate::Unlimited => RenderRate::Monitor,
    }
}

fn add_or_warn(handler: &Handler, object: &ObjectRef, layer: i32) {
    if let Err(error) = handler.request_add(object, layer) {
        warn!(error = %error, "demo_object_rejected");
    }
}

/// Bouncing boxes and a steerable player. Space adds a box, Backspace
/// removes the oldest, Enter switches to the gallery.
pub(crate) struct ArenaScene {
    assets: Arc<DemoAssets>,
    bouncers: Mutex<VecDeque<(ObjectRef, Arc<Bouncer>)>>,
    spawned: AtomicU64,
    spinner: Mutex<Option<Animation>>,
}

impl ArenaScene {
    pub(crate) fn new(assets: Arc<DemoAssets>) -> Self {
        Self {
            assets,
            bouncers: Mutex::new(VecDeque::new()),
            spawned: AtomicU64::new(0),
            spinner: Mutex::new(None),
        }
    }

    fn spawn_bouncer(&self, handler: &Handler) {
        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        let (width, height) = self.assets.arena;
        let lifetime_ticks = (BOUNCER_LIFETIME_SECONDS * self.assets.tick_rate) as u64;
        let bouncer = Arc::new(Bouncer::new(
            bouncer_body(index, width, height),
            PALETTE[(index % PALETTE.len() as u64) as usize],
            lifetime_ticks,
        ));
        let object = ObjectRef::from_shared(bouncer.clone());
        add_or_warn(handler, &object, BOUNCER_LAYER);

        let mut bouncers = lock(&self.bouncers);
        bouncers.retain(|(_, bouncer)| !bouncer.expired());
        bouncers.push_back((object, bouncer));
    }

    #[cfg(test)]
    pub(crate) fn tracked_bouncers(&self) -> usize {
        lock(&self.bouncers).len()
    }

    fn remove_oldest(&self, handler: &Handler) {
        let mut bouncers = lock(&self.bouncers);
        while let Some((object, _)) = bouncers.pop_front() {
            if handler.is_present(&object) {
                handler.request_remove(&object);
                return;
            }
        }
    }

    fn stop_spinner(&self) {
        if let Some(animation) = lock(&self.spinner).take() {
            animation.stop();
        }
    }
}

/// Deterministic spread of start positions, speeds and directions.
pub(crate) fn bouncer_body(index: u64, width: f64, height: f64) -> Body {
    let size = 12.0 + (index % 3) as f64 * 6.0;
    let x = (index * 53) as f64 % (width - size).max(1.0);
    let y = (index * 97) as f64 % (height - size).max(1.0);
    let speed_x = 60.0 + ((index * 37) % 120) as f64;
    let speed_y = 50.0 + ((index * 71) % 110) as f64;
    let sign_x = if index % 2 == 0 { 1.0 } else { -1.0 };
    let sign_y = if index % 4 < 2 { 1.0 } else { -1.0 };
    Body {
        rect: Rect::new(x, y, size, size),
        velocity: Point::new(speed_x * sign_x, speed_y * sign_y),
    }
}

impl Scene for ArenaScene {
    fn initialise(&self, handler: &Handler) {
        let (width, height) = self.assets.arena;

        if let Some(animation) = self.assets.spinner(12.0) {
            animation.start(handler);
            let spinner = ObjectRef::new(Spinner::new(
                animation.clone(),
                Rect::new(width - 40.0, 24.0, 32.0, 32.0),
                0.8,
            ));
            add_or_warn(handler, &spinner, SPINNER_LAYER);
            *lock(&self.spinner) = Some(animation);
        }

        for _ in 0..INITIAL_BOUNCERS {
            self.spawn_bouncer(handler);
        }

        let player = ObjectRef::new(Player::new(
            Point::new(width / 2.0, height / 2.0),
            PLAYER_SPEED,
        ));
        add_or_warn(handler, &player, PLAYER_LAYER);
        add_or_warn(handler, &ObjectRef::new(Hud::new("arena")), HUD_LAYER);
    }

    fn tick(&self, ctx: &TickContext<'_>) {
        let input = ctx.input();
        let handler = ctx.handler();

        if input.key_pressed(Key::Space) {
            self.spawn_bouncer(handler);
        }
        if input.key_pressed(Key::Backspace) {
            self.remove_oldest(handler);
        }
        handle_common_keys(ctx);

        if input.key_pressed(Key::Enter) {
            self.stop_spinner();
            handler.set_active_scene(Arc::new(GalleryScene::new(Arc::clone(&self.assets))), true);
        }
    }

    fn render(&self, draw: &mut Draw<'_>) -> Result<(), RenderError> {
        let (width, height) = self.assets.arena;
        draw.rect(Rect::new(0.0, 0.0, width - 1.0, height - 1.0), Color::GRAY);
        Ok(())
    }

    fn debug_name(&self) -> &'static str {
        "arena"
    }
}

/// One large animation. Enter goes back to a fresh arena.
pub(crate) struct GalleryScene {
    assets: Arc<DemoAssets>,
    animation: Mutex<Option<Animation>>,
}

impl GalleryScene {
    pub(crate) fn new(assets: Arc<DemoAssets>) -> Self {
        Self {
            assets,
            animation: Mutex::new(None),
        }
    }
}

impl Scene for GalleryScene {
    fn initialise(&self, handler: &Handler) {
        let (width, height) = self.assets.arena;
        if let Some(animation) = self.assets.spinner(6.0) {
            animation.start(handler);
            let side = height / 2.0;
            let spinner = ObjectRef::new(Spinner::new(
                animation.clone(),
                Rect::centered(Point::new(width / 2.0, height / 2.0), side, side),
                1.0,
            ));
            add_or_warn(handler, &spinner, SPINNER_LAYER);
            *lock(&self.animation) = Some(animation);
        }
        add_or_warn(handler, &ObjectRef::new(Hud::new("gallery")), HUD_LAYER);
    }

    fn tick(&self, ctx: &TickContext<'_>) {
        handle_common_keys(ctx);
        if ctx.input().key_pressed(Key::Enter) {
            if let Some(animation) = lock(&self.animation).take() {
                animation.stop();
            }
            ctx.handler().set_active_scene(
                Arc::new(ArenaScene::new(Arc::clone(&self.assets))),
                true,
            );
        }
    }

    fn render(&self, draw: &mut Draw<'_>) -> Result<(), RenderError> {
        let (width, height) = self.assets.arena;
        draw.centered_text("gallery", width / 2.0, height / 8.0, 16.0, Color::WHITE);
        Ok(())
    }

    fn debug_name(&self) -> &'static str {
        "gallery"
    }
}
