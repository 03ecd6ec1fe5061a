use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use twinloop::{
    Animation, Color, Draw, GameObject, InputSampler, Key, LoopMetricsSnapshot, MouseButton,
    Point, Rect, RenderError, TickContext,
};

use super::lock;

const HUD_TEXT_SIZE: f64 = 10.0;
const HUD_MARGIN: f64 = 8.0;
const HELP_TEXT: &str =
    "space add  backspace remove  enter switch  r rate  f11 fullscreen  esc quit";

/// Axis-aligned box moving at a constant speed in pixels per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Body {
    pub(crate) rect: Rect,
    pub(crate) velocity: Point,
}

/// Advances `body` by `dt` seconds and reflects it off the edges of a
/// `width` x `height` arena.
pub(crate) fn step_body(body: &mut Body, dt: f64, width: f64, height: f64) {
    body.rect.x += body.velocity.x * dt;
    body.rect.y += body.velocity.y * dt;

    let max_x = (width - body.rect.width).max(0.0);
    let max_y = (height - body.rect.height).max(0.0);
    if body.rect.x < 0.0 || body.rect.x > max_x {
        body.rect.x = body.rect.x.clamp(0.0, max_x);
        body.velocity.x = -body.velocity.x;
    }
    if body.rect.y < 0.0 || body.rect.y > max_y {
        body.rect.y = body.rect.y.clamp(0.0, max_y);
        body.velocity.y = -body.velocity.y;
    }
}

/// A box that bounces around the arena and removes itself when its lifetime
/// runs out.
pub(crate) struct Bouncer {
    body: Mutex<Body>,
    color: Color,
    lifetime_ticks: u64,
    age: AtomicU64,
}

impl Bouncer {
    pub(crate) fn new(body: Body, color: Color, lifetime_ticks: u64) -> Self {
        Self {
            body: Mutex::new(body),
            color,
            lifetime_ticks: lifetime_ticks.max(1),
            age: AtomicU64::new(0),
        }
    }

    pub(crate) fn body(&self) -> Body {
        *lock(&self.body)
    }

    /// True once the bouncer has asked to be removed.
    pub(crate) fn expired(&self) -> bool {
        self.age.load(Ordering::Relaxed) >= self.lifetime_ticks
    }
}

impl GameObject for Bouncer {
    fn tick(&self, ctx: &TickContext<'_>) {
        let age = self.age.fetch_add(1, Ordering::Relaxed) + 1;
        if age >= self.lifetime_ticks {
            if let Some(this) = ctx.this() {
                ctx.handler().request_remove(this);
            }
            return;
        }

        let (width, height) = ctx.engine().display_context().base_size();
        step_body(
            &mut lock(&self.body),
            ctx.tick_seconds(),
            f64::from(width),
            f64::from(height),
        );
    }

    fn render(&self, draw: &mut Draw<'_>) -> Result<(), RenderError> {
        let body = self.body();
        draw.fill_rect(body.rect, self.color);
        draw.rect(body.rect, Color::WHITE);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct PlayerState {
    position: Point,
    radius: f64,
}

/// Circle steered with WASD or the arrow keys. A left click teleports it to
/// the cursor and the wheel changes its size.
pub(crate) struct Player {
    state: Mutex<PlayerState>,
    speed: f64,
}

pub(crate) const PLAYER_MIN_RADIUS: f64 = 4.0;
pub(crate) const PLAYER_MAX_RADIUS: f64 = 40.0;

impl Player {
    pub(crate) fn new(position: Point, speed: f64) -> Self {
        Self {
            state: Mutex::new(PlayerState {
                position,
                radius: 12.0,
            }),
            speed,
        }
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> Point {
        lock(&self.state).position
    }

    #[cfg(test)]
    pub(crate) fn radius(&self) -> f64 {
        lock(&self.state).radius
    }
}

/// Unit-free steering direction from the held movement keys.
pub(crate) fn steering(input: &InputSampler) -> Point {
    let axis = |negative: [Key; 2], positive: [Key; 2]| {
        let held = |keys: [Key; 2]| keys.iter().any(|key| input.key_held(*key));
        f64::from(u8::from(held(positive))) - f64::from(u8::from(held(negative)))
    };
    Point::new(
        axis([Key::A, Key::Left], [Key::D, Key::Right]),
        axis([Key::W, Key::Up], [Key::S, Key::Down]),
    )
}

impl GameObject for Player {
    fn tick(&self, ctx: &TickContext<'_>) {
        let input = ctx.input();
        let (width, height) = ctx.engine().display_context().base_size();
        let step = self.speed * ctx.tick_seconds();
        let direction = steering(input);

        let mut state = lock(&self.state);
        if input.button_pressed(MouseButton::Left) {
            state.position = input.cursor();
        } else {
            state.position.x += direction.x * step;
            state.position.y += direction.y * step;
        }
        state.position.x = state.position.x.clamp(0.0, f64::from(width));
        state.position.y = state.position.y.clamp(0.0, f64::from(height));

        let scroll = input.scroll_amount();
        if scroll != 0.0 {
            state.radius =
                (state.radius - scroll * 2.0).clamp(PLAYER_MIN_RADIUS, PLAYER_MAX_RADIUS);
        }
    }

    fn render(&self, draw: &mut Draw<'_>) -> Result<(), RenderError> {
        let state = *lock(&self.state);
        draw.fill_circle(state.position, state.radius, Color::YELLOW);
        draw.circle(state.position, state.radius, Color::BLACK);
        Ok(())
    }
}

/// Draws the current frame of an animation into a fixed rectangle.
pub(crate) struct Spinner {
    animation: Animation,
    bounds: Rect,
    opacity: f32,
}

impl Spinner {
    pub(crate) fn new(animation: Animation, bounds: Rect, opacity: f32) -> Self {
        Self {
            animation,
            bounds,
            opacity,
        }
    }
}

impl GameObject for Spinner {
    fn render(&self, draw: &mut Draw<'_>) -> Result<(), RenderError> {
        let frame = self.animation.current_frame();
        let bounds = self.bounds;
        draw.with_opacity(self.opacity, |draw| draw.image(&frame, bounds));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct HudState {
    metrics: LoopMetricsSnapshot,
    live_objects: usize,
    tick: u64,
    base_height: f64,
}

/// Throughput readout and key help, refreshed once per tick.
pub(crate) struct Hud {
    scene_name: &'static str,
    state: Mutex<HudState>,
}

impl Hud {
    pub(crate) fn new(scene_name: &'static str) -> Self {
        Self {
            scene_name,
            state: Mutex::new(HudState::default()),
        }
    }

    pub(crate) fn status_line(&self) -> String {
        let state = *lock(&self.state);
        format!(
            "{}  tps {:.0}  fps {:.0}  objects {}  tick {}",
            self.scene_name,
            state.metrics.tps,
            state.metrics.fps,
            state.live_objects,
            state.tick
        )
    }
}

impl GameObject for Hud {
    fn tick(&self, ctx: &TickContext<'_>) {
        *lock(&self.state) = HudState {
            metrics: ctx.engine().metrics().snapshot(),
            live_objects: ctx.handler().live_count(),
            tick: ctx.tick_index(),
            base_height: f64::from(ctx.engine().display_context().base_size().1),
        };
    }

    fn render(&self, draw: &mut Draw<'_>) -> Result<(), RenderError> {
        let status = self.status_line();
        draw.text(
            &status,
            Point::new(HUD_MARGIN, HUD_MARGIN),
            HUD_TEXT_SIZE,
            Color::WHITE,
        );

        let height = lock(&self.state).base_height;
        draw.with_opacity(0.7, |draw| {
            draw.text(
                HELP_TEXT,
                Point::new(HUD_MARGIN, height - HUD_MARGIN - HUD_TEXT_SIZE),
                HUD_TEXT_SIZE,
                Color::GRAY,
            );
        });
        Ok(())
    }
}
