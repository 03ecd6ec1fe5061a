use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::display::DisplayContext;
use super::lock::lock_or_recover;
use super::rendering::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    Digit0,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Digit8,
    Digit9,
    Up,
    Down,
    Left,
    Right,
    Space,
    Enter,
    Escape,
    Tab,
    Backspace,
    ShiftLeft,
    ShiftRight,
    ControlLeft,
    ControlRight,
    AltLeft,
    AltRight,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
}

impl Key {
    pub const COUNT: usize = Key::F12 as usize + 1;

    pub const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
}

impl MouseButton {
    pub const COUNT: usize = 5;

    pub const fn index(self) -> usize {
        match self {
            MouseButton::Left => 0,
            MouseButton::Right => 1,
            MouseButton::Middle => 2,
            MouseButton::Back => 3,
            MouseButton::Forward => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ScrollAccumulator {
    amount: f64,
    moved: bool,
}

/// Raw device state written by the host event thread and read once per tick
/// by the [`InputSampler`]. Writes are plain flag stores; a write that lands
/// just after a sample is picked up one tick late.
pub struct RawInput {
    keys: [AtomicBool; Key::COUNT],
    buttons: [AtomicBool; MouseButton::COUNT],
    cursor: Mutex<Option<Point>>,
    scroll: Mutex<ScrollAccumulator>,
}

impl Default for RawInput {
    fn default() -> Self {
        Self {
            keys: std::array::from_fn(|_| AtomicBool::new(false)),
            buttons: std::array::from_fn(|_| AtomicBool::new(false)),
            cursor: Mutex::new(None),
            scroll: Mutex::new(ScrollAccumulator::default()),
        }
    }
}

impl RawInput {
    pub fn set_key(&self, key: Key, is_down: bool) {
        self.keys[key.index()].store(is_down, Ordering::Relaxed);
    }

    pub fn set_button(&self, button: MouseButton, is_down: bool) {
        self.buttons[button.index()].store(is_down, Ordering::Relaxed);
    }

    /// Cursor position in window pixels.
    pub fn set_cursor(&self, position: Point) {
        *lock_or_recover(&self.cursor, "input.cursor") = Some(position);
    }

    /// Adds wheel movement; positive scrolls down.
    pub fn add_scroll(&self, amount: f64) {
        let mut scroll = lock_or_recover(&self.scroll, "input.scroll");
        scroll.amount += amount;
        scroll.moved = true;
    }

    /// Drops all held state, e.g. when the window loses focus.
    pub fn release_all(&self) {
        for key in &self.keys {
            key.store(false, Ordering::Relaxed);
        }
        for button in &self.buttons {
            button.store(false, Ordering::Relaxed);
        }
    }

    fn cursor(&self) -> Option<Point> {
        *lock_or_recover(&self.cursor, "input.cursor")
    }

    fn take_scroll(&self) -> ScrollAccumulator {
        std::mem::take(&mut *lock_or_recover(&self.scroll, "input.scroll"))
    }
}

#[derive(Debug, Clone, Copy)]
struct EdgeStates<const N: usize> {
    held: [bool; N],
    last_tick: [bool; N],
    pressed: [bool; N],
    releasing: [bool; N],
}

impl<const N: usize> Default for EdgeStates<N> {
    fn default() -> Self {
        Self {
            held: [false; N],
            last_tick: [false; N],
            pressed: [false; N],
            releasing: [false; N],
        }
    }
}

impl<const N: usize> EdgeStates<N> {
    fn sample(&mut self, raw: &[AtomicBool; N]) {
        for (index, flag) in raw.iter().enumerate() {
            let held = flag.load(Ordering::Relaxed);
            self.held[index] = held;
            self.pressed[index] = held && !self.last_tick[index];
            self.releasing[index] = !held && self.last_tick[index];
            self.last_tick[index] = held;
        }
    }
}

/// Per-tick view of the input devices, owned by the simulation thread.
///
/// [`InputSampler::tick`] runs once at the start of every simulation tick.
/// `pressed` is true only on the tick a control went from up to down and
/// `releasing` only on the tick it went from down to up. Cursor values are in
/// base-resolution coordinates, so they stay stable when the window is
/// resized.
pub struct InputSampler {
    raw: Arc<RawInput>,
    display: Arc<DisplayContext>,
    keys: EdgeStates<{ Key::COUNT }>,
    buttons: EdgeStates<{ MouseButton::COUNT }>,
    cursor: Point,
    previous_cursor: Option<Point>,
    cursor_delta: Point,
    scroll: ScrollAccumulator,
}

impl InputSampler {
    pub fn new(raw: Arc<RawInput>, display: Arc<DisplayContext>) -> Self {
        Self {
            raw,
            display,
            keys: EdgeStates::default(),
            buttons: EdgeStates::default(),
            cursor: Point::ORIGIN,
            previous_cursor: None,
            cursor_delta: Point::ORIGIN,
            scroll: ScrollAccumulator::default(),
        }
    }

    pub fn raw(&self) -> &Arc<RawInput> {
        &self.raw
    }

    pub fn tick(&mut self) {
        self.keys.sample(&self.raw.keys);
        self.buttons.sample(&self.raw.buttons);

        let scale = self.display.scale_factor();
        if let Some(raw_cursor) = self.raw.cursor() {
            self.cursor = Point::new(raw_cursor.x / scale, raw_cursor.y / scale);
        }
        self.cursor_delta = match self.previous_cursor {
            Some(previous) => Point::new(self.cursor.x - previous.x, self.cursor.y - previous.y),
            None => Point::ORIGIN,
        };
        self.previous_cursor = Some(self.cursor);

        self.scroll = self.raw.take_scroll();
    }

    pub fn key_held(&self, key: Key) -> bool {
        self.keys.held[key.index()]
    }

    pub fn key_pressed(&self, key: Key) -> bool {
        self.keys.pressed[key.index()]
    }

    pub fn key_releasing(&self, key: Key) -> bool {
        self.keys.releasing[key.index()]
    }

    pub fn button_held(&self, button: MouseButton) -> bool {
        self.buttons.held[button.index()]
    }

    pub fn button_pressed(&self, button: MouseButton) -> bool {
        self.buttons.pressed[button.index()]
    }

    pub fn button_releasing(&self, button: MouseButton) -> bool {
        self.buttons.releasing[button.index()]
    }

    pub fn cursor(&self) -> Point {
        self.cursor
    }

    /// Cursor movement since the previous tick. Zero on the first sample.
    pub fn cursor_delta(&self) -> Point {
        self.cursor_delta
    }

    /// Wheel movement accumulated since the previous tick; positive is down.
    pub fn scroll_amount(&self) -> f64 {
        self.scroll.amount
    }

    // Direction comes from the sign of the tick's running total, so opposite
    // movements within one tick report whichever dominates at the end.
    pub fn scrolling_up(&self) -> bool {
        self.scroll.moved && self.scroll.amount <= 0.0
    }

    pub fn scrolling_down(&self) -> bool {
        self.scroll.moved && self.scroll.amount > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler() -> InputSampler {
        let display = Arc::new(DisplayContext::new(320, 240, None));
        InputSampler::new(Arc::new(RawInput::default()), display)
    }

    #[test]
    fn key_counts_cover_every_variant() {
        assert_eq!(Key::COUNT, 63);
        assert_eq!(Key::A.index(), 0);
        assert_eq!(Key::F12.index(), Key::COUNT - 1);
    }

    #[test]
    fn press_hold_release_cycle_yields_single_edges() {
        let mut input = sampler();
        let raw = Arc::clone(input.raw());
        let mut history = Vec::new();

        for tick in 0..6 {
            match tick {
                1 => raw.set_key(Key::Space, true),
                4 => raw.set_key(Key::Space, false),
                _ => {}
            }
            input.tick();
            history.push((
                input.key_pressed(Key::Space),
                input.key_held(Key::Space),
                input.key_releasing(Key::Space),
            ));
        }

        assert_eq!(
            history,
            vec![
                (false, false, false),
                (true, true, false),
                (false, true, false),
                (false, true, false),
                (false, false, true),
                (false, false, false),
            ]
        );
    }

    #[test]
    fn tap_between_samples_is_not_seen() {
        let mut input = sampler();
        let raw = Arc::clone(input.raw());
        raw.set_key(Key::A, true);
        raw.set_key(Key::A, false);
        input.tick();
        assert!(!input.key_pressed(Key::A));
        assert!(!input.key_held(Key::A));
    }

    #[test]
    fn mouse_buttons_have_their_own_edges() {
        let mut input = sampler();
        let raw = Arc::clone(input.raw());
        raw.set_button(MouseButton::Right, true);
        input.tick();
        assert!(input.button_pressed(MouseButton::Right));
        assert!(!input.button_held(MouseButton::Left));

        raw.set_button(MouseButton::Right, false);
        input.tick();
        assert!(input.button_releasing(MouseButton::Right));
        assert!(!input.key_releasing(Key::A));
    }

    #[test]
    fn cursor_delta_is_zero_on_first_sample_then_tracks_motion() {
        let mut input = sampler();
        let raw = Arc::clone(input.raw());
        raw.set_cursor(Point::new(10.0, 20.0));
        input.tick();
        assert_eq!(input.cursor(), Point::new(10.0, 20.0));
        assert_eq!(input.cursor_delta(), Point::ORIGIN);

        raw.set_cursor(Point::new(15.0, 18.0));
        input.tick();
        assert_eq!(input.cursor_delta(), Point::new(5.0, -2.0));

        input.tick();
        assert_eq!(input.cursor_delta(), Point::ORIGIN);
    }

    #[test]
    fn cursor_is_reported_in_base_resolution() {
        let display = Arc::new(DisplayContext::new(320, 240, None));
        let raw = Arc::new(RawInput::default());
        let mut input = InputSampler::new(Arc::clone(&raw), Arc::clone(&display));
        display.set_current_size(640, 480);

        raw.set_cursor(Point::new(100.0, 50.0));
        input.tick();
        assert_eq!(input.cursor(), Point::new(50.0, 25.0));
    }

    #[test]
    fn scroll_resets_every_tick() {
        let mut input = sampler();
        let raw = Arc::clone(input.raw());
        raw.add_scroll(1.0);
        raw.add_scroll(2.0);
        input.tick();
        assert_eq!(input.scroll_amount(), 3.0);
        assert!(input.scrolling_down());
        assert!(!input.scrolling_up());

        input.tick();
        assert_eq!(input.scroll_amount(), 0.0);
        assert!(!input.scrolling_down());
        assert!(!input.scrolling_up());
    }

    #[test]
    fn opposite_scrolls_in_one_tick_report_the_final_sign() {
        let mut input = sampler();
        let raw = Arc::clone(input.raw());
        raw.add_scroll(1.0);
        raw.add_scroll(-3.0);
        input.tick();
        assert_eq!(input.scroll_amount(), -2.0);
        assert!(input.scrolling_up());
        assert!(!input.scrolling_down());
    }

    #[test]
    fn release_all_drops_held_keys() {
        let mut input = sampler();
        let raw = Arc::clone(input.raw());
        raw.set_key(Key::W, true);
        raw.set_button(MouseButton::Left, true);
        input.tick();
        raw.release_all();
        input.tick();
        assert!(input.key_releasing(Key::W));
        assert!(input.button_releasing(MouseButton::Left));
    }
}
