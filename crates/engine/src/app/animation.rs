use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use image::RgbaImage;
use thiserror::Error;

use super::handler::Handler;
use super::lock::lock_or_recover;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnimationError {
    #[error("animation needs at least one frame")]
    NoFrames,
    #[error("animation frame rate must be a positive number, got {0}")]
    InvalidFrameRate(f64),
    #[error("tick rate must be a positive number, got {0}")]
    InvalidTickRate(f64),
}

#[derive(Debug, Default)]
struct FrameState {
    current: usize,
    ticks_elapsed: u64,
}

struct AnimationInner {
    frames: Vec<Arc<RgbaImage>>,
    frame_interval: u64,
    active: AtomicBool,
    state: Mutex<FrameState>,
    owner: Mutex<Weak<Handler>>,
}

/// A looping frame sequence advanced by the simulation clock.
///
/// Cloning yields another handle to the same animation. The frame interval is
/// `floor(tick_rate / fps)` ticks, at least one.
#[derive(Clone)]
pub struct Animation {
    inner: Arc<AnimationInner>,
}

impl Animation {
    pub fn new(frames: Vec<RgbaImage>, tick_rate: f64, fps: f64) -> Result<Self, AnimationError> {
        Self::from_shared_frames(frames.into_iter().map(Arc::new).collect(), tick_rate, fps)
    }

    pub fn from_shared_frames(
        frames: Vec<Arc<RgbaImage>>,
        tick_rate: f64,
        fps: f64,
    ) -> Result<Self, AnimationError> {
        if frames.is_empty() {
            return Err(AnimationError::NoFrames);
        }
        if !tick_rate.is_finite() || tick_rate <= 0.0 {
            return Err(AnimationError::InvalidTickRate(tick_rate));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(AnimationError::InvalidFrameRate(fps));
        }

        Ok(Self {
            inner: Arc::new(AnimationInner {
                frames,
                frame_interval: frame_interval(tick_rate, fps),
                active: AtomicBool::new(false),
                state: Mutex::new(FrameState::default()),
                owner: Mutex::new(Weak::new()),
            }),
        })
    }

    /// Registers with `handler` for per-tick advancement. No-op while active.
    /// The elapsed-tick counter restarts; the current frame is kept.
    pub fn start(&self, handler: &Handler) {
        if self
            .inner
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        lock_or_recover(&self.inner.state, "animation.state").ticks_elapsed = 0;
        *lock_or_recover(&self.inner.owner, "animation.owner") = handler.downgrade();
        handler.register_animation(self);
    }

    /// Deregisters from the handler it was started against. No-op while inactive.
    pub fn stop(&self) {
        if self
            .inner
            .active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let owner = std::mem::take(&mut *lock_or_recover(&self.inner.owner, "animation.owner"));
        if let Some(handler) = owner.upgrade() {
            handler.unregister_animation(self);
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn frame_interval(&self) -> u64 {
        self.inner.frame_interval
    }

    pub fn frame_count(&self) -> usize {
        self.inner.frames.len()
    }

    pub fn current_frame_index(&self) -> usize {
        lock_or_recover(&self.inner.state, "animation.state").current
    }

    pub fn current_frame(&self) -> Arc<RgbaImage> {
        let index = self.current_frame_index();
        Arc::clone(&self.inner.frames[index])
    }

    pub(crate) fn advance(&self) {
        let interval = self.inner.frame_interval;
        let mut state = lock_or_recover(&self.inner.state, "animation.state");
        state.ticks_elapsed += 1;
        if state.ticks_elapsed >= interval && state.ticks_elapsed % interval == 0 {
            state.current = (state.current + 1) % self.inner.frames.len();
        }
    }

    pub(crate) fn same_as(&self, other: &Animation) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn frame_interval(tick_rate: f64, fps: f64) -> u64 {
    ((tick_rate / fps).floor() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::harness;

    fn frames(count: usize) -> Vec<RgbaImage> {
        (0..count).map(|_| RgbaImage::new(2, 2)).collect()
    }

    #[test]
    fn interval_is_tick_rate_over_fps_rounded_down_with_floor_of_one() {
        assert_eq!(frame_interval(60.0, 10.0), 6);
        assert_eq!(frame_interval(60.0, 7.0), 8);
        assert_eq!(frame_interval(60.0, 120.0), 1);
    }

    #[test]
    fn index_follows_ticks_over_interval_modulo_frame_count() {
        let animation = Animation::new(frames(5), 60.0, 10.0).expect("animation");
        assert_eq!(animation.frame_interval(), 6);

        for tick in 1..=60u64 {
            animation.advance();
            let expected = ((tick / 6) % 5) as usize;
            assert_eq!(animation.current_frame_index(), expected, "tick {tick}");
        }
    }

    #[test]
    fn frame_index_wraps_once_after_thirty_ticks() {
        let animation = Animation::new(frames(5), 60.0, 10.0).expect("animation");
        let mut wraps = 0;
        let mut previous = animation.current_frame_index();
        for _ in 0..30 {
            animation.advance();
            let current = animation.current_frame_index();
            if current < previous {
                wraps += 1;
            }
            previous = current;
        }
        assert_eq!(previous, 0);
        assert_eq!(wraps, 1);
    }

    #[test]
    fn started_animation_advances_with_the_tick_pass() {
        let h = harness();
        let animation = Animation::new(frames(5), 60.0, 10.0).expect("animation");
        animation.start(&h.handler);

        for _ in 0..6 {
            h.handler.tick_pass(&h.input, &h.engine);
        }
        assert_eq!(animation.current_frame_index(), 1);

        animation.stop();
        for _ in 0..12 {
            h.handler.tick_pass(&h.input, &h.engine);
        }
        assert_eq!(animation.current_frame_index(), 1);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let h = harness();
        let animation = Animation::new(frames(3), 60.0, 30.0).expect("animation");

        animation.stop();
        assert!(!animation.is_active());
        assert_eq!(h.handler.animation_count(), 0);

        animation.start(&h.handler);
        animation.start(&h.handler);
        assert!(animation.is_active());
        assert_eq!(h.handler.animation_count(), 1);

        animation.stop();
        animation.stop();
        assert!(!animation.is_active());
        assert_eq!(h.handler.animation_count(), 0);
    }

    #[test]
    fn restart_keeps_the_frame_but_restarts_the_interval() {
        let h = harness();
        let animation = Animation::new(frames(4), 60.0, 20.0).expect("animation");
        animation.start(&h.handler);
        for _ in 0..4 {
            h.handler.tick_pass(&h.input, &h.engine);
        }
        assert_eq!(animation.current_frame_index(), 1);

        animation.stop();
        animation.start(&h.handler);
        for _ in 0..2 {
            h.handler.tick_pass(&h.input, &h.engine);
        }
        assert_eq!(animation.current_frame_index(), 1);
        h.handler.tick_pass(&h.input, &h.engine);
        assert_eq!(animation.current_frame_index(), 2);
    }

    #[test]
    fn current_frame_tracks_the_index() {
        let images = vec![RgbaImage::new(1, 1), RgbaImage::new(3, 3)];
        let animation = Animation::new(images, 10.0, 10.0).expect("animation");
        assert_eq!(animation.current_frame().width(), 1);
        animation.advance();
        assert_eq!(animation.current_frame().width(), 3);
        assert_eq!(animation.frame_count(), 2);
    }

    #[test]
    fn invalid_construction_is_rejected() {
        assert_eq!(
            Animation::new(Vec::new(), 60.0, 10.0).err(),
            Some(AnimationError::NoFrames)
        );
        assert_eq!(
            Animation::new(frames(1), 60.0, 0.0).err(),
            Some(AnimationError::InvalidFrameRate(0.0))
        );
        assert_eq!(
            Animation::new(frames(1), -1.0, 10.0).err(),
            Some(AnimationError::InvalidTickRate(-1.0))
        );
    }
}
