use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, warn};

use super::lock::lock_or_recover;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipHandle(u64);

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to load audio clip {path}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("unknown audio clip {0:?}")]
    UnknownClip(ClipHandle),
    #[error("no music track at index {0}")]
    UnknownTrack(usize),
    #[error("audio backend failure: {0}")]
    Backend(String),
}

/// Audio device contract. Gains are linear in `[0, 1]`.
pub trait AudioBackend: Send + Sync {
    fn load(&self, path: &Path) -> Result<ClipHandle, AudioError>;
    fn play(&self, clip: ClipHandle) -> Result<(), AudioError>;
    fn stop(&self, clip: ClipHandle) -> Result<(), AudioError>;
    fn set_looping(&self, clip: ClipHandle, looping: bool) -> Result<(), AudioError>;
    fn set_gain(&self, clip: ClipHandle, gain: f32) -> Result<(), AudioError>;
    fn is_finished(&self, clip: ClipHandle) -> Result<bool, AudioError>;
    fn release(&self, clip: ClipHandle) -> Result<(), AudioError>;
    /// Releases every clip and the device itself.
    fn cleanup(&self);
}

#[derive(Debug, Clone)]
struct SilentClip {
    path: PathBuf,
    playing: bool,
    looping: bool,
    gain: f32,
}

/// Backend without an output device. It tracks clip state so callers behave
/// the same as with real audio; clips have zero length, so a non-looping clip
/// is finished as soon as it starts.
#[derive(Default)]
pub struct SilentAudio {
    next_handle: AtomicU64,
    clips: Mutex<HashMap<ClipHandle, SilentClip>>,
}

impl SilentAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clip_count(&self) -> usize {
        lock_or_recover(&self.clips, "audio.clips").len()
    }

    pub fn gain(&self, clip: ClipHandle) -> Option<f32> {
        lock_or_recover(&self.clips, "audio.clips")
            .get(&clip)
            .map(|state| state.gain)
    }

    fn with_clip<T>(
        &self,
        clip: ClipHandle,
        apply: impl FnOnce(&mut SilentClip) -> T,
    ) -> Result<T, AudioError> {
        let mut clips = lock_or_recover(&self.clips, "audio.clips");
        clips
            .get_mut(&clip)
            .map(apply)
            .ok_or(AudioError::UnknownClip(clip))
    }
}

impl AudioBackend for SilentAudio {
    fn load(&self, path: &Path) -> Result<ClipHandle, AudioError> {
        if !path.is_file() {
            return Err(AudioError::Load {
                path: path.to_path_buf(),
                reason: "not a readable file".to_string(),
            });
        }
        let handle = ClipHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        lock_or_recover(&self.clips, "audio.clips").insert(
            handle,
            SilentClip {
                path: path.to_path_buf(),
                playing: false,
                looping: false,
                gain: 1.0,
            },
        );
        Ok(handle)
    }

    fn play(&self, clip: ClipHandle) -> Result<(), AudioError> {
        self.with_clip(clip, |state| state.playing = true)
    }

    fn stop(&self, clip: ClipHandle) -> Result<(), AudioError> {
        self.with_clip(clip, |state| state.playing = false)
    }

    fn set_looping(&self, clip: ClipHandle, looping: bool) -> Result<(), AudioError> {
        self.with_clip(clip, |state| state.looping = looping)
    }

    fn set_gain(&self, clip: ClipHandle, gain: f32) -> Result<(), AudioError> {
        self.with_clip(clip, |state| state.gain = gain.clamp(0.0, 1.0))
    }

    fn is_finished(&self, clip: ClipHandle) -> Result<bool, AudioError> {
        self.with_clip(clip, |state| !(state.playing && state.looping))
    }

    fn release(&self, clip: ClipHandle) -> Result<(), AudioError> {
        lock_or_recover(&self.clips, "audio.clips")
            .remove(&clip)
            .map(|state| debug!(path = %state.path.display(), "audio_clip_released"))
            .ok_or(AudioError::UnknownClip(clip))
    }

    fn cleanup(&self) {
        lock_or_recover(&self.clips, "audio.clips").clear();
    }
}

const MAX_VOLUME: u8 = 100;

fn volume_to_gain(volume: u8) -> f32 {
    f32::from(volume.min(MAX_VOLUME)) / f32::from(MAX_VOLUME)
}

struct SoundBoardState {
    effects: HashMap<String, ClipHandle>,
    effect_volume: u8,
    music: Vec<ClipHandle>,
    music_volume: u8,
}

/// Named sound effects and indexed music tracks on top of an [`AudioBackend`].
///
/// Volumes are percentages (0 to 100). Effect and playback failures are
/// logged and swallowed; only loading music and querying a track report
/// errors to the caller.
pub struct SoundBoard {
    backend: Arc<dyn AudioBackend>,
    state: Mutex<SoundBoardState>,
}

impl SoundBoard {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(SoundBoardState {
                effects: HashMap::new(),
                effect_volume: MAX_VOLUME,
                music: Vec::new(),
                music_volume: MAX_VOLUME,
            }),
        }
    }

    pub fn backend(&self) -> &Arc<dyn AudioBackend> {
        &self.backend
    }

    /// Loads `path` under `name`, replacing any effect with the same name.
    pub fn add_sound_effect(&self, name: &str, path: impl AsRef<Path>) {
        let clip = match self.backend.load(path.as_ref()) {
            Ok(clip) => clip,
            Err(error) => {
                warn!(effect = name, error = %error, "sound_effect_load_failed");
                return;
            }
        };
        let previous = lock_or_recover(&self.state, "audio.soundboard")
            .effects
            .insert(name.to_string(), clip);
        if let Some(previous) = previous {
            self.release_logged(previous);
        }
    }

    pub fn has_sound_effect(&self, name: &str) -> bool {
        lock_or_recover(&self.state, "audio.soundboard")
            .effects
            .contains_key(name)
    }

    pub fn play_sound_effect(&self, name: &str) {
        let state = lock_or_recover(&self.state, "audio.soundboard");
        let Some(&clip) = state.effects.get(name) else {
            warn!(effect = name, "sound_effect_unknown");
            return;
        };
        let gain = volume_to_gain(state.effect_volume);
        let result = self
            .backend
            .set_gain(clip, gain)
            .and_then(|()| self.backend.play(clip));
        if let Err(error) = result {
            warn!(effect = name, error = %error, "sound_effect_play_failed");
        }
    }

    pub fn remove_sound_effect(&self, name: &str) {
        let removed = lock_or_recover(&self.state, "audio.soundboard")
            .effects
            .remove(name);
        match removed {
            Some(clip) => self.release_logged(clip),
            None => warn!(effect = name, "sound_effect_unknown"),
        }
    }

    /// Takes effect on the next effect played.
    pub fn set_effect_volume(&self, volume: u8) {
        lock_or_recover(&self.state, "audio.soundboard").effect_volume = volume.min(MAX_VOLUME);
    }

    pub fn effect_volume(&self) -> u8 {
        lock_or_recover(&self.state, "audio.soundboard").effect_volume
    }

    /// Loads a music track and returns its index.
    pub fn add_music(&self, path: impl AsRef<Path>) -> Result<usize, AudioError> {
        let clip = self.backend.load(path.as_ref())?;
        let mut state = lock_or_recover(&self.state, "audio.soundboard");
        state.music.push(clip);
        Ok(state.music.len() - 1)
    }

    pub fn music_count(&self) -> usize {
        lock_or_recover(&self.state, "audio.soundboard").music.len()
    }

    pub fn play_music(&self, index: usize, repeat: bool) {
        let state = lock_or_recover(&self.state, "audio.soundboard");
        let result = state
            .music
            .get(index)
            .copied()
            .ok_or(AudioError::UnknownTrack(index))
            .and_then(|clip| {
                self.backend
                    .set_gain(clip, volume_to_gain(state.music_volume))?;
                self.backend.play(clip)?;
                self.backend.set_looping(clip, repeat)
            });
        if let Err(error) = result {
            warn!(track = index, error = %error, "music_play_failed");
        }
    }

    pub fn stop_music(&self, index: usize) {
        let track = lock_or_recover(&self.state, "audio.soundboard")
            .music
            .get(index)
            .copied();
        let result = track
            .ok_or(AudioError::UnknownTrack(index))
            .and_then(|clip| self.backend.stop(clip));
        if let Err(error) = result {
            warn!(track = index, error = %error, "music_stop_failed");
        }
    }

    pub fn has_music_finished(&self, index: usize) -> Result<bool, AudioError> {
        let track = lock_or_recover(&self.state, "audio.soundboard")
            .music
            .get(index)
            .copied()
            .ok_or(AudioError::UnknownTrack(index))?;
        self.backend.is_finished(track)
    }

    /// Stops and releases every music track. Indices restart at 0.
    pub fn clear_music(&self) {
        let tracks = std::mem::take(&mut lock_or_recover(&self.state, "audio.soundboard").music);
        for clip in tracks {
            if let Err(error) = self.backend.stop(clip) {
                warn!(error = %error, "music_stop_failed");
            }
            self.release_logged(clip);
        }
    }

    /// Applies immediately to every loaded track.
    pub fn set_music_volume(&self, volume: u8) {
        let mut state = lock_or_recover(&self.state, "audio.soundboard");
        state.music_volume = volume.min(MAX_VOLUME);
        let gain = volume_to_gain(state.music_volume);
        for (index, clip) in state.music.iter().enumerate() {
            if let Err(error) = self.backend.set_gain(*clip, gain) {
                warn!(track = index, error = %error, "music_gain_failed");
            }
        }
    }

    pub fn music_volume(&self) -> u8 {
        lock_or_recover(&self.state, "audio.soundboard").music_volume
    }

    /// Releases everything and shuts the backend down.
    pub fn cleanup(&self) {
        self.clear_music();
        let effects = std::mem::take(&mut lock_or_recover(&self.state, "audio.soundboard").effects);
        for clip in effects.into_values() {
            self.release_logged(clip);
        }
        self.backend.cleanup();
        debug!("audio_cleaned_up");
    }

    fn release_logged(&self, clip: ClipHandle) {
        if let Err(error) = self.backend.release(clip) {
            warn!(error = %error, "audio_release_failed");
        }
    }
}
