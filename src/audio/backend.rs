// Backend - Audio output capability used by the voice pool
// Real output (cpal) and a silent recording backend share this trait

use super::samples::SampleBuffer;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Handle to a sample buffer uploaded to a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u32);

impl BufferHandle {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

/// Handle to one playable instance of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(u32);

impl VoiceHandle {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Audio backend unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown sample buffer {0:?}")]
    UnknownBuffer(BufferHandle),

    #[error("Unknown voice {0:?}")]
    UnknownVoice(VoiceHandle),

    #[error("Failed to load sample {path}: {reason}")]
    SampleLoad { path: PathBuf, reason: String },

    #[error("Audio stream error: {0}")]
    Stream(String),
}

/// Audio output capability
///
/// Voices are fire-and-forget: `play` starts a voice and returns, and the
/// caller polls `is_playing` to learn when it finished.
pub trait AudioBackend {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Output rate buffers should be rendered at
    fn sample_rate(&self) -> u32;

    fn load_buffer(&mut self, buffer: &SampleBuffer) -> Result<BufferHandle, AudioError>;

    /// Create an idle voice bound to a buffer
    fn create_voice(&mut self, buffer: BufferHandle) -> Result<VoiceHandle, AudioError>;

    /// Live volume, applies to a voice that is already playing
    fn set_volume(&mut self, voice: VoiceHandle, volume: f32);

    fn play(&mut self, voice: VoiceHandle) -> Result<(), AudioError>;

    fn stop(&mut self, voice: VoiceHandle);

    fn is_playing(&self, voice: VoiceHandle) -> bool;

    /// Free a voice; the handle is invalid afterwards
    fn release(&mut self, voice: VoiceHandle);

    /// Drop every buffer and voice and try to reopen the output
    fn reset(&mut self) -> Result<(), AudioError>;
}

#[derive(Debug, Clone)]
struct NullVoice {
    buffer: usize,
    volume: f32,
    playing: bool,
}

#[derive(Debug)]
struct NullState {
    available: bool,
    buffers: Vec<String>,
    voices: HashMap<u32, NullVoice>,
    next_voice: u32,
    plays: Vec<String>,
}

impl Default for NullState {
    fn default() -> Self {
        Self {
            available: true,
            buffers: Vec::new(),
            voices: HashMap::new(),
            next_voice: 0,
            plays: Vec::new(),
        }
    }
}

/// Silent backend that records what it was asked to play
///
/// Voices stay "playing" until `NullProbe::finish_all` is called, which lets
/// callers exercise overlap and pruning deterministically.
#[derive(Debug)]
pub struct NullBackend {
    state: Arc<Mutex<NullState>>,
    sample_rate: u32,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::with_sample_rate(44100)
    }

    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(NullState::default())),
            sample_rate,
        }
    }

    /// Observer sharing this backend's state
    pub fn probe(&self) -> NullProbe {
        NullProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut NullState) -> R) -> Option<R> {
        self.state.lock().ok().map(|mut state| f(&mut state))
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn is_available(&self) -> bool {
        self.with_state(|s| s.available).unwrap_or(false)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn load_buffer(&mut self, buffer: &SampleBuffer) -> Result<BufferHandle, AudioError> {
        self.with_state(|s| {
            if !s.available {
                return Err(AudioError::Unavailable("null backend switched off".to_string()));
            }
            s.buffers.push(buffer.name.clone());
            Ok(BufferHandle::new(s.buffers.len() as u32 - 1))
        })
        .unwrap_or_else(|| Err(AudioError::Unavailable("state lock poisoned".to_string())))
    }

    fn create_voice(&mut self, buffer: BufferHandle) -> Result<VoiceHandle, AudioError> {
        self.with_state(|s| {
            let index = buffer.id() as usize;
            if index >= s.buffers.len() {
                return Err(AudioError::UnknownBuffer(buffer));
            }
            let id = s.next_voice;
            s.next_voice += 1;
            s.voices.insert(
                id,
                NullVoice {
                    buffer: index,
                    volume: 1.0,
                    playing: false,
                },
            );
            Ok(VoiceHandle::new(id))
        })
        .unwrap_or_else(|| Err(AudioError::Unavailable("state lock poisoned".to_string())))
    }

    fn set_volume(&mut self, voice: VoiceHandle, volume: f32) {
        self.with_state(|s| {
            if let Some(v) = s.voices.get_mut(&voice.id()) {
                v.volume = volume;
            }
        });
    }

    fn play(&mut self, voice: VoiceHandle) -> Result<(), AudioError> {
        self.with_state(|s| -> Result<(), AudioError> {
            let v = s
                .voices
                .get_mut(&voice.id())
                .ok_or(AudioError::UnknownVoice(voice))?;
            v.playing = true;
            let name = s.buffers[v.buffer].clone();
            log::debug!("null backend: play {} (voice {})", name, voice.id());
            s.plays.push(name);
            Ok(())
        })
        .unwrap_or_else(|| Err(AudioError::Unavailable("state lock poisoned".to_string())))
    }

    fn stop(&mut self, voice: VoiceHandle) {
        self.with_state(|s| {
            if let Some(v) = s.voices.get_mut(&voice.id()) {
                v.playing = false;
            }
        });
    }

    fn is_playing(&self, voice: VoiceHandle) -> bool {
        self.with_state(|s| s.voices.get(&voice.id()).is_some_and(|v| v.playing))
            .unwrap_or(false)
    }

    fn release(&mut self, voice: VoiceHandle) {
        self.with_state(|s| s.voices.remove(&voice.id()));
    }

    fn reset(&mut self) -> Result<(), AudioError> {
        self.with_state(|s| {
            s.buffers.clear();
            s.voices.clear();
            if s.available {
                Ok(())
            } else {
                Err(AudioError::Unavailable("null backend switched off".to_string()))
            }
        })
        .unwrap_or_else(|| Err(AudioError::Unavailable("state lock poisoned".to_string())))
    }
}

/// Test-side view of a NullBackend
#[derive(Debug, Clone)]
pub struct NullProbe {
    state: Arc<Mutex<NullState>>,
}

impl NullProbe {
    fn with_state<R: Default>(&self, f: impl FnOnce(&mut NullState) -> R) -> R {
        self.state
            .lock()
            .map(|mut state| f(&mut state))
            .unwrap_or_default()
    }

    /// Simulate the output device coming and going
    pub fn set_available(&self, available: bool) {
        self.with_state(|s| s.available = available);
    }

    /// Total play calls
    pub fn play_count(&self) -> usize {
        self.with_state(|s| s.plays.len())
    }

    /// Play calls for the buffer with this name
    pub fn plays_of(&self, name: &str) -> usize {
        self.with_state(|s| s.plays.iter().filter(|p| p.as_str() == name).count())
    }

    /// Buffer names in play order
    pub fn plays(&self) -> Vec<String> {
        self.with_state(|s| s.plays.clone())
    }

    pub fn clear_plays(&self) {
        self.with_state(|s| s.plays.clear());
    }

    /// Mark every voice as finished
    pub fn finish_all(&self) {
        self.with_state(|s| s.voices.values_mut().for_each(|v| v.playing = false));
    }

    /// Live volumes of the playing voices of one buffer
    pub fn playing_volumes(&self, name: &str) -> Vec<f32> {
        self.volumes_where(name, true)
    }

    /// Volumes of the idle voices of one buffer
    pub fn idle_volumes(&self, name: &str) -> Vec<f32> {
        self.volumes_where(name, false)
    }

    fn volumes_where(&self, name: &str, playing: bool) -> Vec<f32> {
        self.with_state(|s| {
            s.voices
                .values()
                .filter(|v| v.playing == playing && s.buffers[v.buffer] == name)
                .map(|v| v.volume)
                .collect()
        })
    }

    /// Voices that exist (idle or playing)
    pub fn voice_count(&self) -> usize {
        self.with_state(|s| s.voices.len())
    }
}
