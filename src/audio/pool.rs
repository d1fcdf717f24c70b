// Voice pool - Prebuffered one-shot voices per drum track
// Idle voices are created ahead of time so a trigger never waits on setup

use std::path::PathBuf;

use super::backend::{AudioBackend, AudioError, BufferHandle, VoiceHandle};
use super::samples::{SampleBuffer, SampleKit};
use crate::sequencer::metronome::{ClickType, MetronomeSettings, MetronomeSound};
use crate::sequencer::pattern::{NUM_TRACKS, Track};

/// Idle voices kept ready per track
pub const VOICES_PER_TRACK: usize = 4;

/// Idle voices kept ready per click sound
pub const CLICK_VOICES: usize = 2;

/// Volume every track starts at (and returns to on reset)
pub const DEFAULT_VOLUME: f32 = 0.7;

/// How long a track reports trigger feedback after playing
pub const TRIGGER_FEEDBACK_SECONDS: f32 = 0.1;

/// Idle and playing voices for one sample buffer
#[derive(Debug)]
struct VoiceLane {
    buffer: BufferHandle,
    nominal: usize,
    idle: Vec<VoiceHandle>,
    active: Vec<VoiceHandle>,
}

impl VoiceLane {
    fn fill(
        backend: &mut dyn AudioBackend,
        buffer: BufferHandle,
        nominal: usize,
        volume: f32,
    ) -> Result<Self, AudioError> {
        let mut lane = Self {
            buffer,
            nominal,
            idle: Vec::with_capacity(nominal),
            active: Vec::new(),
        };
        lane.replenish(backend, volume)?;
        Ok(lane)
    }

    /// Pop an idle voice, or create one when the pool ran dry
    ///
    /// The flag is true when the voice came from the fallback path.
    fn take(&mut self, backend: &mut dyn AudioBackend) -> Result<(VoiceHandle, bool), AudioError> {
        match self.idle.pop() {
            Some(voice) => Ok((voice, false)),
            None => Ok((backend.create_voice(self.buffer)?, true)),
        }
    }

    fn replenish(&mut self, backend: &mut dyn AudioBackend, volume: f32) -> Result<(), AudioError> {
        while self.idle.len() < self.nominal {
            let voice = backend.create_voice(self.buffer)?;
            backend.set_volume(voice, volume);
            self.idle.push(voice);
        }
        Ok(())
    }

    /// Move finished voices out of the active list
    fn prune(&mut self, backend: &mut dyn AudioBackend) {
        let mut still_playing = Vec::with_capacity(self.active.len());
        for voice in self.active.drain(..) {
            if backend.is_playing(voice) {
                still_playing.push(voice);
            } else if self.idle.len() < self.nominal {
                self.idle.push(voice);
            } else {
                backend.release(voice);
            }
        }
        self.active = still_playing;
    }

    fn stop_all(&mut self, backend: &mut dyn AudioBackend) {
        for voice in self.active.drain(..) {
            backend.stop(voice);
            if self.idle.len() < self.nominal {
                self.idle.push(voice);
            } else {
                backend.release(voice);
            }
        }
    }

    fn apply_volume(&self, backend: &mut dyn AudioBackend, volume: f32, include_active: bool) {
        for &voice in &self.idle {
            backend.set_volume(voice, volume);
        }
        if include_active {
            for &voice in &self.active {
                backend.set_volume(voice, volume);
            }
        }
    }
}

/// Audio Voice Pool
///
/// Owns the backend, one lane per track, two click lanes, per-track volume
/// and the decaying trigger-feedback timers. Invalid track numbers are
/// silently ignored by every method.
pub struct VoicePool {
    backend: Box<dyn AudioBackend>,
    kit_dir: Option<PathBuf>,
    tracks: Vec<VoiceLane>,
    clicks: Vec<(ClickType, VoiceLane)>,
    volumes: [f32; NUM_TRACKS],
    feedback: [f32; NUM_TRACKS],
    metronome: MetronomeSettings,
    ready: bool,
    fallback_voices: u64,
}

impl VoicePool {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            kit_dir: None,
            tracks: Vec::new(),
            clicks: Vec::new(),
            volumes: [DEFAULT_VOLUME; NUM_TRACKS],
            feedback: [0.0; NUM_TRACKS],
            metronome: MetronomeSettings::default(),
            ready: false,
            fallback_voices: 0,
        }
    }

    /// Load `<role>.wav|flac` from this directory instead of synthesizing
    pub fn with_kit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.kit_dir = Some(dir.into());
        self
    }

    /// Build the kit and prefill every lane; resets volumes to the default
    pub fn init(&mut self) -> Result<(), AudioError> {
        self.volumes = [DEFAULT_VOLUME; NUM_TRACKS];
        self.build()
    }

    /// Reset the backend and rebuild the lanes, keeping user volumes
    pub fn reinitialize(&mut self) -> Result<(), AudioError> {
        self.ready = false;
        self.tracks.clear();
        self.clicks.clear();
        self.backend.reset()?;
        self.build()
    }

    fn build(&mut self) -> Result<(), AudioError> {
        self.ready = false;
        self.release_lanes();

        if !self.backend.is_available() {
            return Err(AudioError::Unavailable(format!(
                "{} backend is not available",
                self.backend.name()
            )));
        }

        let sample_rate = self.backend.sample_rate();
        let kit = match &self.kit_dir {
            Some(dir) => SampleKit::load_dir(dir, sample_rate),
            None => SampleKit::synthesized(sample_rate),
        };

        let mut tracks = Vec::with_capacity(NUM_TRACKS);
        for track in Track::ALL {
            let buffer = self.backend.load_buffer(kit.get(track))?;
            let volume = self.volumes[track.number() - 1];
            tracks.push(VoiceLane::fill(
                self.backend.as_mut(),
                buffer,
                VOICES_PER_TRACK,
                volume,
            )?);
        }

        let sound = MetronomeSound::new(sample_rate as f32);
        let mut clicks = Vec::with_capacity(2);
        for click in [ClickType::Accent, ClickType::Regular] {
            let samples =
                SampleBuffer::new(click.name(), sound.get_click(click).to_vec(), sample_rate);
            let buffer = self.backend.load_buffer(&samples)?;
            let lane = VoiceLane::fill(
                self.backend.as_mut(),
                buffer,
                CLICK_VOICES,
                self.metronome.volume(click),
            )?;
            clicks.push((click, lane));
        }

        self.tracks = tracks;
        self.clicks = clicks;
        self.ready = true;

        log::info!(
            "Voice pool ready on {} backend at {} Hz ({} voices per track)",
            self.backend.name(),
            sample_rate,
            VOICES_PER_TRACK
        );
        Ok(())
    }

    fn release_lanes(&mut self) {
        let lanes = self
            .tracks
            .drain(..)
            .chain(self.clicks.drain(..).map(|(_, lane)| lane));
        for lane in lanes {
            for voice in lane.idle.into_iter().chain(lane.active) {
                self.backend.release(voice);
            }
        }
    }

    pub fn is_system_ready(&self) -> bool {
        self.ready && self.backend.is_available()
    }

    fn track_index(track: usize) -> Option<usize> {
        (1..=NUM_TRACKS).contains(&track).then(|| track - 1)
    }

    /// Trigger a track's sample
    ///
    /// Returns false for an invalid track, an unready system or a backend
    /// refusal; never panics.
    pub fn play(&mut self, track: usize) -> bool {
        let Some(index) = Self::track_index(track) else {
            return false;
        };
        if !self.is_system_ready() {
            return false;
        }

        let volume = self.volumes[index];
        let lane = &mut self.tracks[index];
        match Self::start_voice(self.backend.as_mut(), lane, volume) {
            Ok(fallback) => {
                if fallback {
                    self.fallback_voices += 1;
                    log::warn!(
                        "Track {} voice pool empty, created a voice on demand",
                        track
                    );
                }
                self.feedback[index] = TRIGGER_FEEDBACK_SECONDS;
                true
            }
            Err(e) => {
                log::warn!("Track {} failed to play: {}", track, e);
                false
            }
        }
    }

    fn start_voice(
        backend: &mut dyn AudioBackend,
        lane: &mut VoiceLane,
        volume: f32,
    ) -> Result<bool, AudioError> {
        let (voice, fallback) = lane.take(backend)?;
        backend.set_volume(voice, volume);
        if let Err(e) = backend.play(voice) {
            backend.release(voice);
            return Err(e);
        }
        lane.active.push(voice);
        Ok(fallback)
    }

    /// Trigger a metronome click regardless of the enabled flag
    pub fn play_click(&mut self, click: ClickType) -> bool {
        if !self.is_system_ready() {
            return false;
        }

        let volume = self.metronome.volume(click);
        let Some((_, lane)) = self.clicks.iter_mut().find(|(c, _)| *c == click) else {
            return false;
        };
        match Self::start_voice(self.backend.as_mut(), lane, volume) {
            Ok(fallback) => {
                if fallback {
                    self.fallback_voices += 1;
                }
                true
            }
            Err(e) => {
                log::warn!("Metronome click failed: {}", e);
                false
            }
        }
    }

    /// Per-frame housekeeping: decay feedback, prune finished voices, refill idle lanes
    pub fn update(&mut self, dt: f32) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        for remaining in self.feedback.iter_mut() {
            *remaining = (*remaining - dt).max(0.0);
        }

        if !self.ready {
            return;
        }

        for lane in self.tracks.iter_mut() {
            lane.prune(self.backend.as_mut());
        }
        for (_, lane) in self.clicks.iter_mut() {
            lane.prune(self.backend.as_mut());
        }

        if let Err(e) = self.replenish() {
            log::warn!("Voice pool replenish failed: {}", e);
        }
    }

    /// Refill every idle lane to its nominal size
    pub fn replenish(&mut self) -> Result<(), AudioError> {
        for (index, lane) in self.tracks.iter_mut().enumerate() {
            lane.replenish(self.backend.as_mut(), self.volumes[index])?;
        }
        for (click, lane) in self.clicks.iter_mut() {
            lane.replenish(self.backend.as_mut(), self.metronome.volume(*click))?;
        }
        Ok(())
    }

    /// Set a track's volume (clamped to 0.0..=1.0)
    ///
    /// Applies to the next trigger; sounds already playing keep their level.
    pub fn set_volume(&mut self, track: usize, volume: f32) {
        let Some(index) = Self::track_index(track) else {
            return;
        };
        if volume.is_nan() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.volumes[index] = volume;
        if let Some(lane) = self.tracks.get(index) {
            lane.apply_volume(self.backend.as_mut(), volume, false);
        }
    }

    pub fn volume(&self, track: usize) -> f32 {
        Self::track_index(track).map_or(0.0, |index| self.volumes[index])
    }

    pub fn volumes(&self) -> [f32; NUM_TRACKS] {
        self.volumes
    }

    /// Every track back to the default, including voices that are sounding
    pub fn reset_all_volumes(&mut self) {
        self.volumes = [DEFAULT_VOLUME; NUM_TRACKS];
        for lane in &self.tracks {
            lane.apply_volume(self.backend.as_mut(), DEFAULT_VOLUME, true);
        }
    }

    pub fn has_trigger_feedback(&self, track: usize) -> bool {
        self.trigger_feedback(track) > 0.0
    }

    /// Seconds of feedback left for a track
    pub fn trigger_feedback(&self, track: usize) -> f32 {
        Self::track_index(track).map_or(0.0, |index| self.feedback[index])
    }

    /// Silence everything that is playing
    pub fn stop_all(&mut self) {
        for lane in self.tracks.iter_mut() {
            lane.stop_all(self.backend.as_mut());
        }
        for (_, lane) in self.clicks.iter_mut() {
            lane.stop_all(self.backend.as_mut());
        }
    }

    pub fn idle_voices(&self, track: usize) -> usize {
        Self::track_index(track)
            .and_then(|index| self.tracks.get(index))
            .map_or(0, |lane| lane.idle.len())
    }

    pub fn active_voices(&self, track: usize) -> usize {
        Self::track_index(track)
            .and_then(|index| self.tracks.get(index))
            .map_or(0, |lane| lane.active.len())
    }

    /// Active voices across all tracks and clicks
    pub fn total_active_voices(&self) -> usize {
        let tracks: usize = self.tracks.iter().map(|l| l.active.len()).sum();
        let clicks: usize = self.clicks.iter().map(|(_, l)| l.active.len()).sum();
        tracks + clicks
    }

    /// Voices created on demand because a lane was empty
    pub fn fallback_voices(&self) -> u64 {
        self.fallback_voices
    }

    pub fn metronome(&self) -> &MetronomeSettings {
        &self.metronome
    }

    pub fn set_metronome_enabled(&mut self, enabled: bool) {
        self.metronome.enabled = enabled;
    }

    pub fn set_click_volume(&mut self, click: ClickType, volume: f32) {
        self.metronome.set_volume(click, volume);
        let volume = self.metronome.volume(click);
        if let Some((_, lane)) = self.clicks.iter().find(|(c, _)| *c == click) {
            lane.apply_volume(self.backend.as_mut(), volume, false);
        }
    }

    pub fn click_volume(&self, click: ClickType) -> f32 {
        self.metronome.volume(click)
    }

    /// Replace all metronome settings at once
    pub fn set_metronome(&mut self, settings: MetronomeSettings) {
        self.metronome.enabled = settings.enabled;
        self.set_click_volume(ClickType::Accent, settings.accent_volume);
        self.set_click_volume(ClickType::Regular, settings.regular_volume);
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}
