// Sequencer engine - Transport state machine driving the step grid
// Crosses step boundaries under the selected timing discipline and fires the voice pool

use super::clock::{Clock, SystemClock};
use super::metronome::{ClickType, MetronomeSettings};
use super::pattern::{NUM_STEPS, NUM_TRACKS, Pattern};
use super::snapshot::{SequencerSnapshot, SnapshotError};
use super::timeline::{DEFAULT_BPM, Tempo, TimingMode};
use super::transport::{StepTimer, TransportState};
use crate::audio::pool::{DEFAULT_VOLUME, VoicePool};

/// What fired on one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTrigger {
    /// 1-based step that was triggered
    pub step: usize,
    /// Tracks with an active cell on that step, ascending
    pub tracks: Vec<usize>,
    /// Metronome click, when the metronome is enabled
    pub click: Option<ClickType>,
}

/// Read-only timing diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct TimingInfo {
    pub mode: TimingMode,
    pub bpm: u32,
    pub step_duration: f64,
    pub is_playing: bool,
    pub start_time: f64,
    pub current_time: f64,
    pub elapsed_time: f64,
    /// Steps advanced since play (capped steps excluded)
    pub total_steps: u64,
    /// Steps dropped by the per-update safety cap
    pub skipped_steps: u64,
    /// Frame-mode accumulator in seconds
    pub step_accumulator: f64,
    /// Fraction of the current step already elapsed
    pub step_progress: f64,
}

/// Audio subsystem summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStatus {
    /// A voice pool is attached
    pub available: bool,
    pub ready: bool,
    pub backend: Option<String>,
    pub reinit_attempts: u32,
    pub active_voices: usize,
    pub fallback_voices: u64,
}

/// Timing Engine
///
/// Drive it by calling `update(dt)` once per host frame. The clock is only
/// read, never waited on, so every call returns in bounded time.
pub struct Sequencer<C: Clock = SystemClock> {
    clock: C,
    pattern: Pattern,
    audio: Option<VoicePool>,
    timer: StepTimer,
    state: TransportState,
    current_step: usize,
    reinit_attempts: u32,
}

impl<C: Clock> Sequencer<C> {
    /// Stopped, at step 1, 120 BPM, Clock mode
    pub fn new(clock: C, audio: Option<VoicePool>) -> Self {
        Self {
            clock,
            pattern: Pattern::new(),
            audio,
            timer: StepTimer::new(Tempo::new(DEFAULT_BPM), TimingMode::Clock),
            state: TransportState::Stopped,
            current_step: 1,
            reinit_attempts: 0,
        }
    }

    /// Start playback, or re-trigger the current step if already playing
    ///
    /// Starting fires the current step immediately; boundaries alone would
    /// skip it. Audio trouble never prevents playback: an unready pool gets
    /// one reinitialization attempt and the clock runs either way.
    pub fn play(&mut self) -> StepTrigger {
        if self.state.is_playing() {
            log::debug!("Re-arming step {}", self.current_step);
            return self.trigger_step(self.current_step);
        }

        self.ensure_audio();

        self.state = TransportState::Playing;
        self.timer.start(self.clock.now());
        log::info!(
            "Playback started at step {} ({}, {} mode)",
            self.current_step,
            self.timer.tempo(),
            self.timer.mode()
        );

        self.trigger_step(self.current_step)
    }

    fn ensure_audio(&mut self) {
        let Some(pool) = self.audio.as_mut() else {
            return;
        };
        if pool.is_system_ready() {
            return;
        }

        self.reinit_attempts += 1;
        log::warn!("Audio not ready, reinitializing voice pool");
        if let Err(e) = pool.reinitialize() {
            log::warn!("Audio reinitialization failed, playing silently: {}", e);
        }
    }

    /// Stop and rewind to step 1; sounding voices ring out
    pub fn stop(&mut self) {
        if self.state.is_playing() {
            log::info!("Playback stopped");
        }
        self.state = TransportState::Stopped;
        self.current_step = 1;
        self.timer.reset();
    }

    /// Move to the next step (16 wraps to 1) without triggering
    pub fn advance_step(&mut self) {
        self.current_step = self.current_step % NUM_STEPS + 1;
    }

    /// Process every step boundary crossed since the last call
    ///
    /// `dt` is the host frame time (used in Frame mode). At most
    /// MAX_STEPS_PER_UPDATE steps are processed; the rest are dropped.
    pub fn update(&mut self, dt: f64) -> Vec<StepTrigger> {
        if !self.state.is_playing() {
            return Vec::new();
        }

        let due = self.timer.due_steps(self.clock.now(), dt);
        let mut triggers = Vec::with_capacity(due as usize);
        for _ in 0..due {
            self.advance_step();
            triggers.push(self.trigger_step(self.current_step));
        }
        triggers
    }

    fn trigger_step(&mut self, step: usize) -> StepTrigger {
        let tracks = self.pattern.active_tracks_at(step);
        let mut click = None;

        if let Some(pool) = self.audio.as_mut() {
            for &track in &tracks {
                pool.play(track);
            }
            if pool.metronome().enabled {
                let kind = ClickType::for_step(step);
                pool.play_click(kind);
                click = Some(kind);
            }
        }

        if !tracks.is_empty() {
            log::debug!("Step {}: tracks {:?}", step, tracks);
        }

        StepTrigger {
            step,
            tracks,
            click,
        }
    }

    /// Change tempo (clamped to 60..=300); progress into the current step is kept
    pub fn set_bpm(&mut self, bpm: u32) {
        let tempo = Tempo::new(bpm);
        if tempo == self.timer.tempo() {
            return;
        }

        let playing = self.state.is_playing();
        self.timer.set_tempo(tempo, self.clock.now(), playing);
        log::info!("Tempo set to {}", tempo);
    }

    pub fn bpm(&self) -> u32 {
        self.timer.tempo().bpm()
    }

    pub fn step_duration(&self) -> f64 {
        self.timer.step_duration()
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Switch timing discipline without losing the playback position
    pub fn set_timing_mode(&mut self, mode: TimingMode) {
        if mode == self.timer.mode() {
            return;
        }
        let playing = self.state.is_playing();
        self.timer.set_mode(mode, self.clock.now(), playing);
        log::info!("Timing mode set to {}", mode);
    }

    /// Switch by name ("clock" / "frame"); unknown names are ignored
    pub fn set_timing_mode_named(&mut self, name: &str) {
        match name.parse::<TimingMode>() {
            Ok(mode) => self.set_timing_mode(mode),
            Err(e) => log::warn!("{}; keeping {} mode", e, self.timer.mode()),
        }
    }

    pub fn timing_mode(&self) -> TimingMode {
        self.timer.mode()
    }

    pub fn timing_info(&self) -> TimingInfo {
        let now = self.clock.now();
        let playing = self.state.is_playing();

        let (elapsed_time, step_progress) = if playing {
            (now - self.timer.start_time(), self.timer.step_progress(now))
        } else {
            (0.0, 0.0)
        };

        TimingInfo {
            mode: self.timer.mode(),
            bpm: self.bpm(),
            step_duration: self.timer.step_duration(),
            is_playing: playing,
            start_time: self.timer.start_time(),
            current_time: now,
            elapsed_time,
            total_steps: self.timer.total_steps(),
            skipped_steps: self.timer.skipped_steps(),
            step_accumulator: self.timer.accumulator(),
            step_progress,
        }
    }

    pub fn audio_status(&self) -> AudioStatus {
        match &self.audio {
            Some(pool) => AudioStatus {
                available: true,
                ready: pool.is_system_ready(),
                backend: Some(pool.backend_name().to_string()),
                reinit_attempts: self.reinit_attempts,
                active_voices: pool.total_active_voices(),
                fallback_voices: pool.fallback_voices(),
            },
            None => AudioStatus {
                available: false,
                ready: false,
                backend: None,
                reinit_attempts: self.reinit_attempts,
                active_voices: 0,
                fallback_voices: 0,
            },
        }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn pattern_mut(&mut self) -> &mut Pattern {
        &mut self.pattern
    }

    pub fn audio(&self) -> Option<&VoicePool> {
        self.audio.as_ref()
    }

    pub fn audio_mut(&mut self) -> Option<&mut VoicePool> {
        self.audio.as_mut()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Current user state for persistence
    pub fn snapshot(&self) -> SequencerSnapshot {
        let (volumes, metronome) = match &self.audio {
            Some(pool) => (pool.volumes().to_vec(), *pool.metronome()),
            None => (vec![DEFAULT_VOLUME; NUM_TRACKS], MetronomeSettings::default()),
        };

        SequencerSnapshot {
            pattern: self.pattern.clone(),
            bpm: self.bpm(),
            volumes,
            metronome,
            timing_mode: self.timer.mode(),
        }
    }

    /// Replace grid and settings in one go
    ///
    /// The snapshot is validated first; on error nothing changes.
    pub fn restore(&mut self, snapshot: SequencerSnapshot) -> Result<(), SnapshotError> {
        snapshot.validate()?;

        self.pattern = snapshot.pattern;
        self.set_bpm(snapshot.bpm);
        self.set_timing_mode(snapshot.timing_mode);

        if let Some(pool) = self.audio.as_mut() {
            for (index, &volume) in snapshot.volumes.iter().enumerate() {
                pool.set_volume(index + 1, volume);
            }
            pool.set_metronome(snapshot.metronome);
        }

        log::info!(
            "Restored pattern with {} notes at {} BPM",
            self.pattern.stats().total_notes,
            self.bpm()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::{NullBackend, NullProbe};
    use crate::sequencer::clock::ManualClock;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn sequencer() -> (Sequencer<ManualClock>, ManualClock, NullProbe) {
        let backend = NullBackend::with_sample_rate(8000);
        let probe = backend.probe();
        let mut pool = VoicePool::new(Box::new(backend));
        pool.init().unwrap();

        let clock = ManualClock::new();
        (Sequencer::new(clock.clone(), Some(pool)), clock, probe)
    }

    #[test]
    fn test_initial_state() {
        let (seq, _, _) = sequencer();
        assert_eq!(seq.state(), TransportState::Stopped);
        assert_eq!(seq.current_step(), 1);
        assert_eq!(seq.bpm(), 120);
        assert_eq!(seq.step_duration(), 0.125);
        assert_eq!(seq.timing_mode(), TimingMode::Clock);
    }

    #[test]
    fn test_step_wraparound() {
        let (mut seq, _, _) = sequencer();
        for expected in 2..=16 {
            seq.advance_step();
            assert_eq!(seq.current_step(), expected);
        }
        seq.advance_step();
        assert_eq!(seq.current_step(), 1);
    }

    #[test]
    fn test_play_triggers_first_step_immediately() {
        let (mut seq, _, probe) = sequencer();
        seq.pattern_mut().toggle(1, 1);
        seq.pattern_mut().toggle(3, 1);
        seq.pattern_mut().toggle(2, 2);

        let trigger = seq.play();
        assert_eq!(trigger.step, 1);
        assert_eq!(trigger.tracks, vec![1, 3]);
        assert_eq!(probe.plays(), vec!["kick".to_string(), "closed_hat".to_string()]);
        assert!(seq.is_playing());
    }

    #[test]
    fn test_update_while_stopped_does_nothing() {
        let (mut seq, clock, probe) = sequencer();
        seq.pattern_mut().toggle(1, 2);
        clock.advance(1.0);
        assert!(seq.update(1.0).is_empty());
        assert_eq!(probe.play_count(), 0);
    }

    #[test]
    fn test_clock_mode_large_frame() {
        let (mut seq, clock, probe) = sequencer();
        seq.pattern_mut().toggle(1, 1);
        seq.pattern_mut().toggle(1, 5);

        seq.play();
        clock.advance(0.3);
        let triggers = seq.update(0.3);

        assert_eq!(triggers.iter().map(|t| t.step).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(seq.current_step(), 3);
        assert_eq!(probe.plays_of("kick"), 1);
    }

    #[test]
    fn test_frame_mode_uses_dt() {
        let (mut seq, clock, _) = sequencer();
        seq.set_timing_mode(TimingMode::Frame);
        seq.play();

        // The wall clock is ignored in Frame mode
        clock.advance(10.0);
        assert!(seq.update(0.1).is_empty());
        assert_eq!(seq.update(0.1).len(), 1);
        assert_eq!(seq.current_step(), 2);
    }

    #[test]
    fn test_play_while_playing_rearms() {
        let (mut seq, clock, probe) = sequencer();
        seq.pattern_mut().toggle(4, 3);
        seq.play();
        clock.advance(0.25);
        seq.update(0.25);
        assert_eq!(seq.current_step(), 3);
        assert_eq!(probe.plays_of("open_hat"), 1);

        let info_before = seq.timing_info();
        let trigger = seq.play();
        assert_eq!(trigger.step, 3);
        assert_eq!(trigger.tracks, vec![4]);
        assert_eq!(probe.plays_of("open_hat"), 2);
        assert_eq!(seq.current_step(), 3);
        assert_eq!(seq.timing_info().start_time, info_before.start_time);
        assert_eq!(seq.timing_info().total_steps, info_before.total_steps);
    }

    #[test]
    fn test_stop_resets_position_but_lets_voices_ring() {
        let (mut seq, clock, probe) = sequencer();
        seq.pattern_mut().toggle(1, 1);
        seq.play();
        clock.advance(0.4);
        seq.update(0.4);

        seq.stop();
        assert_eq!(seq.state(), TransportState::Stopped);
        assert_eq!(seq.current_step(), 1);
        let info = seq.timing_info();
        assert_eq!(info.total_steps, 0);
        assert_eq!(info.step_accumulator, 0.0);
        assert_eq!(info.elapsed_time, 0.0);

        // Stop does not silence the kick
        assert_eq!(probe.playing_volumes("kick").len(), 1);
    }

    #[test]
    fn test_bpm_clamp_and_duration() {
        let (mut seq, _, _) = sequencer();
        seq.set_bpm(240);
        assert_eq!(seq.step_duration(), 0.0625);
        seq.set_bpm(20);
        assert_eq!(seq.bpm(), 60);
        seq.set_bpm(900);
        assert_eq!(seq.bpm(), 300);
    }

    #[test]
    fn test_bpm_change_frame_mode_scales_accumulator() {
        let (mut seq, _, _) = sequencer();
        seq.set_timing_mode(TimingMode::Frame);
        seq.play();
        seq.update(0.3125);
        assert!(approx(seq.timing_info().step_accumulator, 0.0625));

        seq.set_bpm(240);
        let info = seq.timing_info();
        assert!(approx(info.step_accumulator, 0.03125));
        assert!(approx(info.step_progress, 0.5));
    }

    #[test]
    fn test_bpm_change_clock_mode_keeps_progress() {
        let (mut seq, clock, _) = sequencer();
        seq.play();
        clock.advance(0.3125);
        seq.update(0.3125);
        assert_eq!(seq.current_step(), 3);

        seq.set_bpm(240);
        assert!(approx(seq.timing_info().step_progress, 0.5));

        // Half of a 0.0625s step remains
        clock.advance(0.03);
        assert!(seq.update(0.03).is_empty());
        clock.advance(0.005);
        assert_eq!(seq.update(0.005).len(), 1);
        assert_eq!(seq.current_step(), 4);
    }

    #[test]
    fn test_bpm_change_while_stopped_leaves_timing() {
        let (mut seq, clock, _) = sequencer();
        clock.advance(3.0);
        let before = seq.timing_info();
        seq.set_bpm(90);
        let after = seq.timing_info();
        assert_eq!(before.start_time, after.start_time);
        assert_eq!(before.step_accumulator, after.step_accumulator);
        assert_eq!(after.bpm, 90);
    }

    #[test]
    fn test_timing_mode_named() {
        let (mut seq, _, _) = sequencer();
        seq.set_timing_mode_named("frame");
        assert_eq!(seq.timing_mode(), TimingMode::Frame);
        seq.set_timing_mode_named("sundial");
        assert_eq!(seq.timing_mode(), TimingMode::Frame);
        seq.set_timing_mode_named("CLOCK");
        assert_eq!(seq.timing_mode(), TimingMode::Clock);
    }

    #[test]
    fn test_mode_switch_mid_play_keeps_position() {
        let (mut seq, clock, _) = sequencer();
        seq.set_timing_mode(TimingMode::Frame);
        seq.play();
        clock.advance(0.3125);
        seq.update(0.3125);
        assert_eq!(seq.current_step(), 3);

        seq.set_timing_mode(TimingMode::Clock);
        assert!(approx(seq.timing_info().step_progress, 0.5));
        clock.advance(0.07);
        assert_eq!(seq.update(0.07).len(), 1);
        assert_eq!(seq.current_step(), 4);
    }

    #[test]
    fn test_metronome_clicks_on_every_step() {
        let (mut seq, clock, probe) = sequencer();
        seq.audio_mut().unwrap().set_metronome_enabled(true);

        let first = seq.play();
        assert_eq!(first.click, Some(ClickType::Accent));

        clock.advance(0.5);
        let triggers = seq.update(0.5);
        let clicks: Vec<_> = triggers.iter().map(|t| t.click).collect();
        assert_eq!(
            clicks,
            vec![
                Some(ClickType::Regular),
                Some(ClickType::Regular),
                Some(ClickType::Regular),
                Some(ClickType::Accent)
            ]
        );
        assert_eq!(probe.plays_of("click_accent"), 2);
        assert_eq!(probe.plays_of("click_regular"), 3);
    }

    #[test]
    fn test_metronome_disabled_by_default() {
        let (mut seq, _, probe) = sequencer();
        assert_eq!(seq.play().click, None);
        assert_eq!(probe.play_count(), 0);
    }

    #[test]
    fn test_unready_audio_reinitializes_once_and_keeps_playing() {
        let (mut seq, clock, probe) = sequencer();
        seq.pattern_mut().toggle(1, 2);
        probe.set_available(false);

        seq.play();
        assert!(seq.is_playing());
        let status = seq.audio_status();
        assert_eq!(status.reinit_attempts, 1);
        assert!(!status.ready);

        // The clock keeps going with silent triggers
        clock.advance(0.125);
        let triggers = seq.update(0.125);
        assert_eq!(triggers[0].tracks, vec![1]);
        assert_eq!(probe.play_count(), 0);
        assert_eq!(seq.audio_status().reinit_attempts, 1);
    }

    #[test]
    fn test_reinit_recovers_audio() {
        let (mut seq, _, probe) = sequencer();
        seq.pattern_mut().toggle(2, 1);
        probe.set_available(false);
        seq.play();
        seq.stop();

        probe.set_available(true);
        seq.play();
        assert_eq!(seq.audio_status().reinit_attempts, 2);
        assert!(seq.audio_status().ready);
        assert_eq!(probe.plays_of("snare"), 1);
    }

    #[test]
    fn test_without_audio() {
        let clock = ManualClock::new();
        let mut seq: Sequencer<ManualClock> = Sequencer::new(clock.clone(), None);
        seq.pattern_mut().toggle(1, 1);

        let trigger = seq.play();
        assert_eq!(trigger.tracks, vec![1]);

        let status = seq.audio_status();
        assert!(!status.available);
        assert_eq!(status.reinit_attempts, 0);

        clock.advance(0.125);
        assert_eq!(seq.update(0.125).len(), 1);
    }

    #[test]
    fn test_timing_info_while_playing() {
        let (mut seq, clock, _) = sequencer();
        clock.set(100.0);
        seq.play();
        clock.advance(0.2);
        seq.update(0.2);

        let info = seq.timing_info();
        assert!(info.is_playing);
        assert_eq!(info.mode, TimingMode::Clock);
        assert_eq!(info.start_time, 100.0);
        assert!(approx(info.current_time, 100.2));
        assert!(approx(info.elapsed_time, 0.2));
        assert_eq!(info.total_steps, 1);
        assert_eq!(info.skipped_steps, 0);
    }

    #[test]
    fn test_snapshot_restore() {
        let (mut seq, _, _) = sequencer();
        seq.pattern_mut().toggle(5, 9);
        seq.set_bpm(133);
        seq.audio_mut().unwrap().set_volume(3, 0.4);

        let snapshot = seq.snapshot();
        assert_eq!(snapshot.bpm, 133);
        assert_eq!(snapshot.volumes[2], 0.4);

        let (mut other, _, _) = sequencer();
        other.restore(snapshot.clone()).unwrap();
        assert!(other.pattern().get(5, 9));
        assert_eq!(other.bpm(), 133);
        assert_eq!(other.audio().unwrap().volume(3), 0.4);
        assert_eq!(other.snapshot(), snapshot);
    }

    #[test]
    fn test_restore_invalid_leaves_state() {
        let (mut seq, _, _) = sequencer();
        seq.pattern_mut().toggle(1, 1);

        let mut snapshot = seq.snapshot();
        snapshot.pattern.clear();
        snapshot.bpm = 200;
        snapshot.volumes.truncate(3);

        assert!(seq.restore(snapshot).is_err());
        assert!(seq.pattern().get(1, 1));
        assert_eq!(seq.bpm(), 120);
    }
}
