// Transport - Playback state and step timing disciplines
// Decides how many step boundaries were crossed since the last update

use super::timeline::{Tempo, TimingMode};

/// Upper bound on steps processed by a single update call
pub const MAX_STEPS_PER_UPDATE: u64 = 32;

/// Transport state (play/stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped)
    }
}

/// Step timer
///
/// Owns the timing reference for both disciplines:
/// - Frame mode accumulates per-call delta times
/// - Clock mode derives the due step count from an absolute start time,
///   so rounding never compounds across calls
///
/// The timer only counts boundaries. Step position and triggering belong to
/// the sequencer.
#[derive(Debug, Clone)]
pub struct StepTimer {
    mode: TimingMode,
    tempo: Tempo,
    step_duration: f64,
    accumulator: f64,
    start_time: f64,
    total_steps: u64,
    skipped_steps: u64,
}

impl StepTimer {
    pub fn new(tempo: Tempo, mode: TimingMode) -> Self {
        Self {
            mode,
            tempo,
            step_duration: tempo.step_duration_seconds(),
            accumulator: 0.0,
            start_time: 0.0,
            total_steps: 0,
            skipped_steps: 0,
        }
    }

    /// Start a fresh timing reference at `now`
    pub fn start(&mut self, now: f64) {
        self.start_time = now;
        self.accumulator = 0.0;
        self.total_steps = 0;
        self.skipped_steps = 0;
    }

    /// Forget all progress (transport stopped)
    pub fn reset(&mut self) {
        self.start(0.0);
    }

    /// Count the step boundaries crossed since the last call
    ///
    /// `dt` feeds Frame mode, `now` feeds Clock mode. The result never
    /// exceeds MAX_STEPS_PER_UPDATE; anything beyond is dropped and counted
    /// in `skipped_steps`.
    pub fn due_steps(&mut self, now: f64, dt: f64) -> u64 {
        let steps = match self.mode {
            TimingMode::Frame => self.due_steps_frame(dt),
            TimingMode::Clock => self.due_steps_clock(now),
        };
        self.total_steps = self.total_steps.saturating_add(steps);
        steps
    }

    fn due_steps_frame(&mut self, dt: f64) -> u64 {
        if dt.is_finite() && dt > 0.0 {
            self.accumulator += dt;
        }

        let mut steps = 0;
        while self.accumulator >= self.step_duration && steps < MAX_STEPS_PER_UPDATE {
            self.accumulator -= self.step_duration;
            steps += 1;
        }

        if self.accumulator >= self.step_duration {
            // Casting saturates, so a huge gap drops at most u64::MAX steps
            let dropped = (self.accumulator / self.step_duration).floor() as u64;
            self.accumulator %= self.step_duration;
            self.note_dropped(dropped);
        }

        steps
    }

    fn due_steps_clock(&mut self, now: f64) -> u64 {
        let elapsed = (now - self.start_time).max(0.0);
        let target = (elapsed / self.step_duration).floor() as u64;
        let due = target.saturating_sub(self.total_steps);
        let steps = due.min(MAX_STEPS_PER_UPDATE);

        if due > steps {
            let dropped = due - steps;
            // Move the reference so the dropped steps are never due again
            self.start_time += dropped as f64 * self.step_duration;
            self.note_dropped(dropped);
        }

        steps
    }

    fn note_dropped(&mut self, dropped: u64) {
        self.skipped_steps = self.skipped_steps.saturating_add(dropped);
        log::warn!(
            "Timing gap too large: dropped {} steps (limit {} per update)",
            dropped,
            MAX_STEPS_PER_UPDATE
        );
    }

    /// Change tempo, rescaling progress proportionally while playing
    ///
    /// The fraction of the current step already elapsed is kept, so the next
    /// boundary lands where the new tempo puts it.
    pub fn set_tempo(&mut self, tempo: Tempo, now: f64, playing: bool) {
        let old_duration = self.step_duration;
        self.tempo = tempo;
        self.step_duration = tempo.step_duration_seconds();

        if !playing || old_duration == self.step_duration {
            return;
        }

        let ratio = self.step_duration / old_duration;
        match self.mode {
            TimingMode::Frame => self.accumulator *= ratio,
            TimingMode::Clock => {
                let elapsed = now - self.start_time;
                self.start_time = now - elapsed * ratio;
            }
        }
    }

    /// Switch discipline, carrying the position over
    pub fn set_mode(&mut self, mode: TimingMode, now: f64, playing: bool) {
        if mode == self.mode {
            return;
        }

        if playing {
            match mode {
                TimingMode::Clock => {
                    let position = self.total_steps as f64 * self.step_duration + self.accumulator;
                    self.start_time = now - position;
                    self.accumulator = 0.0;
                }
                TimingMode::Frame => {
                    let elapsed = now - self.start_time;
                    let consumed = self.total_steps as f64 * self.step_duration;
                    self.accumulator = (elapsed - consumed).max(0.0);
                }
            }
        }

        self.mode = mode;
    }

    pub fn mode(&self) -> TimingMode {
        self.mode
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn step_duration(&self) -> f64 {
        self.step_duration
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn skipped_steps(&self) -> u64 {
        self.skipped_steps
    }

    /// Fraction of the current step already elapsed, in [0, 1)
    pub fn step_progress(&self, now: f64) -> f64 {
        let progress = match self.mode {
            TimingMode::Frame => self.accumulator / self.step_duration,
            TimingMode::Clock => {
                (now - self.start_time) / self.step_duration - self.total_steps as f64
            }
        };
        progress.clamp(0.0, 1.0)
    }
}

impl Default for StepTimer {
    fn default() -> Self {
        Self::new(Tempo::default(), TimingMode::default())
    }
}
