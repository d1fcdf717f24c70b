// Timeline - Tempo and step timing
// Converts BPM to sixteenth-note step durations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Slowest allowed tempo
pub const MIN_BPM: u32 = 60;

/// Fastest allowed tempo
pub const MAX_BPM: u32 = 300;

/// Tempo on engine start
pub const DEFAULT_BPM: u32 = 120;

/// Steps per quarter note (sixteenth notes)
pub const STEPS_PER_BEAT: u32 = 4;

/// Tempo in BPM (Beats Per Minute), always within [MIN_BPM, MAX_BPM]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tempo {
    bpm: u32,
}

impl Tempo {
    /// Creates a new tempo, clamping into the allowed range
    pub fn new(bpm: u32) -> Self {
        Self {
            bpm: bpm.clamp(MIN_BPM, MAX_BPM),
        }
    }

    /// Get BPM value
    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Duration of one beat (quarter note) in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm as f64
    }

    /// Duration of one step (sixteenth note) in seconds
    pub fn step_duration_seconds(&self) -> f64 {
        self.beat_duration_seconds() / STEPS_PER_BEAT as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM", self.bpm)
    }
}

/// Step-advancement discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    /// Step boundaries derived from the absolute start time (drift-free)
    #[default]
    Clock,
    /// Step boundaries found by accumulating per-frame delta times
    Frame,
}

impl TimingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimingMode::Clock => "clock",
            TimingMode::Frame => "frame",
        }
    }
}

impl fmt::Display for TimingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown timing mode name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown timing mode: {0}")]
pub struct UnknownTimingMode(pub String);

impl FromStr for TimingMode {
    type Err = UnknownTimingMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clock" => Ok(TimingMode::Clock),
            "frame" => Ok(TimingMode::Frame),
            _ => Err(UnknownTimingMode(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo() {
        let tempo = Tempo::new(120);
        assert_eq!(tempo.bpm(), 120);
        assert_eq!(tempo.beat_duration_seconds(), 0.5);

        // At 120 BPM, one sixteenth = 0.125s
        assert_eq!(tempo.step_duration_seconds(), 0.125);
        assert_eq!(Tempo::new(240).step_duration_seconds(), 0.0625);
    }

    #[test]
    fn test_step_duration_formula_over_range() {
        for bpm in MIN_BPM..=MAX_BPM {
            let expected = 60.0 / bpm as f64 / 4.0;
            let actual = Tempo::new(bpm).step_duration_seconds();
            assert!((actual - expected).abs() < 1e-12, "bpm {}", bpm);
        }
    }

    #[test]
    fn test_tempo_clamped() {
        assert_eq!(Tempo::new(10).bpm(), MIN_BPM);
        assert_eq!(Tempo::new(1000).bpm(), MAX_BPM);
        assert_eq!(Tempo::default().bpm(), DEFAULT_BPM);
        assert_eq!(Tempo::new(97).to_string(), "97 BPM");
    }

    #[test]
    fn test_timing_mode_parsing() {
        assert_eq!("clock".parse::<TimingMode>(), Ok(TimingMode::Clock));
        assert_eq!(" Frame ".parse::<TimingMode>(), Ok(TimingMode::Frame));
        assert!("tick".parse::<TimingMode>().is_err());
        assert_eq!(TimingMode::default(), TimingMode::Clock);
        assert_eq!(TimingMode::Frame.to_string(), "frame");
    }
}
