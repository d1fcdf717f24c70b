// Pattern - The 8x16 drum grid
// Tracks are the fixed drum roles, steps are sixteenth notes of one bar

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of drum tracks in a pattern
pub const NUM_TRACKS: usize = 8;

/// Number of sixteenth-note steps in a pattern
pub const NUM_STEPS: usize = 16;

/// The eight fixed drum roles, in track order (track 1 = Kick)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    Kick,
    Snare,
    ClosedHat,
    OpenHat,
    Crash,
    Ride,
    LowTom,
    HighTom,
}

impl Track {
    /// All tracks in ascending track order
    pub const ALL: [Track; NUM_TRACKS] = [
        Track::Kick,
        Track::Snare,
        Track::ClosedHat,
        Track::OpenHat,
        Track::Crash,
        Track::Ride,
        Track::LowTom,
        Track::HighTom,
    ];

    /// Track for a 1-based track number, None when out of range
    pub fn from_number(number: usize) -> Option<Self> {
        number
            .checked_sub(1)
            .and_then(|index| Self::ALL.get(index))
            .copied()
    }

    /// 1-based track number
    pub fn number(self) -> usize {
        self as usize + 1
    }

    /// General MIDI percussion note for this role
    pub fn gm_note(self) -> u8 {
        match self {
            Track::Kick => 36,
            Track::Snare => 38,
            Track::ClosedHat => 42,
            Track::OpenHat => 46,
            Track::Crash => 49,
            Track::Ride => 51,
            Track::LowTom => 45,
            Track::HighTom => 50,
        }
    }

    /// Short lowercase name, also used as sample file stem
    pub fn name(self) -> &'static str {
        match self {
            Track::Kick => "kick",
            Track::Snare => "snare",
            Track::ClosedHat => "closed_hat",
            Track::OpenHat => "open_hat",
            Track::Crash => "crash",
            Track::Ride => "ride",
            Track::LowTom => "low_tom",
            Track::HighTom => "high_tom",
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised when building a pattern from untyped data
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Expected 8 tracks, found {0}")]
    TrackCount(usize),

    #[error("Track {track} has {found} steps, expected 16")]
    StepCount { track: usize, found: usize },

    #[error("Cell at track {track}, step {step} is not a boolean")]
    NonBoolean { track: usize, step: usize },

    #[error("Pattern is not a list of tracks")]
    NotAGrid,
}

/// Note counts for a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatternStats {
    /// Number of active cells
    pub total_notes: usize,
    /// Active cells per track, index 0 = track 1
    pub notes_per_track: [usize; NUM_TRACKS],
    /// Number of distinct steps with at least one active track
    pub active_steps: usize,
}

/// A drum pattern: 8 tracks x 16 steps of on/off cells
///
/// Dimensions are fixed for the lifetime of the value. All indices on the
/// public surface are 1-based; out-of-range indices are silently ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern {
    cells: [[bool; NUM_STEPS]; NUM_TRACKS],
}

impl Pattern {
    /// Create an empty pattern
    pub fn new() -> Self {
        Self::default()
    }

    fn index(track: usize, step: usize) -> Option<(usize, usize)> {
        if (1..=NUM_TRACKS).contains(&track) && (1..=NUM_STEPS).contains(&step) {
            Some((track - 1, step - 1))
        } else {
            None
        }
    }

    /// Flip a cell, no-op when out of range
    pub fn toggle(&mut self, track: usize, step: usize) {
        if let Some((t, s)) = Self::index(track, step) {
            self.cells[t][s] = !self.cells[t][s];
        }
    }

    /// Set a cell, no-op when out of range
    pub fn set(&mut self, track: usize, step: usize, value: bool) {
        if let Some((t, s)) = Self::index(track, step) {
            self.cells[t][s] = value;
        }
    }

    /// Read a cell, false when out of range
    pub fn get(&self, track: usize, step: usize) -> bool {
        Self::index(track, step)
            .map(|(t, s)| self.cells[t][s])
            .unwrap_or(false)
    }

    /// Turn every cell off
    pub fn clear(&mut self) {
        self.cells = [[false; NUM_STEPS]; NUM_TRACKS];
    }

    /// Tracks (1-based, ascending) with an active cell at `step`
    /// Empty for an out-of-range step
    pub fn active_tracks_at(&self, step: usize) -> Vec<usize> {
        if !(1..=NUM_STEPS).contains(&step) {
            return Vec::new();
        }

        (1..=NUM_TRACKS)
            .filter(|&track| self.cells[track - 1][step - 1])
            .collect()
    }

    /// Check if no cell is active
    pub fn is_empty(&self) -> bool {
        self.cells.iter().flatten().all(|&cell| !cell)
    }

    /// Count notes per track and distinct active steps
    pub fn stats(&self) -> PatternStats {
        let mut stats = PatternStats::default();

        for (t, row) in self.cells.iter().enumerate() {
            let count = row.iter().filter(|&&cell| cell).count();
            stats.notes_per_track[t] = count;
            stats.total_notes += count;
        }

        stats.active_steps = (1..=NUM_STEPS)
            .filter(|&step| !self.active_tracks_at(step).is_empty())
            .count();

        stats
    }

    /// Copy of the grid as nested rows (track-major)
    pub fn rows(&self) -> Vec<Vec<bool>> {
        self.cells.iter().map(|row| row.to_vec()).collect()
    }

    /// Build from nested rows, rejecting wrong dimensions
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Result<Self, PatternError> {
        if rows.len() != NUM_TRACKS {
            return Err(PatternError::TrackCount(rows.len()));
        }

        let mut pattern = Self::new();
        for (t, row) in rows.into_iter().enumerate() {
            if row.len() != NUM_STEPS {
                return Err(PatternError::StepCount {
                    track: t + 1,
                    found: row.len(),
                });
            }
            pattern.cells[t].copy_from_slice(&row);
        }

        Ok(pattern)
    }

    /// Build from an untyped JSON grid (as handed over by persistence)
    ///
    /// Reports the first problem found: missing/extra tracks, wrong step
    /// count, or a cell that is not a boolean.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, PatternError> {
        let tracks = value.as_array().ok_or(PatternError::NotAGrid)?;
        if tracks.len() != NUM_TRACKS {
            return Err(PatternError::TrackCount(tracks.len()));
        }

        let mut rows = Vec::with_capacity(NUM_TRACKS);
        for (t, track) in tracks.iter().enumerate() {
            let steps = track.as_array().ok_or(PatternError::NotAGrid)?;
            if steps.len() != NUM_STEPS {
                return Err(PatternError::StepCount {
                    track: t + 1,
                    found: steps.len(),
                });
            }

            let row = steps
                .iter()
                .enumerate()
                .map(|(s, cell)| {
                    cell.as_bool().ok_or(PatternError::NonBoolean {
                        track: t + 1,
                        step: s + 1,
                    })
                })
                .collect::<Result<Vec<bool>, _>>()?;
            rows.push(row);
        }

        Self::from_rows(rows)
    }
}
