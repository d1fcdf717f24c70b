// MIDI export - Pattern to Standard MIDI File (format 0)
// One bar of sixteenth-note steps on the General MIDI percussion channel

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde_json::Value;

use super::event::{DRUM_CHANNEL, SmfEvent};
use super::smf;
use crate::sequencer::pattern::{NUM_STEPS, Pattern, PatternError, PatternStats, Track};

/// Default ticks per quarter note
pub const DEFAULT_RESOLUTION: u16 = 96;

/// Default Note On velocity
pub const DEFAULT_VELOCITY: u8 = 100;

/// Smallest resolution that still gives each step at least one tick
pub const MIN_RESOLUTION: u16 = 4;

/// Division field is 15 bits in ticks-per-quarter mode
pub const MAX_RESOLUTION: u16 = 0x7FFF;

pub const TRACK_NAME: &str = "Drum Pattern";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No tempo given for export")]
    MissingTempo,

    #[error("Tempo of {0} BPM cannot be written as a MIDI tempo")]
    TempoOutOfRange(u32),

    #[error("Resolution {0} is outside 4..=32767 ticks per quarter note")]
    InvalidResolution(u16),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] PatternError),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-call overrides for `MidiExporter::export_with_options`
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub bpm: Option<u32>,
    pub velocity: Option<u8>,
    pub resolution: Option<u16>,
    /// Defaults to a timestamped `pattern_YYYYMMDD_HHMMSS.mid`
    pub filename: Option<PathBuf>,
}

/// True for an 8x16 grid of booleans
pub fn validate_pattern(value: &Value) -> bool {
    Pattern::from_json(value).is_ok()
}

/// Note counts for a JSON grid, None when it is not a valid pattern
pub fn pattern_stats(value: &Value) -> Option<PatternStats> {
    Pattern::from_json(value).ok().map(|p| p.stats())
}

/// Export filename for a given moment
pub fn filename_for(timestamp: DateTime<Local>) -> PathBuf {
    PathBuf::from(timestamp.format("pattern_%Y%m%d_%H%M%S.mid").to_string())
}

pub fn default_filename() -> PathBuf {
    filename_for(Local::now())
}

/// Microseconds per quarter note, if it fits the 24-bit tempo field
pub fn tempo_micros(bpm: u32) -> Result<u32, ExportError> {
    if bpm == 0 {
        return Err(ExportError::TempoOutOfRange(bpm));
    }
    let micros = 60_000_000 / bpm;
    if micros == 0 || micros > 0xFF_FFFF {
        return Err(ExportError::TempoOutOfRange(bpm));
    }
    Ok(micros)
}

/// Pattern to SMF encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiExporter {
    velocity: u8,
    resolution: u16,
}

impl Default for MidiExporter {
    fn default() -> Self {
        Self {
            velocity: DEFAULT_VELOCITY,
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

impl MidiExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// Clamped to 1..=127 (0 would read as Note Off)
    pub fn set_velocity(&mut self, velocity: u8) {
        self.velocity = velocity.clamp(1, 127);
    }

    pub fn resolution(&self) -> u16 {
        self.resolution
    }

    pub fn set_resolution(&mut self, resolution: u16) -> Result<(), ExportError> {
        if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&resolution) {
            return Err(ExportError::InvalidResolution(resolution));
        }
        self.resolution = resolution;
        Ok(())
    }

    /// A sixteenth note is a quarter of a quarter note
    pub fn ticks_per_step(&self) -> u32 {
        self.resolution as u32 * 4 / NUM_STEPS as u32
    }

    /// Absolute-tick events in generation order
    ///
    /// Track name, tempo, then a Note On/Note Off pair per active cell
    /// (step-major, tracks ascending), then End of Track after one bar.
    pub fn build_events(&self, pattern: &Pattern, bpm: u32) -> Result<Vec<SmfEvent>, ExportError> {
        let micros = tempo_micros(bpm)?;
        let ticks_per_step = self.ticks_per_step();
        let note_length = (ticks_per_step / 2).max(1);

        let mut events = Vec::with_capacity(3 + pattern.stats().total_notes * 2);
        events.push(SmfEvent::track_name(0, TRACK_NAME));
        events.push(SmfEvent::tempo(0, micros));

        for step in 1..=NUM_STEPS {
            let tick = (step as u32 - 1) * ticks_per_step;
            for track in pattern.active_tracks_at(step) {
                let Some(role) = Track::from_number(track) else {
                    continue;
                };
                let note = role.gm_note();
                events.push(SmfEvent::note_on(tick, DRUM_CHANNEL, note, self.velocity));
                events.push(SmfEvent::note_off(tick + note_length, DRUM_CHANNEL, note));
            }
        }

        events.push(SmfEvent::end_of_track(self.resolution as u32 * 4));
        Ok(events)
    }

    /// Full file bytes
    pub fn encode(&self, pattern: &Pattern, bpm: u32) -> Result<Vec<u8>, ExportError> {
        let events = self.build_events(pattern, bpm)?;
        Ok(smf::format0_file(&events, self.resolution))
    }

    /// Encode and write; nothing touches the disk unless encoding succeeded
    pub fn export_pattern(
        &self,
        pattern: &Pattern,
        bpm: Option<u32>,
        path: &Path,
    ) -> Result<(), ExportError> {
        let bpm = bpm.ok_or(ExportError::MissingTempo)?;
        let bytes = self.encode(pattern, bpm)?;

        std::fs::write(path, &bytes).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        log::info!(
            "Exported {} notes at {} BPM to {} ({} bytes)",
            pattern.stats().total_notes,
            bpm,
            path.display(),
            bytes.len()
        );
        Ok(())
    }

    /// Validate a JSON grid, then export it
    pub fn export_json(
        &self,
        value: &Value,
        bpm: Option<u32>,
        path: &Path,
    ) -> Result<(), ExportError> {
        let pattern = Pattern::from_json(value)?;
        self.export_pattern(&pattern, bpm, path)
    }

    /// Export with temporary velocity/resolution overrides
    ///
    /// The exporter's own settings are restored when this returns, on the
    /// error path too. Returns the path written.
    pub fn export_with_options(
        &mut self,
        pattern: &Pattern,
        options: &ExportOptions,
    ) -> Result<PathBuf, ExportError> {
        let mut scoped = ScopedOverride::new(self);

        if let Some(velocity) = options.velocity {
            scoped.set_velocity(velocity);
        }
        if let Some(resolution) = options.resolution {
            scoped.set_resolution(resolution)?;
        }

        let path = options.filename.clone().unwrap_or_else(default_filename);
        scoped.export_pattern(pattern, options.bpm, &path)?;
        Ok(path)
    }
}

/// Restores velocity and resolution on drop
struct ScopedOverride<'a> {
    exporter: &'a mut MidiExporter,
    saved: MidiExporter,
}

impl<'a> ScopedOverride<'a> {
    fn new(exporter: &'a mut MidiExporter) -> Self {
        let saved = exporter.clone();
        Self { exporter, saved }
    }
}

impl Deref for ScopedOverride<'_> {
    type Target = MidiExporter;

    fn deref(&self) -> &MidiExporter {
        &*self.exporter
    }
}

impl DerefMut for ScopedOverride<'_> {
    fn deref_mut(&mut self) -> &mut MidiExporter {
        &mut *self.exporter
    }
}

impl Drop for ScopedOverride<'_> {
    fn drop(&mut self) {
        *self.exporter = self.saved.clone();
    }
}
