// Snapshot - Bulk state for the persistence collaborator
// Grid, tempo, volumes, metronome and timing mode in one serde value

use super::metronome::MetronomeSettings;
use super::pattern::{NUM_TRACKS, Pattern};
use super::timeline::TimingMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Expected 8 track volumes, found {0}")]
    VolumeCount(usize),

    #[error("Track {track} volume is not a finite number")]
    InvalidVolume { track: usize },

    #[error("Metronome volume is not a finite number")]
    InvalidClickVolume,

    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything needed to rebuild the sequencer's user state
///
/// Volumes outside 0.0..=1.0 are accepted and clamped on restore; only
/// non-finite values are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerSnapshot {
    pub pattern: Pattern,
    pub bpm: u32,
    pub volumes: Vec<f32>,
    #[serde(default)]
    pub metronome: MetronomeSettings,
    #[serde(default)]
    pub timing_mode: TimingMode,
}

impl SequencerSnapshot {
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.volumes.len() != NUM_TRACKS {
            return Err(SnapshotError::VolumeCount(self.volumes.len()));
        }

        if let Some(index) = self.volumes.iter().position(|v| !v.is_finite()) {
            return Err(SnapshotError::InvalidVolume { track: index + 1 });
        }

        if !self.metronome.regular_volume.is_finite() || !self.metronome.accent_volume.is_finite() {
            return Err(SnapshotError::InvalidClickVolume);
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: SequencerSnapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> SequencerSnapshot {
        let mut pattern = Pattern::new();
        pattern.toggle(1, 1);
        pattern.toggle(2, 5);

        SequencerSnapshot {
            pattern,
            bpm: 96,
            volumes: vec![0.7; NUM_TRACKS],
            metronome: MetronomeSettings::default(),
            timing_mode: TimingMode::Frame,
        }
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = sample_snapshot();
        let json = snapshot.to_json().unwrap();
        let parsed = SequencerSnapshot::from_json(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_optional_fields_default() {
        let mut grid = vec![vec![false; 16]; 8];
        grid[0][0] = true;
        let json = serde_json::json!({
            "pattern": grid,
            "bpm": 120,
            "volumes": [0.7, 0.7, 0.7, 0.7, 0.7, 0.7, 0.7, 0.7],
        });

        let snapshot = SequencerSnapshot::from_json(&json.to_string()).unwrap();
        assert!(snapshot.pattern.get(1, 1));
        assert_eq!(snapshot.timing_mode, TimingMode::Clock);
        assert!(!snapshot.metronome.enabled);
    }

    #[test]
    fn test_rejects_wrong_volume_count() {
        let mut snapshot = sample_snapshot();
        snapshot.volumes.pop();
        assert!(matches!(snapshot.validate(), Err(SnapshotError::VolumeCount(7))));
    }

    #[test]
    fn test_rejects_nan_volume() {
        let mut snapshot = sample_snapshot();
        snapshot.volumes[3] = f32::NAN;
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::InvalidVolume { track: 4 })
        ));
    }

    #[test]
    fn test_rejects_malformed_grid() {
        let json = r#"{"pattern": [[true]], "bpm": 120, "volumes": []}"#;
        assert!(matches!(
            SequencerSnapshot::from_json(json),
            Err(SnapshotError::Json(_))
        ));
    }
}
