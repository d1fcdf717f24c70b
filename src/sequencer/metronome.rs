// Metronome - Click sounds and settings
// Accent clicks on quarter-note steps 1, 5, 9, 13; regular clicks elsewhere

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Metronome click type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickType {
    /// Click on the quarter-note steps (1, 5, 9, 13)
    Accent,
    /// Click on the other steps
    Regular,
}

impl ClickType {
    /// Click used for a 1-based step
    pub fn for_step(step: usize) -> Self {
        if step >= 1 && (step - 1) % 4 == 0 {
            ClickType::Accent
        } else {
            ClickType::Regular
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClickType::Accent => "click_accent",
            ClickType::Regular => "click_regular",
        }
    }
}

/// User-facing metronome state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetronomeSettings {
    pub enabled: bool,
    pub regular_volume: f32,
    pub accent_volume: f32,
}

impl MetronomeSettings {
    pub fn volume(&self, click: ClickType) -> f32 {
        match click {
            ClickType::Accent => self.accent_volume,
            ClickType::Regular => self.regular_volume,
        }
    }

    /// Set one click's volume (clamped to 0.0..=1.0)
    pub fn set_volume(&mut self, click: ClickType, volume: f32) {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        match click {
            ClickType::Accent => self.accent_volume = volume,
            ClickType::Regular => self.regular_volume = volume,
        }
    }
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            regular_volume: 0.5,
            accent_volume: 0.5,
        }
    }
}

/// Metronome click sound generator
/// Pre-generates short click samples once per sample rate
#[derive(Debug, Clone)]
pub struct MetronomeSound {
    accent_samples: Vec<f32>,
    regular_samples: Vec<f32>,
}

impl MetronomeSound {
    const CLICK_DURATION_MS: f32 = 10.0;

    pub fn new(sample_rate: f32) -> Self {
        let click_samples = ((Self::CLICK_DURATION_MS / 1000.0) * sample_rate) as usize;

        Self {
            accent_samples: Self::generate_click(sample_rate, click_samples, 1200.0, 0.6),
            regular_samples: Self::generate_click(sample_rate, click_samples, 800.0, 0.4),
        }
    }

    /// Sine burst with a fast exponential decay
    fn generate_click(
        sample_rate: f32,
        num_samples: usize,
        frequency: f32,
        amplitude: f32,
    ) -> Vec<f32> {
        let phase_increment = 2.0 * PI * frequency / sample_rate;

        (0..num_samples)
            .map(|i| {
                let t = i as f32 / num_samples as f32;
                let envelope = (-t * 8.0).exp();
                (i as f32 * phase_increment).sin() * envelope * amplitude
            })
            .collect()
    }

    pub fn get_click(&self, click_type: ClickType) -> &[f32] {
        match click_type {
            ClickType::Accent => &self.accent_samples,
            ClickType::Regular => &self.regular_samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_for_step() {
        let accents: Vec<usize> = (1..=16)
            .filter(|&s| ClickType::for_step(s) == ClickType::Accent)
            .collect();
        assert_eq!(accents, vec![1, 5, 9, 13]);
        assert_eq!(ClickType::for_step(0), ClickType::Regular);
    }

    #[test]
    fn test_metronome_sound_generation() {
        let sound = MetronomeSound::new(48000.0);

        let accent = sound.get_click(ClickType::Accent);
        let regular = sound.get_click(ClickType::Regular);

        // 10ms at 48kHz = 480 samples
        assert_eq!(accent.len(), 480);
        assert_eq!(regular.len(), 480);

        let accent_peak = accent.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        let regular_peak = regular.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        assert!(accent_peak > regular_peak);
    }

    #[test]
    fn test_settings_defaults_and_clamp() {
        let mut settings = MetronomeSettings::default();
        assert!(!settings.enabled);

        settings.set_volume(ClickType::Accent, 1.4);
        settings.set_volume(ClickType::Regular, -2.0);
        assert_eq!(settings.volume(ClickType::Accent), 1.0);
        assert_eq!(settings.volume(ClickType::Regular), 0.0);
    }
}
