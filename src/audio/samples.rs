// Samples - One-shot drum buffers
// Procedural kit synthesis plus WAV/FLAC loading, mono at the backend rate

use super::backend::AudioError;
use crate::sequencer::pattern::Track;
use claxon::FlacReader;
use hound::{SampleFormat, WavReader};
use std::f32::consts::PI;
use std::path::Path;

/// Mono sample data with its rate
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub name: String,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(name: impl Into<String>, samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    /// Load a WAV or FLAC file, downmixed to mono
    pub fn from_file(path: &Path, name: impl Into<String>) -> Result<Self, AudioError> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        let (samples, sample_rate) = match extension.as_str() {
            "wav" => load_wav(path),
            "flac" => load_flac(path),
            _ => Err(format!("Unsupported file format: {}", extension)),
        }
        .map_err(|reason| AudioError::SampleLoad {
            path: path.to_path_buf(),
            reason,
        })?;

        if samples.is_empty() {
            return Err(AudioError::SampleLoad {
                path: path.to_path_buf(),
                reason: "file contains no audio".to_string(),
            });
        }

        Ok(Self::new(name, samples, sample_rate))
    }

    /// Linear-interpolation resample to another rate
    pub fn resampled(&self, target_rate: u32) -> SampleBuffer {
        if self.sample_rate == target_rate || self.sample_rate == 0 || self.samples.is_empty() {
            return SampleBuffer::new(self.name.clone(), self.samples.clone(), target_rate);
        }

        let ratio = target_rate as f64 / self.sample_rate as f64;
        let out_len = (self.samples.len() as f64 * ratio).ceil() as usize;
        let last = self.samples.len() - 1;

        let samples = (0..out_len)
            .map(|i| {
                let src_pos = i as f64 / ratio;
                let idx = src_pos.floor() as usize;
                if idx >= last {
                    self.samples[last]
                } else {
                    let frac = (src_pos - idx as f64) as f32;
                    self.samples[idx] * (1.0 - frac) + self.samples[idx + 1] * frac
                }
            })
            .collect();

        SampleBuffer::new(self.name.clone(), samples, target_rate)
    }
}

fn load_wav(path: &Path) -> Result<(Vec<f32>, u32), String> {
    let reader = WavReader::open(path).map_err(|e| e.to_string())?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| e.to_string())?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| e.to_string())?
        }
    };

    Ok((downmix(&interleaved, spec.channels as usize), spec.sample_rate))
}

fn load_flac(path: &Path) -> Result<(Vec<f32>, u32), String> {
    let mut reader = FlacReader::open(path).map_err(|e| e.to_string())?;
    let info = reader.streaminfo();
    let scale = (1i64 << (info.bits_per_sample.max(1) - 1)) as f32;

    let interleaved: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / scale))
        .collect::<Result<_, _>>()
        .map_err(|e| e.to_string())?;

    Ok((downmix(&interleaved, info.channels as usize), info.sample_rate))
}

/// Average interleaved frames down to one channel
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// One buffer per drum role
#[derive(Debug, Clone)]
pub struct SampleKit {
    buffers: Vec<SampleBuffer>,
}

impl SampleKit {
    /// Fully synthesized kit
    pub fn synthesized(sample_rate: u32) -> Self {
        Self {
            buffers: Track::ALL
                .iter()
                .map(|&track| synthesize(track, sample_rate))
                .collect(),
        }
    }

    /// Load `<role>.wav` or `<role>.flac` from a directory
    ///
    /// Roles without a usable file get the synthesized sound.
    pub fn load_dir(dir: &Path, sample_rate: u32) -> Self {
        let buffers = Track::ALL
            .iter()
            .map(|&track| {
                for extension in ["wav", "flac"] {
                    let path = dir.join(format!("{}.{}", track.name(), extension));
                    if !path.exists() {
                        continue;
                    }
                    match SampleBuffer::from_file(&path, track.name()) {
                        Ok(buffer) => {
                            log::info!("Loaded {} from {}", track, path.display());
                            return buffer.resampled(sample_rate);
                        }
                        Err(e) => log::warn!("{}; using synthesized {}", e, track),
                    }
                }
                synthesize(track, sample_rate)
            })
            .collect();

        Self { buffers }
    }

    pub fn get(&self, track: Track) -> &SampleBuffer {
        &self.buffers[track.number() - 1]
    }

    pub fn buffers(&self) -> &[SampleBuffer] {
        &self.buffers
    }
}

/// Deterministic one-shot for a drum role
pub fn synthesize(track: Track, sample_rate: u32) -> SampleBuffer {
    let rate = sample_rate.max(1) as f32;
    let mut rng = fastrand::Rng::with_seed(track.number() as u64);

    let samples = match track {
        Track::Kick => sweep(rate, 0.35, 150.0, 50.0, 30.0, 8.0),
        Track::Snare => {
            let n = (0.2 * rate) as usize;
            (0..n)
                .map(|i| {
                    let t = i as f32 / rate;
                    let tone = (2.0 * PI * 180.0 * t).sin() * (-t * 20.0).exp() * 0.5;
                    let noise = (rng.f32() * 2.0 - 1.0) * (-t * 15.0).exp() * 0.6;
                    tone + noise
                })
                .collect()
        }
        Track::ClosedHat => hat(&mut rng, rate, 0.06, 60.0),
        Track::OpenHat => hat(&mut rng, rate, 0.35, 8.0),
        Track::Crash => cymbal(&mut rng, rate, 1.2, 3.0, &[3100.0, 4400.0, 5900.0], 0.7),
        Track::Ride => cymbal(&mut rng, rate, 0.8, 4.0, &[3200.0, 4700.0, 6100.0], 0.25),
        Track::LowTom => sweep(rate, 0.4, 120.0, 80.0, 12.0, 7.0),
        Track::HighTom => sweep(rate, 0.3, 200.0, 140.0, 12.0, 9.0),
    };

    SampleBuffer::new(track.name(), normalize(samples, 0.9), sample_rate)
}

/// Pitched sine falling from `start_hz` toward `end_hz`
fn sweep(
    rate: f32,
    seconds: f32,
    start_hz: f32,
    end_hz: f32,
    pitch_decay: f32,
    amp_decay: f32,
) -> Vec<f32> {
    let n = (seconds * rate) as usize;
    let mut phase = 0.0f32;
    (0..n)
        .map(|i| {
            let t = i as f32 / rate;
            let freq = end_hz + (start_hz - end_hz) * (-t * pitch_decay).exp();
            phase = (phase + 2.0 * PI * freq / rate) % (2.0 * PI);
            phase.sin() * (-t * amp_decay).exp()
        })
        .collect()
}

/// High-passed noise burst
fn hat(rng: &mut fastrand::Rng, rate: f32, seconds: f32, decay: f32) -> Vec<f32> {
    let n = (seconds * rate) as usize;
    let mut prev_in = 0.0f32;
    let mut prev_out = 0.0f32;
    (0..n)
        .map(|i| {
            let t = i as f32 / rate;
            let x = rng.f32() * 2.0 - 1.0;
            prev_out = 0.7 * (prev_out + x - prev_in);
            prev_in = x;
            prev_out * (-t * decay).exp()
        })
        .collect()
}

/// Noise plus inharmonic partials
fn cymbal(
    rng: &mut fastrand::Rng,
    rate: f32,
    seconds: f32,
    decay: f32,
    partials: &[f32],
    noise_level: f32,
) -> Vec<f32> {
    let n = (seconds * rate) as usize;
    let tone_level = 1.0 / partials.len().max(1) as f32;
    (0..n)
        .map(|i| {
            let t = i as f32 / rate;
            let tone = partials
                .iter()
                .map(|f| (2.0 * PI * f * t).sin())
                .sum::<f32>()
                * tone_level;
            let noise = rng.f32() * 2.0 - 1.0;
            (tone * (1.0 - noise_level) + noise * noise_level) * (-t * decay).exp()
        })
        .collect()
}

fn normalize(mut samples: Vec<f32>, target_peak: f32) -> Vec<f32> {
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if peak > 0.0 {
        let gain = target_peak / peak;
        samples.iter_mut().for_each(|s| *s *= gain);
    }
    samples
}
