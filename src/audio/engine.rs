// Audio engine - cpal output backend
//
// # Format Support
//
// The output stream adapts to the device's preferred sample format:
// - **F32**: native, no conversion
// - **I16**: common on Windows/WASAPI
// - **U16**: rare
//
// Mixing happens in f32; conversion to the device format happens when the
// frame is written, without allocation.
//
// # Stream Limitations
//
// The cpal Stream is not Send on every platform, so the backend lives on the
// thread that created it. A stream error marks the backend unavailable and
// `reset()` rebuilds the stream.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::backend::{AudioBackend, AudioError, BufferHandle, VoiceHandle};
use super::samples::SampleBuffer;

#[derive(Debug, Clone)]
struct MixerVoice {
    buffer: usize,
    position: usize,
    volume: f32,
    playing: bool,
}

/// Voice mixer shared with the audio callback
///
/// Slots are allocated on the control thread; the callback only reads
/// samples and advances positions.
#[derive(Debug, Default)]
pub(crate) struct Mixer {
    buffers: Vec<Arc<[f32]>>,
    voices: Vec<Option<MixerVoice>>,
    free_slots: Vec<usize>,
}

impl Mixer {
    pub(crate) fn add_buffer(&mut self, samples: &[f32]) -> BufferHandle {
        self.buffers.push(Arc::from(samples));
        BufferHandle::new(self.buffers.len() as u32 - 1)
    }

    pub(crate) fn create_voice(&mut self, buffer: BufferHandle) -> Result<VoiceHandle, AudioError> {
        let index = buffer.id() as usize;
        if index >= self.buffers.len() {
            return Err(AudioError::UnknownBuffer(buffer));
        }

        let voice = MixerVoice {
            buffer: index,
            position: 0,
            volume: 1.0,
            playing: false,
        };

        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.voices[slot] = Some(voice);
                slot
            }
            None => {
                self.voices.push(Some(voice));
                self.voices.len() - 1
            }
        };

        Ok(VoiceHandle::new(slot as u32))
    }

    fn voice_mut(&mut self, voice: VoiceHandle) -> Option<&mut MixerVoice> {
        self.voices.get_mut(voice.id() as usize).and_then(Option::as_mut)
    }

    pub(crate) fn set_volume(&mut self, voice: VoiceHandle, volume: f32) {
        if let Some(v) = self.voice_mut(voice) {
            v.volume = volume;
        }
    }

    pub(crate) fn play(&mut self, voice: VoiceHandle) -> Result<(), AudioError> {
        let v = self.voice_mut(voice).ok_or(AudioError::UnknownVoice(voice))?;
        v.position = 0;
        v.playing = true;
        Ok(())
    }

    pub(crate) fn stop(&mut self, voice: VoiceHandle) {
        if let Some(v) = self.voice_mut(voice) {
            v.playing = false;
        }
    }

    pub(crate) fn is_playing(&self, voice: VoiceHandle) -> bool {
        self.voices
            .get(voice.id() as usize)
            .and_then(Option::as_ref)
            .is_some_and(|v| v.playing)
    }

    pub(crate) fn release(&mut self, voice: VoiceHandle) {
        let slot = voice.id() as usize;
        if let Some(entry) = self.voices.get_mut(slot) {
            if entry.take().is_some() {
                self.free_slots.push(slot);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.buffers.clear();
        self.voices.clear();
        self.free_slots.clear();
    }

    /// Sum of every playing voice for one frame
    #[inline]
    pub(crate) fn next_sample(&mut self) -> f32 {
        let mut sum = 0.0;
        for v in self.voices.iter_mut().flatten() {
            if !v.playing {
                continue;
            }
            let samples = &self.buffers[v.buffer];
            match samples.get(v.position) {
                Some(&s) => {
                    sum += s * v.volume;
                    v.position += 1;
                }
                None => v.playing = false,
            }
        }
        sum
    }
}

#[inline]
fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < 1e-15 { 0.0 } else { x }
}

#[inline]
fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// Output through the default cpal device
pub struct CpalBackend {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    mixer: Arc<Mutex<Mixer>>,
    healthy: Arc<AtomicBool>,
    sample_rate: u32,
}

impl CpalBackend {
    /// Open the default output device and start a stream
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Unavailable("No audio device found".to_string()))?;

        log::info!(
            "Audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported_config = device
            .default_output_config()
            .map_err(|e| AudioError::Stream(format!("Configuration error: {}", e)))?;

        let sample_format = supported_config.sample_format();
        let sample_rate = supported_config.sample_rate().0;
        let config: StreamConfig = supported_config.into();

        let mut backend = Self {
            device,
            config,
            sample_format,
            stream: None,
            mixer: Arc::new(Mutex::new(Mixer::default())),
            healthy: Arc::new(AtomicBool::new(false)),
            sample_rate,
        };
        backend.open_stream()?;

        log::info!(
            "Audio engine started: {} Hz, {} channels, {:?}",
            sample_rate,
            backend.config.channels,
            sample_format
        );

        Ok(backend)
    }

    fn open_stream(&mut self) -> Result<(), AudioError> {
        self.stream = None;

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(),
            SampleFormat::I16 => self.build_stream::<i16>(),
            SampleFormat::U16 => self.build_stream::<u16>(),
            other => Err(AudioError::Stream(format!(
                "Unsupported sample format: {:?}. Supported formats: F32, I16, U16",
                other
            ))),
        }?;

        stream
            .play()
            .map_err(|e| AudioError::Stream(format!("Failed to start stream: {}", e)))?;

        self.healthy.store(true, Ordering::Relaxed);
        self.stream = Some(stream);
        Ok(())
    }

    /// Build an output stream for any device sample type
    fn build_stream<T>(&self) -> Result<Stream, AudioError>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let mixer = Arc::clone(&self.mixer);
        let healthy = Arc::clone(&self.healthy);

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // No allocations, no I/O, no blocking locks in here
                    if let Ok(mut mixer) = mixer.try_lock() {
                        for frame in data.chunks_mut(channels) {
                            let sample = soft_clip(flush_denormals_to_zero(mixer.next_sample()));
                            for channel_sample in frame.iter_mut() {
                                *channel_sample = Sample::from_sample::<f32>(sample);
                            }
                        }
                    } else {
                        for channel_sample in data.iter_mut() {
                            *channel_sample = Sample::from_sample::<f32>(0.0);
                        }
                    }
                },
                move |err| {
                    // Runs outside the render path
                    log::error!("Audio stream error: {}", err);
                    healthy.store(false, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|e| AudioError::Stream(format!("Failed to build stream: {}", e)))
    }

    fn with_mixer<R>(&self, f: impl FnOnce(&mut Mixer) -> R) -> Result<R, AudioError> {
        lock_mixer(&self.mixer, f)
    }
}

fn lock_mixer<R>(mixer: &Mutex<Mixer>, f: impl FnOnce(&mut Mixer) -> R) -> Result<R, AudioError> {
    mixer
        .lock()
        .map(|mut mixer| f(&mut mixer))
        .map_err(|_| AudioError::Stream("mixer lock poisoned".to_string()))
}

/// Apply a fire-and-forget voice change, warning when the mixer is unreachable
fn update_mixer(mixer: &Mutex<Mixer>, action: &str, f: impl FnOnce(&mut Mixer)) -> bool {
    match lock_mixer(mixer, f) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Voice {} not applied: {}", action, e);
            false
        }
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn is_available(&self) -> bool {
        self.stream.is_some() && self.healthy.load(Ordering::Relaxed)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn load_buffer(&mut self, buffer: &SampleBuffer) -> Result<BufferHandle, AudioError> {
        if !self.is_available() {
            return Err(AudioError::Unavailable("output stream is down".to_string()));
        }
        let samples = if buffer.sample_rate == self.sample_rate {
            buffer.samples.clone()
        } else {
            buffer.resampled(self.sample_rate).samples
        };
        self.with_mixer(|m| m.add_buffer(&samples))
    }

    fn create_voice(&mut self, buffer: BufferHandle) -> Result<VoiceHandle, AudioError> {
        self.with_mixer(|m| m.create_voice(buffer))?
    }

    fn set_volume(&mut self, voice: VoiceHandle, volume: f32) {
        update_mixer(&self.mixer, "volume change", |m| m.set_volume(voice, volume));
    }

    fn play(&mut self, voice: VoiceHandle) -> Result<(), AudioError> {
        self.with_mixer(|m| m.play(voice))?
    }

    fn stop(&mut self, voice: VoiceHandle) {
        update_mixer(&self.mixer, "stop", |m| m.stop(voice));
    }

    fn is_playing(&self, voice: VoiceHandle) -> bool {
        self.with_mixer(|m| m.is_playing(voice)).unwrap_or(false)
    }

    fn release(&mut self, voice: VoiceHandle) {
        update_mixer(&self.mixer, "release", |m| m.release(voice));
    }

    fn reset(&mut self) -> Result<(), AudioError> {
        self.with_mixer(Mixer::clear)?;
        if !self.is_available() {
            log::info!("Reopening audio stream");
            self.open_stream()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixer_sums_playing_voices() {
        let mut mixer = Mixer::default();
        let a = mixer.add_buffer(&[0.5, 0.5, 0.5]);
        let b = mixer.add_buffer(&[0.25]);

        let va = mixer.create_voice(a).unwrap();
        let vb = mixer.create_voice(b).unwrap();
        mixer.set_volume(va, 0.5);

        // Idle voices are silent
        assert_eq!(mixer.next_sample(), 0.0);

        mixer.play(va).unwrap();
        mixer.play(vb).unwrap();
        assert_eq!(mixer.next_sample(), 0.25 + 0.25);
        assert_eq!(mixer.next_sample(), 0.25);
        assert!(!mixer.is_playing(vb));
        assert_eq!(mixer.next_sample(), 0.25);
        assert_eq!(mixer.next_sample(), 0.0);
        assert!(!mixer.is_playing(va));
    }

    #[test]
    fn test_mixer_restart_and_stop() {
        let mut mixer = Mixer::default();
        let buf = mixer.add_buffer(&[1.0, 0.5]);
        let voice = mixer.create_voice(buf).unwrap();

        mixer.play(voice).unwrap();
        assert_eq!(mixer.next_sample(), 1.0);
        mixer.play(voice).unwrap();
        assert_eq!(mixer.next_sample(), 1.0);

        mixer.stop(voice);
        assert!(!mixer.is_playing(voice));
        assert_eq!(mixer.next_sample(), 0.0);
    }

    #[test]
    fn test_mixer_slot_reuse() {
        let mut mixer = Mixer::default();
        let buf = mixer.add_buffer(&[1.0]);
        let first = mixer.create_voice(buf).unwrap();
        mixer.release(first);
        assert!(matches!(mixer.play(first), Err(AudioError::UnknownVoice(_))));

        let second = mixer.create_voice(buf).unwrap();
        assert_eq!(second.id(), first.id());
        assert!(mixer.create_voice(BufferHandle::new(9)).is_err());
    }

    #[test]
    fn test_voice_updates_survive_poisoned_mixer() {
        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let voice = {
            let mut m = mixer.lock().unwrap();
            let buf = m.add_buffer(&[1.0]);
            m.create_voice(buf).unwrap()
        };
        let applied = update_mixer(&mixer, "volume change", |m| m.set_volume(voice, 0.5));
        assert!(applied);

        let poisoner = Arc::clone(&mixer);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the mixer lock");
        })
        .join();

        assert!(mixer.is_poisoned());
        assert!(!update_mixer(&mixer, "stop", |m| m.stop(voice)));
        assert!(matches!(
            lock_mixer(&mixer, |m| m.is_playing(voice)),
            Err(AudioError::Stream(_))
        ));
    }

    #[test]
    fn test_output_shaping() {
        assert_eq!(flush_denormals_to_zero(1e-20), 0.0);
        assert_eq!(flush_denormals_to_zero(0.5), 0.5);
        assert!(soft_clip(10.0) <= 1.0);
        assert!((soft_clip(0.01) - 0.01).abs() < 1e-4);
    }
}
