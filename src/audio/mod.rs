// Audio module - Output backends, drum samples and the voice pool

pub mod backend;
pub mod engine;
pub mod pool;
pub mod samples;

pub use backend::{AudioBackend, AudioError, BufferHandle, NullBackend, NullProbe, VoiceHandle};
pub use engine::CpalBackend;
pub use pool::{
    CLICK_VOICES, DEFAULT_VOLUME, TRIGGER_FEEDBACK_SECONDS, VOICES_PER_TRACK, VoicePool,
};
pub use samples::{SampleBuffer, SampleKit};
