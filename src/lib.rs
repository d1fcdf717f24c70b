// drumgrid - 8-track, 16-step drum sequencer engine
// Library exports for the host binary, tests and benchmarks

pub mod audio;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use audio::backend::{
    AudioBackend, AudioError, BufferHandle, NullBackend, NullProbe, VoiceHandle,
};
pub use audio::engine::CpalBackend;
pub use audio::pool::VoicePool;
pub use audio::samples::{SampleBuffer, SampleKit};
pub use midi::export::{ExportError, ExportOptions, MidiExporter, pattern_stats, validate_pattern};
pub use midi::smf::encode_vlq;
pub use sequencer::{
    AudioStatus, ClickType, Clock, ManualClock, MetronomeSettings, Pattern, PatternError,
    PatternStats, Sequencer, SequencerSnapshot, SnapshotError, StepTrigger, SystemClock, Tempo,
    TimingInfo, TimingMode, Track, TransportState,
};
