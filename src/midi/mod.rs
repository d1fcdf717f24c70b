// MIDI module - Standard MIDI File export of drum patterns

pub mod event;
pub mod export;
pub mod smf;

pub use event::{DRUM_CHANNEL, EventKind, SmfEvent};
pub use export::{
    DEFAULT_RESOLUTION, DEFAULT_VELOCITY, ExportError, ExportOptions, MidiExporter,
    pattern_stats, validate_pattern,
};
pub use smf::encode_vlq;
