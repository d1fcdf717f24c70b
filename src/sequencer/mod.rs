// Sequencer module
// Pattern grid, musical timing, clock disciplines and the step engine

pub mod clock;
pub mod engine;
pub mod metronome;
pub mod pattern;
pub mod snapshot;
pub mod timeline;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{AudioStatus, Sequencer, StepTrigger, TimingInfo};
pub use metronome::{ClickType, MetronomeSettings, MetronomeSound};
pub use pattern::{NUM_STEPS, NUM_TRACKS, Pattern, PatternError, PatternStats, Track};
pub use snapshot::{SequencerSnapshot, SnapshotError};
pub use timeline::{DEFAULT_BPM, MAX_BPM, MIN_BPM, Tempo, TimingMode};
pub use transport::{MAX_STEPS_PER_UPDATE, StepTimer, TransportState};
