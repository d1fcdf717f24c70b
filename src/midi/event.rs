// MIDI file events
// Absolute-tick events as they appear in a Standard MIDI File track

/// Zero-based channel 9 is General MIDI channel 10 (percussion)
pub const DRUM_CHANNEL: u8 = 9;

/// Meta event type bytes
pub mod meta {
    pub const TRACK_NAME: u8 = 0x03;
    pub const END_OF_TRACK: u8 = 0x2F;
    pub const TEMPO: u8 = 0x51;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// 0xFF <type> <len> <data>
    Meta { kind: u8, data: Vec<u8> },
    /// Status byte plus two data bytes
    Channel { status: u8, data1: u8, data2: u8 },
}

/// Event stamped with its absolute tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmfEvent {
    pub tick: u32,
    pub kind: EventKind,
}

impl SmfEvent {
    pub fn track_name(tick: u32, name: &str) -> Self {
        Self {
            tick,
            kind: EventKind::Meta {
                kind: meta::TRACK_NAME,
                data: name.as_bytes().to_vec(),
            },
        }
    }

    /// Set Tempo; the value is 24 bits on the wire
    pub fn tempo(tick: u32, micros_per_quarter: u32) -> Self {
        let bytes = micros_per_quarter.to_be_bytes();
        Self {
            tick,
            kind: EventKind::Meta {
                kind: meta::TEMPO,
                data: bytes[1..].to_vec(),
            },
        }
    }

    pub fn end_of_track(tick: u32) -> Self {
        Self {
            tick,
            kind: EventKind::Meta {
                kind: meta::END_OF_TRACK,
                data: Vec::new(),
            },
        }
    }

    pub fn note_on(tick: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            tick,
            kind: EventKind::Channel {
                status: 0x90 | (channel & 0x0F),
                data1: note & 0x7F,
                data2: velocity & 0x7F,
            },
        }
    }

    /// Note Off with release velocity 0
    pub fn note_off(tick: u32, channel: u8, note: u8) -> Self {
        Self {
            tick,
            kind: EventKind::Channel {
                status: 0x80 | (channel & 0x0F),
                data1: note & 0x7F,
                data2: 0,
            },
        }
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self.kind, EventKind::Channel { status, .. } if status & 0xF0 == 0x90)
    }

    pub fn is_note_off(&self) -> bool {
        matches!(self.kind, EventKind::Channel { status, .. } if status & 0xF0 == 0x80)
    }

    pub fn is_meta(&self, meta_kind: u8) -> bool {
        matches!(&self.kind, EventKind::Meta { kind, .. } if *kind == meta_kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_status_bytes() {
        let on = SmfEvent::note_on(0, DRUM_CHANNEL, 36, 100);
        assert_eq!(
            on.kind,
            EventKind::Channel {
                status: 0x99,
                data1: 36,
                data2: 100
            }
        );
        assert!(on.is_note_on());

        let off = SmfEvent::note_off(12, DRUM_CHANNEL, 36);
        assert_eq!(
            off.kind,
            EventKind::Channel {
                status: 0x89,
                data1: 36,
                data2: 0
            }
        );
        assert!(off.is_note_off());
    }

    #[test]
    fn test_tempo_is_three_bytes() {
        // 120 BPM = 500000 us = 0x07A120
        let tempo = SmfEvent::tempo(0, 500_000);
        assert_eq!(
            tempo.kind,
            EventKind::Meta {
                kind: meta::TEMPO,
                data: vec![0x07, 0xA1, 0x20]
            }
        );
        assert!(tempo.is_meta(meta::TEMPO));
    }

    #[test]
    fn test_data_bytes_masked() {
        let on = SmfEvent::note_on(0, 0x1F, 200, 255);
        assert_eq!(
            on.kind,
            EventKind::Channel {
                status: 0x9F,
                data1: 200 & 0x7F,
                data2: 0x7F
            }
        );
    }
}
