// SMF - Standard MIDI File byte writer
// Variable-length quantities, big-endian chunks, delta-time conversion

use super::event::{EventKind, SmfEvent};

/// Largest value a 4-byte VLQ can hold
pub const MAX_VLQ: u32 = 0x0FFF_FFFF;

/// Encode a MIDI variable-length quantity
///
/// Seven bits per byte, most significant group first, continuation bit on
/// every byte but the last. Values above 28 bits are masked.
pub fn encode_vlq(value: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(4);
    write_vlq(value, &mut out);
    out
}

pub fn write_vlq(value: u32, out: &mut Vec<u8>) {
    let mut value = value & MAX_VLQ;
    let mut buf = [0u8; 4];
    let mut start = 3;
    buf[3] = (value & 0x7F) as u8;
    value >>= 7;

    while value > 0 {
        start -= 1;
        buf[start] = (value & 0x7F) as u8 | 0x80;
        value >>= 7;
    }

    out.extend_from_slice(&buf[start..]);
}

/// 14-byte MThd chunk
pub fn header_chunk(format: u16, tracks: u16, division: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(14);
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&format.to_be_bytes());
    out.extend_from_slice(&tracks.to_be_bytes());
    out.extend_from_slice(&division.to_be_bytes());
    out
}

/// Delta times for events in tick order
///
/// Events are stably sorted by absolute tick first, so events sharing a tick
/// keep their relative order.
pub fn to_deltas(events: &[SmfEvent]) -> Vec<(u32, &SmfEvent)> {
    let mut ordered: Vec<&SmfEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.tick);

    let mut previous = 0;
    ordered
        .into_iter()
        .map(|event| {
            let delta = event.tick - previous;
            previous = event.tick;
            (delta, event)
        })
        .collect()
}

fn write_event(event: &SmfEvent, out: &mut Vec<u8>) {
    match &event.kind {
        EventKind::Meta { kind, data } => {
            out.push(0xFF);
            out.push(*kind);
            write_vlq(data.len() as u32, out);
            out.extend_from_slice(data);
        }
        EventKind::Channel {
            status,
            data1,
            data2,
        } => {
            out.extend_from_slice(&[*status, *data1, *data2]);
        }
    }
}

/// MTrk chunk for a list of absolute-tick events
pub fn track_chunk(events: &[SmfEvent]) -> Vec<u8> {
    let mut body = Vec::with_capacity(events.len() * 4);
    for (delta, event) in to_deltas(events) {
        write_vlq(delta, &mut body);
        write_event(event, &mut body);
    }

    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(b"MTrk");
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Complete format-0 file with one track
pub fn format0_file(events: &[SmfEvent], division: u16) -> Vec<u8> {
    let mut out = header_chunk(0, 1, division);
    out.extend_from_slice(&track_chunk(events));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::DRUM_CHANNEL;

    #[test]
    fn test_vlq_boundaries() {
        assert_eq!(encode_vlq(0), vec![0x00]);
        assert_eq!(encode_vlq(127), vec![0x7F]);
        assert_eq!(encode_vlq(128), vec![0x81, 0x00]);
        assert_eq!(encode_vlq(16383), vec![0xFF, 0x7F]);
        assert_eq!(encode_vlq(16384), vec![0x81, 0x80, 0x00]);
        assert_eq!(encode_vlq(MAX_VLQ), vec![0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn test_vlq_masks_high_bits() {
        assert_eq!(encode_vlq(0xF000_0000), vec![0x00]);
        assert_eq!(encode_vlq(0x1000_0080), encode_vlq(0x80));
    }

    #[test]
    fn test_header_chunk() {
        assert_eq!(
            header_chunk(0, 1, 96),
            vec![b'M', b'T', b'h', b'd', 0, 0, 0, 6, 0, 0, 0, 1, 0, 96]
        );
    }

    #[test]
    fn test_deltas_sorted_and_stable() {
        let events = vec![
            SmfEvent::note_on(0, DRUM_CHANNEL, 36, 100),
            SmfEvent::note_off(12, DRUM_CHANNEL, 36),
            SmfEvent::note_on(24, DRUM_CHANNEL, 38, 100),
            SmfEvent::note_on(0, DRUM_CHANNEL, 42, 100),
        ];
        let deltas = to_deltas(&events);
        let summary: Vec<(u32, u32)> = deltas.iter().map(|(d, e)| (*d, e.tick)).collect();
        assert_eq!(summary, vec![(0, 0), (0, 0), (12, 12), (12, 24)]);

        // Kick before hat at tick 0, as generated
        assert_eq!(deltas[0].1, &events[0]);
        assert_eq!(deltas[1].1, &events[3]);
    }

    #[test]
    fn test_track_chunk_bytes() {
        let events = vec![
            SmfEvent::note_on(0, DRUM_CHANNEL, 36, 100),
            SmfEvent::note_off(200, DRUM_CHANNEL, 36),
            SmfEvent::end_of_track(384),
        ];
        let chunk = track_chunk(&events);
        let expected_body: Vec<u8> = vec![
            0x00, 0x99, 36, 100, // note on
            0x81, 0x48, 0x89, 36, 0, // delta 200, note off
            0x81, 0x38, 0xFF, 0x2F, 0x00, // delta 184, end of track
        ];
        assert_eq!(&chunk[0..4], b"MTrk");
        assert_eq!(&chunk[4..8], &(expected_body.len() as u32).to_be_bytes());
        assert_eq!(&chunk[8..], expected_body.as_slice());
    }
}
