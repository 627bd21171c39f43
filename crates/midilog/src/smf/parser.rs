//! SMF parser.
//!
//! Parses standard MIDI file bytes back into structured events. The parser
//! is strict: malformed chunk identifiers, truncated events, unterminated
//! variable-length quantities and stray data bytes all surface as
//! [`ParseError`]s rather than being skipped. Running status and
//! system-exclusive events are handled so that files from other writers can
//! be inspected too, even though this crate's own encoder always writes
//! explicit status bytes.
//!
//! The main entry point is [`parse_midi`]; `MidiDocument` also implements
//! `TryFrom<&[u8]>`.

use crate::binutil::{
    ParseError, decode_varint, read_slice, read_u8_at, read_u16_be_at, read_u32_be_at,
};
use crate::smf::event::MidiEvent;

/// One event within a parsed track, carrying both its encoded delta and the
/// absolute tick it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEvent {
    /// Delta ticks since the previous event on the same track.
    pub delta: u32,
    /// Absolute tick position (running sum of deltas).
    pub tick: u64,
    /// The decoded event.
    pub event: MidiEvent,
}

/// A parsed MIDI file: header fields plus one event list per track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiDocument {
    /// SMF format code (0 or 1 for files this crate writes).
    pub format: u16,
    /// Division field: ticks per quarter note.
    pub division: u16,
    /// Parsed tracks in file order.
    pub tracks: Vec<Vec<TrackEvent>>,
}

impl MidiDocument {
    /// Total ticks spanned by a track (absolute tick of its last event).
    pub fn track_end_tick(&self, track: usize) -> u64 {
        self.tracks
            .get(track)
            .and_then(|events| events.last())
            .map(|ev| ev.tick)
            .unwrap_or(0)
    }
}

impl TryFrom<&[u8]> for MidiDocument {
    type Error = ParseError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        parse_midi(bytes)
    }
}

/// Parse a complete MIDI file from a byte slice.
///
/// Steps:
/// 1. Validate the `MThd` ident and read format, track count and division.
///    A header body shorter than 6 bytes is rejected; longer bodies are
///    permitted and the excess skipped, as the SMF specification requires.
/// 2. For each declared track, validate the `MTrk` ident, read the 4-byte
///    big-endian body length, and decode the delta-prefixed events within
///    exactly that many bytes.
pub fn parse_midi(bytes: &[u8]) -> Result<MidiDocument, ParseError> {
    let ident = read_slice(bytes, 0, 4)?;
    if ident != b"MThd" {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(ident);
        return Err(ParseError::InvalidIdent(raw));
    }
    let header_len = read_u32_be_at(bytes, 4)? as usize;
    if header_len < 6 {
        return Err(ParseError::HeaderTooShort("MThd".into()));
    }
    let format = read_u16_be_at(bytes, 8)?;
    let track_count = read_u16_be_at(bytes, 10)?;
    let division = read_u16_be_at(bytes, 12)?;

    let mut off = 8 + header_len;
    let mut tracks = Vec::with_capacity(track_count as usize);
    for _ in 0..track_count {
        let ident = read_slice(bytes, off, 4)?;
        if ident != b"MTrk" {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(ident);
            return Err(ParseError::InvalidIdent(raw));
        }
        let body_len = read_u32_be_at(bytes, off + 4)? as usize;
        let body = read_slice(bytes, off + 8, body_len)?;
        tracks.push(parse_track(body)?);
        off += 8 + body_len;
    }

    Ok(MidiDocument {
        format,
        division,
        tracks,
    })
}

/// Decode the delta-prefixed events of one `MTrk` body.
fn parse_track(bytes: &[u8]) -> Result<Vec<TrackEvent>, ParseError> {
    let mut events = Vec::new();
    let mut off = 0usize;
    let mut tick = 0u64;
    let mut running_status: Option<u8> = None;

    while off < bytes.len() {
        let (delta, consumed) = decode_varint(bytes, off)?;
        off += consumed;
        tick += u64::from(delta);

        let lead = read_u8_at(bytes, off)?;
        let status = if lead & 0x80 != 0 {
            off += 1;
            lead
        } else {
            // Data byte in status position: only valid under running status.
            running_status.ok_or(ParseError::UnknownStatus {
                status: lead,
                offset: off,
            })?
        };

        let event = match status {
            0xFF => {
                let kind = read_u8_at(bytes, off)?;
                let (len, consumed) = decode_varint(bytes, off + 1)?;
                let data = read_slice(bytes, off + 1 + consumed, len as usize)?.to_vec();
                off += 1 + consumed + len as usize;
                running_status = None;
                MidiEvent::Meta { kind, data }
            }
            0xF0 | 0xF7 => {
                let (len, consumed) = decode_varint(bytes, off)?;
                let data = read_slice(bytes, off + consumed, len as usize)?.to_vec();
                off += consumed + len as usize;
                running_status = None;
                MidiEvent::SysEx { data }
            }
            _ => {
                let channel = status & 0x0F;
                let decoded = match status & 0xF0 {
                    0x80 => {
                        let note = read_u8_at(bytes, off)?;
                        let velocity = read_u8_at(bytes, off + 1)?;
                        off += 2;
                        MidiEvent::NoteOff {
                            channel,
                            note,
                            velocity,
                        }
                    }
                    0x90 => {
                        let note = read_u8_at(bytes, off)?;
                        let velocity = read_u8_at(bytes, off + 1)?;
                        off += 2;
                        MidiEvent::NoteOn {
                            channel,
                            note,
                            velocity,
                        }
                    }
                    0xA0 => {
                        let note = read_u8_at(bytes, off)?;
                        let velocity = read_u8_at(bytes, off + 1)?;
                        off += 2;
                        MidiEvent::KeyPressure {
                            channel,
                            note,
                            velocity,
                        }
                    }
                    0xB0 => {
                        let control = read_u8_at(bytes, off)?;
                        let value = read_u8_at(bytes, off + 1)?;
                        off += 2;
                        MidiEvent::ControlChange {
                            channel,
                            control,
                            value,
                        }
                    }
                    0xC0 => {
                        let program = read_u8_at(bytes, off)?;
                        off += 1;
                        MidiEvent::ProgramChange { channel, program }
                    }
                    0xD0 => {
                        let velocity = read_u8_at(bytes, off)?;
                        off += 1;
                        MidiEvent::ChannelPressure { channel, velocity }
                    }
                    0xE0 => {
                        let lsb = read_u8_at(bytes, off)?;
                        let msb = read_u8_at(bytes, off + 1)?;
                        off += 2;
                        MidiEvent::PitchBend {
                            channel,
                            value: (u16::from(msb & 0x7F) << 7) | u16::from(lsb & 0x7F),
                        }
                    }
                    _ => {
                        return Err(ParseError::UnknownStatus {
                            status,
                            offset: off,
                        });
                    }
                };
                running_status = Some(status);
                decoded
            }
        };

        events.push(TrackEvent { delta, tick, event });
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smf::event::MidiEvent;

    fn header(format: u16, tracks: u16, division: u16) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"MThd");
        bytes.extend_from_slice(&6u32.to_be_bytes());
        bytes.extend_from_slice(&format.to_be_bytes());
        bytes.extend_from_slice(&tracks.to_be_bytes());
        bytes.extend_from_slice(&division.to_be_bytes());
        bytes
    }

    fn with_track(mut head: Vec<u8>, body: &[u8]) -> Vec<u8> {
        head.extend_from_slice(b"MTrk");
        head.extend_from_slice(&(body.len() as u32).to_be_bytes());
        head.extend_from_slice(body);
        head
    }

    #[test]
    fn test_parse_minimal_file() {
        let body = [0x00, 0x90, 0x45, 0x48, 0x83, 0x60, 0x80, 0x45, 0x00];
        let bytes = with_track(header(0, 1, 480), &body);
        let doc = parse_midi(&bytes).unwrap();
        assert_eq!(doc.format, 0);
        assert_eq!(doc.division, 480);
        assert_eq!(doc.tracks.len(), 1);
        let events = &doc.tracks[0];
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tick, 0);
        assert_eq!(
            events[0].event,
            MidiEvent::NoteOn {
                channel: 0,
                note: 0x45,
                velocity: 0x48
            }
        );
        // 0x83 0x60 decodes to 480 ticks.
        assert_eq!(events[1].delta, 480);
        assert_eq!(events[1].tick, 480);
    }

    #[test]
    fn test_parse_running_status() {
        // Second note-on omits its status byte.
        let body = [0x00, 0x90, 0x3C, 0x40, 0x10, 0x3E, 0x40];
        let bytes = with_track(header(0, 1, 480), &body);
        let doc = parse_midi(&bytes).unwrap();
        let events = &doc.tracks[0];
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1].event,
            MidiEvent::NoteOn {
                channel: 0,
                note: 0x3E,
                velocity: 0x40
            }
        );
        assert_eq!(events[1].tick, 0x10);
    }

    #[test]
    fn test_data_byte_without_running_status_rejected() {
        let body = [0x00, 0x3C, 0x40];
        let bytes = with_track(header(0, 1, 480), &body);
        assert!(matches!(
            parse_midi(&bytes),
            Err(ParseError::UnknownStatus { status: 0x3C, .. })
        ));
    }

    #[test]
    fn test_parse_meta_and_pitch_bend() {
        let body = [
            0x00, 0xFF, 0x20, 0x01, 0x09, // channel prefix: channel 9
            0x00, 0xE3, 0x00, 0x40, // pitch bend center on channel 3
        ];
        let bytes = with_track(header(0, 1, 480), &body);
        let doc = parse_midi(&bytes).unwrap();
        let events = &doc.tracks[0];
        assert_eq!(
            events[0].event,
            MidiEvent::Meta {
                kind: 0x20,
                data: vec![0x09]
            }
        );
        assert_eq!(
            events[1].event,
            MidiEvent::PitchBend {
                channel: 3,
                value: 0x2000
            }
        );
    }

    #[test]
    fn test_bad_ident_rejected() {
        let mut bytes = header(1, 0, 480);
        bytes[0] = b'X';
        assert!(matches!(
            parse_midi(&bytes),
            Err(ParseError::InvalidIdent(_))
        ));
    }

    #[test]
    fn test_truncated_track_rejected() {
        let mut bytes = with_track(header(0, 1, 480), &[0x00, 0x90, 0x45, 0x48]);
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(
            parse_midi(&bytes),
            Err(ParseError::OffsetOutOfRange { .. })
        ));
    }
}
