//! The MIDI file container.
//!
//! `MidiFile` owns the output writer, the tracks, the shared per-channel
//! dedup memo and the global tick counter. Two layouts are supported:
//!
//! - **Format 1** (`MidiFormat::MultiTrack`): each instrument owns an
//!   independent in-memory track; `save()` writes the `MThd` header followed
//!   by one `MTrk` chunk per track whose length field exactly matches the
//!   buffered byte count.
//! - **Format 0** (`MidiFormat::Single`): a single shared track is written
//!   directly to the output as events occur. The `MTrk` length field starts
//!   as a placeholder and is patched in place (seek, write, seek back) every
//!   [`STREAM_PATCH_INTERVAL`] events and once more on `save()`, so a crash
//!   mid-capture still leaves a valid file up to the last patch point.
//!
//! The tick counter is the single authoritative "now" for delta-time
//! computation; it only ever increases, via [`MidiFile::advance_ticks`].

use std::io::{Cursor, Seek, SeekFrom, Write};

use crate::binutil::{EncodeError, encode_varint};
use crate::smf::event::{clamp_channel, clamp7, clamp14, META_CHANNEL_PREFIX};
use crate::smf::memo::ChannelMemo;
use crate::smf::track::Track;

/// Ticks per quarter note written to the `MThd` division field.
pub const DIVISION: u16 = 480;

/// How many streamed events may elapse between `MTrk` length patch-ups.
pub const STREAM_PATCH_INTERVAL: u32 = 100;

/// Byte offset of the streamed track's `MTrk` length field
/// (14-byte `MThd` chunk plus the 4-byte `MTrk` ident).
const STREAM_LENGTH_OFFSET: u64 = 18;

/// SMF file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiFormat {
    /// Format 0: one interleaved track, streamed to the writer.
    Single,
    /// Format 1: one track per instrument, buffered until save.
    MultiTrack,
}

impl MidiFormat {
    /// The format code stored in the `MThd` header.
    pub fn code(self) -> u16 {
        match self {
            MidiFormat::Single => 0,
            MidiFormat::MultiTrack => 1,
        }
    }
}

/// Handle to a track owned by a [`MidiFile`].
///
/// Only ever constructed by [`MidiFile::create_track`], so an id is always
/// valid for the file that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackId(pub(crate) usize);

impl TrackId {
    /// Index of the track within the file.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A MIDI file under construction.
///
/// See the module docs for the format 0 / format 1 split. All emission
/// methods clamp 7-bit and channel fields before encoding and consult the
/// shared [`ChannelMemo`] for the deduplicated event kinds (control change,
/// program change, pitch bend). Note on/off and key pressure are always
/// written.
#[derive(Debug)]
pub struct MidiFile<W: Write + Seek> {
    out: W,
    format: MidiFormat,
    division: u16,
    tracks: Vec<Track>,
    memo: ChannelMemo,
    tick: u64,
}

impl MidiFile<Cursor<Vec<u8>>> {
    /// Create a file backed by an in-memory buffer.
    ///
    /// Convenient for tests and for callers that want the serialized bytes
    /// rather than a file on disk; retrieve them with
    /// `save()?.into_inner()`.
    pub fn in_memory(format: MidiFormat) -> Result<Self, EncodeError> {
        Self::new(Cursor::new(Vec::new()), format)
    }
}

impl<W: Write + Seek> MidiFile<W> {
    /// Create a new MIDI file writing to `out`.
    ///
    /// For `MidiFormat::Single` the `MThd` header and the `MTrk` ident with
    /// a placeholder length are written immediately and the single shared
    /// track is created; `create_track()` then hands out that track to every
    /// caller. For `MidiFormat::MultiTrack` nothing is written until
    /// `save()`.
    pub fn new(out: W, format: MidiFormat) -> Result<Self, EncodeError> {
        let mut file = Self {
            out,
            format,
            division: DIVISION,
            tracks: Vec::new(),
            memo: ChannelMemo::new(),
            tick: 0,
        };
        if format == MidiFormat::Single {
            file.tracks.push(Track::streamed());
            file.write_stream_preamble()?;
        }
        Ok(file)
    }

    /// The file's layout.
    pub fn format(&self) -> MidiFormat {
        self.format
    }

    /// Number of tracks created so far.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Borrow a track for inspection.
    pub fn track(&self, id: TrackId) -> &Track {
        &self.tracks[id.0]
    }

    /// Borrow the shared dedup memo.
    pub fn memo(&self) -> &ChannelMemo {
        &self.memo
    }

    /// Create a track and return its handle.
    ///
    /// Format 0 has exactly one track; every call returns the shared one.
    pub fn create_track(&mut self) -> TrackId {
        match self.format {
            MidiFormat::Single => TrackId(0),
            MidiFormat::MultiTrack => {
                self.tracks.push(Track::buffered());
                TrackId(self.tracks.len() - 1)
            }
        }
    }

    /// Advance the global tick counter. The counter never moves backward.
    pub fn advance_ticks(&mut self, ticks: u64) {
        self.tick += ticks;
    }

    /// Current absolute tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Emit a note-off event. Never deduplicated.
    pub fn note_off(
        &mut self,
        track: TrackId,
        channel: u8,
        note: u8,
        velocity: u8,
    ) -> Result<(), EncodeError> {
        let channel = clamp_channel(channel);
        self.emit(track, &[0x80 | channel, clamp7(note), clamp7(velocity)])
    }

    /// Emit a note-on event. Never deduplicated.
    pub fn note_on(
        &mut self,
        track: TrackId,
        channel: u8,
        note: u8,
        velocity: u8,
    ) -> Result<(), EncodeError> {
        let channel = clamp_channel(channel);
        self.emit(track, &[0x90 | channel, clamp7(note), clamp7(velocity)])
    }

    /// Emit a polyphonic key-pressure event. Never deduplicated.
    pub fn key_pressure(
        &mut self,
        track: TrackId,
        channel: u8,
        note: u8,
        velocity: u8,
    ) -> Result<(), EncodeError> {
        let channel = clamp_channel(channel);
        self.emit(track, &[0xA0 | channel, clamp7(note), clamp7(velocity)])
    }

    /// Emit a control change unless the memo shows `value` was the last
    /// value sent for `(channel, control)`.
    pub fn control_change(
        &mut self,
        track: TrackId,
        channel: u8,
        control: u8,
        value: u8,
    ) -> Result<(), EncodeError> {
        let channel = clamp_channel(channel);
        let control = clamp7(control);
        let value = clamp7(value);
        if !self.memo.should_emit_control(channel, control, value) {
            return Ok(());
        }
        self.emit(track, &[0xB0 | channel, control, value])?;
        self.memo.record_control(channel, control, value);
        Ok(())
    }

    /// Emit a program change unless it repeats the channel's last program.
    pub fn program_change(
        &mut self,
        track: TrackId,
        channel: u8,
        program: u8,
    ) -> Result<(), EncodeError> {
        let channel = clamp_channel(channel);
        let program = clamp7(program);
        if !self.memo.should_emit_program(channel, program) {
            return Ok(());
        }
        self.emit(track, &[0xC0 | channel, program])?;
        self.memo.record_program(channel, program);
        Ok(())
    }

    /// Emit a channel-pressure event. Never deduplicated.
    pub fn channel_pressure(
        &mut self,
        track: TrackId,
        channel: u8,
        velocity: u8,
    ) -> Result<(), EncodeError> {
        let channel = clamp_channel(channel);
        self.emit(track, &[0xD0 | channel, clamp7(velocity)])
    }

    /// Emit a pitch-bend change unless it repeats the channel's last value.
    ///
    /// The 14-bit value is split little-endian into two 7-bit halves on the
    /// wire (`lsb`, `msb`).
    pub fn pitch_bend_change(
        &mut self,
        track: TrackId,
        channel: u8,
        value: u16,
    ) -> Result<(), EncodeError> {
        let channel = clamp_channel(channel);
        let value = clamp14(value);
        if !self.memo.should_emit_pitch_bend(channel, value) {
            return Ok(());
        }
        let lsb = (value & 0x7F) as u8;
        let msb = ((value >> 7) & 0x7F) as u8;
        self.emit(track, &[0xE0 | channel, lsb, msb])?;
        self.memo.record_pitch_bend(channel, value);
        Ok(())
    }

    /// Emit a meta event: `0xFF kind len data`.
    pub fn meta(&mut self, track: TrackId, kind: u8, data: &[u8]) -> Result<(), EncodeError> {
        let len = u32::try_from(data.len())
            .map_err(|_| EncodeError::VarintOverflow(data.len() as u64))?;
        let (len_bytes, len_len) = encode_varint(len)?;
        let mut event = Vec::with_capacity(2 + len_len + data.len());
        event.push(0xFF);
        event.push(clamp7(kind));
        event.extend_from_slice(&len_bytes[..len_len]);
        event.extend_from_slice(data);
        self.emit(track, &event)
    }

    /// Emit a channel-prefix meta (0x20) followed by a meta of `kind`
    /// carrying `text`, associating the annotation with `channel`.
    pub fn channel_prefix_meta(
        &mut self,
        track: TrackId,
        channel: u8,
        kind: u8,
        text: &str,
    ) -> Result<(), EncodeError> {
        self.meta(track, META_CHANNEL_PREFIX, &[clamp_channel(channel)])?;
        self.meta(track, kind, text.as_bytes())
    }

    /// Finish the capture, flush the writer and hand it back.
    ///
    /// Format 1 serializes the header and every buffered track here;
    /// format 0 performs the final length patch.
    pub fn save(mut self) -> Result<W, EncodeError> {
        if self.format == MidiFormat::Single {
            self.patch_stream_length()?;
            self.out.flush()?;
            return Ok(self.out);
        }

        let track_count = u16::try_from(self.tracks.len())
            .map_err(|_| EncodeError::TrackCountOverflow(self.tracks.len()))?;

        let Self {
            mut out,
            format,
            division,
            tracks,
            ..
        } = self;

        let mut header = Vec::with_capacity(14);
        header.extend_from_slice(b"MThd");
        header.extend_from_slice(&6u32.to_be_bytes());
        header.extend_from_slice(&format.code().to_be_bytes());
        header.extend_from_slice(&track_count.to_be_bytes());
        header.extend_from_slice(&division.to_be_bytes());
        out.write_all(&header)?;

        for track in &tracks {
            out.write_all(b"MTrk")?;
            out.write_all(&track.byte_len().to_be_bytes())?;
            out.write_all(track.bytes())?;
        }

        out.flush()?;
        Ok(out)
    }

    /// Write delta-time + event bytes for `track` at the current tick.
    fn emit(&mut self, track: TrackId, event: &[u8]) -> Result<(), EncodeError> {
        let delta = self.tracks[track.0].delta_to(self.tick)?;
        let (head, head_len) = encode_varint(delta)?;

        let tick = self.tick;
        let Self { out, tracks, .. } = self;
        let t = &mut tracks[track.0];

        if t.is_streamed() {
            out.write_all(&head[..head_len])?;
            out.write_all(event)?;
            let written = (head_len + event.len()) as u32;
            if t.account_streamed(tick, written, STREAM_PATCH_INTERVAL) {
                self.patch_stream_length()?;
            }
        } else {
            let mut encoded = Vec::with_capacity(head_len + event.len());
            encoded.extend_from_slice(&head[..head_len]);
            encoded.extend_from_slice(event);
            t.append(tick, &encoded);
        }
        Ok(())
    }

    /// Write `MThd` plus the `MTrk` ident and a placeholder length for the
    /// streamed track.
    fn write_stream_preamble(&mut self) -> Result<(), EncodeError> {
        let mut preamble = Vec::with_capacity(STREAM_LENGTH_OFFSET as usize + 4);
        preamble.extend_from_slice(b"MThd");
        preamble.extend_from_slice(&6u32.to_be_bytes());
        preamble.extend_from_slice(&self.format.code().to_be_bytes());
        preamble.extend_from_slice(&1u16.to_be_bytes());
        preamble.extend_from_slice(&self.division.to_be_bytes());
        preamble.extend_from_slice(b"MTrk");
        preamble.extend_from_slice(&0u32.to_be_bytes());
        self.out.write_all(&preamble)?;
        Ok(())
    }

    /// Rewrite the streamed track's length field in place, then return to
    /// the end of the stream. A fixed 4-byte write, cheap enough for the
    /// hot path.
    fn patch_stream_length(&mut self) -> Result<(), EncodeError> {
        let length = self.tracks[0].byte_len();
        self.out.seek(SeekFrom::Start(STREAM_LENGTH_OFFSET))?;
        self.out.write_all(&length.to_be_bytes())?;
        self.out.seek(SeekFrom::End(0))?;
        self.out.flush()?;
        self.tracks[0].reset_patch_counter();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format1_header_fields() {
        let mut file = MidiFile::in_memory(MidiFormat::MultiTrack).unwrap();
        let t0 = file.create_track();
        let _t1 = file.create_track();
        file.note_on(t0, 0, 60, 64).unwrap();
        let bytes = file.save().unwrap().into_inner();
        assert_eq!(&bytes[0..4], b"MThd");
        assert_eq!(&bytes[4..8], &6u32.to_be_bytes());
        assert_eq!(&bytes[8..10], &1u16.to_be_bytes());
        assert_eq!(&bytes[10..12], &2u16.to_be_bytes());
        assert_eq!(&bytes[12..14], &DIVISION.to_be_bytes());
        assert_eq!(&bytes[14..18], b"MTrk");
        // delta 0 + note-on = 4 bytes
        assert_eq!(&bytes[18..22], &4u32.to_be_bytes());
    }

    #[test]
    fn test_format0_preamble_and_final_patch() {
        let mut file = MidiFile::in_memory(MidiFormat::Single).unwrap();
        let track = file.create_track();
        assert_eq!(track, TrackId(0));
        file.note_on(track, 0, 60, 64).unwrap();
        file.advance_ticks(10);
        file.note_off(track, 0, 60, 0).unwrap();
        let bytes = file.save().unwrap().into_inner();
        assert_eq!(&bytes[0..4], b"MThd");
        assert_eq!(&bytes[8..10], &0u16.to_be_bytes());
        assert_eq!(&bytes[10..12], &1u16.to_be_bytes());
        assert_eq!(&bytes[14..18], b"MTrk");
        let declared = u32::from_be_bytes(bytes[18..22].try_into().unwrap());
        assert_eq!(declared as usize, bytes.len() - 22);
    }

    #[test]
    fn test_control_change_dedup_through_file() {
        let mut file = MidiFile::in_memory(MidiFormat::MultiTrack).unwrap();
        let track = file.create_track();
        file.control_change(track, 0, 7, 100).unwrap();
        file.control_change(track, 0, 7, 100).unwrap();
        file.control_change(track, 0, 7, 101).unwrap();
        // 2 emitted events of 4 bytes each (delta 0 + 3 event bytes).
        assert_eq!(file.track(track).byte_len(), 8);
    }

    #[test]
    fn test_field_clamping_on_emission() {
        let mut file = MidiFile::in_memory(MidiFormat::MultiTrack).unwrap();
        let track = file.create_track();
        file.note_on(track, 200, 200, 200).unwrap();
        let bytes = file.track(track).bytes();
        assert_eq!(bytes, &[0x00, 0x9F, 0x7F, 0x7F]);
    }
}
