//! Standard MIDI file (SMF) building and parsing.
//!
//! This module owns everything on the byte side of the crate:
//!
//! - `event` — the MIDI channel-voice and meta event model, with the 7-bit
//!   and 14-bit clamping rules applied before any value is encoded.
//! - `memo` — the per-channel cache of last-sent program/control/pitch-bend
//!   values used for redundant-event suppression.
//! - `track` — a single `MTrk` body under construction: delta-time varints
//!   followed by event bytes, either buffered in memory or streamed.
//! - `file` — the `MidiFile` container: header serialization, track
//!   ownership, the global tick counter, and the format 0 streaming mode
//!   with in-place track-length patch-up.
//! - `parser` — a strict SMF reader used for round-trip verification and by
//!   the debugger frontend.
pub mod event;
pub mod file;
pub mod memo;
pub mod parser;
pub mod track;

pub use event::MidiEvent;
pub use file::{MidiFile, MidiFormat, TrackId};
pub use memo::ChannelMemo;
pub use parser::{MidiDocument, TrackEvent};
pub use track::Track;
