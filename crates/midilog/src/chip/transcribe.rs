//! Note transcription state machines.
//!
//! Hardware registers have no concept of "a note": a voice just has a
//! period, an amplitude and a handful of gates. The types here decide, from
//! a normalized per-sample view of one voice, when a musical note begins,
//! continues, bends in pitch, or ends, and emit the corresponding MIDI
//! events through a [`MidiFile`](crate::smf::MidiFile).
//!
//! Two instrument kinds cover the chip's voices:
//!
//! - [`MelodicInstrument`] (pulse, triangle): pitch is a continuous function
//!   of the timer period. Notes map to the nearest MIDI note, with the
//!   fractional remainder expressed as a 14-bit pitch bend; small drifts
//!   adjust the bend, large drifts start a new note.
//! - [`RhythmicInstrument`] (noise, DMC): fixed to the percussion channel
//!   unless a sample mapping says otherwise, pitched from a lookup rather
//!   than a period formula, and never bent.
//!
//! All decision thresholds live in [`NoteHeuristics`] — they were tuned
//! against reference recordings and should be treated as adjustable, not
//! final.

mod instrument;

pub use instrument::{Instrument, MelodicInstrument, RhythmicInstrument};

/// What a voice would sound like right now, normalized away from chip
/// registers: a continuous pitch plus the MIDI identity of the voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteObservation {
    /// Continuous pitch in MIDI semitones (fractional).
    pub pitch: f64,
    /// Target MIDI channel.
    pub channel: u8,
    /// Program to select at note-on. `None` for voices that never send
    /// program changes (percussion without a sample mapping).
    pub program: Option<u8>,
    /// Note-on velocity.
    pub velocity: u8,
    /// Channel volume (CC 7) derived from the DAC tables.
    pub channel_volume: u8,
}

/// One voice's per-sample input to its instrument state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceInput {
    /// Raw 4-bit amplitude; 0 means the voice is silent this sample.
    pub level: u8,
    /// A hardware gate (length counter, sweep check, period floor) is
    /// muting the voice regardless of amplitude.
    pub silenced: bool,
    /// A note-starting register write happened since the last sample.
    pub write_trigger: bool,
    /// The envelope unit reloaded since the last sample.
    pub envelope_trigger: bool,
    /// The sounding note, when one can be derived. `None` short-circuits to
    /// "emit nothing" (unmapped or disabled hardware states).
    pub note: Option<NoteObservation>,
}

/// Tunable thresholds of the transcription heuristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteHeuristics {
    /// A repeated note-on for the identical rounded pitch within this many
    /// ticks is suppressed, leaving the sounding note active. Avoids
    /// machine-gun retriggering from rapid envelope reloads.
    pub retrigger_window: u64,
    /// Pitch drift below this many semitones from the reference note is
    /// considered "on pitch": the bend is reset to center.
    pub bend_tolerance: f64,
    /// Pitch drift at or beyond this many semitones leaves the bend range
    /// and starts a new note.
    pub new_note_threshold: f64,
    /// Pulse periods below this value are treated as effectively silent
    /// (the hardware cannot produce them audibly).
    pub pulse_period_floor: u16,
    /// Triangle periods below this value are ultrasonic and treated as
    /// silent.
    pub triangle_period_floor: u16,
}

impl Default for NoteHeuristics {
    fn default() -> Self {
        Self {
            retrigger_window: 0x30,
            bend_tolerance: 0.0625,
            new_note_threshold: 0.925,
            pulse_period_floor: 0x008,
            triangle_period_floor: 0x002,
        }
    }
}
