#![doc = include_str!("../README.md")]
//! midilog — transcriber and encoder for MIDI captures of sound-chip state
//!
//! `midilog` turns the per-sample internal state of an emulated NES/Famicom
//! audio processor into a standard MIDI file. It contains two halves:
//!
//! - the **chip side** (`chip`): per-voice snapshots, the period-to-pitch
//!   and DAC non-linearity tables, and the note transcription state
//!   machines that decide when a note begins, continues, bends or ends;
//! - the **byte side** (`smf`): the MIDI event model, per-channel
//!   redundant-event suppression, the delta-time track encoder and the
//!   format 0 / format 1 file container, plus a strict parser for
//!   round-trip verification.
//!
//! The `clock` module bridges the two: audio cycles in, MIDI ticks out.
//!
//! Key properties:
//! - Type-safe event emission: 7-bit and channel fields are clamped before
//!   encoding, never wrapped; a backwards tick delta is a loud error.
//! - Low-memory capture: format 0 streams events straight to the output
//!   writer and patches the track length in place, so a long capture never
//!   buffers the whole byte stream and a crash still leaves a valid file.
//! - No dependencies beyond the standard library.
//!
//! Examples
//!
//! Example: encoding events by hand
//!
//! ```rust
//! use std::io::Cursor;
//! use midilog::smf::{MidiFile, MidiFormat};
//!
//! let mut file = MidiFile::new(Cursor::new(Vec::new()), MidiFormat::MultiTrack)?;
//! let track = file.create_track();
//!
//! file.program_change(track, 0, 80)?;
//! file.note_on(track, 0, 69, 72)?;
//! file.advance_ticks(480); // one beat
//! file.note_off(track, 0, 69, 0)?;
//!
//! let bytes = file.save()?.into_inner();
//! assert_eq!(&bytes[..4], b"MThd");
//! # Ok::<(), midilog::EncodeError>(())
//! ```
//!
//! Example: transcribing chip state
//!
//! The emulation core calls [`NesApuTranscriber::observe_sample`] once per
//! audio sample with a read-only snapshot of the five voices. Here a pulse
//! voice plays one note for a quarter of a second:
//!
//! ```rust
//! use midilog::chip::nes_apu::{NesApuTranscriber, NTSC_CLOCK_HZ, TranscriberConfig};
//! use midilog::chip::snapshot::ApuSnapshot;
//! use midilog::smf::{MidiDocument, MidiFile, MidiFormat};
//!
//! let mut file = MidiFile::in_memory(MidiFormat::MultiTrack)?;
//! let mut apu = NesApuTranscriber::new(NTSC_CLOCK_HZ, TranscriberConfig::default(), &mut file);
//!
//! let mut snapshot = ApuSnapshot::default();
//! snapshot.pulse[0].duty = 2;
//! snapshot.pulse[0].period = 0x0FD; // ~440 Hz
//! snapshot.pulse[0].volume = 15;
//! snapshot.pulse[0].length_active = true;
//! snapshot.pulse[0].period_valid = true;
//! snapshot.pulse[0].write_trigger = true;
//!
//! for _ in 0..(NTSC_CLOCK_HZ as u32 / 4) {
//!     apu.observe_sample(&snapshot, &mut file)?;
//!     snapshot.pulse[0].write_trigger = false;
//! }
//! apu.finish(&mut file)?;
//!
//! let bytes = file.save()?.into_inner();
//! let document = MidiDocument::try_from(bytes.as_slice()).expect("own output parses");
//! assert_eq!(document.format, 1);
//! # Ok::<(), midilog::EncodeError>(())
//! ```
//!
//! Example: streaming a format 0 capture to disk
//!
//! ```no_run
//! use std::fs::File;
//! use midilog::chip::nes_apu::{NesApuTranscriber, NTSC_CLOCK_HZ, TranscriberConfig};
//! use midilog::chip::snapshot::ApuSnapshot;
//! use midilog::smf::{MidiFile, MidiFormat};
//!
//! let out = File::create("capture.mid")?;
//! let mut file = MidiFile::new(out, MidiFormat::Single)?;
//! let mut apu = NesApuTranscriber::new(NTSC_CLOCK_HZ, TranscriberConfig::default(), &mut file);
//!
//! let snapshot = ApuSnapshot::default();
//! loop {
//!     // ... run the emulation for one sample, refresh `snapshot` ...
//!     apu.observe_sample(&snapshot, &mut file)?;
//!     # break;
//! }
//! apu.finish(&mut file)?;
//! file.save()?; // final track-length patch + flush
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod binutil;
pub mod chip;
pub mod clock;
pub mod smf;

pub use binutil::{EncodeError, ParseError};
pub use chip::nes_apu::{NesApuTranscriber, TranscriberConfig};
pub use chip::snapshot::ApuSnapshot;
pub use clock::TickClock;
pub use smf::{MidiDocument, MidiEvent, MidiFile, MidiFormat, TrackId};
