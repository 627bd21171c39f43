//! Melodic and rhythmic instrument state machines.

use std::io::{Seek, Write};

use crate::binutil::EncodeError;
use crate::chip::transcribe::{NoteHeuristics, NoteObservation, VoiceInput};
use crate::smf::event::{BEND_CENTER, BEND_MAX, CC_CHANNEL_VOLUME, PERCUSSION_CHANNEL};
use crate::smf::file::{MidiFile, TrackId};

/// Compute the 14-bit pitch-bend value expressing `pitch` relative to the
/// integer `reference` note, clamped to the legal range.
pub(crate) fn bend_from(pitch: f64, reference: f64) -> u16 {
    let raw = ((pitch - reference) * f64::from(0x0FFFu16)).round() + f64::from(BEND_CENTER);
    raw.clamp(0.0, f64::from(BEND_MAX)) as u16
}

/// A pitched voice: pulse or triangle.
///
/// Invariant: `last_note` is `Some` iff a note-on has been sent and not yet
/// matched by a note-off. Every read of the "no active note" state is an
/// explicit branch on these options.
#[derive(Debug)]
pub struct MelodicInstrument {
    track: TrackId,
    heuristics: NoteHeuristics,
    last_note: Option<u8>,
    last_channel: Option<u8>,
    last_note_tick: Option<u64>,
    /// The rounded note used as the pitch-bend zero reference while the
    /// note sounds.
    pitch_reference: Option<f64>,
    last_level: u8,
    explicit_latch: bool,
    envelope_latch: bool,
}

impl MelodicInstrument {
    /// Create a silent instrument writing to `track`.
    pub fn new(track: TrackId, heuristics: NoteHeuristics) -> Self {
        Self {
            track,
            heuristics,
            last_note: None,
            last_channel: None,
            last_note_tick: None,
            pitch_reference: None,
            last_level: 0,
            explicit_latch: false,
            envelope_latch: false,
        }
    }

    /// Re-evaluate the voice for one audio sample.
    pub fn observe<W: Write + Seek>(
        &mut self,
        input: &VoiceInput,
        file: &mut MidiFile<W>,
    ) -> Result<(), EncodeError> {
        self.explicit_latch |= input.write_trigger;
        self.envelope_latch |= input.envelope_trigger;

        let audible = !input.silenced && input.level > 0;
        let Some(obs) = input.note.as_ref().filter(|_| audible) else {
            self.last_level = if audible { input.level } else { 0 };
            return self.note_off(file);
        };

        let trigger = self.explicit_latch
            || self.envelope_latch
            || input.level > self.last_level
            || self.last_note.is_none();
        if trigger {
            self.explicit_latch = false;
            self.envelope_latch = false;
            self.note_on(obs, file)?;
        }
        self.note_continue(obs, file)?;

        self.last_level = input.level;
        Ok(())
    }

    /// End the sounding note, if any.
    pub fn note_off<W: Write + Seek>(&mut self, file: &mut MidiFile<W>) -> Result<(), EncodeError> {
        let (Some(channel), Some(note)) = (self.last_channel, self.last_note) else {
            return Ok(());
        };
        file.note_off(self.track, channel, note, 0)?;
        self.last_note = None;
        self.pitch_reference = None;
        Ok(())
    }

    /// Start a note for `obs`, retiring any sounding one first.
    fn note_on<W: Write + Seek>(
        &mut self,
        obs: &NoteObservation,
        file: &mut MidiFile<W>,
    ) -> Result<(), EncodeError> {
        if !obs.pitch.is_finite() {
            return Ok(());
        }
        let rounded = obs.pitch.round();

        // Rate limit retriggers of the identical note.
        if let (Some(last), Some(at)) = (self.last_note, self.last_note_tick)
            && f64::from(last) == rounded
            && file.tick().saturating_sub(at) < self.heuristics.retrigger_window
        {
            return Ok(());
        }

        if self.last_note.is_some() {
            self.note_off(file)?;
        }
        if rounded < 0.0 {
            return Ok(());
        }
        let note = rounded.min(127.0) as u8;

        file.control_change(self.track, obs.channel, CC_CHANNEL_VOLUME, obs.channel_volume)?;

        if obs.channel != PERCUSSION_CHANNEL {
            let drift = (obs.pitch - rounded).abs();
            if drift < self.heuristics.bend_tolerance {
                file.pitch_bend_change(self.track, obs.channel, BEND_CENTER)?;
            } else {
                file.pitch_bend_change(self.track, obs.channel, bend_from(obs.pitch, rounded))?;
            }
        }

        if let Some(program) = obs.program {
            file.program_change(self.track, obs.channel, program)?;
        }

        file.note_on(self.track, obs.channel, note, obs.velocity)?;

        self.last_note_tick = Some(file.tick());
        self.last_channel = Some(obs.channel);
        self.last_note = Some(note);
        self.pitch_reference = Some(rounded);
        Ok(())
    }

    /// Keep a sounding note up to date: channel volume, then the pitch
    /// wheel — or a new note once the pitch leaves the bend range.
    fn note_continue<W: Write + Seek>(
        &mut self,
        obs: &NoteObservation,
        file: &mut MidiFile<W>,
    ) -> Result<(), EncodeError> {
        let (Some(channel), Some(reference)) = (self.last_channel, self.pitch_reference) else {
            return Ok(());
        };

        // Update the last channel played on: a duty change mid-note would
        // move the voice to another channel, which only takes effect at the
        // next note-on.
        file.control_change(self.track, channel, CC_CHANNEL_VOLUME, obs.channel_volume)?;

        if channel == PERCUSSION_CHANNEL {
            return Ok(());
        }

        let drift = (obs.pitch - reference).abs();
        if drift >= self.heuristics.new_note_threshold {
            // Too far outside bend range, start a new note.
            self.note_on(obs, file)?;
        } else if drift >= self.heuristics.bend_tolerance {
            file.pitch_bend_change(self.track, channel, bend_from(obs.pitch, reference))?;
        } else {
            // Back within tolerance of the reference note.
            file.pitch_bend_change(self.track, channel, BEND_CENTER)?;
        }
        Ok(())
    }

    /// The sounding note, if any.
    pub fn last_note(&self) -> Option<u8> {
        self.last_note
    }

    /// The MIDI channel of the sounding note, if any.
    pub fn midi_channel(&self) -> Option<u8> {
        self.last_channel
    }
}

/// An unpitched voice: noise or DMC sample playback.
///
/// Strikes a drum note on pitch change, rising velocity, or an explicit
/// restart; never emits pitch bends.
#[derive(Debug)]
pub struct RhythmicInstrument {
    track: TrackId,
    heuristics: NoteHeuristics,
    last_note: Option<u8>,
    last_channel: Option<u8>,
    last_note_tick: Option<u64>,
    last_velocity: u8,
    explicit_latch: bool,
}

impl RhythmicInstrument {
    /// Create a silent instrument writing to `track`.
    pub fn new(track: TrackId, heuristics: NoteHeuristics) -> Self {
        Self {
            track,
            heuristics,
            last_note: None,
            last_channel: None,
            last_note_tick: None,
            last_velocity: 0,
            explicit_latch: false,
        }
    }

    /// Re-evaluate the voice for one audio sample.
    pub fn observe<W: Write + Seek>(
        &mut self,
        input: &VoiceInput,
        file: &mut MidiFile<W>,
    ) -> Result<(), EncodeError> {
        self.explicit_latch |= input.write_trigger;

        let audible = !input.silenced && input.level > 0;
        let Some(obs) = input.note.as_ref().filter(|_| audible) else {
            self.last_velocity = 0;
            return self.note_off(file);
        };

        self.strike(obs, file)
    }

    /// End the sounding note, if any.
    pub fn note_off<W: Write + Seek>(&mut self, file: &mut MidiFile<W>) -> Result<(), EncodeError> {
        let (Some(channel), Some(note)) = (self.last_channel, self.last_note) else {
            return Ok(());
        };
        file.note_off(self.track, channel, note, 0)?;
        self.last_note = None;
        Ok(())
    }

    /// Strike or sustain the drum note described by `obs`.
    fn strike<W: Write + Seek>(
        &mut self,
        obs: &NoteObservation,
        file: &mut MidiFile<W>,
    ) -> Result<(), EncodeError> {
        if !obs.pitch.is_finite() || obs.pitch < 0.0 {
            self.last_velocity = obs.velocity;
            return self.note_off(file);
        }
        let note = obs.pitch.round().min(127.0) as u8;

        let retrigger = self.explicit_latch
            || self.last_note != Some(note)
            || obs.velocity > self.last_velocity;

        if retrigger {
            self.explicit_latch = false;

            // Rate limit identical-pitch retriggers.
            let limited = self.last_note == Some(note)
                && self
                    .last_note_tick
                    .is_some_and(|at| file.tick().saturating_sub(at) < self.heuristics.retrigger_window);

            if !limited {
                self.note_off(file)?;
                file.control_change(self.track, obs.channel, CC_CHANNEL_VOLUME, obs.channel_volume)?;
                if let Some(program) = obs.program {
                    file.program_change(self.track, obs.channel, program)?;
                }
                file.note_on(self.track, obs.channel, note, obs.velocity)?;
                self.last_note = Some(note);
                self.last_channel = Some(obs.channel);
                self.last_note_tick = Some(file.tick());
            }
        } else if let Some(channel) = self.last_channel {
            file.control_change(self.track, channel, CC_CHANNEL_VOLUME, obs.channel_volume)?;
        }

        self.last_velocity = obs.velocity;
        Ok(())
    }

    /// The sounding note, if any.
    pub fn last_note(&self) -> Option<u8> {
        self.last_note
    }

    /// The MIDI channel of the sounding note, if any.
    pub fn midi_channel(&self) -> Option<u8> {
        self.last_channel
    }
}

/// One voice's transcription state machine, selected at construction time
/// per hardware channel.
#[derive(Debug)]
pub enum Instrument {
    /// Pitched voice.
    Melodic(MelodicInstrument),
    /// Percussive voice.
    Rhythmic(RhythmicInstrument),
}

impl Instrument {
    /// Re-evaluate the voice for one audio sample.
    pub fn observe<W: Write + Seek>(
        &mut self,
        input: &VoiceInput,
        file: &mut MidiFile<W>,
    ) -> Result<(), EncodeError> {
        match self {
            Instrument::Melodic(voice) => voice.observe(input, file),
            Instrument::Rhythmic(voice) => voice.observe(input, file),
        }
    }

    /// End the sounding note, if any. Used at capture end.
    pub fn release<W: Write + Seek>(&mut self, file: &mut MidiFile<W>) -> Result<(), EncodeError> {
        match self {
            Instrument::Melodic(voice) => voice.note_off(file),
            Instrument::Rhythmic(voice) => voice.note_off(file),
        }
    }

    /// The sounding note, if any.
    pub fn last_note(&self) -> Option<u8> {
        match self {
            Instrument::Melodic(voice) => voice.last_note(),
            Instrument::Rhythmic(voice) => voice.last_note(),
        }
    }

    /// The MIDI channel of the sounding note, if any.
    pub fn midi_channel(&self) -> Option<u8> {
        match self {
            Instrument::Melodic(voice) => voice.midi_channel(),
            Instrument::Rhythmic(voice) => voice.midi_channel(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smf::file::MidiFormat;

    fn melodic_input(pitch: f64) -> VoiceInput {
        VoiceInput {
            level: 15,
            silenced: false,
            write_trigger: false,
            envelope_trigger: false,
            note: Some(NoteObservation {
                pitch,
                channel: 0,
                program: Some(80),
                velocity: 72,
                channel_volume: 100,
            }),
        }
    }

    #[test]
    fn test_bend_from_center_and_extremes() {
        assert_eq!(bend_from(60.0, 60.0), BEND_CENTER);
        assert_eq!(bend_from(60.5, 60.0), BEND_CENTER + 0x0FFF / 2 + 1);
        // Far out-of-range drifts clamp instead of wrapping.
        assert_eq!(bend_from(70.0, 60.0), BEND_MAX);
        assert_eq!(bend_from(50.0, 60.0), 0);
    }

    #[test]
    fn test_negative_pitch_emits_nothing() {
        let mut file = MidiFile::in_memory(MidiFormat::MultiTrack).unwrap();
        let track = file.create_track();
        let mut voice = MelodicInstrument::new(track, NoteHeuristics::default());
        voice.observe(&melodic_input(-4.0), &mut file).unwrap();
        assert_eq!(voice.last_note(), None);
        assert_eq!(file.track(track).byte_len(), 0);
    }

    #[test]
    fn test_non_finite_pitch_emits_nothing() {
        let mut file = MidiFile::in_memory(MidiFormat::MultiTrack).unwrap();
        let track = file.create_track();
        let mut voice = MelodicInstrument::new(track, NoteHeuristics::default());
        voice.observe(&melodic_input(f64::NAN), &mut file).unwrap();
        assert_eq!(voice.last_note(), None);
    }

    #[test]
    fn test_silence_releases_note() {
        let mut file = MidiFile::in_memory(MidiFormat::MultiTrack).unwrap();
        let track = file.create_track();
        let mut voice = MelodicInstrument::new(track, NoteHeuristics::default());
        voice.observe(&melodic_input(60.0), &mut file).unwrap();
        assert_eq!(voice.last_note(), Some(60));

        let mut silent = melodic_input(60.0);
        silent.level = 0;
        voice.observe(&silent, &mut file).unwrap();
        assert_eq!(voice.last_note(), None);
    }

    #[test]
    fn test_rhythmic_retriggers_on_new_pitch_only() {
        let mut file = MidiFile::in_memory(MidiFormat::MultiTrack).unwrap();
        let track = file.create_track();
        let mut voice = RhythmicInstrument::new(track, NoteHeuristics::default());
        let hit = |pitch: f64| VoiceInput {
            level: 12,
            silenced: false,
            write_trigger: false,
            envelope_trigger: false,
            note: Some(NoteObservation {
                pitch,
                channel: 9,
                program: None,
                velocity: 70,
                channel_volume: 90,
            }),
        };
        voice.observe(&hit(38.0), &mut file).unwrap();
        let after_first = file.track(track).byte_len();
        // Same pitch, same velocity: sustain, no new note-on.
        voice.observe(&hit(38.0), &mut file).unwrap();
        assert_eq!(file.track(track).byte_len(), after_first);
        assert_eq!(voice.last_note(), Some(38));
        // New pitch outside the retrigger guard: strikes again.
        file.advance_ticks(0x40);
        voice.observe(&hit(45.0), &mut file).unwrap();
        assert_eq!(voice.last_note(), Some(45));
    }
}
