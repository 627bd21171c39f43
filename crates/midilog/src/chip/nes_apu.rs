//! NES/Famicom APU transcription wiring.
//!
//! This module binds the five APU voices to the generic instrument state
//! machines:
//!
//! - Voice 0/1 (Pulse 1/2): melodic; MIDI channel `4 * n + duty` so each
//!   duty timbre keeps its own channel, program chosen per duty.
//! - Voice 2 (Triangle): melodic; fixed bass channel 8.
//! - Voice 3 (Noise): rhythmic; percussion channel 9, note from the
//!   configured period map or the raw period value.
//! - Voice 4 (DMC): rhythmic; percussion channel 9 unless a sample mapping
//!   routes the sample to its own channel/program/note.
//!
//! [`NesApuTranscriber::observe_sample`] is called once per audio sample
//! with the chip's current [`ApuSnapshot`]; it re-evaluates every voice and
//! then advances the tick clock, which is what stamps delta-times on the
//! emitted events.

use std::collections::BTreeMap;
use std::io::{Seek, Write};

use crate::binutil::EncodeError;
use crate::chip::dac::DacTables;
use crate::chip::pitch::PitchTable;
use crate::chip::snapshot::{
    ApuSnapshot, DmcSnapshot, NoiseSnapshot, PulseSnapshot, TriangleSnapshot,
};
use crate::chip::transcribe::{
    Instrument, MelodicInstrument, NoteHeuristics, NoteObservation, RhythmicInstrument, VoiceInput,
};
use crate::clock::TickClock;
use crate::smf::event::{META_TEXT, PERCUSSION_CHANNEL};
use crate::smf::file::{MidiFile, TrackId};

/// NTSC APU cycle rate in Hz (master clock / 12).
pub const NTSC_CLOCK_HZ: f64 = 1_789_772.5;

/// General MIDI programs per pulse duty setting: Lead 1 (square),
/// Lead 2 (sawtooth), Lead 3 (calliope), Overdriven Guitar.
pub const PULSE_PROGRAMS: [u8; 4] = [80, 81, 82, 29];

/// Note-on velocity for pulse voices.
pub const PULSE_VELOCITY: u8 = 72;

/// MIDI channel of the triangle voice.
pub const TRIANGLE_CHANNEL: u8 = 8;

/// General MIDI program for the triangle voice (Electric Bass, finger).
pub const TRIANGLE_PROGRAM: u8 = 33;

/// Note-on velocity for the triangle voice.
pub const TRIANGLE_VELOCITY: u8 = 64;

/// Distinct noise period keys: 4-bit period plus the short-mode bit.
const NOISE_KEYS: usize = 32;

/// One of the five APU voices, used to address annotations and tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApuVoice {
    /// Pulse voice 0 or 1.
    Pulse(u8),
    /// The triangle voice.
    Triangle,
    /// The noise voice.
    Noise,
    /// The DMC sample voice.
    Dmc,
}

/// Where a DMC sample should land in the MIDI performance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmcSampleTarget {
    /// MIDI channel for this sample.
    pub channel: u8,
    /// Program to select at note-on.
    pub program: u8,
    /// Default note; negative disables the sample.
    pub note: i16,
    /// Per-period note overrides for pitch-shifted playback of the sample.
    pub period_notes: BTreeMap<u8, i16>,
}

/// Period-keyed drum note map for the noise voice.
///
/// Keys are `period | (short_mode << 4)`; a negative note disables that
/// period entirely.
pub type NoiseNoteMap = BTreeMap<u8, i16>;

/// Sample-address-keyed mapping for the DMC voice.
pub type DmcSampleMap = BTreeMap<u8, DmcSampleTarget>;

/// Per-voice opt-in for free-text meta annotations in the output file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Annotations {
    /// Annotate the two pulse voices.
    pub pulse: [bool; 2],
    /// Annotate the triangle voice.
    pub triangle: bool,
    /// Annotate the noise voice (including unmapped periods).
    pub noise: bool,
    /// Annotate the DMC voice (including unmapped samples).
    pub dmc: bool,
}

impl Annotations {
    fn enabled_for(&self, voice: ApuVoice) -> bool {
        match voice {
            ApuVoice::Pulse(n) => self.pulse[usize::from(n) & 1],
            ApuVoice::Triangle => self.triangle,
            ApuVoice::Noise => self.noise,
            ApuVoice::Dmc => self.dmc,
        }
    }
}

/// Capture configuration: heuristic thresholds, percussion maps,
/// annotations and timing.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriberConfig {
    /// Note-decision thresholds.
    pub heuristics: NoteHeuristics,
    /// Noise period to drum note map.
    pub noise_notes: NoiseNoteMap,
    /// DMC sample mappings.
    pub dmc_samples: DmcSampleMap,
    /// Meta-event annotation switches.
    pub annotations: Annotations,
    /// Capture tempo in beats per minute.
    pub tempo_bpm: f64,
    /// MIDI division in ticks per quarter note.
    pub ticks_per_beat: u16,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            heuristics: NoteHeuristics::default(),
            noise_notes: NoiseNoteMap::new(),
            dmc_samples: DmcSampleMap::new(),
            annotations: Annotations::default(),
            tempo_bpm: crate::clock::DEFAULT_TEMPO_BPM,
            ticks_per_beat: crate::clock::DEFAULT_TICKS_PER_BEAT,
        }
    }
}

/// The full-chip transcriber: five instrument state machines plus the
/// conversion tables and the tick clock.
#[derive(Debug)]
pub struct NesApuTranscriber {
    config: TranscriberConfig,
    pitch: PitchTable,
    dac: DacTables,
    clock: TickClock,
    pulse: [Instrument; 2],
    triangle: Instrument,
    noise: Instrument,
    dmc: Instrument,
    tracks: [TrackId; 5],
    noise_annotated: [bool; NOISE_KEYS],
}

impl NesApuTranscriber {
    /// Create a transcriber for a chip clocked at `sample_rate` Hz,
    /// creating one track per voice on `file` (which collapses to the
    /// single shared track in format 0).
    pub fn new<W: Write + Seek>(
        sample_rate: f64,
        config: TranscriberConfig,
        file: &mut MidiFile<W>,
    ) -> Self {
        let heuristics = config.heuristics;
        let tracks = [
            file.create_track(),
            file.create_track(),
            file.create_track(),
            file.create_track(),
            file.create_track(),
        ];
        let clock = TickClock::with_tempo(sample_rate, config.tempo_bpm, config.ticks_per_beat);
        Self {
            pitch: PitchTable::new(sample_rate),
            dac: DacTables::new(),
            clock,
            pulse: [
                Instrument::Melodic(MelodicInstrument::new(tracks[0], heuristics)),
                Instrument::Melodic(MelodicInstrument::new(tracks[1], heuristics)),
            ],
            triangle: Instrument::Melodic(MelodicInstrument::new(tracks[2], heuristics)),
            noise: Instrument::Rhythmic(RhythmicInstrument::new(tracks[3], heuristics)),
            dmc: Instrument::Rhythmic(RhythmicInstrument::new(tracks[4], heuristics)),
            tracks,
            noise_annotated: [false; NOISE_KEYS],
            config,
        }
    }

    /// The capture configuration.
    pub fn config(&self) -> &TranscriberConfig {
        &self.config
    }

    /// The tick clock driving delta-times.
    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// The track a voice emits on.
    pub fn track_of(&self, voice: ApuVoice) -> TrackId {
        match voice {
            ApuVoice::Pulse(n) => self.tracks[usize::from(n) & 1],
            ApuVoice::Triangle => self.tracks[2],
            ApuVoice::Noise => self.tracks[3],
            ApuVoice::Dmc => self.tracks[4],
        }
    }

    /// Re-evaluate every voice against `snapshot`, then advance the tick
    /// clock by the one elapsed audio sample.
    pub fn observe_sample<W: Write + Seek>(
        &mut self,
        snapshot: &ApuSnapshot,
        file: &mut MidiFile<W>,
    ) -> Result<(), EncodeError> {
        self.observe_pulse(0, &snapshot.pulse[0], file)?;
        self.observe_pulse(1, &snapshot.pulse[1], file)?;
        self.observe_triangle(&snapshot.triangle, file)?;
        self.observe_noise(&snapshot.noise, file)?;
        self.observe_dmc(&snapshot.dmc, file)?;

        if self.clock.advance_sample() {
            file.advance_ticks(1);
        }
        Ok(())
    }

    /// End every sounding note. Call once when the capture stops.
    pub fn finish<W: Write + Seek>(&mut self, file: &mut MidiFile<W>) -> Result<(), EncodeError> {
        self.pulse[0].release(file)?;
        self.pulse[1].release(file)?;
        self.triangle.release(file)?;
        self.noise.release(file)?;
        self.dmc.release(file)
    }

    /// Record a raw register write as a free-text meta annotation on the
    /// voice's track, when annotations are enabled for that voice.
    ///
    /// The emulation core calls this from its register-write path; it has
    /// no effect on note decisions.
    pub fn annotate_register_write<W: Write + Seek>(
        &mut self,
        voice: ApuVoice,
        register: u8,
        value: u8,
        file: &mut MidiFile<W>,
    ) -> Result<(), EncodeError> {
        if !self.config.annotations.enabled_for(voice) {
            return Ok(());
        }
        let channel = self
            .instrument_of(voice)
            .midi_channel()
            .unwrap_or(PERCUSSION_CHANNEL);
        let text = format!("[{:02x}]={:02x}", register, value);
        file.channel_prefix_meta(self.track_of(voice), channel, META_TEXT, &text)
    }

    fn instrument_of(&self, voice: ApuVoice) -> &Instrument {
        match voice {
            ApuVoice::Pulse(n) => &self.pulse[usize::from(n) & 1],
            ApuVoice::Triangle => &self.triangle,
            ApuVoice::Noise => &self.noise,
            ApuVoice::Dmc => &self.dmc,
        }
    }

    fn observe_pulse<W: Write + Seek>(
        &mut self,
        n: usize,
        snap: &PulseSnapshot,
        file: &mut MidiFile<W>,
    ) -> Result<(), EncodeError> {
        let heuristics = &self.config.heuristics;
        let silenced = !snap.period_valid
            || !snap.length_active
            || snap.period < heuristics.pulse_period_floor;
        let duty = snap.duty & 0x03;

        let input = VoiceInput {
            level: snap.volume & 0x0F,
            silenced,
            write_trigger: snap.write_trigger,
            envelope_trigger: snap.envelope_trigger,
            note: Some(NoteObservation {
                pitch: self.pitch.pulse_pitch(snap.period),
                channel: 4 * n as u8 + duty,
                program: Some(PULSE_PROGRAMS[usize::from(duty)]),
                velocity: PULSE_VELOCITY,
                channel_volume: self.dac.envelope_volume(snap.volume),
            }),
        };
        self.pulse[n].observe(&input, file)
    }

    fn observe_triangle<W: Write + Seek>(
        &mut self,
        snap: &TriangleSnapshot,
        file: &mut MidiFile<W>,
    ) -> Result<(), EncodeError> {
        let heuristics = &self.config.heuristics;
        let silenced = !snap.length_active
            || !snap.linear_active
            || snap.period < heuristics.triangle_period_floor;

        let input = VoiceInput {
            // The triangle has no envelope: it runs at full amplitude
            // whenever its counters allow it.
            level: if silenced { 0 } else { 15 },
            silenced,
            write_trigger: snap.write_trigger,
            envelope_trigger: false,
            note: Some(NoteObservation {
                pitch: self.pitch.triangle_pitch(snap.period),
                channel: TRIANGLE_CHANNEL,
                program: Some(TRIANGLE_PROGRAM),
                velocity: TRIANGLE_VELOCITY,
                channel_volume: self.dac.triangle_volume(),
            }),
        };
        self.triangle.observe(&input, file)
    }

    fn observe_noise<W: Write + Seek>(
        &mut self,
        snap: &NoiseSnapshot,
        file: &mut MidiFile<W>,
    ) -> Result<(), EncodeError> {
        let key = (snap.period & 0x0F) | (u8::from(snap.short_mode) << 4);

        let pitch = match self.config.noise_notes.get(&key).copied() {
            Some(note) if note < 0 => None,
            Some(note) => Some(f64::from(note)),
            None => {
                // No configured mapping: fall back to the raw period key as
                // the drum note, optionally leaving a breadcrumb.
                if self.config.annotations.noise
                    && !self.noise_annotated[usize::from(key)]
                    && snap.volume > 0
                    && snap.length_active
                {
                    self.noise_annotated[usize::from(key)] = true;
                    let text = format!("noise period=0x{:02x}", key);
                    file.channel_prefix_meta(
                        self.tracks[3],
                        PERCUSSION_CHANNEL,
                        META_TEXT,
                        &text,
                    )?;
                }
                Some(f64::from(key))
            }
        };

        let input = VoiceInput {
            level: snap.volume & 0x0F,
            silenced: !snap.length_active,
            write_trigger: false,
            envelope_trigger: false,
            note: pitch.map(|pitch| NoteObservation {
                pitch,
                channel: PERCUSSION_CHANNEL,
                program: None,
                velocity: self.dac.noise_velocity(snap.volume),
                channel_volume: self.dac.envelope_volume(snap.volume),
            }),
        };
        self.noise.observe(&input, file)
    }

    fn observe_dmc<W: Write + Seek>(
        &mut self,
        snap: &DmcSnapshot,
        file: &mut MidiFile<W>,
    ) -> Result<(), EncodeError> {
        let target = self.config.dmc_samples.get(&snap.sample_address);

        let (pitch, channel, program) = match target {
            Some(target) => {
                let note = target
                    .period_notes
                    .get(&snap.period)
                    .copied()
                    .unwrap_or(target.note);
                let pitch = (note >= 0).then(|| f64::from(note));
                (pitch, target.channel, Some(target.program))
            }
            None => {
                if self.config.annotations.dmc && snap.start_trigger {
                    let text = format!(
                        "dmc sample=0x{:02x} period=0x{:02x}",
                        snap.sample_address, snap.period
                    );
                    file.channel_prefix_meta(
                        self.tracks[4],
                        PERCUSSION_CHANNEL,
                        META_TEXT,
                        &text,
                    )?;
                }
                (Some(f64::from(snap.period)), PERCUSSION_CHANNEL, None)
            }
        };

        let input = VoiceInput {
            level: if snap.active { 15 } else { 0 },
            silenced: !snap.active,
            write_trigger: snap.start_trigger,
            envelope_trigger: false,
            note: pitch.map(|pitch| NoteObservation {
                pitch,
                channel,
                program,
                velocity: self.dac.dmc_level(),
                channel_volume: self.dac.dmc_level(),
            }),
        };
        self.dmc.observe(&input, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smf::file::MidiFormat;

    fn pulse_playing(period: u16, volume: u8) -> ApuSnapshot {
        let mut snapshot = ApuSnapshot::default();
        snapshot.pulse[0] = PulseSnapshot {
            duty: 0,
            period,
            volume,
            length_active: true,
            period_valid: true,
            write_trigger: false,
            envelope_trigger: false,
        };
        snapshot
    }

    #[test]
    fn test_pulse_note_on_event_order() {
        let mut file = MidiFile::in_memory(MidiFormat::MultiTrack).unwrap();
        let mut apu = NesApuTranscriber::new(NTSC_CLOCK_HZ, TranscriberConfig::default(), &mut file);

        let mut snapshot = pulse_playing(0x100, 15);
        snapshot.pulse[0].write_trigger = true;
        apu.observe_sample(&snapshot, &mut file).unwrap();

        let bytes = file.track(apu.track_of(ApuVoice::Pulse(0))).bytes().to_vec();
        // CC 7, pitch bend, program change, note on — in that order.
        assert_eq!(bytes[1] & 0xF0, 0xB0);
        assert_eq!(bytes[2], 0x07);
        assert_eq!(bytes[5] & 0xF0, 0xE0);
        assert_eq!(bytes[9] & 0xF0, 0xC0);
        assert_eq!(bytes[10], PULSE_PROGRAMS[0]);
        assert_eq!(bytes[12] & 0xF0, 0x90);
        // Period 0x100 on the NTSC clock rounds to A4 (69).
        assert_eq!(bytes[13], 69);
        assert_eq!(bytes[14], PULSE_VELOCITY);
    }

    #[test]
    fn test_length_expiry_releases_note() {
        let mut file = MidiFile::in_memory(MidiFormat::MultiTrack).unwrap();
        let mut apu = NesApuTranscriber::new(NTSC_CLOCK_HZ, TranscriberConfig::default(), &mut file);

        let mut snapshot = pulse_playing(0x100, 15);
        snapshot.pulse[0].write_trigger = true;
        apu.observe_sample(&snapshot, &mut file).unwrap();
        assert_eq!(apu.instrument_of(ApuVoice::Pulse(0)).last_note(), Some(69));

        snapshot.pulse[0].write_trigger = false;
        snapshot.pulse[0].length_active = false;
        apu.observe_sample(&snapshot, &mut file).unwrap();
        assert_eq!(apu.instrument_of(ApuVoice::Pulse(0)).last_note(), None);
    }

    #[test]
    fn test_noise_fallback_note_is_period_key() {
        let mut file = MidiFile::in_memory(MidiFormat::MultiTrack).unwrap();
        let mut apu = NesApuTranscriber::new(NTSC_CLOCK_HZ, TranscriberConfig::default(), &mut file);

        let mut snapshot = ApuSnapshot::default();
        snapshot.noise = NoiseSnapshot {
            period: 0x05,
            short_mode: true,
            volume: 12,
            length_active: true,
        };
        apu.observe_sample(&snapshot, &mut file).unwrap();
        assert_eq!(apu.instrument_of(ApuVoice::Noise).last_note(), Some(0x15));
        assert_eq!(apu.instrument_of(ApuVoice::Noise).midi_channel(), Some(9));
    }

    #[test]
    fn test_noise_mapped_and_disabled_periods() {
        let mut config = TranscriberConfig::default();
        config.noise_notes.insert(0x05, 38);
        config.noise_notes.insert(0x06, -1);

        let mut file = MidiFile::in_memory(MidiFormat::MultiTrack).unwrap();
        let mut apu = NesApuTranscriber::new(NTSC_CLOCK_HZ, config, &mut file);

        let mut snapshot = ApuSnapshot::default();
        snapshot.noise = NoiseSnapshot {
            period: 0x05,
            short_mode: false,
            volume: 12,
            length_active: true,
        };
        apu.observe_sample(&snapshot, &mut file).unwrap();
        assert_eq!(apu.instrument_of(ApuVoice::Noise).last_note(), Some(38));

        // A disabled period ends the note and emits nothing new.
        snapshot.noise.period = 0x06;
        apu.observe_sample(&snapshot, &mut file).unwrap();
        assert_eq!(apu.instrument_of(ApuVoice::Noise).last_note(), None);
    }

    #[test]
    fn test_dmc_sample_mapping_routes_channel_and_program() {
        let mut config = TranscriberConfig::default();
        config.dmc_samples.insert(
            0xC0,
            DmcSampleTarget {
                channel: 10,
                program: 117,
                note: 45,
                period_notes: BTreeMap::new(),
            },
        );

        let mut file = MidiFile::in_memory(MidiFormat::MultiTrack).unwrap();
        let mut apu = NesApuTranscriber::new(NTSC_CLOCK_HZ, config, &mut file);

        let mut snapshot = ApuSnapshot::default();
        snapshot.dmc = DmcSnapshot {
            period: 0x0F,
            sample_address: 0xC0,
            active: true,
            start_trigger: true,
        };
        apu.observe_sample(&snapshot, &mut file).unwrap();
        assert_eq!(apu.instrument_of(ApuVoice::Dmc).last_note(), Some(45));
        assert_eq!(apu.instrument_of(ApuVoice::Dmc).midi_channel(), Some(10));
    }

    #[test]
    fn test_finish_releases_all_voices() {
        let mut file = MidiFile::in_memory(MidiFormat::MultiTrack).unwrap();
        let mut apu = NesApuTranscriber::new(NTSC_CLOCK_HZ, TranscriberConfig::default(), &mut file);

        let mut snapshot = pulse_playing(0x100, 15);
        snapshot.pulse[0].write_trigger = true;
        apu.observe_sample(&snapshot, &mut file).unwrap();
        apu.finish(&mut file).unwrap();
        assert_eq!(apu.instrument_of(ApuVoice::Pulse(0)).last_note(), None);
    }
}
