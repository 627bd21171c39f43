//! `demo`: capture a small built-in performance through the transcriber.
//!
//! The demo drives `NesApuTranscriber` with synthesized snapshots — an
//! arpeggio on pulse 1, a held bass line on the triangle and a noise hat on
//! every beat — and writes the capture in the requested SMF layout. Useful
//! for listening to heuristic changes without a full emulation core.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use midilog::chip::nes_apu::{
    ApuVoice, DmcSampleTarget, NTSC_CLOCK_HZ, NesApuTranscriber, TranscriberConfig,
};
use midilog::chip::snapshot::ApuSnapshot;
use midilog::smf::event::META_END_OF_TRACK;
use midilog::smf::{MidiFile, MidiFormat};

/// On-disk percussion mapping, mirroring the library's
/// `NoiseNoteMap`/`DmcSampleMap` types.
#[derive(Deserialize, Debug, Default)]
struct MapFile {
    #[serde(default)]
    noise: Vec<NoiseMapEntry>,
    #[serde(default)]
    dmc: Vec<DmcMapEntry>,
}

#[derive(Deserialize, Debug)]
struct NoiseMapEntry {
    period: u8,
    #[serde(default)]
    short_mode: bool,
    #[serde(default)]
    midi_note: i16,
    #[serde(default)]
    disable: bool,
}

#[derive(Deserialize, Debug)]
struct DmcMapEntry {
    sample: u8,
    midi_channel: u8,
    #[serde(default)]
    midi_program: u8,
    #[serde(default)]
    midi_note: i16,
    #[serde(default)]
    disable: bool,
    #[serde(default)]
    periods: Vec<DmcPeriodEntry>,
}

#[derive(Deserialize, Debug)]
struct DmcPeriodEntry {
    period: u8,
    midi_note: i16,
}

/// Load a JSON mapping file into the capture configuration.
fn load_map(config: &mut TranscriberConfig, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let map: MapFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;

    for entry in map.noise {
        let key = (entry.period & 0x0F) | (u8::from(entry.short_mode) << 4);
        let note = if entry.disable { -1 } else { entry.midi_note };
        config.noise_notes.insert(key, note);
    }

    for entry in map.dmc {
        let note = if entry.disable { -1 } else { entry.midi_note };
        let mut target = DmcSampleTarget {
            channel: entry.midi_channel,
            program: entry.midi_program,
            note,
            period_notes: Default::default(),
        };
        for period in entry.periods {
            target.period_notes.insert(period.period, period.midi_note);
        }
        config.dmc_samples.insert(entry.sample, target);
    }

    Ok(())
}

/// Timer period producing `note` through the pulse pitch mapping.
fn pulse_period(note: f64) -> u16 {
    let freq = 440.0 * ((note - 69.0) / 12.0).exp2();
    (NTSC_CLOCK_HZ / (16.0 * freq) - 1.0).round() as u16
}

/// Timer period producing `note` through the triangle pitch mapping,
/// which sounds an octave below the pulse mapping for the same period.
fn triangle_period(note: f64) -> u16 {
    pulse_period(note + 12.0)
}

/// Entry point for the `demo` subcommand.
pub fn run(output: &Path, format: u8, map: Option<&Path>, seconds: f64) -> Result<()> {
    let format = match format {
        0 => MidiFormat::Single,
        1 => MidiFormat::MultiTrack,
        other => bail!("unsupported SMF format {} (use 0 or 1)", other),
    };
    if !seconds.is_finite() || seconds <= 0.0 {
        bail!("capture length must be positive");
    }

    let mut config = TranscriberConfig::default();
    if let Some(path) = map {
        load_map(&mut config, path)?;
    }

    let out = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut file = MidiFile::new(out, format)?;
    let mut apu = NesApuTranscriber::new(NTSC_CLOCK_HZ, config, &mut file);

    let melody = [69.0f64, 72.0, 76.0, 81.0, 76.0, 72.0];
    let bass = [45.0f64, 41.0];

    let samples_per_beat = (NTSC_CLOCK_HZ / 2.0) as u64; // 120 BPM
    let hat_length = samples_per_beat / 8;
    let total_samples = (seconds * NTSC_CLOCK_HZ) as u64;

    for sample in 0..total_samples {
        let beat = sample / samples_per_beat;
        let in_beat = sample % samples_per_beat;
        let fresh = in_beat == 0;

        let mut snapshot = ApuSnapshot::default();

        // Pulse 1: the arpeggio, one note per beat with a decaying envelope.
        let note = melody[(beat as usize) % melody.len()];
        let pulse = &mut snapshot.pulse[0];
        pulse.duty = 2;
        pulse.period = pulse_period(note);
        pulse.length_active = true;
        pulse.period_valid = true;
        pulse.write_trigger = fresh;
        pulse.envelope_trigger = fresh;
        pulse.volume = 15 - (in_beat * 8 / samples_per_beat) as u8;

        // Triangle: a bass note held for two beats.
        let bar = (beat / 2) as usize;
        let triangle = &mut snapshot.triangle;
        triangle.period = triangle_period(bass[bar % bass.len()]);
        triangle.length_active = true;
        triangle.linear_active = true;
        triangle.write_trigger = fresh && beat % 2 == 0;

        // Noise: a short hat on every beat.
        let noise = &mut snapshot.noise;
        noise.period = 0x0C;
        noise.short_mode = false;
        noise.length_active = in_beat < hat_length;
        noise.volume = if in_beat < hat_length { 10 } else { 0 };

        apu.observe_sample(&snapshot, &mut file)?;
    }

    apu.finish(&mut file)?;

    // Close every track for strict readers.
    let mut closed = Vec::new();
    for voice in [
        ApuVoice::Pulse(0),
        ApuVoice::Pulse(1),
        ApuVoice::Triangle,
        ApuVoice::Noise,
        ApuVoice::Dmc,
    ] {
        let track = apu.track_of(voice);
        if !closed.contains(&track) {
            file.meta(track, META_END_OF_TRACK, &[])?;
            closed.push(track);
        }
    }

    file.save()?;
    println!(
        "wrote {} ({:.1} s capture, format {})",
        output.display(),
        seconds,
        format.code()
    );
    Ok(())
}
