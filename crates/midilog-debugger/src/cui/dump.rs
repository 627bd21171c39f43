//! `dump`: parse a MIDI file and display its header and events.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, ContentArrangement, Table, presets::NOTHING};

use midilog::smf::{MidiDocument, MidiEvent, TrackEvent};

/// Produce a stable set of key/value summary fields for a `MidiDocument`.
fn summarize_doc(doc: &MidiDocument) -> Vec<(String, String)> {
    let total_ticks = (0..doc.tracks.len())
        .map(|t| doc.track_end_tick(t))
        .max()
        .unwrap_or(0);
    // division ticks per beat at the fixed 120 BPM capture tempo.
    let seconds = total_ticks as f64 / (f64::from(doc.division.max(1)) * 2.0);

    let mut fields = vec![
        ("format".to_string(), format!("{}", doc.format)),
        ("division".to_string(), format!("{} ticks/beat", doc.division)),
        ("tracks".to_string(), format!("{}", doc.tracks.len())),
        (
            "length".to_string(),
            format!("{} ticks ({:.3} s @ 120 BPM)", total_ticks, seconds),
        ),
    ];
    for (index, events) in doc.tracks.iter().enumerate() {
        fields.push((
            format!("track {}", index),
            format!(
                "{} events, ends at tick {}",
                events.len(),
                doc.track_end_tick(index)
            ),
        ));
    }
    fields
}

/// Render one event as a short description for the event table.
fn describe_event(event: &MidiEvent) -> String {
    match event {
        MidiEvent::NoteOff {
            channel,
            note,
            velocity,
        } => format!("note off        ch={:<2} note={:<3} vel={}", channel, note, velocity),
        MidiEvent::NoteOn {
            channel,
            note,
            velocity,
        } => format!("note on         ch={:<2} note={:<3} vel={}", channel, note, velocity),
        MidiEvent::KeyPressure {
            channel,
            note,
            velocity,
        } => format!("key pressure    ch={:<2} note={:<3} vel={}", channel, note, velocity),
        MidiEvent::ControlChange {
            channel,
            control,
            value,
        } => format!("control change  ch={:<2} cc={:<3}   val={}", channel, control, value),
        MidiEvent::ProgramChange { channel, program } => {
            format!("program change  ch={:<2} prog={}", channel, program)
        }
        MidiEvent::ChannelPressure { channel, velocity } => {
            format!("chan pressure   ch={:<2} vel={}", channel, velocity)
        }
        MidiEvent::PitchBend { channel, value } => {
            let offset = i32::from(*value) - 0x2000;
            format!("pitch bend      ch={:<2} value=0x{:04X} ({:+})", channel, value, offset)
        }
        MidiEvent::Meta { kind, data } => {
            if *kind == 0x01 || *kind == 0x04 {
                format!("meta 0x{:02X}       \"{}\"", kind, String::from_utf8_lossy(data))
            } else {
                format!("meta 0x{:02X}       {} bytes", kind, data.len())
            }
        }
        MidiEvent::SysEx { data } => format!("sysex           {} bytes", data.len()),
    }
}

fn print_track(index: usize, events: &[TrackEvent], limit: usize) {
    println!();
    println!("== track {} ({} events)", index, events.len());

    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["tick", "delta", "event"]);

    let shown = if limit == 0 { events.len() } else { limit };
    for event in events.iter().take(shown) {
        table.add_row(vec![
            Cell::new(event.tick),
            Cell::new(event.delta),
            Cell::new(describe_event(&event.event)),
        ]);
    }
    println!("{table}");

    if events.len() > shown {
        println!("   ... {} more events (raise --limit to see them)", events.len() - shown);
    }
}

/// Entry point for the `dump` subcommand.
pub fn run(path: &Path, track: Option<usize>, limit: usize) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let doc = MidiDocument::try_from(bytes.as_slice())
        .with_context(|| format!("parsing {}", path.display()))?;

    println!("{}", path.display());
    for (key, value) in summarize_doc(&doc) {
        println!("  {:<10} {}", key, value);
    }

    match track {
        Some(index) => {
            let Some(events) = doc.tracks.get(index) else {
                bail!("track {} out of range (file has {})", index, doc.tracks.len());
            };
            print_track(index, events, limit);
        }
        None => {
            for (index, events) in doc.tracks.iter().enumerate() {
                print_track(index, events, limit);
            }
        }
    }

    Ok(())
}
