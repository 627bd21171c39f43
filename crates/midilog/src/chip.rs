//! Sound-chip observation and note transcription.
//!
//! This module holds the chip-facing half of the crate:
//!
//! - `snapshot` — the read-only per-sample register view supplied by an
//!   external emulation core.
//! - `pitch` — precomputed period-to-pitch conversion for the chip's 11-bit
//!   timers.
//! - `dac` — the chip's DAC non-linearity folded into MIDI volume and
//!   velocity values.
//! - `transcribe` — the chip-agnostic note transcription state machines
//!   (melodic and rhythmic instruments).
//! - `nes_apu` — the NES/Famicom APU wiring: voice/channel assignment,
//!   percussion maps, annotations and the per-sample drive loop.
pub mod dac;
pub mod nes_apu;
pub mod pitch;
pub mod snapshot;
pub mod transcribe;
