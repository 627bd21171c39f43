//! Per-sample hardware state snapshots.
//!
//! The emulation core owns the actual channel hardware; once per audio
//! sample it hands the transcriber a read-only [`ApuSnapshot`] of the five
//! voices. Snapshots are plain values — there is no global hardware state on
//! this side of the boundary — and every field is the *current* decoded
//! register state, not a raw register byte.
//!
//! The trigger flags are momentary: they report "this happened since the
//! previous sample" and the transcriber latches them internally until a
//! note decision consumes them.

/// One pulse voice.
///
/// Field sources on the real chip:
/// - duty, volume: `$4000`/`$4004` plus the envelope unit's current output
/// - period: the 11-bit timer from `$4002/$4003` (`$4006/$4007`)
/// - `period_valid`: the sweep unit's overflow check; a failing check mutes
///   the voice regardless of volume
/// - `write_trigger`: the length-reload register (`$4003`/`$4007`) was just
///   written
/// - `envelope_trigger`: the envelope unit just reloaded its decay counter
#[derive(Debug, Clone, Copy, Default)]
pub struct PulseSnapshot {
    /// 2-bit duty selector (12.5%, 25%, 50%, negated 25%).
    pub duty: u8,
    /// 11-bit timer period.
    pub period: u16,
    /// 4-bit envelope output (0 = silent).
    pub volume: u8,
    /// Length counter has not expired.
    pub length_active: bool,
    /// Sweep unit considers the current period producible.
    pub period_valid: bool,
    /// Length-reload register was just written.
    pub write_trigger: bool,
    /// Envelope decay was just reloaded.
    pub envelope_trigger: bool,
}

/// The triangle voice. It has no envelope; it either runs at full
/// amplitude or is halted by one of its two counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriangleSnapshot {
    /// 11-bit timer period.
    pub period: u16,
    /// Length counter has not expired.
    pub length_active: bool,
    /// Linear counter has not expired.
    pub linear_active: bool,
    /// Length-reload register (`$400B`) was just written.
    pub write_trigger: bool,
}

/// The noise voice.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoiseSnapshot {
    /// 4-bit index into the hardware period table.
    pub period: u8,
    /// Short (93-step) LFSR mode.
    pub short_mode: bool,
    /// 4-bit envelope output (0 = silent).
    pub volume: u8,
    /// Length counter has not expired.
    pub length_active: bool,
}

/// The DMC sample voice.
#[derive(Debug, Clone, Copy, Default)]
pub struct DmcSnapshot {
    /// 4-bit index into the hardware rate table.
    pub period: u8,
    /// Sample address latch (`$4012`), used to identify the sample.
    pub sample_address: u8,
    /// Sample playback is in progress.
    pub active: bool,
    /// Playback was just (re)started.
    pub start_trigger: bool,
}

/// The full chip view handed to the transcriber once per audio sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApuSnapshot {
    /// The two pulse voices.
    pub pulse: [PulseSnapshot; 2],
    /// The triangle voice.
    pub triangle: TriangleSnapshot,
    /// The noise voice.
    pub noise: NoiseSnapshot,
    /// The DMC sample voice.
    pub dmc: DmcSnapshot,
}
