//! The tick clock bridging hardware audio cycles to MIDI ticks.
//!
//! A capture runs at a fixed tempo and division, so a MIDI tick corresponds
//! to a fixed number of audio cycles:
//!
//! ```text
//! cycles |  60 seconds |   1 minute  |   1 beat
//! -------+-------------+-------------+----------
//! second |   1 minute  | tempo beats | division ticks
//! ```
//!
//! i.e. `cycles_per_tick = sample_rate * 60 / (tempo * division)`, rounded
//! to an integer cycle count. The clock is the single authoritative source
//! of "now": the capture loop calls [`TickClock::advance_sample`] once per
//! audio sample and forwards elapsed ticks to the file container. No
//! component reads wall-clock time.
//!
//! Rounding leaves a residual drift of well under one tick per minute at
//! NTSC rates, which is acceptable for archival reproduction.

/// Default capture tempo in beats per minute.
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

/// Default MIDI division in ticks per quarter note.
pub const DEFAULT_TICKS_PER_BEAT: u16 = 480;

/// Converts elapsed audio cycles into elapsed MIDI ticks.
#[derive(Debug, Clone)]
pub struct TickClock {
    cycles_per_tick: u32,
    cycle: u32,
}

impl TickClock {
    /// Create a clock for `sample_rate` Hz at the default tempo and
    /// division (120 BPM, 480 ticks per beat).
    pub fn new(sample_rate: f64) -> Self {
        Self::with_tempo(sample_rate, DEFAULT_TEMPO_BPM, DEFAULT_TICKS_PER_BEAT)
    }

    /// Create a clock for `sample_rate` Hz at an explicit tempo and
    /// division.
    ///
    /// The cycle count per tick is rounded to an integer and floored at 1 so
    /// degenerate inputs cannot stall the clock.
    pub fn with_tempo(sample_rate: f64, tempo_bpm: f64, ticks_per_beat: u16) -> Self {
        let exact = sample_rate * 60.0 / (tempo_bpm * f64::from(ticks_per_beat));
        let cycles_per_tick = if exact.is_finite() && exact >= 1.0 {
            exact.round() as u32
        } else {
            1
        };
        Self {
            cycles_per_tick,
            cycle: 0,
        }
    }

    /// Account for one elapsed audio sample.
    ///
    /// Returns `true` when a MIDI tick boundary was crossed; the caller
    /// then advances the file's tick counter by one.
    pub fn advance_sample(&mut self) -> bool {
        self.cycle += 1;
        if self.cycle >= self.cycles_per_tick {
            self.cycle = 0;
            true
        } else {
            false
        }
    }

    /// The integer number of audio cycles per MIDI tick.
    pub fn cycles_per_tick(&self) -> u32 {
        self.cycles_per_tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ntsc_cycles_per_tick() {
        // 1.789 MHz NTSC APU rate at 120 BPM / 480 ticks per beat.
        let clock = TickClock::new(1_789_772.5);
        assert_eq!(clock.cycles_per_tick(), 1864);
    }

    #[test]
    fn test_tick_boundary() {
        let mut clock = TickClock::with_tempo(4.0, 60.0, 60);
        // 4 cycles per tick.
        assert_eq!(clock.cycles_per_tick(), 4);
        let ticks: u32 = (0..12).filter(|_| clock.advance_sample()).count() as u32;
        assert_eq!(ticks, 3);
    }

    #[test]
    fn test_degenerate_rates_floor_at_one() {
        let clock = TickClock::with_tempo(0.0, 120.0, 480);
        assert_eq!(clock.cycles_per_tick(), 1);
    }
}
