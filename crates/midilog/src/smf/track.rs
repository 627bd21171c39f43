//! A single `MTrk` body under construction.
//!
//! A track is an ordered sequence of (delta-time varint, event bytes)
//! pairs. Format 1 tracks buffer their bytes in memory until the file is
//! saved; the format 0 track streams its bytes straight to the output
//! writer and only keeps counters here, so arbitrarily long captures never
//! accumulate in memory.
//!
//! Delta times are computed against the file's monotonic tick counter: each
//! track records the absolute tick of its last emitted event, and a delta
//! that would come out negative is a logic error surfaced as
//! [`EncodeError::TickReversal`], never a wrap.

use crate::binutil::{EncodeError, VARINT_MAX};

/// One MIDI track: either an in-memory byte buffer (format 1) or the byte
/// accounting for a directly streamed track (format 0).
#[derive(Debug)]
pub struct Track {
    bytes: Vec<u8>,
    streamed: bool,
    streamed_len: u32,
    events_since_patch: u32,
    last_event_tick: u64,
}

impl Track {
    /// Create a buffered track (format 1).
    pub(crate) fn buffered() -> Self {
        Self {
            bytes: Vec::new(),
            streamed: false,
            streamed_len: 0,
            events_since_patch: 0,
            last_event_tick: 0,
        }
    }

    /// Create a streamed track (format 0); its bytes are written by the
    /// file container, this side only keeps the length accounting.
    pub(crate) fn streamed() -> Self {
        Self {
            bytes: Vec::new(),
            streamed: true,
            streamed_len: 0,
            events_since_patch: 0,
            last_event_tick: 0,
        }
    }

    /// Whether this track streams to the output writer.
    pub(crate) fn is_streamed(&self) -> bool {
        self.streamed
    }

    /// The buffered track bytes. Empty for a streamed track.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The number of bytes this track's `MTrk` length field must declare.
    pub fn byte_len(&self) -> u32 {
        if self.streamed {
            self.streamed_len
        } else {
            self.bytes.len() as u32
        }
    }

    /// Absolute tick of the last emitted event (0 before the first event).
    pub fn last_event_tick(&self) -> u64 {
        self.last_event_tick
    }

    /// Compute the delta-time for an event emitted at `tick`.
    ///
    /// Fails loudly when the tick counter appears to have gone backward
    /// relative to this track, or when the elapsed delta does not fit a
    /// variable-length quantity.
    pub(crate) fn delta_to(&self, tick: u64) -> Result<u32, EncodeError> {
        let delta = tick
            .checked_sub(self.last_event_tick)
            .ok_or(EncodeError::TickReversal {
                now: tick,
                last: self.last_event_tick,
            })?;
        if delta > u64::from(VARINT_MAX) {
            return Err(EncodeError::VarintOverflow(delta));
        }
        Ok(delta as u32)
    }

    /// Append already-encoded delta + event bytes to a buffered track.
    pub(crate) fn append(&mut self, tick: u64, encoded: &[u8]) {
        debug_assert!(!self.streamed);
        self.bytes.extend_from_slice(encoded);
        self.last_event_tick = tick;
    }

    /// Account for delta + event bytes that were streamed to the writer.
    ///
    /// Returns `true` when the periodic length patch is due.
    pub(crate) fn account_streamed(&mut self, tick: u64, len: u32, patch_interval: u32) -> bool {
        debug_assert!(self.streamed);
        self.streamed_len += len;
        self.last_event_tick = tick;
        self.events_since_patch += 1;
        self.events_since_patch >= patch_interval
    }

    /// Reset the patch counter after the length field has been rewritten.
    pub(crate) fn reset_patch_counter(&mut self) {
        self.events_since_patch = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_is_relative_to_last_event() {
        let mut track = Track::buffered();
        assert_eq!(track.delta_to(0).unwrap(), 0);
        assert_eq!(track.delta_to(480).unwrap(), 480);
        track.append(480, &[0x00, 0x90, 0x45, 0x48]);
        assert_eq!(track.delta_to(480).unwrap(), 0);
        assert_eq!(track.delta_to(500).unwrap(), 20);
    }

    #[test]
    fn test_tick_reversal_fails_loudly() {
        let mut track = Track::buffered();
        track.append(100, &[0x00, 0x90, 0x45, 0x48]);
        assert!(matches!(
            track.delta_to(99),
            Err(EncodeError::TickReversal { now: 99, last: 100 })
        ));
    }

    #[test]
    fn test_oversized_delta_rejected() {
        let track = Track::buffered();
        assert!(matches!(
            track.delta_to(u64::from(VARINT_MAX) + 1),
            Err(EncodeError::VarintOverflow(_))
        ));
    }

    #[test]
    fn test_streamed_accounting() {
        let mut track = Track::streamed();
        assert!(!track.account_streamed(0, 4, 3));
        assert!(!track.account_streamed(1, 4, 3));
        assert!(track.account_streamed(2, 4, 3));
        assert_eq!(track.byte_len(), 12);
        track.reset_patch_counter();
        assert!(!track.account_streamed(3, 4, 3));
    }
}
