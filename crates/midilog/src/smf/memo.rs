//! Per-channel cache of last-sent values.
//!
//! The memo suppresses redundant control-change, program-change and
//! pitch-bend events: a value is re-emitted only when it differs from the
//! last value actually written for that channel, and the memo is updated
//! immediately after emission, never speculatively. Note on/off and key
//! pressure are never deduplicated — every note event is always written.
//!
//! `Option<u8>` is used throughout so that "never sent" is an explicit
//! state distinct from "sent value zero".

use crate::smf::event::CHANNELS;

/// Last-sent values for a single MIDI channel.
#[derive(Debug, Clone)]
struct ChannelSlot {
    program: Option<u8>,
    pitch_bend: Option<u16>,
    control: [Option<u8>; 128],
}

impl ChannelSlot {
    fn new() -> Self {
        Self {
            program: None,
            pitch_bend: None,
            control: [None; 128],
        }
    }
}

/// Per-file memo of last-sent values for all 16 MIDI channels.
#[derive(Debug, Clone)]
pub struct ChannelMemo {
    channels: [ChannelSlot; CHANNELS as usize],
}

impl ChannelMemo {
    /// Create a memo with no values recorded.
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(|_| ChannelSlot::new()),
        }
    }

    /// Whether a control change for `(channel, control)` with `value` would
    /// change the last-sent state and therefore must be emitted.
    pub fn should_emit_control(&self, channel: u8, control: u8, value: u8) -> bool {
        self.channels[channel as usize].control[control as usize] != Some(value)
    }

    /// Record a control value as sent.
    pub fn record_control(&mut self, channel: u8, control: u8, value: u8) {
        self.channels[channel as usize].control[control as usize] = Some(value);
    }

    /// Last-sent control value for `(channel, control)`, if any.
    pub fn control(&self, channel: u8, control: u8) -> Option<u8> {
        self.channels[channel as usize].control[control as usize]
    }

    /// Whether a program change to `program` on `channel` must be emitted.
    pub fn should_emit_program(&self, channel: u8, program: u8) -> bool {
        self.channels[channel as usize].program != Some(program)
    }

    /// Record a program as sent.
    pub fn record_program(&mut self, channel: u8, program: u8) {
        self.channels[channel as usize].program = Some(program);
    }

    /// Last-sent program for `channel`, if any.
    pub fn program(&self, channel: u8) -> Option<u8> {
        self.channels[channel as usize].program
    }

    /// Whether a pitch-bend change to `value` on `channel` must be emitted.
    pub fn should_emit_pitch_bend(&self, channel: u8, value: u16) -> bool {
        self.channels[channel as usize].pitch_bend != Some(value)
    }

    /// Record a pitch-bend value as sent.
    pub fn record_pitch_bend(&mut self, channel: u8, value: u16) {
        self.channels[channel as usize].pitch_bend = Some(value);
    }

    /// Last-sent pitch-bend value for `channel`, if any.
    pub fn pitch_bend(&self, channel: u8) -> Option<u16> {
        self.channels[channel as usize].pitch_bend
    }

    /// Forget all recorded values.
    pub fn clear(&mut self) {
        for slot in &mut self.channels {
            *slot = ChannelSlot::new();
        }
    }
}

impl Default for ChannelMemo {
    fn default() -> Self {
        Self::new()
    }
}
