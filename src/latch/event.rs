//! Control-Change event type and boundary validation

use std::fmt;
use thiserror::Error;

/// Value a momentary controller reports while held
pub const FULL_VALUE: u8 = 127;

/// Rest value a momentary controller reports when released
pub const REST_VALUE: u8 = 0;

/// Reasons an inbound message is rejected before it reaches the engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    #[error("channel {0} out of range (0-15)")]
    ChannelOutOfRange(u8),

    #[error("controller {0} out of range (0-127)")]
    ControllerOutOfRange(u8),

    #[error("value {0} out of range (0-127)")]
    ValueOutOfRange(u8),

    #[error("timestamp {0} is not a finite, non-negative number of seconds")]
    InvalidTimestamp(f64),

    #[error("timestamp {current:.6}s precedes previous {previous:.6}s for ch:{channel} cc:{controller}")]
    NonMonotonic {
        channel: u8,
        controller: u8,
        previous: f64,
        current: f64,
    },

    #[error("not a Control-Change message: {0}")]
    NotControlChange(String),

    #[error("Control-Change must be 3 bytes, got {0}")]
    WrongLength(usize),
}

/// A single Control-Change message with its arrival time
///
/// Channel is 0-based (0-15). Timestamp is monotonic seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlChangeEvent {
    pub channel: u8,
    pub controller: u8,
    pub value: u8,
    pub timestamp: f64,
}

impl ControlChangeEvent {
    /// Build a validated event
    pub fn new(channel: u8, controller: u8, value: u8, timestamp: f64) -> Result<Self, EventError> {
        if channel > 0x0F {
            return Err(EventError::ChannelOutOfRange(channel));
        }
        if controller > 0x7F {
            return Err(EventError::ControllerOutOfRange(controller));
        }
        if value > 0x7F {
            return Err(EventError::ValueOutOfRange(value));
        }
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(EventError::InvalidTimestamp(timestamp));
        }

        Ok(Self {
            channel,
            controller,
            value,
            timestamp,
        })
    }

    /// True when the controller reports its full (pressed) value
    pub fn is_full_press(&self) -> bool {
        self.value == FULL_VALUE
    }

    /// Same event with a different value
    pub fn with_value(self, value: u8) -> Self {
        Self { value, ..self }
    }

    /// Decode a raw 3-byte Control-Change message
    ///
    /// Data bytes are checked as received; a byte with the high bit set is
    /// rejected rather than masked.
    pub fn from_bytes(data: &[u8], timestamp: f64) -> Result<Self, EventError> {
        let &[status, controller, value] = data else {
            return Err(EventError::WrongLength(data.len()));
        };
        if status & 0xF0 != 0xB0 {
            return Err(EventError::NotControlChange(format!("{:02X?}", data)));
        }
        Self::new(status & 0x0F, controller, value, timestamp)
    }
}

impl fmt::Display for ControlChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CC ch:{} cc:{} v:{}",
            self.channel + 1,
            self.controller,
            self.value
        )
    }
}

/// Invert a binary controller value (0 <-> 127)
pub fn invert(value: u8) -> u8 {
    if value == FULL_VALUE {
        REST_VALUE
    } else {
        FULL_VALUE
    }
}
