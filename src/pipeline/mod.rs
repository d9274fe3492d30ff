//! Message pipeline: raw MIDI in, latched MIDI out
//!
//! Owns the latch engine and the output sink. Inbound bytes are parsed,
//! validated at this boundary, run through the engine and written out.
//! Everything runs on the task that drains the inbound channel.

use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::latch::{ControlChangeEvent, EngineAction, EventError, GestureKey, LatchEngine};
use crate::midi::{format_hex, MidiMessage};

/// Raw message as delivered by the input port
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Seconds since the input was opened
    pub timestamp: f64,
    pub data: Vec<u8>,
}

/// Destination for outgoing MIDI bytes
pub trait OutputSink {
    fn send(&self, data: &[u8]) -> Result<()>;
}

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Bytes written to the sink
    Sent(Vec<u8>),
    /// Engine swallowed a release on a latched key
    Suppressed,
    /// Non-CC message dropped because pass-through is off
    Skipped,
    /// Message failed boundary validation
    Rejected(EventError),
}

/// Rejects events whose timestamp runs backwards for their key
#[derive(Debug, Default)]
pub struct TimestampGuard {
    last_seen: HashMap<GestureKey, f64>,
}

impl TimestampGuard {
    pub fn check(&mut self, event: &ControlChangeEvent) -> Result<(), EventError> {
        let key = GestureKey::from(event);
        if let Some(&previous) = self.last_seen.get(&key) {
            if event.timestamp < previous {
                return Err(EventError::NonMonotonic {
                    channel: event.channel,
                    controller: event.controller,
                    previous,
                    current: event.timestamp,
                });
            }
        }
        self.last_seen.insert(key, event.timestamp);
        Ok(())
    }
}

/// Counters reported on shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: u64,
    pub sent: u64,
    pub modified: u64,
    pub suppressed: u64,
    pub rejected: u64,
}

pub struct Pipeline<S: OutputSink> {
    engine: LatchEngine,
    sink: S,
    guard: TimestampGuard,
    forward_other_messages: bool,
    stats: PipelineStats,
}

impl<S: OutputSink> Pipeline<S> {
    pub fn new(engine: LatchEngine, sink: S, forward_other_messages: bool) -> Self {
        Self {
            engine,
            sink,
            guard: TimestampGuard::default(),
            forward_other_messages,
            stats: PipelineStats::default(),
        }
    }

    pub fn engine(&self) -> &LatchEngine {
        &self.engine
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Give back the sink so the caller can close it
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Process one inbound message
    ///
    /// Errors only come from the sink; validation failures are reported as
    /// [`Dispatch::Rejected`].
    pub fn handle(&mut self, inbound: &InboundMessage) -> Result<Dispatch> {
        self.stats.received += 1;
        debug!("[In ] @{:0.6} {}", inbound.timestamp, format_hex(&inbound.data));

        let message = match MidiMessage::parse(&inbound.data) {
            Some(message) => message,
            None => {
                return Ok(self.reject(EventError::NotControlChange(format_hex(&inbound.data))));
            }
        };

        if !message.is_control_change() {
            if !self.forward_other_messages {
                debug!("Skipping non-CC message: {}", message);
                return Ok(Dispatch::Skipped);
            }
            return self.emit(&inbound.data, inbound.timestamp);
        }

        let event = match ControlChangeEvent::from_bytes(&inbound.data, inbound.timestamp) {
            Ok(event) => event,
            Err(e) => return Ok(self.reject(e)),
        };
        if let Err(e) = self.guard.check(&event) {
            return Ok(self.reject(e));
        }

        let action = self.engine.process(event);
        let Some(&out) = action.event() else {
            self.stats.suppressed += 1;
            debug!("Suppressed {} (latched)", event);
            return Ok(Dispatch::Suppressed);
        };
        if matches!(action, EngineAction::ForwardModified(_)) {
            self.stats.modified += 1;
        }
        self.emit(&MidiMessage::from(out).encode(), out.timestamp)
    }

    fn emit(&mut self, data: &[u8], timestamp: f64) -> Result<Dispatch> {
        self.sink
            .send(data)
            .with_context(|| format!("Failed to send {}", format_hex(data)))?;
        self.stats.sent += 1;
        debug!("[Out] @{:0.6} {}", timestamp, format_hex(data));
        Ok(Dispatch::Sent(data.to_vec()))
    }

    fn reject(&mut self, error: EventError) -> Dispatch {
        self.stats.rejected += 1;
        warn!("Dropping inbound message: {}", error);
        Dispatch::Rejected(error)
    }
}

#[cfg(test)]
mod tests;
