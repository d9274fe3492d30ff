//! CC Latch
//!
//! Converts momentary MIDI Control-Change buttons into latching toggles.
//! Triple-tapping a button inside the gesture window switches it into
//! latched mode; from then on each press alternates between 0 and 127.

pub mod bridge;
pub mod config;
pub mod latch;
pub mod midi;
pub mod pipeline;
pub mod ports;

pub use latch::{ControlChangeEvent, EngineAction, GestureState, LatchEngine, LatchOptions};
pub use pipeline::{Dispatch, InboundMessage, OutputSink, Pipeline};
