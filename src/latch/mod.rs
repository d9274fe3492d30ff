//! Latch engine
//!
//! Turns momentary Control-Change buttons into toggles. Each
//! (channel, controller) pair runs its own gesture detector: a burst of
//! full-value presses inside the gesture window flips the key into (or out
//! of) latched mode. While latched, every full-value press alternates the
//! output between 0 and 127 and release values are swallowed.

pub mod event;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

pub use event::{invert, ControlChangeEvent, EventError, FULL_VALUE, REST_VALUE};

/// Default interval within which consecutive presses count toward a toggle
pub const DEFAULT_GESTURE_WINDOW: Duration = Duration::from_millis(250);

/// Default number of presses that toggles the latch
pub const DEFAULT_TOGGLE_PRESSES: u32 = 3;

/// Smallest usable threshold; the first press of a burst already counts as 1
pub const MIN_TOGGLE_PRESSES: u32 = 2;

/// Identity of a physical control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GestureKey {
    pub channel: u8,
    pub controller: u8,
}

impl GestureKey {
    pub fn new(channel: u8, controller: u8) -> Self {
        Self {
            channel,
            controller,
        }
    }
}

impl From<&ControlChangeEvent> for GestureKey {
    fn from(event: &ControlChangeEvent) -> Self {
        Self::new(event.channel, event.controller)
    }
}

/// Gesture tracking for one key
#[derive(Debug, Clone, PartialEq)]
pub struct GestureState {
    /// Timestamp of the most recent full-value press
    pub last_full_press_time: Option<f64>,
    /// Consecutive full-value presses inside the window (>= 1)
    pub repeat_count: u32,
    /// Whether this key is currently in latched mode
    pub latched: bool,
    /// Value substituted for the next full-value press while latched (0 or 127)
    pub output_value: u8,
}

impl GestureState {
    fn first_press(timestamp: f64) -> Self {
        Self {
            last_full_press_time: Some(timestamp),
            repeat_count: 1,
            latched: false,
            output_value: REST_VALUE,
        }
    }
}

/// Outcome of feeding one event through the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineAction {
    /// Emit the event unmodified
    Forward(ControlChangeEvent),
    /// Emit the event with its value replaced by the latched output value
    ForwardModified(ControlChangeEvent),
    /// Emit nothing (release value on a latched key)
    Suppress,
}

impl EngineAction {
    /// Event to transmit, if any
    pub fn event(&self) -> Option<&ControlChangeEvent> {
        match self {
            EngineAction::Forward(event) | EngineAction::ForwardModified(event) => Some(event),
            EngineAction::Suppress => None,
        }
    }
}

/// Tunables for gesture detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatchOptions {
    /// Presses closer together than this count toward a toggle
    pub gesture_window: Duration,
    /// Press count that flips the latch, at least [`MIN_TOGGLE_PRESSES`]
    pub toggle_presses: u32,
}

impl Default for LatchOptions {
    fn default() -> Self {
        Self {
            gesture_window: DEFAULT_GESTURE_WINDOW,
            toggle_presses: DEFAULT_TOGGLE_PRESSES,
        }
    }
}

/// Per-key gesture detector and output transformer
///
/// Events for a key must arrive in non-decreasing timestamp order; the
/// pipeline enforces this before calling [`LatchEngine::process`].
#[derive(Debug, Default)]
pub struct LatchEngine {
    options: LatchOptions,
    states: HashMap<GestureKey, GestureState>,
}

impl LatchEngine {
    /// Engine with the default 250ms window and triple-tap toggle
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with custom options
    ///
    /// A `toggle_presses` below [`MIN_TOGGLE_PRESSES`] is raised to it.
    pub fn with_options(options: LatchOptions) -> Self {
        Self {
            options: LatchOptions {
                toggle_presses: options.toggle_presses.max(MIN_TOGGLE_PRESSES),
                ..options
            },
            states: HashMap::new(),
        }
    }

    pub fn options(&self) -> &LatchOptions {
        &self.options
    }

    /// Feed one event and decide what to emit
    pub fn process(&mut self, event: ControlChangeEvent) -> EngineAction {
        let key = GestureKey::from(&event);

        if event.is_full_press() {
            self.register_press(key, event.timestamp);
        }

        let Some(state) = self.states.get_mut(&key) else {
            return EngineAction::Forward(event);
        };

        if !state.latched {
            return EngineAction::Forward(event);
        }

        if event.is_full_press() {
            // Also runs on the press that just latched, undoing its inversion
            state.output_value = invert(state.output_value);
            EngineAction::ForwardModified(event.with_value(state.output_value))
        } else {
            EngineAction::Suppress
        }
    }

    fn register_press(&mut self, key: GestureKey, timestamp: f64) {
        let window = self.options.gesture_window.as_secs_f64();
        let toggle_presses = self.options.toggle_presses;

        let state = match self.states.entry(key) {
            Entry::Vacant(slot) => {
                debug!(
                    "New gesture state for ch:{} cc:{}",
                    key.channel + 1,
                    key.controller
                );
                slot.insert(GestureState::first_press(timestamp));
                return;
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        let within_window = state
            .last_full_press_time
            .is_some_and(|last| timestamp - last < window);

        if within_window {
            state.repeat_count += 1;
            if state.repeat_count == toggle_presses {
                state.latched = !state.latched;
                state.output_value = invert(state.output_value);
                info!(
                    "🔒 ch:{} cc:{} latch {}",
                    key.channel + 1,
                    key.controller,
                    if state.latched { "ON" } else { "OFF" }
                );
            }
        } else {
            state.repeat_count = 1;
        }

        state.last_full_press_time = Some(timestamp);
    }

    /// Gesture state for a key, if it has ever been pressed
    pub fn state(&self, channel: u8, controller: u8) -> Option<&GestureState> {
        self.states.get(&GestureKey::new(channel, controller))
    }

    pub fn is_latched(&self, channel: u8, controller: u8) -> bool {
        self.state(channel, controller)
            .map(|s| s.latched)
            .unwrap_or(false)
    }

    /// Number of keys with gesture state
    pub fn tracked_keys(&self) -> usize {
        self.states.len()
    }

    /// Keys currently latched, in no particular order
    pub fn latched_keys(&self) -> impl Iterator<Item = GestureKey> + '_ {
        self.states
            .iter()
            .filter(|(_, state)| state.latched)
            .map(|(key, _)| *key)
    }
}
