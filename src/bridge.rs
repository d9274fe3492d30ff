//! midir connections feeding and draining the pipeline

use anyhow::{anyhow, Context, Result};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::midi::format_hex;
use crate::pipeline::{InboundMessage, OutputSink};
use crate::ports::find_port;

const CLIENT_NAME: &str = "CC-Latch";

/// Open input port pushing every message into a channel
pub struct LatchInput {
    port_name: String,
    connection: MidiInputConnection<()>,
}

impl LatchInput {
    /// Connect to the first input port matching `pattern`
    ///
    /// Messages are timestamped on arrival relative to the moment the port
    /// was opened. When the channel is full the message is dropped.
    pub fn connect(pattern: &str, tx: mpsc::Sender<InboundMessage>) -> Result<Self> {
        let mut midi_in =
            MidiInput::new(&format!("{}-Input", CLIENT_NAME)).context("Failed to create MIDI input")?;
        midi_in.ignore(midir::Ignore::None);

        let ports = midi_in.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|port| midi_in.port_name(port).unwrap_or_default())
            .collect();

        let index = find_port(&names, pattern)
            .ok_or_else(|| anyhow!("Input port '{}' not found", pattern))?;
        let port_name = names[index].clone();

        info!("Connecting to input port: {}", port_name);

        let start = Instant::now();
        let connection = midi_in
            .connect(
                &ports[index],
                CLIENT_NAME,
                move |_stamp, data, _| {
                    let inbound = InboundMessage {
                        timestamp: start.elapsed().as_secs_f64(),
                        data: data.to_vec(),
                    };
                    if let Err(e) = tx.try_send(inbound) {
                        warn!("Dropping inbound MIDI {}: {}", format_hex(data), e);
                    }
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect to input port '{}': {}", port_name, e))?;

        Ok(Self {
            port_name,
            connection,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Close the underlying connection
    pub fn close(self) {
        let _ = self.connection.close();
        info!("Closed input port: {}", self.port_name);
    }
}

/// Open output port used as the pipeline's sink
pub struct LatchOutput {
    port_name: String,
    connection: Mutex<MidiOutputConnection>,
}

impl LatchOutput {
    /// Connect to the first output port matching `pattern`
    pub fn connect(pattern: &str) -> Result<Self> {
        let midi_out = MidiOutput::new(&format!("{}-Output", CLIENT_NAME))
            .context("Failed to create MIDI output")?;

        let ports = midi_out.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|port| midi_out.port_name(port).unwrap_or_default())
            .collect();

        let index = find_port(&names, pattern)
            .ok_or_else(|| anyhow!("Output port '{}' not found", pattern))?;
        let port_name = names[index].clone();

        info!("Connecting to output port: {}", port_name);

        let connection = midi_out
            .connect(&ports[index], CLIENT_NAME)
            .map_err(|e| anyhow!("Failed to connect to output port '{}': {}", port_name, e))?;

        Ok(Self {
            port_name,
            connection: Mutex::new(connection),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Close the underlying connection
    pub fn close(self) {
        let _ = self.connection.into_inner().close();
        info!("Closed output port: {}", self.port_name);
    }
}

impl OutputSink for LatchOutput {
    fn send(&self, data: &[u8]) -> Result<()> {
        self.connection
            .lock()
            .send(data)
            .map_err(|e| anyhow!("MIDI send to '{}' failed: {}", self.port_name, e))
    }
}
