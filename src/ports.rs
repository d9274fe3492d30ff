//! MIDI port discovery and selection

use anyhow::{bail, Context, Result};
use colored::*;
use midir::{MidiInput, MidiOutput};
use std::fmt;
use std::io::{BufRead, Write};
use tracing::debug;

const DISCOVERY_CLIENT: &str = "CC-Latch-Discovery";

/// Which side of the bridge a port feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Information about a MIDI port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub index: usize,
    pub name: String,
    pub is_virtual: bool,
}

impl PortInfo {
    fn new(index: usize, name: String) -> Self {
        let is_virtual =
            name.contains("Virtual") || name.contains("loopMIDI") || name.contains("IAC");
        Self {
            index,
            name,
            is_virtual,
        }
    }
}

/// Enumerate the ports available in one direction
pub fn discover(direction: PortDirection) -> Result<Vec<PortInfo>> {
    let names: Vec<String> = match direction {
        PortDirection::Input => {
            let midi_in = MidiInput::new(DISCOVERY_CLIENT).context("Failed to create MIDI input")?;
            midi_in
                .ports()
                .iter()
                .filter_map(|port| midi_in.port_name(port).ok())
                .collect()
        }
        PortDirection::Output => {
            let midi_out =
                MidiOutput::new(DISCOVERY_CLIENT).context("Failed to create MIDI output")?;
            midi_out
                .ports()
                .iter()
                .filter_map(|port| midi_out.port_name(port).ok())
                .collect()
        }
    };

    Ok(names
        .into_iter()
        .enumerate()
        .map(|(index, name)| PortInfo::new(index, name))
        .collect())
}

/// Resolve a port pattern against a list of port names
///
/// A pattern that parses as a number is an index; anything else is a
/// case-insensitive substring and the first match wins.
pub fn find_port(names: &[String], pattern: &str) -> Option<usize> {
    let pattern = pattern.trim();
    if let Ok(index) = pattern.parse::<usize>() {
        return (index < names.len()).then_some(index);
    }

    let needle = pattern.to_lowercase();
    let found = names
        .iter()
        .position(|name| name.to_lowercase().contains(&needle));
    if let Some(index) = found {
        debug!("Found port '{}' matching pattern '{}'", names[index], pattern);
    }
    found
}

/// Print both port lists in a formatted way
pub fn list_ports_formatted() {
    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    for direction in [PortDirection::Input, PortDirection::Output] {
        let title = match direction {
            PortDirection::Input => "Input Ports:",
            PortDirection::Output => "Output Ports:",
        };
        println!("\n{}", title.bold());

        match discover(direction) {
            Ok(ports) if ports.is_empty() => {
                println!("  {}", format!("No {} ports found", direction).dimmed());
            }
            Ok(ports) => print_port_list(&ports),
            Err(e) => println!("  {}", format!("Failed to list ports: {}", e).red()),
        }
    }

    println!();
}

fn print_port_list(ports: &[PortInfo]) {
    for port in ports {
        let marker = if port.is_virtual {
            "[VIRTUAL]".yellow()
        } else {
            "[PHYSICAL]".green()
        };
        println!("  {:>2}: {} {}", port.index, marker, port.name);
    }
}

/// Ask the user to pick a port on the terminal
///
/// Returns the chosen pattern, or `None` on EOF or an empty answer.
pub fn prompt_for_port(direction: PortDirection) -> Result<Option<String>> {
    let ports = discover(direction)?;
    if ports.is_empty() {
        bail!("No MIDI {} ports available", direction);
    }

    println!("\n{}", format!("Available MIDI {} ports:", direction).bold());
    print_port_list(&ports);

    print!("Select MIDI {} port (number or name): ", direction);
    std::io::stdout().flush()?;

    let stdin = std::io::stdin();
    read_choice(stdin.lock())
}

fn read_choice(mut reader: impl BufRead) -> Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }

    let choice = line.trim();
    Ok((!choice.is_empty()).then(|| choice.to_string()))
}
