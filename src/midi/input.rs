//! MIDI input: a midir connection whose callback maps raw messages to
//! [`MidiEvent`]s and hands them to the workstation over a channel.

use std::io;
use std::sync::mpsc::Sender;

use midir::{MidiInput as MidirInput, MidiInputConnection, MidiInputPort};

use super::config::MidiConfig;
use super::mapping::{apply_midi_message, MidiEvent};

/// An open keyboard connection. Dropping it disconnects.
pub struct MidiInput {
    _connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidiInput {
    /// Connect to the configured device and forward its events to `events`.
    ///
    /// Mapping runs on midir's thread; only notes, mapped CCs and note-range
    /// instrument picks reach the channel. Once the receiver is gone events
    /// are dropped silently. The workstation drains them on its tick, so
    /// nothing here touches the audio engine.
    pub fn start(config: &MidiConfig, events: Sender<MidiEvent>) -> io::Result<Self> {
        let client = MidirInput::new("chordstep")
            .map_err(|e| io::Error::other(format!("MIDI init: {e}")))?;
        let (port, port_name) = select_port(&client, config.device_name.as_deref())?;

        let mappings = config.mappings.clone();
        let channel_filter = config.channel_filter;
        let connection = client
            .connect(
                &port,
                "chordstep-keys",
                move |_micros, message, _| {
                    if let Some(event) = apply_midi_message(message, &mappings, channel_filter) {
                        let _ = events.send(event);
                    }
                },
                (),
            )
            .map_err(|e| io::Error::other(format!("MIDI connect: {e}")))?;

        tracing::info!(port = %port_name, channel = ?channel_filter, "keyboard connected");
        Ok(Self {
            _connection: connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Names of every MIDI input port, for `--list-midi`.
    pub fn list_devices() -> Vec<String> {
        let Ok(client) = MidirInput::new("chordstep-list") else {
            return Vec::new();
        };
        client
            .ports()
            .iter()
            .filter_map(|p| client.port_name(p).ok())
            .collect()
    }
}

/// The first port whose name contains `wanted`, or the first port at all.
fn select_port(
    client: &MidirInput,
    wanted: Option<&str>,
) -> io::Result<(MidiInputPort, String)> {
    let ports = client.ports();
    let mut named = ports
        .iter()
        .map(|p| (p, client.port_name(p).unwrap_or_else(|_| "unknown".to_string())));
    let (port, name) = match wanted {
        Some(fragment) => named
            .find(|(_, name)| name.contains(fragment))
            .ok_or_else(|| io::Error::other(format!("no MIDI device matching '{fragment}'")))?,
        None => named
            .next()
            .ok_or_else(|| io::Error::other("no MIDI input ports available"))?,
    };
    Ok((port.clone(), name))
}
