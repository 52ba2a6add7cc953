//! Session-level MIDI message handlers.
//!
//! Handlers are invoked from the host MIDI service's own thread, once per
//! unbundled message, tagged with the unique ID of the virtual input the
//! message arrived on.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use midi_msg::MidiMsg;
use tracing::debug;

use crate::endpoint::UniqueId;

pub trait MidiMessageHandler: Send + Sync {
    fn handle_midi_message(&self, message: &MidiMsg, source: UniqueId);
}

impl<F> MidiMessageHandler for F
where
    F: Fn(&MidiMsg, UniqueId) + Send + Sync,
{
    fn handle_midi_message(&self, message: &MidiMsg, source: UniqueId) {
        self(message, source)
    }
}

/// Drops every message. Installed until a real handler is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl MidiMessageHandler for NullHandler {
    fn handle_midi_message(&self, _message: &MidiMsg, source: UniqueId) {
        debug!("No MIDI handler installed, dropping message from {}", source);
    }
}

/// A message received on a virtual input.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub source: UniqueId,
    pub message: MidiMsg,
}

/// Forwards messages into a bounded channel so they can be consumed off the
/// host's callback thread.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    sender: Sender<InboundMessage>,
}

impl MidiMessageHandler for ChannelHandler {
    fn handle_midi_message(&self, message: &MidiMsg, source: UniqueId) {
        let inbound = InboundMessage {
            source,
            message: message.clone(),
        };
        match self.sender.try_send(inbound) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("MIDI inbound channel full, dropping message from {}", source)
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("MIDI inbound receiver dropped, discarding message from {}", source)
            }
        }
    }
}

/// Create a channel-backed handler and the receiver that drains it.
pub fn message_channel(capacity: usize) -> (ChannelHandler, Receiver<InboundMessage>) {
    let (sender, receiver) = bounded(capacity);
    (ChannelHandler { sender }, receiver)
}
