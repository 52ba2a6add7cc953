//! Host packets and their unbundling into individual MIDI messages.
//!
//! A host packet carries a timestamp and a byte stream that may hold several
//! MIDI messages back to back, including running-status continuations and
//! interleaved real-time bytes.

use midi_msg::MidiMsg;
use smallvec::SmallVec;
use tracing::debug;

use crate::error::Result;

/// A timestamped byte stream delivered by the host MIDI service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiPacket {
    /// Host timestamp (backend specific units, microseconds for midir).
    pub timestamp: u64,
    pub data: Vec<u8>,
}

impl MidiPacket {
    pub fn new(timestamp: u64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp,
            data: data.into(),
        }
    }

    /// Unbundle this packet into its MIDI messages, in wire order.
    pub fn messages(&self) -> SmallVec<[MidiMsg; 4]> {
        unbundle(&self.data)
    }
}

/// One host delivery: a list of packets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PacketList {
    pub packets: Vec<MidiPacket>,
}

impl PacketList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(timestamp: u64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            packets: vec![MidiPacket::new(timestamp, data)],
        }
    }

    pub fn from_message(timestamp: u64, message: &MidiMsg) -> Self {
        Self::single(timestamp, message.to_midi())
    }

    pub fn push(&mut self, packet: MidiPacket) {
        self.packets.push(packet);
    }

    pub fn is_empty(&self) -> bool {
        self.packets.iter().all(|p| p.data.is_empty())
    }

    /// Every message of every packet, in delivery order.
    pub fn messages(&self) -> impl Iterator<Item = MidiMsg> + '_ {
        self.packets.iter().flat_map(|packet| packet.messages())
    }
}

/// Parse exactly one MIDI message from `bytes`.
pub fn parse_message(bytes: &[u8]) -> Result<MidiMsg> {
    let (msg, _len) = MidiMsg::from_midi(bytes)?;
    Ok(msg)
}

/// Number of data bytes following a status byte, `None` for SysEx.
fn data_len(status: u8) -> Option<usize> {
    match status {
        0x80..=0xBF | 0xE0..=0xEF => Some(2),
        0xC0..=0xDF => Some(1),
        0xF0 => None,
        0xF1 | 0xF3 => Some(1),
        0xF2 => Some(2),
        _ => Some(0),
    }
}

#[inline]
fn is_realtime(byte: u8) -> bool {
    byte >= 0xF8
}

/// Split a byte stream into messages.
///
/// Channel messages set the running status; system common messages clear
/// it. Real-time bytes are emitted where they appear, even in the middle of
/// another message. Bytes that cannot form a message are dropped.
pub fn unbundle(bytes: &[u8]) -> SmallVec<[MidiMsg; 4]> {
    let mut messages = SmallVec::new();
    let mut running_status: Option<u8> = None;
    let mut pending: SmallVec<[u8; 3]> = SmallVec::new();
    let mut sysex: Option<Vec<u8>> = None;

    for &byte in bytes {
        if is_realtime(byte) {
            emit(&[byte], &mut messages);
            continue;
        }

        if let Some(buffer) = sysex.as_mut() {
            if byte == 0xF7 {
                buffer.push(byte);
                emit(buffer, &mut messages);
                sysex = None;
                continue;
            }
            if byte < 0x80 {
                buffer.push(byte);
                continue;
            }
            debug!("Unterminated SysEx ({} bytes) dropped", buffer.len());
            sysex = None;
        }

        if byte >= 0x80 {
            if !pending.is_empty() {
                debug!("Incomplete MIDI message {:02X?} dropped", pending.as_slice());
                pending.clear();
            }
            match data_len(byte) {
                None => {
                    running_status = None;
                    sysex = Some(vec![byte]);
                }
                Some(0) => {
                    running_status = None;
                    emit(&[byte], &mut messages);
                }
                Some(_) => {
                    running_status = (byte < 0xF0).then_some(byte);
                    pending.push(byte);
                }
            }
            continue;
        }

        // Data byte
        if pending.is_empty() {
            match running_status {
                Some(status) => pending.push(status),
                None => {
                    debug!("Stray MIDI data byte {:02X} dropped", byte);
                    continue;
                }
            }
        }
        pending.push(byte);

        let expected = data_len(pending[0]).unwrap_or(0);
        if pending.len() == expected + 1 {
            emit(&pending, &mut messages);
            pending.clear();
        }
    }

    if !pending.is_empty() {
        debug!("Truncated MIDI message {:02X?} dropped", pending.as_slice());
    }
    if let Some(buffer) = sysex {
        debug!("Unterminated SysEx ({} bytes) dropped", buffer.len());
    }

    messages
}

fn emit(bytes: &[u8], messages: &mut SmallVec<[MidiMsg; 4]>) {
    match parse_message(bytes) {
        Ok(msg) => messages.push(msg),
        Err(e) => debug!("Failed to parse MIDI message {:02X?}: {}", bytes, e),
    }
}
