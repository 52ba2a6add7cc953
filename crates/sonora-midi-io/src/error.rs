//! Error types for the MIDI I/O subsystem.

use thiserror::Error;

use crate::endpoint::{HostStatus, PortDirection, UniqueId};
use crate::host::HostOperation;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Host MIDI error {status} during {operation} ({name})")]
    Host {
        operation: HostOperation,
        name: String,
        status: HostStatus,
    },

    #[error("Host rejected unique ID {unique_id} for virtual {direction} port (status {status})")]
    UniqueIdRejected {
        direction: PortDirection,
        unique_id: UniqueId,
        status: HostStatus,
    },

    #[error("No virtual output port has been created")]
    NoVirtualOutput,

    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    #[error("MIDI port error: {0}")]
    MidiPort(String),

    #[error("MIDI device error: {0}")]
    MidiDevice(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Host status code carried by this error, if it came from the host service.
    pub fn host_status(&self) -> Option<HostStatus> {
        match self {
            Error::Host { status, .. } | Error::UniqueIdRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<midi_msg::ParseError> for Error {
    fn from(e: midi_msg::ParseError) -> Self {
        Error::MidiParse(format!("{:?}", e))
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::MidiDevice(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Error::MidiPort(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::ConnectError<midir::MidiOutput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        Error::MidiPort(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
