//! Endpoint handles, identities and host status codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a source or destination in the host's MIDI namespace.
///
/// `EndpointRef::NONE` means "not created".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EndpointRef(pub u32);

impl EndpointRef {
    pub const NONE: EndpointRef = EndpointRef(0);

    #[inline]
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    #[inline]
    pub fn is_some(&self) -> bool {
        !self.is_none()
    }
}

impl fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle to a client registered with the host MIDI service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientRef(pub u32);

/// Persistent 32-bit identifier attached to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(pub i32);

impl UniqueId {
    /// Default identity of the single virtual input.
    pub const DEFAULT_INPUT: UniqueId = UniqueId(2_000_000);
    /// Default identity of the single virtual output.
    pub const DEFAULT_OUTPUT: UniqueId = UniqueId(2_000_001);

    #[inline]
    pub fn get(self) -> i32 {
        self.0
    }
}

impl From<i32> for UniqueId {
    fn from(value: i32) -> Self {
        UniqueId(value)
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// Destination endpoint: other applications send to it, we receive.
    Input,
    /// Source endpoint: we send, other applications receive.
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortIdentity {
    pub unique_id: UniqueId,
    pub name: String,
}

impl PortIdentity {
    pub fn new(unique_id: UniqueId, name: impl Into<String>) -> Self {
        Self {
            unique_id,
            name: name.into(),
        }
    }
}

/// Status code returned by the host MIDI service. `NO_ERR` is success.
///
/// Named codes follow the CoreMIDI numbering so logs read the same on every
/// backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostStatus(pub i32);

impl HostStatus {
    pub const NO_ERR: HostStatus = HostStatus(0);
    pub const INVALID_CLIENT: HostStatus = HostStatus(-10830);
    pub const INVALID_PORT: HostStatus = HostStatus(-10831);
    pub const WRONG_ENDPOINT_TYPE: HostStatus = HostStatus(-10832);
    pub const UNKNOWN_ENDPOINT: HostStatus = HostStatus(-10834);
    pub const MESSAGE_SEND_ERR: HostStatus = HostStatus(-10838);
    pub const SERVER_START_ERR: HostStatus = HostStatus(-10839);
    pub const OBJECT_NOT_FOUND: HostStatus = HostStatus(-10842);
    pub const ID_NOT_UNIQUE: HostStatus = HostStatus(-10843);
    pub const NOT_PERMITTED: HostStatus = HostStatus(-10844);

    #[inline]
    pub fn is_ok(self) -> bool {
        self == Self::NO_ERR
    }

    /// Escalate a raw status: anything other than `NO_ERR` is an error.
    #[inline]
    pub fn check(self) -> Result<(), HostStatus> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
