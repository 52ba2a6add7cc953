//! Host MIDI service abstraction.
//!
//! The virtual port manager never talks to the OS directly; it drives a
//! [`MidiHost`]. Two backends ship with the crate:
//!
//! - [`InMemoryHost`] - software loopback with failure and packet injection
//! - `MidirHost` - OS virtual ports via midir (`midi-io` feature, non-Windows)

mod memory;
pub use memory::InMemoryHost;

#[cfg(all(feature = "midi-io", not(target_os = "windows")))]
mod midir_host;
#[cfg(all(feature = "midi-io", not(target_os = "windows")))]
pub use midir_host::MidirHost;

use std::fmt;

use crate::endpoint::{ClientRef, EndpointRef, HostStatus, UniqueId};
use crate::packet::PacketList;

/// Invoked by the host, from its own thread, for every inbound packet list.
pub type PacketCallback = Box<dyn Fn(&PacketList) + Send + Sync + 'static>;

pub trait MidiHost: Send + Sync + 'static {
    fn create_client(&self, name: &str) -> Result<ClientRef, HostStatus>;

    /// Create a virtual destination (our input). `callback` receives every
    /// packet list other applications send to it.
    fn create_destination(
        &self,
        client: ClientRef,
        name: &str,
        callback: PacketCallback,
    ) -> Result<EndpointRef, HostStatus>;

    /// Create a virtual source (our output).
    fn create_source(&self, client: ClientRef, name: &str) -> Result<EndpointRef, HostStatus>;

    fn set_unique_id(&self, endpoint: EndpointRef, unique_id: UniqueId) -> Result<(), HostStatus>;

    fn dispose_endpoint(&self, endpoint: EndpointRef) -> Result<(), HostStatus>;

    /// Transmit from a virtual source to everyone listening on it.
    fn send(&self, source: EndpointRef, packets: &PacketList) -> Result<(), HostStatus>;
}

/// Host call that produced a status, for logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOperation {
    CreateClient,
    CreateDestination,
    CreateSource,
    SetUniqueId,
    DisposeEndpoint,
    Send,
}

impl fmt::Display for HostOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostOperation::CreateClient => "client creation",
            HostOperation::CreateDestination => "virtual input creation",
            HostOperation::CreateSource => "virtual output creation",
            HostOperation::SetUniqueId => "unique ID assignment",
            HostOperation::DisposeEndpoint => "endpoint disposal",
            HostOperation::Send => "send",
        };
        f.write_str(s)
    }
}
