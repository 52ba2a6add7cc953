//! MIDI I/O subsystem for the Sonora audio framework.
//!
//! Provides virtual MIDI ports on top of a host MIDI service, packet
//! unbundling, and routing of inbound messages to a session handler.
//!
//! Feature gates: `midi-io` (OS virtual ports through midir, non-Windows).
//!
//! ```ignore
//! use sonora_midi_io::{message_channel, InMemoryHost, UniqueId, VirtualPortManager};
//!
//! let (handler, inbound) = message_channel(256);
//! let ports = VirtualPortManager::builder(Arc::new(InMemoryHost::new()))
//!     .client_name("Sonora")
//!     .handler(handler)
//!     .build()?;
//!
//! ports.create_virtual_ports(UniqueId::DEFAULT_INPUT, None)?;
//! ```

pub mod error;
pub use error::{Error, Result};

mod config;
pub use config::VirtualPortConfig;

mod endpoint;
pub use endpoint::{ClientRef, EndpointRef, HostStatus, PortDirection, PortIdentity, UniqueId};

pub mod host;
pub use host::{HostOperation, InMemoryHost, MidiHost, PacketCallback};

#[cfg(all(feature = "midi-io", not(target_os = "windows")))]
pub use host::MidirHost;

mod handler;
pub use handler::{message_channel, ChannelHandler, InboundMessage, MidiMessageHandler, NullHandler};

pub mod naming;
pub use naming::BatchRequest;

pub mod packet;
pub use packet::{MidiPacket, PacketList};

mod virtual_port;
pub use virtual_port::{VirtualPortInfo, VirtualPortManager, VirtualPortManagerBuilder};

pub use midi_msg::{Channel, ChannelVoiceMsg, MidiMsg, SystemRealTimeMsg};
