//! # Sonora - Audio Framework
//!
//! Umbrella crate over the Sonora subsystems:
//! - **sonora-midi-io** - virtual MIDI ports, host MIDI backends, packet routing
//!
//! ## Quick Start
//!
//! ```ignore
//! use sonora::prelude::*;
//!
//! let host = Arc::new(MidirHost::new()?);
//! let ports = VirtualPortManager::builder(host)
//!     .client_name("My Synth")
//!     .handler(|msg: &MidiMsg, source: UniqueId| println!("{source}: {msg:?}"))
//!     .build()?;
//!
//! ports.create_virtual_ports(UniqueId::DEFAULT_INPUT, None)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `midi` - MIDI subsystem (virtual ports, in-memory host)
//! - `midi-hardware` - OS virtual ports through midir

mod error;
pub use error::{Error, Result};

/// Re-export of sonora-midi-io for direct access
#[cfg(feature = "midi")]
pub use sonora_midi_io as midi;

#[cfg(feature = "midi")]
pub use sonora_midi_io::{
    BatchRequest, EndpointRef, InMemoryHost, MidiHost, MidiMessageHandler, MidiMsg, PacketList,
    PortDirection, PortIdentity, UniqueId, VirtualPortConfig, VirtualPortInfo, VirtualPortManager,
};

#[cfg(all(feature = "midi-hardware", not(target_os = "windows")))]
pub use sonora_midi_io::MidirHost;

pub mod prelude {
    pub use crate::{Error, Result};
    pub use std::sync::Arc;

    #[cfg(feature = "midi")]
    pub use crate::midi::{
        message_channel, BatchRequest, InMemoryHost, MidiMsg, UniqueId, VirtualPortManager,
    };

    #[cfg(all(feature = "midi-hardware", not(target_os = "windows")))]
    pub use crate::midi::MidirHost;
}
