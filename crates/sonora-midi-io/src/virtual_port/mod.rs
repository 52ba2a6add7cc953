//! Virtual MIDI ports exposed to other applications.
//!
//! A [`VirtualPortManager`] owns at most one virtual input and one virtual
//! output (plus any ports created in batches), recreates them on demand and
//! forwards inbound messages to the session's handler.

mod builder;
mod manager;
mod route;

pub use builder::VirtualPortManagerBuilder;
pub use manager::{VirtualPortInfo, VirtualPortManager};
