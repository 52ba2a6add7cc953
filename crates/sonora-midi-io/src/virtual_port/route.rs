//! Gate between the host's packet callback and the session handler.
//!
//! The host calls into an [`InputRoute`] from its own thread. Dispatch holds
//! the gate's read lock; the manager takes the write lock to close the gate
//! before disposing the endpoint, so a disposed or half-built endpoint never
//! forwards anything.

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

use crate::endpoint::UniqueId;
use crate::handler::MidiMessageHandler;
use crate::host::PacketCallback;
use crate::packet::PacketList;

pub(crate) type HandlerSlot = Arc<ArcSwap<Box<dyn MidiMessageHandler>>>;

pub(crate) struct InputRoute {
    source: UniqueId,
    open: RwLock<bool>,
    handler: HandlerSlot,
}

impl InputRoute {
    /// Routes start closed; open once the endpoint is fully set up.
    pub(crate) fn new(source: UniqueId, handler: HandlerSlot) -> Arc<Self> {
        Arc::new(Self {
            source,
            open: RwLock::new(false),
            handler,
        })
    }

    pub(crate) fn callback(self: &Arc<Self>) -> PacketCallback {
        let route = Arc::clone(self);
        Box::new(move |packets: &PacketList| route.dispatch(packets))
    }

    pub(crate) fn dispatch(&self, packets: &PacketList) {
        let open = self.open.read();
        if !*open {
            trace!("Virtual input {} closed, dropping packets", self.source);
            return;
        }
        let handler = self.handler.load();
        for message in packets.messages() {
            handler.handle_midi_message(&message, self.source);
        }
    }

    /// Blocks until in-flight dispatches finish.
    pub(crate) fn close(&self) {
        *self.open.write() = false;
    }

    pub(crate) fn open(&self) {
        *self.open.write() = true;
    }

    pub(crate) fn is_open(&self) -> bool {
        *self.open.read()
    }
}
