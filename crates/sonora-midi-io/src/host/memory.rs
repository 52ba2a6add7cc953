//! In-process host MIDI service.
//!
//! Endpoints live in a table owned by the host. Packets are injected with
//! [`InMemoryHost::deliver`] and outbound traffic is recorded per source.
//! Any host call can be made to fail with [`InMemoryHost::fail_next`].

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::{HostOperation, MidiHost, PacketCallback};
use crate::endpoint::{ClientRef, EndpointRef, HostStatus, UniqueId};
use crate::packet::PacketList;

enum EndpointKind {
    Destination(Arc<PacketCallback>),
    Source { sent: Vec<PacketList> },
}

struct MemoryEndpoint {
    name: String,
    unique_id: Option<UniqueId>,
    kind: EndpointKind,
}

#[derive(Default)]
struct HostState {
    clients: HashMap<ClientRef, String>,
    endpoints: HashMap<EndpointRef, MemoryEndpoint>,
    failures: HashMap<HostOperation, VecDeque<HostStatus>>,
}

impl HostState {
    fn take_failure(&mut self, operation: HostOperation) -> Result<(), HostStatus> {
        self.failures
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
            .map_or(Ok(()), HostStatus::check)
    }
}

pub struct InMemoryHost {
    state: Mutex<HostState>,
    next_ref: AtomicU32,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState::default()),
            next_ref: AtomicU32::new(1),
        }
    }

    fn allocate(&self) -> u32 {
        self.next_ref.fetch_add(1, Ordering::Relaxed)
    }

    /// Make the next call of `operation` return `status`.
    ///
    /// Queued statuses are consumed in order, one per call.
    pub fn fail_next(&self, operation: HostOperation, status: HostStatus) {
        self.state
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(status);
    }

    /// Simulate another application sending `packets` to a destination.
    ///
    /// The callback runs on the calling thread, outside the host lock.
    pub fn deliver(&self, destination: EndpointRef, packets: &PacketList) -> Result<(), HostStatus> {
        let callback = {
            let state = self.state.lock();
            match state.endpoints.get(&destination).map(|e| &e.kind) {
                Some(EndpointKind::Destination(callback)) => Arc::clone(callback),
                Some(EndpointKind::Source { .. }) => return Err(HostStatus::WRONG_ENDPOINT_TYPE),
                None => return Err(HostStatus::UNKNOWN_ENDPOINT),
            }
        };
        callback(packets);
        Ok(())
    }

    pub fn is_live(&self, endpoint: EndpointRef) -> bool {
        self.state.lock().endpoints.contains_key(&endpoint)
    }

    pub fn endpoint_count(&self) -> usize {
        self.state.lock().endpoints.len()
    }

    pub fn endpoint_name(&self, endpoint: EndpointRef) -> Option<String> {
        self.state
            .lock()
            .endpoints
            .get(&endpoint)
            .map(|e| e.name.clone())
    }

    pub fn unique_id_of(&self, endpoint: EndpointRef) -> Option<UniqueId> {
        self.state
            .lock()
            .endpoints
            .get(&endpoint)
            .and_then(|e| e.unique_id)
    }

    pub fn find_by_unique_id(&self, unique_id: UniqueId) -> Option<EndpointRef> {
        self.state
            .lock()
            .endpoints
            .iter()
            .find(|(_, e)| e.unique_id == Some(unique_id))
            .map(|(endpoint, _)| *endpoint)
    }

    /// Everything sent through a source so far.
    pub fn sent_packets(&self, source: EndpointRef) -> Vec<PacketList> {
        match self.state.lock().endpoints.get(&source).map(|e| &e.kind) {
            Some(EndpointKind::Source { sent }) => sent.clone(),
            _ => Vec::new(),
        }
    }

    fn insert(
        &self,
        client: ClientRef,
        name: &str,
        operation: HostOperation,
        kind: EndpointKind,
    ) -> Result<EndpointRef, HostStatus> {
        let mut state = self.state.lock();
        state.take_failure(operation)?;
        if !state.clients.contains_key(&client) {
            return Err(HostStatus::INVALID_CLIENT);
        }
        let endpoint = EndpointRef(self.allocate());
        state.endpoints.insert(
            endpoint,
            MemoryEndpoint {
                name: name.to_string(),
                unique_id: None,
                kind,
            },
        );
        Ok(endpoint)
    }
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiHost for InMemoryHost {
    fn create_client(&self, name: &str) -> Result<ClientRef, HostStatus> {
        let mut state = self.state.lock();
        state.take_failure(HostOperation::CreateClient)?;
        let client = ClientRef(self.allocate());
        state.clients.insert(client, name.to_string());
        Ok(client)
    }

    fn create_destination(
        &self,
        client: ClientRef,
        name: &str,
        callback: PacketCallback,
    ) -> Result<EndpointRef, HostStatus> {
        self.insert(
            client,
            name,
            HostOperation::CreateDestination,
            EndpointKind::Destination(Arc::new(callback)),
        )
    }

    fn create_source(&self, client: ClientRef, name: &str) -> Result<EndpointRef, HostStatus> {
        self.insert(
            client,
            name,
            HostOperation::CreateSource,
            EndpointKind::Source { sent: Vec::new() },
        )
    }

    fn set_unique_id(&self, endpoint: EndpointRef, unique_id: UniqueId) -> Result<(), HostStatus> {
        let mut state = self.state.lock();
        state.take_failure(HostOperation::SetUniqueId)?;
        let taken = state
            .endpoints
            .iter()
            .any(|(other, e)| *other != endpoint && e.unique_id == Some(unique_id));
        if taken {
            return Err(HostStatus::ID_NOT_UNIQUE);
        }
        let entry = state
            .endpoints
            .get_mut(&endpoint)
            .ok_or(HostStatus::UNKNOWN_ENDPOINT)?;
        entry.unique_id = Some(unique_id);
        Ok(())
    }

    fn dispose_endpoint(&self, endpoint: EndpointRef) -> Result<(), HostStatus> {
        let mut state = self.state.lock();
        state.take_failure(HostOperation::DisposeEndpoint)?;
        state
            .endpoints
            .remove(&endpoint)
            .map(|_| ())
            .ok_or(HostStatus::UNKNOWN_ENDPOINT)
    }

    fn send(&self, source: EndpointRef, packets: &PacketList) -> Result<(), HostStatus> {
        let mut state = self.state.lock();
        state.take_failure(HostOperation::Send)?;
        match state.endpoints.get_mut(&source).map(|e| &mut e.kind) {
            Some(EndpointKind::Source { sent }) => {
                sent.push(packets.clone());
                Ok(())
            }
            Some(EndpointKind::Destination(_)) => Err(HostStatus::WRONG_ENDPOINT_TYPE),
            None => Err(HostStatus::UNKNOWN_ENDPOINT),
        }
    }
}

impl std::fmt::Debug for InMemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InMemoryHost")
            .field("num_clients", &state.clients.len())
            .field("num_endpoints", &state.endpoints.len())
            .finish()
    }
}
