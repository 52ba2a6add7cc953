//! Virtual Port Manager
//!
//! Creates, recreates and destroys virtual MIDI endpoints against a
//! [`MidiHost`]. Endpoint handles live behind one mutex so create/destroy
//! calls are serialized; inbound packets reach the handler through an
//! [`InputRoute`] that is closed before its endpoint is disposed.
//!
//! Sending and inspection read an [`ArcSwap`] snapshot republished after
//! every change and never take the session mutex, so a handler may send or
//! inspect while another thread destroys ports. Handlers must not call back
//! into create/destroy: destruction waits for in-flight dispatches on the
//! same route.

use arc_swap::ArcSwap;
use midi_msg::MidiMsg;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::builder::VirtualPortManagerBuilder;
use super::route::{HandlerSlot, InputRoute};
use crate::config::VirtualPortConfig;
use crate::endpoint::{ClientRef, EndpointRef, HostStatus, PortDirection, PortIdentity, UniqueId};
use crate::error::{Error, Result};
use crate::handler::MidiMessageHandler;
use crate::host::{HostOperation, MidiHost};
use crate::naming::{BatchRequest, PortNamer, UniqueIdAllocator};
use crate::packet::PacketList;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualPortInfo {
    pub endpoint: EndpointRef,
    pub identity: PortIdentity,
    pub direction: PortDirection,
}

struct VirtualEndpoint {
    endpoint: EndpointRef,
    identity: PortIdentity,
    direction: PortDirection,
    /// Inputs only.
    route: Option<Arc<InputRoute>>,
}

impl VirtualEndpoint {
    fn info(&self) -> VirtualPortInfo {
        VirtualPortInfo {
            endpoint: self.endpoint,
            identity: self.identity.clone(),
            direction: self.direction,
        }
    }
}

/// Lock-free view of the live ports for the send and inspection paths.
#[derive(Default)]
struct PortsSnapshot {
    input: Option<VirtualPortInfo>,
    output: Option<VirtualPortInfo>,
    batch_inputs: Vec<VirtualPortInfo>,
    batch_outputs: Vec<VirtualPortInfo>,
}

impl PortsSnapshot {
    fn all(&self) -> impl Iterator<Item = &VirtualPortInfo> {
        self.input
            .iter()
            .chain(self.output.iter())
            .chain(self.batch_inputs.iter())
            .chain(self.batch_outputs.iter())
    }
}

#[derive(Default)]
struct VirtualPorts {
    input: Option<VirtualEndpoint>,
    output: Option<VirtualEndpoint>,
    batch_inputs: Vec<VirtualEndpoint>,
    batch_outputs: Vec<VirtualEndpoint>,
}

impl VirtualPorts {
    fn single(&mut self, direction: PortDirection) -> &mut Option<VirtualEndpoint> {
        match direction {
            PortDirection::Input => &mut self.input,
            PortDirection::Output => &mut self.output,
        }
    }

    fn batch(&mut self, direction: PortDirection) -> &mut Vec<VirtualEndpoint> {
        match direction {
            PortDirection::Input => &mut self.batch_inputs,
            PortDirection::Output => &mut self.batch_outputs,
        }
    }

    fn all(&self) -> impl Iterator<Item = &VirtualEndpoint> {
        self.input
            .iter()
            .chain(self.output.iter())
            .chain(self.batch_inputs.iter())
            .chain(self.batch_outputs.iter())
    }

    fn snapshot(&self) -> PortsSnapshot {
        let infos = |batch: &[VirtualEndpoint]| -> Vec<VirtualPortInfo> {
            batch.iter().map(VirtualEndpoint::info).collect()
        };
        PortsSnapshot {
            input: self.input.as_ref().map(VirtualEndpoint::info),
            output: self.output.as_ref().map(VirtualEndpoint::info),
            batch_inputs: infos(&self.batch_inputs),
            batch_outputs: infos(&self.batch_outputs),
        }
    }
}

/// One session's virtual ports.
pub struct VirtualPortManager<H: MidiHost> {
    host: Arc<H>,
    client: ClientRef,
    config: VirtualPortConfig,
    handler: HandlerSlot,
    ports: Mutex<VirtualPorts>,
    snapshot: ArcSwap<PortsSnapshot>,
}

impl<H: MidiHost> VirtualPortManager<H> {
    pub fn builder(host: Arc<H>) -> VirtualPortManagerBuilder<H> {
        VirtualPortManagerBuilder::new(host)
    }

    pub(super) fn from_parts(
        host: Arc<H>,
        client: ClientRef,
        config: VirtualPortConfig,
        handler: Box<dyn MidiMessageHandler>,
    ) -> Self {
        Self {
            host,
            client,
            config,
            handler: Arc::new(ArcSwap::from_pointee(handler)),
            ports: Mutex::new(VirtualPorts::default()),
            snapshot: ArcSwap::from_pointee(PortsSnapshot::default()),
        }
    }

    /// Run `f` under the session mutex, then republish the snapshot before
    /// releasing it.
    fn with_ports<R>(&self, f: impl FnOnce(&mut VirtualPorts) -> R) -> R {
        let mut ports = self.ports.lock();
        let result = f(&mut ports);
        self.snapshot.store(Arc::new(ports.snapshot()));
        result
    }

    // ==================== Single Ports ====================

    /// Replace both virtual ports: an input tagged `unique_id` and an output
    /// tagged `unique_id + 1`.
    ///
    /// Both creations are attempted; the first failure is returned.
    pub fn create_virtual_ports(
        &self,
        unique_id: UniqueId,
        name: Option<&str>,
    ) -> Result<(EndpointRef, EndpointRef)> {
        info!("Creating virtual input and output ports");
        let output_id = UniqueId(unique_id.get().wrapping_add(1));
        let (input, output) = self.with_ports(|ports| {
            self.destroy_all(ports);
            let input = self.create_single(ports, PortDirection::Input, unique_id, name);
            let output = self.create_single(ports, PortDirection::Output, output_id, name);
            (input, output)
        });
        Ok((input?, output?))
    }

    /// Replace the virtual input. `name` defaults to the client name.
    pub fn create_virtual_input_port(
        &self,
        unique_id: UniqueId,
        name: Option<&str>,
    ) -> Result<EndpointRef> {
        self.with_ports(|ports| self.create_single(ports, PortDirection::Input, unique_id, name))
    }

    /// Replace the virtual output. `name` defaults to the client name.
    pub fn create_virtual_output_port(
        &self,
        unique_id: UniqueId,
        name: Option<&str>,
    ) -> Result<EndpointRef> {
        self.with_ports(|ports| self.create_single(ports, PortDirection::Output, unique_id, name))
    }

    fn create_single(
        &self,
        ports: &mut VirtualPorts,
        direction: PortDirection,
        unique_id: UniqueId,
        name: Option<&str>,
    ) -> Result<EndpointRef> {
        let slot = ports.single(direction);
        if let Some(existing) = slot.as_ref() {
            // Never hold two endpoints of one direction
            self.dispose(existing).map_err(|status| Error::Host {
                operation: HostOperation::DisposeEndpoint,
                name: existing.identity.name.clone(),
                status,
            })?;
            *slot = None;
        }

        let name = name.unwrap_or(self.config.client_name.as_str());
        let port = self.open_port(direction, PortIdentity::new(unique_id, name))?;
        let endpoint = port.endpoint;
        let tagged = self.tag_and_activate(&port);
        *slot = Some(port);
        tagged.map(|()| endpoint)
    }

    // ==================== Batches ====================

    /// Replace every virtual port with batches of inputs and outputs built
    /// from the same request.
    pub fn create_multiple_virtual_ports(
        &self,
        request: &BatchRequest,
    ) -> (Vec<Result<PortIdentity>>, Vec<Result<PortIdentity>>) {
        info!("Creating multiple virtual input and output ports");
        self.with_ports(|ports| {
            self.destroy_all(ports);
            let inputs = self.create_batch(ports, PortDirection::Input, request);
            let outputs = self.create_batch(ports, PortDirection::Output, request);
            (inputs, outputs)
        })
    }

    /// Create `request.len()` virtual inputs, replacing the single virtual
    /// input and any previous input batch. One result per port, in order.
    pub fn create_multiple_virtual_input_ports(
        &self,
        request: &BatchRequest,
    ) -> Vec<Result<PortIdentity>> {
        self.with_ports(|ports| self.create_batch(ports, PortDirection::Input, request))
    }

    /// Output counterpart of [`Self::create_multiple_virtual_input_ports`].
    pub fn create_multiple_virtual_output_ports(
        &self,
        request: &BatchRequest,
    ) -> Vec<Result<PortIdentity>> {
        self.with_ports(|ports| self.create_batch(ports, PortDirection::Output, request))
    }

    fn create_batch(
        &self,
        ports: &mut VirtualPorts,
        direction: PortDirection,
        request: &BatchRequest,
    ) -> Vec<Result<PortIdentity>> {
        info!(
            "Creating {} virtual {} ports for {}",
            request.len(),
            direction,
            self.config.client_name
        );
        self.destroy_slot(ports.single(direction));
        self.destroy_batch(ports.batch(direction));

        let base = match direction {
            PortDirection::Input => self.config.input_base_id,
            PortDirection::Output => self.config.output_base_id,
        };
        let mut namer = PortNamer::new(self.config.client_name.as_str());
        let mut ids = UniqueIdAllocator::new(base, self.config.id_stride);

        let batch = ports.batch(direction);
        request
            .resolve(&mut namer, &mut ids)
            .into_iter()
            .map(|identity| {
                let port = self.open_port(direction, identity)?;
                let tagged = self.tag_and_activate(&port);
                let identity = port.identity.clone();
                batch.push(port);
                tagged.map(|()| identity)
            })
            .collect()
    }

    // ==================== Destruction ====================

    /// Dispose the virtual input. Returns `true` only if a live endpoint
    /// was disposed; on host failure the handle is kept for a retry.
    pub fn destroy_virtual_input_port(&self) -> bool {
        self.with_ports(|ports| self.destroy_slot(&mut ports.input))
    }

    /// Output counterpart of [`Self::destroy_virtual_input_port`].
    pub fn destroy_virtual_output_port(&self) -> bool {
        self.with_ports(|ports| self.destroy_slot(&mut ports.output))
    }

    /// Number of batch inputs disposed. Ports the host refused to dispose
    /// stay in the batch.
    pub fn destroy_multiple_virtual_input_ports(&self) -> usize {
        self.with_ports(|ports| self.destroy_batch(&mut ports.batch_inputs))
    }

    pub fn destroy_multiple_virtual_output_ports(&self) -> usize {
        self.with_ports(|ports| self.destroy_batch(&mut ports.batch_outputs))
    }

    /// Dispose input, then output, then all batch ports, each independently.
    pub fn destroy_virtual_ports(&self) {
        self.with_ports(|ports| self.destroy_all(ports));
    }

    fn destroy_all(&self, ports: &mut VirtualPorts) {
        self.destroy_slot(&mut ports.input);
        self.destroy_slot(&mut ports.output);
        self.destroy_batch(&mut ports.batch_inputs);
        self.destroy_batch(&mut ports.batch_outputs);
    }

    fn destroy_slot(&self, slot: &mut Option<VirtualEndpoint>) -> bool {
        let Some(port) = slot.as_ref() else {
            return false;
        };
        if self.dispose(port).is_err() {
            return false;
        }
        *slot = None;
        true
    }

    fn destroy_batch(&self, batch: &mut Vec<VirtualEndpoint>) -> usize {
        let before = batch.len();
        batch.retain(|port| self.dispose(port).is_err());
        before - batch.len()
    }

    // ==================== Host Calls ====================

    fn open_port(&self, direction: PortDirection, identity: PortIdentity) -> Result<VirtualEndpoint> {
        let (created, route, operation) = match direction {
            PortDirection::Input => {
                let route = InputRoute::new(identity.unique_id, Arc::clone(&self.handler));
                let created =
                    self.host
                        .create_destination(self.client, &identity.name, route.callback());
                (created, Some(route), HostOperation::CreateDestination)
            }
            PortDirection::Output => (
                self.host.create_source(self.client, &identity.name),
                None,
                HostOperation::CreateSource,
            ),
        };

        match created {
            Ok(endpoint) => {
                debug!(
                    "Created virtual {} port {}: {} (ID {})",
                    direction, endpoint, identity.name, identity.unique_id
                );
                Ok(VirtualEndpoint {
                    endpoint,
                    identity,
                    direction,
                    route,
                })
            }
            Err(status) => {
                error!(
                    status = status.0,
                    "Error {} creating virtual {} port: {}", status, direction, identity.name
                );
                Err(Error::Host {
                    operation,
                    name: identity.name,
                    status,
                })
            }
        }
    }

    /// Set the unique ID on the endpoint just created, then let inbound
    /// traffic through. The endpoint is kept even if the ID is rejected.
    fn tag_and_activate(&self, port: &VirtualEndpoint) -> Result<()> {
        let tagged = self
            .host
            .set_unique_id(port.endpoint, port.identity.unique_id)
            .map_err(|status| {
                error!(
                    status = status.0,
                    "Error {} setting unique ID {} on virtual {} port: {} -- {}",
                    status,
                    port.identity.unique_id,
                    port.direction,
                    port.identity.name,
                    port.endpoint
                );
                Error::UniqueIdRejected {
                    direction: port.direction,
                    unique_id: port.identity.unique_id,
                    status,
                }
            });
        if let Some(route) = &port.route {
            route.open();
        }
        tagged
    }

    fn dispose(&self, port: &VirtualEndpoint) -> std::result::Result<(), HostStatus> {
        if let Some(route) = &port.route {
            route.close();
        }
        match self.host.dispose_endpoint(port.endpoint) {
            Ok(()) => {
                debug!(
                    "Disposed virtual {} port {}: {}",
                    port.direction, port.endpoint, port.identity.name
                );
                Ok(())
            }
            Err(status) => {
                error!(
                    status = status.0,
                    "Error {} disposing virtual {} port: {} -- {}",
                    status,
                    port.direction,
                    port.identity.name,
                    port.endpoint
                );
                if let Some(route) = &port.route {
                    route.open();
                }
                Err(status)
            }
        }
    }

    // ==================== Sending ====================

    /// Send on the single virtual output.
    pub fn send(&self, message: &MidiMsg) -> Result<()> {
        self.send_bytes(&message.to_midi())
    }

    /// Send raw bytes (one or more messages) on the single virtual output.
    pub fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        let ports = self.snapshot.load();
        let port = ports.output.as_ref().ok_or(Error::NoVirtualOutput)?;
        self.transmit(port, &PacketList::single(0, bytes))
    }

    /// Send on whichever virtual output (single or batch) carries `unique_id`.
    pub fn send_from(&self, unique_id: UniqueId, message: &MidiMsg) -> Result<()> {
        let ports = self.snapshot.load();
        let port = ports
            .output
            .iter()
            .chain(ports.batch_outputs.iter())
            .find(|port| port.identity.unique_id == unique_id)
            .ok_or(Error::NoVirtualOutput)?;
        self.transmit(port, &PacketList::from_message(0, message))
    }

    fn transmit(&self, port: &VirtualPortInfo, packets: &PacketList) -> Result<()> {
        self.host.send(port.endpoint, packets).map_err(|status| {
            error!(
                status = status.0,
                "Error {} sending on virtual output port: {} -- {}",
                status,
                port.identity.name,
                port.endpoint
            );
            Error::Host {
                operation: HostOperation::Send,
                name: port.identity.name.clone(),
                status,
            }
        })
    }

    // ==================== Inspection ====================

    /// Handle of the single virtual input, `EndpointRef::NONE` if absent.
    pub fn virtual_input(&self) -> EndpointRef {
        self.snapshot
            .load()
            .input
            .as_ref()
            .map_or(EndpointRef::NONE, |port| port.endpoint)
    }

    /// Handle of the single virtual output, `EndpointRef::NONE` if absent.
    pub fn virtual_output(&self) -> EndpointRef {
        self.snapshot
            .load()
            .output
            .as_ref()
            .map_or(EndpointRef::NONE, |port| port.endpoint)
    }

    pub fn virtual_input_info(&self) -> Option<VirtualPortInfo> {
        self.snapshot.load().input.clone()
    }

    pub fn virtual_output_info(&self) -> Option<VirtualPortInfo> {
        self.snapshot.load().output.clone()
    }

    pub fn batch_inputs(&self) -> Vec<VirtualPortInfo> {
        self.snapshot.load().batch_inputs.clone()
    }

    pub fn batch_outputs(&self) -> Vec<VirtualPortInfo> {
        self.snapshot.load().batch_outputs.clone()
    }

    /// Every live virtual port: single input, single output, then batches.
    pub fn list_ports(&self) -> Vec<VirtualPortInfo> {
        self.snapshot.load().all().cloned().collect()
    }

    // ==================== Session ====================

    /// Swap the handler; takes effect for the next dispatched message.
    pub fn set_message_handler(&self, handler: impl MidiMessageHandler + 'static) {
        let handler: Box<dyn MidiMessageHandler> = Box::new(handler);
        self.handler.store(Arc::new(handler));
    }

    pub fn client(&self) -> ClientRef {
        self.client
    }

    pub fn client_name(&self) -> &str {
        &self.config.client_name
    }

    pub fn config(&self) -> &VirtualPortConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }
}

impl<H: MidiHost> Drop for VirtualPortManager<H> {
    fn drop(&mut self) {
        let ports = self.ports.get_mut();
        let live = ports.all().count();
        if live > 0 {
            debug!("Disposing {} virtual ports on drop", live);
            let mut ports = std::mem::take(ports);
            self.destroy_all(&mut ports);
        }
    }
}

impl<H: MidiHost> std::fmt::Debug for VirtualPortManager<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ports = self.snapshot.load();
        f.debug_struct("VirtualPortManager")
            .field("client_name", &self.config.client_name)
            .field("input", &ports.input.as_ref().map(|p| p.endpoint))
            .field("output", &ports.output.as_ref().map(|p| p.endpoint))
            .field("num_batch_inputs", &ports.batch_inputs.len())
            .field("num_batch_outputs", &ports.batch_outputs.len())
            .finish()
    }
}
