//! OS virtual MIDI ports via midir, owned by a dedicated thread.

use crossbeam_channel::{bounded, Receiver, Sender};
use midir::os::unix::{VirtualInput, VirtualOutput};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use tracing::{debug, warn};

use super::{MidiHost, PacketCallback};
use crate::endpoint::{ClientRef, EndpointRef, HostStatus, UniqueId};
use crate::error::{Error, Result};
use crate::packet::PacketList;

type Reply<T> = Sender<std::result::Result<T, HostStatus>>;

enum HostCommand {
    CreateDestination {
        endpoint: EndpointRef,
        client_name: String,
        name: String,
        callback: PacketCallback,
        reply: Reply<()>,
    },
    CreateSource {
        endpoint: EndpointRef,
        client_name: String,
        name: String,
        reply: Reply<()>,
    },
    Dispose {
        endpoint: EndpointRef,
        reply: Reply<()>,
    },
    Send {
        endpoint: EndpointRef,
        messages: Vec<Vec<u8>>,
        reply: Reply<()>,
    },
    Shutdown,
}

enum Connection {
    Input(MidiInputConnection<()>),
    Output(MidiOutputConnection),
}

/// Virtual ports on ALSA / CoreMIDI / JACK through midir.
///
/// midir has no unique-ID property, so IDs are tracked here and only checked
/// for uniqueness among this host's endpoints.
pub struct MidirHost {
    command_sender: Sender<HostCommand>,
    clients: Mutex<HashMap<ClientRef, String>>,
    endpoints: Mutex<HashMap<EndpointRef, Option<UniqueId>>>,
    next_ref: AtomicU32,
}

impl MidirHost {
    pub fn new() -> Result<Self> {
        // Fail early when the platform MIDI service is unavailable
        drop(MidiInput::new("sonora-startup-check")?);

        let (command_sender, command_receiver) = bounded(64);
        thread::Builder::new()
            .name("midi-virtual-port-thread".to_string())
            .spawn(move || Self::host_thread(command_receiver))
            .map_err(|e| Error::MidiDevice(format!("Failed to spawn MIDI host thread: {}", e)))?;

        Ok(Self {
            command_sender,
            clients: Mutex::new(HashMap::new()),
            endpoints: Mutex::new(HashMap::new()),
            next_ref: AtomicU32::new(1),
        })
    }

    fn host_thread(command_receiver: Receiver<HostCommand>) {
        let mut connections: HashMap<EndpointRef, Connection> = HashMap::new();

        while let Ok(command) = command_receiver.recv() {
            match command {
                HostCommand::CreateDestination {
                    endpoint,
                    client_name,
                    name,
                    callback,
                    reply,
                } => {
                    let result = Self::open_destination(&client_name, &name, callback)
                        .map(|conn| {
                            connections.insert(endpoint, Connection::Input(conn));
                        })
                        .map_err(creation_status);
                    let _ = reply.send(result);
                }
                HostCommand::CreateSource {
                    endpoint,
                    client_name,
                    name,
                    reply,
                } => {
                    let result = Self::open_source(&client_name, &name)
                        .map(|conn| {
                            connections.insert(endpoint, Connection::Output(conn));
                        })
                        .map_err(creation_status);
                    let _ = reply.send(result);
                }
                HostCommand::Dispose { endpoint, reply } => {
                    let result = match connections.remove(&endpoint) {
                        Some(Connection::Input(conn)) => {
                            conn.close();
                            Ok(())
                        }
                        Some(Connection::Output(conn)) => {
                            conn.close();
                            Ok(())
                        }
                        None => Err(HostStatus::UNKNOWN_ENDPOINT),
                    };
                    let _ = reply.send(result);
                }
                HostCommand::Send {
                    endpoint,
                    messages,
                    reply,
                } => {
                    let result = match connections.get_mut(&endpoint) {
                        Some(Connection::Output(conn)) => messages.iter().try_for_each(|bytes| {
                            conn.send(bytes).map_err(|e| {
                                debug!("midir send failed: {}", e);
                                HostStatus::MESSAGE_SEND_ERR
                            })
                        }),
                        Some(Connection::Input(_)) => Err(HostStatus::WRONG_ENDPOINT_TYPE),
                        None => Err(HostStatus::UNKNOWN_ENDPOINT),
                    };
                    let _ = reply.send(result);
                }
                HostCommand::Shutdown => break,
            }
        }

        // Dropping the connections closes every remaining virtual port
        debug!("MIDI host thread exiting, closing {} endpoints", connections.len());
    }

    fn open_destination(
        client_name: &str,
        name: &str,
        callback: PacketCallback,
    ) -> Result<MidiInputConnection<()>> {
        let midi_input = MidiInput::new(client_name)?;
        let conn = midi_input.create_virtual(
            name,
            move |timestamp, bytes, _| {
                callback(&PacketList::single(timestamp, bytes));
            },
            (),
        )?;
        Ok(conn)
    }

    fn open_source(client_name: &str, name: &str) -> Result<MidiOutputConnection> {
        let midi_output = MidiOutput::new(client_name)?;
        Ok(midi_output.create_virtual(name)?)
    }

    fn request(
        &self,
        make: impl FnOnce(Reply<()>) -> HostCommand,
    ) -> std::result::Result<(), HostStatus> {
        let (reply, response) = bounded(1);
        self.command_sender
            .send(make(reply))
            .map_err(|_| HostStatus::SERVER_START_ERR)?;
        response.recv().map_err(|_| HostStatus::SERVER_START_ERR)?
    }

    fn client_name(&self, client: ClientRef) -> std::result::Result<String, HostStatus> {
        self.clients
            .lock()
            .get(&client)
            .cloned()
            .ok_or(HostStatus::INVALID_CLIENT)
    }

    fn allocate(&self) -> EndpointRef {
        EndpointRef(self.next_ref.fetch_add(1, Ordering::Relaxed))
    }
}

impl MidiHost for MidirHost {
    fn create_client(&self, name: &str) -> std::result::Result<ClientRef, HostStatus> {
        let client = ClientRef(self.next_ref.fetch_add(1, Ordering::Relaxed));
        self.clients.lock().insert(client, name.to_string());
        Ok(client)
    }

    fn create_destination(
        &self,
        client: ClientRef,
        name: &str,
        callback: PacketCallback,
    ) -> std::result::Result<EndpointRef, HostStatus> {
        let client_name = self.client_name(client)?;
        let endpoint = self.allocate();
        self.request(|reply| HostCommand::CreateDestination {
            endpoint,
            client_name,
            name: name.to_string(),
            callback,
            reply,
        })?;
        self.endpoints.lock().insert(endpoint, None);
        Ok(endpoint)
    }

    fn create_source(
        &self,
        client: ClientRef,
        name: &str,
    ) -> std::result::Result<EndpointRef, HostStatus> {
        let client_name = self.client_name(client)?;
        let endpoint = self.allocate();
        self.request(|reply| HostCommand::CreateSource {
            endpoint,
            client_name,
            name: name.to_string(),
            reply,
        })?;
        self.endpoints.lock().insert(endpoint, None);
        Ok(endpoint)
    }

    fn set_unique_id(
        &self,
        endpoint: EndpointRef,
        unique_id: UniqueId,
    ) -> std::result::Result<(), HostStatus> {
        let mut endpoints = self.endpoints.lock();
        let taken = endpoints
            .iter()
            .any(|(other, id)| *other != endpoint && *id == Some(unique_id));
        if taken {
            return Err(HostStatus::ID_NOT_UNIQUE);
        }
        let slot = endpoints
            .get_mut(&endpoint)
            .ok_or(HostStatus::UNKNOWN_ENDPOINT)?;
        *slot = Some(unique_id);
        Ok(())
    }

    fn dispose_endpoint(&self, endpoint: EndpointRef) -> std::result::Result<(), HostStatus> {
        self.request(|reply| HostCommand::Dispose { endpoint, reply })?;
        self.endpoints.lock().remove(&endpoint);
        Ok(())
    }

    fn send(&self, source: EndpointRef, packets: &PacketList) -> std::result::Result<(), HostStatus> {
        let messages = outgoing_messages(packets)?;
        self.request(|reply| HostCommand::Send {
            endpoint: source,
            messages,
            reply,
        })
    }
}

/// Host status for a failed endpoint creation: the MIDI service itself
/// failing to start versus the service refusing the port.
fn creation_status(err: Error) -> HostStatus {
    debug!("midir endpoint creation failed: {}", err);
    match err {
        Error::MidiDevice(_) => HostStatus::SERVER_START_ERR,
        _ => HostStatus::NOT_PERMITTED,
    }
}

/// Split packets into complete messages; midir expects one per send call.
///
/// Bytes that decode to nothing are a send failure, not an empty send.
fn outgoing_messages(packets: &PacketList) -> std::result::Result<Vec<Vec<u8>>, HostStatus> {
    let messages: Vec<Vec<u8>> = packets.messages().map(|msg| msg.to_midi()).collect();
    let has_data = packets.packets.iter().any(|packet| !packet.data.is_empty());
    if messages.is_empty() && has_data {
        debug!("No complete MIDI message in outgoing packets");
        return Err(HostStatus::MESSAGE_SEND_ERR);
    }
    Ok(messages)
}

impl Drop for MidirHost {
    fn drop(&mut self) {
        if self.command_sender.send(HostCommand::Shutdown).is_err() {
            warn!("MIDI host thread already stopped");
        }
    }
}

impl std::fmt::Debug for MidirHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidirHost")
            .field("num_clients", &self.clients.lock().len())
            .field("num_endpoints", &self.endpoints.lock().len())
            .finish()
    }
}
