//! VirtualPortManager builder.

use std::sync::Arc;
use tracing::error;

use super::VirtualPortManager;
use crate::config::VirtualPortConfig;
use crate::endpoint::ClientRef;
use crate::error::{Error, Result};
use crate::handler::{MidiMessageHandler, NullHandler};
use crate::host::{HostOperation, MidiHost};

pub struct VirtualPortManagerBuilder<H: MidiHost> {
    host: Arc<H>,
    config: VirtualPortConfig,
    client: Option<ClientRef>,
    handler: Option<Box<dyn MidiMessageHandler>>,
}

impl<H: MidiHost> VirtualPortManagerBuilder<H> {
    pub(super) fn new(host: Arc<H>) -> Self {
        Self {
            host,
            config: VirtualPortConfig::default(),
            client: None,
            handler: None,
        }
    }

    pub fn config(mut self, config: VirtualPortConfig) -> Self {
        self.config = config;
        self
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.config.client_name = name.into();
        self
    }

    /// Use an existing host client instead of registering a new one.
    pub fn client(mut self, client: ClientRef) -> Self {
        self.client = Some(client);
        self
    }

    pub fn handler(mut self, handler: impl MidiMessageHandler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> Result<VirtualPortManager<H>> {
        self.config.validate()?;

        let client = match self.client {
            Some(client) => client,
            None => self
                .host
                .create_client(&self.config.client_name)
                .map_err(|status| {
                    error!(
                        status = status.0,
                        "Error {} creating MIDI client: {}", status, self.config.client_name
                    );
                    Error::Host {
                        operation: HostOperation::CreateClient,
                        name: self.config.client_name.clone(),
                        status,
                    }
                })?,
        };

        let handler = self
            .handler
            .unwrap_or_else(|| Box::new(NullHandler) as Box<dyn MidiMessageHandler>);

        Ok(VirtualPortManager::from_parts(
            self.host,
            client,
            self.config,
            handler,
        ))
    }
}
