use log::{debug, info, warn};
use mesh_link::{LinkConfig, MeshInterface, SerialInterface};

use crate::error::{ConsoleError, Result};
use crate::inbound::InboundQueue;
use crate::receive;

/// Opens radio sessions and lists the ports they can be opened on.
pub trait Connector: Send {
    fn list_ports(&self) -> mesh_link::Result<Vec<String>>;
    fn open(&self, port: &str) -> mesh_link::Result<Box<dyn MeshInterface>>;
}

/// Production connector: USB serial ports via `serialport`.
#[derive(Debug, Clone, Default)]
pub struct SerialConnector {
    config: LinkConfig,
}

impl SerialConnector {
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }
}

impl Connector for SerialConnector {
    fn list_ports(&self) -> mesh_link::Result<Vec<String>> {
        mesh_link::available_ports()
    }

    fn open(&self, port: &str) -> mesh_link::Result<Box<dyn MeshInterface>> {
        let iface = SerialInterface::open(port, self.config.clone())?;
        Ok(Box::new(iface))
    }
}

/// Result of a successful connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connected {
    pub port: String,
    pub node_id: Option<u32>,
}

/// Owns the single radio session.
///
/// At most one handle is open; it is `None` before connect and after close.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    handle: Option<Box<dyn MeshInterface>>,
    port: Option<String>,
    inbound: InboundQueue,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, inbound: InboundQueue) -> Self {
        Self {
            connector,
            handle: None,
            port: None,
            inbound,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// `true` while a session is open and its reader still has the device.
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_alive())
    }

    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub fn list_ports(&self) -> Result<Vec<String>> {
        self.connector.list_ports().map_err(ConsoleError::PortScan)
    }

    pub fn connect(&mut self, port: &str) -> Result<Connected> {
        if port.is_empty() {
            return Err(ConsoleError::NoPortSelected);
        }
        if self.is_connected() {
            debug!("closing previous session before connecting to {port}");
            self.disconnect();
        }

        debug!("attempting to connect to port: {port}");
        let mut handle = self.connector.open(port).map_err(|e| {
            warn!("connection error on {port}: {e}");
            ConsoleError::Connection(e)
        })?;

        self.inbound.clear();
        handle.set_receive_callback(receive::receive_callback(self.inbound.clone()));
        let node_id = handle.local_node_num();
        self.handle = Some(handle);
        self.port = Some(port.to_string());

        info!("connected to {port} (node {node_id:?})");
        Ok(Connected {
            port: port.to_string(),
            node_id,
        })
    }

    /// Close the session if one is open. Close errors are logged, not
    /// returned. Returns whether a session was closed.
    pub fn disconnect(&mut self) -> bool {
        let Some(mut handle) = self.handle.take() else {
            return false;
        };
        if let Err(e) = handle.close() {
            warn!("error closing interface: {e}");
        }
        if let Some(port) = self.port.take() {
            info!("disconnected from {port}");
        }
        true
    }

    /// Broadcast `text`. Returns the text actually sent, or `None` when it
    /// was blank and nothing went out.
    pub fn send(&mut self, text: &str) -> Result<Option<String>> {
        let handle = self.handle.as_mut().ok_or(ConsoleError::NotConnected)?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        handle.send_text(text).map_err(|e| {
            warn!("send failed: {e}");
            ConsoleError::Send(e)
        })?;
        Ok(Some(text.to_string()))
    }

    /// Set the device owner names, then broadcast our position once.
    pub fn set_identity(&mut self, long_name: &str, short_name: &str) -> Result<()> {
        let handle = self.handle.as_mut().ok_or(ConsoleError::NotConnected)?;
        if long_name.is_empty() || short_name.is_empty() {
            return Err(ConsoleError::NamesRequired);
        }
        if short_name.chars().count() != 4 {
            return Err(ConsoleError::ShortNameLength);
        }

        handle
            .set_owner(long_name, short_name)
            .and_then(|()| handle.send_position())
            .map_err(|e| {
                warn!("name update failed: {e}");
                ConsoleError::Identity(e)
            })?;
        info!("name updated: {long_name} ({short_name})");
        Ok(())
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
