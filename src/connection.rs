//! # Device Session Module
//!
//! Owns the single active peripheral connection and its GATT service tree.
//!
//! ## State Machine
//! ```text
//! Disconnected --connect()--------------------> Connecting
//! Connecting   --link established-------------> Connected
//! Connected    --capabilities ok, discover----> DiscoveringServices
//! Connected    --capabilities lost------------> Disconnected (forced)
//! DiscoveringServices --discovery ok----------> Ready
//! DiscoveringServices --discovery failed------> DiscoveringServices
//! Connecting | DiscoveringServices | Ready --link dropped--> Disconnected
//! ```
//!
//! `disconnect()` only asks the link to go away. The move to `Disconnected`
//! happens when the link-dropped callback arrives, except for the forced
//! disconnect above, which is immediate.
//!
//! ## Stale callbacks
//! Every callback carries the `LinkId` it belongs to. Callbacks for any link
//! other than the current one are ignored, as are callbacks that make no
//! sense in the current state (e.g. discovery results after a drop).

use crate::error::{RadioError, SessionError};
use crate::event_log::EventLog;
use crate::gatt::{hex_string, CharacteristicRef, PeripheralRef, ServiceNode};
use crate::permission::PermissionGate;
use crate::radio::{GattLink, HardwareSink, LinkConnector, LinkId, LinkState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    DiscoveringServices,
    Ready,
}

impl ConnectionState {
    /// True from `Connected` onwards
    pub fn is_linked(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::DiscoveringServices | ConnectionState::Ready
        )
    }
}

pub struct DeviceSession {
    connector: Box<dyn LinkConnector>,
    state: ConnectionState,
    target: Option<PeripheralRef>,
    connected: Option<PeripheralRef>,
    services: Vec<ServiceNode>,
    link: Option<Box<dyn GattLink>>,
    /// Link whose callbacks are still accepted; outlives `link` after a
    /// requested disconnect until the drop arrives
    link_id: Option<LinkId>,
}

impl DeviceSession {
    pub fn new(connector: Box<dyn LinkConnector>) -> Self {
        Self {
            connector,
            state: ConnectionState::Disconnected,
            target: None,
            connected: None,
            services: Vec::new(),
            link: None,
            link_id: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connected_peripheral(&self) -> Option<&PeripheralRef> {
        self.connected.as_ref()
    }

    pub fn services(&self) -> &[ServiceNode] {
        &self.services
    }

    pub fn has_link(&self) -> bool {
        self.link.is_some()
    }

    pub fn connect(
        &mut self,
        peripheral: PeripheralRef,
        gate: &dyn PermissionGate,
        sink: &HardwareSink,
        log: &mut EventLog,
    ) -> Result<(), SessionError> {
        if !gate.has_required_capabilities() {
            log.append("Cannot connect: Missing required permissions");
            return Err(SessionError::PermissionDenied);
        }
        let busy = match self.state {
            ConnectionState::Disconnected => None,
            ConnectionState::Connecting => Some(SessionError::AlreadyConnecting),
            _ => Some(SessionError::AlreadyConnected),
        };
        if let Some(e) = busy {
            log.append(format!("Cannot connect to {}: {}", peripheral.display_name(), e));
            return Err(e);
        }

        log.append(format!("Connecting to device: {}", peripheral.display_name()));
        match self.connector.connect(&peripheral.address, sink.clone()) {
            Ok(link) => {
                self.link_id = Some(link.id());
                self.link = Some(link);
                self.target = Some(peripheral);
                self.state = ConnectionState::Connecting;
                Ok(())
            }
            Err(e) => {
                log.append(format!("Cannot connect: {}", e));
                Err(e.into())
            }
        }
    }

    /// Ask the current link to go away. No-op without a link.
    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            log::debug!("Device session: disconnecting {}", link.id());
            link.disconnect();
        }
    }

    pub fn read_characteristic(
        &mut self,
        characteristic: CharacteristicRef,
        gate: &dyn PermissionGate,
        log: &mut EventLog,
    ) -> Result<(), SessionError> {
        if !gate.has_required_capabilities() {
            log.append("Cannot read characteristic: Missing required permissions");
            return Err(SessionError::PermissionDenied);
        }
        let Some(link) = self.link.as_mut() else {
            log::debug!(
                "Device session: no link, dropping read of {}",
                characteristic.characteristic
            );
            return Ok(());
        };
        if let Err(e) = link.read_characteristic(&characteristic) {
            log.append(format!("Cannot read characteristic: {}", e));
            return Err(e.into());
        }
        Ok(())
    }

    pub fn on_link_state(
        &mut self,
        link: LinkId,
        state: LinkState,
        gate: &dyn PermissionGate,
        log: &mut EventLog,
    ) {
        if !self.accepts(link) {
            return;
        }
        match state {
            LinkState::Connected => self.on_link_established(gate, log),
            LinkState::Disconnected => self.on_link_dropped(log),
        }
    }

    pub fn on_services_discovered(
        &mut self,
        link: LinkId,
        result: Result<Vec<ServiceNode>, RadioError>,
        log: &mut EventLog,
    ) {
        if !self.accepts(link) {
            return;
        }
        if self.state != ConnectionState::DiscoveringServices {
            log::debug!("Device session: ignoring discovery result in state {:?}", self.state);
            return;
        }
        match result {
            Ok(services) => {
                log.append(format!("Discovered {} services", services.len()));
                self.services = services;
                self.state = ConnectionState::Ready;
            }
            Err(e) => {
                log::warn!("Device session: {}: {}", SessionError::DiscoveryFailed, e);
                log.append(format!("{}: {}", SessionError::DiscoveryFailed, e));
            }
        }
    }

    pub fn on_characteristic_read(
        &mut self,
        link: LinkId,
        characteristic: CharacteristicRef,
        result: Result<Vec<u8>, RadioError>,
        log: &mut EventLog,
    ) {
        if !self.accepts(link) {
            return;
        }
        match result {
            Ok(value) => log.append(format!(
                "Read characteristic {}: {}",
                characteristic.characteristic,
                hex_string(&value)
            )),
            Err(e) => log::debug!(
                "Device session: read of {} failed: {}",
                characteristic.characteristic,
                e
            ),
        }
    }

    fn accepts(&self, link: LinkId) -> bool {
        if self.link_id == Some(link) {
            return true;
        }
        log::debug!("Device session: ignoring callback from stale {}", link);
        false
    }

    fn on_link_established(&mut self, gate: &dyn PermissionGate, log: &mut EventLog) {
        if self.state != ConnectionState::Connecting {
            log::debug!("Device session: link established in state {:?}", self.state);
            return;
        }
        if self.link.is_none() {
            // disconnect() already went out; wait for the drop
            return;
        }

        self.state = ConnectionState::Connected;
        self.connected = self.target.clone();
        let name = self
            .connected
            .as_ref()
            .map(|p| p.display_name().to_string())
            .unwrap_or_default();
        log.append(format!("Connected to device: {}", name));

        if !gate.has_required_capabilities() {
            log.append("Cannot discover services: Missing required permissions");
            self.force_disconnect(log);
            return;
        }
        let requested = match self.link.as_mut() {
            Some(link) => link.discover_services(),
            None => Err(RadioError::LinkClosed),
        };
        match requested {
            Ok(()) => self.state = ConnectionState::DiscoveringServices,
            Err(e) => {
                log.append(format!("Cannot discover services: {}", e));
                self.force_disconnect(log);
            }
        }
    }

    fn on_link_dropped(&mut self, log: &mut EventLog) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        if self.link.is_some() {
            log::warn!("Device session: {}", SessionError::LinkLost);
        }
        self.reset();
        log.append("Disconnected from device");
    }

    /// Tears the link down and lands in `Disconnected` right away. The
    /// platform's own drop callback for this link is ignored afterwards.
    fn force_disconnect(&mut self, log: &mut EventLog) {
        if let Some(link) = self.link.take() {
            link.disconnect();
        }
        self.reset();
        log.append("Disconnected from device");
    }

    fn reset(&mut self) {
        self.link = None;
        self.link_id = None;
        self.target = None;
        self.connected = None;
        self.services.clear();
        self.state = ConnectionState::Disconnected;
    }
}
