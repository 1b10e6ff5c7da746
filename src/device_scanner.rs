//! # Scan Session Module
//!
//! Owns the discovery loop: starts and stops broadcast scanning on the
//! platform radio and keeps the deduplicated list of peripherals heard
//! during the current scan.
//!
//! ## Behaviour
//! - The discovered set is cleared when a new scan starts, never while one
//!   is running
//! - The first sighting of an address wins; later sightings (including
//!   RSSI changes) are dropped
//! - Names are only trusted while capabilities are granted; otherwise the
//!   peripheral is recorded without one and logged as "Unknown"

use crate::error::{RadioError, SessionError};
use crate::event_log::EventLog;
use crate::gatt::PeripheralRef;
use crate::permission::PermissionGate;
use crate::radio::{HardwareSink, ScanRadio, Sighting};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
}

/// Insertion-ordered peripherals, at most one per address
#[derive(Debug, Default, Clone)]
pub struct DiscoveredSet {
    devices: Vec<PeripheralRef>,
    addresses: HashSet<String>,
}

impl DiscoveredSet {
    /// Adds `peripheral` unless its address is already known
    pub fn insert(&mut self, peripheral: PeripheralRef) -> bool {
        if !self.addresses.insert(peripheral.address.clone()) {
            return false;
        }
        self.devices.push(peripheral);
        true
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.contains(address)
    }

    pub fn get(&self, address: &str) -> Option<&PeripheralRef> {
        self.devices.iter().find(|d| d.address == address)
    }

    pub fn clear(&mut self) {
        self.devices.clear();
        self.addresses.clear();
    }

    pub fn as_slice(&self) -> &[PeripheralRef] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

pub struct ScanSession {
    radio: Box<dyn ScanRadio>,
    state: ScanState,
    discovered: DiscoveredSet,
}

impl ScanSession {
    pub fn new(radio: Box<dyn ScanRadio>) -> Self {
        Self {
            radio,
            state: ScanState::Idle,
            discovered: DiscoveredSet::default(),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        self.state == ScanState::Scanning
    }

    pub fn radio_available(&self) -> bool {
        self.radio.is_available()
    }

    pub fn discovered(&self) -> &DiscoveredSet {
        &self.discovered
    }

    pub fn start(
        &mut self,
        gate: &dyn PermissionGate,
        sink: &HardwareSink,
        log: &mut EventLog,
    ) -> Result<(), SessionError> {
        if !gate.has_required_capabilities() {
            log.append("Cannot start scan: Missing required permissions");
            return Err(SessionError::PermissionDenied);
        }
        if self.is_scanning() {
            log::debug!("Scan session: start requested while already scanning");
            return Ok(());
        }
        if !self.radio.is_available() {
            log.append("Cannot start scan: Scanner not available");
            return Err(SessionError::AdapterUnavailable);
        }
        if let Err(e) = self.radio.start_scan(sink.clone()) {
            log.append(format!("Cannot start scan: {}", e));
            return Err(SessionError::AdapterUnavailable);
        }

        self.discovered.clear();
        self.state = ScanState::Scanning;
        log.append("Started scanning");
        Ok(())
    }

    pub fn stop(&mut self, log: &mut EventLog) {
        if !self.is_scanning() {
            return;
        }
        self.radio.stop_scan();
        self.state = ScanState::Idle;
        log.append("Stopped scanning");
    }

    /// The platform gave up on a scan it had accepted. Lands in `Idle` so
    /// a later `start` can retry.
    pub fn on_scan_failed(&mut self, error: RadioError, log: &mut EventLog) {
        if !self.is_scanning() {
            log::debug!("Scan session: ignoring scan failure while idle: {}", error);
            return;
        }
        self.radio.stop_scan();
        self.state = ScanState::Idle;
        log.append(format!("Cannot start scan: {}", error));
    }

    pub fn on_sighting(&mut self, sighting: Sighting, gate: &dyn PermissionGate, log: &mut EventLog) {
        if !self.is_scanning() {
            log::debug!("Scan session: dropping late sighting of {}", sighting.address);
            return;
        }
        if self.discovered.contains(&sighting.address) {
            return;
        }

        let name = if gate.has_required_capabilities() {
            sighting.name
        } else {
            None
        };
        let peripheral = PeripheralRef {
            address: sighting.address,
            name,
            rssi: sighting.rssi,
        };
        log.append(format!(
            "Found device: {} ({})",
            peripheral.display_name(),
            peripheral.address
        ));
        self.discovered.insert(peripheral);
    }
}
