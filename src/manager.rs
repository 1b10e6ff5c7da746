//! # Session Manager Module
//!
//! The single owner of all mutable Bluetooth session state.
//!
//! ## Key Components
//! - `SessionCore`: Scan session, device session and Event Log, plus the
//!   rules for folding intents and hardware callbacks into them
//! - `SessionManager`: Drains one queue of intents and hardware callbacks on
//!   a dedicated thread and publishes a snapshot after each message
//! - `SessionHandle`: Cloneable front door for presentation code: sends
//!   intents, exposes the read-only state and log views
//!
//! ## Why one queue
//! Hardware callbacks arrive unsolicited from platform threads. Routing
//! them through the same channel as caller intents means no two mutations
//! ever run at once, and each link's callbacks are handled in the order the
//! platform posted them.

use crate::config::Config;
use crate::connection::{ConnectionState, DeviceSession};
use crate::device_scanner::ScanSession;
use crate::error::SessionError;
use crate::event_log::{EventLog, LogView};
use crate::gatt::{CharacteristicRef, PeripheralRef};
use crate::permission::PermissionGate;
use crate::radio::{HardwareEvent, HardwareSink, LinkConnector, ScanRadio};
use crate::state::{SessionSnapshot, StatePublisher, StateView};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Intents issued by presentation code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartScan,
    StopScan,
    Connect(PeripheralRef),
    Disconnect,
    ReadCharacteristic(CharacteristicRef),
    /// Disconnect, stop scanning and stop the manager
    Shutdown,
}

pub(crate) enum Envelope {
    Command(Command),
    Hardware(HardwareEvent),
    /// The last `SessionHandle` was dropped
    Detached,
}

pub struct SessionCore {
    gate: Arc<dyn PermissionGate>,
    scanner: ScanSession,
    device: DeviceSession,
    log: EventLog,
    sink: HardwareSink,
}

impl SessionCore {
    pub(crate) fn new(
        gate: Arc<dyn PermissionGate>,
        radio: Box<dyn ScanRadio>,
        connector: Box<dyn LinkConnector>,
        log_capacity: usize,
        sink: HardwareSink,
    ) -> Self {
        let scanner = ScanSession::new(radio);
        let mut log = EventLog::new(log_capacity);
        log.append(format!("Bluetooth initialized: {}", scanner.radio_available()));

        Self {
            gate,
            scanner,
            device: DeviceSession::new(connector),
            log,
            sink,
        }
    }

    pub fn execute(&mut self, command: Command) -> Result<(), SessionError> {
        let gate = self.gate.as_ref();
        match command {
            Command::StartScan => self.scanner.start(gate, &self.sink, &mut self.log),
            Command::StopScan => {
                self.scanner.stop(&mut self.log);
                Ok(())
            }
            Command::Connect(peripheral) => {
                self.device.connect(peripheral, gate, &self.sink, &mut self.log)
            }
            Command::Disconnect => {
                self.device.disconnect();
                Ok(())
            }
            Command::ReadCharacteristic(characteristic) => {
                self.device.read_characteristic(characteristic, gate, &mut self.log)
            }
            Command::Shutdown => {
                self.shutdown();
                Ok(())
            }
        }
    }

    pub fn on_hardware(&mut self, event: HardwareEvent) {
        let gate = self.gate.as_ref();
        match event {
            HardwareEvent::Discovered(sighting) => {
                self.scanner.on_sighting(sighting, gate, &mut self.log)
            }
            HardwareEvent::ScanFailed(error) => self.scanner.on_scan_failed(error, &mut self.log),
            HardwareEvent::LinkStateChanged { link, state } => {
                self.device.on_link_state(link, state, gate, &mut self.log)
            }
            HardwareEvent::ServicesDiscovered { link, result } => {
                self.device.on_services_discovered(link, result, &mut self.log)
            }
            HardwareEvent::CharacteristicRead {
                link,
                characteristic,
                result,
            } => self
                .device
                .on_characteristic_read(link, characteristic, result, &mut self.log),
        }
    }

    /// Release the link and the scanner
    pub fn shutdown(&mut self) {
        self.device.disconnect();
        self.scanner.stop(&mut self.log);
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.device.state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            scanning: self.scanner.is_scanning(),
            devices: self.scanner.discovered().as_slice().to_vec(),
            connection: self.device.state(),
            connected_peripheral: self.device.connected_peripheral().cloned(),
            services: self.device.services().to_vec(),
            log_revision: self.log.revision(),
        }
    }

    pub fn log_view(&self) -> LogView {
        self.log.view()
    }
}

/// Runs the session core on its own thread.
///
/// Mirrors a connection manager loop: block on the inbox, handle one
/// message, publish, repeat until told to shut down.
pub struct SessionManager {
    core: SessionCore,
    inbox: Receiver<Envelope>,
    publisher: StatePublisher,
}

impl SessionManager {
    /// Creates a new SessionManager.
    ///
    /// Returns the manager and a handle for issuing intents and observing
    /// state from other threads.
    pub fn new(
        gate: Arc<dyn PermissionGate>,
        radio: Box<dyn ScanRadio>,
        connector: Box<dyn LinkConnector>,
        config: &Config,
    ) -> (Self, SessionHandle) {
        let (sender, inbox) = unbounded();
        let core = SessionCore::new(
            gate,
            radio,
            connector,
            config.effective_log_capacity(),
            HardwareSink::new(sender.clone()),
        );
        let (publisher, state) = StatePublisher::new();
        publisher.publish(core.snapshot());

        let handle = SessionHandle {
            commands: Arc::new(CommandSender(sender)),
            state,
            log: core.log_view(),
        };
        let manager = SessionManager {
            core,
            inbox,
            publisher,
        };
        (manager, handle)
    }

    /// Runs the session loop until a `Shutdown` command arrives or every
    /// `SessionHandle` has been dropped.
    ///
    /// The core keeps a sender into the inbox for hardware callbacks, so the
    /// channel never closes on its own; dropped handles post `Detached`.
    pub fn run(mut self) {
        log::info!("Session manager: running");

        while let Ok(envelope) = self.inbox.recv() {
            match envelope {
                Envelope::Command(Command::Shutdown) | Envelope::Detached => {
                    self.core.shutdown();
                    self.publisher.publish(self.core.snapshot());
                    break;
                }
                Envelope::Command(command) => {
                    log::debug!("Session manager: {:?}", command);
                    if let Err(e) = self.core.execute(command) {
                        log::warn!("Session manager: intent rejected: {}", e);
                    }
                }
                Envelope::Hardware(event) => {
                    log::trace!("Session manager: {:?}", event);
                    self.core.on_hardware(event);
                }
            }
            self.publisher.publish(self.core.snapshot());
        }

        log::info!("Session manager: shutting down");
    }

    /// Runs the loop on a named background thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("ble-session".to_string())
            .spawn(move || self.run())
    }
}

/// Shared by every clone of a `SessionHandle`; tells the manager when the
/// last one goes away
struct CommandSender(Sender<Envelope>);

impl Drop for CommandSender {
    fn drop(&mut self) {
        // Fails only if the manager already stopped
        let _ = self.0.send(Envelope::Detached);
    }
}

#[derive(Clone)]
pub struct SessionHandle {
    commands: Arc<CommandSender>,
    state: StateView,
    log: LogView,
}

impl SessionHandle {
    pub fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .0
            .send(Envelope::Command(command))
            .map_err(|_| SessionError::ManagerStopped)
    }

    pub fn start_scan(&self) -> Result<(), SessionError> {
        self.send(Command::StartScan)
    }

    pub fn stop_scan(&self) -> Result<(), SessionError> {
        self.send(Command::StopScan)
    }

    pub fn connect(&self, peripheral: PeripheralRef) -> Result<(), SessionError> {
        self.send(Command::Connect(peripheral))
    }

    pub fn disconnect(&self) -> Result<(), SessionError> {
        self.send(Command::Disconnect)
    }

    pub fn read_characteristic(&self, characteristic: CharacteristicRef) -> Result<(), SessionError> {
        self.send(Command::ReadCharacteristic(characteristic))
    }

    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.send(Command::Shutdown)
    }

    pub fn state(&self) -> &StateView {
        &self.state
    }

    pub fn log(&self) -> &LogView {
        &self.log
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }
}
