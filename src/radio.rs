//! # Radio Contracts
//!
//! The seams between the session core and a platform Bluetooth stack.
//!
//! ## Key Components
//! - `ScanRadio`: Start/stop broadcast scanning; owned by the scan session
//! - `LinkConnector`: Opens a link to a peripheral by address
//! - `GattLink`: One open (or opening) link; owned by the device session
//! - `HardwareEvent`: Everything the platform reports back, unsolicited
//! - `HardwareSink`: Where platform code posts `HardwareEvent`s
//!
//! None of the trait methods wait for the hardware. They issue a request and
//! return; the outcome arrives later as a `HardwareEvent` on the sink, which
//! feeds the same queue as caller intents.

use crate::error::RadioError;
use crate::gatt::{CharacteristicRef, ServiceNode};
use crate::manager::Envelope;
use crossbeam_channel::Sender;
use std::fmt;

/// Identifies one connection attempt, so late callbacks from an earlier
/// link can be told apart from the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// One advertisement heard during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub address: String,
    pub name: Option<String>,
    pub rssi: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareEvent {
    Discovered(Sighting),
    /// A scan accepted by `start_scan` could not be carried out
    ScanFailed(RadioError),
    LinkStateChanged {
        link: LinkId,
        state: LinkState,
    },
    ServicesDiscovered {
        link: LinkId,
        result: Result<Vec<ServiceNode>, RadioError>,
    },
    CharacteristicRead {
        link: LinkId,
        characteristic: CharacteristicRef,
        result: Result<Vec<u8>, RadioError>,
    },
}

/// Posts hardware callbacks into the session manager's queue
#[derive(Clone)]
pub struct HardwareSink {
    sender: Sender<Envelope>,
}

impl HardwareSink {
    pub(crate) fn new(sender: Sender<Envelope>) -> Self {
        Self { sender }
    }

    /// Returns false once the session manager has gone away, so platform
    /// tasks know to stop producing
    pub fn emit(&self, event: HardwareEvent) -> bool {
        self.sender.send(Envelope::Hardware(event)).is_ok()
    }
}

pub trait ScanRadio: Send {
    fn is_available(&self) -> bool;

    /// Begin scanning; every sighting is posted to `on_result`
    fn start_scan(&mut self, on_result: HardwareSink) -> Result<(), RadioError>;

    fn stop_scan(&mut self);
}

pub trait LinkConnector: Send {
    /// Request a link to `address`. Link state changes, discovery and read
    /// completions for the returned link are posted to `events`.
    fn connect(&mut self, address: &str, events: HardwareSink) -> Result<Box<dyn GattLink>, RadioError>;
}

pub trait GattLink: Send {
    fn id(&self) -> LinkId;

    fn discover_services(&mut self) -> Result<(), RadioError>;

    fn read_characteristic(&mut self, characteristic: &CharacteristicRef) -> Result<(), RadioError>;

    /// Tear the link down. A `LinkState::Disconnected` event follows.
    fn disconnect(self: Box<Self>);
}
