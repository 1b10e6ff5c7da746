//! In-memory radio, connector and link that record every platform call.

use crate::error::RadioError;
use crate::gatt::CharacteristicRef;
use crate::manager::Envelope;
use crate::radio::{GattLink, HardwareSink, LinkConnector, LinkId, ScanRadio};
use crossbeam_channel::{unbounded, Receiver};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    StartScan,
    StopScan,
    Connect(String),
    DiscoverServices(LinkId),
    Read(LinkId, CharacteristicRef),
    Disconnect(LinkId),
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<RadioCall>>>);

impl CallLog {
    pub fn push(&self, call: RadioCall) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&RadioCall) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|c| pred(c)).count()
    }
}

pub(crate) fn sink() -> (HardwareSink, Receiver<Envelope>) {
    let (tx, rx) = unbounded();
    (HardwareSink::new(tx), rx)
}

pub struct MockRadio {
    calls: CallLog,
    available: bool,
}

impl MockRadio {
    pub fn new(calls: CallLog) -> Self {
        Self { calls, available: true }
    }

    pub fn unavailable(calls: CallLog) -> Self {
        Self { calls, available: false }
    }
}

impl ScanRadio for MockRadio {
    fn is_available(&self) -> bool {
        self.available
    }

    fn start_scan(&mut self, _on_result: HardwareSink) -> Result<(), RadioError> {
        self.calls.push(RadioCall::StartScan);
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.calls.push(RadioCall::StopScan);
    }
}

/// Hands out links numbered from 1. The sink passed to the most recent
/// `connect` is kept so tests can play the hardware side.
pub struct MockConnector {
    calls: CallLog,
    next_link: u64,
    refuse: bool,
    fail_discovery_request: bool,
    last_sink: Arc<Mutex<Option<HardwareSink>>>,
}

impl MockConnector {
    pub fn new(calls: CallLog) -> Self {
        Self {
            calls,
            next_link: 1,
            refuse: false,
            fail_discovery_request: false,
            last_sink: Arc::new(Mutex::new(None)),
        }
    }

    pub fn refusing(calls: CallLog) -> Self {
        Self {
            refuse: true,
            ..Self::new(calls)
        }
    }

    pub fn failing_discovery(calls: CallLog) -> Self {
        Self {
            fail_discovery_request: true,
            ..Self::new(calls)
        }
    }

    pub fn sink_slot(&self) -> Arc<Mutex<Option<HardwareSink>>> {
        Arc::clone(&self.last_sink)
    }
}

impl LinkConnector for MockConnector {
    fn connect(&mut self, address: &str, events: HardwareSink) -> Result<Box<dyn GattLink>, RadioError> {
        self.calls.push(RadioCall::Connect(address.to_string()));
        if self.refuse {
            return Err(RadioError::PeripheralNotFound(address.to_string()));
        }
        *self.last_sink.lock().unwrap() = Some(events);
        let id = LinkId(self.next_link);
        self.next_link += 1;
        Ok(Box::new(MockLink {
            id,
            calls: self.calls.clone(),
            fail_discovery_request: self.fail_discovery_request,
        }))
    }
}

pub struct MockLink {
    id: LinkId,
    calls: CallLog,
    fail_discovery_request: bool,
}

impl GattLink for MockLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn discover_services(&mut self) -> Result<(), RadioError> {
        self.calls.push(RadioCall::DiscoverServices(self.id));
        if self.fail_discovery_request {
            return Err(RadioError::Platform("GATT busy".to_string()));
        }
        Ok(())
    }

    fn read_characteristic(&mut self, characteristic: &CharacteristicRef) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Read(self.id, *characteristic));
        Ok(())
    }

    fn disconnect(self: Box<Self>) {
        self.calls.push(RadioCall::Disconnect(self.id));
    }
}
