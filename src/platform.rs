//! # btleplug Backend
//!
//! Implements the radio contracts on top of `btleplug` and a tokio runtime.
//!
//! ## Key Components
//! - `BtleplugBackend`: Finds the first adapter; splits into the two halves
//! - `BtleplugRadio`: Scanning. One control task applies start/stop
//!   requests to the adapter strictly in order; each scan runs as a child
//!   task fed by the adapter's central event stream
//! - `BtleplugConnector` / `BtleplugLink`: One tokio task per link that
//!   owns the peripheral, runs discover/read/disconnect requests in order
//!   and reports completions and drops through the `HardwareSink`
//!
//! Nothing here blocks the caller: every trait method spawns or enqueues
//! work on the runtime and returns.

use crate::error::{RadioError, ScanError};
use crate::gatt::{CharacteristicNode, CharacteristicRef, ServiceNode};
use crate::radio::{
    GattLink, HardwareEvent, HardwareSink, LinkConnector, LinkId, LinkState, ScanRadio, Sighting,
};
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use std::future::Future;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub struct BtleplugBackend {
    runtime: Handle,
    adapter: Option<Adapter>,
}

impl BtleplugBackend {
    /// Connects to the platform Bluetooth manager and picks the first adapter.
    ///
    /// A machine without an adapter still yields a backend; it just reports
    /// itself unavailable.
    pub async fn new(runtime: Handle) -> Result<Self, ScanError> {
        let manager = Manager::new()
            .await
            .map_err(|e| ScanError::ManagerInit(e.to_string()))?;

        let adapters = manager
            .adapters()
            .await
            .map_err(|e| ScanError::AdapterQuery(e.to_string()))?;

        let adapter = adapters.into_iter().next();
        if adapter.is_none() {
            log::warn!("No Bluetooth adapters found");
        }

        Ok(Self { runtime, adapter })
    }

    pub fn split(self) -> (BtleplugRadio, BtleplugConnector) {
        let control = self.adapter.clone().map(|adapter| {
            let (control, requests) = mpsc::unbounded_channel();
            self.runtime.spawn(scan_control(adapter, requests));
            control
        });
        let radio = BtleplugRadio { control };
        let connector = BtleplugConnector {
            runtime: self.runtime,
            adapter: self.adapter,
            next_link: 1,
        };
        (radio, connector)
    }
}

enum ScanOp {
    Start(HardwareSink),
    Stop,
}

pub struct BtleplugRadio {
    control: Option<mpsc::UnboundedSender<ScanOp>>,
}

impl ScanRadio for BtleplugRadio {
    fn is_available(&self) -> bool {
        self.control.as_ref().is_some_and(|c| !c.is_closed())
    }

    fn start_scan(&mut self, on_result: HardwareSink) -> Result<(), RadioError> {
        let control = self.control.as_ref().ok_or(RadioError::NoAdapter)?;
        control
            .send(ScanOp::Start(on_result))
            .map_err(|_| RadioError::Platform("Scan control task stopped".to_string()))
    }

    fn stop_scan(&mut self) {
        if let Some(control) = &self.control {
            let _ = control.send(ScanOp::Stop);
        }
    }
}

/// The adapter operations the scan control task sequences
trait ScanDriver: Clone + Send + 'static {
    /// Runs one scan until aborted or failed
    fn scan(self, sink: HardwareSink) -> impl Future<Output = ()> + Send + 'static;

    fn stop(self) -> impl Future<Output = ()> + Send;
}

impl ScanDriver for Adapter {
    fn scan(self, sink: HardwareSink) -> impl Future<Output = ()> + Send + 'static {
        scan_loop(self, sink)
    }

    fn stop(self) -> impl Future<Output = ()> + Send {
        async move {
            if let Err(e) = self.stop_scan().await {
                log::warn!("Failed to stop scan: {}", e);
            }
        }
    }
}

/// Applies scan requests one at a time. A running scan is aborted and
/// awaited before the next request touches the adapter, so a stop can never
/// land after the start that followed it.
async fn scan_control<D: ScanDriver>(driver: D, mut requests: mpsc::UnboundedReceiver<ScanOp>) {
    let mut active: Option<JoinHandle<()>> = None;

    while let Some(op) = requests.recv().await {
        if let Some(task) = active.take() {
            task.abort();
            let _ = task.await;
        }
        match op {
            ScanOp::Start(sink) => {
                active = Some(tokio::spawn(driver.clone().scan(sink)));
            }
            ScanOp::Stop => driver.clone().stop().await,
        }
    }

    if let Some(task) = active {
        task.abort();
    }
}

async fn scan_loop(adapter: Adapter, sink: HardwareSink) {
    if let Err(e) = run_scan(&adapter, &sink).await {
        log::error!("Scan failed: {}", e);
        sink.emit(HardwareEvent::ScanFailed(e));
    }
}

async fn run_scan(adapter: &Adapter, sink: &HardwareSink) -> Result<(), RadioError> {
    let mut events = adapter.events().await?;
    adapter.start_scan(ScanFilter::default()).await?;

    while let Some(event) = events.next().await {
        let id = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
            _ => continue,
        };
        let Ok(peripheral) = adapter.peripheral(&id).await else {
            continue;
        };
        let properties = match peripheral.properties().await {
            Ok(Some(properties)) => properties,
            Ok(None) => continue,
            Err(e) => {
                log::debug!("Could not read peripheral properties: {}", e);
                continue;
            }
        };

        let sighting = Sighting {
            address: properties.address.to_string(),
            name: properties.local_name,
            rssi: properties.rssi.unwrap_or_default(),
        };
        if !sink.emit(HardwareEvent::Discovered(sighting)) {
            return Ok(());
        }
    }

    Err(RadioError::Platform("Adapter event stream ended".to_string()))
}

pub struct BtleplugConnector {
    runtime: Handle,
    adapter: Option<Adapter>,
    next_link: u64,
}

impl LinkConnector for BtleplugConnector {
    fn connect(&mut self, address: &str, events: HardwareSink) -> Result<Box<dyn GattLink>, RadioError> {
        let adapter = self.adapter.clone().ok_or(RadioError::NoAdapter)?;
        let id = LinkId(self.next_link);
        self.next_link += 1;

        let (ops, requests) = mpsc::unbounded_channel();
        self.runtime
            .spawn(link_task(adapter, address.to_string(), id, requests, events));

        Ok(Box::new(BtleplugLink { id, ops }))
    }
}

#[derive(Debug)]
enum LinkOp {
    DiscoverServices,
    Read(CharacteristicRef),
    Disconnect,
}

pub struct BtleplugLink {
    id: LinkId,
    ops: mpsc::UnboundedSender<LinkOp>,
}

impl GattLink for BtleplugLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn discover_services(&mut self) -> Result<(), RadioError> {
        self.ops
            .send(LinkOp::DiscoverServices)
            .map_err(|_| RadioError::LinkClosed)
    }

    fn read_characteristic(&mut self, characteristic: &CharacteristicRef) -> Result<(), RadioError> {
        self.ops
            .send(LinkOp::Read(*characteristic))
            .map_err(|_| RadioError::LinkClosed)
    }

    fn disconnect(self: Box<Self>) {
        let _ = self.ops.send(LinkOp::Disconnect);
    }
}

async fn link_task(
    adapter: Adapter,
    address: String,
    link: LinkId,
    mut requests: mpsc::UnboundedReceiver<LinkOp>,
    sink: HardwareSink,
) {
    if let Err(e) = run_link(&adapter, &address, link, &mut requests, &sink).await {
        log::warn!("{} to {} ended: {}", link, address, e);
    }
    sink.emit(HardwareEvent::LinkStateChanged {
        link,
        state: LinkState::Disconnected,
    });
}

async fn run_link(
    adapter: &Adapter,
    address: &str,
    link: LinkId,
    requests: &mut mpsc::UnboundedReceiver<LinkOp>,
    sink: &HardwareSink,
) -> Result<(), RadioError> {
    let peripheral = find_peripheral(adapter, address).await?;
    let mut events = adapter.events().await?;

    log::info!("Connecting {} to {}", link, address);
    peripheral.connect().await?;
    sink.emit(HardwareEvent::LinkStateChanged {
        link,
        state: LinkState::Connected,
    });

    let peripheral_id = peripheral.id();
    loop {
        tokio::select! {
            op = requests.recv() => match op {
                Some(LinkOp::DiscoverServices) => {
                    let result = match peripheral.discover_services().await {
                        Ok(()) => Ok(service_tree(&peripheral)),
                        Err(e) => Err(RadioError::from(e)),
                    };
                    sink.emit(HardwareEvent::ServicesDiscovered { link, result });
                }
                Some(LinkOp::Read(characteristic)) => {
                    let result = read(&peripheral, &characteristic).await;
                    sink.emit(HardwareEvent::CharacteristicRead { link, characteristic, result });
                }
                Some(LinkOp::Disconnect) | None => {
                    if let Err(e) = peripheral.disconnect().await {
                        log::warn!("Failed to disconnect {}: {}", address, e);
                    }
                    return Ok(());
                }
            },
            event = events.next() => match event {
                Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral_id => {
                    return Ok(());
                }
                Some(_) => {}
                None => return Err(RadioError::LinkClosed),
            },
        }
    }
}

async fn find_peripheral(adapter: &Adapter, address: &str) -> Result<Peripheral, RadioError> {
    adapter
        .peripherals()
        .await?
        .into_iter()
        .find(|p| p.address().to_string() == address)
        .ok_or_else(|| RadioError::PeripheralNotFound(address.to_string()))
}

fn service_tree(peripheral: &Peripheral) -> Vec<ServiceNode> {
    peripheral
        .services()
        .into_iter()
        .map(|service| ServiceNode {
            uuid: Uuid::from_u128(service.uuid.as_u128()),
            characteristics: service
                .characteristics
                .into_iter()
                .map(|c| CharacteristicNode {
                    uuid: Uuid::from_u128(c.uuid.as_u128()),
                    properties: c.properties.into(),
                })
                .collect(),
        })
        .collect()
}

async fn read(peripheral: &Peripheral, target: &CharacteristicRef) -> Result<Vec<u8>, RadioError> {
    let characteristic = peripheral
        .characteristics()
        .into_iter()
        .find(|c| {
            c.uuid.as_u128() == target.characteristic.as_u128()
                && c.service_uuid.as_u128() == target.service.as_u128()
        })
        .ok_or_else(|| RadioError::CharacteristicNotFound(target.characteristic.to_string()))?;

    Ok(peripheral.read(&characteristic).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records when scans begin and when stops complete; stops are slow
    #[derive(Clone, Default)]
    struct RecordingDriver {
        events: Arc<Mutex<Vec<&'static str>>>,
    }

    impl RecordingDriver {
        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ScanDriver for RecordingDriver {
        fn scan(self, _sink: HardwareSink) -> impl Future<Output = ()> + Send + 'static {
            async move {
                self.events.lock().unwrap().push("scan");
                std::future::pending::<()>().await
            }
        }

        fn stop(self) -> impl Future<Output = ()> + Send {
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.events.lock().unwrap().push("stop");
            }
        }
    }

    async fn wait_for_events(driver: &RecordingDriver, count: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(2), async {
            while driver.events().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "saw only {:?}", driver.events());
    }

    #[tokio::test]
    async fn test_restart_waits_for_pending_stop() {
        let driver = RecordingDriver::default();
        let (control, requests) = mpsc::unbounded_channel();
        let task = tokio::spawn(scan_control(driver.clone(), requests));
        let (sink, _rx) = mock::sink();

        control.send(ScanOp::Stop).unwrap();
        control.send(ScanOp::Start(sink)).unwrap();
        wait_for_events(&driver, 2).await;
        assert_eq!(driver.events(), vec!["stop", "scan"]);

        drop(control);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_after_running_scan_completes_before_next_start() {
        let driver = RecordingDriver::default();
        let (control, requests) = mpsc::unbounded_channel();
        let task = tokio::spawn(scan_control(driver.clone(), requests));
        let (sink, _rx) = mock::sink();

        control.send(ScanOp::Start(sink.clone())).unwrap();
        wait_for_events(&driver, 1).await;
        control.send(ScanOp::Stop).unwrap();
        control.send(ScanOp::Start(sink)).unwrap();
        wait_for_events(&driver, 3).await;
        assert_eq!(driver.events(), vec!["scan", "stop", "scan"]);

        drop(control);
        task.await.unwrap();
    }
}
