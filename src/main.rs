//! Command-line front end: scan, optionally inspect one peripheral, then
//! print the session log.
//!
//! Usage: `ble-inspector [ADDRESS]`

use ble_inspector::platform::BtleplugBackend;
use ble_inspector::{
    CapabilitySwitch, Config, ConnectionState, PeripheralRef, SessionHandle, SessionManager,
    SessionSnapshot,
};
use crossbeam_channel::Receiver;
use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

fn main() {
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str()))
        .init();
    if let Some(e) = config_error {
        log::warn!("{}; using defaults", e);
    }

    let target = std::env::args().nth(1);
    if let Err(e) = run(&config, target) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config, target: Option<String>) -> Result<(), Box<dyn Error>> {
    let runtime = Runtime::new()?;
    let backend = runtime.block_on(BtleplugBackend::new(runtime.handle().clone()))?;
    let (radio, connector) = backend.split();

    let gate = Arc::new(CapabilitySwitch::default());
    let (manager, session) = SessionManager::new(gate, Box::new(radio), Box::new(connector), config);
    let worker = manager.spawn()?;

    let updates = session.state().subscribe();
    println!("Scanning for {} seconds...", config.scan_duration_secs);
    session.start_scan()?;
    thread::sleep(Duration::from_secs(config.scan_duration_secs));
    session.stop_scan()?;
    wait_until(&updates, STOP_TIMEOUT, |s| !s.scanning);
    drop(updates);

    let snapshot = session.snapshot();
    if snapshot.devices.is_empty() {
        println!("No devices found.");
    }
    for device in &snapshot.devices {
        println!("{:<20} {:>5} dBm  {}", device.address, device.rssi, device.display_name());
    }

    if let Some(address) = target {
        let peripheral = snapshot
            .devices
            .iter()
            .find(|d| d.address.eq_ignore_ascii_case(&address))
            .cloned()
            .unwrap_or_else(|| PeripheralRef::new(address));
        inspect(&session, peripheral, Duration::from_secs(config.connect_timeout_secs))?;
    }

    session.shutdown()?;
    if worker.join().is_err() {
        log::error!("Session manager thread panicked");
    }

    println!();
    println!("Session log (newest first):");
    for entry in session.log().newest_first() {
        println!("  {}", entry);
    }
    Ok(())
}

fn inspect(
    session: &SessionHandle,
    peripheral: PeripheralRef,
    timeout: Duration,
) -> Result<(), Box<dyn Error>> {
    let updates = session.state().subscribe();
    let baseline = session.snapshot().log_revision;
    session.connect(peripheral)?;

    let Some(ready) = wait_for_ready(&updates, baseline, timeout) else {
        println!("Device did not become ready.");
        session.disconnect()?;
        return Ok(());
    };

    let mut readable = 0;
    for service in &ready.services {
        println!("Service {}", service.uuid);
        for (characteristic, reference) in service.characteristics.iter().zip(service.characteristic_refs()) {
            let props = characteristic.properties;
            println!(
                "  Characteristic {} [{}{}{}]",
                characteristic.uuid,
                if props.read { "R" } else { "-" },
                if props.write { "W" } else { "-" },
                if props.notify { "N" } else { "-" },
            );
            if props.read {
                session.read_characteristic(reference)?;
                readable += 1;
            }
        }
    }

    let reads_done = || {
        session
            .log()
            .entries()
            .iter()
            .filter(|e| e.message.starts_with("Read characteristic"))
            .count()
            >= readable
    };
    if readable > 0 && !wait_until(&updates, READ_TIMEOUT, |_| reads_done()) {
        println!("Some reads did not complete.");
    }

    session.disconnect()?;
    wait_until(&updates, DISCONNECT_TIMEOUT, |s| {
        s.connection == ConnectionState::Disconnected
    });
    Ok(())
}

/// Waits for `Ready`; gives up if the attempt falls back to `Disconnected`.
///
/// A connect refused outright never leaves `Disconnected`, it only adds a
/// log entry past `baseline`.
fn wait_for_ready(
    updates: &Receiver<SessionSnapshot>,
    baseline: u64,
    timeout: Duration,
) -> Option<SessionSnapshot> {
    let deadline = Instant::now() + timeout;
    let mut attempted = false;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        let snapshot = updates.recv_timeout(remaining).ok()?;
        match snapshot.connection {
            ConnectionState::Ready => return Some(snapshot),
            ConnectionState::Disconnected if attempted => return None,
            ConnectionState::Disconnected if snapshot.log_revision > baseline => return None,
            ConnectionState::Disconnected => {}
            _ => attempted = true,
        }
    }
}

fn wait_until(
    updates: &Receiver<SessionSnapshot>,
    timeout: Duration,
    done: impl Fn(&SessionSnapshot) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            return false;
        };
        match updates.recv_timeout(remaining) {
            Ok(snapshot) if done(&snapshot) => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn snapshot(connection: ConnectionState, log_revision: u64) -> SessionSnapshot {
        SessionSnapshot {
            connection,
            log_revision,
            ..SessionSnapshot::default()
        }
    }

    #[test]
    fn test_refused_connect_ends_wait_early() {
        let (tx, rx) = unbounded();
        tx.send(snapshot(ConnectionState::Disconnected, 7)).unwrap();
        tx.send(snapshot(ConnectionState::Disconnected, 8)).unwrap();

        let started = Instant::now();
        assert!(wait_for_ready(&rx, 7, Duration::from_secs(30)).is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_returns_ready_snapshot() {
        let (tx, rx) = unbounded();
        tx.send(snapshot(ConnectionState::Disconnected, 7)).unwrap();
        tx.send(snapshot(ConnectionState::Connecting, 8)).unwrap();
        tx.send(snapshot(ConnectionState::DiscoveringServices, 9)).unwrap();
        tx.send(snapshot(ConnectionState::Ready, 10)).unwrap();

        let ready = wait_for_ready(&rx, 7, Duration::from_secs(5)).unwrap();
        assert_eq!(ready.log_revision, 10);
    }

    #[test]
    fn test_link_drop_after_attempt_ends_wait() {
        let (tx, rx) = unbounded();
        tx.send(snapshot(ConnectionState::Connecting, 8)).unwrap();
        tx.send(snapshot(ConnectionState::Disconnected, 9)).unwrap();

        assert!(wait_for_ready(&rx, 7, Duration::from_secs(30)).is_none());
    }
}
