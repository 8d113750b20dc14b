//! Event subscription manager.
//!
//! Subscribes to the D-Bus signals and property changes behind the
//! [`NetworkEvent`](crate::models::NetworkEvent) stream: per-device state
//! transitions, IP configuration changes, device add/remove, primary
//! connection changes, and scan completion. All raw notifications are
//! funneled through the state translator and address deduplicator before
//! anything reaches the consumer channel.

use futures::future::ready;
use futures::stream::{BoxStream, SelectAll, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use zbus::Connection;
use zvariant::OwnedObjectPath;

use crate::Result;
use crate::catalog;
use crate::config::ServiceConfig;
use crate::constants::{bus, device_type};
use crate::dedup::{AddressDeduplicator, AddressEvent, is_link_local};
use crate::device;
use crate::models::{InterfaceRole, InterfaceState, IpFamily, NetworkEvent, SyncError};
use crate::proxies::{
    NMActiveConnectionProxy, NMDeviceProxy, NMIp4ConfigProxy, NMIp6ConfigProxy, NMProxy,
    NMWirelessProxy,
};
use crate::translate::StateTranslator;

/// Internal notification shape all subscribed streams are mapped into
/// before merging.
#[derive(Debug)]
enum BusEvent {
    DeviceState {
        interface: String,
        role: InterfaceRole,
        new_state: u32,
        reason: u32,
    },
    IpConfig {
        interface: String,
        family: IpFamily,
        config_path: OwnedObjectPath,
    },
    DeviceAdded(OwnedObjectPath),
    DeviceRemoved(OwnedObjectPath),
    PrimaryChanged(OwnedObjectPath),
    ScanCompleted,
}

type EventStream = BoxStream<'static, BusEvent>;

/// Monitor lifecycle states.
mod run_state {
    pub const STOPPED: u8 = 0;
    pub const STARTING: u8 = 1;
    pub const RUNNING: u8 = 2;
    pub const STOPPING: u8 = 3;
}

/// Arms the next `AvailableSsids` emission.
///
/// Scan completions are frequent (the daemon rescans on its own); results
/// are only forwarded when a caller asked for them, optionally narrowed to
/// one SSID.
#[derive(Debug, Default)]
pub(crate) struct ScanGate {
    armed: AtomicBool,
    filter: Mutex<Option<String>>,
}

impl ScanGate {
    pub(crate) async fn arm(&self, filter: Option<String>) {
        *self.filter.lock().await = filter;
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Closes the gate without firing, dropping any pending filter.
    pub(crate) async fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
        self.filter.lock().await.take();
    }

    /// Disarms and returns the pending filter, or `None` when not armed.
    async fn take(&self) -> Option<Option<String>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            Some(self.filter.lock().await.take())
        } else {
            None
        }
    }
}

/// Owns the background monitoring task.
///
/// `start` is idempotent: a second start while the loop runs leaves it
/// alone and reports success.
#[derive(Debug, Default)]
pub(crate) struct EventMonitor {
    run_state: Arc<AtomicU8>,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
    scan: Arc<ScanGate>,
}

impl EventMonitor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn scan_gate(&self) -> Arc<ScanGate> {
        self.scan.clone()
    }

    /// Claims the stopped-to-starting transition; false when the loop is
    /// already starting or running.
    fn try_begin_start(&self) -> bool {
        self.run_state
            .compare_exchange(
                run_state::STOPPED,
                run_state::STARTING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Spawns the monitoring loop feeding `tx`.
    pub(crate) async fn start(
        &self,
        conn: &Connection,
        cfg: &ServiceConfig,
        tx: UnboundedSender<NetworkEvent>,
    ) -> Result<()> {
        if !self.try_begin_start() {
            debug!("Event monitor already started");
            return Ok(());
        }

        let token = CancellationToken::new();
        *self.cancel.lock().await = token.clone();

        let conn = conn.clone();
        let cfg = cfg.clone();
        let state = self.run_state.clone();
        let scan = self.scan.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = monitor_loop(&conn, &cfg, tx, token, scan).await {
                error!("Event monitor stopped: {e}");
            }
            state.store(run_state::STOPPED, Ordering::SeqCst);
        });
        *self.task.lock().await = Some(handle);
        // The loop may have already failed and stored STOPPED.
        let _ = self.run_state.compare_exchange(
            run_state::STARTING,
            run_state::RUNNING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        info!("Event monitor started");
        Ok(())
    }

    /// Stops the monitoring loop and waits for it to wind down. No events
    /// are delivered after this returns.
    pub(crate) async fn stop(&self) {
        let _ = self.run_state.compare_exchange(
            run_state::RUNNING,
            run_state::STOPPING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.cancel.lock().await.cancel();
        if let Some(handle) = self.task.lock().await.take()
            && let Err(e) = handle.await
        {
            warn!("Event monitor task join failed: {e}");
        }
        self.run_state.store(run_state::STOPPED, Ordering::SeqCst);
        info!("Event monitor stopped");
    }

    pub(crate) fn is_running(&self) -> bool {
        self.run_state.load(Ordering::SeqCst) == run_state::RUNNING
    }
}

/// Per-loop mutable state: the translator/deduplicator pair, the set of
/// watched device paths, and the last reported active interface.
struct LoopState {
    translator: StateTranslator,
    dedup: AddressDeduplicator,
    watched: HashMap<OwnedObjectPath, (String, InterfaceRole)>,
    active_interface: Option<String>,
}

async fn monitor_loop(
    conn: &Connection,
    cfg: &ServiceConfig,
    tx: UnboundedSender<NetworkEvent>,
    token: CancellationToken,
    scan: Arc<ScanGate>,
) -> Result<()> {
    let nm = NMProxy::new(conn).await?;
    let mut merged: SelectAll<EventStream> = SelectAll::new();
    let mut state = LoopState {
        translator: StateTranslator::new(),
        dedup: AddressDeduplicator::new(),
        watched: HashMap::new(),
        active_interface: None,
    };

    // Global subscriptions first so devices appearing during bootstrap are
    // not missed.
    let added = nm.receive_device_added().await?;
    merged.push(
        added
            .filter_map(|sig| ready(sig.args().ok().map(|a| BusEvent::DeviceAdded(a.device_path))))
            .boxed(),
    );
    let removed = nm.receive_device_removed().await?;
    merged.push(
        removed
            .filter_map(|sig| {
                ready(sig.args().ok().map(|a| BusEvent::DeviceRemoved(a.device_path)))
            })
            .boxed(),
    );
    let primary = nm.receive_primary_connection_changed().await;
    merged.push(
        primary
            .filter_map(|change| async move {
                change.get().await.ok().map(BusEvent::PrimaryChanged)
            })
            .boxed(),
    );

    // Bootstrap: subscribe to and report the interfaces that already exist.
    for path in nm.get_devices().await? {
        if let Err(e) = watch_device(conn, cfg, &path, &mut merged, &mut state, &tx).await {
            debug!("Skipping device {}: {e}", path.as_str());
        }
    }
    state.active_interface = resolve_primary(conn, &nm.primary_connection().await?).await;
    if state.active_interface.is_some() {
        send(
            &tx,
            NetworkEvent::ActiveInterfaceChanged {
                previous: None,
                current: state.active_interface.clone(),
            },
        )?;
    }

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Event monitor cancelled");
                return Ok(());
            }
            ev = merged.next() => {
                let Some(ev) = ev else {
                    return Err(SyncError::ExternalService);
                };
                handle_event(conn, cfg, ev, &mut merged, &mut state, &scan, &tx).await?;
            }
        }
    }
}

async fn handle_event(
    conn: &Connection,
    cfg: &ServiceConfig,
    event: BusEvent,
    merged: &mut SelectAll<EventStream>,
    state: &mut LoopState,
    scan: &ScanGate,
    tx: &UnboundedSender<NetworkEvent>,
) -> Result<()> {
    match event {
        BusEvent::DeviceState {
            interface,
            role,
            new_state,
            reason,
        } => emit_translation(state, tx, &interface, role, new_state, reason)?,
        BusEvent::IpConfig {
            interface,
            family,
            config_path,
        } => {
            if config_path.as_str() == bus::ROOT_PATH {
                if let Some(lost) = state.dedup.on_link_down(&interface, family) {
                    send(tx, address_event(lost))?;
                }
            } else if let Some(address) = read_global_address(conn, family, &config_path).await
                && let Some(acquired) = state.dedup.on_address(&interface, family, &address)
            {
                send(tx, address_event(acquired))?;
            }
        }
        BusEvent::DeviceAdded(path) => {
            if !state.watched.contains_key(&path)
                && let Err(e) = watch_device(conn, cfg, &path, merged, state, tx).await
            {
                debug!("Ignoring added device {}: {e}", path.as_str());
            }
        }
        BusEvent::DeviceRemoved(path) => {
            if let Some((interface, _role)) = state.watched.remove(&path) {
                info!("{interface} removed");
                state.translator.forget(&interface);
                for lost in state.dedup.flush(&interface) {
                    send(tx, address_event(lost))?;
                }
                send(
                    tx,
                    NetworkEvent::InterfaceStateChanged {
                        state: InterfaceState::Removed,
                        interface,
                    },
                )?;
            }
        }
        BusEvent::PrimaryChanged(path) => {
            let current = resolve_primary(conn, &path).await;
            if current != state.active_interface {
                let previous = std::mem::replace(&mut state.active_interface, current.clone());
                send(
                    tx,
                    NetworkEvent::ActiveInterfaceChanged { previous, current },
                )?;
            }
        }
        BusEvent::ScanCompleted => {
            let Some(filter) = scan.take().await else {
                return Ok(());
            };
            if let Ok(device_path) = device::find_wifi_device(conn, cfg).await {
                match catalog::scan_access_points(conn, &device_path).await {
                    Ok(mut aps) => {
                        if let Some(ssid) = filter {
                            aps.retain(|ap| ap.ssid == ssid);
                        }
                        send(tx, NetworkEvent::AvailableSsids(aps))?;
                    }
                    Err(e) => debug!("Scan result fetch failed: {e}"),
                }
            }
        }
    }
    Ok(())
}

/// Subscribes to a device's state and address streams if it is one of the
/// monitored interfaces, and reports its current state through the
/// translator.
async fn watch_device(
    conn: &Connection,
    cfg: &ServiceConfig,
    path: &OwnedObjectPath,
    merged: &mut SelectAll<EventStream>,
    state: &mut LoopState,
    tx: &UnboundedSender<NetworkEvent>,
) -> Result<()> {
    let dev = NMDeviceProxy::builder(conn)
        .path(path.clone())?
        .build()
        .await?;
    let interface = dev.interface().await?;
    let Some(role) = device::role_for(cfg, &interface) else {
        return Ok(());
    };

    let states = dev.receive_device_state_changed().await?;
    {
        let interface = interface.clone();
        merged.push(
            states
                .filter_map(move |sig| {
                    ready(sig.args().ok().map(|a| BusEvent::DeviceState {
                        interface: interface.clone(),
                        role,
                        new_state: a.new_state,
                        reason: a.reason,
                    }))
                })
                .boxed(),
        );
    }

    for family in [IpFamily::V4, IpFamily::V6] {
        let stream = match family {
            IpFamily::V4 => dev.receive_ip4_config_changed().await.boxed(),
            IpFamily::V6 => dev.receive_ip6_config_changed().await.boxed(),
        };
        let interface = interface.clone();
        merged.push(
            stream
                .filter_map(move |change| {
                    let interface = interface.clone();
                    async move {
                        change.get().await.ok().map(|config_path| BusEvent::IpConfig {
                            interface,
                            family,
                            config_path,
                        })
                    }
                })
                .boxed(),
        );
    }

    if dev.device_type().await? == device_type::WIFI {
        let wifi = NMWirelessProxy::builder(conn)
            .path(path.clone())?
            .build()
            .await?;
        let scans = wifi.receive_last_scan_changed().await;
        merged.push(scans.map(|_| BusEvent::ScanCompleted).boxed());
    }

    info!("Watching {interface} ({role})");
    state
        .watched
        .insert(path.clone(), (interface.clone(), role));

    // Report the state the device is already in.
    let (raw_state, raw_reason) = dev.state_reason().await?;
    emit_translation(state, tx, &interface, role, raw_state, raw_reason)?;

    // Seed the address cache so an address present at startup is reported
    // once and not again on the next no-op notification.
    for family in [IpFamily::V4, IpFamily::V6] {
        let config_path = match family {
            IpFamily::V4 => dev.ip4_config().await?,
            IpFamily::V6 => dev.ip6_config().await?,
        };
        if config_path.as_str() == bus::ROOT_PATH {
            continue;
        }
        if let Some(address) = read_global_address(conn, family, &config_path).await
            && let Some(acquired) = state.dedup.on_address(&interface, family, &address)
        {
            send(tx, address_event(acquired))?;
        }
    }
    Ok(())
}

/// Runs one raw transition through the translator and forwards whatever
/// normalized events fall out.
fn emit_translation(
    state: &mut LoopState,
    tx: &UnboundedSender<NetworkEvent>,
    interface: &str,
    role: InterfaceRole,
    new_state: u32,
    reason: u32,
) -> Result<()> {
    let translation = state.translator.translate(interface, role, new_state, reason);
    for s in translation.interface_states {
        send(
            tx,
            NetworkEvent::InterfaceStateChanged {
                state: s,
                interface: interface.to_string(),
            },
        )?;
    }
    if let Some(wifi) = translation.wifi_state {
        send(tx, NetworkEvent::WifiStateChanged(wifi))?;
    }
    if translation.link_down {
        for lost in state.dedup.flush(interface) {
            send(tx, address_event(lost))?;
        }
    }
    Ok(())
}

/// Reads the global address off an IP configuration object; `None` when
/// the object is gone or holds none.
async fn read_global_address(
    conn: &Connection,
    family: IpFamily,
    config_path: &OwnedObjectPath,
) -> Option<String> {
    let data = match family {
        IpFamily::V4 => {
            let ip = NMIp4ConfigProxy::builder(conn)
                .path(config_path.clone())
                .ok()?
                .build()
                .await
                .ok()?;
            ip.address_data().await.ok()?
        }
        IpFamily::V6 => {
            let ip = NMIp6ConfigProxy::builder(conn)
                .path(config_path.clone())
                .ok()?
                .build()
                .await
                .ok()?;
            ip.address_data().await.ok()?
        }
    };
    first_global_address(family, &data)
}

/// Picks the first non-link-local address from `AddressData` entries.
///
/// The entries come in no guaranteed order and the IPv6 link-local address
/// often sorts before the global one.
fn first_global_address(
    family: IpFamily,
    data: &[HashMap<String, zvariant::OwnedValue>],
) -> Option<String> {
    data.iter().find_map(|entry| {
        let address = entry.get("address").and_then(|v| match &**v {
            zvariant::Value::Str(s) => Some(s.to_string()),
            _ => None,
        })?;
        (!is_link_local(family, &address)).then_some(address)
    })
}

/// Resolves the interface name behind a primary-connection path.
async fn resolve_primary(conn: &Connection, path: &OwnedObjectPath) -> Option<String> {
    if path.as_str() == bus::ROOT_PATH {
        return None;
    }
    let active = NMActiveConnectionProxy::builder(conn)
        .path(path.clone())
        .ok()?
        .build()
        .await
        .ok()?;
    let device_path = active.devices().await.ok()?.into_iter().next()?;
    let dev = NMDeviceProxy::builder(conn)
        .path(device_path)
        .ok()?
        .build()
        .await
        .ok()?;
    dev.interface().await.ok()
}

fn address_event(ev: AddressEvent) -> NetworkEvent {
    NetworkEvent::IpAddressChanged {
        interface: ev.interface,
        family: ev.family,
        address: ev.address,
        acquired: ev.acquired,
    }
}

/// Forwards one event; a closed receiver stops the loop.
fn send(tx: &UnboundedSender<NetworkEvent>, event: NetworkEvent) -> Result<()> {
    debug!("Emitting {event:?}");
    tx.send(event).map_err(|_| SyncError::ExternalService)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scan_gate_fires_once_per_arm() {
        let gate = ScanGate::default();
        assert!(gate.take().await.is_none(), "unarmed gate stays closed");

        gate.arm(None).await;
        assert_eq!(gate.take().await, Some(None));
        assert!(gate.take().await.is_none(), "gate disarms after one take");
    }

    #[tokio::test]
    async fn scan_gate_carries_the_filter() {
        let gate = ScanGate::default();
        gate.arm(Some("home".into())).await;
        assert_eq!(gate.take().await, Some(Some("home".into())));
    }

    #[tokio::test]
    async fn rearming_replaces_the_filter() {
        let gate = ScanGate::default();
        gate.arm(Some("old".into())).await;
        gate.arm(Some("new".into())).await;
        assert_eq!(gate.take().await, Some(Some("new".into())));
    }

    #[tokio::test]
    async fn disarmed_gate_drops_the_pending_filter() {
        let gate = ScanGate::default();
        gate.arm(Some("home".into())).await;
        gate.disarm().await;
        assert!(gate.take().await.is_none(), "disarmed gate stays closed");
    }

    #[test]
    fn monitor_starts_stopped() {
        let monitor = EventMonitor::new();
        assert!(!monitor.is_running());
        assert_eq!(
            monitor.run_state.load(Ordering::SeqCst),
            run_state::STOPPED
        );
    }

    #[test]
    fn second_start_cannot_claim_a_live_monitor() {
        let monitor = EventMonitor::new();
        assert!(monitor.try_begin_start());
        // Spin-up in progress claims the slot already.
        assert!(!monitor.try_begin_start());

        monitor
            .run_state
            .store(run_state::RUNNING, Ordering::SeqCst);
        assert!(!monitor.try_begin_start());
        assert!(monitor.is_running());

        monitor
            .run_state
            .store(run_state::STOPPED, Ordering::SeqCst);
        assert!(monitor.try_begin_start());
    }

    fn address_entries(addresses: &[&str]) -> Vec<HashMap<String, zvariant::OwnedValue>> {
        addresses
            .iter()
            .map(|a| {
                let mut entry = HashMap::new();
                entry.insert(
                    "address".to_string(),
                    zvariant::OwnedValue::try_from(zvariant::Value::from(a.to_string())).unwrap(),
                );
                entry
            })
            .collect()
    }

    #[test]
    fn global_address_wins_over_a_leading_link_local() {
        let data = address_entries(&["fe80::c225:6ff:fe2e:1db0", "2001:db8::42"]);
        assert_eq!(
            first_global_address(IpFamily::V6, &data).as_deref(),
            Some("2001:db8::42")
        );

        let v4 = address_entries(&["169.254.12.9", "192.168.1.5"]);
        assert_eq!(
            first_global_address(IpFamily::V4, &v4).as_deref(),
            Some("192.168.1.5")
        );
    }

    #[test]
    fn link_local_only_entries_yield_nothing() {
        let data = address_entries(&["fe80::1"]);
        assert_eq!(first_global_address(IpFamily::V6, &data), None);
        assert_eq!(first_global_address(IpFamily::V6, &[]), None);
    }
}
