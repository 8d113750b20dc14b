//! High-level service facade.
//!
//! One [`NetworkService`] owns the shared bus connection, the event
//! monitor, and the WPS session, replacing process-wide singletons with
//! explicit ownership. All operations delegate to the focused modules.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use zbus::Connection;

use crate::Result;
use crate::catalog;
use crate::config::ServiceConfig;
use crate::constants::bus;
use crate::device;
use crate::events::EventMonitor;
use crate::models::{
    AccessPoint, ConnectRequest, InterfaceInfo, IpFamily, IpSettings, NetworkEvent, SignalQuality,
    WifiState,
};
use crate::orchestrator;
use crate::proxies::{NMAccessPointProxy, NMDeviceProxy, NMWirelessProxy};
use crate::translate;
use crate::wps::WpsSession;

/// High-level interface to the connectivity synchronization core.
///
/// Cheap to clone; clones share the bus connection, the event monitor, and
/// the WPS session.
#[derive(Clone)]
pub struct NetworkService {
    conn: Connection,
    cfg: ServiceConfig,
    monitor: Arc<EventMonitor>,
    wps: Arc<WpsSession>,
    events_tx: UnboundedSender<NetworkEvent>,
    events_rx: Arc<Mutex<Option<UnboundedReceiver<NetworkEvent>>>>,
}

impl NetworkService {
    /// Connects to the system bus and prepares the service.
    ///
    /// Nothing is monitored until [`start_monitoring`](Self::start_monitoring)
    /// is called.
    pub async fn new(cfg: ServiceConfig) -> Result<Self> {
        let conn = Connection::system().await?;
        Ok(Self::with_connection(conn, cfg))
    }

    /// Builds the service on an existing bus connection.
    pub fn with_connection(conn: Connection, cfg: ServiceConfig) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        Self {
            conn,
            cfg,
            monitor: Arc::new(EventMonitor::new()),
            wps: Arc::new(WpsSession::new()),
            events_tx,
            events_rx: Arc::new(Mutex::new(Some(events_rx))),
        }
    }

    /// Takes the event receiver. Yields `None` after the first call; there
    /// is exactly one consumer.
    pub async fn events(&self) -> Option<UnboundedReceiver<NetworkEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Starts the background event monitoring loop. Idempotent.
    pub async fn start_monitoring(&self) -> Result<()> {
        self.monitor
            .start(&self.conn, &self.cfg, self.events_tx.clone())
            .await
    }

    /// Stops event monitoring and waits for the loop to wind down.
    pub async fn stop_monitoring(&self) {
        self.monitor.stop().await;
    }

    /// Whether the monitoring loop is currently running.
    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    /// Lists the monitored interfaces with their current status.
    pub async fn get_available_interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        device::list_interfaces(&self.conn, &self.cfg).await
    }

    /// Enables or disables an interface by name.
    pub async fn set_interface_enabled(&self, interface: &str, enabled: bool) -> Result<()> {
        device::set_interface_enabled(&self.conn, &self.cfg, interface, enabled).await
    }

    /// Returns the SSIDs of all saved WiFi profiles.
    pub async fn get_known_ssids(&self) -> Result<Vec<String>> {
        orchestrator::get_known_ssids(&self.conn).await
    }

    /// Saves a profile for the request without activating it.
    pub async fn add_to_known_ssids(&self, request: &ConnectRequest) -> Result<()> {
        orchestrator::add_to_known_ssids(&self.conn, &self.cfg, request).await
    }

    /// Deletes every saved profile for `ssid`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no saved profile matches.
    pub async fn remove_known_ssid(&self, ssid: &str) -> Result<()> {
        orchestrator::remove_known_ssid(&self.conn, ssid).await
    }

    /// Returns the SSID of the currently connected network, if any.
    pub async fn get_connected_ssid(&self) -> Result<Option<String>> {
        orchestrator::get_connected_ssid(&self.conn, &self.cfg).await
    }

    /// Requests a WiFi scan and arms delivery of the results.
    ///
    /// The results arrive as one
    /// [`NetworkEvent::AvailableSsids`] on the event channel once the scan
    /// completes, narrowed to `filter` when given. Requires the monitor to
    /// be running.
    pub async fn start_wifi_scan(&self, filter: Option<String>) -> Result<()> {
        let gate = self.monitor.scan_gate();
        gate.arm(filter).await;
        let requested = async {
            let device_path = device::find_wifi_device(&self.conn, &self.cfg).await?;
            catalog::request_scan(&self.conn, &device_path).await
        }
        .await;
        if requested.is_err() {
            // A stale armed gate would fire on the daemon's next
            // background scan.
            gate.disarm().await;
        }
        requested
    }

    /// Fetches the current scan results directly, without going through the
    /// event channel.
    pub async fn get_available_ssids(&self) -> Result<Vec<AccessPoint>> {
        let device_path = device::find_wifi_device(&self.conn, &self.cfg).await?;
        catalog::scan_access_points(&self.conn, &device_path).await
    }

    /// Connects to a WiFi network.
    pub async fn wifi_connect(&self, request: &ConnectRequest) -> Result<()> {
        orchestrator::connect(&self.conn, &self.cfg, request).await
    }

    /// Disconnects the WiFi device. Success no-op when already down.
    pub async fn wifi_disconnect(&self) -> Result<()> {
        orchestrator::disconnect(&self.conn, &self.cfg).await
    }

    /// Derives the current WiFi state from the live device state.
    pub async fn get_wifi_state(&self) -> Result<WifiState> {
        let device_path = device::find_wifi_device(&self.conn, &self.cfg).await?;
        let dev = NMDeviceProxy::builder(&self.conn)
            .path(device_path)?
            .build()
            .await?;
        let (raw_state, raw_reason) = dev.state_reason().await?;
        Ok(translate::wifi_state_from_device(raw_state, raw_reason))
    }

    /// Returns the signal quality of the current association,
    /// `Disconnected` when there is none.
    pub async fn get_wifi_signal_quality(&self) -> Result<SignalQuality> {
        let device_path = device::find_wifi_device(&self.conn, &self.cfg).await?;
        let wifi = NMWirelessProxy::builder(&self.conn)
            .path(device_path)?
            .build()
            .await?;
        let ap_path = wifi.active_access_point().await?;
        if ap_path.as_str() == bus::ROOT_PATH {
            return Ok(SignalQuality::Disconnected);
        }
        let ap = NMAccessPointProxy::builder(&self.conn)
            .path(ap_path)?
            .build()
            .await?;
        Ok(catalog::quality_from_percent(ap.strength().await?))
    }

    /// Starts a WPS push-button session in the background.
    ///
    /// A session already in flight is left alone; this is a success no-op
    /// then. The session's outcome surfaces through the event channel as
    /// WiFi state transitions.
    pub async fn start_wps(&self) -> Result<()> {
        let session = self.wps.clone();
        let conn = self.conn.clone();
        let cfg = self.cfg.clone();
        tokio::spawn(async move {
            if let Err(e) = session.run(&conn, &cfg).await {
                log::warn!("WPS session ended: {e}");
            }
        });
        Ok(())
    }

    /// Cancels the in-flight WPS session, if any. Observed within one
    /// retry interval.
    pub async fn stop_wps(&self) {
        self.wps.cancel().await;
    }

    /// Whether a WPS session is currently in flight.
    pub fn is_wps_running(&self) -> bool {
        self.wps.is_running()
    }

    /// Reads the live IP settings of `interface` for one address family.
    pub async fn get_ip_settings(&self, interface: &str, family: IpFamily) -> Result<IpSettings> {
        device::get_ip_settings(&self.conn, interface, family).await
    }

    /// Writes IP settings into the profile active on `interface`.
    pub async fn set_ip_settings(&self, interface: &str, settings: &IpSettings) -> Result<()> {
        device::set_ip_settings(&self.conn, interface, settings).await
    }
}
