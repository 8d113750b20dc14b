//! WPS push-button session.
//!
//! Runs the push-button retry loop: scan for an access point advertising
//! active push-button registration, connect to it with an agent-owned psk,
//! and watch the device until activation. At most one session runs at a
//! time; a second start while one is in flight is a success no-op.

use futures::StreamExt;
use futures_timer::Delay;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use zbus::Connection;
use zvariant::OwnedObjectPath;

use crate::Result;
use crate::catalog;
use crate::config::ServiceConfig;
use crate::device;
use crate::models::{ConnectRequest, DeviceState, SyncError};
use crate::orchestrator;
use crate::proxies::NMDeviceProxy;
use crate::secret_agent::{self, AgentGate};

/// Outcome of watching one activation attempt.
enum Attempt {
    Connected,
    Failed,
    Cancelled,
}

/// Single-flight WPS push-button session state.
#[derive(Debug, Default)]
pub(crate) struct WpsSession {
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl WpsSession {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the in-flight session, if any.
    pub(crate) async fn cancel(&self) {
        self.cancel.lock().await.cancel();
    }

    /// Whether a session is currently in flight.
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs the push-button loop to completion.
    ///
    /// A second start while one session is in flight is a success no-op and
    /// does not reset the running session's budget. Terminates on successful
    /// activation, on cancellation (reported as success), or with `Timeout`
    /// once the retry budget is exhausted.
    pub(crate) async fn run(&self, conn: &Connection, cfg: &ServiceConfig) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("WPS session already in progress");
            return Ok(());
        }

        let token = CancellationToken::new();
        *self.cancel.lock().await = token.clone();

        let gate = AgentGate::new(cfg.secrets_wait());
        if let Err(e) = secret_agent::register(conn, gate.clone()).await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let outcome = attempt_loop(conn, cfg, &token).await;

        gate.cancel();
        if let Err(e) = secret_agent::unregister(conn).await {
            warn!("Secret agent teardown failed: {e}");
        }
        self.running.store(false, Ordering::SeqCst);
        outcome
    }
}

async fn attempt_loop(
    conn: &Connection,
    cfg: &ServiceConfig,
    token: &CancellationToken,
) -> Result<()> {
    let device_path = device::find_wifi_device(conn, cfg).await?;

    for attempt in 1..=cfg.wps_retries {
        if token.is_cancelled() {
            info!("WPS session cancelled");
            return Ok(());
        }
        info!("WPS push-button attempt {attempt}/{}", cfg.wps_retries);

        if let Err(e) = catalog::request_scan(conn, &device_path).await {
            debug!("Scan request failed, using cached results: {e}");
        }
        if !sleep_unless_cancelled(token, cfg.scan_wait()).await {
            info!("WPS session cancelled");
            return Ok(());
        }

        match catalog::find_wps_pbc_candidate(conn, &device_path).await? {
            Some(ap) => {
                info!("Push-button candidate '{}' ({})", ap.ssid, ap.bssid);
                // Release any current association before the WPS attempt.
                if let Err(e) = orchestrator::disconnect(conn, cfg).await {
                    debug!("Pre-attempt disconnect failed: {e}");
                }
                let req = ConnectRequest {
                    ssid: ap.ssid.clone(),
                    passphrase: None,
                    // Advertised mode straight from the beacon; connect would
                    // override a provisional psk mode with it anyway.
                    security: ap.security,
                    persist: true,
                    wps: true,
                };
                match orchestrator::connect(conn, cfg, &req).await {
                    Ok(()) => {
                        match await_activation(conn, &device_path, token, cfg.wps_retry_interval())
                            .await?
                        {
                            Attempt::Connected => {
                                info!("WPS connected to '{}'", ap.ssid);
                                return Ok(());
                            }
                            Attempt::Cancelled => {
                                info!("WPS session cancelled");
                                return Ok(());
                            }
                            Attempt::Failed => {
                                warn!("Activation of '{}' did not complete", ap.ssid);
                            }
                        }
                    }
                    Err(e) => warn!("WPS activation attempt failed: {e}"),
                }
            }
            None => debug!("No push-button access point visible"),
        }

        if !sleep_unless_cancelled(token, cfg.wps_retry_interval()).await {
            info!("WPS session cancelled");
            return Ok(());
        }
    }

    warn!("WPS retry budget exhausted");
    Err(SyncError::Timeout)
}

/// Sleeps for `duration` unless the token fires first. Returns false on
/// cancellation.
async fn sleep_unless_cancelled(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = Delay::new(duration) => true,
    }
}

/// Watches the device's state signal until it activates, fails, or the
/// per-attempt window elapses.
async fn await_activation(
    conn: &Connection,
    device_path: &OwnedObjectPath,
    token: &CancellationToken,
    window: Duration,
) -> Result<Attempt> {
    let dev = NMDeviceProxy::builder(conn)
        .path(device_path.clone())?
        .build()
        .await?;

    if DeviceState::from(dev.state().await?) == DeviceState::Activated {
        return Ok(Attempt::Connected);
    }

    let mut stream = dev.receive_device_state_changed().await?;
    let watch = async {
        while let Some(signal) = stream.next().await {
            match signal.args() {
                Ok(args) => match DeviceState::from(args.new_state) {
                    DeviceState::Activated => return Attempt::Connected,
                    DeviceState::Failed | DeviceState::Disconnected => return Attempt::Failed,
                    _ => {}
                },
                Err(e) => warn!("Failed to parse StateChanged signal args: {e}"),
            }
        }
        Attempt::Failed
    };

    tokio::select! {
        _ = token.cancelled() => Ok(Attempt::Cancelled),
        res = timeout(window, watch) => Ok(res.unwrap_or(Attempt::Failed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_sleep_returns_false() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!sleep_unless_cancelled(&token, Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn uncancelled_sleep_completes() {
        let token = CancellationToken::new();
        assert!(sleep_unless_cancelled(&token, Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn second_session_does_not_steal_the_slot() {
        let session = WpsSession::new();
        assert!(
            session
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        );
        // The slot is taken; a second start leaves the running session alone.
        assert!(
            session
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        );
        assert!(session.is_running());
    }
}
