//! Service configuration.
//!
//! Everything hangs off one [`ServiceConfig`]-constructed
//! [`NetworkService`](crate::NetworkService); there are no process-wide
//! singletons.

use serde::Deserialize;
use std::time::Duration;

use crate::constants::{retries, timeouts};

/// Configuration for a [`NetworkService`](crate::NetworkService).
///
/// The two interface names select which physical devices are monitored;
/// notifications for any other device are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name of the WiFi interface to manage (e.g. "wlan0").
    pub wifi_interface: String,
    /// Name of the Ethernet interface to monitor (e.g. "eth0").
    pub ethernet_interface: String,
    /// Retry budget for the WPS push-button loop.
    pub wps_retries: u32,
    /// Seconds between WPS retries.
    pub wps_retry_interval_secs: u64,
    /// Seconds to wait after a scan request before reading results.
    pub scan_wait_secs: u64,
    /// Bound on the secret agent's interactive secrets wait, in seconds.
    pub secrets_wait_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            wifi_interface: "wlan0".into(),
            ethernet_interface: "eth0".into(),
            wps_retries: retries::WPS_MAX_RETRIES,
            wps_retry_interval_secs: timeouts::WPS_RETRY_INTERVAL_SECONDS,
            scan_wait_secs: timeouts::SCAN_WAIT_SECONDS,
            secrets_wait_secs: timeouts::SECRETS_WAIT_SECONDS,
        }
    }
}

impl ServiceConfig {
    pub fn wps_retry_interval(&self) -> Duration {
        Duration::from_secs(self.wps_retry_interval_secs)
    }

    pub fn scan_wait(&self) -> Duration {
        Duration::from_secs(self.scan_wait_secs)
    }

    pub fn secrets_wait(&self) -> Duration {
        Duration::from_secs(self.secrets_wait_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.wifi_interface, "wlan0");
        assert_eq!(cfg.ethernet_interface, "eth0");
        assert_eq!(cfg.wps_retries, 10);
        assert_eq!(cfg.wps_retry_interval(), Duration::from_secs(10));
        assert_eq!(cfg.secrets_wait(), Duration::from_secs(10));
    }
}
