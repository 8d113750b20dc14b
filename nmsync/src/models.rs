use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use zvariant::OwnedObjectPath;

use crate::constants::device_state;

/// Role of a monitored physical interface.
///
/// Exactly two roles are monitored: the WiFi and Ethernet interfaces named
/// by [`ServiceConfig`](crate::config::ServiceConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceRole {
    Ethernet,
    Wifi,
}

impl Display for InterfaceRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ethernet => write!(f, "ethernet"),
            Self::Wifi => write!(f, "wifi"),
        }
    }
}

/// Normalized interface lifecycle state reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceState {
    Added,
    LinkUp,
    LinkDown,
    AcquiringIp,
    Removed,
    Disabled,
}

impl Display for InterfaceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::LinkUp => write!(f, "link up"),
            Self::LinkDown => write!(f, "link down"),
            Self::AcquiringIp => write!(f, "acquiring IP"),
            Self::Removed => write!(f, "removed"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Normalized WiFi connection state reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WifiState {
    Uninstalled,
    Disabled,
    Disconnected,
    Pairing,
    Connecting,
    Connected,
    ConnectionLost,
    ConnectionFailed,
    SsidNotFound,
    AuthenticationFailed,
    InvalidCredentials,
    Error,
    ConnectionInterrupted,
}

impl Display for WifiState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninstalled => write!(f, "uninstalled"),
            Self::Disabled => write!(f, "disabled"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Pairing => write!(f, "pairing"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::ConnectionFailed => write!(f, "connection failed"),
            Self::SsidNotFound => write!(f, "SSID not found"),
            Self::AuthenticationFailed => write!(f, "authentication failed"),
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::Error => write!(f, "error"),
            Self::ConnectionInterrupted => write!(f, "connection interrupted"),
        }
    }
}

/// NetworkManager device states, decoded from the raw D-Bus codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unknown,
    Unmanaged,
    Unavailable,
    Disconnected,
    Prepare,
    Config,
    NeedAuth,
    IpConfig,
    IpCheck,
    Secondaries,
    Activated,
    Deactivating,
    Failed,
    Other(u32),
}

impl From<u32> for DeviceState {
    fn from(value: u32) -> Self {
        match value {
            device_state::UNKNOWN => DeviceState::Unknown,
            device_state::UNMANAGED => DeviceState::Unmanaged,
            device_state::UNAVAILABLE => DeviceState::Unavailable,
            device_state::DISCONNECTED => DeviceState::Disconnected,
            device_state::PREPARE => DeviceState::Prepare,
            device_state::CONFIG => DeviceState::Config,
            device_state::NEED_AUTH => DeviceState::NeedAuth,
            device_state::IP_CONFIG => DeviceState::IpConfig,
            device_state::IP_CHECK => DeviceState::IpCheck,
            device_state::SECONDARIES => DeviceState::Secondaries,
            device_state::ACTIVATED => DeviceState::Activated,
            device_state::DEACTIVATING => DeviceState::Deactivating,
            device_state::FAILED => DeviceState::Failed,
            v => DeviceState::Other(v),
        }
    }
}

impl Display for DeviceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceState::Unknown => write!(f, "Unknown"),
            DeviceState::Unmanaged => write!(f, "Unmanaged"),
            DeviceState::Unavailable => write!(f, "Unavailable"),
            DeviceState::Disconnected => write!(f, "Disconnected"),
            DeviceState::Prepare => write!(f, "Preparing"),
            DeviceState::Config => write!(f, "Configuring"),
            DeviceState::NeedAuth => write!(f, "NeedAuth"),
            DeviceState::IpConfig => write!(f, "IpConfig"),
            DeviceState::IpCheck => write!(f, "IpCheck"),
            DeviceState::Secondaries => write!(f, "Secondaries"),
            DeviceState::Activated => write!(f, "Activated"),
            DeviceState::Deactivating => write!(f, "Deactivating"),
            DeviceState::Failed => write!(f, "Failed"),
            DeviceState::Other(v) => write!(f, "Other({v})"),
        }
    }
}

/// NetworkManager device state reason codes relevant to state translation.
///
/// Only the supplicant- and SSID-related reasons influence the normalized
/// WiFi state; everything else falls through to the state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateReason {
    None,
    NoSecrets,
    SupplicantDisconnect,
    SupplicantConfigFailed,
    SupplicantFailed,
    SupplicantTimeout,
    SupplicantAvailable,
    SsidNotFound,
    Other(u32),
}

impl From<u32> for StateReason {
    fn from(code: u32) -> Self {
        match code {
            1 => Self::None,
            7 => Self::NoSecrets,
            8 => Self::SupplicantDisconnect,
            9 => Self::SupplicantConfigFailed,
            10 => Self::SupplicantFailed,
            11 => Self::SupplicantTimeout,
            42 => Self::SupplicantAvailable,
            53 => Self::SsidNotFound,
            v => Self::Other(v),
        }
    }
}

impl Display for StateReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::NoSecrets => write!(f, "no secrets"),
            Self::SupplicantDisconnect => write!(f, "supplicant disconnect"),
            Self::SupplicantConfigFailed => write!(f, "supplicant config failed"),
            Self::SupplicantFailed => write!(f, "supplicant failed"),
            Self::SupplicantTimeout => write!(f, "supplicant timeout"),
            Self::SupplicantAvailable => write!(f, "supplicant available"),
            Self::SsidNotFound => write!(f, "SSID not found"),
            Self::Other(v) => write!(f, "reason ({v})"),
        }
    }
}

/// IP address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpFamily {
    V4,
    V6,
}

impl Display for IpFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4 => write!(f, "IPv4"),
            Self::V6 => write!(f, "IPv6"),
        }
    }
}

/// WiFi security mode as inferred from access point capability flags or
/// requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityMode {
    None,
    WpaPsk,
    Sae,
    Eap,
}

impl Display for SecurityMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::WpaPsk => write!(f, "WPA-PSK"),
            Self::Sae => write!(f, "SAE"),
            Self::Eap => write!(f, "EAP"),
        }
    }
}

/// Qualitative signal strength bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalQuality {
    Disconnected,
    Weak,
    Fair,
    Good,
    Excellent,
}

impl Display for SignalQuality {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Weak => write!(f, "weak"),
            Self::Fair => write!(f, "fair"),
            Self::Good => write!(f, "good"),
            Self::Excellent => write!(f, "excellent"),
        }
    }
}

bitflags! {
    /// 802.11 access point capability flags (`Flags` property).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ApFlags: u32 {
        const PRIVACY = 0x1;
        const WPS     = 0x2;
        const WPS_PBC = 0x4;
        const WPS_PIN = 0x8;
    }
}

bitflags! {
    /// 802.11 access point security flags (`WpaFlags` / `RsnFlags` properties).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ApSecurityFlags: u32 {
        const PAIR_WEP40     = 0x1;
        const PAIR_WEP104    = 0x2;
        const PAIR_TKIP      = 0x4;
        const PAIR_CCMP      = 0x8;
        const GROUP_WEP40    = 0x10;
        const GROUP_WEP104   = 0x20;
        const GROUP_TKIP     = 0x40;
        const GROUP_CCMP     = 0x80;
        const KEY_MGMT_PSK   = 0x100;
        const KEY_MGMT_802_1X = 0x200;
        const KEY_MGMT_SAE   = 0x400;
        const KEY_MGMT_OWE   = 0x800;
        const KEY_MGMT_OWE_TM = 0x1000;
    }
}

/// A WiFi access point observed during a scan.
///
/// Ephemeral: rebuilt on every scan-result fetch, never cached across scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPoint {
    pub ssid: String,
    pub bssid: String,
    pub strength_pct: u8,
    pub strength_dbm: i32,
    pub quality: SignalQuality,
    pub frequency_mhz: u32,
    pub bitrate_kbps: u32,
    pub security: SecurityMode,
    pub wps_pbc: bool,
    /// D-Bus object path of the live AP, passed through to activation calls.
    #[serde(skip)]
    pub path: Option<OwnedObjectPath>,
}

/// A WiFi connect request as submitted by the caller.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub ssid: String,
    pub passphrase: Option<String>,
    pub security: SecurityMode,
    /// Persist the profile across restarts; non-persistent profiles are
    /// created volatile.
    pub persist: bool,
    /// Set for WPS push-button connections: the passphrase arrives later
    /// out-of-band through the secret agent, so its length is not checked.
    pub wps: bool,
}

/// A validated connection profile ready to be rendered into NetworkManager
/// settings dictionaries.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    pub uuid: String,
    pub ssid: String,
    pub security: SecurityMode,
    pub passphrase: Option<String>,
    pub interface: String,
    pub persist: bool,
    /// Set when an SSID match was found among already-known profiles.
    pub existing_path: Option<OwnedObjectPath>,
}

/// IP configuration for one address family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpSettings {
    pub family: IpFamily,
    pub automatic: bool,
    pub address: Option<String>,
    pub prefix: Option<u32>,
    pub gateway: Option<String>,
    pub dns: Vec<String>,
}

/// A network interface as reported by `get_available_interfaces`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub role: InterfaceRole,
    pub mac_address: String,
    pub enabled: bool,
    pub connected: bool,
}

/// Typed event emitted by the event subscription manager.
///
/// The consumer takes the receiver from
/// [`NetworkService::events`](crate::NetworkService::events).
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    InterfaceStateChanged {
        state: InterfaceState,
        interface: String,
    },
    ActiveInterfaceChanged {
        previous: Option<String>,
        current: Option<String>,
    },
    IpAddressChanged {
        interface: String,
        family: IpFamily,
        address: String,
        acquired: bool,
    },
    WifiStateChanged(WifiState),
    AvailableSsids(Vec<AccessPoint>),
}

/// Errors that can occur during synchronization and orchestration.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The bus connection failed or was lost. Fatal to the current
    /// operation, not to the process.
    #[error("D-Bus error: {0}")]
    Transport(#[from] zbus::Error),

    /// SSID empty or longer than 32 bytes.
    #[error("invalid SSID")]
    InvalidSsid,

    /// Passphrase missing or shorter than 8 characters for a PSK/SAE mode.
    #[error("passphrase missing or too weak")]
    WeakPassphrase,

    /// The requested security mode is not supported for connect.
    #[error("unsupported security mode: {0}")]
    UnsupportedSecurity(SecurityMode),

    /// No matching known profile or no matching access point.
    #[error("not found")]
    NotFound,

    /// The remote call itself failed; the remote error text is logged.
    #[error("external service call failed")]
    ExternalService,

    /// A secrets wait or retry budget was exhausted. A normal terminal
    /// state, not a hard error.
    #[error("timed out")]
    Timeout,

    /// A conflicting session (e.g. WPS) is already in progress.
    #[error("operation already in progress")]
    Busy,

    /// No WiFi device matching the configured interface name exists.
    #[error("no WiFi device found")]
    NoWifiDevice,

    /// No device matching the requested interface name exists.
    #[error("no such interface")]
    NoSuchInterface,
}
