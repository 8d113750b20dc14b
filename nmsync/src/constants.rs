//! Constants for NetworkManager D-Bus interface values.
//!
//! These constants correspond to the numeric codes used by NetworkManager's
//! D-Bus API for device types, states, state reasons and secret agent flags,
//! plus the tunable defaults used by the retry loops.

/// NetworkManager device type constants.
pub mod device_type {
    pub const WIFI: u32 = 2;
}

/// NetworkManager device state constants.
pub mod device_state {
    pub const UNKNOWN: u32 = 0;
    pub const UNMANAGED: u32 = 10;
    pub const UNAVAILABLE: u32 = 20;
    pub const DISCONNECTED: u32 = 30;
    pub const PREPARE: u32 = 40;
    pub const CONFIG: u32 = 50;
    pub const NEED_AUTH: u32 = 60;
    pub const IP_CONFIG: u32 = 70;
    pub const IP_CHECK: u32 = 80;
    pub const SECONDARIES: u32 = 90;
    pub const ACTIVATED: u32 = 100;
    pub const DEACTIVATING: u32 = 110;
    pub const FAILED: u32 = 120;
}

/// Secret agent `GetSecrets` request flags.
pub mod secret_agent_flags {
    pub const ALLOW_INTERACTION: u32 = 0x1;
    pub const USER_REQUESTED: u32 = 0x4;
}

/// Well-known D-Bus names and paths.
pub mod bus {
    pub const SECRET_AGENT_PATH: &str = "/org/freedesktop/NetworkManager/SecretAgent";
    pub const SECRET_AGENT_ID: &str = "io.nmsync.SecretAgent";
    pub const ROOT_PATH: &str = "/";
}

/// Timeout and delay constants.
pub mod timeouts {
    pub const SCAN_WAIT_SECONDS: u64 = 3;
    pub const WPS_RETRY_INTERVAL_SECONDS: u64 = 10;
    pub const SECRETS_WAIT_SECONDS: u64 = 10;
}

/// Retry count constants.
pub mod retries {
    pub const WPS_MAX_RETRIES: u32 = 10;
}

/// Signal strength mapping constants.
///
/// NetworkManager reports strength as a percentage; the qualitative buckets
/// are defined over dBm after a linear percentage-to-dBm mapping.
pub mod signal_strength {
    pub const DBM_AT_ZERO_PCT: i32 = -90;
    pub const DBM_AT_FULL_PCT: i32 = -30;
    pub const EXCELLENT_DBM: i32 = -50;
    pub const GOOD_DBM: i32 = -60;
    pub const FAIR_DBM: i32 = -67;
}

/// SSID length limit in bytes, per 802.11.
pub const MAX_SSID_BYTES: usize = 32;

/// Minimum WPA passphrase length in characters.
pub const MIN_PASSPHRASE_CHARS: usize = 8;

/// Maximum WPA passphrase length in characters.
pub const MAX_PASSPHRASE_CHARS: usize = 63;
