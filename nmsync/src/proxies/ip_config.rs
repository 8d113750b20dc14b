//! NetworkManager IP configuration proxies.

use std::collections::HashMap;
use zbus::{Result, proxy};
use zvariant::OwnedValue;

/// Proxy for a device's IPv4 configuration object.
#[proxy(
    interface = "org.freedesktop.NetworkManager.IP4Config",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMIp4Config {
    /// Address dictionaries with "address" and "prefix" entries.
    #[zbus(property)]
    fn address_data(&self) -> Result<Vec<HashMap<String, OwnedValue>>>;

    /// Default gateway, empty if none.
    #[zbus(property)]
    fn gateway(&self) -> Result<String>;

    /// Nameserver dictionaries with an "address" entry.
    #[zbus(property)]
    fn nameserver_data(&self) -> Result<Vec<HashMap<String, OwnedValue>>>;
}

/// Proxy for a device's IPv6 configuration object.
#[proxy(
    interface = "org.freedesktop.NetworkManager.IP6Config",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMIp6Config {
    /// Address dictionaries with "address" and "prefix" entries.
    #[zbus(property)]
    fn address_data(&self) -> Result<Vec<HashMap<String, OwnedValue>>>;

    /// Default gateway, empty if none.
    #[zbus(property)]
    fn gateway(&self) -> Result<String>;
}
