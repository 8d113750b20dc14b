//! NetworkManager Settings proxies.

use std::collections::HashMap;
use zbus::{Result, proxy};
use zvariant::{OwnedObjectPath, OwnedValue, Value};

/// Proxy for the connection settings registry.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager/Settings"
)]
pub trait NMSettings {
    /// Returns paths to all saved connection profiles.
    fn list_connections(&self) -> Result<Vec<OwnedObjectPath>>;

    /// Saves a new connection profile without activating it.
    fn add_connection(
        &self,
        connection: HashMap<&str, HashMap<&str, Value<'_>>>,
    ) -> Result<OwnedObjectPath>;
}

/// Proxy for a single saved connection profile.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings.Connection",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMSettingsConnection {
    /// Returns the profile's full settings dictionary (secrets excluded).
    fn get_settings(&self) -> Result<HashMap<String, HashMap<String, OwnedValue>>>;

    /// Replaces the profile's settings and writes them to disk.
    fn update(&self, properties: HashMap<&str, HashMap<&str, Value<'_>>>) -> Result<()>;

    /// Permanently deletes the profile.
    fn delete(&self) -> Result<()>;
}
