//! NetworkManager Device proxy.

use zbus::{Result, proxy};
use zvariant::OwnedObjectPath;

/// Proxy for the NetworkManager device interface.
///
/// Provides access to device properties like interface name, type, state,
/// and the reason for state transitions.
///
/// # Signals
///
/// The `StateChanged` signal is emitted whenever the device state changes.
/// Use `receive_device_state_changed()` to get a stream of state change
/// events.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Device",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMDevice {
    /// The network interface name (e.g., "wlan0").
    #[zbus(property)]
    fn interface(&self) -> Result<String>;

    /// Device type as a numeric code (1 = Ethernet, 2 = WiFi).
    #[zbus(property)]
    fn device_type(&self) -> Result<u32>;

    /// Current device state (100 = activated, 120 = failed).
    #[zbus(property)]
    fn state(&self) -> Result<u32>;

    /// Whether NetworkManager manages this device.
    #[zbus(property)]
    fn managed(&self) -> Result<bool>;

    /// Let NetworkManager manage or release this device.
    #[zbus(property)]
    fn set_managed(&self, value: bool) -> Result<()>;

    /// Current state and reason code for the last state change.
    #[zbus(property)]
    fn state_reason(&self) -> Result<(u32, u32)>;

    /// Hardware (MAC) address of the device.
    #[zbus(property)]
    fn hw_address(&self) -> Result<String>;

    /// Path of the device's IPv4 configuration object, "/" if none.
    #[zbus(property)]
    fn ip4_config(&self) -> Result<OwnedObjectPath>;

    /// Path of the device's IPv6 configuration object, "/" if none.
    #[zbus(property)]
    fn ip6_config(&self) -> Result<OwnedObjectPath>;

    /// Path of the active connection on this device, "/" if none.
    #[zbus(property)]
    fn active_connection(&self) -> Result<OwnedObjectPath>;

    /// Disconnects the device and prevents automatic reactivation.
    fn disconnect(&self) -> Result<()>;

    /// Signal emitted when device state changes.
    ///
    /// The method is named `device_state_changed` to avoid conflicts with
    /// the `state` property's change stream.
    ///
    /// Arguments:
    /// - `new_state`: The new device state code
    /// - `old_state`: The previous device state code
    /// - `reason`: The reason code for the state change
    #[zbus(signal, name = "StateChanged")]
    fn device_state_changed(&self, new_state: u32, old_state: u32, reason: u32);
}
