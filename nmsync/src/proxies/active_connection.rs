//! NetworkManager Active Connection proxy.

use zbus::{Result, proxy};
use zvariant::OwnedObjectPath;

/// Proxy for the active connection interface.
///
/// Used to resolve the primary connection into an interface name and to
/// locate the settings profile backing a live connection.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Connection.Active",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMActiveConnection {
    /// Paths of the devices this connection is active on.
    #[zbus(property)]
    fn devices(&self) -> Result<Vec<OwnedObjectPath>>;

    /// Path of the settings profile backing this connection.
    #[zbus(property)]
    fn connection(&self) -> Result<OwnedObjectPath>;
}
