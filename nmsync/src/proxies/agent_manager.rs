//! NetworkManager Agent Manager proxy.

use zbus::{Result, proxy};

/// Proxy for the secret agent registry.
///
/// Secret agents register here to announce that they can provide and save
/// network secrets; only one agent per session may use a given identifier.
#[proxy(
    interface = "org.freedesktop.NetworkManager.AgentManager",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager/AgentManager"
)]
pub trait NMAgentManager {
    /// Registers the calling connection's secret agent under `identifier`.
    fn register(&self, identifier: &str) -> Result<()>;

    /// Withdraws the calling connection's secret agent.
    fn unregister(&self) -> Result<()>;
}
