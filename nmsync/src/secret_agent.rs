//! NetworkManager secret agent.
//!
//! WPS-derived profiles store no passphrase; the key material comes out of
//! the WPS handshake inside the supplicant. The profile marks the psk
//! agent-owned so NetworkManager asks this agent instead of failing with
//! no-secrets. The agent stalls interactive requests briefly (giving the
//! handshake time to finish, after which NetworkManager cancels the
//! request) and returns no secrets otherwise.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use zbus::{Connection, fdo, interface};
use zvariant::{OwnedObjectPath, OwnedValue};

use crate::Result;
use crate::constants::{bus, secret_agent_flags};
use crate::proxies::NMAgentManagerProxy;

type SecretsDict = HashMap<String, HashMap<String, OwnedValue>>;

/// Shared cancellation gate between the exported agent object and the WPS
/// session that owns it.
#[derive(Debug)]
pub(crate) struct AgentGate {
    cancelled: AtomicBool,
    notify: Notify,
    wait: Duration,
}

impl AgentGate {
    pub(crate) fn new(wait: Duration) -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
            wait,
        })
    }

    /// Wakes any in-flight secrets wait; used on cancel and on session
    /// teardown.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The exported secret agent object.
pub(crate) struct SecretAgent {
    gate: Arc<AgentGate>,
}

impl SecretAgent {
    pub(crate) fn new(gate: Arc<AgentGate>) -> Self {
        Self { gate }
    }
}

#[interface(name = "org.freedesktop.NetworkManager.SecretAgent")]
impl SecretAgent {
    /// Handles a secrets request for a connection profile.
    ///
    /// Interactive requests are held open for a bounded wait so the WPS
    /// handshake can complete (at which point the daemon cancels the
    /// request itself); everything else returns an empty dictionary
    /// immediately.
    async fn get_secrets(
        &self,
        _connection: SecretsDict,
        connection_path: OwnedObjectPath,
        setting_name: String,
        _hints: Vec<String>,
        flags: u32,
    ) -> fdo::Result<SecretsDict> {
        debug!(
            "GetSecrets for {} setting '{setting_name}' (flags {flags:#x})",
            connection_path.as_str()
        );

        let interactive = flags
            & (secret_agent_flags::ALLOW_INTERACTION | secret_agent_flags::USER_REQUESTED)
            != 0;
        if interactive && !self.gate.is_cancelled() {
            let notified = self.gate.notify.notified();
            if tokio::time::timeout(self.gate.wait, notified).await.is_err() {
                debug!("Secrets wait elapsed for '{setting_name}'");
            }
        }

        if self.gate.is_cancelled() {
            return Err(fdo::Error::Failed("secrets request cancelled".into()));
        }
        Ok(HashMap::new())
    }

    async fn cancel_get_secrets(
        &self,
        connection_path: OwnedObjectPath,
        setting_name: String,
    ) -> fdo::Result<()> {
        info!(
            "CancelGetSecrets for {} setting '{setting_name}'",
            connection_path.as_str()
        );
        self.gate.cancel();
        Ok(())
    }

    async fn save_secrets(
        &self,
        _connection: SecretsDict,
        connection_path: OwnedObjectPath,
    ) -> fdo::Result<()> {
        debug!("SaveSecrets for {} (ignored)", connection_path.as_str());
        Ok(())
    }

    async fn delete_secrets(
        &self,
        _connection: SecretsDict,
        connection_path: OwnedObjectPath,
    ) -> fdo::Result<()> {
        debug!("DeleteSecrets for {} (ignored)", connection_path.as_str());
        Ok(())
    }
}

/// Exports the agent object and registers it with the agent manager.
pub(crate) async fn register(conn: &Connection, gate: Arc<AgentGate>) -> Result<()> {
    conn.object_server()
        .at(bus::SECRET_AGENT_PATH, SecretAgent::new(gate))
        .await?;
    let manager = NMAgentManagerProxy::new(conn).await?;
    if let Err(e) = manager.register(bus::SECRET_AGENT_ID).await {
        // Roll back the export so a retry starts clean.
        let _ = conn
            .object_server()
            .remove::<SecretAgent, _>(bus::SECRET_AGENT_PATH)
            .await;
        return Err(e.into());
    }
    info!("Secret agent registered as {}", bus::SECRET_AGENT_ID);
    Ok(())
}

/// Withdraws the agent registration and removes the exported object.
pub(crate) async fn unregister(conn: &Connection) -> Result<()> {
    let manager = NMAgentManagerProxy::new(conn).await?;
    if let Err(e) = manager.unregister().await {
        warn!("Secret agent unregister failed: {e}");
    }
    conn.object_server()
        .remove::<SecretAgent, _>(bus::SECRET_AGENT_PATH)
        .await?;
    info!("Secret agent unregistered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_gate_rejects_requests() {
        let gate = AgentGate::new(Duration::from_millis(10));
        gate.cancel();
        let agent = SecretAgent::new(gate);
        let res = agent
            .get_secrets(
                HashMap::new(),
                OwnedObjectPath::try_from("/org/freedesktop/NetworkManager/Settings/1").unwrap(),
                "802-11-wireless-security".into(),
                Vec::new(),
                secret_agent_flags::USER_REQUESTED,
            )
            .await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn non_interactive_request_returns_empty_immediately() {
        let gate = AgentGate::new(Duration::from_secs(60));
        let agent = SecretAgent::new(gate);
        let secrets = agent
            .get_secrets(
                HashMap::new(),
                OwnedObjectPath::try_from("/org/freedesktop/NetworkManager/Settings/1").unwrap(),
                "802-11-wireless-security".into(),
                Vec::new(),
                0,
            )
            .await
            .unwrap();
        assert!(secrets.is_empty());
    }

    #[tokio::test]
    async fn interactive_request_unblocks_on_cancel() {
        let gate = AgentGate::new(Duration::from_secs(60));
        let agent = SecretAgent::new(gate.clone());
        let waiter = tokio::spawn(async move {
            agent
                .get_secrets(
                    HashMap::new(),
                    OwnedObjectPath::try_from("/org/freedesktop/NetworkManager/Settings/1")
                        .unwrap(),
                    "802-11-wireless-security".into(),
                    Vec::new(),
                    secret_agent_flags::ALLOW_INTERACTION,
                )
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.cancel();
        let res = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter must unblock")
            .expect("task must not panic");
        assert!(res.is_err(), "cancelled request reports failure");
    }
}
