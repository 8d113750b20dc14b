//! Connectivity-state synchronization over NetworkManager's D-Bus API.
//!
//! This crate keeps an application's view of network connectivity in sync
//! with NetworkManager: it monitors device and address state, normalizes
//! the daemon's raw state/reason codes into a small set of interface and
//! WiFi states, and orchestrates WiFi connection lifecycle operations
//! (connect, disconnect, saved-profile management, WPS push-button).
//!
//! # Architecture
//!
//! One [`NetworkService`] owns the shared bus connection and the two
//! background tasks:
//!
//! - the event monitor, which subscribes to device state signals, IP
//!   configuration changes, and scan completions, and delivers typed
//!   [`NetworkEvent`]s on an mpsc channel;
//! - the WPS push-button session, a bounded retry loop with a D-Bus-served
//!   secret agent covering agent-owned credentials.
//!
//! Only the two interfaces named in [`ServiceConfig`] are monitored;
//! notifications for any other device are ignored.
//!
//! # Example
//!
//! ```no_run
//! use nmsync::{NetworkService, ServiceConfig};
//!
//! # async fn example() -> nmsync::Result<()> {
//! let service = NetworkService::new(ServiceConfig::default()).await?;
//! let mut events = service.events().await.expect("first take");
//! service.start_monitoring().await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade. Install a
//! logger implementation such as `env_logger` to see output.

// Internal implementation modules
mod catalog;
mod constants;
mod dedup;
mod device;
mod events;
mod orchestrator;
mod proxies;
mod secret_agent;
mod translate;
mod util;
mod wps;

// Public API modules
pub mod config;
pub mod models;
pub mod profile;
pub mod service;

// Re-exported public API
pub use config::ServiceConfig;
pub use models::{
    AccessPoint, ConnectRequest, ConnectionProfile, InterfaceInfo, InterfaceRole, InterfaceState,
    IpFamily, IpSettings, NetworkEvent, SecurityMode, SignalQuality, SyncError, WifiState,
};
pub use service::NetworkService;

/// Convenience result type used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
