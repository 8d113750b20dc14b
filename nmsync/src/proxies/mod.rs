//! D-Bus proxy traits for the NetworkManager interfaces this crate uses.
//!
//! The `zbus::proxy` macro generates proxy implementations that handle
//! D-Bus communication automatically. Proxies are built per object path via
//! the generated builders; dropping a proxy releases its match rules, so
//! every acquisition is scoped and released on all exit paths.
//!
//! # NetworkManager D-Bus Structure
//!
//! - `/org/freedesktop/NetworkManager` - Main NM object
//! - `/org/freedesktop/NetworkManager/Devices/*` - Device objects
//! - `/org/freedesktop/NetworkManager/AccessPoint/*` - Access point objects
//! - `/org/freedesktop/NetworkManager/ActiveConnection/*` - Active connections
//! - `/org/freedesktop/NetworkManager/Settings` - Connection settings
//! - `/org/freedesktop/NetworkManager/IP4Config/*` (and IP6) - Address state
//! - `/org/freedesktop/NetworkManager/AgentManager` - Secret agent registry

mod access_point;
mod active_connection;
mod agent_manager;
mod device;
mod ip_config;
mod main_nm;
mod settings;
mod wireless;

pub use access_point::NMAccessPointProxy;
pub use active_connection::NMActiveConnectionProxy;
pub use agent_manager::NMAgentManagerProxy;
pub use device::NMDeviceProxy;
pub use ip_config::{NMIp4ConfigProxy, NMIp6ConfigProxy};
pub use main_nm::NMProxy;
pub use settings::{NMSettingsConnectionProxy, NMSettingsProxy};
pub use wireless::NMWirelessProxy;
