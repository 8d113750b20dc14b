//! Device enumeration and per-interface operations.
//!
//! Provides lookup of devices by interface name, interface enable/disable,
//! and IP settings retrieval/update against the live configuration objects.

use log::{debug, error};
use std::collections::HashMap;
use zbus::Connection;
use zvariant::{OwnedObjectPath, OwnedValue, Value};

use crate::Result;
use crate::config::ServiceConfig;
use crate::constants::bus;
use crate::models::{
    DeviceState, InterfaceInfo, InterfaceRole, IpFamily, IpSettings, SyncError,
};
use crate::proxies::{
    NMDeviceProxy, NMIp4ConfigProxy, NMIp6ConfigProxy, NMProxy, NMSettingsConnectionProxy,
};

/// Finds the device whose interface name matches `name`.
pub(crate) async fn find_device(conn: &Connection, name: &str) -> Result<OwnedObjectPath> {
    let nm = NMProxy::new(conn).await?;
    for path in nm.get_devices().await? {
        let dev = NMDeviceProxy::builder(conn)
            .path(path.clone())?
            .build()
            .await?;
        if dev.interface().await? == name {
            return Ok(path);
        }
    }
    Err(SyncError::NoSuchInterface)
}

/// Finds the configured WiFi device.
pub(crate) async fn find_wifi_device(
    conn: &Connection,
    cfg: &ServiceConfig,
) -> Result<OwnedObjectPath> {
    find_device(conn, &cfg.wifi_interface)
        .await
        .map_err(|_| SyncError::NoWifiDevice)
}

/// Maps an interface name to its configured role, if it is one of the two
/// monitored interfaces.
pub(crate) fn role_for(cfg: &ServiceConfig, interface: &str) -> Option<InterfaceRole> {
    if interface == cfg.wifi_interface {
        Some(InterfaceRole::Wifi)
    } else if interface == cfg.ethernet_interface {
        Some(InterfaceRole::Ethernet)
    } else {
        None
    }
}

/// Lists the monitored interfaces with their current status.
pub(crate) async fn list_interfaces(
    conn: &Connection,
    cfg: &ServiceConfig,
) -> Result<Vec<InterfaceInfo>> {
    let nm = NMProxy::new(conn).await?;
    let wifi_enabled = nm.wireless_enabled().await?;

    let mut out = Vec::new();
    for path in nm.get_devices().await? {
        let dev = NMDeviceProxy::builder(conn)
            .path(path.clone())?
            .build()
            .await?;
        let name = dev.interface().await?;
        let Some(role) = role_for(cfg, &name) else {
            continue;
        };
        let state = DeviceState::from(dev.state().await?);
        out.push(InterfaceInfo {
            name,
            role,
            mac_address: dev.hw_address().await.unwrap_or_default(),
            enabled: match role {
                InterfaceRole::Wifi => wifi_enabled && dev.managed().await?,
                InterfaceRole::Ethernet => dev.managed().await?,
            },
            connected: state == DeviceState::Activated,
        });
    }
    Ok(out)
}

/// Enables or disables an interface.
///
/// The WiFi interface toggles the global wireless switch; the Ethernet
/// interface toggles whether NetworkManager manages the device.
pub(crate) async fn set_interface_enabled(
    conn: &Connection,
    cfg: &ServiceConfig,
    interface: &str,
    enabled: bool,
) -> Result<()> {
    match role_for(cfg, interface) {
        Some(InterfaceRole::Wifi) => {
            let nm = NMProxy::new(conn).await?;
            nm.set_wireless_enabled(enabled).await.map_err(|e| {
                error!("Setting wireless enabled={enabled} failed: {e}");
                SyncError::ExternalService
            })
        }
        Some(InterfaceRole::Ethernet) => {
            let path = find_device(conn, interface).await?;
            let dev = NMDeviceProxy::builder(conn).path(path)?.build().await?;
            dev.set_managed(enabled).await.map_err(|e| {
                error!("Setting managed={enabled} on {interface} failed: {e}");
                SyncError::ExternalService
            })
        }
        None => Err(SyncError::NoSuchInterface),
    }
}

fn string_entry(map: &HashMap<String, OwnedValue>, key: &str) -> Option<String> {
    map.get(key).and_then(|v| match &**v {
        Value::Str(s) => Some(s.to_string()),
        _ => None,
    })
}

fn u32_entry(map: &HashMap<String, OwnedValue>, key: &str) -> Option<u32> {
    map.get(key).and_then(|v| match &**v {
        Value::U32(n) => Some(*n),
        _ => None,
    })
}

/// Reads the live IP settings for `(interface, family)` from the device's
/// IP configuration object.
pub(crate) async fn get_ip_settings(
    conn: &Connection,
    interface: &str,
    family: IpFamily,
) -> Result<IpSettings> {
    let path = find_device(conn, interface).await?;
    let dev = NMDeviceProxy::builder(conn).path(path)?.build().await?;

    let mut settings = IpSettings {
        family,
        automatic: true,
        address: None,
        prefix: None,
        gateway: None,
        dns: Vec::new(),
    };

    match family {
        IpFamily::V4 => {
            let cfg_path = dev.ip4_config().await?;
            if cfg_path.as_str() == bus::ROOT_PATH {
                return Ok(settings);
            }
            let ip = NMIp4ConfigProxy::builder(conn).path(cfg_path)?.build().await?;
            if let Some(first) = ip.address_data().await?.first() {
                settings.address = string_entry(first, "address");
                settings.prefix = u32_entry(first, "prefix");
            }
            let gw = ip.gateway().await?;
            settings.gateway = (!gw.is_empty()).then_some(gw);
            for ns in ip.nameserver_data().await? {
                if let Some(addr) = string_entry(&ns, "address") {
                    settings.dns.push(addr);
                }
            }
        }
        IpFamily::V6 => {
            let cfg_path = dev.ip6_config().await?;
            if cfg_path.as_str() == bus::ROOT_PATH {
                return Ok(settings);
            }
            let ip = NMIp6ConfigProxy::builder(conn).path(cfg_path)?.build().await?;
            if let Some(first) = ip.address_data().await?.first() {
                settings.address = string_entry(first, "address");
                settings.prefix = u32_entry(first, "prefix");
            }
            let gw = ip.gateway().await?;
            settings.gateway = (!gw.is_empty()).then_some(gw);
        }
    }

    Ok(settings)
}

/// Writes IP settings into the profile active on `interface`.
///
/// Rewrites the relevant `ipv4`/`ipv6` section of the backing profile and
/// asks NetworkManager to store it. Fails with `NotFound` when no
/// connection is active on the interface.
pub(crate) async fn set_ip_settings(
    conn: &Connection,
    interface: &str,
    settings: &IpSettings,
) -> Result<()> {
    let path = find_device(conn, interface).await?;
    let dev = NMDeviceProxy::builder(conn).path(path)?.build().await?;

    let active = dev.active_connection().await?;
    if active.as_str() == bus::ROOT_PATH {
        return Err(SyncError::NotFound);
    }
    let active_proxy = crate::proxies::NMActiveConnectionProxy::builder(conn)
        .path(active)?
        .build()
        .await?;
    let profile_path = active_proxy.connection().await?;

    let sc = NMSettingsConnectionProxy::builder(conn)
        .path(profile_path.clone())?
        .build()
        .await?;
    let current = sc.get_settings().await?;

    // Re-borrow the stored settings into the owned dictionary shape Update
    // expects, replacing the section for the requested family.
    let mut updated: HashMap<&str, HashMap<&str, Value<'_>>> = HashMap::new();
    let section_key = match settings.family {
        IpFamily::V4 => "ipv4",
        IpFamily::V6 => "ipv6",
    };
    let mut borrowed: Vec<(&String, &HashMap<String, OwnedValue>)> = current.iter().collect();
    borrowed.retain(|(name, _)| name.as_str() != section_key);
    for (name, section) in borrowed {
        let mut out = HashMap::new();
        for (k, v) in section {
            out.insert(k.as_str(), (**v).clone());
        }
        updated.insert(name.as_str(), out);
    }
    updated.insert(section_key, ip_section(settings));

    sc.update(updated).await.map_err(|e| {
        error!("Updating IP settings on {} failed: {e}", profile_path.as_str());
        SyncError::ExternalService
    })?;
    debug!("Updated {section_key} settings on {}", profile_path.as_str());
    Ok(())
}

/// Renders an `ipv4`/`ipv6` section from the requested settings.
fn ip_section(settings: &IpSettings) -> HashMap<&'static str, Value<'static>> {
    let mut s = HashMap::new();
    if settings.automatic {
        s.insert("method", Value::from("auto"));
        return s;
    }
    s.insert("method", Value::from("manual"));
    if let (Some(address), Some(prefix)) = (&settings.address, settings.prefix) {
        let mut addr = HashMap::new();
        addr.insert("address", Value::from(address.clone()));
        addr.insert("prefix", Value::from(prefix));
        s.insert("address-data", Value::from(vec![addr]));
    }
    if let Some(gw) = &settings.gateway {
        s.insert("gateway", Value::from(gw.clone()));
    }
    if !settings.dns.is_empty() && settings.family == IpFamily::V4 {
        // dns entries are u32 network-order for IPv4
        let dns: Vec<u32> = settings
            .dns
            .iter()
            .filter_map(|d| d.parse::<std::net::Ipv4Addr>().ok())
            .map(|a| u32::from_be_bytes(a.octets()).to_be())
            .collect();
        s.insert("dns", Value::from(dns));
    }
    s
}
