//! Connection orchestration.
//!
//! Drives the connect/disconnect lifecycle: matching requests against
//! saved profiles, reconciling the requested security mode with what the
//! network actually advertises, and choosing between reactivating an
//! existing profile and creating a fresh one.

use log::{debug, error, info, warn};
use std::collections::HashMap;
use zbus::Connection;
use zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};

use crate::Result;
use crate::catalog;
use crate::config::ServiceConfig;
use crate::constants::bus;
use crate::device;
use crate::models::{AccessPoint, ConnectRequest, ConnectionProfile, SecurityMode, SyncError};
use crate::profile::{build_profile, settings_dict, validate};
use crate::proxies::{
    NMActiveConnectionProxy, NMDeviceProxy, NMProxy, NMSettingsConnectionProxy, NMSettingsProxy,
};
use crate::util::decode_ssid_or_empty;

fn root_path() -> OwnedObjectPath {
    ObjectPath::from_str_unchecked(bus::ROOT_PATH).into()
}

/// Identity of a saved WiFi profile, as read from its settings.
struct KnownProfile {
    path: OwnedObjectPath,
    ssid: String,
    uuid: Option<String>,
    interface: Option<String>,
}

impl KnownProfile {
    /// Whether the profile is usable on `interface`: it either pins that
    /// interface name or pins none at all.
    fn applies_to(&self, interface: &str) -> bool {
        self.interface.as_deref().is_none_or(|i| i == interface)
    }
}

/// Extracts a string entry from a stored settings dictionary.
fn string_setting(
    settings: &HashMap<String, HashMap<String, OwnedValue>>,
    section: &str,
    key: &str,
) -> Option<String> {
    settings.get(section)?.get(key).and_then(|v| match &**v {
        Value::Str(s) => Some(s.to_string()),
        _ => None,
    })
}

/// Extracts the SSID a saved profile targets, from its `802-11-wireless`
/// section with the profile id as fallback.
fn profile_ssid(settings: &HashMap<String, HashMap<String, OwnedValue>>) -> Option<String> {
    if let Some(wireless) = settings.get("802-11-wireless")
        && let Some(value) = wireless.get("ssid")
        && let Value::Array(arr) = &**value
    {
        let mut raw = Vec::with_capacity(arr.len());
        for item in arr.iter() {
            if let Value::U8(b) = item {
                raw.push(*b);
            }
        }
        let ssid = decode_ssid_or_empty(&raw);
        if !ssid.is_empty() {
            return Some(ssid);
        }
    }
    string_setting(settings, "connection", "id")
}

/// Lists saved WiFi profiles with their identity fields.
///
/// Profiles whose settings cannot be read are skipped rather than failing
/// the whole listing.
async fn known_profiles(conn: &Connection) -> Result<Vec<KnownProfile>> {
    let settings = NMSettingsProxy::new(conn).await?;
    let mut out = Vec::new();
    for path in settings.list_connections().await? {
        let sc = NMSettingsConnectionProxy::builder(conn)
            .path(path.clone())?
            .build()
            .await?;
        let dict = match sc.get_settings().await {
            Ok(d) => d,
            Err(e) => {
                debug!("Skipping unreadable profile {}: {e}", path.as_str());
                continue;
            }
        };
        let is_wifi = string_setting(&dict, "connection", "type")
            .is_some_and(|t| t == "802-11-wireless");
        if !is_wifi {
            continue;
        }
        if let Some(ssid) = profile_ssid(&dict) {
            out.push(KnownProfile {
                path,
                ssid,
                uuid: string_setting(&dict, "connection", "uuid"),
                interface: string_setting(&dict, "connection", "interface-name"),
            });
        }
    }
    Ok(out)
}

/// Returns the SSIDs of all saved WiFi profiles.
pub(crate) async fn get_known_ssids(conn: &Connection) -> Result<Vec<String>> {
    let mut ssids: Vec<String> = known_profiles(conn)
        .await?
        .into_iter()
        .map(|p| p.ssid)
        .collect();
    ssids.sort();
    ssids.dedup();
    Ok(ssids)
}

/// Takes over a saved profile's identity for an update-and-reactivate.
///
/// `Settings.Connection.Update` refuses a changed `connection.uuid`, so the
/// freshly minted one is replaced with the stored uuid.
fn adopt_saved_identity(profile: &mut ConnectionProfile, saved: KnownProfile) {
    if let Some(uuid) = saved.uuid {
        profile.uuid = uuid;
    }
    profile.existing_path = Some(saved.path);
}

/// Picks the security mode to use: the live network's advertised mode wins
/// over the requested one when they disagree, since connecting with the
/// wrong key management fails late and opaquely.
pub(crate) fn resolve_security(requested: SecurityMode, live: Option<&AccessPoint>) -> SecurityMode {
    match live {
        Some(ap) if ap.security != requested => {
            warn!(
                "'{}' advertises {} but {} was requested, using advertised",
                ap.ssid, ap.security, requested
            );
            ap.security
        }
        Some(_) => requested,
        None => {
            debug!("Target network not in scan results, trusting requested security");
            requested
        }
    }
}

/// Connects to a WiFi network.
///
/// Reuses a saved profile for the SSID when one exists (updating it with
/// the new settings first); otherwise creates one via
/// `AddAndActivateConnection2`, marking it volatile when the request is
/// not persistent.
pub(crate) async fn connect(
    conn: &Connection,
    cfg: &ServiceConfig,
    req: &ConnectRequest,
) -> Result<()> {
    // Reject malformed requests before any bus traffic.
    validate(req)?;

    let device_path = device::find_wifi_device(conn, cfg).await?;

    let live = catalog::find_by_ssid(conn, &device_path, &req.ssid).await?;
    let mut effective = req.clone();
    effective.security = resolve_security(req.security, live.as_ref());

    let mut profile = build_profile(&effective, &cfg.wifi_interface)?;
    let saved = known_profiles(conn)
        .await?
        .into_iter()
        .find(|p| p.ssid == req.ssid && p.applies_to(&cfg.wifi_interface));
    if let Some(saved) = saved {
        adopt_saved_identity(&mut profile, saved);
    }

    let dict = settings_dict(&profile);
    let specific_object = live.and_then(|ap| ap.path).unwrap_or_else(root_path);
    let nm = NMProxy::new(conn).await?;

    match &profile.existing_path {
        Some(path) => {
            info!("Reusing saved profile {} for '{}'", path.as_str(), req.ssid);
            let sc = NMSettingsConnectionProxy::builder(conn)
                .path(path.clone())?
                .build()
                .await?;
            sc.update(dict).await.map_err(|e| {
                error!("Updating profile for '{}' failed: {e}", req.ssid);
                SyncError::ExternalService
            })?;
            nm.activate_connection(path.clone(), device_path, specific_object)
                .await
                .map_err(|e| {
                    error!("Activating '{}' failed: {e}", req.ssid);
                    SyncError::ExternalService
                })?;
        }
        None => {
            info!("Creating new profile for '{}'", req.ssid);
            let mut options: HashMap<&str, Value<'_>> = HashMap::new();
            if !profile.persist {
                options.insert("persist", Value::from("volatile"));
            }
            nm.add_and_activate_connection2(dict, device_path, specific_object, options)
                .await
                .map_err(|e| {
                    error!("Add-and-activate for '{}' failed: {e}", req.ssid);
                    SyncError::ExternalService
                })?;
        }
    }

    Ok(())
}

/// Saves a profile for later automatic use without activating it.
pub(crate) async fn add_to_known_ssids(
    conn: &Connection,
    cfg: &ServiceConfig,
    req: &ConnectRequest,
) -> Result<()> {
    let profile = build_profile(req, &cfg.wifi_interface)?;
    let dict = settings_dict(&profile);
    let settings = NMSettingsProxy::new(conn).await?;
    let path = settings.add_connection(dict).await.map_err(|e| {
        error!("Saving profile for '{}' failed: {e}", req.ssid);
        SyncError::ExternalService
    })?;
    info!("Saved profile {} for '{}'", path.as_str(), req.ssid);
    Ok(())
}

/// Deletes every saved profile targeting `ssid`.
///
/// Fails with `NotFound` when no profile matches; a deletion error on any
/// match fails the operation after attempting the rest.
pub(crate) async fn remove_known_ssid(conn: &Connection, ssid: &str) -> Result<()> {
    let mut found = false;
    let mut failed = false;
    for profile in known_profiles(conn).await? {
        if profile.ssid != ssid {
            continue;
        }
        found = true;
        let sc = NMSettingsConnectionProxy::builder(conn)
            .path(profile.path.clone())?
            .build()
            .await?;
        match sc.delete().await {
            Ok(()) => info!("Deleted profile {} for '{ssid}'", profile.path.as_str()),
            Err(e) => {
                error!("Deleting profile {} failed: {e}", profile.path.as_str());
                failed = true;
            }
        }
    }
    if !found {
        return Err(SyncError::NotFound);
    }
    if failed {
        return Err(SyncError::ExternalService);
    }
    Ok(())
}

/// Disconnects the WiFi device.
///
/// A device already down is success; an actual disconnect refusal from the
/// daemon is reported as a failure.
pub(crate) async fn disconnect(conn: &Connection, cfg: &ServiceConfig) -> Result<()> {
    let device_path = device::find_wifi_device(conn, cfg).await?;
    let dev = NMDeviceProxy::builder(conn)
        .path(device_path)?
        .build()
        .await?;

    let active = dev.active_connection().await?;
    if active.as_str() == bus::ROOT_PATH {
        debug!("{}: already disconnected", cfg.wifi_interface);
        return Ok(());
    }

    dev.disconnect().await.map_err(|e| {
        error!("Disconnect of {} failed: {e}", cfg.wifi_interface);
        SyncError::ExternalService
    })
}

/// Returns the SSID of the currently connected WiFi network, if any.
pub(crate) async fn get_connected_ssid(
    conn: &Connection,
    cfg: &ServiceConfig,
) -> Result<Option<String>> {
    let device_path = device::find_wifi_device(conn, cfg).await?;
    let dev = NMDeviceProxy::builder(conn)
        .path(device_path)?
        .build()
        .await?;

    let active = dev.active_connection().await?;
    if active.as_str() == bus::ROOT_PATH {
        return Ok(None);
    }
    let active_proxy = NMActiveConnectionProxy::builder(conn)
        .path(active)?
        .build()
        .await?;
    let settings_path = active_proxy.connection().await?;
    let sc = NMSettingsConnectionProxy::builder(conn)
        .path(settings_path)?
        .build()
        .await?;
    Ok(profile_ssid(&sc.get_settings().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalQuality;

    fn ap(ssid: &str, security: SecurityMode) -> AccessPoint {
        AccessPoint {
            ssid: ssid.into(),
            bssid: "aa:bb:cc:dd:ee:ff".into(),
            strength_pct: 70,
            strength_dbm: -48,
            quality: SignalQuality::Excellent,
            frequency_mhz: 5180,
            bitrate_kbps: 866_000,
            security,
            wps_pbc: false,
            path: None,
        }
    }

    #[test]
    fn advertised_security_overrides_request() {
        let live = ap("home", SecurityMode::Sae);
        assert_eq!(
            resolve_security(SecurityMode::WpaPsk, Some(&live)),
            SecurityMode::Sae
        );
    }

    #[test]
    fn matching_security_is_kept() {
        let live = ap("home", SecurityMode::WpaPsk);
        assert_eq!(
            resolve_security(SecurityMode::WpaPsk, Some(&live)),
            SecurityMode::WpaPsk
        );
    }

    #[test]
    fn unscanned_network_trusts_request() {
        assert_eq!(
            resolve_security(SecurityMode::Sae, None),
            SecurityMode::Sae
        );
    }

    fn stored_settings(
        entries: &[(&str, &str, Value<'static>)],
    ) -> HashMap<String, HashMap<String, OwnedValue>> {
        let mut settings: HashMap<String, HashMap<String, OwnedValue>> = HashMap::new();
        for (section, key, value) in entries {
            settings
                .entry(section.to_string())
                .or_default()
                .insert(key.to_string(), OwnedValue::try_from(value.clone()).unwrap());
        }
        settings
    }

    #[test]
    fn stored_uuid_is_read_from_the_connection_section() {
        let settings = stored_settings(&[
            ("connection", "uuid", Value::from("8b7e306b-9e17-4e0c-90f6-cb0daed2dc54")),
            ("connection", "id", Value::from("home")),
        ]);
        assert_eq!(
            string_setting(&settings, "connection", "uuid").as_deref(),
            Some("8b7e306b-9e17-4e0c-90f6-cb0daed2dc54")
        );
        // A profile without one stays None rather than inventing a value.
        let bare = stored_settings(&[("connection", "id", Value::from("home"))]);
        assert_eq!(string_setting(&bare, "connection", "uuid"), None);
    }

    #[test]
    fn profile_ssid_prefers_the_byte_array() {
        let settings = stored_settings(&[
            ("connection", "id", Value::from("renamed")),
            ("802-11-wireless", "ssid", Value::from(b"home".to_vec())),
        ]);
        assert_eq!(profile_ssid(&settings).as_deref(), Some("home"));

        let no_bytes = stored_settings(&[("connection", "id", Value::from("renamed"))]);
        assert_eq!(profile_ssid(&no_bytes).as_deref(), Some("renamed"));
    }

    #[test]
    fn reused_profile_keeps_the_stored_uuid() {
        let mut profile = build_profile(
            &ConnectRequest {
                ssid: "home".into(),
                passphrase: Some("password123".into()),
                security: SecurityMode::WpaPsk,
                persist: true,
                wps: false,
            },
            "wlan0",
        )
        .unwrap();
        let minted = profile.uuid.clone();

        adopt_saved_identity(
            &mut profile,
            KnownProfile {
                path: root_path(),
                ssid: "home".into(),
                uuid: Some("8b7e306b-9e17-4e0c-90f6-cb0daed2dc54".into()),
                interface: Some("wlan0".into()),
            },
        );

        assert_ne!(profile.uuid, minted);
        assert!(profile.existing_path.is_some());
        let dict = settings_dict(&profile);
        assert_eq!(
            dict["connection"].get("uuid"),
            Some(&Value::from(
                "8b7e306b-9e17-4e0c-90f6-cb0daed2dc54".to_string()
            ))
        );
    }

    #[test]
    fn reuse_is_scoped_to_the_pinned_interface() {
        let pinned_elsewhere = KnownProfile {
            path: root_path(),
            ssid: "home".into(),
            uuid: None,
            interface: Some("wlp3s0".into()),
        };
        assert!(!pinned_elsewhere.applies_to("wlan0"));

        let pinned_here = KnownProfile {
            path: root_path(),
            ssid: "home".into(),
            uuid: None,
            interface: Some("wlan0".into()),
        };
        assert!(pinned_here.applies_to("wlan0"));

        let unpinned = KnownProfile {
            path: root_path(),
            ssid: "home".into(),
            uuid: None,
            interface: None,
        };
        assert!(unpinned.applies_to("wlan0"));
    }
}
