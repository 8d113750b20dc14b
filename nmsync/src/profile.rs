//! Connection profile construction.
//!
//! Validates a connect request and renders it into the nested settings
//! dictionaries NetworkManager's `AddAndActivateConnection2` and `Update`
//! methods expect:
//!
//! - `connection`: General settings (type, id, uuid, interface, autoconnect)
//! - `802-11-wireless`: WiFi settings (ssid, mode, hidden, security reference)
//! - `802-11-wireless-security`: Security settings (key-mgmt, psk)
//! - `ipv4` / `ipv6`: IP configuration ("auto" for DHCP/SLAAC)

use std::collections::HashMap;
use zvariant::Value;

use crate::Result;
use crate::constants::{MAX_PASSPHRASE_CHARS, MAX_SSID_BYTES, MIN_PASSPHRASE_CHARS};
use crate::models::{ConnectRequest, ConnectionProfile, SecurityMode, SyncError};

/// Validates a connect request without touching the bus.
///
/// Validation order: SSID first, then passphrase, then security-mode
/// support. For WPS-derived connections the passphrase is supplied later
/// out-of-band by the secret agent, so its length is not checked.
pub fn validate(req: &ConnectRequest) -> Result<()> {
    if req.ssid.is_empty() || req.ssid.len() > MAX_SSID_BYTES {
        return Err(SyncError::InvalidSsid);
    }

    if matches!(req.security, SecurityMode::WpaPsk | SecurityMode::Sae) && !req.wps {
        let ok = req
            .passphrase
            .as_ref()
            .is_some_and(|p| (MIN_PASSPHRASE_CHARS..=MAX_PASSPHRASE_CHARS).contains(&p.len()));
        if !ok {
            return Err(SyncError::WeakPassphrase);
        }
    }

    match req.security {
        SecurityMode::None | SecurityMode::WpaPsk | SecurityMode::Sae => Ok(()),
        SecurityMode::Eap => Err(SyncError::UnsupportedSecurity(SecurityMode::Eap)),
    }
}

/// Validates a connect request and produces a profile with a freshly
/// generated identifier.
pub fn build_profile(req: &ConnectRequest, interface: &str) -> Result<ConnectionProfile> {
    validate(req)?;

    Ok(ConnectionProfile {
        uuid: uuid::Uuid::new_v4().to_string(),
        ssid: req.ssid.clone(),
        security: req.security,
        passphrase: if req.security == SecurityMode::None {
            None
        } else {
            req.passphrase.clone()
        },
        interface: interface.to_string(),
        persist: req.persist,
        existing_path: None,
    })
}

/// Builds the `connection` section.
fn connection_section(profile: &ConnectionProfile) -> HashMap<&'static str, Value<'static>> {
    let mut s = HashMap::new();
    s.insert("type", Value::from("802-11-wireless"));
    s.insert("id", Value::from(profile.ssid.clone()));
    s.insert("uuid", Value::from(profile.uuid.clone()));
    s.insert("interface-name", Value::from(profile.interface.clone()));
    s.insert("autoconnect", Value::from(true));
    s
}

/// Builds the `802-11-wireless` section.
///
/// Profiles are always built hidden to force active probing rather than
/// passive beacon-only discovery.
fn wireless_section(profile: &ConnectionProfile) -> HashMap<&'static str, Value<'static>> {
    let mut s = HashMap::new();
    s.insert("ssid", Value::from(profile.ssid.as_bytes().to_vec()));
    s.insert("mode", Value::from("infrastructure"));
    s.insert("hidden", Value::from(true));
    if matches!(profile.security, SecurityMode::WpaPsk | SecurityMode::Sae) {
        s.insert("security", Value::from("802-11-wireless-security"));
    }
    s
}

/// Builds the `802-11-wireless-security` section, `None` for modes with no
/// renderable security settings.
///
/// Profiles without a stored passphrase (the WPS path) mark the psk
/// agent-owned so NetworkManager queries the registered secret agent.
fn security_section(profile: &ConnectionProfile) -> Option<HashMap<&'static str, Value<'static>>> {
    let key_mgmt = match profile.security {
        SecurityMode::WpaPsk => "wpa-psk",
        SecurityMode::Sae => "sae",
        SecurityMode::None | SecurityMode::Eap => return None,
    };
    let mut sec = HashMap::new();
    sec.insert("key-mgmt", Value::from(key_mgmt));

    match &profile.passphrase {
        Some(psk) => {
            sec.insert("psk", Value::from(psk.clone()));
            sec.insert("psk-flags", Value::from(0u32));
        }
        None => {
            // agent-owned
            sec.insert("psk-flags", Value::from(1u32));
        }
    }
    Some(sec)
}

/// Renders a validated profile into the full settings dictionary.
pub fn settings_dict(
    profile: &ConnectionProfile,
) -> HashMap<&'static str, HashMap<&'static str, Value<'static>>> {
    let mut conn: HashMap<&'static str, HashMap<&'static str, Value<'static>>> = HashMap::new();

    conn.insert("connection", connection_section(profile));
    conn.insert("802-11-wireless", wireless_section(profile));

    if let Some(sec) = security_section(profile) {
        conn.insert("802-11-wireless-security", sec);
    }

    let mut ipv4 = HashMap::new();
    ipv4.insert("method", Value::from("auto"));
    conn.insert("ipv4", ipv4);

    let mut ipv6 = HashMap::new();
    ipv6.insert("method", Value::from("auto"));
    conn.insert("ipv6", ipv6);

    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(ssid: &str, security: SecurityMode, passphrase: Option<&str>) -> ConnectRequest {
        ConnectRequest {
            ssid: ssid.into(),
            passphrase: passphrase.map(Into::into),
            security,
            persist: true,
            wps: false,
        }
    }

    #[test]
    fn empty_ssid_rejected() {
        let err = build_profile(&req("", SecurityMode::None, None), "wlan0").unwrap_err();
        assert!(matches!(err, SyncError::InvalidSsid));
    }

    #[test]
    fn overlong_ssid_rejected() {
        let ssid = "a".repeat(33);
        let err = build_profile(&req(&ssid, SecurityMode::None, None), "wlan0").unwrap_err();
        assert!(matches!(err, SyncError::InvalidSsid));
    }

    #[test]
    fn exactly_32_byte_ssid_accepted() {
        let ssid = "a".repeat(32);
        assert!(build_profile(&req(&ssid, SecurityMode::None, None), "wlan0").is_ok());
    }

    #[test]
    fn short_passphrase_rejected() {
        let err =
            build_profile(&req("home", SecurityMode::WpaPsk, Some("short")), "wlan0").unwrap_err();
        assert!(matches!(err, SyncError::WeakPassphrase));
    }

    #[test]
    fn missing_passphrase_rejected_for_sae() {
        let err = build_profile(&req("home", SecurityMode::Sae, None), "wlan0").unwrap_err();
        assert!(matches!(err, SyncError::WeakPassphrase));
    }

    #[test]
    fn open_network_needs_no_passphrase() {
        let profile = build_profile(&req("home", SecurityMode::None, None), "wlan0").unwrap();
        assert!(profile.passphrase.is_none());
        assert_eq!(profile.security, SecurityMode::None);
    }

    #[test]
    fn wps_request_skips_passphrase_check() {
        let mut r = req("home", SecurityMode::WpaPsk, None);
        r.wps = true;
        let profile = build_profile(&r, "wlan0").unwrap();
        assert!(profile.passphrase.is_none());
    }

    #[test]
    fn validate_rejects_without_building() {
        assert!(matches!(
            validate(&req("", SecurityMode::None, None)),
            Err(SyncError::InvalidSsid)
        ));
        assert!(matches!(
            validate(&req("home", SecurityMode::WpaPsk, Some("short"))),
            Err(SyncError::WeakPassphrase)
        ));
        assert!(matches!(
            validate(&req("corp", SecurityMode::Eap, Some("password1"))),
            Err(SyncError::UnsupportedSecurity(SecurityMode::Eap))
        ));
        assert!(validate(&req("home", SecurityMode::None, None)).is_ok());
    }

    #[test]
    fn hand_built_eap_profile_renders_without_security_section() {
        // The profile fields are public; rendering must stay total even for
        // a profile that never went through build_profile.
        let profile = ConnectionProfile {
            uuid: "2ff80ffe-85c4-4b2b-9b27-3155fa4fe2a2".into(),
            ssid: "corp".into(),
            security: SecurityMode::Eap,
            passphrase: None,
            interface: "wlan0".into(),
            persist: true,
            existing_path: None,
        };
        let dict = settings_dict(&profile);
        assert!(!dict.contains_key("802-11-wireless-security"));
        let wireless = dict.get("802-11-wireless").unwrap();
        assert!(wireless.get("security").is_none());
    }

    #[test]
    fn eap_is_unsupported() {
        let err = build_profile(&req("corp", SecurityMode::Eap, Some("password1")), "wlan0")
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::UnsupportedSecurity(SecurityMode::Eap)
        ));
    }

    #[test]
    fn fresh_uuid_per_profile() {
        let a = build_profile(&req("home", SecurityMode::None, None), "wlan0").unwrap();
        let b = build_profile(&req("home", SecurityMode::None, None), "wlan0").unwrap();
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn dict_for_open_network_has_no_security_section() {
        let profile = build_profile(&req("open_net", SecurityMode::None, None), "wlan0").unwrap();
        let dict = settings_dict(&profile);
        assert!(dict.contains_key("connection"));
        assert!(dict.contains_key("802-11-wireless"));
        assert!(dict.contains_key("ipv4"));
        assert!(dict.contains_key("ipv6"));
        assert!(!dict.contains_key("802-11-wireless-security"));
    }

    #[test]
    fn dict_links_wireless_to_security_for_psk() {
        let profile = build_profile(
            &req("secure", SecurityMode::WpaPsk, Some("password123")),
            "wlan0",
        )
        .unwrap();
        let dict = settings_dict(&profile);
        let wireless = dict.get("802-11-wireless").unwrap();
        assert_eq!(
            wireless.get("security"),
            Some(&Value::from("802-11-wireless-security"))
        );
        let sec = dict.get("802-11-wireless-security").unwrap();
        assert_eq!(sec.get("key-mgmt"), Some(&Value::from("wpa-psk")));
        assert_eq!(
            sec.get("psk"),
            Some(&Value::from("password123".to_string()))
        );
        assert_eq!(sec.get("psk-flags"), Some(&Value::from(0u32)));
    }

    #[test]
    fn sae_key_mgmt_for_sae_profiles() {
        let profile = build_profile(
            &req("wpa3net", SecurityMode::Sae, Some("password123")),
            "wlan0",
        )
        .unwrap();
        let dict = settings_dict(&profile);
        let sec = dict.get("802-11-wireless-security").unwrap();
        assert_eq!(sec.get("key-mgmt"), Some(&Value::from("sae")));
    }

    #[test]
    fn wps_profile_marks_psk_agent_owned() {
        let mut r = req("pbcnet", SecurityMode::WpaPsk, None);
        r.wps = true;
        let profile = build_profile(&r, "wlan0").unwrap();
        let dict = settings_dict(&profile);
        let sec = dict.get("802-11-wireless-security").unwrap();
        assert!(sec.get("psk").is_none());
        assert_eq!(sec.get("psk-flags"), Some(&Value::from(1u32)));
    }

    #[test]
    fn profiles_are_always_hidden() {
        let profile = build_profile(&req("home", SecurityMode::None, None), "wlan0").unwrap();
        let dict = settings_dict(&profile);
        let wireless = dict.get("802-11-wireless").unwrap();
        assert_eq!(wireless.get("hidden"), Some(&Value::from(true)));
        assert_eq!(
            wireless.get("ssid"),
            Some(&Value::from(b"home".to_vec()))
        );
    }

    #[test]
    fn interface_name_is_pinned() {
        let profile = build_profile(&req("home", SecurityMode::None, None), "wlp3s0").unwrap();
        let dict = settings_dict(&profile);
        let conn = dict.get("connection").unwrap();
        assert_eq!(
            conn.get("interface-name"),
            Some(&Value::from("wlp3s0".to_string()))
        );
    }
}
