//! Access point catalog.
//!
//! Wraps scan-result retrieval and converts raw radio properties (flags,
//! strength, frequency, mode) into normalized [`AccessPoint`] records,
//! including security-mode inference from advertised capability flags and
//! WPS push-button detection.

use log::{debug, warn};
use std::collections::HashMap;
use zbus::Connection;
use zvariant::OwnedObjectPath;

use crate::Result;
use crate::constants::{MAX_SSID_BYTES, signal_strength};
use crate::models::{AccessPoint, ApFlags, ApSecurityFlags, SecurityMode, SignalQuality};
use crate::proxies::{NMAccessPointProxy, NMWirelessProxy};
use crate::util::decode_ssid_or_empty;

/// Requests a scan on the wireless device. The scan runs asynchronously;
/// results are read after a delay or on the LastScan property change.
pub(crate) async fn request_scan(conn: &Connection, device: &OwnedObjectPath) -> Result<()> {
    let wifi = NMWirelessProxy::builder(conn)
        .path(device.clone())?
        .build()
        .await?;
    wifi.request_scan(HashMap::new()).await?;
    debug!("Scan requested on {}", device.as_str());
    Ok(())
}

/// Fetches the current scan results for a wireless device.
///
/// SSIDs that are empty or longer than 32 bytes are treated as
/// unreadable/hidden and excluded, as are access points whose security
/// flags cannot be resolved to a supported mode.
pub(crate) async fn scan_access_points(
    conn: &Connection,
    device: &OwnedObjectPath,
) -> Result<Vec<AccessPoint>> {
    let wifi = NMWirelessProxy::builder(conn)
        .path(device.clone())?
        .build()
        .await?;

    let mut results = Vec::new();
    for ap_path in wifi.get_all_access_points().await? {
        let ap = NMAccessPointProxy::builder(conn)
            .path(ap_path.clone())?
            .build()
            .await?;

        let ssid_bytes = ap.ssid().await?;
        if ssid_bytes.is_empty() || ssid_bytes.len() > MAX_SSID_BYTES {
            continue;
        }
        let ssid = decode_ssid_or_empty(&ssid_bytes);
        if ssid.is_empty() {
            continue;
        }

        let flags = ApFlags::from_bits_truncate(ap.flags().await?);
        let wpa = ApSecurityFlags::from_bits_truncate(ap.wpa_flags().await?);
        let rsn = ApSecurityFlags::from_bits_truncate(ap.rsn_flags().await?);

        let Some(security) = infer_security(flags, wpa, rsn) else {
            warn!("'{ssid}': unresolved security flags (wpa={wpa:?} rsn={rsn:?}), skipping");
            continue;
        };

        let strength_pct = ap.strength().await?;
        let strength_dbm = percent_to_dbm(strength_pct);

        results.push(AccessPoint {
            ssid,
            bssid: ap.hw_address().await?,
            strength_pct,
            strength_dbm,
            quality: quality_from_percent(strength_pct),
            frequency_mhz: ap.frequency().await?,
            bitrate_kbps: ap.max_bitrate().await?,
            security,
            wps_pbc: flags.contains(ApFlags::WPS_PBC),
            path: Some(ap_path),
        });
    }

    Ok(results)
}

/// Finds the strongest visible access point with the given SSID.
pub(crate) async fn find_by_ssid(
    conn: &Connection,
    device: &OwnedObjectPath,
    ssid: &str,
) -> Result<Option<AccessPoint>> {
    let mut best: Option<AccessPoint> = None;
    for ap in scan_access_points(conn, device).await? {
        if ap.ssid != ssid {
            continue;
        }
        if best
            .as_ref()
            .is_none_or(|cur| ap.strength_pct > cur.strength_pct)
        {
            best = Some(ap);
        }
    }
    Ok(best)
}

/// Finds the strongest access point currently advertising WPS push-button.
pub(crate) async fn find_wps_pbc_candidate(
    conn: &Connection,
    device: &OwnedObjectPath,
) -> Result<Option<AccessPoint>> {
    let mut best: Option<AccessPoint> = None;
    for ap in scan_access_points(conn, device).await? {
        if !ap.wps_pbc {
            continue;
        }
        if best
            .as_ref()
            .is_none_or(|cur| ap.strength_pct > cur.strength_pct)
        {
            best = Some(ap);
        }
    }
    Ok(best)
}

/// Infers the security mode from advertised capability flags.
///
/// Priority order: no flags at all means an open network; pairwise/group
/// cipher flags mean WPA-PSK; RSN key management indicating both PSK and
/// 802.1X means enterprise; RSN PSK alone means WPA-PSK; OWE/SAE key
/// management means SAE. Anything else is unresolved.
pub(crate) fn infer_security(
    flags: ApFlags,
    wpa: ApSecurityFlags,
    rsn: ApSecurityFlags,
) -> Option<SecurityMode> {
    if flags.is_empty() && wpa.is_empty() && rsn.is_empty() {
        return Some(SecurityMode::None);
    }

    let ciphers = ApSecurityFlags::PAIR_TKIP
        | ApSecurityFlags::PAIR_CCMP
        | ApSecurityFlags::GROUP_TKIP
        | ApSecurityFlags::GROUP_CCMP;
    if (wpa | rsn).intersects(ciphers) {
        return Some(SecurityMode::WpaPsk);
    }

    if rsn.contains(ApSecurityFlags::KEY_MGMT_PSK | ApSecurityFlags::KEY_MGMT_802_1X) {
        return Some(SecurityMode::Eap);
    }
    if rsn.contains(ApSecurityFlags::KEY_MGMT_PSK) {
        return Some(SecurityMode::WpaPsk);
    }
    if (wpa | rsn).intersects(
        ApSecurityFlags::KEY_MGMT_SAE
            | ApSecurityFlags::KEY_MGMT_OWE
            | ApSecurityFlags::KEY_MGMT_OWE_TM,
    ) {
        return Some(SecurityMode::Sae);
    }

    None
}

/// Linear percentage-to-dBm mapping: -90 dBm at 0%, -30 dBm at 100%.
pub(crate) fn percent_to_dbm(percent: u8) -> i32 {
    let pct = i32::from(percent.min(100));
    signal_strength::DBM_AT_ZERO_PCT
        + (signal_strength::DBM_AT_FULL_PCT - signal_strength::DBM_AT_ZERO_PCT) * pct / 100
}

/// Buckets a strength percentage into a qualitative quality value.
pub(crate) fn quality_from_percent(percent: u8) -> SignalQuality {
    if percent == 0 {
        return SignalQuality::Disconnected;
    }
    let dbm = percent_to_dbm(percent);
    if dbm >= signal_strength::EXCELLENT_DBM {
        SignalQuality::Excellent
    } else if dbm >= signal_strength::GOOD_DBM {
        SignalQuality::Good
    } else if dbm >= signal_strength::FAIR_DBM {
        SignalQuality::Fair
    } else {
        SignalQuality::Weak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_network_has_no_flags() {
        assert_eq!(
            infer_security(
                ApFlags::empty(),
                ApSecurityFlags::empty(),
                ApSecurityFlags::empty()
            ),
            Some(SecurityMode::None)
        );
    }

    #[test]
    fn cipher_flags_mean_wpa_psk() {
        assert_eq!(
            infer_security(
                ApFlags::PRIVACY,
                ApSecurityFlags::PAIR_TKIP,
                ApSecurityFlags::empty()
            ),
            Some(SecurityMode::WpaPsk)
        );
        assert_eq!(
            infer_security(
                ApFlags::PRIVACY,
                ApSecurityFlags::empty(),
                ApSecurityFlags::GROUP_CCMP | ApSecurityFlags::KEY_MGMT_PSK
            ),
            Some(SecurityMode::WpaPsk)
        );
    }

    #[test]
    fn rsn_psk_plus_8021x_means_eap() {
        assert_eq!(
            infer_security(
                ApFlags::PRIVACY,
                ApSecurityFlags::empty(),
                ApSecurityFlags::KEY_MGMT_PSK | ApSecurityFlags::KEY_MGMT_802_1X
            ),
            Some(SecurityMode::Eap)
        );
    }

    #[test]
    fn rsn_psk_only_means_wpa_psk() {
        assert_eq!(
            infer_security(
                ApFlags::PRIVACY,
                ApSecurityFlags::empty(),
                ApSecurityFlags::KEY_MGMT_PSK
            ),
            Some(SecurityMode::WpaPsk)
        );
    }

    #[test]
    fn owe_and_sae_mean_sae() {
        assert_eq!(
            infer_security(
                ApFlags::PRIVACY,
                ApSecurityFlags::empty(),
                ApSecurityFlags::KEY_MGMT_SAE
            ),
            Some(SecurityMode::Sae)
        );
        assert_eq!(
            infer_security(
                ApFlags::PRIVACY,
                ApSecurityFlags::empty(),
                ApSecurityFlags::KEY_MGMT_OWE
            ),
            Some(SecurityMode::Sae)
        );
    }

    #[test]
    fn unresolved_flags_are_rejected() {
        assert_eq!(
            infer_security(
                ApFlags::PRIVACY,
                ApSecurityFlags::PAIR_WEP40,
                ApSecurityFlags::empty()
            ),
            None
        );
    }

    #[test]
    fn dbm_mapping_endpoints() {
        assert_eq!(percent_to_dbm(0), -90);
        assert_eq!(percent_to_dbm(50), -60);
        assert_eq!(percent_to_dbm(100), -30);
        // Out-of-range values clamp.
        assert_eq!(percent_to_dbm(255), -30);
    }

    #[test]
    fn quality_buckets() {
        assert_eq!(quality_from_percent(0), SignalQuality::Disconnected);
        assert_eq!(quality_from_percent(100), SignalQuality::Excellent);
        // -50 dBm boundary: 67% -> -49.8 -> Excellent range starts here
        assert_eq!(quality_from_percent(67), SignalQuality::Excellent);
        assert_eq!(quality_from_percent(60), SignalQuality::Good);
        assert_eq!(quality_from_percent(45), SignalQuality::Fair);
        assert_eq!(quality_from_percent(10), SignalQuality::Weak);
    }

    #[test]
    fn quality_is_monotone_in_percent() {
        let mut prev = SignalQuality::Disconnected;
        for pct in 0..=100u8 {
            let q = quality_from_percent(pct);
            assert!(q >= prev, "quality regressed at {pct}%");
            prev = q;
        }
    }
}
