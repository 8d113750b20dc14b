//! Device state translation.
//!
//! Maps NetworkManager's raw device-state + state-reason pair into the
//! normalized [`InterfaceState`] and [`WifiState`] values, per interface
//! role. State-reason is consulted before the generic state table for the
//! WiFi role, because several supplicant reason codes carry more specific
//! meaning than the coarse state value alone.

use log::debug;
use std::collections::HashMap;

use crate::models::{DeviceState, InterfaceRole, InterfaceState, StateReason, WifiState};

/// Result of translating one raw state transition.
///
/// Either or both parts may be absent when the transition maps to no
/// externally visible change.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Translation {
    /// Normalized interface events, in emission order (the hysteresis logic
    /// can prepend a synthetic `Added`).
    pub interface_states: Vec<InterfaceState>,
    pub wifi_state: Option<WifiState>,
    /// Set on `Disconnected` entry; the caller flushes the address cache
    /// for both families on this interface.
    pub link_down: bool,
}

/// Per-interface latch tracking for removal hysteresis and duplicate
/// suppression of interface-state events.
#[derive(Debug, Default)]
struct InterfaceLatch {
    /// Armed after a synthetic `Removed`; disarmed (emitting `Added`) on
    /// the next transition whose state exceeds `Unmanaged`.
    removed: bool,
    last_emitted: Option<InterfaceState>,
}

/// Stateful translator, one per event loop.
#[derive(Debug, Default)]
pub struct StateTranslator {
    latches: HashMap<String, InterfaceLatch>,
}

impl StateTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets per-interface latch state after a remove notification.
    pub fn forget(&mut self, interface: &str) {
        self.latches.remove(interface);
    }

    /// Translates one raw transition for `interface`.
    pub fn translate(
        &mut self,
        interface: &str,
        role: InterfaceRole,
        raw_state: u32,
        raw_reason: u32,
    ) -> Translation {
        let state = DeviceState::from(raw_state);
        let reason = StateReason::from(raw_reason);
        let mut out = Translation::default();

        let latch = self.latches.entry(interface.to_string()).or_default();

        // Removal hysteresis: one synthetic Removed on entering the
        // disabled sub-states, one synthetic Added on the way back out.
        match state {
            DeviceState::Unknown | DeviceState::Unmanaged => {
                if !latch.removed {
                    latch.removed = true;
                    push_interface_state(latch, &mut out, InterfaceState::Removed);
                }
            }
            _ => {
                if latch.removed {
                    latch.removed = false;
                    push_interface_state(latch, &mut out, InterfaceState::Added);
                }
            }
        }

        if state == DeviceState::Disconnected {
            out.link_down = true;
        }

        match role {
            InterfaceRole::Wifi => {
                out.wifi_state = wifi_state_for(state, reason);
                if out.wifi_state.is_none() && out.interface_states.is_empty() {
                    debug!("{interface}: unmapped wifi transition {state} (reason {reason})");
                }
            }
            InterfaceRole::Ethernet => {
                if let Some(mapped) = ethernet_state_for(state) {
                    push_interface_state(latch, &mut out, mapped);
                } else if out.interface_states.is_empty() {
                    debug!("{interface}: unmapped ethernet transition {state} (reason {reason})");
                }
            }
        }

        out
    }
}

/// Suppresses consecutive duplicates of the same normalized state.
fn push_interface_state(latch: &mut InterfaceLatch, out: &mut Translation, state: InterfaceState) {
    if latch.last_emitted == Some(state) {
        return;
    }
    latch.last_emitted = Some(state);
    out.interface_states.push(state);
}

/// WiFi role mapping: reason first, then the state table.
fn wifi_state_for(state: DeviceState, reason: StateReason) -> Option<WifiState> {
    match reason {
        StateReason::SupplicantAvailable => return Some(WifiState::Disconnected),
        StateReason::SsidNotFound => return Some(WifiState::SsidNotFound),
        StateReason::SupplicantTimeout | StateReason::SupplicantFailed => {
            return Some(WifiState::AuthenticationFailed);
        }
        StateReason::NoSecrets => return Some(WifiState::InvalidCredentials),
        StateReason::SupplicantConfigFailed => return Some(WifiState::Error),
        StateReason::SupplicantDisconnect => return Some(WifiState::ConnectionInterrupted),
        _ => {}
    }

    match state {
        DeviceState::Unknown => Some(WifiState::Uninstalled),
        DeviceState::Unmanaged => Some(WifiState::Disabled),
        DeviceState::Unavailable | DeviceState::Disconnected => Some(WifiState::Disconnected),
        DeviceState::Prepare | DeviceState::Config => Some(WifiState::Pairing),
        DeviceState::NeedAuth
        | DeviceState::IpConfig
        | DeviceState::IpCheck
        | DeviceState::Secondaries => Some(WifiState::Connecting),
        DeviceState::Activated => Some(WifiState::Connected),
        DeviceState::Deactivating => Some(WifiState::ConnectionLost),
        DeviceState::Failed => Some(WifiState::ConnectionFailed),
        DeviceState::Other(_) => None,
    }
}

/// Ethernet role mapping, a simpler table.
fn ethernet_state_for(state: DeviceState) -> Option<InterfaceState> {
    match state {
        DeviceState::Unknown | DeviceState::Unmanaged => Some(InterfaceState::Disabled),
        DeviceState::Unavailable | DeviceState::Disconnected => Some(InterfaceState::LinkDown),
        DeviceState::Prepare | DeviceState::Activated => Some(InterfaceState::LinkUp),
        DeviceState::IpConfig => Some(InterfaceState::AcquiringIp),
        _ => None,
    }
}

/// Stateless view of the WiFi state table, used when deriving the current
/// WiFi state from a live device-state read.
pub(crate) fn wifi_state_from_device(raw_state: u32, raw_reason: u32) -> WifiState {
    wifi_state_for(DeviceState::from(raw_state), StateReason::from(raw_reason))
        .unwrap_or(WifiState::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::device_state;

    const ETH: &str = "eth0";
    const WLAN: &str = "wlan0";
    const NO_REASON: u32 = 1;

    #[test]
    fn wifi_state_table() {
        let mut tr = StateTranslator::new();
        let cases = [
            (device_state::UNKNOWN, WifiState::Uninstalled),
            (device_state::UNMANAGED, WifiState::Disabled),
            (device_state::UNAVAILABLE, WifiState::Disconnected),
            (device_state::DISCONNECTED, WifiState::Disconnected),
            (device_state::PREPARE, WifiState::Pairing),
            (device_state::CONFIG, WifiState::Pairing),
            (device_state::NEED_AUTH, WifiState::Connecting),
            (device_state::IP_CONFIG, WifiState::Connecting),
            (device_state::IP_CHECK, WifiState::Connecting),
            (device_state::SECONDARIES, WifiState::Connecting),
            (device_state::ACTIVATED, WifiState::Connected),
            (device_state::DEACTIVATING, WifiState::ConnectionLost),
            (device_state::FAILED, WifiState::ConnectionFailed),
        ];
        for (raw, expected) in cases {
            let t = tr.translate(WLAN, InterfaceRole::Wifi, raw, NO_REASON);
            assert_eq!(t.wifi_state, Some(expected), "state {raw}");
        }
    }

    #[test]
    fn reason_wins_over_state_for_wifi() {
        let mut tr = StateTranslator::new();
        // FAILED would map to ConnectionFailed, but SSID_NOT_FOUND (53)
        // carries more specific meaning.
        let t = tr.translate(WLAN, InterfaceRole::Wifi, device_state::FAILED, 53);
        assert_eq!(t.wifi_state, Some(WifiState::SsidNotFound));

        let t = tr.translate(WLAN, InterfaceRole::Wifi, device_state::FAILED, 7);
        assert_eq!(t.wifi_state, Some(WifiState::InvalidCredentials));

        let t = tr.translate(WLAN, InterfaceRole::Wifi, device_state::FAILED, 10);
        assert_eq!(t.wifi_state, Some(WifiState::AuthenticationFailed));

        let t = tr.translate(WLAN, InterfaceRole::Wifi, device_state::FAILED, 11);
        assert_eq!(t.wifi_state, Some(WifiState::AuthenticationFailed));

        let t = tr.translate(WLAN, InterfaceRole::Wifi, device_state::FAILED, 9);
        assert_eq!(t.wifi_state, Some(WifiState::Error));

        let t = tr.translate(WLAN, InterfaceRole::Wifi, device_state::DISCONNECTED, 8);
        assert_eq!(t.wifi_state, Some(WifiState::ConnectionInterrupted));

        let t = tr.translate(WLAN, InterfaceRole::Wifi, device_state::DISCONNECTED, 42);
        assert_eq!(t.wifi_state, Some(WifiState::Disconnected));
    }

    #[test]
    fn ethernet_state_table() {
        let mut tr = StateTranslator::new();
        let t = tr.translate(ETH, InterfaceRole::Ethernet, device_state::UNAVAILABLE, 1);
        assert_eq!(t.interface_states, vec![InterfaceState::LinkDown]);

        let t = tr.translate(ETH, InterfaceRole::Ethernet, device_state::PREPARE, 1);
        assert_eq!(t.interface_states, vec![InterfaceState::LinkUp]);

        let t = tr.translate(ETH, InterfaceRole::Ethernet, device_state::IP_CONFIG, 1);
        assert_eq!(t.interface_states, vec![InterfaceState::AcquiringIp]);

        let t = tr.translate(ETH, InterfaceRole::Ethernet, device_state::ACTIVATED, 1);
        assert_eq!(t.interface_states, vec![InterfaceState::LinkUp]);
    }

    #[test]
    fn hysteresis_emits_single_removed_then_added() {
        let mut tr = StateTranslator::new();

        // UNKNOWN -> one Removed
        let t = tr.translate(ETH, InterfaceRole::Ethernet, device_state::UNKNOWN, 1);
        assert_eq!(
            t.interface_states,
            vec![InterfaceState::Removed, InterfaceState::Disabled]
        );

        // UNMANAGED while latched -> nothing new (Disabled already emitted)
        let t = tr.translate(ETH, InterfaceRole::Ethernet, device_state::UNMANAGED, 1);
        assert!(t.interface_states.is_empty(), "no second Removed");

        // DISCONNECTED disarms -> Added then LinkDown
        let t = tr.translate(ETH, InterfaceRole::Ethernet, device_state::DISCONNECTED, 1);
        assert_eq!(
            t.interface_states,
            vec![InterfaceState::Added, InterfaceState::LinkDown]
        );
        assert!(t.link_down);
    }

    #[test]
    fn disconnect_entry_requests_address_flush() {
        let mut tr = StateTranslator::new();
        let t = tr.translate(WLAN, InterfaceRole::Wifi, device_state::DISCONNECTED, 1);
        assert!(t.link_down);
        let t = tr.translate(WLAN, InterfaceRole::Wifi, device_state::ACTIVATED, 1);
        assert!(!t.link_down);
    }

    #[test]
    fn duplicate_interface_states_are_suppressed() {
        let mut tr = StateTranslator::new();
        let t = tr.translate(ETH, InterfaceRole::Ethernet, device_state::PREPARE, 1);
        assert_eq!(t.interface_states, vec![InterfaceState::LinkUp]);
        let t = tr.translate(ETH, InterfaceRole::Ethernet, device_state::ACTIVATED, 1);
        assert!(t.interface_states.is_empty(), "LinkUp not repeated");
    }

    #[test]
    fn unrecognized_pair_produces_no_event() {
        let mut tr = StateTranslator::new();
        let t = tr.translate(WLAN, InterfaceRole::Wifi, 255, 999);
        assert!(t.wifi_state.is_none());
        assert!(t.interface_states.is_empty());
    }

    #[test]
    fn live_state_derivation_matches_table() {
        assert_eq!(
            wifi_state_from_device(device_state::ACTIVATED, 1),
            WifiState::Connected
        );
        assert_eq!(
            wifi_state_from_device(device_state::UNMANAGED, 1),
            WifiState::Disabled
        );
    }
}
