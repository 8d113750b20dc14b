//! Per-interface address change deduplication.
//!
//! Decides whether an incoming address notification is a genuine
//! acquire/lose transition worth reporting. Holds no bus handles and
//! performs no I/O; the caches live in this struct rather than in
//! function-local statics, owned by the event loop that feeds it.

use log::debug;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::models::IpFamily;

/// An address transition worth reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEvent {
    pub interface: String,
    pub family: IpFamily,
    pub address: String,
    pub acquired: bool,
}

/// Last-known-address cache, keyed by `(interface, family)`.
///
/// Two independent maps since an interface holds at most one active global
/// address of each family in this model.
#[derive(Debug, Default)]
pub struct AddressDeduplicator {
    v4: HashMap<String, String>,
    v6: HashMap<String, String>,
}

impl AddressDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    fn cache(&mut self, family: IpFamily) -> &mut HashMap<String, String> {
        match family {
            IpFamily::V4 => &mut self.v4,
            IpFamily::V6 => &mut self.v6,
        }
    }

    /// Handles an address notification for `(interface, family)`.
    ///
    /// Returns an acquired event only when the candidate is a non-empty,
    /// non-link-local address different from the cached one.
    pub fn on_address(
        &mut self,
        interface: &str,
        family: IpFamily,
        candidate: &str,
    ) -> Option<AddressEvent> {
        if candidate.is_empty() || is_link_local(family, candidate) {
            return None;
        }

        let cache = self.cache(family);
        if cache.get(interface).is_some_and(|cur| cur == candidate) {
            debug!("{interface} {family} address unchanged, dropping");
            return None;
        }

        cache.insert(interface.to_string(), candidate.to_string());
        Some(AddressEvent {
            interface: interface.to_string(),
            family,
            address: candidate.to_string(),
            acquired: true,
        })
    }

    /// Handles a link-down for `(interface, family)`.
    ///
    /// Emits a lost event only if a non-empty address was previously
    /// cached; prevents spurious "lost" at startup.
    pub fn on_link_down(&mut self, interface: &str, family: IpFamily) -> Option<AddressEvent> {
        let cached = self.cache(family).remove(interface)?;
        Some(AddressEvent {
            interface: interface.to_string(),
            family,
            address: cached,
            acquired: false,
        })
    }

    /// Clears both families for an interface, returning any lost events.
    pub fn flush(&mut self, interface: &str) -> Vec<AddressEvent> {
        [IpFamily::V4, IpFamily::V6]
            .into_iter()
            .filter_map(|family| self.on_link_down(interface, family))
            .collect()
    }
}

/// Whether an address is link-local for its family (`fe80::/10` for IPv6,
/// `169.254/16` for IPv4). Unparseable addresses are treated as link-local
/// so they are never reported.
pub(crate) fn is_link_local(family: IpFamily, address: &str) -> bool {
    match family {
        IpFamily::V4 => address
            .parse::<Ipv4Addr>()
            .map(|a| a.is_link_local())
            .unwrap_or(true),
        IpFamily::V6 => address
            .parse::<Ipv6Addr>()
            .map(|a| (a.segments()[0] & 0xffc0) == 0xfe80)
            .unwrap_or(true),
    }
}
