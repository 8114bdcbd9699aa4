//! Topology registry
//!
//! Authoritative bindings the policy consults:
//! - switch id -> MAC of the host attached to that switch
//! - IPv4 address -> MAC (answers proxied ARP requests)
//!
//! Both maps are filled once from configuration and are read-only while
//! packets are being decided, so lookups take no lock. The registry also
//! keeps a table of where each source MAC was last seen; forwarding
//! decisions never read it.

use super::{PortId, SwitchId};
use crate::config::Config;
use crate::protocol::MacAddr;
use crate::{BindingKey, Error, Result};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct TopologyRegistry {
    residents: HashMap<SwitchId, MacAddr>,
    addresses: HashMap<Ipv4Addr, MacAddr>,
    /// (switch, source MAC) -> ingress port
    sightings: RwLock<HashMap<(SwitchId, MacAddr), PortId>>,
}

impl TopologyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from the `[[hosts]]` table.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        for host in &config.hosts {
            let mac: MacAddr = host
                .mac
                .parse()
                .map_err(|e| Error::Config(format!("host {}: {}", host.ip, e)))?;
            registry.bind_host(host.switch_id, host.ip, mac)?;
        }
        Ok(registry)
    }

    /// Register a host. Only valid during startup.
    ///
    /// Each switch has one resident host and the IP/MAC table stays
    /// one-to-one; violating either is a configuration error.
    pub fn bind_host(&mut self, switch_id: SwitchId, ip: Ipv4Addr, mac: MacAddr) -> Result<()> {
        if let Some(existing) = self.residents.get(&switch_id) {
            return Err(Error::Config(format!(
                "switch {} already bound to {}",
                switch_id, existing
            )));
        }
        if self.addresses.contains_key(&ip) {
            return Err(Error::Config(format!("ip {} bound twice", ip)));
        }
        if self.addresses.values().any(|m| *m == mac) {
            return Err(Error::Config(format!("mac {} bound twice", mac)));
        }

        self.residents.insert(switch_id, mac);
        self.addresses.insert(ip, mac);
        Ok(())
    }

    /// MAC of the host attached to `switch_id`
    pub fn resident_mac_of(&self, switch_id: SwitchId) -> Result<MacAddr> {
        self.residents
            .get(&switch_id)
            .copied()
            .ok_or(Error::BindingNotFound(BindingKey::Switch(switch_id)))
    }

    /// MAC bound to `ip`
    pub fn mac_for_ip(&self, ip: Ipv4Addr) -> Result<MacAddr> {
        self.addresses
            .get(&ip)
            .copied()
            .ok_or(Error::BindingNotFound(BindingKey::Ip(ip)))
    }

    pub fn host_count(&self) -> usize {
        self.residents.len()
    }

    /// Remember that `mac` was seen on `port` of `switch_id`.
    ///
    /// Idempotent upsert. Group addresses are never recorded.
    /// A poisoned lock is recovered; the map only holds plain values.
    pub fn record_sighting(&self, switch_id: SwitchId, mac: MacAddr, port: PortId) {
        if mac.is_multicast() {
            return;
        }

        let key = (switch_id, mac);
        {
            let sightings = self.sightings.read().unwrap_or_else(PoisonError::into_inner);
            if sightings.get(&key) == Some(&port) {
                return;
            }
        }
        self.sightings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, port);
    }

    /// Port where `mac` was last seen on `switch_id`
    pub fn sighting(&self, switch_id: SwitchId, mac: MacAddr) -> Option<PortId> {
        self.sightings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(switch_id, mac))
            .copied()
    }

    /// Number of recorded (switch, MAC) locations
    pub fn sighting_count(&self) -> usize {
        self.sightings.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
