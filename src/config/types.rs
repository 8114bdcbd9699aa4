//! Configuration types

use crate::dataplane::{ForwardingPlan, SwitchId};
use crate::telemetry::LogConfig;
use serde::Deserialize;
use std::net::Ipv4Addr;

/// Controller configuration (topology.toml)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub ports: PortsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopologyConfig {
    /// Expected number of hosts; cross-checked against `hosts`
    pub host_count: Option<usize>,
}

/// One host: the switch it hangs off, its address and its MAC
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    pub switch_id: SwitchId,
    pub ip: Ipv4Addr,
    pub mac: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Sources whose connections to `blocked_tcp_port` get reset
    #[serde(default)]
    pub restricted_tcp_hosts: Vec<Ipv4Addr>,
    #[serde(default = "default_blocked_tcp_port")]
    pub blocked_tcp_port: u16,
    /// Sources whose UDP traffic is blackholed
    #[serde(default)]
    pub udp_bypass_hosts: Vec<Ipv4Addr>,
    #[serde(default = "default_flow_priority")]
    pub flow_priority: u16,
    #[serde(default)]
    pub table_miss_priority: u16,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            restricted_tcp_hosts: Vec::new(),
            blocked_tcp_port: default_blocked_tcp_port(),
            udp_bypass_hosts: Vec::new(),
            flow_priority: default_flow_priority(),
            table_miss_priority: 0,
        }
    }
}

fn default_blocked_tcp_port() -> u16 {
    80
}

fn default_flow_priority() -> u16 {
    1
}

/// Per-protocol port plans
#[derive(Debug, Clone, Deserialize)]
pub struct PortsConfig {
    #[serde(default = "ForwardingPlan::icmp_default")]
    pub icmp: ForwardingPlan,
    #[serde(default = "ForwardingPlan::tcp_default")]
    pub tcp: ForwardingPlan,
    #[serde(default = "ForwardingPlan::udp_default")]
    pub udp: ForwardingPlan,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            icmp: ForwardingPlan::icmp_default(),
            tcp: ForwardingPlan::tcp_default(),
            udp: ForwardingPlan::udp_default(),
        }
    }
}
