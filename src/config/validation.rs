//! Configuration validation

use super::Config;
use crate::dataplane::ForwardingPlan;
use crate::protocol::MacAddr;
use std::collections::HashSet;
use tracing::{error, warn};

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Print for the `config validate` command
    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }

    /// Emit through tracing when loading for a run
    pub fn log_diagnostics(&self) {
        for warning in &self.warnings {
            warn!("config: {}", warning);
        }
        for e in &self.errors {
            error!("config: {}", e);
        }
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_logging(config, &mut result);
    validate_hosts(config, &mut result);
    validate_policy(config, &mut result);
    validate_ports(config, &mut result);

    result
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    let level = config.logging.level.to_lowercase();
    if !["error", "warn", "info", "debug", "trace"].contains(&level.as_str()) {
        result.error(format!("logging.level: unknown level '{}'", config.logging.level));
    }
    if !["pretty", "compact", "json"].contains(&config.logging.format.as_str()) {
        result.error(format!(
            "logging.format: unknown format '{}'",
            config.logging.format
        ));
    }
}

fn validate_hosts(config: &Config, result: &mut ValidationResult) {
    if config.hosts.is_empty() {
        result.error("hosts: at least one host is required");
        return;
    }

    if let Some(expected) = config.topology.host_count {
        if expected != config.hosts.len() {
            result.error(format!(
                "topology.host_count: declared {} but {} hosts are listed",
                expected,
                config.hosts.len()
            ));
        }
    }

    let mut switches = HashSet::new();
    let mut ips = HashSet::new();
    let mut macs = HashSet::new();

    for (i, host) in config.hosts.iter().enumerate() {
        if !switches.insert(host.switch_id) {
            result.error(format!(
                "hosts[{}]: switch {} already has a resident host",
                i, host.switch_id
            ));
        }
        if !ips.insert(host.ip) {
            result.error(format!("hosts[{}]: duplicate ip {}", i, host.ip));
        }

        match host.mac.parse::<MacAddr>() {
            Ok(mac) if !mac.is_unicast() => {
                result.error(format!("hosts[{}]: mac {} is not unicast", i, mac));
            }
            Ok(mac) => {
                if !macs.insert(mac) {
                    result.error(format!("hosts[{}]: duplicate mac {}", i, mac));
                }
            }
            Err(e) => result.error(format!("hosts[{}]: {}", i, e)),
        }
    }
}

fn validate_policy(config: &Config, result: &mut ValidationResult) {
    let policy = &config.policy;
    let known: HashSet<_> = config.hosts.iter().map(|h| h.ip).collect();

    for ip in &policy.restricted_tcp_hosts {
        if !known.contains(ip) {
            result.warn(format!(
                "policy.restricted_tcp_hosts: {} is not a configured host",
                ip
            ));
        }
    }
    for ip in &policy.udp_bypass_hosts {
        if !known.contains(ip) {
            result.warn(format!(
                "policy.udp_bypass_hosts: {} is not a configured host",
                ip
            ));
        }
        if policy.restricted_tcp_hosts.contains(ip) {
            result.warn(format!(
                "policy: {} is both TCP-restricted and UDP-bypassed",
                ip
            ));
        }
    }

    if policy.blocked_tcp_port == 0 {
        result.warn("policy.blocked_tcp_port: port 0 never matches real traffic");
    }
    if policy.flow_priority <= policy.table_miss_priority {
        result.error(format!(
            "policy.flow_priority ({}) must be above table_miss_priority ({})",
            policy.flow_priority, policy.table_miss_priority
        ));
    }
}

fn validate_ports(config: &Config, result: &mut ValidationResult) {
    let plans = [
        ("icmp", &config.ports.icmp),
        ("tcp", &config.ports.tcp),
        ("udp", &config.ports.udp),
    ];
    for (name, plan) in plans {
        validate_plan(name, plan, result);
    }
}

fn validate_plan(name: &str, plan: &ForwardingPlan, result: &mut ValidationResult) {
    let ports = [
        ("trunk", plan.trunk),
        ("local_output", plan.local_output),
        ("ingress", plan.ingress),
        ("remote_output", plan.remote_output),
    ];
    for (field, port) in ports {
        if port == 0 {
            result.error(format!("ports.{}.{}: port 0 is reserved", name, field));
        }
    }
    if plan.trunk == plan.ingress {
        result.error(format!(
            "ports.{}: trunk and ingress must differ (both {})",
            name, plan.trunk
        ));
    }
}
