//! Decision counters.
//!
//! Thread-safe counters shared by every in-flight decision, plus
//! per-switch packet-in statistics.

use crate::dataplane::SwitchId;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::info;

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-switch packet-in statistics.
#[derive(Debug, Default)]
pub struct SwitchStats {
    pub packets: Counter,
    pub bytes: Counter,
}

/// Global metrics registry for the controller.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    switches: RwLock<BTreeMap<SwitchId, SwitchStats>>,

    /// Packet-in events received.
    pub packet_in: Counter,
    /// Packet-ins whose capture was shorter than the declared length.
    pub truncated: Counter,
    /// LLDP frames skipped.
    pub lldp_ignored: Counter,
    /// Frames that could not be classified.
    pub classification_errors: Counter,
    /// Decisions abandoned on a missing registry binding.
    pub binding_misses: Counter,

    /// Proxy ARP replies injected.
    pub arp_replies: Counter,
    /// Forged TCP resets injected.
    pub tcp_resets: Counter,
    /// Flow rules handed to the switch (drop rules included).
    pub flows_installed: Counter,
    /// Flow rules with an empty action list.
    pub drop_flows: Counter,
    /// Raw frames released through packet-out.
    pub packets_released: Counter,
    /// Frames passed through without a rule.
    pub passthrough: Counter,
    /// Directives the switch channel failed to deliver.
    pub channel_errors: Counter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a packet-in on a switch.
    pub fn record_packet_in(&self, switch_id: SwitchId, bytes: usize) {
        self.packet_in.inc();

        if let Ok(switches) = self.switches.read() {
            if let Some(stats) = switches.get(&switch_id) {
                stats.packets.inc();
                stats.bytes.add(bytes as u64);
                return;
            }
        }

        if let Ok(mut switches) = self.switches.write() {
            let stats = switches.entry(switch_id).or_default();
            stats.packets.inc();
            stats.bytes.add(bytes as u64);
        }
    }

    /// (packets, bytes) seen from a switch.
    pub fn switch_stats(&self, switch_id: SwitchId) -> Option<(u64, u64)> {
        let switches = self.switches.read().ok()?;
        switches
            .get(&switch_id)
            .map(|s| (s.packets.get(), s.bytes.get()))
    }

    /// Logs a one-line snapshot of all counters.
    pub fn summary(&self) {
        info!(
            packet_in = self.packet_in.get(),
            truncated = self.truncated.get(),
            lldp = self.lldp_ignored.get(),
            unclassified = self.classification_errors.get(),
            binding_misses = self.binding_misses.get(),
            arp_replies = self.arp_replies.get(),
            tcp_resets = self.tcp_resets.get(),
            flows = self.flows_installed.get(),
            drop_flows = self.drop_flows.get(),
            released = self.packets_released.get(),
            passthrough = self.passthrough.get(),
            channel_errors = self.channel_errors.get(),
            "controller summary"
        );
        if let Ok(switches) = self.switches.read() {
            for (id, stats) in switches.iter() {
                info!(
                    switch = %format!("{:016}", id),
                    packets = stats.packets.get(),
                    bytes = stats.bytes.get(),
                    "switch summary"
                );
            }
        }
    }
}
