//! Controller orchestration
//!
//! Receives switch events, runs them through classifier and policy, and
//! hands the resulting directives to a [`SwitchChannel`].

mod channel;
mod script;

pub use channel::{SwitchChannel, TracingChannel};
pub use script::{load_events, parse_events};

use crate::config::Config;
use crate::dataplane::{
    classify, join_actions, BufferId, Classification, Decision, EmitDirective, FlowAction,
    FlowDirective, FlowMatch, PolicyEngine, PortId, SwitchId, TopologyRegistry,
};
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Event raised by the switch protocol layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// A switch finished its handshake
    SwitchConnected { switch_id: SwitchId },
    PacketIn(PacketInEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketInEvent {
    pub switch_id: SwitchId,
    pub in_port: PortId,
    /// Captured bytes, possibly fewer than `total_len`
    pub data: Vec<u8>,
    pub buffer_id: Option<BufferId>,
    /// Length of the frame as the switch saw it
    pub total_len: usize,
}

impl PacketInEvent {
    pub fn is_truncated(&self) -> bool {
        self.data.len() < self.total_len
    }
}

/// Packet-out: release a packet through the switch pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRelease {
    pub switch_id: SwitchId,
    pub in_port: PortId,
    /// Buffered packet to release; `data` carries the bytes otherwise
    pub buffer_id: Option<BufferId>,
    pub actions: Vec<FlowAction>,
    pub data: Option<Vec<u8>>,
}

/// Instruction for the switch protocol layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    InstallFlow(FlowDirective),
    EmitFrame(EmitDirective),
    ReleasePacket(PacketRelease),
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::InstallFlow(flow) => write!(f, "{}", flow),
            Directive::EmitFrame(emit) => write!(f, "{}", emit),
            Directive::ReleasePacket(release) => {
                write!(
                    f,
                    "release sw={:016} in_port={} actions=[{}]",
                    release.switch_id,
                    release.in_port,
                    join_actions(&release.actions)
                )?;
                match (&release.buffer_id, &release.data) {
                    (Some(id), _) => write!(f, " buffer={}", id),
                    (None, Some(data)) => write!(f, " len={}", data.len()),
                    (None, None) => Ok(()),
                }
            }
        }
    }
}

/// The controller: stateless per event, shareable across tasks
pub struct Controller {
    policy: PolicyEngine,
    registry: Arc<TopologyRegistry>,
    table_miss_priority: u16,
    metrics: Arc<MetricsRegistry>,
}

impl Controller {
    /// Build the controller from a loaded configuration.
    ///
    /// Fails if the host table cannot form a consistent registry.
    pub fn new(config: &Config, metrics: Arc<MetricsRegistry>) -> Result<Self> {
        let registry = Arc::new(TopologyRegistry::from_config(config)?);
        let policy = PolicyEngine::new(Arc::clone(&registry), &config.policy, &config.ports);

        info!(
            hosts = registry.host_count(),
            restricted = config.policy.restricted_tcp_hosts.len(),
            bypass = config.policy.udp_bypass_hosts.len(),
            "controller ready"
        );

        Ok(Self {
            policy,
            registry,
            table_miss_priority: config.policy.table_miss_priority,
            metrics,
        })
    }

    pub fn registry(&self) -> &TopologyRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Turn one event into the directives it calls for.
    ///
    /// Never fails: undecidable packets are logged, counted and produce
    /// no directives, leaving them to the switch's table-miss rule.
    pub fn dispatch(&self, event: &ControllerEvent) -> Vec<Directive> {
        match event {
            ControllerEvent::SwitchConnected { switch_id } => self.on_switch_connected(*switch_id),
            ControllerEvent::PacketIn(packet_in) => self.on_packet_in(packet_in),
        }
    }

    /// Process events until every sender is dropped.
    ///
    /// Delivery failures are logged and counted; they never stop the loop.
    pub async fn run<C: SwitchChannel>(
        &self,
        mut events: mpsc::Receiver<ControllerEvent>,
        channel: &mut C,
    ) -> Result<()> {
        while let Some(event) = events.recv().await {
            for directive in self.dispatch(&event) {
                if let Err(e) = channel.send(directive).await {
                    warn!(error = %e, "failed to deliver directive");
                    self.metrics.channel_errors.inc();
                }
            }
        }
        debug!("event source closed");
        Ok(())
    }

    fn on_switch_connected(&self, switch_id: SwitchId) -> Vec<Directive> {
        info!(switch = %format!("{:016}", switch_id), "switch connected");
        self.metrics.flows_installed.inc();

        vec![Directive::InstallFlow(FlowDirective {
            switch_id,
            priority: self.table_miss_priority,
            match_fields: FlowMatch::any(),
            actions: vec![FlowAction::Controller],
            buffer_id: None,
        })]
    }

    fn on_packet_in(&self, event: &PacketInEvent) -> Vec<Directive> {
        self.metrics.record_packet_in(event.switch_id, event.data.len());
        if event.is_truncated() {
            debug!(
                switch = %format!("{:016}", event.switch_id),
                captured = event.data.len(),
                total = event.total_len,
                "truncated packet-in"
            );
            self.metrics.truncated.inc();
        }

        let classification = match classify(&event.data, event.switch_id, event.in_port) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, in_port = event.in_port, "unclassified packet");
                self.metrics.classification_errors.inc();
                return Vec::new();
            }
        };

        if let Classification::Packet(ctx) = &classification {
            debug!(
                switch = %format!("{:016}", ctx.switch_id),
                src = %ctx.src_mac,
                dst = %ctx.dst_mac,
                in_port = ctx.in_port,
                kind = ctx.kind.name(),
                "packet in"
            );
            self.registry
                .record_sighting(ctx.switch_id, ctx.src_mac, ctx.in_port);
        }

        let decision = match self.policy.decide(&classification, event.buffer_id) {
            Ok(d) => d,
            Err(Error::BindingNotFound(key)) => {
                warn!(missing = %key, "no binding, packet left to table-miss");
                self.metrics.binding_misses.inc();
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "policy failed");
                return Vec::new();
            }
        };

        self.directives_for(decision, event)
    }

    fn directives_for(&self, decision: Decision, event: &PacketInEvent) -> Vec<Directive> {
        match decision {
            Decision::Ignore => {
                self.metrics.lldp_ignored.inc();
                Vec::new()
            }
            Decision::Reply(emit) => {
                info!(port = emit.out_port, "proxy arp reply");
                self.metrics.arp_replies.inc();
                vec![Directive::EmitFrame(emit)]
            }
            Decision::Install { flow, reset } => {
                let mut directives = Vec::with_capacity(3);
                if let Some(reset) = reset {
                    info!(port = reset.out_port, "tcp reset");
                    self.metrics.tcp_resets.inc();
                    directives.push(Directive::EmitFrame(reset));
                }

                info!(flow = %flow, "install flow");
                self.metrics.flows_installed.inc();
                if flow.is_drop() {
                    self.metrics.drop_flows.inc();
                }

                // An unbuffered packet still needs to go out the rule's ports
                let release = (!flow.consumes_buffer() && !flow.is_drop()).then(|| PacketRelease {
                    switch_id: flow.switch_id,
                    in_port: event.in_port,
                    buffer_id: None,
                    actions: flow.actions.clone(),
                    data: Some(event.data.clone()),
                });

                directives.push(Directive::InstallFlow(flow));
                if let Some(release) = release {
                    self.metrics.packets_released.inc();
                    directives.push(Directive::ReleasePacket(release));
                }
                directives
            }
            Decision::Reset { reset, missing } => {
                warn!(missing = %missing, "no binding, tcp reset sent without a flow");
                self.metrics.binding_misses.inc();
                self.metrics.tcp_resets.inc();
                vec![Directive::EmitFrame(reset)]
            }
            Decision::PassThrough => {
                self.metrics.passthrough.inc();
                self.metrics.packets_released.inc();
                vec![Directive::ReleasePacket(PacketRelease {
                    switch_id: event.switch_id,
                    in_port: event.in_port,
                    buffer_id: event.buffer_id,
                    actions: vec![FlowAction::Flood],
                    data: event.buffer_id.is_none().then(|| event.data.clone()),
                })]
            }
        }
    }
}
