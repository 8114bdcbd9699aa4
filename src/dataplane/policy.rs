//! Policy engine
//!
//! Decision tree evaluated once per classified packet:
//!
//! ```text
//! Ignore            -> nothing
//! ARP               -> proxy reply out the ingress port, no rule
//! ICMP              -> forwarding rule
//! TCP               -> forwarding rule (+ reset for restricted hosts,
//!                      reset alone when the switch is unbound)
//! UDP               -> drop rule for bypass hosts, else forwarding rule
//! other IPv4        -> pass through
//! ```
//!
//! Nothing is carried between calls. The only shared state is the
//! read-only registry, so `decide` can run on any number of threads.

use super::classifier::{Classification, Ipv4Fields, PacketContext, PacketKind, TcpFields};
use super::flow::{BufferId, EmitDirective, FlowAction, FlowDirective, FlowMatch, PortId};
use super::registry::TopologyRegistry;
use super::synthesizer::{build_arp_reply, build_tcp_reset};
use crate::config::{PolicyConfig, PortsConfig};
use crate::protocol::udp;
use crate::{BindingKey, Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Port constants of one protocol branch.
///
/// A packet arriving on `trunk` is sent to `local_output` when its
/// destination is the switch's resident host and to `remote_output`
/// otherwise. Anything else is matched on `ingress` and sent to
/// `remote_output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ForwardingPlan {
    pub trunk: PortId,
    pub local_output: PortId,
    pub ingress: PortId,
    pub remote_output: PortId,
}

impl ForwardingPlan {
    pub fn icmp_default() -> Self {
        Self {
            trunk: 3,
            local_output: 1,
            ingress: 1,
            remote_output: 2,
        }
    }

    pub fn tcp_default() -> Self {
        Self::icmp_default()
    }

    pub fn udp_default() -> Self {
        Self {
            trunk: 2,
            local_output: 1,
            ingress: 1,
            remote_output: 3,
        }
    }

    /// (in_port to match, port to output on)
    pub fn route(&self, in_port: PortId, is_local: bool) -> (PortId, PortId) {
        if in_port == self.trunk {
            if is_local {
                (self.trunk, self.local_output)
            } else {
                (self.trunk, self.remote_output)
            }
        } else {
            (self.ingress, self.remote_output)
        }
    }
}

/// What the controller should do with one packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No directives at all
    Ignore,
    /// Answer with a synthetic frame; no rule is installed
    Reply(EmitDirective),
    /// Install a rule, optionally injecting a reset alongside it
    Install {
        flow: FlowDirective,
        reset: Option<EmitDirective>,
    },
    /// Inject a reset only; the switch has no binding to build the
    /// forwarding rule from
    Reset {
        reset: EmitDirective,
        missing: BindingKey,
    },
    /// No rule applies; let the packet continue unmodified
    PassThrough,
}

pub struct PolicyEngine {
    registry: Arc<TopologyRegistry>,
    restricted_tcp_hosts: HashSet<Ipv4Addr>,
    blocked_tcp_port: u16,
    udp_bypass_hosts: HashSet<Ipv4Addr>,
    flow_priority: u16,
    ports: PortsConfig,
}

impl PolicyEngine {
    pub fn new(registry: Arc<TopologyRegistry>, policy: &PolicyConfig, ports: &PortsConfig) -> Self {
        Self {
            registry,
            restricted_tcp_hosts: policy.restricted_tcp_hosts.iter().copied().collect(),
            blocked_tcp_port: policy.blocked_tcp_port,
            udp_bypass_hosts: policy.udp_bypass_hosts.iter().copied().collect(),
            flow_priority: policy.flow_priority,
            ports: ports.clone(),
        }
    }

    pub fn registry(&self) -> &TopologyRegistry {
        &self.registry
    }

    /// Decide what to do with a classified packet.
    ///
    /// `buffer_id` is the switch-side buffer holding the packet, if any;
    /// an installed rule takes it over so the buffered packet is
    /// forwarded by the rule itself.
    ///
    /// Fails only on a missing registry binding.
    pub fn decide(
        &self,
        classification: &Classification<'_>,
        buffer_id: Option<BufferId>,
    ) -> Result<Decision> {
        let ctx = match classification {
            Classification::Ignore => return Ok(Decision::Ignore),
            Classification::Packet(ctx) => ctx,
        };

        let decision = match &ctx.kind {
            PacketKind::Arp(request) => {
                let resolved = self.registry.mac_for_ip(request.target_ip)?;
                Decision::Reply(EmitDirective {
                    switch_id: ctx.switch_id,
                    out_port: ctx.in_port,
                    frame: build_arp_reply(ctx.src_mac, request, resolved),
                })
            }
            PacketKind::Icmp { ip, .. } => {
                let flow = self.forward(ctx, ip, &self.ports.icmp, FlowMatch::ipv4, buffer_id)?;
                Decision::Install { flow, reset: None }
            }
            PacketKind::Tcp { ip, tcp } => self.decide_tcp(ctx, ip, tcp, buffer_id)?,
            PacketKind::Udp {
                ip,
                src_port,
                dst_port,
            } => self.decide_udp(ctx, ip, *src_port, *dst_port, buffer_id)?,
            PacketKind::OtherIpv4 { .. } => Decision::PassThrough,
        };
        Ok(decision)
    }

    fn decide_tcp(
        &self,
        ctx: &PacketContext<'_>,
        ip: &Ipv4Fields,
        segment: &TcpFields,
        buffer_id: Option<BufferId>,
    ) -> Result<Decision> {
        let reset = self.is_blocked_tcp(ip.src, segment.dst_port).then(|| EmitDirective {
            switch_id: ctx.switch_id,
            out_port: ctx.in_port,
            frame: build_tcp_reset(ctx.src_mac, ctx.dst_mac, ip, segment),
        });

        let flow = self.forward(
            ctx,
            ip,
            &self.ports.tcp,
            |in_port, src, dst, proto| {
                FlowMatch::ipv4(in_port, src, dst, proto).tcp_ports(segment.src_port, segment.dst_port)
            },
            buffer_id,
        );
        // The reset never depends on the forwarding lookup
        match (flow, reset) {
            (Ok(flow), reset) => Ok(Decision::Install { flow, reset }),
            (Err(Error::BindingNotFound(missing)), Some(reset)) => {
                Ok(Decision::Reset { reset, missing })
            }
            (Err(e), _) => Err(e),
        }
    }

    fn decide_udp(
        &self,
        ctx: &PacketContext<'_>,
        ip: &Ipv4Fields,
        src_port: u16,
        dst_port: u16,
        buffer_id: Option<BufferId>,
    ) -> Result<Decision> {
        let build_match = |in_port: PortId, src: Ipv4Addr, dst: Ipv4Addr, proto: u8| {
            FlowMatch::ipv4(in_port, src, dst, proto).udp_ports(src_port, dst_port)
        };

        let flow = if self.udp_bypass_hosts.contains(&ip.src) {
            FlowDirective {
                switch_id: ctx.switch_id,
                priority: self.flow_priority,
                match_fields: build_match(self.ports.udp.ingress, ip.src, ip.dst, udp::PROTOCOL_NUMBER),
                actions: Vec::new(),
                buffer_id,
            }
        } else {
            self.forward(ctx, ip, &self.ports.udp, build_match, buffer_id)?
        };
        Ok(Decision::Install { flow, reset: None })
    }

    /// Local/remote branch shared by ICMP, TCP and UDP.
    fn forward<F>(
        &self,
        ctx: &PacketContext<'_>,
        ip: &Ipv4Fields,
        plan: &ForwardingPlan,
        build_match: F,
        buffer_id: Option<BufferId>,
    ) -> Result<FlowDirective>
    where
        F: FnOnce(PortId, Ipv4Addr, Ipv4Addr, u8) -> FlowMatch,
    {
        let is_local = self.registry.resident_mac_of(ctx.switch_id)? == ctx.dst_mac;
        let (match_port, out_port) = plan.route(ctx.in_port, is_local);

        Ok(FlowDirective {
            switch_id: ctx.switch_id,
            priority: self.flow_priority,
            match_fields: build_match(match_port, ip.src, ip.dst, ip.protocol),
            actions: vec![FlowAction::Output(out_port)],
            buffer_id,
        })
    }

    fn is_blocked_tcp(&self, src: Ipv4Addr, dst_port: u16) -> bool {
        dst_port == self.blocked_tcp_port && self.restricted_tcp_hosts.contains(&src)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::dataplane::classifier::classify;
    use crate::protocol::arp::{ArpOp, ArpPacket};
    use crate::protocol::ethernet::{Frame, FrameBuilder};
    use crate::protocol::icmp::EchoBuilder;
    use crate::protocol::ipv4::{Ipv4Builder, Ipv4Header};
    use crate::protocol::tcp::{TcpBuilder, TcpHeader};
    use crate::protocol::udp::build_datagram;
    use crate::protocol::{EtherType, MacAddr};
    use proptest::prelude::*;

    const HOSTS: u8 = 8;

    fn mac(i: u8) -> MacAddr {
        MacAddr([0x02, 0, 0, 0, 0, i])
    }

    fn ip(i: u8) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, i)
    }

    /// Hosts 1..=HOSTS, host i on switch i; odd hosts restricted, hosts
    /// divisible by three bypassed
    fn engine() -> PolicyEngine {
        let mut registry = TopologyRegistry::new();
        for i in 1..=HOSTS {
            registry.bind_host(i as u64, ip(i), mac(i)).unwrap();
        }
        let policy = PolicyConfig {
            restricted_tcp_hosts: (1..=HOSTS).filter(|i| i % 2 == 1).map(ip).collect(),
            udp_bypass_hosts: (1..=HOSTS).filter(|i| i % 3 == 0).map(ip).collect(),
            ..PolicyConfig::default()
        };
        PolicyEngine::new(Arc::new(registry), &policy, &PortsConfig::default())
    }

    fn ipv4_frame(src: u8, dst: u8, protocol: u8, segment: &[u8]) -> Vec<u8> {
        let packet = Ipv4Builder::new()
            .protocol(protocol)
            .src_addr(ip(src))
            .dst_addr(ip(dst))
            .payload(segment)
            .build();
        FrameBuilder::new()
            .dst_mac(mac(dst))
            .src_mac(mac(src))
            .ethertype(EtherType::Ipv4 as u16)
            .payload(&packet)
            .build()
    }

    fn any_frame(src: u8, dst: u8, protocol: u8, dst_port: u16) -> Vec<u8> {
        match protocol {
            1 => ipv4_frame(src, dst, 1, &EchoBuilder::request(1, 1).build()),
            6 => ipv4_frame(
                src,
                dst,
                6,
                &TcpBuilder::new(40000, dst_port).build(ip(src), ip(dst)),
            ),
            _ => ipv4_frame(
                src,
                dst,
                17,
                &build_datagram(ip(src), ip(dst), 40000, dst_port, b"x"),
            ),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn arp_reply_for_every_bound_ip(
            requester in 1..=HOSTS,
            target in 1..=HOSTS,
            in_port in 1..8u32,
        ) {
            let engine = engine();
            let frame = FrameBuilder::new()
                .dst_mac(MacAddr::BROADCAST)
                .src_mac(mac(requester))
                .ethertype(EtherType::Arp as u16)
                .payload(&ArpPacket::request(mac(requester), ip(requester), ip(target)).to_bytes())
                .build();
            let classification = classify(&frame, requester as u64, in_port).unwrap();

            let emit = match engine.decide(&classification, None).unwrap() {
                Decision::Reply(emit) => emit,
                other => return Err(TestCaseError::fail(format!("unexpected {:?}", other))),
            };
            prop_assert_eq!(emit.out_port, in_port);

            let eth = Frame::parse(&emit.frame).unwrap();
            prop_assert_eq!(eth.src_mac(), mac(target));
            prop_assert_eq!(eth.dst_mac(), mac(requester));
            let reply = ArpPacket::parse(eth.payload()).unwrap();
            prop_assert_eq!(reply.operation, ArpOp::Reply);
            prop_assert_eq!(reply.sender_mac, mac(target));
        }

        #[test]
        fn restricted_http_always_reset(
            half in 0..HOSTS / 2,
            dst in 1..=HOSTS,
            seq in any::<u32>(),
            switch in 1..=HOSTS,
            in_port in 1..5u32,
        ) {
            let src = half * 2 + 1;
            let engine = engine();
            let segment = TcpBuilder::new(40000, 80).seq_num(seq).build(ip(src), ip(dst));
            let frame = ipv4_frame(src, dst, 6, &segment);
            let classification = classify(&frame, switch as u64, in_port).unwrap();

            let (flow, reset) = match engine.decide(&classification, None).unwrap() {
                Decision::Install { flow, reset } => (flow, reset),
                other => return Err(TestCaseError::fail(format!("unexpected {:?}", other))),
            };
            prop_assert_eq!(flow.actions.len(), 1);

            let reset = reset.unwrap();
            let header = Ipv4Header::parse(&reset.frame[14..]).unwrap();
            let rst = TcpHeader::parse(header.payload()).unwrap();
            prop_assert_eq!(rst.ack_num(), seq.wrapping_add(1));
            prop_assert!(rst.flags().rst && rst.flags().ack);
            prop_assert!(!rst.flags().syn && !rst.flags().fin);
        }

        #[test]
        fn decisions_are_deterministic(
            src in 1..=HOSTS,
            dst in 1..=HOSTS,
            switch in 1..=HOSTS,
            in_port in 1..5u32,
            protocol in prop::sample::select(vec![1u8, 6, 17]),
            dst_port in any::<u16>(),
        ) {
            let engine = engine();
            let frame = any_frame(src, dst, protocol, dst_port);
            let classification = classify(&frame, switch as u64, in_port).unwrap();

            let first = engine.decide(&classification, None).unwrap();
            let second = engine.decide(&classification, None).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn bypass_udp_is_always_dropped(
            third in 1..=HOSTS / 3,
            dst in 1..=HOSTS,
            switch in 1..=HOSTS,
            in_port in 1..5u32,
            dst_port in any::<u16>(),
        ) {
            let src = third * 3;
            let engine = engine();
            let frame = any_frame(src, dst, 17, dst_port);
            let classification = classify(&frame, switch as u64, in_port).unwrap();

            match engine.decide(&classification, Some(9)).unwrap() {
                Decision::Install { flow, reset } => {
                    prop_assert!(flow.is_drop());
                    prop_assert!(reset.is_none());
                    prop_assert_eq!(flow.buffer_id, Some(9));
                }
                other => return Err(TestCaseError::fail(format!("unexpected {:?}", other))),
            }
        }

        #[test]
        fn every_forwarding_rule_has_one_output(
            src in 1..=HOSTS,
            dst in 1..=HOSTS,
            switch in 1..=HOSTS,
            in_port in 1..5u32,
            protocol in prop::sample::select(vec![1u8, 6]),
        ) {
            let engine = engine();
            let frame = any_frame(src, dst, protocol, 443);
            let classification = classify(&frame, switch as u64, in_port).unwrap();

            match engine.decide(&classification, None).unwrap() {
                Decision::Install { flow, .. } => {
                    prop_assert_eq!(flow.priority, 1);
                    prop_assert_eq!(flow.actions.len(), 1);
                    let local = switch == dst;
                    let expected = match (in_port == 3, local) {
                        (true, true) => FlowAction::Output(1),
                        _ => FlowAction::Output(2),
                    };
                    prop_assert_eq!(flow.actions[0], expected);
                }
                other => return Err(TestCaseError::fail(format!("unexpected {:?}", other))),
            }
        }
    }
}
