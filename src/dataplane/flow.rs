//! Flow rules and emitted frames: the decision core's output vocabulary.

use crate::protocol::EtherType;
use std::fmt;
use std::net::Ipv4Addr;

/// Datapath identifier of a switch
pub type SwitchId = u64;

/// Switch port number
pub type PortId = u32;

/// Switch-side buffer identifier carried by a packet-in
pub type BufferId = u32;

/// Action applied by a flow rule or packet-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowAction {
    /// Send out a physical port
    Output(PortId),
    /// Send the whole packet to the controller, unbuffered
    Controller,
    /// Send out every port except the ingress port
    Flood,
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowAction::Output(port) => write!(f, "output:{}", port),
            FlowAction::Controller => write!(f, "controller"),
            FlowAction::Flood => write!(f, "flood"),
        }
    }
}

/// Match fields of a flow rule; `None` means wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FlowMatch {
    pub in_port: Option<PortId>,
    pub eth_type: Option<u16>,
    pub ipv4_src: Option<Ipv4Addr>,
    pub ipv4_dst: Option<Ipv4Addr>,
    pub ip_proto: Option<u8>,
    pub tcp_src: Option<u16>,
    pub tcp_dst: Option<u16>,
    pub udp_src: Option<u16>,
    pub udp_dst: Option<u16>,
}

impl FlowMatch {
    /// Match everything (table-miss)
    pub fn any() -> Self {
        Self::default()
    }

    /// IPv4 3-tuple on an ingress port
    pub fn ipv4(in_port: PortId, src: Ipv4Addr, dst: Ipv4Addr, proto: u8) -> Self {
        Self {
            in_port: Some(in_port),
            eth_type: Some(EtherType::Ipv4 as u16),
            ipv4_src: Some(src),
            ipv4_dst: Some(dst),
            ip_proto: Some(proto),
            ..Self::default()
        }
    }

    pub fn tcp_ports(mut self, src: u16, dst: u16) -> Self {
        self.tcp_src = Some(src);
        self.tcp_dst = Some(dst);
        self
    }

    pub fn udp_ports(mut self, src: u16, dst: u16) -> Self {
        self.udp_src = Some(src);
        self.udp_dst = Some(dst);
        self
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            return write!(f, "*");
        }

        let mut fields = Vec::new();
        if let Some(p) = self.in_port {
            fields.push(format!("in_port={}", p));
        }
        if let Some(t) = self.eth_type {
            fields.push(format!("eth_type={:#06x}", t));
        }
        if let Some(ip) = self.ipv4_src {
            fields.push(format!("ipv4_src={}", ip));
        }
        if let Some(ip) = self.ipv4_dst {
            fields.push(format!("ipv4_dst={}", ip));
        }
        if let Some(p) = self.ip_proto {
            fields.push(format!("ip_proto={}", p));
        }
        let ports = [
            ("tcp_src", self.tcp_src),
            ("tcp_dst", self.tcp_dst),
            ("udp_src", self.udp_src),
            ("udp_dst", self.udp_dst),
        ];
        for (name, port) in ports {
            if let Some(p) = port {
                fields.push(format!("{}={}", name, p));
            }
        }
        write!(f, "{}", fields.join(","))
    }
}

/// Instruction to install a flow rule on a switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowDirective {
    pub switch_id: SwitchId,
    pub priority: u16,
    pub match_fields: FlowMatch,
    /// Empty list installs a drop rule
    pub actions: Vec<FlowAction>,
    /// When set the switch applies the rule to the packet it buffered,
    /// so no separate packet-out is needed
    pub buffer_id: Option<BufferId>,
}

impl FlowDirective {
    pub fn is_drop(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn consumes_buffer(&self) -> bool {
        self.buffer_id.is_some()
    }
}

impl fmt::Display for FlowDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flow sw={:016} prio={} match=[{}] actions=[{}]",
            self.switch_id,
            self.priority,
            self.match_fields,
            join_actions(&self.actions)
        )?;
        if let Some(id) = self.buffer_id {
            write!(f, " buffer={}", id)?;
        }
        Ok(())
    }
}

/// A controller-built frame to transmit out of a switch port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitDirective {
    pub switch_id: SwitchId,
    pub out_port: PortId,
    pub frame: Vec<u8>,
}

impl fmt::Display for EmitDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "emit sw={:016} port={} len={}",
            self.switch_id,
            self.out_port,
            self.frame.len()
        )
    }
}

pub(crate) fn join_actions(actions: &[FlowAction]) -> String {
    actions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
