//! Decision core
//!
//! Classifies packet-ins, consults the topology registry and turns the
//! result into flow rules and synthetic frames.

mod classifier;
mod flow;
mod policy;
mod registry;
mod synthesizer;

pub use classifier::{
    classify, Classification, Ipv4Fields, PacketContext, PacketKind, TcpFields,
};
pub use flow::{
    BufferId, EmitDirective, FlowAction, FlowDirective, FlowMatch, PortId, SwitchId,
};
pub(crate) use flow::join_actions;
pub use policy::{Decision, ForwardingPlan, PolicyEngine};
pub use registry::TopologyRegistry;
pub use synthesizer::{build_arp_reply, build_tcp_reset};
