//! Packet classification
//!
//! Turns a raw frame into a [`PacketContext`] carrying every field the
//! policy reads. Pure: no registry access, no logging, no allocation
//! beyond the context itself.

use super::{PortId, SwitchId};
use crate::protocol::arp::ArpPacket;
use crate::protocol::ethernet::Frame;
use crate::protocol::icmp::IcmpPacket;
use crate::protocol::ipv4::{Ipv4Header, Protocol};
use crate::protocol::tcp::{TcpFlags, TcpHeader};
use crate::protocol::udp::UdpHeader;
use crate::protocol::{EtherType, MacAddr};
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Outcome of classifying one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification<'a> {
    /// Discovery traffic; produces no directives
    Ignore,
    Packet(PacketContext<'a>),
}

/// Everything the policy needs to know about one packet-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketContext<'a> {
    pub switch_id: SwitchId,
    pub in_port: PortId,
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub ethertype: u16,
    pub kind: PacketKind,
    /// The frame exactly as captured
    pub raw: &'a [u8],
}

impl PacketContext<'_> {
    /// IPv4 header fields, if this is an IPv4 packet
    pub fn ipv4(&self) -> Option<&Ipv4Fields> {
        match &self.kind {
            PacketKind::Arp(_) => None,
            PacketKind::Icmp { ip, .. }
            | PacketKind::Tcp { ip, .. }
            | PacketKind::Udp { ip, .. }
            | PacketKind::OtherIpv4 { ip } => Some(ip),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Fields {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    pub ttl: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpFields {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_num: u32,
    pub ack_num: u32,
    pub flags: TcpFlags,
}

/// Protocol variant of a classified packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketKind {
    Arp(ArpPacket),
    Icmp {
        ip: Ipv4Fields,
        icmp_type: u8,
        code: u8,
    },
    Tcp {
        ip: Ipv4Fields,
        tcp: TcpFields,
    },
    Udp {
        ip: Ipv4Fields,
        src_port: u16,
        dst_port: u16,
    },
    /// IPv4 carrying a protocol the policy has no rule for
    OtherIpv4 { ip: Ipv4Fields },
}

impl PacketKind {
    pub fn name(&self) -> &'static str {
        match self {
            PacketKind::Arp(_) => "arp",
            PacketKind::Icmp { .. } => "icmp",
            PacketKind::Tcp { .. } => "tcp",
            PacketKind::Udp { .. } => "udp",
            PacketKind::OtherIpv4 { .. } => "ipv4",
        }
    }
}

/// Classify a raw frame observed on `in_port` of `switch_id`.
///
/// A truncated capture fails at the first layer whose header is cut
/// short; bytes missing past the last needed header are tolerated.
pub fn classify(frame: &[u8], switch_id: SwitchId, in_port: PortId) -> Result<Classification<'_>> {
    let eth = Frame::parse(frame).map_err(|e| Error::classification("ethernet", e.to_string()))?;

    let kind = match EtherType::from_u16(eth.ethertype()) {
        Some(EtherType::Lldp) => return Ok(Classification::Ignore),
        Some(EtherType::Arp) => {
            let arp = ArpPacket::parse(eth.payload())
                .map_err(|e| Error::classification("arp", e.to_string()))?;
            PacketKind::Arp(arp)
        }
        Some(EtherType::Ipv4) => classify_ipv4(eth.payload())?,
        None => {
            return Err(Error::classification(
                "ethernet",
                format!("unsupported ethertype {:#06x}", eth.ethertype()),
            ))
        }
    };

    Ok(Classification::Packet(PacketContext {
        switch_id,
        in_port,
        src_mac: eth.src_mac(),
        dst_mac: eth.dst_mac(),
        ethertype: eth.ethertype(),
        kind,
        raw: frame,
    }))
}

fn classify_ipv4(packet: &[u8]) -> Result<PacketKind> {
    let header = Ipv4Header::parse(packet).map_err(|e| Error::classification("ipv4", e.to_string()))?;
    let ip = Ipv4Fields {
        src: header.src_addr(),
        dst: header.dst_addr(),
        protocol: header.protocol(),
        ttl: header.ttl(),
    };
    // Later fragments carry no transport header
    if header.fragment_offset() != 0 {
        return Ok(PacketKind::OtherIpv4 { ip });
    }
    let payload = header.payload();

    let kind = match Protocol::from_u8(ip.protocol) {
        Some(Protocol::Icmp) => {
            let icmp =
                IcmpPacket::parse(payload).map_err(|e| Error::classification("icmp", e.to_string()))?;
            PacketKind::Icmp {
                ip,
                icmp_type: icmp.icmp_type(),
                code: icmp.code(),
            }
        }
        Some(Protocol::Tcp) => {
            let tcp =
                TcpHeader::parse(payload).map_err(|e| Error::classification("tcp", e.to_string()))?;
            PacketKind::Tcp {
                ip,
                tcp: TcpFields {
                    src_port: tcp.src_port(),
                    dst_port: tcp.dst_port(),
                    seq_num: tcp.seq_num(),
                    ack_num: tcp.ack_num(),
                    flags: tcp.flags(),
                },
            }
        }
        Some(Protocol::Udp) => {
            let udp =
                UdpHeader::parse(payload).map_err(|e| Error::classification("udp", e.to_string()))?;
            PacketKind::Udp {
                ip,
                src_port: udp.src_port(),
                dst_port: udp.dst_port(),
            }
        }
        None => PacketKind::OtherIpv4 { ip },
    };
    Ok(kind)
}
