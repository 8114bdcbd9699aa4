//! Synthetic frames the controller injects on behalf of hosts

use super::classifier::{Ipv4Fields, TcpFields};
use crate::protocol::arp::ArpPacket;
use crate::protocol::ethernet::FrameBuilder;
use crate::protocol::ipv4::Ipv4Builder;
use crate::protocol::tcp::{self, TcpBuilder, TcpFlags};
use crate::protocol::{EtherType, MacAddr};

/// TTL of forged resets
const RESET_TTL: u8 = 255;

/// Proxy ARP reply answering `request` as if sent by the owner of
/// `request.target_ip`, whose MAC is `resolved_mac`.
///
/// `requester` is the Ethernet source of the request frame; it is both
/// the frame destination and the ARP target hardware address.
pub fn build_arp_reply(requester: MacAddr, request: &ArpPacket, resolved_mac: MacAddr) -> Vec<u8> {
    let reply = ArpPacket::reply(resolved_mac, request.target_ip, requester, request.sender_ip);

    FrameBuilder::new()
        .dst_mac(requester)
        .src_mac(resolved_mac)
        .ethertype(EtherType::Arp as u16)
        .payload(&reply.to_bytes())
        .build()
}

/// RST+ACK that tears down the connection `segment` belongs to.
///
/// Every address and port is swapped so the frame reaches the original
/// sender as if it came from the original destination. Sequence and
/// window are zero; the acknowledgment covers the offending segment.
pub fn build_tcp_reset(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    ip: &Ipv4Fields,
    segment: &TcpFields,
) -> Vec<u8> {
    let tcp = TcpBuilder::new(segment.dst_port, segment.src_port)
        .seq_num(0)
        .ack_num(segment.seq_num.wrapping_add(1))
        .flags(TcpFlags::RST_ACK)
        .window(0)
        .build(ip.dst, ip.src);

    let packet = Ipv4Builder::new()
        .ttl(RESET_TTL)
        .protocol(tcp::PROTOCOL_NUMBER)
        .src_addr(ip.dst)
        .dst_addr(ip.src)
        .payload(&tcp)
        .build();

    FrameBuilder::new()
        .dst_mac(src_mac)
        .src_mac(dst_mac)
        .ethertype(EtherType::Ipv4 as u16)
        .payload(&packet)
        .build()
}
