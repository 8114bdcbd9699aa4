//! Shared fixtures: a four-host topology, frame builders and channels

use flowwarden::config::{from_toml, Config};
use flowwarden::controller::{ControllerEvent, Directive, PacketInEvent, SwitchChannel};
use flowwarden::protocol::arp::ArpPacket;
use flowwarden::protocol::ethernet::FrameBuilder;
use flowwarden::protocol::icmp::EchoBuilder;
use flowwarden::protocol::ipv4::Ipv4Builder;
use flowwarden::protocol::tcp::TcpBuilder;
use flowwarden::protocol::udp::build_datagram;
use flowwarden::protocol::{EtherType, MacAddr};
use flowwarden::{Error, Result};
use std::net::Ipv4Addr;

pub const TOPOLOGY: &str = include_str!("../../topology.toml");

pub fn config() -> Config {
    from_toml(TOPOLOGY).unwrap()
}

pub fn mac(host: u8) -> MacAddr {
    MacAddr([0x10, 0, 0, 0, 0, host])
}

pub fn ip(host: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, host)
}

pub fn arp_request(src: u8, target: Ipv4Addr) -> Vec<u8> {
    FrameBuilder::new()
        .dst_mac(MacAddr::BROADCAST)
        .src_mac(mac(src))
        .ethertype(EtherType::Arp as u16)
        .payload(&ArpPacket::request(mac(src), ip(src), target).to_bytes())
        .build()
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

pub fn icmp_echo(src: u8, dst: u8) -> Vec<u8> {
    ipv4_frame(src, dst, 1, &EchoBuilder::request(0x77, 1).payload(b"ping").build())
}

pub fn tcp_syn(src: u8, dst: u8, dst_port: u16, seq: u32) -> Vec<u8> {
    let segment = TcpBuilder::new(50000, dst_port)
        .seq_num(seq)
        .build(ip(src), ip(dst));
    ipv4_frame(src, dst, 6, &segment)
}

pub fn udp_datagram(src: u8, dst: u8) -> Vec<u8> {
    ipv4_frame(src, dst, 17, &build_datagram(ip(src), ip(dst), 5353, 53, b"dns"))
}

pub fn gre_packet(src: u8, dst: u8) -> Vec<u8> {
    ipv4_frame(src, dst, 47, &[0u8; 8])
}

pub fn lldp() -> Vec<u8> {
    FrameBuilder::new()
        .dst_mac(MacAddr([0x01, 0x80, 0xc2, 0, 0, 0x0e]))
        .src_mac(mac(1))
        .ethertype(EtherType::Lldp as u16)
        .payload(&[0x02, 0x07, 0x04, 0, 0, 0, 0, 0, 1])
        .build()
}

pub fn packet_in(switch_id: u64, in_port: u32, data: Vec<u8>, buffer_id: Option<u32>) -> ControllerEvent {
    let total_len = data.len();
    ControllerEvent::PacketIn(PacketInEvent {
        switch_id,
        in_port,
        data,
        buffer_id,
        total_len,
    })
}

/// Keeps every directive it is handed
#[derive(Debug, Default)]
pub struct RecordingChannel {
    pub directives: Vec<Directive>,
}

impl SwitchChannel for RecordingChannel {
    async fn send(&mut self, directive: Directive) -> Result<()> {
        self.directives.push(directive);
        Ok(())
    }
}

/// Rejects every directive
#[derive(Debug, Default)]
pub struct FailingChannel {
    pub attempts: usize,
}

impl SwitchChannel for FailingChannel {
    async fn send(&mut self, _directive: Directive) -> Result<()> {
        self.attempts += 1;
        Err(Error::Channel("switch disconnected".into()))
    }
}
