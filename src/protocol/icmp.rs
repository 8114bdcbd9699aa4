//! ICMP (Internet Control Message Protocol) - RFC 792
//!
//! Only the fixed 8-byte header matters for flow decisions; the builder
//! exists so echo traffic can be synthesized in tests and replay scripts.

use super::checksum::internet_checksum;
use crate::{Error, Result};

/// ICMP header size (type, code, checksum, rest-of-header)
pub const HEADER_SIZE: usize = 8;

/// IP protocol number for ICMP
pub const PROTOCOL_NUMBER: u8 = 1;

/// Echo message types
pub const ECHO_REPLY: u8 = 0;
pub const ECHO_REQUEST: u8 = 8;

/// Parsed ICMP message
#[derive(Debug)]
pub struct IcmpPacket<'a> {
    buffer: &'a [u8],
}

impl<'a> IcmpPacket<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("ICMP packet too short".into()));
        }
        Ok(Self { buffer })
    }

    pub fn icmp_type(&self) -> u8 {
        self.buffer[0]
    }

    pub fn code(&self) -> u8 {
        self.buffer[1]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// For Echo Request/Reply: identifier
    pub fn identifier(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    /// For Echo Request/Reply: sequence number
    pub fn sequence(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }

    pub fn validate_checksum(&self) -> bool {
        internet_checksum(self.buffer) == 0
    }
}

/// Builder for ICMP echo messages
#[derive(Debug, Clone)]
pub struct EchoBuilder {
    icmp_type: u8,
    identifier: u16,
    sequence: u16,
    payload: Vec<u8>,
}

impl EchoBuilder {
    pub fn request(identifier: u16, sequence: u16) -> Self {
        Self {
            icmp_type: ECHO_REQUEST,
            identifier,
            sequence,
            payload: Vec::new(),
        }
    }

    pub fn reply(identifier: u16, sequence: u16) -> Self {
        Self {
            icmp_type: ECHO_REPLY,
            ..Self::request(identifier, sequence)
        }
    }

    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut packet = vec![0u8; HEADER_SIZE];
        packet[0] = self.icmp_type;
        packet[4..6].copy_from_slice(&self.identifier.to_be_bytes());
        packet[6..8].copy_from_slice(&self.sequence.to_be_bytes());
        packet.extend_from_slice(&self.payload);

        let sum = internet_checksum(&packet);
        packet[2..4].copy_from_slice(&sum.to_be_bytes());
        packet
    }
}
