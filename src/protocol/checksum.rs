//! RFC 1071 internet checksum

use std::net::Ipv4Addr;

/// One's-complement sum folded to 16 bits, not yet inverted
fn ones_complement_sum(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum = sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
    }
    // Odd trailing byte is padded with zero
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add(u16::from_be_bytes([*last, 0]) as u32);
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum
}

/// Checksum over a complete header or message (IPv4, ICMP)
pub fn internet_checksum(data: &[u8]) -> u16 {
    !(ones_complement_sum(0, data) as u16)
}

/// Checksum over a transport segment with the IPv4 pseudo-header (TCP, UDP)
///
/// ```text
/// +--------+--------+--------+--------+
/// |          Source Address           |
/// +--------+--------+--------+--------+
/// |        Destination Address        |
/// +--------+--------+--------+--------+
/// |  Zero  |Protocol|  Segment Length |
/// +--------+--------+--------+--------+
/// ```
pub fn pseudo_header_checksum(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    protocol: u8,
    segment: &[u8],
) -> u16 {
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&src_ip.octets());
    pseudo[4..8].copy_from_slice(&dst_ip.octets());
    pseudo[9] = protocol;
    pseudo[10..12].copy_from_slice(&(segment.len() as u16).to_be_bytes());

    let sum = ones_complement_sum(0, &pseudo);
    !(ones_complement_sum(sum, segment) as u16)
}
