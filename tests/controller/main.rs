//! Controller tests: events in, directives out
//!
//! Run with: cargo test --test controller

mod support;

use flowwarden::controller::{Controller, ControllerEvent, Directive, PacketInEvent, PacketRelease};
use flowwarden::dataplane::{FlowAction, FlowMatch};
use flowwarden::protocol::arp::{ArpOp, ArpPacket};
use flowwarden::protocol::ethernet::Frame;
use flowwarden::protocol::ipv4::Ipv4Header;
use flowwarden::protocol::tcp::TcpHeader;
use flowwarden::telemetry::MetricsRegistry;
use std::sync::Arc;
use support::*;
use tokio::sync::mpsc;

fn controller() -> Controller {
    Controller::new(&config(), Arc::new(MetricsRegistry::new())).unwrap()
}

#[test]
fn test_arp_request_is_answered_by_proxy() {
    let controller = controller();
    let directives = controller.dispatch(&packet_in(1, 1, arp_request(1, ip(2)), None));

    assert_eq!(directives.len(), 1);
    let emit = match &directives[0] {
        Directive::EmitFrame(emit) => emit,
        other => panic!("expected emitted frame, got {:?}", other),
    };
    assert_eq!(emit.switch_id, 1);
    assert_eq!(emit.out_port, 1);

    let eth = Frame::parse(&emit.frame).unwrap();
    assert_eq!(eth.src_mac(), mac(2));
    assert_eq!(eth.dst_mac(), mac(1));
    let reply = ArpPacket::parse(eth.payload()).unwrap();
    assert_eq!(reply.operation, ArpOp::Reply);
    assert_eq!(reply.sender_mac, mac(2));
    assert_eq!(reply.target_ip, ip(1));

    assert_eq!(controller.metrics().arp_replies.get(), 1);
}

#[test]
fn test_arp_for_unknown_address_is_dropped() {
    let controller = controller();
    let directives = controller.dispatch(&packet_in(1, 1, arp_request(1, ip(99)), None));

    assert!(directives.is_empty());
    assert_eq!(controller.metrics().binding_misses.get(), 1);
}

#[test]
fn test_icmp_to_resident_host() {
    let controller = controller();
    let frame = icmp_echo(3, 1);
    let directives = controller.dispatch(&packet_in(1, 3, frame.clone(), None));

    assert_eq!(directives.len(), 2);
    match &directives[0] {
        Directive::InstallFlow(flow) => {
            assert_eq!(flow.priority, 1);
            assert_eq!(flow.match_fields, FlowMatch::ipv4(3, ip(3), ip(1), 1));
            assert_eq!(flow.actions, vec![FlowAction::Output(1)]);
            assert_eq!(flow.buffer_id, None);
        }
        other => panic!("expected flow, got {:?}", other),
    }
    assert_eq!(
        directives[1],
        Directive::ReleasePacket(PacketRelease {
            switch_id: 1,
            in_port: 3,
            buffer_id: None,
            actions: vec![FlowAction::Output(1)],
            data: Some(frame),
        })
    );
}

#[test]
fn test_buffered_packet_rides_on_the_flow() {
    let controller = controller();
    let directives = controller.dispatch(&packet_in(1, 1, icmp_echo(1, 3), Some(41)));

    assert_eq!(directives.len(), 1);
    match &directives[0] {
        Directive::InstallFlow(flow) => {
            assert_eq!(flow.buffer_id, Some(41));
            assert_eq!(flow.match_fields.in_port, Some(1));
            assert_eq!(flow.actions, vec![FlowAction::Output(2)]);
        }
        other => panic!("expected flow, got {:?}", other),
    }
    assert_eq!(controller.metrics().packets_released.get(), 0);
}

#[test]
fn test_restricted_http_gets_reset_then_flow() {
    let controller = controller();
    let directives = controller.dispatch(&packet_in(2, 1, tcp_syn(2, 3, 80, 9000), None));

    assert_eq!(directives.len(), 3);
    let reset = match &directives[0] {
        Directive::EmitFrame(emit) => emit,
        other => panic!("expected reset first, got {:?}", other),
    };
    assert_eq!(reset.out_port, 1);
    let eth = Frame::parse(&reset.frame).unwrap();
    assert_eq!(eth.dst_mac(), mac(2));
    assert_eq!(eth.src_mac(), mac(3));
    let header = Ipv4Header::parse(eth.payload()).unwrap();
    assert_eq!(header.src_addr(), ip(3));
    assert_eq!(header.dst_addr(), ip(2));
    let rst = TcpHeader::parse(header.payload()).unwrap();
    assert_eq!(rst.src_port(), 80);
    assert_eq!(rst.dst_port(), 50000);
    assert_eq!(rst.ack_num(), 9001);

    match &directives[1] {
        Directive::InstallFlow(flow) => {
            assert_eq!(
                flow.match_fields,
                FlowMatch::ipv4(1, ip(2), ip(3), 6).tcp_ports(50000, 80)
            );
            assert_eq!(flow.actions, vec![FlowAction::Output(2)]);
        }
        other => panic!("expected flow, got {:?}", other),
    }
    assert!(matches!(directives[2], Directive::ReleasePacket(_)));
    assert_eq!(controller.metrics().tcp_resets.get(), 1);
}

#[test]
fn test_unrestricted_http_is_only_forwarded() {
    let controller = controller();
    let directives = controller.dispatch(&packet_in(1, 1, tcp_syn(1, 3, 80, 1), None));

    assert!(directives
        .iter()
        .all(|d| !matches!(d, Directive::EmitFrame(_))));
    assert_eq!(controller.metrics().tcp_resets.get(), 0);
}

#[test]
fn test_udp_bypass_host_is_blackholed() {
    let controller = controller();
    let directives = controller.dispatch(&packet_in(4, 1, udp_datagram(4, 2), None));

    assert_eq!(directives.len(), 1);
    match &directives[0] {
        Directive::InstallFlow(flow) => {
            assert!(flow.actions.is_empty());
            assert_eq!(
                flow.match_fields,
                FlowMatch::ipv4(1, ip(4), ip(2), 17).udp_ports(5353, 53)
            );
        }
        other => panic!("expected drop flow, got {:?}", other),
    }
    assert_eq!(controller.metrics().drop_flows.get(), 1);
}

#[test]
fn test_udp_over_trunk_to_resident_host() {
    let controller = controller();
    let directives = controller.dispatch(&packet_in(3, 2, udp_datagram(2, 3), None));

    match &directives[0] {
        Directive::InstallFlow(flow) => {
            assert_eq!(flow.match_fields.in_port, Some(2));
            assert_eq!(flow.actions, vec![FlowAction::Output(1)]);
        }
        other => panic!("expected flow, got {:?}", other),
    }
}

#[test]
fn test_unhandled_protocol_is_flooded() {
    let controller = controller();
    let frame = gre_packet(1, 2);

    let directives = controller.dispatch(&packet_in(1, 1, frame.clone(), None));
    assert_eq!(
        directives,
        vec![Directive::ReleasePacket(PacketRelease {
            switch_id: 1,
            in_port: 1,
            buffer_id: None,
            actions: vec![FlowAction::Flood],
            data: Some(frame.clone()),
        })]
    );

    let directives = controller.dispatch(&packet_in(1, 1, frame, Some(5)));
    assert_eq!(
        directives,
        vec![Directive::ReleasePacket(PacketRelease {
            switch_id: 1,
            in_port: 1,
            buffer_id: Some(5),
            actions: vec![FlowAction::Flood],
            data: None,
        })]
    );
    assert_eq!(controller.metrics().passthrough.get(), 2);
}

#[test]
fn test_unknown_switch_yields_nothing() {
    let controller = controller();
    assert!(controller
        .dispatch(&packet_in(77, 1, icmp_echo(1, 2), None))
        .is_empty());
    assert_eq!(controller.metrics().binding_misses.get(), 1);
}

#[test]
fn test_unknown_switch_still_resets_restricted_http() {
    let controller = controller();
    let directives = controller.dispatch(&packet_in(77, 1, tcp_syn(2, 1, 80, 41), None));

    assert_eq!(directives.len(), 1);
    let reset = match &directives[0] {
        Directive::EmitFrame(reset) => reset,
        other => panic!("expected reset, got {:?}", other),
    };
    assert_eq!(reset.switch_id, 77);
    assert_eq!(reset.out_port, 1);
    let eth = Frame::parse(&reset.frame).unwrap();
    assert_eq!(eth.dst_mac(), mac(2));
    let header = Ipv4Header::parse(eth.payload()).unwrap();
    let rst = TcpHeader::parse(header.payload()).unwrap();
    assert_eq!(rst.ack_num(), 42);

    assert_eq!(controller.metrics().tcp_resets.get(), 1);
    assert_eq!(controller.metrics().binding_misses.get(), 1);
    assert_eq!(controller.metrics().flows_installed.get(), 0);
}

#[test]
fn test_truncated_capture() {
    let controller = controller();
    let frame = tcp_syn(1, 2, 22, 1);
    let total_len = frame.len();

    // Transport header cut short: nothing to decide on
    let event = ControllerEvent::PacketIn(PacketInEvent {
        switch_id: 1,
        in_port: 1,
        data: frame[..40].to_vec(),
        buffer_id: Some(3),
        total_len,
    });
    assert!(controller.dispatch(&event).is_empty());

    // Headers intact, payload missing: still decided
    let datagram = udp_datagram(2, 3);
    let event = ControllerEvent::PacketIn(PacketInEvent {
        switch_id: 3,
        in_port: 1,
        data: datagram[..14 + 20 + 8].to_vec(),
        buffer_id: Some(4),
        total_len: datagram.len(),
    });
    assert_eq!(controller.dispatch(&event).len(), 1);

    assert_eq!(controller.metrics().truncated.get(), 2);
    assert_eq!(controller.metrics().classification_errors.get(), 1);
}

#[test]
fn test_lldp_is_silent() {
    let controller = controller();
    assert!(controller.dispatch(&packet_in(1, 2, lldp(), None)).is_empty());
    assert_eq!(controller.metrics().lldp_ignored.get(), 1);
}

#[test]
fn test_sightings_do_not_steer_forwarding() {
    let controller = controller();
    let first = controller.dispatch(&packet_in(1, 3, icmp_echo(3, 1), None));
    assert_eq!(controller.registry().sighting(1, mac(3)), Some(3));

    // Same packet again: identical decision even though the source is now known
    let second = controller.dispatch(&packet_in(1, 3, icmp_echo(3, 1), None));
    assert_eq!(first, second);
    assert_eq!(controller.registry().sighting_count(), 1);
}

#[tokio::test]
async fn test_run_delivers_in_order() {
    let controller = controller();
    let (tx, rx) = mpsc::channel(16);

    tx.send(ControllerEvent::SwitchConnected { switch_id: 1 })
        .await
        .unwrap();
    tx.send(packet_in(1, 1, arp_request(1, ip(3)), None))
        .await
        .unwrap();
    tx.send(packet_in(1, 1, lldp(), None)).await.unwrap();
    drop(tx);

    let mut channel = RecordingChannel::default();
    controller.run(rx, &mut channel).await.unwrap();

    assert_eq!(channel.directives.len(), 2);
    match &channel.directives[0] {
        Directive::InstallFlow(flow) => {
            assert!(flow.match_fields.is_wildcard());
            assert_eq!(flow.priority, 0);
            assert_eq!(flow.actions, vec![FlowAction::Controller]);
        }
        other => panic!("expected table-miss flow, got {:?}", other),
    }
    assert!(matches!(channel.directives[1], Directive::EmitFrame(_)));
}

#[tokio::test]
async fn test_run_survives_channel_failures() {
    let controller = controller();
    let (tx, rx) = mpsc::channel(4);
    tx.send(ControllerEvent::SwitchConnected { switch_id: 1 })
        .await
        .unwrap();
    tx.send(ControllerEvent::SwitchConnected { switch_id: 2 })
        .await
        .unwrap();
    drop(tx);

    let mut channel = FailingChannel::default();
    controller.run(rx, &mut channel).await.unwrap();

    assert_eq!(channel.attempts, 2);
    assert_eq!(controller.metrics().channel_errors.get(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatch_is_independent() {
    let controller = Arc::new(controller());
    let events = vec![
        packet_in(1, 3, icmp_echo(3, 1), None),
        packet_in(2, 1, tcp_syn(2, 4, 80, 7), Some(1)),
        packet_in(3, 2, udp_datagram(2, 3), None),
        packet_in(4, 1, udp_datagram(4, 1), None),
        packet_in(2, 1, arp_request(2, ip(4)), None),
    ];
    let expected: Vec<_> = events.iter().map(|e| controller.dispatch(e)).collect();

    let mut handles = Vec::new();
    for task in 0..16 {
        let controller = Arc::clone(&controller);
        let events = events.clone();
        let expected = expected.clone();
        handles.push(tokio::spawn(async move {
            for round in 0..50 {
                let idx = (task + round) % events.len();
                assert_eq!(controller.dispatch(&events[idx]), expected[idx]);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(
        controller.metrics().packet_in.get(),
        (events.len() + 16 * 50) as u64
    );
}
