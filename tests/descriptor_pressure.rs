// Runs in its own test binary: exhausting the descriptor table would starve any test running
// beside it.
use std::{
    fs::File,
    net::{SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use dnsfwd::{
    parse, run_udp_listener, write_packet, DnsHeader, DnsPacket, Forwarder, ForwarderConfig,
    ResponseCode, MAX_PACKET_SIZE,
};
use pretty_assertions::assert_eq;

// Upper bound on descriptors opened, in case the limit is effectively unbounded.
const MAX_HELD_FILES: usize = 1 << 16;

// Header only, no questions: answered with FORMERR without contacting the upstream.
fn empty_query(id: u16) -> Vec<u8> {
    write_packet(
        &DnsPacket::builder()
            .header(DnsHeader::builder().id(id).build())
            .build(),
    )
}

fn exchange(client: &UdpSocket, server: SocketAddr, id: u16) -> DnsPacket {
    client.send_to(&empty_query(id), server).expect("send");

    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let (size, _) = client.recv_from(&mut buf).expect("reply");
    parse(&buf[..size]).expect("parse reply")
}

#[test]
fn udp_listener_survives_descriptor_exhaustion() {
    let forwarder = Arc::new(Forwarder::new(
        ForwarderConfig::builder()
            .upstream("127.0.0.1:9".parse().unwrap())
            .build(),
    ));
    let shutdown = Arc::new(AtomicBool::new(false));

    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind udp");
    let server = socket.local_addr().expect("udp addr");
    let listener = {
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || run_udp_listener(socket, forwarder, shutdown))
    };

    let client = UdpSocket::bind("127.0.0.1:0").expect("bind client");
    client.set_read_timeout(Some(Duration::from_secs(3))).unwrap();

    let mut held = Vec::new();
    while held.len() < MAX_HELD_FILES {
        match File::open("/dev/null") {
            Ok(file) => held.push(file),
            Err(_) => break,
        }
    }

    let starved = exchange(&client, server, 0x0101);
    drop(held);

    assert_eq!(starved.header.id, 0x0101);
    assert_eq!(starved.rescode(), ResponseCode::FORMERR);

    let recovered = exchange(&client, server, 0x0202);
    assert_eq!(recovered.header.id, 0x0202);
    assert_eq!(recovered.rescode(), ResponseCode::FORMERR);

    shutdown.store(true, Ordering::Relaxed);
    listener
        .join()
        .expect("listener panicked")
        .expect("listener failed");
}
