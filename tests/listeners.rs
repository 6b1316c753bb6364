use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpListener, TcpStream, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    thread::JoinHandle,
    time::Duration,
};

use dnsfwd::{
    parse, run_tcp_listener, run_udp_listener, write_packet, DnsHeader, DnsPacket, DnsQuestion,
    DnsRecord, Forwarder, ForwarderConfig, QueryClass, QueryType, ResponseCode, MAX_PACKET_SIZE,
};
use pretty_assertions::assert_eq;

// Answers every query with one A record, under an id of its own.
fn spawn_stub_upstream() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind stub upstream");
    let addr = socket.local_addr().expect("local_addr");

    thread::spawn(move || {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        while let Ok((size, src)) = socket.recv_from(&mut buf) {
            let query = match parse(&buf[..size]) {
                Ok(query) => query,
                Err(_) => continue,
            };
            let header = DnsHeader {
                id: query.header.id.wrapping_add(1),
                response: true,
                recursion_available: true,
                answers: 1,
                ..query.header.clone()
            };
            let answer = DnsRecord::new(
                query.questions[0].name.clone(),
                QueryType::A,
                QueryClass::IN,
                60,
                vec![10, 0, 0, 1],
            );
            let reply = DnsPacket::builder()
                .header(header)
                .questions(query.questions.clone())
                .answers(vec![answer])
                .resources(query.resources)
                .build();
            let _ = socket.send_to(&write_packet(&reply), src);
        }
    });

    addr
}

struct Running {
    udp: SocketAddr,
    tcp: SocketAddr,
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<anyhow::Result<()>>>,
}

impl Running {
    fn start() -> Running {
        let forwarder = Arc::new(Forwarder::new(
            ForwarderConfig::builder()
                .upstream(spawn_stub_upstream())
                .io_timeout(Duration::from_millis(500))
                .build(),
        ));
        let shutdown = Arc::new(AtomicBool::new(false));

        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind udp");
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind tcp");
        let udp = socket.local_addr().expect("udp addr");
        let tcp = listener.local_addr().expect("tcp addr");

        let threads = vec![
            {
                let (forwarder, shutdown) = (Arc::clone(&forwarder), Arc::clone(&shutdown));
                thread::spawn(move || run_udp_listener(socket, forwarder, shutdown))
            },
            {
                let (forwarder, shutdown) = (Arc::clone(&forwarder), Arc::clone(&shutdown));
                thread::spawn(move || run_tcp_listener(listener, forwarder, shutdown))
            },
        ];

        Running {
            udp,
            tcp,
            shutdown,
            threads,
        }
    }

    fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.threads {
            handle.join().expect("listener panicked").expect("listener failed");
        }
    }
}

fn query(id: u16, name: &str) -> Vec<u8> {
    let header = DnsHeader::builder()
        .id(id)
        .recursion_desired(true)
        .questions(1)
        .build();
    let question = DnsQuestion {
        name: name.to_string(),
        qtype: QueryType::A,
        qclass: QueryClass::IN,
    };

    write_packet(
        &DnsPacket::builder()
            .header(header)
            .questions(vec![question])
            .build(),
    )
}

fn udp_exchange(server: SocketAddr, request: &[u8]) -> std::io::Result<Vec<u8>> {
    let socket = UdpSocket::bind("127.0.0.1:0")?;
    socket.set_read_timeout(Some(Duration::from_secs(3)))?;
    socket.send_to(request, server)?;

    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let (size, _) = socket.recv_from(&mut buf)?;
    Ok(buf[..size].to_vec())
}

fn tcp_send(stream: &mut TcpStream, request: &[u8]) {
    stream
        .write_all(&(request.len() as u16).to_be_bytes())
        .expect("write len");
    stream.write_all(request).expect("write body");
}

fn tcp_recv(stream: &mut TcpStream) -> Vec<u8> {
    let mut lenbuf = [0u8; 2];
    stream.read_exact(&mut lenbuf).expect("read len");
    let mut response = vec![0u8; u16::from_be_bytes(lenbuf) as usize];
    stream.read_exact(&mut response).expect("read body");
    response
}

#[test]
fn udp_queries_are_forwarded() {
    let running = Running::start();

    let reply = udp_exchange(running.udp, &query(0x1234, "example.com")).unwrap();
    let response = parse(&reply).unwrap();

    assert_eq!(response.header.id, 0x1234);
    assert_eq!(response.rescode(), ResponseCode::NOERROR);
    assert_eq!(response.qname(), Some("example.com".to_string()));
    assert_eq!(response.qtype(), Some(QueryType::A));
    assert_eq!(response.answers[0].data, vec![10, 0, 0, 1]);

    running.stop();
}

#[test]
fn udp_broken_query_gets_formerr_and_short_one_is_dropped() {
    let running = Running::start();

    let mut broken = query(0x0bad, "example.com");
    broken.truncate(15);
    let response = parse(&udp_exchange(running.udp, &broken).unwrap()).unwrap();
    assert_eq!(response.header.id, 0x0bad);
    assert_eq!(response.rescode(), ResponseCode::FORMERR);

    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    socket.send_to(&[0x01, 0x02, 0x03], running.udp).unwrap();
    let mut buf = [0u8; 64];
    assert!(socket.recv_from(&mut buf).is_err());

    running.stop();
}

#[test]
fn tcp_serves_several_messages_per_connection() {
    let running = Running::start();

    let mut stream = TcpStream::connect(running.tcp).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(3))).unwrap();

    tcp_send(&mut stream, &query(1, "one.example"));
    tcp_send(&mut stream, &query(2, "two.example"));

    let first = parse(&tcp_recv(&mut stream)).unwrap();
    let second = parse(&tcp_recv(&mut stream)).unwrap();

    assert_eq!(first.header.id, 1);
    assert_eq!(first.qname(), Some("one.example".to_string()));
    assert_eq!(second.header.id, 2);
    assert_eq!(second.qname(), Some("two.example".to_string()));
    assert!(second.has_answers());

    drop(stream);
    running.stop();
}

#[test]
fn tcp_zero_question_query_is_formerr() {
    let running = Running::start();

    let mut request = query(9, "example.com");
    // clear QDCOUNT and drop the question
    request.truncate(12);
    request[5] = 0;

    let mut stream = TcpStream::connect(running.tcp).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(3))).unwrap();
    tcp_send(&mut stream, &request);
    let response = parse(&tcp_recv(&mut stream)).unwrap();

    assert_eq!(response.header.id, 9);
    assert_eq!(response.rescode(), ResponseCode::FORMERR);
    assert!(response.header.response);
    assert!(response.header.recursion_available);
    assert_eq!(response.header.answers, 0);

    drop(stream);
    running.stop();
}
