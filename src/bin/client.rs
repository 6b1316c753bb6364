use log::debug;
use std::{
    net::{SocketAddr, UdpSocket},
    time::Duration,
};
use structopt::StructOpt;

use dnsfwd::{
    parse, write_packet, DnsHeader, DnsPacket, DnsQuestion, DnsRecord, QueryClass, QueryType,
    MAX_PACKET_SIZE,
};

fn mk_query(id: u16, qname: &str, qtype: QueryType) -> DnsPacket {
    let header = DnsHeader::builder()
        .id(id)
        .questions(1)
        .recursion_desired(true)
        .build();

    let question = DnsQuestion {
        name: qname.to_string(),
        qtype,
        qclass: QueryClass::IN,
    };

    DnsPacket::builder()
        .header(header)
        .questions(vec![question])
        .build()
}

#[derive(Debug, StructOpt)]
#[structopt(name = "DNS Client", about = "Search DNS records for a given query")]
struct Opt {
    #[structopt(short, long, default_value = "google.com")]
    query: String,
    /// Numeric record type, 1 is A
    #[structopt(short = "t", long, default_value = "1")]
    qtype: u16,
    #[structopt(short, long, default_value = "127.0.0.1:2053")]
    server: SocketAddr,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    debug!("parsing args");

    let Opt {
        query,
        qtype,
        server,
    } = StructOpt::from_args();
    debug!("args {} {} {}", query, qtype, server);

    let socket = UdpSocket::bind(if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" })?;
    socket.set_read_timeout(Some(Duration::from_secs(5)))?;

    let request = mk_query(rand::random(), &query, QueryType::from_num(qtype));
    debug!("Request: {:#?}", request);

    socket.send_to(&write_packet(&request), server)?;

    let mut response_buffer = vec![0u8; MAX_PACKET_SIZE];
    let (size, _src) = socket.recv_from(&mut response_buffer)?;

    let response = parse(&response_buffer[..size])?;

    print_packet(&response);

    Ok(())
}

fn print_record(section: &str, rec: &DnsRecord) {
    match rec.addr() {
        Some(addr) => println!(
            "{}: {} {} {} ttl={} {}",
            section, rec.domain, rec.rtype, rec.class, rec.ttl, addr
        ),
        None => println!(
            "{}: {} {} {} ttl={} ({} bytes)",
            section, rec.domain, rec.rtype, rec.class, rec.ttl, rec.data_len
        ),
    }
}

pub fn print_packet(packet: &DnsPacket) {
    println!("{:#?}", packet.header);

    for q in &packet.questions {
        println!("question: {}", q);
    }
    for rec in &packet.answers {
        print_record("answer", rec);
    }
    for rec in &packet.authorities {
        print_record("authority", rec);
    }
    for rec in &packet.resources {
        print_record("additional", rec);
    }
}
