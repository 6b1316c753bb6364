use anyhow::Context;
use dnswire::{parse, parse_header, write_packet, DnsHeader, DnsPacket, ResponseCode};
use log::{debug, error, info, warn};
use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
    time::{Duration, Instant},
};
use typed_builder::TypedBuilder;

use crate::{MAX_PACKET_SIZE, RECURSIVE_DNS_SERVER};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Where and how patiently queries are forwarded.
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct ForwarderConfig {
    #[builder(default = SocketAddr::from(RECURSIVE_DNS_SERVER))]
    pub upstream: SocketAddr,
    // Bound on setting up the upstream socket.
    #[builder(default = DEFAULT_TIMEOUT)]
    pub connect_timeout: Duration,
    // Bound on each send and each receive.
    #[builder(default = DEFAULT_TIMEOUT)]
    pub io_timeout: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        ForwarderConfig::builder().build()
    }
}

/// Relays client queries to a single upstream resolver.
///
/// Holds no state besides its configuration, so one instance can be shared between any number of
/// threads. Every call opens its own upstream socket.
#[derive(Clone, Debug)]
pub struct Forwarder {
    config: ForwarderConfig,
}

impl Forwarder {
    pub fn new(config: ForwarderConfig) -> Forwarder {
        Forwarder { config }
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    /// Turns the raw bytes of one client message into the raw bytes to send back.
    ///
    /// A message that does not parse but still carries a full header is answered with FORMERR
    /// under its own id. Anything shorter than a header cannot be answered and yields `None`.
    pub fn handle(&self, request: &[u8]) -> Option<Vec<u8>> {
        let response = match parse(request) {
            Ok(query) => {
                debug!("Request: {:?}", query);
                self.resolve(&query)
            }
            Err(err) => {
                warn!("Unable to parse client query: {}", err);
                let header = match parse_header(request) {
                    Ok(header) => header,
                    Err(_) => {
                        warn!("Dropping {} byte message without a header", request.len());
                        return None;
                    }
                };
                let query = DnsPacket::builder().header(header).build();
                error_response(&query, ResponseCode::FORMERR)
            }
        };

        debug!("Response: {:?}", response);
        Some(write_packet(&response))
    }

    /// Answers `request` through the upstream. Failures never escape: they come back as a
    /// FORMERR or SERVFAIL response for the client.
    pub fn resolve(&self, request: &DnsPacket) -> DnsPacket {
        let question = match request.first_question() {
            Some(question) => question,
            None => {
                warn!("Client provided insufficient info: {:?}", request.header);
                return error_response(request, ResponseCode::FORMERR);
            }
        };

        info!("Forwarding {} to {}", question, self.config.upstream);

        match self.forward(request) {
            Ok(response) => {
                info!(
                    "Upstream answered {} with {:?} ({} answers)",
                    question,
                    response.rescode(),
                    response.answers.len()
                );
                response
            }
            Err(err) => {
                error!("Server failure: {:?}", err);
                error_response(request, ResponseCode::SERVFAIL)
            }
        }
    }

    fn forward(&self, request: &DnsPacket) -> anyhow::Result<DnsPacket> {
        let query = outbound_query(request);
        let req_buffer = write_packet(&query);

        let socket = self.dial()?;
        socket
            .send(&req_buffer)
            .context("failed to send query to upstream")?;

        let mut response_buffer = vec![0u8; MAX_PACKET_SIZE];
        let size = socket
            .recv(&mut response_buffer)
            .context("failed to read response from upstream")?;

        let mut response =
            parse(&response_buffer[..size]).context("failed to parse response from upstream")?;
        if response.header.id != request.header.id {
            debug!(
                "Upstream replied with id {}, restoring client id {}",
                response.header.id, request.header.id
            );
        }
        response.header.id = request.header.id;

        Ok(response)
    }

    // UDP has no handshake, connecting only fixes the peer address. The deadline still bounds the
    // whole socket setup.
    fn dial(&self) -> anyhow::Result<UdpSocket> {
        let ForwarderConfig {
            upstream,
            connect_timeout,
            io_timeout,
        } = self.config;
        let started = Instant::now();

        let local = match upstream {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local).context("failed to bind upstream socket")?;
        socket
            .connect(upstream)
            .with_context(|| format!("failed to connect to upstream {}", upstream))?;

        if started.elapsed() > connect_timeout {
            anyhow::bail!(
                "connecting to upstream {} took longer than {:?}",
                upstream,
                connect_timeout
            );
        }

        socket
            .set_read_timeout(Some(io_timeout))
            .context("failed to set upstream read timeout")?;
        socket
            .set_write_timeout(Some(io_timeout))
            .context("failed to set upstream write timeout")?;

        Ok(socket)
    }
}

/// Builds the reply for a query that cannot be answered: a response echoing the questions, with
/// RD copied, RA set and every other flag cleared.
pub fn error_response(request: &DnsPacket, rescode: ResponseCode) -> DnsPacket {
    let header = DnsHeader::builder()
        .id(request.header.id)
        .response(true)
        .recursion_desired(request.header.recursion_desired)
        .recursion_available(true)
        .rescode(rescode)
        .questions(request.questions.len() as u16)
        .build();

    DnsPacket::builder()
        .header(header)
        .questions(request.questions.clone())
        .build()
}

// Only the questions and the additional section (EDNS) go upstream, never client supplied answers
// or authorities.
fn outbound_query(request: &DnsPacket) -> DnsPacket {
    let header = DnsHeader {
        questions: request.questions.len() as u16,
        answers: 0,
        authoritative_entries: 0,
        resource_entries: request.resources.len() as u16,
        ..request.header.clone()
    };

    DnsPacket::builder()
        .header(header)
        .questions(request.questions.clone())
        .resources(request.resources.clone())
        .build()
}
