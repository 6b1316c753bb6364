use anyhow::Context;
use log::{debug, info, warn};
use std::{
    convert::TryFrom,
    io::{self, Read, Write},
    net::{TcpListener, TcpStream, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crate::{Forwarder, MAX_PACKET_SIZE};

pub const TCP_IO_TIMEOUT: Duration = Duration::from_secs(5);

// How often idle listeners look at the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Serves DNS over UDP until `shutdown` is raised. Each datagram is answered on its own thread.
pub fn run_udp_listener(
    socket: UdpSocket,
    forwarder: Arc<Forwarder>,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    socket
        .set_read_timeout(Some(POLL_INTERVAL))
        .context("failed to set UDP poll interval")?;
    info!("UDP listener ready on {}", socket.local_addr()?);

    let socket = Arc::new(socket);
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    while !shutdown.load(Ordering::Relaxed) {
        let (size, src) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(ref err) if is_idle(err) => continue,
            Err(err) => {
                warn!("UDP recv error: {}", err);
                thread::sleep(POLL_INTERVAL);
                continue;
            }
        };
        debug!("Received {} bytes from {}", size, src);

        let request = buf[..size].to_vec();
        let reply_socket = Arc::clone(&socket);
        let forwarder = Arc::clone(&forwarder);

        thread::spawn(move || {
            if let Some(response) = forwarder.handle(&request) {
                if let Err(err) = reply_socket.send_to(&response, src) {
                    warn!("Failed to send UDP response to {}: {}", src, err);
                }
            }
        });
    }

    info!("UDP listener shut down");
    Ok(())
}

/// Serves DNS over TCP until `shutdown` is raised. Each connection gets its own thread.
pub fn run_tcp_listener(
    listener: TcpListener,
    forwarder: Arc<Forwarder>,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    listener
        .set_nonblocking(true)
        .context("failed to make TCP listener non-blocking")?;
    info!("TCP listener ready on {}", listener.local_addr()?);

    while !shutdown.load(Ordering::Relaxed) {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(ref err) if is_idle(err) => {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            Err(err) => {
                warn!("TCP accept error: {}", err);
                thread::sleep(POLL_INTERVAL);
                continue;
            }
        };
        debug!("Accepted TCP connection from {}", peer);

        let forwarder = Arc::clone(&forwarder);
        thread::spawn(move || {
            if let Err(err) = handle_tcp_connection(stream, &forwarder) {
                warn!("TCP connection with {} failed: {:?}", peer, err);
            }
        });
    }

    info!("TCP listener shut down");
    Ok(())
}

// Messages are framed by a two byte length. Serves messages until the client hangs up.
fn handle_tcp_connection(mut stream: TcpStream, forwarder: &Forwarder) -> anyhow::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(TCP_IO_TIMEOUT))?;
    stream.set_write_timeout(Some(TCP_IO_TIMEOUT))?;

    loop {
        let mut lenbuf = [0u8; 2];
        match stream.read_exact(&mut lenbuf) {
            Ok(()) => {}
            Err(ref err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err).context("failed to read message length"),
        }

        let mut request = vec![0u8; u16::from_be_bytes(lenbuf) as usize];
        stream
            .read_exact(&mut request)
            .context("failed to read message body")?;

        let response = match forwarder.handle(&request) {
            Some(response) => response,
            None => continue,
        };
        let len = u16::try_from(response.len()).context("response too large for TCP framing")?;

        let mut out = Vec::with_capacity(response.len() + 2);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&response);
        stream.write_all(&out).context("failed to write response")?;
        stream.flush()?;
    }
}
