use std::{
    net::{SocketAddr, TcpListener, UdpSocket},
    sync::{atomic::AtomicBool, Arc},
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use log::{info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use structopt::StructOpt;

use dnsfwd::{run_tcp_listener, run_udp_listener, Forwarder, ForwarderConfig};

#[derive(Debug, StructOpt)]
#[structopt(name = "dnsfwd", about = "Forward DNS queries to an upstream resolver")]
struct Opt {
    /// Address to serve on, over both UDP and TCP
    #[structopt(short, long, default_value = "127.0.0.1:2053")]
    bind: SocketAddr,
    /// Resolver every query is forwarded to
    #[structopt(short, long, default_value = "8.8.8.8:53")]
    upstream: SocketAddr,
    #[structopt(long, default_value = "2000")]
    connect_timeout_ms: u64,
    #[structopt(long, default_value = "2000")]
    io_timeout_ms: u64,
    /// Only serve UDP
    #[structopt(long)]
    no_tcp: bool,
}

impl Opt {
    fn forwarder_config(&self) -> anyhow::Result<ForwarderConfig> {
        if self.connect_timeout_ms == 0 {
            anyhow::bail!("--connect-timeout-ms must be greater than zero");
        }
        if self.io_timeout_ms == 0 {
            anyhow::bail!("--io-timeout-ms must be greater than zero");
        }

        Ok(ForwarderConfig::builder()
            .upstream(self.upstream)
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .io_timeout(Duration::from_millis(self.io_timeout_ms))
            .build())
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opt = Opt::from_args();
    let config = opt.forwarder_config()?;
    let forwarder = Arc::new(Forwarder::new(config));
    info!("Starting DNS forwarder on {}: {:?}", opt.bind, forwarder.config());

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM].iter() {
        if let Err(err) = signal_hook::flag::register(*signal, Arc::clone(&shutdown)) {
            warn!("Failed to register handler for signal {}: {}", signal, err);
        }
    }

    let mut listeners = Vec::new();

    let socket =
        UdpSocket::bind(opt.bind).with_context(|| format!("failed to bind UDP {}", opt.bind))?;
    let (udp_forwarder, udp_shutdown) = (Arc::clone(&forwarder), Arc::clone(&shutdown));
    listeners.push((
        "UDP",
        thread::spawn(move || run_udp_listener(socket, udp_forwarder, udp_shutdown)),
    ));

    if !opt.no_tcp {
        let listener = TcpListener::bind(opt.bind)
            .with_context(|| format!("failed to bind TCP {}", opt.bind))?;
        let (tcp_forwarder, tcp_shutdown) = (Arc::clone(&forwarder), Arc::clone(&shutdown));
        listeners.push((
            "TCP",
            thread::spawn(move || run_tcp_listener(listener, tcp_forwarder, tcp_shutdown)),
        ));
    }

    for (name, listener) in listeners {
        listener
            .join()
            .map_err(|_| anyhow!("{} listener panicked", name))?
            .with_context(|| format!("{} listener failed", name))?;
    }

    info!("All listeners shut down");
    Ok(())
}
