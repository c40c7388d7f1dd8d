use anyhow::{Context, Result, anyhow, bail};
use socket2::{Domain, Protocol, Socket, Type};
use sockr_engine::ScriptEngine;
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::connection::{Disposition, handle_connection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    /// Upper bound of the single read that forms a request.
    pub buffer_size: usize,
}

/// Connection counts for one run of [`Server::serve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeReport {
    pub handled: usize,
    pub failed: usize,
}

pub struct Server {
    listener: TcpListener,
    buffer_size: usize,
}

impl Server {
    pub fn bind(options: &ServerOptions) -> Result<Self> {
        if options.buffer_size == 0 {
            bail!("buffer size must be greater than zero");
        }

        let addr = resolve_addr(&options.host, options.port)?;
        let listener = bind_listener(addr).with_context(|| format!("failed binding {addr}"))?;

        Ok(Self {
            listener,
            buffer_size: options.buffer_size,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("failed reading listener address")
    }

    /// Accepts and handles connections one at a time until a quit payload
    /// arrives. The listener is closed when this returns.
    pub fn serve<E: ScriptEngine + ?Sized>(self, engine: &mut E) -> Result<ServeReport> {
        info!(address = %self.local_addr()?, "server is listening");
        let mut report = ServeReport::default();

        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err).context("failed accepting connection"),
            };
            debug!(%peer, "new connection");

            match handle_connection(stream, engine, self.buffer_size) {
                Ok(Disposition::Continue) => report.handled += 1,
                Ok(Disposition::Quit) => {
                    report.handled += 1;
                    info!(%peer, "quit requested");
                    break;
                }
                Err(err) => {
                    report.failed += 1;
                    let err = anyhow::Error::new(err);
                    warn!(%peer, error = %format!("{err:#}"), "connection failed");
                }
            }
        }

        info!(
            handled = report.handled,
            failed = report.failed,
            "shutting down server"
        );
        Ok(report)
    }
}

/// Resolves `host` with the system resolver, preferring an IPv4 address.
pub fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("failed resolving host {host}"))?
        .collect();

    candidates
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| anyhow!("host {host} resolved to no addresses"))
}

/// Creates a listening socket with address reuse and a backlog of one.
pub fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1)?;
    Ok(socket.into())
}
