//! Caller side of the wire protocol: one connection per payload.

use anyhow::{Context, Result};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use tracing::debug;

/// Sends `payload` and returns the server's reply once it closes the connection.
///
/// The server reads a bounded prefix of the payload and may close before the
/// rest is sent. The reply it wrote before closing is still returned.
pub fn send<A: ToSocketAddrs>(addr: A, payload: &str) -> Result<String> {
    let mut stream = TcpStream::connect(addr).context("failed connecting to sockr server")?;
    tolerate_hangup(stream.write_all(payload.as_bytes())).context("failed sending payload")?;
    tolerate_hangup(stream.shutdown(Shutdown::Write)).context("failed closing write side")?;

    let mut reply = Vec::new();
    // read_to_end keeps the bytes it got before a reset.
    tolerate_hangup(stream.read_to_end(&mut reply).map(|_| ()))
        .context("failed reading reply")?;
    String::from_utf8(reply).context("reply was not valid UTF-8")
}

fn tolerate_hangup(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(err) if is_hangup(err.kind()) => {
            debug!(error = %err, "server closed the connection early");
            Ok(())
        }
        other => other,
    }
}

fn is_hangup(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::NotConnected
    )
}
