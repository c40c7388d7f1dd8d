use sockr_engine::{ScriptEngine, run_captured};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{self, TcpStream};
use std::str::Utf8Error;
use thiserror::Error;
use tracing::debug;

/// Payloads containing this substring anywhere stop the server.
pub const QUIT_SENTINEL: &str = "quit";

/// Reply sent instead of executing a quit payload.
pub const QUIT_ACK: &str = "QUIT";

pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// A byte stream that can be shut down in both directions.
pub trait Connection: Read + Write {
    fn shutdown_both(&mut self) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn shutdown_both(&mut self) -> io::Result<()> {
        self.shutdown(net::Shutdown::Both)
    }
}

/// What the server loop should do after a connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Quit,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed reading request")]
    Read(#[source] io::Error),
    #[error("request was not valid UTF-8")]
    Decode(#[source] Utf8Error),
    #[error("failed writing response")]
    Write(#[source] io::Error),
    #[error("script engine failure: {0:#}")]
    Engine(anyhow::Error),
}

/// Serves one request on `connection` and closes it.
///
/// The request is a single read of at most `buffer_size` bytes; anything
/// beyond that is never looked at. The connection is shut down and dropped
/// on every path out of this function.
pub fn handle_connection<C, E>(
    connection: C,
    engine: &mut E,
    buffer_size: usize,
) -> Result<Disposition, ConnectionError>
where
    C: Connection,
    E: ScriptEngine + ?Sized,
{
    let mut scope = ConnectionScope { connection };

    let request = read_request(&mut scope.connection, buffer_size)?;
    debug!(bytes = request.len(), "request received");

    let (reply, disposition) = dispatch(engine, &request)?;

    scope
        .connection
        .write_all(reply.as_bytes())
        .and_then(|()| scope.connection.flush())
        .map_err(ConnectionError::Write)?;
    debug!(bytes = reply.len(), ?disposition, "response sent");

    Ok(disposition)
}

fn read_request<C: Read>(connection: &mut C, buffer_size: usize) -> Result<String, ConnectionError> {
    let mut buf = vec![0; buffer_size];
    let read = loop {
        match connection.read(&mut buf) {
            Ok(n) => break n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(ConnectionError::Read(err)),
        }
    };
    buf.truncate(read);

    let text = std::str::from_utf8(&buf).map_err(ConnectionError::Decode)?;
    Ok(text.to_string())
}

fn dispatch<E: ScriptEngine + ?Sized>(
    engine: &mut E,
    request: &str,
) -> Result<(String, Disposition), ConnectionError> {
    // Substring match on purpose: "please quit now" also stops the server.
    if request.contains(QUIT_SENTINEL) {
        return Ok((QUIT_ACK.to_string(), Disposition::Quit));
    }

    let captured = run_captured(engine, request).map_err(ConnectionError::Engine)?;
    debug!(execution = ?captured.value, "payload executed");
    Ok((captured.output, Disposition::Continue))
}

struct ConnectionScope<C: Connection> {
    connection: C,
}

impl<C: Connection> Drop for ConnectionScope<C> {
    fn drop(&mut self) {
        // The peer may already be gone; closing still proceeds.
        if let Err(err) = self.connection.shutdown_both() {
            debug!(error = %err, "connection shutdown failed");
        }
        debug!("connection closed");
    }
}
