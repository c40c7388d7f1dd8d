pub mod client;
mod connection;
mod server;

pub use connection::{
    Connection, ConnectionError, DEFAULT_BUFFER_SIZE, Disposition, QUIT_ACK, QUIT_SENTINEL,
    handle_connection,
};
pub use server::{ServeReport, Server, ServerOptions, bind_listener, resolve_addr};
