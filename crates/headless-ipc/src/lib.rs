//! Control-surface protocol for the headless host.
//!
//! Requests and responses are length-prefixed MessagePack over a Unix socket.
//! The server also accepts JSON request bodies, which makes it easy to poke
//! at with `socat`.

mod client;
mod error;
mod protocol;
mod server;

pub use client::{IpcClient, DEFAULT_SOCKET_PATH};
pub use error::IpcError;
pub use protocol::*;
pub use server::{IpcServer, RequestHandler, MAX_REQUEST_SIZE};
