//! Client for the host's control socket.

use crate::{IpcError, Request, Response, ResponseData, QUIT_ACTION};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Default control socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/headless-host.sock";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    /// Create a client for the default socket path
    pub fn new() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }

    pub fn with_socket_path<P: AsRef<Path>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Whether a host appears to be listening
    pub fn is_host_running(&self) -> bool {
        self.socket_path.exists()
    }

    /// Send a request on a fresh connection and wait for the response.
    pub async fn request(&self, request: Request) -> Result<Response, IpcError> {
        let mut stream = self.connect().await?;
        let response =
            tokio::time::timeout(REQUEST_TIMEOUT, Self::exchange(&mut stream, &request)).await??;
        Ok(response)
    }

    async fn connect(&self) -> Result<UnixStream, IpcError> {
        if !self.socket_path.exists() {
            return Err(IpcError::HostNotRunning);
        }

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| IpcError::ConnectionFailed("Connection timed out".to_string()))??;
        Ok(stream)
    }

    async fn exchange(stream: &mut UnixStream, request: &Request) -> Result<Response, IpcError> {
        let request_bytes = rmp_serde::to_vec_named(request)?;
        let len_bytes = (request_bytes.len() as u32).to_le_bytes();

        stream.write_all(&len_bytes).await?;
        stream.write_all(&request_bytes).await?;
        stream.flush().await?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut response_buf = vec![0u8; len];
        stream.read_exact(&mut response_buf).await?;

        Ok(rmp_serde::from_slice(&response_buf)?)
    }

    /// Round-trip a ping. Returns the host's timestamp.
    pub async fn ping(&self) -> Result<i64, IpcError> {
        match self.request(Request::Ping).await? {
            Response::Ok {
                data: Some(ResponseData::Pong { timestamp }),
            } => Ok(timestamp),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_status(&self) -> Result<ResponseData, IpcError> {
        match self.request(Request::Status).await? {
            Response::Ok { data: Some(data) } => Ok(data),
            other => Err(unexpected(other)),
        }
    }

    /// Trigger an action on the host.
    pub async fn send_action(&self, group: &str, item: &str) -> Result<(), IpcError> {
        match self.request(Request::access_action(group, item)).await? {
            Response::Ack | Response::Ok { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Ask the host to shut down.
    pub async fn quit(&self) -> Result<(), IpcError> {
        self.send_action(QUIT_ACTION.0, QUIT_ACTION.1).await
    }
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

fn unexpected(response: Response) -> IpcError {
    match response {
        Response::Error { message, .. } => IpcError::Rejected(message),
        other => IpcError::Rejected(format!("unexpected response: {:?}", other)),
    }
}
