//! Unix socket server for the host's control surface.
//!
//! One request per connection: read a length-prefixed request, dispatch it to
//! the [`RequestHandler`], write the response, close.

use crate::{ErrorCode, IpcError, Request, Response};
use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

/// Maximum request size (1MB)
pub const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Time allowed for a client to send its request
const REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Handles decoded requests
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Request) -> Response;
}

pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
    handler: Arc<dyn RequestHandler>,
}

impl IpcServer {
    /// Bind to `socket_path`, replacing a stale socket file.
    ///
    /// The socket is made readable and writable by the owner only.
    pub async fn new<P: AsRef<Path>>(
        socket_path: P,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<Self, IpcError> {
        let socket_path = socket_path.as_ref();

        if socket_path.exists() {
            let _ = std::fs::remove_file(socket_path);
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!("Control socket listening on {}", socket_path.display());

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
            handler,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections until `shutdown` completes, then remove the socket file.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let handler = self.handler.clone();
                        tokio::spawn(async move {
                            if let Err(e) = Self::handle_connection(stream, handler).await {
                                tracing::debug!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => tracing::error!("Accept error: {}", e),
                },
            }
        }

        drop(self.listener);
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            tracing::debug!("Could not remove control socket: {}", e);
        }
        tracing::info!("Control socket closed");
    }

    async fn handle_connection(
        mut stream: UnixStream,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), IpcError> {
        let request = tokio::time::timeout(REQUEST_TIMEOUT, Self::read_request(&mut stream))
            .await
            .map_err(IpcError::Timeout)?;

        let request = match request {
            Ok(req) => req,
            Err(e) => {
                let response = Response::error(
                    ErrorCode::InvalidRequest,
                    format!("Failed to parse request: {}", e),
                );
                Self::write_response(&mut stream, &response).await?;
                return Err(e);
            }
        };

        tracing::debug!("Received request: {:?}", request);
        let response = handler.handle(request).await;
        Self::write_response(&mut stream, &response).await
    }

    async fn read_request(stream: &mut UnixStream) -> Result<Request, IpcError> {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = u32::from_le_bytes(len_buf) as usize;

        if len > MAX_REQUEST_SIZE {
            return Err(IpcError::RequestTooLarge);
        }

        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await?;

        match rmp_serde::from_slice(&buf) {
            Ok(request) => Ok(request),
            // JSON bodies are accepted for hand-written requests.
            Err(e) => serde_json::from_slice(&buf).map_err(|_| IpcError::Deserialize(e)),
        }
    }

    async fn write_response(stream: &mut UnixStream, response: &Response) -> Result<(), IpcError> {
        let response_bytes = rmp_serde::to_vec_named(response)?;
        let len_bytes = (response_bytes.len() as u32).to_le_bytes();

        stream.write_all(&len_bytes).await?;
        stream.write_all(&response_bytes).await?;
        stream.flush().await?;
        Ok(())
    }
}
