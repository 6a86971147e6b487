//! Control surface: the IPC server running on its own thread.
//!
//! The server thread owns a current-thread tokio runtime. Its only effect on
//! the host is through a [`TriggerHandle`]; status is read from a
//! [`StatusProbe`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_core::{StatusProbe, TriggerHandle};
use headless_ipc::{ErrorCode, IpcServer, Request, RequestHandler, Response, ResponseData};
use tokio::sync::oneshot;

/// Answers control requests.
///
/// Once a quit action has been accepted, status requests are refused with
/// [`ErrorCode::ShuttingDown`].
pub struct ControlHandler {
    trigger: TriggerHandle,
    status: StatusProbe,
    quitting: AtomicBool,
}

impl ControlHandler {
    pub fn new(trigger: TriggerHandle, status: StatusProbe) -> Self {
        Self {
            trigger,
            status,
            quitting: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RequestHandler for ControlHandler {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::ok_with(ResponseData::Pong {
                timestamp: chrono::Utc::now().timestamp(),
            }),

            Request::Status if self.quitting.load(Ordering::Acquire) => {
                Response::error(ErrorCode::ShuttingDown, "host is shutting down")
            }

            Request::Status => {
                let status = self.status.snapshot();
                Response::ok_with(ResponseData::Status {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    backend: status.backend,
                    client: status.client,
                    session: status.session,
                    sample_rate: status.sample_rate,
                    buffer_size: status.buffer_size,
                    running: status.running,
                    cycles: status.cycles,
                    transport_speed: status.transport_speed,
                    transport_position: status.transport_position,
                    warnings: status.warnings,
                    errors: status.errors,
                    uptime_secs: status.uptime_secs,
                })
            }

            Request::AccessAction { group, item } => {
                tracing::debug!(%group, %item, "Control action");
                if self.trigger.access_action(&group, &item) {
                    self.quitting.store(true, Ordering::Release);
                }
                Response::ack()
            }
        }
    }
}

/// Running control surface. Stopping it closes and removes the socket.
pub struct ControlSurface {
    socket_path: PathBuf,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ControlSurface {
    /// Bind the socket, then serve it on a `control-surface` thread.
    ///
    /// The socket exists when this returns.
    pub fn spawn(socket_path: &Path, handler: ControlHandler) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build control runtime")?;

        let server = runtime
            .block_on(IpcServer::new(socket_path, Arc::new(handler)))
            .with_context(|| format!("Failed to bind {}", socket_path.display()))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let thread = std::thread::Builder::new()
            .name("control-surface".to_string())
            .spawn(move || {
                runtime.block_on(server.run(async {
                    let _ = stop_rx.await;
                }));
            })
            .context("Failed to spawn control thread")?;

        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop serving and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Control surface thread panicked");
            }
        }
    }
}

impl Drop for ControlSurface {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
