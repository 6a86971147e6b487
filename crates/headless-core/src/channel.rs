//! Cross-thread shutdown channel.
//!
//! A self-pipe built on a Unix socket pair. Any number of producers write a
//! single byte to the non-blocking write end; the one consumer blocks on the
//! read end. Bytes stay in the socket buffer until read, so a delivery that
//! happens before the consumer starts waiting is never lost.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;

/// Token written by in-process producers. Its value carries no meaning.
pub const SHUTDOWN_TOKEN: u8 = b'x';

/// Consumer side of the channel. Owned by the controller thread.
#[derive(Debug)]
pub struct ShutdownChannel {
    reader: UnixStream,
    notifier: ShutdownNotifier,
}

/// Producer side of the channel.
///
/// The only operation is [`deliver`](Self::deliver), which is safe to call
/// from any thread, including the engine's process thread. Cloning bumps a
/// reference count and nothing else.
#[derive(Debug, Clone)]
pub struct ShutdownNotifier {
    writer: Arc<UnixStream>,
}

impl ShutdownChannel {
    /// Create a new channel.
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        writer.set_nonblocking(true)?;

        Ok(Self {
            reader,
            notifier: ShutdownNotifier {
                writer: Arc::new(writer),
            },
        })
    }

    /// Get a producer handle for this channel.
    pub fn notifier(&self) -> ShutdownNotifier {
        self.notifier.clone()
    }

    /// Block until at least one delivery has happened, then return its token.
    ///
    /// Deliveries that are pending when this returns are drained, so a burst
    /// of deliveries is observed as a single request.
    pub fn receive(&self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "shutdown channel closed",
                    ))
                }
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        self.drain()?;
        tracing::trace!(token = buf[0], "Shutdown token received");
        Ok(buf[0])
    }

    /// Non-blocking variant of [`receive`](Self::receive).
    ///
    /// Returns `Ok(None)` if nothing has been delivered since the last receive.
    pub fn try_receive(&self) -> io::Result<Option<u8>> {
        self.reader.set_nonblocking(true)?;
        let mut buf = [0u8; 1];
        let result = loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => break Ok(None),
                Ok(_) => break Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(None),
                Err(e) => break Err(e),
            }
        };
        self.reader.set_nonblocking(false)?;

        let token = result?;
        if token.is_some() {
            self.drain()?;
        }
        Ok(token)
    }

    /// Discard everything currently buffered on the read end.
    fn drain(&self) -> io::Result<()> {
        self.reader.set_nonblocking(true)?;
        let mut scratch = [0u8; 64];
        let result = loop {
            match (&self.reader).read(&mut scratch) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.reader.set_nonblocking(false)?;
        result
    }
}

impl ShutdownNotifier {
    /// Request shutdown.
    ///
    /// Performs one non-blocking `write(2)` of a stack buffer: no allocation,
    /// no locks. If the socket buffer is full a wakeup is already pending and
    /// the delivery is absorbed.
    pub fn deliver(&self, token: u8) {
        loop {
            match (&*self.writer).write(&[token]) {
                Ok(_) => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return,
            }
        }
    }

    /// Duplicate the write end for registration with a signal handler.
    pub(crate) fn signal_pipe(&self) -> io::Result<UnixStream> {
        self.writer.try_clone()
    }
}
