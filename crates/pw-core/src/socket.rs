//! Instruction sockets
//!
//! A [`Socket`] reads and writes whole instructions. Each attached user owns
//! a [`TransportSocket`] over its network connection; the session's
//! broadcast socket implements the same trait by fanning out to all of them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::Framed;

use pw_protocol::{Instruction, InstructionCodec};

use crate::error::SocketError;

/// Byte stream a user connection can run over (TCP, TLS, in-memory pipes)
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A user's connection framed into instructions.
///
/// The router reads `select` from it and then hands the whole value,
/// including any instructions already buffered, to a backend.
pub type Transport = Framed<Box<dyn Io>, InstructionCodec>;

/// Frame a raw connection
pub fn transport<T: Io>(io: T) -> Transport {
    Framed::new(Box::new(io), InstructionCodec::new())
}

/// Bidirectional instruction channel
#[async_trait]
pub trait Socket: Send + Sync {
    /// Queue an instruction for sending
    async fn write(&self, instruction: &Instruction) -> Result<(), SocketError>;

    /// Push queued instructions to the peer
    async fn flush(&self) -> Result<(), SocketError>;

    /// Read the next instruction; `None` once the peer has closed
    async fn read(&self) -> Result<Option<Instruction>, SocketError>;

    /// Wait up to `timeout` for a read to be possible without blocking
    async fn select(&self, timeout: Duration) -> Result<bool, SocketError>;

    /// Flush and shut down the socket; later writes fail with `Closed`
    async fn close(&self);

    /// Write and flush a single instruction
    async fn send(&self, instruction: &Instruction) -> Result<(), SocketError> {
        self.write(instruction).await?;
        self.flush().await
    }
}

struct ReadHalf {
    stream: SplitStream<Transport>,
    /// Instruction consumed by `select` and not yet returned by `read`
    pending: Option<Instruction>,
    eof: bool,
}

/// Socket over one user's framed transport
pub struct TransportSocket {
    writer: Mutex<SplitSink<Transport, Instruction>>,
    reader: Mutex<ReadHalf>,
    closed: AtomicBool,
}

impl TransportSocket {
    /// Take ownership of a transport
    pub fn new(transport: Transport) -> Self {
        let (sink, stream) = transport.split();
        Self {
            writer: Mutex::new(sink),
            reader: Mutex::new(ReadHalf {
                stream,
                pending: None,
                eof: false,
            }),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), SocketError> {
        if self.is_closed() {
            Err(SocketError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Socket for TransportSocket {
    async fn write(&self, instruction: &Instruction) -> Result<(), SocketError> {
        self.ensure_open()?;
        let mut writer = self.writer.lock().await;
        writer.feed(instruction.clone()).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), SocketError> {
        self.ensure_open()?;
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        Ok(())
    }

    async fn read(&self) -> Result<Option<Instruction>, SocketError> {
        let mut reader = self.reader.lock().await;
        if let Some(instruction) = reader.pending.take() {
            return Ok(Some(instruction));
        }
        if reader.eof {
            return Ok(None);
        }

        match reader.stream.next().await {
            Some(Ok(instruction)) => Ok(Some(instruction)),
            Some(Err(e)) => Err(e.into()),
            None => {
                reader.eof = true;
                Ok(None)
            }
        }
    }

    async fn select(&self, timeout: Duration) -> Result<bool, SocketError> {
        let mut reader = self.reader.lock().await;
        if reader.pending.is_some() || reader.eof {
            return Ok(true);
        }

        // Framed's `next` is cancel safe, so a timed-out poll loses nothing
        match tokio::time::timeout(timeout, reader.stream.next()).await {
            Err(_) => Ok(false),
            Ok(Some(Ok(instruction))) => {
                reader.pending = Some(instruction);
                Ok(true)
            }
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(None) => {
                reader.eof = true;
                Ok(true)
            }
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            tracing::debug!("Error while closing user socket: {}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory socket that records what was written to it

    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    pub struct RecordingSocket {
        pub written: parking_lot::Mutex<Vec<Instruction>>,
        pub flushes: AtomicUsize,
        pub fail_writes: bool,
        pub ready: bool,
        pub closed: AtomicBool,
    }

    impl RecordingSocket {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail_writes: true,
                ..Self::default()
            }
        }

        pub fn ready() -> Self {
            Self {
                ready: true,
                ..Self::default()
            }
        }

        pub fn writes(&self) -> Vec<Instruction> {
            self.written.lock().clone()
        }
    }

    #[async_trait]
    impl Socket for RecordingSocket {
        async fn write(&self, instruction: &Instruction) -> Result<(), SocketError> {
            if self.fail_writes || self.closed.load(Ordering::Acquire) {
                return Err(SocketError::Closed);
            }
            self.written.lock().push(instruction.clone());
            Ok(())
        }

        async fn flush(&self) -> Result<(), SocketError> {
            if self.fail_writes {
                return Err(SocketError::Closed);
            }
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn read(&self) -> Result<Option<Instruction>, SocketError> {
            Ok(None)
        }

        async fn select(&self, timeout: Duration) -> Result<bool, SocketError> {
            if !self.ready {
                tokio::time::sleep(timeout).await;
            }
            Ok(self.ready)
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::Release);
        }
    }
}
