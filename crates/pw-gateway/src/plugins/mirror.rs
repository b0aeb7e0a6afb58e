//! Mirror protocol
//!
//! Has no remote end. Input from any user is echoed to every user and
//! clipboard data is relayed to everyone, which makes it useful for
//! exercising session sharing without a desktop server.

use std::sync::Arc;

use async_trait::async_trait;

use pw_core::error::SessionError;
use pw_core::{ClientHandler, ClientSession, StreamHandler, User};
use pw_protocol::{ConnectionId, Instruction, ProtocolStatus};

use super::ProtocolPlugin;

/// Plugin registered as `mirror`
#[derive(Debug, Default, Clone, Copy)]
pub struct MirrorPlugin;

impl ProtocolPlugin for MirrorPlugin {
    fn name(&self) -> &str {
        "mirror"
    }

    fn create_handler(
        &self,
        _connection_id: &ConnectionId,
    ) -> Result<Arc<dyn ClientHandler>, SessionError> {
        Ok(Arc::new(MirrorHandler))
    }
}

struct MirrorHandler;

#[async_trait]
impl ClientHandler for MirrorHandler {
    async fn on_join(&self, session: &ClientSession, user: &User) -> Result<(), SessionError> {
        session.log_info(&format!(
            "User {} joined ({} already present)",
            user.id(),
            session.user_count()
        ));
        Ok(())
    }

    async fn on_leave(&self, session: &ClientSession, user: &User) -> Result<(), SessionError> {
        session.log_info(&format!("User {} left", user.id()));
        Ok(())
    }

    async fn on_instruction(
        &self,
        session: &ClientSession,
        _user: &User,
        instruction: &Instruction,
    ) -> Result<(), SessionError> {
        if let Err(e) = session.broadcast(instruction).await {
            tracing::debug!("Echo of \"{}\" partially failed: {}", instruction.opcode, e);
        }
        Ok(())
    }

    async fn on_stream_open(
        &self,
        session: &ClientSession,
        user: &User,
        stream: u32,
        instruction: &Instruction,
    ) -> Option<Arc<dyn StreamHandler>> {
        if instruction.opcode != "clipboard" {
            return None;
        }
        let mimetype = instruction.arg(1)?;

        let output = match session.alloc_stream(Arc::new(ClipboardOutput)) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(
                    "No stream available to relay clipboard from user {}: {}",
                    user.id(),
                    e
                );
                return None;
            }
        };

        if let Err(e) = session
            .broadcast(&Instruction::clipboard(output, mimetype))
            .await
        {
            tracing::debug!("Clipboard relay partially failed: {}", e);
        }

        tracing::debug!(
            "Relaying clipboard stream {} from user {} as stream {}",
            stream,
            user.id(),
            output
        );
        Some(Arc::new(ClipboardRelay { output }))
    }
}

/// Forwards one user's clipboard stream to every user
struct ClipboardRelay {
    output: u32,
}

#[async_trait]
impl StreamHandler for ClipboardRelay {
    async fn on_blob(
        &self,
        session: &ClientSession,
        user: &User,
        stream: u32,
        data: &str,
    ) -> Result<(), SessionError> {
        session
            .broadcast(&Instruction::blob(self.output, data))
            .await?;
        user.socket()
            .send(&Instruction::ack(stream, "OK", ProtocolStatus::Success))
            .await?;
        Ok(())
    }

    async fn on_end(
        &self,
        session: &ClientSession,
        _user: &User,
        _stream: u32,
    ) -> Result<(), SessionError> {
        let result = session.broadcast(&Instruction::end(self.output)).await;
        session.free_stream(self.output)?;
        result?;
        Ok(())
    }
}

/// Output side of a relayed clipboard stream
struct ClipboardOutput;

#[async_trait]
impl StreamHandler for ClipboardOutput {
    async fn on_ack(
        &self,
        _session: &ClientSession,
        user: &User,
        stream: u32,
        message: &str,
        status: ProtocolStatus,
    ) -> Result<(), SessionError> {
        if status.is_error() {
            tracing::debug!(
                "User {} rejected clipboard stream {}: {} ({})",
                user.id(),
                stream,
                message,
                status
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_core::config::SessionLimits;
    use pw_core::error::SocketError;
    use pw_core::Socket;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Socket that keeps everything written to it
    #[derive(Default)]
    struct CaptureSocket {
        written: Mutex<Vec<Instruction>>,
        closed: AtomicBool,
    }

    impl CaptureSocket {
        fn writes(&self) -> Vec<Instruction> {
            self.written.lock().clone()
        }
    }

    #[async_trait]
    impl Socket for CaptureSocket {
        async fn write(&self, instruction: &Instruction) -> Result<(), SocketError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(SocketError::Closed);
            }
            self.written.lock().push(instruction.clone());
            Ok(())
        }

        async fn flush(&self) -> Result<(), SocketError> {
            Ok(())
        }

        async fn read(&self) -> Result<Option<Instruction>, SocketError> {
            Ok(None)
        }

        async fn select(&self, _timeout: Duration) -> Result<bool, SocketError> {
            Ok(false)
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn mirror_session() -> ClientSession {
        let id = ConnectionId::generate();
        let handler = MirrorPlugin.create_handler(&id).unwrap();
        ClientSession::new(id, handler, &SessionLimits::default())
    }

    #[tokio::test]
    async fn test_input_is_echoed_to_everyone() {
        let session = mirror_session();
        let a = Arc::new(CaptureSocket::default());
        let b = Arc::new(CaptureSocket::default());
        let sender = session.add_user(a.clone()).await.unwrap();
        session.add_user(b.clone()).await.unwrap();

        let mouse = Instruction::new("mouse", ["5", "7", "0"]);
        session.handle_instruction(&sender, &mouse).await.unwrap();

        assert_eq!(a.writes(), vec![mouse.clone()]);
        assert_eq!(b.writes(), vec![mouse]);
    }

    #[tokio::test]
    async fn test_clipboard_is_relayed() {
        let session = mirror_session();
        let sender_socket = Arc::new(CaptureSocket::default());
        let watcher = Arc::new(CaptureSocket::default());
        let sender = session.add_user(sender_socket.clone()).await.unwrap();
        session.add_user(watcher.clone()).await.unwrap();

        for instruction in [
            Instruction::clipboard(7, "text/plain"),
            Instruction::blob(7, "aGk="),
            Instruction::end(7),
        ] {
            session
                .handle_instruction(&sender, &instruction)
                .await
                .unwrap();
        }

        assert_eq!(
            watcher.writes(),
            vec![
                Instruction::clipboard(0, "text/plain"),
                Instruction::blob(0, "aGk="),
                Instruction::end(0),
            ]
        );
        assert!(sender_socket
            .writes()
            .contains(&Instruction::ack(7, "OK", ProtocolStatus::Success)));
        // Output stream was released after the relay ended
        assert!(session.output_stream(0).is_none());
    }

    #[tokio::test]
    async fn test_echo_ignores_broken_peer() {
        let session = mirror_session();
        let sender_socket = Arc::new(CaptureSocket::default());
        let broken = Arc::new(CaptureSocket::default());
        let sender = session.add_user(sender_socket.clone()).await.unwrap();
        session.add_user(broken.clone()).await.unwrap();
        broken.close().await;

        let key = Instruction::new("key", ["65", "1"]);
        session.handle_instruction(&sender, &key).await.unwrap();

        assert_eq!(sender_socket.writes(), vec![key]);
    }

    #[tokio::test]
    async fn test_reopened_clipboard_reuses_relay_stream() {
        let session = mirror_session();
        let socket = Arc::new(CaptureSocket::default());
        let sender = session.add_user(socket.clone()).await.unwrap();

        for _ in 0..=session.max_streams() {
            session
                .handle_instruction(&sender, &Instruction::clipboard(0, "text/plain"))
                .await
                .unwrap();
        }

        let refused = Instruction::ack(0, "Unsupported", ProtocolStatus::Unsupported);
        assert!(!socket.writes().contains(&refused));
        assert!(session.output_stream(0).is_some());
        assert!(session.output_stream(1).is_none());
    }

    #[tokio::test]
    async fn test_relay_released_when_sender_leaves() {
        let session = mirror_session();
        let watcher = Arc::new(CaptureSocket::default());
        let sender = session
            .add_user(Arc::new(CaptureSocket::default()))
            .await
            .unwrap();
        session.add_user(watcher.clone()).await.unwrap();

        session
            .handle_instruction(&sender, &Instruction::clipboard(3, "text/plain"))
            .await
            .unwrap();
        assert!(session.output_stream(0).is_some());

        session.remove_user(&sender).await;

        assert!(session.output_stream(0).is_none());
        assert_eq!(
            watcher.writes(),
            vec![Instruction::clipboard(0, "text/plain"), Instruction::end(0)]
        );
    }

    #[tokio::test]
    async fn test_file_streams_are_refused() {
        let session = mirror_session();
        let socket = Arc::new(CaptureSocket::default());
        let user = session.add_user(socket.clone()).await.unwrap();

        session
            .handle_instruction(
                &user,
                &Instruction::new("file", ["2", "application/pdf", "report.pdf"]),
            )
            .await
            .unwrap();

        assert_eq!(
            socket.writes(),
            vec![Instruction::ack(2, "Unsupported", ProtocolStatus::Unsupported)]
        );
    }
}
