//! Built-in instruction handlers
//!
//! Instructions from users are matched by exact opcode against an ordered
//! table. Anything without an entry is ignored.

use futures::future::BoxFuture;
use std::str::FromStr;

use pw_protocol::{Instruction, ProtocolStatus};

use crate::error::SessionError;

use super::user::User;
use super::ClientSession;

type HandlerFuture<'a> = BoxFuture<'a, Result<(), SessionError>>;

/// Signature shared by every built-in handler
pub(crate) type InstructionHandler =
    for<'a> fn(&'a ClientSession, &'a User, &'a Instruction) -> HandlerFuture<'a>;

static HANDLERS: &[(&str, InstructionHandler)] = &[
    ("sync", handle_sync),
    ("mouse", handle_input),
    ("key", handle_input),
    ("clipboard", handle_stream_open),
    ("file", handle_stream_open),
    ("pipe", handle_stream_open),
    ("ack", handle_ack),
    ("blob", handle_blob),
    ("end", handle_end),
    ("size", handle_input),
    ("disconnect", handle_disconnect),
];

/// First handler registered for `opcode`
pub(crate) fn lookup(opcode: &str) -> Option<InstructionHandler> {
    HANDLERS
        .iter()
        .find(|(name, _)| *name == opcode)
        .map(|(_, handler)| *handler)
}

/// Parse a required argument
fn arg<T: FromStr>(instruction: &Instruction, index: usize) -> Result<T, SessionError> {
    instruction
        .arg(index)
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| SessionError::BadArguments(instruction.opcode.clone()))
}

fn handle_sync<'a>(
    _session: &'a ClientSession,
    user: &'a User,
    instruction: &'a Instruction,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let timestamp: u64 = arg(instruction, 0)?;
        user.record_sync(timestamp);
        Ok(())
    })
}

fn handle_input<'a>(
    session: &'a ClientSession,
    user: &'a User,
    instruction: &'a Instruction,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        session
            .handler()
            .on_instruction(session, user, instruction)
            .await
    })
}

fn handle_stream_open<'a>(
    session: &'a ClientSession,
    user: &'a User,
    instruction: &'a Instruction,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let index: u32 = arg(instruction, 0)?;
        if index as usize >= session.max_streams() {
            return Err(SessionError::InvalidHandle {
                kind: "stream",
                index: index.into(),
            });
        }

        // Reopening an index implicitly ends the stream already there
        if let Err(e) = session.end_input_stream(user, index).await {
            tracing::warn!(
                "Ending replaced stream {} of user {} failed: {}",
                index,
                user.id(),
                e
            );
        }

        match session
            .handler()
            .on_stream_open(session, user, index, instruction)
            .await
        {
            Some(handler) => user.open_input_stream(index, handler),
            None => {
                user.socket()
                    .send(&Instruction::ack(
                        index,
                        "Unsupported",
                        ProtocolStatus::Unsupported,
                    ))
                    .await?;
                Ok(())
            }
        }
    })
}

fn handle_ack<'a>(
    session: &'a ClientSession,
    user: &'a User,
    instruction: &'a Instruction,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let index: u32 = arg(instruction, 0)?;
        let message = instruction
            .arg(1)
            .ok_or_else(|| SessionError::BadArguments(instruction.opcode.clone()))?;
        let status = ProtocolStatus::from_code(arg(instruction, 2)?)
            .ok_or_else(|| SessionError::BadArguments(instruction.opcode.clone()))?;

        let Some(stream) = session.output_stream(index) else {
            return Ok(());
        };
        stream
            .handler()
            .on_ack(session, user, index, message, status)
            .await
    })
}

fn handle_blob<'a>(
    session: &'a ClientSession,
    user: &'a User,
    instruction: &'a Instruction,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let index: u32 = arg(instruction, 0)?;
        let data = instruction
            .arg(1)
            .ok_or_else(|| SessionError::BadArguments(instruction.opcode.clone()))?;

        let Some(stream) = user.input_stream(index) else {
            return Ok(());
        };
        stream.handler().on_blob(session, user, index, data).await
    })
}

fn handle_end<'a>(
    session: &'a ClientSession,
    user: &'a User,
    instruction: &'a Instruction,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let index: u32 = arg(instruction, 0)?;

        let Some(stream) = user.input_stream(index) else {
            return Ok(());
        };
        let result = stream.handler().on_end(session, user, index).await;
        user.close_input_stream(index);
        result
    })
}

fn handle_disconnect<'a>(
    _session: &'a ClientSession,
    user: &'a User,
    _instruction: &'a Instruction,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        user.stop();
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        for opcode in [
            "sync",
            "mouse",
            "key",
            "clipboard",
            "file",
            "pipe",
            "ack",
            "blob",
            "end",
            "size",
            "disconnect",
        ] {
            assert!(lookup(opcode).is_some(), "missing handler for {}", opcode);
        }
        assert!(lookup("nest").is_none());
        assert!(lookup("SYNC").is_none());
        assert!(lookup("").is_none());
    }
}
