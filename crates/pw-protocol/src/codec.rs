//! Tokio codec for text instructions
//!
//! Wire grammar: each element is `LENGTH.VALUE`, elements are separated by
//! `,` and the instruction is terminated by `;`. The first element is the
//! opcode. LENGTH is a decimal count of Unicode scalar values, not bytes:
//!
//! ```text
//! 6.select,3.vnc;
//! 4.blob,1.0,4.héllo;
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::instruction::Instruction;

/// Maximum encoded size of a single inbound instruction, in bytes
pub const MAX_INSTRUCTION_LENGTH: usize = 8192;

/// Maximum number of elements (opcode included) in one instruction
pub const MAX_ELEMENTS: usize = 64;

/// Codec for encoding/decoding protocol instructions
#[derive(Debug, Default, Clone, Copy)]
pub struct InstructionCodec;

impl InstructionCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }
}

/// Width of a UTF-8 sequence from its leading byte
fn utf8_width(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

/// Scan one complete instruction from the front of `src`.
///
/// Returns the elements and the number of bytes they occupy, or `None` if
/// the buffer ends before the terminating `;`.
fn scan(src: &[u8]) -> Result<Option<(Vec<String>, usize)>, ProtocolError> {
    let mut pos = 0;
    let mut elements = Vec::new();

    loop {
        let rest = &src[pos..];
        let Some(dot) = rest.iter().position(|&b| b == b'.') else {
            // Reject garbage early instead of waiting for a '.' that never comes
            if !rest.iter().all(u8::is_ascii_digit) {
                return Err(ProtocolError::InvalidLength(
                    String::from_utf8_lossy(rest).into_owned(),
                ));
            }
            return Ok(None);
        };

        let digits = &rest[..dot];
        let length = std::str::from_utf8(digits)
            .ok()
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|d| d.parse::<usize>().ok())
            .ok_or_else(|| {
                ProtocolError::InvalidLength(String::from_utf8_lossy(digits).into_owned())
            })?;

        let value_start = pos + dot + 1;
        let mut end = value_start;
        for _ in 0..length {
            let Some(&lead) = src.get(end) else {
                return Ok(None);
            };
            end += utf8_width(lead).ok_or(ProtocolError::InvalidUtf8)?;
        }

        let Some(&terminator) = src.get(end) else {
            return Ok(None);
        };

        let value =
            std::str::from_utf8(&src[value_start..end]).map_err(|_| ProtocolError::InvalidUtf8)?;
        elements.push(value.to_owned());
        if elements.len() > MAX_ELEMENTS {
            return Err(ProtocolError::TooManyElements { max: MAX_ELEMENTS });
        }

        pos = end + 1;
        match terminator {
            b',' => continue,
            b';' => return Ok(Some((elements, pos))),
            other => return Err(ProtocolError::InvalidTerminator(other as char)),
        }
    }
}

impl Decoder for InstructionCodec {
    type Item = Instruction;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let Some((mut elements, consumed)) = scan(src)? else {
            if src.len() > MAX_INSTRUCTION_LENGTH {
                return Err(ProtocolError::TooLong {
                    size: src.len(),
                    max: MAX_INSTRUCTION_LENGTH,
                });
            }
            return Ok(None);
        };

        if consumed > MAX_INSTRUCTION_LENGTH {
            return Err(ProtocolError::TooLong {
                size: consumed,
                max: MAX_INSTRUCTION_LENGTH,
            });
        }
        src.advance(consumed);

        let opcode = elements.remove(0);
        if opcode.is_empty() {
            return Err(ProtocolError::Empty);
        }

        Ok(Some(Instruction {
            opcode,
            args: elements,
        }))
    }
}

impl Encoder<Instruction> for InstructionCodec {
    type Error = ProtocolError;

    fn encode(&mut self, instruction: Instruction, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if instruction.opcode.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let elements = std::iter::once(&instruction.opcode).chain(instruction.args.iter());
        for (i, element) in elements.enumerate() {
            if i > 0 {
                dst.put_u8(b',');
            }
            dst.extend_from_slice(element.chars().count().to_string().as_bytes());
            dst.put_u8(b'.');
            dst.extend_from_slice(element.as_bytes());
        }
        dst.put_u8(b';');

        Ok(())
    }
}
