//! Newline framing for the shelf wire protocol.
//!
//! One frame is one Message: UTF-8 text terminated by `\n`. The decoder
//! yields the raw line *including* its terminator; callers trim as needed.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ShelfError;

/// Default cap on a single incoming line (16 MiB). Whole-file `GET`
/// payloads travel as one line, so the cap is generous.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// `tokio_util` codec turning a byte stream into newline-terminated lines.
#[derive(Debug, Clone)]
pub struct ShelfCodec {
    max_length: usize,
    /// How far into the buffer we already scanned for `\n`.
    next_index: usize,
}

impl ShelfCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for ShelfCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ShelfCodec {
    type Item = String;
    type Error = ShelfError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

        match newline {
            Some(offset) => {
                let end = self.next_index + offset + 1;
                self.next_index = 0;
                if end > self.max_length {
                    return Err(ShelfError::LineTooLong {
                        max: self.max_length,
                    });
                }
                let line = src.split_to(end);
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None => {
                if src.len() > self.max_length {
                    return Err(ShelfError::LineTooLong {
                        max: self.max_length,
                    });
                }
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            // A partial line at end-of-stream is a truncated message.
            None => {
                src.clear();
                self.next_index = 0;
                Err(ShelfError::Closed)
            }
        }
    }
}

impl<T: AsRef<str>> Encoder<T> for ShelfCodec {
    type Error = ShelfError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let text = item.as_ref();
        dst.reserve(text.len() + 1);
        dst.put_slice(text.as_bytes());
        if !text.ends_with('\n') {
            dst.put_u8(b'\n');
        }
        Ok(())
    }
}
