//! Recovery of message boundaries from an unframed JSON byte stream.
//!
//! The remote writes bare JSON values with no length prefix or delimiter, so a boundary is
//! found by parsing: bytes accumulate until they form one complete JSON value.

use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::MuxError;

/// Bytes a single frame may occupy before the stream is considered desynchronised.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 8192;

#[derive(Debug)]
pub struct JsonFrameDecoder {
    buffer: Vec<u8>,
    limit: usize,
}

impl Default for JsonFrameDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_FRAME_BYTES)
    }
}

impl JsonFrameDecoder {
    pub fn with_limit(limit: usize) -> Self {
        Self { buffer: Vec::with_capacity(READ_CHUNK), limit }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// `true` when the buffer holds the beginning of a value that has not completed yet.
    pub fn has_partial(&self) -> bool {
        self.buffer.iter().any(|byte| !byte.is_ascii_whitespace())
    }

    /// Pops the next complete value, or `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<JsonValue>, MuxError> {
        let start = self.buffer.iter().position(|byte| !byte.is_ascii_whitespace());
        let Some(start) = start else {
            self.buffer.clear();
            return Ok(None);
        };
        self.buffer.drain(..start);

        let mut values = serde_json::Deserializer::from_slice(&self.buffer).into_iter::<JsonValue>();
        match values.next() {
            Some(Ok(value)) => {
                let consumed = values.byte_offset();
                self.buffer.drain(..consumed);
                Ok(Some(value))
            }
            Some(Err(err)) if err.is_eof() => {
                if self.buffer.len() > self.limit {
                    return Err(MuxError::protocol(format!(
                        "frame exceeds {} bytes without completing",
                        self.limit
                    )));
                }
                Ok(None)
            }
            Some(Err(err)) => Err(MuxError::protocol(format!("malformed frame: {err}"))),
            None => {
                self.buffer.clear();
                Ok(None)
            }
        }
    }
}

/// Reads whole JSON frames from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
    decoder: JsonFrameDecoder,
    frame_timeout: Duration,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, frame_timeout: Duration) -> Self {
        Self {
            reader,
            decoder: JsonFrameDecoder::default(),
            frame_timeout,
            chunk: vec![0; READ_CHUNK],
        }
    }

    /// Waits for the next complete frame.
    ///
    /// End of stream is a [`MuxError::Connection`], whether or not a frame was in progress.
    /// A read that waits longer than the frame timeout while a frame is in progress is a
    /// [`MuxError::Protocol`]; the timer restarts with every chunk received.
    pub async fn next_frame(&mut self) -> Result<JsonValue, MuxError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(frame);
            }

            let read = self.reader.read(&mut self.chunk);
            let read = if self.decoder.has_partial() {
                match tokio::time::timeout(self.frame_timeout, read).await {
                    Ok(read) => read,
                    Err(_) => return Err(MuxError::protocol("incomplete message")),
                }
            } else {
                read.await
            };
            let count = read?;
            if count == 0 {
                return Err(if self.decoder.has_partial() {
                    MuxError::connection("connection closed before a complete message was received")
                } else {
                    MuxError::connection("connection closed by remote")
                });
            }
            self.decoder.push(&self.chunk[..count]);
        }
    }
}
