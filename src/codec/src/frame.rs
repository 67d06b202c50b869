// Copyright 2025 Ticksync Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{ProtocolError, Result};

/// End-of-message sentinel, `U+0142`, bytes `0xC5 0x82` on the wire.
pub const DEFAULT_SENTINEL: &str = "ł";

/// Confirmation byte written by the receiver after a successful parse.
pub const DEFAULT_ACK: u8 = 0x79; // 'y'

/// Read chunk size. Small on purpose; the receiver must work no matter
/// where the chunk boundaries fall.
pub const DEFAULT_CHUNK_SIZE: usize = 16;

/// Carries one JSON value per exchange over a byte stream.
///
/// A frame is the UTF-8 JSON serialization of the value followed by the
/// sentinel. The receiver strips the sentinel, parses, and confirms with a
/// single ack byte that the sender waits for.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    sentinel: String,
    ack: u8,
    chunk_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL, DEFAULT_ACK, DEFAULT_CHUNK_SIZE)
    }
}

impl FrameCodec {
    pub fn new(sentinel: impl Into<String>, ack: u8, chunk_size: usize) -> Self {
        let sentinel = sentinel.into();
        assert!(!sentinel.is_empty(), "sentinel must not be empty");
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            sentinel,
            ack,
            chunk_size,
        }
    }

    /// Writes one framed value and waits for the receiver's ack byte.
    ///
    /// Values whose serialization contains the sentinel cannot be framed
    /// and are rejected before anything is written.
    pub async fn send<S, T>(&self, conn: &mut S, value: &T) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_string(value)?;
        if payload.contains(&self.sentinel) {
            return Err(ProtocolError::SentinelInPayload);
        }

        let mut frame = Vec::with_capacity(payload.len() + self.sentinel.len());
        frame.extend_from_slice(payload.as_bytes());
        frame.extend_from_slice(self.sentinel.as_bytes());
        conn.write_all(&frame).await?;
        conn.flush().await?;

        let mut ack = [0u8; 1];
        conn.read_exact(&mut ack).await?;
        if ack[0] != self.ack {
            return Err(ProtocolError::BadAck {
                expected: self.ack,
                got: ack[0],
            });
        }
        Ok(())
    }

    /// Reads until the frame sentinel, parses the payload and confirms
    /// with the ack byte.
    ///
    /// The tail comparison works on raw bytes, so a sentinel (or any
    /// multi-byte UTF-8 sequence) split across two reads simply waits for
    /// the remaining bytes.
    pub async fn receive<S, T>(&self, conn: &mut S) -> Result<T>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        T: DeserializeOwned,
    {
        let sentinel = self.sentinel.as_bytes();
        let mut message = BytesMut::new();
        let mut chunk = vec![0u8; self.chunk_size];
        loop {
            let n = conn.read(&mut chunk).await?;
            if n == 0 {
                return Err(ProtocolError::Truncated {
                    received: message.len(),
                });
            }
            message.extend_from_slice(&chunk[..n]);
            if message.ends_with(sentinel) {
                break;
            }
        }

        message.truncate(message.len() - sentinel.len());
        let value = serde_json::from_slice(&message)?;
        conn.write_all(&[self.ack]).await?;
        conn.flush().await?;
        Ok(value)
    }
}
