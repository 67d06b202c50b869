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

//! Sentinel-terminated JSON framing with an application-level ack, the
//! one wire format every ticksync peer speaks.

mod frame;

pub use frame::{FrameCodec, DEFAULT_ACK, DEFAULT_CHUNK_SIZE, DEFAULT_SENTINEL};

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors of one framed exchange. All of them abort the exchange.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON payload")]
    Json(#[from] serde_json::Error),

    #[error("peer closed the stream mid-frame after {received} bytes")]
    Truncated { received: usize },

    #[error("bad confirmation byte: expected {expected:#04x}, got {got:#04x}")]
    BadAck { expected: u8, got: u8 },

    #[error("serialized payload contains the frame sentinel")]
    SentinelInPayload,
}
