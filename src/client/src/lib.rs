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

//! Client side of the tick-synchronized state exchange: send one
//! envelope, receive one reply.

use std::collections::HashMap;

use ticksync_codec::{FrameCodec, ProtocolError};
use ticksync_common::message::{Envelope, Reply};
use tokio::net::TcpStream;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to the server")]
    Connect(#[source] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// A client of one exchange server. Each [`exchange`](Client::exchange)
/// opens a fresh connection; there is no state to carry between
/// exchanges, and it measures no worse than keeping one open.
#[derive(Debug, Clone)]
pub struct Client {
    host: String,
    port: u16,
    codec: FrameCodec,
}

impl Client {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_codec(host, port, FrameCodec::default())
    }

    pub fn with_codec(host: impl Into<String>, port: u16, codec: FrameCodec) -> Self {
        Self {
            host: host.into(),
            port,
            codec,
        }
    }

    /// Contributes `data` to the current step and returns the requested
    /// variables of the step it landed in. Blocks until the server has
    /// gathered the complete step.
    ///
    /// The socket is closed on every path, success or error.
    pub async fn exchange(
        &self,
        data: HashMap<String, f64>,
        request: Vec<String>,
    ) -> ClientResult<Reply> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(ClientError::Connect)?;
        tracing::debug!(host = %self.host, port = self.port, "connected");

        let envelope = Envelope { data, request };
        self.codec.send(&mut stream, &envelope).await?;
        let reply: Reply = self.codec.receive(&mut stream).await?;
        tracing::debug!(time = reply.time, "exchange finished");
        Ok(reply)
    }
}
