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

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror_ext::AsReport;
use ticksync_codec::FrameCodec;
use ticksync_common::message::{Envelope, Reply};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::error::{ServerError, ServerResult};
use crate::state::SharedState;

/// Spawns the handler for one accepted connection. Errors terminate only
/// this connection; the stream is owned by the task and closed on every
/// exit path.
pub(crate) fn spawn(
    state: Arc<SharedState>,
    codec: Arc<FrameCodec>,
    stream: TcpStream,
    peer: SocketAddr,
    read_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match handle_connection(state, codec, stream, read_timeout).await {
            Ok(reply) => tracing::debug!(%peer, time = reply.time, "reply sent"),
            Err(error) => {
                tracing::warn!(%peer, error = %error.as_report(), "connection handler failed")
            }
        }
    })
}

/// Serves one client from envelope to reply.
///
/// The registration bump is the only thing `enter_lock` guards: once a
/// worker is counted, the coordinator will not finish a reset without
/// draining it. Between registering and unregistering nothing can fail,
/// so the waiter count cannot leak on error paths.
async fn handle_connection(
    state: Arc<SharedState>,
    codec: Arc<FrameCodec>,
    mut stream: TcpStream,
    read_timeout: Duration,
) -> ServerResult<Reply> {
    let envelope: Envelope = tokio::time::timeout(read_timeout, codec.receive(&mut stream))
        .await
        .map_err(|_| ServerError::ReadTimeout(read_timeout))??;
    tracing::debug!(
        data = ?envelope.data,
        request = ?envelope.request,
        "received envelope",
    );

    {
        let _enter = state.enter_lock.lock().await;
        state.register_waiter();
    }
    state.merge(&envelope.data);

    // Blocks until the coordinator declares the step complete and opens
    // the exit gate.
    let reply = {
        let _exit = state.exit_lock.lock().await;
        let reply = state.reply_for(&envelope.request);
        state.unregister_waiter();
        reply
    };

    codec.send(&mut stream, &reply).await?;
    Ok(reply)
}
