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

//! The tick-synchronized state exchange server.
//!
//! Clients contribute partial variable assignments for the current step
//! and request variables back; the server releases replies only once the
//! step is complete, persists a snapshot and advances the logical clock.
//! See [`serve`] for the entry point.

mod coordinator;
mod error;
mod listener;
mod state;
mod worker;

use std::net::SocketAddr;
use std::sync::Arc;

use ticksync_codec::FrameCodec;
use ticksync_common::config::CoordinationConfig;
use ticksync_connector::{Sink, SinkImpl};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub use crate::coordinator::Coordinator;
pub use crate::error::{ServerError, ServerResult};
pub use crate::state::SharedState;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub ip: String,
    /// First TCP port to try; incremented until a bind succeeds.
    pub port: u16,
    pub coordination: CoordinationConfig,
}

/// Bootstraps the server: shared state sized by the sink's schema, the
/// coordinator task, and the listener. Returns the bound address, the
/// listener's join handle and a shutdown sender.
///
/// The handle resolves to `Ok` after a requested shutdown and to the
/// coordinator's error when a fatal sink failure killed it, so the binary
/// can exit non-zero in that case.
///
/// The caller builds the sink first (usually via
/// [`ticksync_connector::build_sink_with_fallback`]); it moves into the
/// coordinator's task here.
pub async fn serve(
    config: ServerConfig,
    sink: SinkImpl,
) -> ServerResult<(SocketAddr, JoinHandle<ServerResult<()>>, oneshot::Sender<()>)> {
    let schema = sink.schema().clone();
    let state = Arc::new(SharedState::new(schema, config.coordination.wait_tick));

    let (listener, port) = listener::bind_with_retry(&config.ip, config.port).await?;
    let local_addr = listener.local_addr()?;
    if let Some(path) = &config.coordination.port_file {
        listener::write_port_file(path, port).await?;
    }

    let coordinator = Coordinator::new(
        state.clone(),
        sink,
        config.coordination.commit_interval,
    );
    let coordinator_handle = tokio::spawn(coordinator.run());

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let codec = Arc::new(FrameCodec::default());
    let read_timeout = config.coordination.read_timeout;
    let join_handle = tokio::spawn(listener::accept_loop(
        listener,
        state,
        codec,
        read_timeout,
        shutdown_rx,
        coordinator_handle,
    ));

    Ok((local_addr, join_handle, shutdown_tx))
}
