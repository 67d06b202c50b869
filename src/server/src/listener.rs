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

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror_ext::AsReport;
use ticksync_codec::FrameCodec;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{ServerError, ServerResult};
use crate::state::SharedState;
use crate::worker;

const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Binds to `(ip, port)`, walking up the port range until a bind
/// succeeds. TCP keeps a closed port unusable for minutes, so a fixed
/// port cannot be relied on across quick restarts.
pub(crate) async fn bind_with_retry(ip: &str, port: u16) -> io::Result<(TcpListener, u16)> {
    let mut port = port;
    loop {
        match TcpListener::bind((ip, port)).await {
            Ok(listener) => {
                // Asking for port 0 lets the OS pick, so report what was
                // actually bound.
                let bound = listener.local_addr()?.port();
                tracing::info!(ip, port = bound, "listening");
                return Ok((listener, bound));
            }
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied
                ) =>
            {
                tracing::debug!(port, "port unavailable, trying the next one");
                port = port.checked_add(1).ok_or(error)?;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Publishes the bound port for drivers that were started without one.
pub(crate) async fn write_port_file(path: &Path, port: u16) -> io::Result<()> {
    tokio::fs::write(path, format!("{port}\n")).await
}

/// Accepts connections until shutdown is requested or the coordinator
/// dies, spawning one worker per socket. Dropping the listener on the way
/// out closes it; in-flight workers are not joined.
///
/// A dead coordinator is a fatal condition: its error is handed back so
/// the binary can exit non-zero. A requested shutdown returns `Ok`.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    state: Arc<SharedState>,
    codec: Arc<FrameCodec>,
    read_timeout: Duration,
    mut shutdown: oneshot::Receiver<()>,
    mut coordinator: JoinHandle<ServerResult<()>>,
) -> ServerResult<()> {
    let mut backoff = MIN_ACCEPT_BACKOFF;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown requested, closing the listener");
                break Ok(());
            }
            result = &mut coordinator => {
                let result = match result {
                    Ok(run_result) => run_result,
                    Err(join_error) => Err(ServerError::Io(io::Error::new(
                        io::ErrorKind::Other,
                        join_error,
                    ))),
                };
                if let Err(error) = &result {
                    tracing::error!(
                        error = %error.as_report(),
                        "coordinator terminated, closing the listener",
                    );
                } else {
                    tracing::error!("coordinator exited, closing the listener");
                }
                break result;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    backoff = MIN_ACCEPT_BACKOFF;
                    let _ = worker::spawn(
                        state.clone(),
                        codec.clone(),
                        stream,
                        peer,
                        read_timeout,
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        error = %error.as_report(),
                        "accept failed, backing off",
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_ACCEPT_BACKOFF);
                }
            },
        }
    }
}
