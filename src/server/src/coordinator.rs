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

use std::sync::Arc;
use std::time::Duration;

use thiserror_ext::AsReport;
use ticksync_connector::{Sink, SinkImpl};
use tokio::time::Instant;

use crate::error::{ServerError, ServerResult};
use crate::state::SharedState;

/// The single background task that detects step completeness, runs the
/// reset handshake against the workers and feeds the sink.
///
/// It is the exclusive writer of the step counter and of the variable
/// reset. The sink is moved in whole, so deployments that isolate the
/// coordinator rebuild it from a descriptor first
/// ([`ticksync_connector::build_sink`]).
pub struct Coordinator {
    state: Arc<SharedState>,
    sink: SinkImpl,
    commit_interval: Duration,
}

impl Coordinator {
    pub fn new(state: Arc<SharedState>, sink: SinkImpl, commit_interval: Duration) -> Self {
        Self {
            state,
            sink,
            commit_interval,
        }
    }

    /// Runs until the server shuts down. A schema mismatch is a logic
    /// error and fatal; backend failures on `add`/`commit` only lose the
    /// affected records.
    pub async fn run(mut self) -> ServerResult<()> {
        tracing::info!(sink = ?self.sink.descriptor(), "coordinator started");

        // Hold the exit gate before anything is served: no worker may
        // read a reply until the first step is complete.
        let mut exit_gate = self.state.exit_lock.clone().lock_owned().await;
        let mut last_commit = Instant::now();

        loop {
            if last_commit.elapsed() >= self.commit_interval {
                if let Err(error) = self.sink.commit().await {
                    tracing::warn!(
                        error = %error.as_report(),
                        "sink commit failed, queued records were lost",
                    );
                }
                last_commit = Instant::now();
            }

            if !self.state.is_complete() {
                tokio::time::sleep(self.state.wait_tick()).await;
                continue;
            }

            // Step complete. Stop new registrations, then open the exit
            // gate for the workers of this step.
            let enter_gate = self.state.enter_lock.lock().await;
            drop(exit_gate);

            while self.state.waiters() > 0 {
                tokio::time::sleep(self.state.wait_tick()).await;
            }

            // All registered workers have produced their reply and no new
            // one can register: the step can be sealed.
            let snapshot = self.state.snapshot();
            self.state.reset();

            // The exit gate must close before new workers may register,
            // otherwise a worker of the new step could read a
            // half-assembled state.
            exit_gate = self.state.exit_lock.clone().lock_owned().await;
            drop(enter_gate);

            let time = snapshot.time;
            match self.sink.add(snapshot).await {
                Ok(()) => tracing::info!(time, "step committed"),
                Err(error) if error.is_fatal() => {
                    // No reply may be produced from the abandoned step:
                    // the exit gate stays closed forever.
                    std::mem::forget(exit_gate);
                    return Err(ServerError::Sink(error));
                }
                Err(error) => {
                    tracing::warn!(
                        error = %error.as_report(),
                        time,
                        "sink rejected record",
                    );
                }
            }
        }
    }
}
