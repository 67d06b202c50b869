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

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use ticksync_common::catalog::StateSchema;
use ticksync_common::message::Reply;
use ticksync_common::snapshot::Snapshot;
use tokio::sync::Mutex;

/// The step state every worker and the coordinator share.
///
/// Variable writes take no lock beyond the map's own: clients write
/// disjoint keys by convention, and overlapping writes are
/// last-write-wins. What the two mutexes guard is the step boundary:
///
/// * `enter_lock` makes a worker's registration visible to the
///   coordinator before the coordinator may reset the step;
/// * `exit_lock` is held by the coordinator from startup and between
///   steps, so no reply can observe a partially assembled state.
pub struct SharedState {
    schema: StateSchema,
    vars: RwLock<HashMap<String, Option<f64>>>,
    /// Step counter; only the coordinator advances it.
    time: AtomicU64,
    /// Workers registered for the current step that have not produced
    /// their reply yet.
    waiters: AtomicUsize,
    pub(crate) enter_lock: Mutex<()>,
    pub(crate) exit_lock: Arc<Mutex<()>>,
    wait_tick: Duration,
}

impl SharedState {
    pub fn new(schema: StateSchema, wait_tick: Duration) -> Self {
        let vars = schema
            .columns()
            .map(|name| (name.to_owned(), None))
            .collect();
        Self {
            schema,
            vars: RwLock::new(vars),
            time: AtomicU64::new(1),
            waiters: AtomicUsize::new(0),
            enter_lock: Mutex::new(()),
            exit_lock: Arc::new(Mutex::new(())),
            wait_tick,
        }
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn time(&self) -> u64 {
        self.time.load(Ordering::SeqCst)
    }

    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    /// Must only be called with `enter_lock` held.
    pub(crate) fn register_waiter(&self) {
        self.waiters.fetch_add(1, Ordering::SeqCst);
    }

    /// Must only be called with `exit_lock` held, after the reply was
    /// built.
    pub(crate) fn unregister_waiter(&self) {
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }

    /// Merges a client's partial results. Names outside the schema are
    /// dropped; repeated assignments within a step are last-write-wins.
    pub fn merge(&self, data: &HashMap<String, f64>) {
        let mut vars = self.vars.write();
        for (name, value) in data {
            if let Some(slot) = vars.get_mut(name) {
                *slot = Some(*value);
            }
        }
    }

    /// Whether every variable of the current step has been assigned.
    pub fn is_complete(&self) -> bool {
        self.vars.read().values().all(Option::is_some)
    }

    /// Captures the current step. Meaningful only once the step is
    /// complete and all waiters have drained.
    pub fn snapshot(&self) -> Snapshot {
        let vars = self.vars.read();
        debug_assert!(vars.values().all(Option::is_some));
        Snapshot {
            time: self.time(),
            values: vars
                .iter()
                .filter_map(|(name, value)| value.map(|v| (name.clone(), v)))
                .collect(),
        }
    }

    /// Clears every variable and advances the step counter. Coordinator
    /// only, inside its reset window.
    pub fn reset(&self) {
        let mut vars = self.vars.write();
        for value in vars.values_mut() {
            *value = None;
        }
        self.time.fetch_add(1, Ordering::SeqCst);
    }

    /// Builds the reply for a request against the current step. Requested
    /// names that are unknown or unassigned are omitted.
    pub fn reply_for(&self, request: &[String]) -> Reply {
        let vars = self.vars.read();
        let values = request
            .iter()
            .filter_map(|name| {
                vars.get(name)
                    .and_then(|value| value.map(|v| (name.clone(), v)))
            })
            .collect();
        Reply {
            values,
            time: self.time(),
        }
    }

    pub fn wait_tick(&self) -> Duration {
        self.wait_tick
    }
}
