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

use async_trait::async_trait;
use parking_lot::Mutex;
use ticksync_common::catalog::StateSchema;
use ticksync_common::snapshot::Snapshot;

use super::{check_record, Result, Sink, SinkDescriptor};

/// Keeps added records in memory, in `add` order. Backs the coordination
/// tests, which assert on the exact records a run produced.
#[derive(Debug)]
pub struct MemorySink {
    schema: StateSchema,
    records: Arc<Mutex<Vec<Snapshot>>>,
}

impl MemorySink {
    pub fn new(schema: StateSchema) -> Self {
        Self {
            schema,
            records: Arc::default(),
        }
    }

    /// Handle to the record log; stays valid after the sink moves into
    /// the coordinator.
    pub fn records(&self) -> Arc<Mutex<Vec<Snapshot>>> {
        Arc::clone(&self.records)
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn schema(&self) -> &StateSchema {
        &self.schema
    }

    async fn add(&mut self, snapshot: Snapshot) -> Result<()> {
        check_record(&self.schema, &snapshot)?;
        self.records.lock().push(snapshot);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn descriptor(&self) -> SinkDescriptor {
        SinkDescriptor::Memory {
            columns: self.schema.columns().map(str::to_owned).collect(),
        }
    }
}
