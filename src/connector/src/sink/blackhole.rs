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

use async_trait::async_trait;
use ticksync_common::catalog::StateSchema;
use ticksync_common::snapshot::Snapshot;

use super::{check_record, Result, Sink, SinkDescriptor};

/// A sink that drops everything. Chosen automatically when the real
/// backend is unavailable; also handy for driving clients without a
/// database.
#[derive(Debug)]
pub struct BlackHoleSink {
    schema: StateSchema,
}

impl BlackHoleSink {
    pub fn new(schema: StateSchema) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl Sink for BlackHoleSink {
    fn schema(&self) -> &StateSchema {
        &self.schema
    }

    async fn add(&mut self, snapshot: Snapshot) -> Result<()> {
        check_record(&self.schema, &snapshot)?;
        tracing::debug!(time = snapshot.time, "dropping record");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn descriptor(&self) -> SinkDescriptor {
        SinkDescriptor::BlackHole {
            columns: self.schema.columns().map(str::to_owned).collect(),
        }
    }
}
