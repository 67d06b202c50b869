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

pub mod blackhole;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use thiserror_ext::AsReport;
use ticksync_common::catalog::StateSchema;
use ticksync_common::error::ConfigError;
use ticksync_common::snapshot::Snapshot;

use self::blackhole::BlackHoleSink;
use self::memory::MemorySink;
use self::postgres::{PostgresConfig, PostgresSink};

pub type Result<T> = std::result::Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Postgres error")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("invalid sink schema")]
    InvalidSchema(#[from] ConfigError),

    #[error("record does not match sink schema at column `{column}`")]
    SchemaMismatch { column: String },
}

impl SinkError {
    /// Schema mismatches are logic errors and fatal to the coordinator;
    /// everything else only loses the affected records.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SinkError::SchemaMismatch { .. })
    }
}

/// A buffered writer for committed step records.
///
/// `add` only enqueues; nothing is durable until `commit`. Records must
/// carry exactly the declared variable set, with the step counter kept in
/// the snapshot's own `time` field.
#[async_trait]
pub trait Sink: Send {
    /// The variable names this sink stores, excluding the reserved step
    /// counter (which it also stores).
    fn schema(&self) -> &StateSchema;

    /// Enqueue one committed step.
    async fn add(&mut self, snapshot: Snapshot) -> Result<()>;

    /// Persist everything enqueued since the last commit.
    async fn commit(&mut self) -> Result<()>;

    /// A plain-data description sufficient to rebuild an equivalent sink
    /// in another execution context, see [`build_sink`].
    fn descriptor(&self) -> SinkDescriptor;
}

/// Serializable recipe for reconstructing a sink. The coordinator runs in
/// its own task and deployments may move it into its own process; handing
/// it a descriptor instead of a live connection keeps that boundary plain
/// data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkDescriptor {
    Postgres(PostgresConfig),
    BlackHole { columns: Vec<String> },
    Memory { columns: Vec<String> },
}

impl SinkDescriptor {
    /// The variable set the described sink would declare.
    pub fn schema(&self) -> Result<StateSchema> {
        let columns = match self {
            SinkDescriptor::Postgres(config) => &config.columns,
            SinkDescriptor::BlackHole { columns } => columns,
            SinkDescriptor::Memory { columns } => columns,
        };
        Ok(StateSchema::new(columns.clone())?)
    }
}

/// All sink variants, statically dispatched.
#[derive(Debug)]
pub enum SinkImpl {
    Postgres(PostgresSink),
    BlackHole(BlackHoleSink),
    Memory(MemorySink),
}

#[async_trait]
impl Sink for SinkImpl {
    fn schema(&self) -> &StateSchema {
        match self {
            SinkImpl::Postgres(sink) => sink.schema(),
            SinkImpl::BlackHole(sink) => sink.schema(),
            SinkImpl::Memory(sink) => sink.schema(),
        }
    }

    async fn add(&mut self, snapshot: Snapshot) -> Result<()> {
        match self {
            SinkImpl::Postgres(sink) => sink.add(snapshot).await,
            SinkImpl::BlackHole(sink) => sink.add(snapshot).await,
            SinkImpl::Memory(sink) => sink.add(snapshot).await,
        }
    }

    async fn commit(&mut self) -> Result<()> {
        match self {
            SinkImpl::Postgres(sink) => sink.commit().await,
            SinkImpl::BlackHole(sink) => sink.commit().await,
            SinkImpl::Memory(sink) => sink.commit().await,
        }
    }

    fn descriptor(&self) -> SinkDescriptor {
        match self {
            SinkImpl::Postgres(sink) => sink.descriptor(),
            SinkImpl::BlackHole(sink) => sink.descriptor(),
            SinkImpl::Memory(sink) => sink.descriptor(),
        }
    }
}

/// Rebuilds a sink from its descriptor.
pub async fn build_sink(descriptor: SinkDescriptor) -> Result<SinkImpl> {
    match descriptor {
        SinkDescriptor::Postgres(config) => {
            Ok(SinkImpl::Postgres(PostgresSink::connect(config).await?))
        }
        SinkDescriptor::BlackHole { columns } => Ok(SinkImpl::BlackHole(BlackHoleSink::new(
            StateSchema::new(columns)?,
        ))),
        SinkDescriptor::Memory { columns } => {
            Ok(SinkImpl::Memory(MemorySink::new(StateSchema::new(columns)?)))
        }
    }
}

/// Like [`build_sink`], but an unreachable backend degrades to the black
/// hole sink instead of failing. Only an invalid schema is an error, since
/// then no fallback can exist either.
pub async fn build_sink_with_fallback(descriptor: SinkDescriptor) -> Result<SinkImpl> {
    let schema = descriptor.schema()?;
    match build_sink(descriptor).await {
        Ok(sink) => Ok(sink),
        Err(error) => {
            tracing::error!(
                error = %error.as_report(),
                "sink backend unavailable, falling back to the black hole sink; \
                 records of this run will be DROPPED",
            );
            Ok(SinkImpl::BlackHole(BlackHoleSink::new(schema)))
        }
    }
}

/// Shared `add`-side validation: the record's variable set must match the
/// schema exactly.
pub(crate) fn check_record(schema: &StateSchema, snapshot: &Snapshot) -> Result<()> {
    for column in snapshot.values.keys() {
        if !schema.contains(column) {
            return Err(SinkError::SchemaMismatch {
                column: column.clone(),
            });
        }
    }
    for column in schema.columns() {
        if !snapshot.values.contains_key(column) {
            return Err(SinkError::SchemaMismatch {
                column: column.to_owned(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn snapshot(time: u64, pairs: &[(&str, f64)]) -> Snapshot {
        Snapshot {
            time,
            values: pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect(),
        }
    }

    #[test]
    fn descriptor_serde_round_trip() {
        let descriptor = SinkDescriptor::Postgres(PostgresConfig {
            host: "db.example".to_owned(),
            port: 5432,
            user: "luki".to_owned(),
            password: "secret".to_owned(),
            database: "luki_testing".to_owned(),
            table: "simulation_states".to_owned(),
            columns: vec!["Tzm".to_owned(), "Fzm".to_owned()],
        });
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(json.contains(r#""kind":"postgres""#));

        let back: SinkDescriptor = serde_json::from_str(&json).unwrap();
        let schema = back.schema().unwrap();
        assert_eq!(schema.columns().collect::<Vec<_>>(), vec!["Tzm", "Fzm"]);
    }

    #[test]
    fn descriptor_debug_redacts_password() {
        let descriptor = SinkDescriptor::Postgres(PostgresConfig {
            host: "db.example".to_owned(),
            port: 5432,
            user: "luki".to_owned(),
            password: "hunter2".to_owned(),
            database: "luki_testing".to_owned(),
            table: "simulation_states".to_owned(),
            columns: vec!["Tzm".to_owned()],
        });
        let rendered = format!("{descriptor:?}");
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn unreachable_backend_falls_back_to_black_hole() {
        let descriptor = SinkDescriptor::Postgres(PostgresConfig {
            // Nothing listens on the discard port.
            host: "127.0.0.1".to_owned(),
            port: 9,
            user: "luki".to_owned(),
            password: "luki".to_owned(),
            database: "luki_testing".to_owned(),
            table: "simulation_states".to_owned(),
            columns: vec!["a".to_owned()],
        });
        let sink = build_sink_with_fallback(descriptor).await.unwrap();
        assert!(matches!(sink, SinkImpl::BlackHole(_)));
    }

    #[tokio::test]
    async fn invalid_schema_has_no_fallback() {
        let descriptor = SinkDescriptor::BlackHole {
            columns: vec!["a".to_owned(), "a".to_owned()],
        };
        assert!(build_sink_with_fallback(descriptor).await.is_err());
    }

    #[tokio::test]
    async fn memory_sink_keeps_records_in_order() {
        let mut sink = build_sink(SinkDescriptor::Memory {
            columns: vec!["a".to_owned(), "b".to_owned()],
        })
        .await
        .unwrap();
        let SinkImpl::Memory(ref memory) = sink else {
            panic!("expected the memory sink");
        };
        let records = memory.records();

        sink.add(snapshot(1, &[("a", 1.0), ("b", 2.0)])).await.unwrap();
        sink.add(snapshot(2, &[("a", 3.0), ("b", 4.0)])).await.unwrap();
        sink.commit().await.unwrap();

        let records = records.lock();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].time, 1);
        assert_eq!(records[1].time, 2);
    }

    #[tokio::test]
    async fn add_rejects_mismatched_records() {
        let schema = StateSchema::new(["a", "b"]).unwrap();
        let mut sink = MemorySink::new(schema);

        let unknown = sink.add(snapshot(1, &[("a", 1.0), ("z", 2.0)])).await;
        assert!(matches!(
            &unknown,
            Err(SinkError::SchemaMismatch { column }) if column == "z"
        ));
        assert!(unknown.unwrap_err().is_fatal());

        let missing = sink.add(snapshot(1, &[("a", 1.0)])).await;
        assert!(matches!(
            missing,
            Err(SinkError::SchemaMismatch { ref column }) if column == "b"
        ));

        let values: HashMap<String, f64> =
            [("a".to_owned(), 1.0), ("b".to_owned(), 2.0)].into();
        sink.add(Snapshot { time: 1, values }).await.unwrap();
    }
}
