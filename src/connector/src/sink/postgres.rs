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

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror_ext::AsReport;
use ticksync_common::catalog::{StateSchema, TIME_COLUMN};
use ticksync_common::snapshot::Snapshot;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Statement};

use super::{check_record, Result, Sink, SinkDescriptor};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection parameters for the Postgres-backed sink. Everything the
/// descriptor needs to rebuild the sink elsewhere.
#[derive(Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_table")]
    pub table: String,
    pub columns: Vec<String>,
}

fn default_port() -> u16 {
    5432
}

fn default_table() -> String {
    "simulation_states".to_owned()
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .finish()
    }
}

/// Buffers one row per committed step and writes the buffer to Postgres
/// inside a single transaction on `commit`.
pub struct PostgresSink {
    schema: StateSchema,
    config: PostgresConfig,
    client: Client,
    insert: Statement,
    /// Rows pending the next commit: `time` plus the values in schema
    /// column order.
    buffer: Vec<(i64, Vec<f64>)>,
    connection: JoinHandle<()>,
}

impl fmt::Debug for PostgresSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSink")
            .field("config", &self.config)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl PostgresSink {
    /// Connects and recreates the state table. A server run owns its
    /// history, so any table left over from a previous run is dropped.
    pub async fn connect(config: PostgresConfig) -> Result<Self> {
        let schema = StateSchema::new(config.columns.clone())?;

        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .user(&config.user)
            .password(&config.password)
            .dbname(&config.database)
            .connect_timeout(CONNECT_TIMEOUT);
        let (client, connection) = pg.connect(NoTls).await?;
        let connection = tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::warn!(error = %error.as_report(), "postgres connection terminated");
            }
        });

        let table = quote_ident(&config.table);
        client
            .batch_execute(&format!("DROP TABLE IF EXISTS {table}"))
            .await?;
        let column_defs = schema
            .columns()
            .map(|c| format!("{} DOUBLE PRECISION", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        client
            .batch_execute(&format!(
                "CREATE TABLE {table} ({} BIGINT PRIMARY KEY, {column_defs})",
                quote_ident(TIME_COLUMN),
            ))
            .await?;

        let column_list = std::iter::once(TIME_COLUMN)
            .chain(schema.columns())
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=schema.len() + 1)
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = client
            .prepare(&format!(
                "INSERT INTO {table} ({column_list}) VALUES ({placeholders})"
            ))
            .await?;

        tracing::info!(
            host = %config.host,
            database = %config.database,
            table = %config.table,
            "postgres sink ready",
        );
        Ok(Self {
            schema,
            config,
            client,
            insert,
            buffer: Vec::new(),
            connection,
        })
    }
}

#[async_trait]
impl Sink for PostgresSink {
    fn schema(&self) -> &StateSchema {
        &self.schema
    }

    async fn add(&mut self, snapshot: Snapshot) -> Result<()> {
        check_record(&self.schema, &snapshot)?;
        let values = self
            .schema
            .columns()
            .map(|c| snapshot.values[c])
            .collect::<Vec<_>>();
        self.buffer.push((snapshot.time as i64, values));
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let rows = self.buffer.len();
        let transaction = self.client.transaction().await?;
        for (time, values) in self.buffer.drain(..) {
            let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(1 + values.len());
            params.push(&time);
            for value in &values {
                params.push(value);
            }
            transaction.execute(&self.insert, &params).await?;
        }
        transaction.commit().await?;
        tracing::debug!(rows, "committed to postgres");
        Ok(())
    }

    fn descriptor(&self) -> SinkDescriptor {
        SinkDescriptor::Postgres(self.config.clone())
    }
}

impl Drop for PostgresSink {
    fn drop(&mut self) {
        self.connection.abort();
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
