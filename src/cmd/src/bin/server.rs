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

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ticksync_common::config::CoordinationConfig;
use ticksync_connector::sink::postgres::PostgresConfig;
use ticksync_connector::{build_sink_with_fallback, SinkDescriptor};
use ticksync_rt::LoggerSettings;
use ticksync_server::{serve, ServerConfig};

/// The deployment's coordinated variables, matching the columns of the
/// persisted state table.
const SIMULATION_COLUMNS: [&str; 8] = [
    "Tzm", "Fzm", "To", "Tpco", "Fzco", "Tpm", "Tzco", "Tr",
];

#[derive(Debug, Parser)]
#[command(name = "ticksync-server", about = "Tick-synchronized state exchange server")]
struct ServerOpts {
    /// Address to bind.
    ip: String,

    /// First TCP port to try; incremented until a bind succeeds. The
    /// chosen port is written to port.txt.
    port: u16,

    /// Prompt for database credentials instead of the debug defaults.
    #[clap(long)]
    login: bool,

    /// Run against the black hole sink; no database needed.
    #[clap(long, env = "TS_SIMULATE")]
    simulate: bool,

    #[clap(long = "host", env = "TS_DB_HOST", default_value = "localhost")]
    db_host: String,

    #[clap(long, env = "TS_DB_PORT", default_value_t = 5432)]
    db_port: u16,

    #[clap(long, env = "TS_DB_TABLE", default_value = "simulation_states")]
    db_table: String,

    /// Seconds between sink commits.
    #[clap(long, env = "TS_COMMIT_INTERVAL_SECS", default_value_t = 2)]
    commit_interval_secs: u64,

    /// Microseconds between coordinator polls.
    #[clap(long, env = "TS_WAIT_TICK_MICROS", default_value_t = 10)]
    wait_tick_micros: u64,

    /// Seconds a worker waits for a client's envelope.
    #[clap(long, env = "TS_READ_TIMEOUT_SECS", default_value_t = 30)]
    read_timeout_secs: u64,

    /// Log file.
    #[clap(short = 'l', long)]
    logfile: Option<PathBuf>,

    /// Also log to the console.
    #[clap(short = 'c', long)]
    console: bool,

    #[clap(short = 'v', long)]
    verbose: bool,
}

fn prompt_credentials() -> anyhow::Result<(String, String, String)> {
    println!("Database configuration");
    print!("Login: ");
    std::io::stdout().flush()?;
    let mut login = String::new();
    std::io::stdin().read_line(&mut login)?;
    let password = rpassword::prompt_password("Password: ")?;
    print!("Database: ");
    std::io::stdout().flush()?;
    let mut database = String::new();
    std::io::stdin().read_line(&mut database)?;
    Ok((
        login.trim().to_owned(),
        password,
        database.trim().to_owned(),
    ))
}

fn sink_descriptor(opts: &ServerOpts) -> anyhow::Result<SinkDescriptor> {
    let columns = SIMULATION_COLUMNS.map(str::to_owned).to_vec();
    if opts.simulate {
        return Ok(SinkDescriptor::BlackHole { columns });
    }
    let (user, password, database) = if opts.login {
        prompt_credentials()?
    } else {
        // Debug defaults for a local scratch database.
        (
            "luki".to_owned(),
            "luki".to_owned(),
            "luki_testing".to_owned(),
        )
    };
    Ok(SinkDescriptor::Postgres(PostgresConfig {
        host: opts.db_host.clone(),
        port: opts.db_port,
        user,
        password,
        database,
        table: opts.db_table.clone(),
        columns,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = ServerOpts::parse();
    ticksync_rt::init_ticksync_logger(
        LoggerSettings::new(opts.console, opts.logfile.clone()).verbose(opts.verbose),
    );
    ticksync_rt::set_panic_abort();

    let descriptor = sink_descriptor(&opts)?;
    let sink = build_sink_with_fallback(descriptor)
        .await
        .context("failed to build the sink")?;

    let config = ServerConfig {
        ip: opts.ip.clone(),
        port: opts.port,
        coordination: CoordinationConfig {
            wait_tick: Duration::from_micros(opts.wait_tick_micros),
            commit_interval: Duration::from_secs(opts.commit_interval_secs),
            read_timeout: Duration::from_secs(opts.read_timeout_secs),
            port_file: Some(PathBuf::from("port.txt")),
        },
    };
    let (addr, mut join_handle, shutdown_tx) = serve(config, sink)
        .await
        .context("failed to start the server")?;
    println!("Server running on ip {} port {}", opts.ip, addr.port());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("ctrl-c received, shutting down");
            let _ = shutdown_tx.send(());
        }
        result = &mut join_handle => {
            // A server that stops without being asked is a fatal failure
            // (the coordinator died); exit non-zero.
            result?.context("server exited on its own")?;
            anyhow::bail!("server exited on its own");
        }
    }
    join_handle.await??;
    Ok(())
}
