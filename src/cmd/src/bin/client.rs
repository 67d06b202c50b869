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
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use ticksync_client::Client;
use ticksync_rt::LoggerSettings;

#[derive(Debug, Parser)]
#[command(name = "ticksync-client", about = "One exchange against a ticksync server")]
struct ClientOpts {
    /// Server address.
    ip: String,

    /// Server port; 0 reads the port the server published in port.txt.
    port: u16,

    /// File the reply JSON is written to.
    outputfile: PathBuf,

    /// Requested variable names.
    #[clap(short = 'r', long = "request", num_args = 0..)]
    request: Vec<String>,

    /// JSON file with the payload to send, e.g. {"Tzm": 1.5}.
    #[clap(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// Inline JSON payload. Ignored when --file is present.
    #[clap(short = 's', long = "string")]
    string: Option<String>,

    /// Log file.
    #[clap(short = 'l', long)]
    logfile: Option<PathBuf>,

    /// Also log to the console.
    #[clap(short = 'c', long)]
    console: bool,
}

fn payload(opts: &ClientOpts) -> anyhow::Result<HashMap<String, f64>> {
    let raw = match (&opts.file, &opts.string) {
        (Some(path), string) => {
            if string.is_some() {
                tracing::warn!("--string is ignored, the payload file takes precedence");
            }
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read payload file {}", path.display()))?
        }
        (None, Some(string)) => string.clone(),
        (None, None) => "{}".to_owned(),
    };
    serde_json::from_str(&raw).context("payload is not a JSON object of numbers")
}

fn resolve_port(port: u16) -> anyhow::Result<u16> {
    if port != 0 {
        return Ok(port);
    }
    let contents = std::fs::read_to_string("port.txt")
        .context("port 0 given, but no port.txt to read the port from")?;
    contents
        .trim()
        .parse()
        .context("port.txt does not contain a port")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = ClientOpts::parse();
    ticksync_rt::init_ticksync_logger(LoggerSettings::new(opts.console, opts.logfile.clone()));

    let data = payload(&opts)?;
    let port = resolve_port(opts.port)?;

    let client = Client::new(opts.ip.clone(), port);
    let reply = client.exchange(data, opts.request.clone()).await?;

    let rendered = serde_json::to_string(&reply)?;
    std::fs::write(&opts.outputfile, &rendered)
        .with_context(|| format!("failed to write {}", opts.outputfile.display()))?;
    println!("{rendered}");
    Ok(())
}
