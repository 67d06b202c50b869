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

//! Configures the ticksync binaries: logging and panic handling.

use std::path::PathBuf;

use tracing::Level;
use tracing_subscriber::filter;
use tracing_subscriber::prelude::*;

pub struct LoggerSettings {
    /// Log to stderr (always on when no file is configured).
    console: bool,
    /// Append to this file as well.
    log_file: Option<PathBuf>,
    /// Raise the ticksync crates to DEBUG.
    verbose: bool,
}

impl LoggerSettings {
    pub fn new(console: bool, log_file: Option<PathBuf>) -> Self {
        Self {
            console,
            log_file,
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Log levels for all ticksync crates. Third-party crates stay at WARN;
/// raise a target here when its events are needed.
fn configure_ticksync_targets(level: Level) -> filter::Targets {
    filter::Targets::new()
        .with_target("ticksync_server", level)
        .with_target("ticksync_connector", level)
        .with_target("ticksync_client", level)
        .with_target("ticksync_codec", Level::WARN)
        .with_target("ticksync_cmd", level)
        .with_default(Level::WARN)
}

/// Sets the global tracing subscriber. Must be called once, before any
/// task is spawned.
pub fn init_ticksync_logger(settings: LoggerSettings) {
    let level = if settings.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let targets = configure_ticksync_targets(level);

    let stderr_layer = (settings.console || settings.log_file.is_none()).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(targets.clone())
    });
    let file_layer = settings.log_file.as_ref().map(|path| {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap_or_else(|e| panic!("failed to open log file {}: {}", path.display(), e));
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .with_filter(targets.clone())
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

/// Set panic hook to abort the process (without losing debug info and
/// stack trace).
pub fn set_panic_abort() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        std::process::abort();
    }));
}
