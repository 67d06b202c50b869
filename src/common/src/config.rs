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

use std::path::PathBuf;
use std::time::Duration;

/// Tunables of the coordination protocol.
#[derive(Debug, Clone)]
pub struct CoordinationConfig {
    /// Sleep between the coordinator's completeness and drain polls.
    pub wait_tick: Duration,

    /// Wall-clock interval between sink `commit` calls.
    pub commit_interval: Duration,

    /// Budget for reading one request envelope from a client. A client
    /// that never finishes its frame is dropped after this long.
    pub read_timeout: Duration,

    /// Where the listener publishes the port it finally bound, so drivers
    /// started without a port can discover it. `None` disables the file.
    pub port_file: Option<PathBuf>,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            wait_tick: Duration::from_micros(10),
            commit_interval: Duration::from_secs(2),
            read_timeout: Duration::from_secs(30),
            port_file: Some(PathBuf::from("port.txt")),
        }
    }
}
