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

use std::time::Duration;

use thiserror::Error;
use ticksync_codec::ProtocolError;
use ticksync_common::error::ConfigError;
use ticksync_connector::SinkError;

pub type ServerResult<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("protocol error")]
    Protocol(#[from] ProtocolError),

    #[error("sink error")]
    Sink(#[from] SinkError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("client did not deliver an envelope within {0:?}")]
    ReadTimeout(Duration),
}
