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

use thiserror::Error;

use crate::catalog::TIME_COLUMN;

/// Invalid startup parameters. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("schema declares no variables")]
    EmptySchema,

    #[error("duplicate variable `{0}` in schema")]
    DuplicateColumn(String),

    #[error("`{TIME_COLUMN}` is reserved for the step counter")]
    ReservedColumn,
}
