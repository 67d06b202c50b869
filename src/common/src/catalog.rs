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

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the reserved step counter column. The sink stores it alongside
/// the variables, but it is never part of the coordinated variable set.
pub const TIME_COLUMN: &str = "time";

/// The fixed, ordered set of variable names a server coordinates per step.
///
/// The set is declared by the sink at startup and never changes for the
/// server's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct StateSchema {
    columns: Vec<String>,
}

impl StateSchema {
    /// Builds a schema from variable names, rejecting duplicates, the
    /// reserved [`TIME_COLUMN`] and the empty set (an empty schema would
    /// declare every step complete immediately).
    pub fn new<I, S>(columns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(ConfigError::EmptySchema);
        }
        for (i, name) in columns.iter().enumerate() {
            if name == TIME_COLUMN {
                return Err(ConfigError::ReservedColumn);
            }
            if columns[..i].contains(name) {
                return Err(ConfigError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl TryFrom<Vec<String>> for StateSchema {
    type Error = ConfigError;

    fn try_from(columns: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(columns)
    }
}

impl From<StateSchema> for Vec<String> {
    fn from(schema: StateSchema) -> Self {
        schema.columns
    }
}
