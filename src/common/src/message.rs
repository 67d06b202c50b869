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

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// One client exchange: partial results contributed to the current step,
/// plus the variables the client wants back once the step is committed.
///
/// Wire form: `{"data": {"a": 1.0}, "request": ["b"]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub data: HashMap<String, f64>,
    #[serde(default)]
    pub request: Vec<String>,
}

/// Server reply: the requested variables of one committed step.
///
/// Serializes flat, e.g. `{"a": 1.0, "b": 2.0, "time": 3}`. Requested
/// names the server does not coordinate are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
    /// The step the values belong to.
    pub time: u64,
}
