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

use serde::{Deserialize, Serialize};

/// Absolute tolerance used when comparing persisted variable values.
pub const VALUE_TOLERANCE: f64 = 1e-4;

/// The full variable assignment captured at the moment a step became
/// complete, handed to the sink as one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub time: u64,
    pub values: HashMap<String, f64>,
}

impl Snapshot {
    /// Persisted-record equality: `time` within ±1, every variable within
    /// ±[`VALUE_TOLERANCE`], same variable set.
    pub fn approx_eq(&self, other: &Snapshot) -> bool {
        if self.time.abs_diff(other.time) > 1 || self.values.len() != other.values.len() {
            return false;
        }
        self.values.iter().all(|(name, value)| {
            other
                .values
                .get(name)
                .is_some_and(|v| (value - v).abs() <= VALUE_TOLERANCE)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(time: u64, pairs: &[(&str, f64)]) -> Snapshot {
        Snapshot {
            time,
            values: pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect(),
        }
    }

    #[test]
    fn tolerates_small_differences() {
        let a = snapshot(5, &[("x", 1.0), ("y", 2.0)]);
        let b = snapshot(6, &[("x", 1.00005), ("y", 1.99995)]);
        assert!(a.approx_eq(&b));
    }

    #[test]
    fn rejects_large_differences() {
        let a = snapshot(5, &[("x", 1.0)]);
        assert!(!a.approx_eq(&snapshot(7, &[("x", 1.0)])));
        assert!(!a.approx_eq(&snapshot(5, &[("x", 1.001)])));
        assert!(!a.approx_eq(&snapshot(5, &[("z", 1.0)])));
        assert!(!a.approx_eq(&snapshot(5, &[("x", 1.0), ("y", 2.0)])));
    }
}
