// Copyright 2024 OctoFHIR Team
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

//! Engine configuration
//!
//! # Examples
//!
//! ```rust
//! use docmap::EngineConfig;
//!
//! let config = EngineConfig::default()
//!     .with_max_write_iterations(250)
//!     .with_tabular_row_property("lines");
//! assert_eq!(config.max_write_iterations, 250);
//! assert!(config.validate().is_empty());
//! ```

use serde::{Deserialize, Serialize};

/// Default ceiling for repeated writes of a single rule
pub const DEFAULT_MAX_WRITE_ITERATIONS: usize = 1000;

/// Default array property for tabular targets
pub const DEFAULT_TABULAR_ROW_PROPERTY: &str = "row";

/// Configuration for a [`crate::MappingEngine`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Maximum number of writes a single rule may perform for one source value
    ///
    /// A rule with exactly one source value keeps writing while the writer
    /// reports unresolved dynamic slots. Crossing this ceiling aborts the run
    /// with a loop-guard error. Default: 1000
    pub max_write_iterations: usize,

    /// Array property used to synthesize tabular destination paths
    ///
    /// A rule with a header title maps to `$.<row>[*]['<title>']` when the
    /// target is tabular. Default: "row"
    pub tabular_row_property: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_write_iterations: DEFAULT_MAX_WRITE_ITERATIONS,
            tabular_row_property: DEFAULT_TABULAR_ROW_PROPERTY.to_string(),
        }
    }
}

impl EngineConfig {
    /// Create new configuration with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the write-iteration ceiling
    pub fn with_max_write_iterations(mut self, iterations: usize) -> Self {
        self.max_write_iterations = iterations;
        self
    }

    /// Set the tabular row property
    pub fn with_tabular_row_property(mut self, property: impl Into<String>) -> Self {
        self.tabular_row_property = property.into();
        self
    }

    /// Configuration for unit tests: a small ceiling so runaway loops fail fast
    pub fn for_testing() -> Self {
        Self {
            max_write_iterations: 50,
            tabular_row_property: DEFAULT_TABULAR_ROW_PROPERTY.to_string(),
        }
    }

    /// Validate configuration values
    ///
    /// Returns a list of warnings; an empty list means the configuration is sane.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.max_write_iterations == 0 {
            warnings.push("max_write_iterations is 0: every fan-out write will trip the loop guard".to_string());
        } else if self.max_write_iterations > 1_000_000 {
            warnings.push(format!(
                "max_write_iterations of {} is very high and may hide runaway loops",
                self.max_write_iterations
            ));
        }

        if self.tabular_row_property.trim().is_empty() {
            warnings.push("tabular_row_property is empty".to_string());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_write_iterations, 1000);
        assert_eq!(config.tabular_row_property, "row");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validate_warnings() {
        let config = EngineConfig::new()
            .with_max_write_iterations(0)
            .with_tabular_row_property(" ");
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "maxWriteIterations": 12 }"#).unwrap();
        assert_eq!(config.max_write_iterations, 12);
        assert_eq!(config.tabular_row_property, "row");
    }
}
