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

//! Error types for document mapping
//!
//! Every failure aborts the current `map_document` call. Nothing is retried
//! inside the engine; callers decide whether to re-run with a corrected
//! configuration.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::path::PathError;

/// Result type alias for mapping operations
pub type Result<T> = std::result::Result<T, MappingError>;

/// Coarse classification of a [`MappingError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or invalid path expression
    Grammar,
    /// Rule, lookup or value-type problem
    Configuration,
    /// Expression failed to compile or to run
    Expression,
    /// Write loop exceeded the iteration ceiling
    LoopGuard,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Grammar => "grammar",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Expression => "expression",
            ErrorCategory::LoopGuard => "loop-guard",
        };
        f.write_str(name)
    }
}

/// Diagnostic snapshot captured when an expression fails at runtime
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionFailure {
    /// Key of the module the expression belongs to
    pub module: String,
    /// Identifier of the failing expression
    pub expression_id: String,
    /// Message reported by the expression runtime
    pub message: String,
    /// Source document the mapping ran against
    pub request: JsonValue,
    /// Enclosing source item of the value
    pub item: JsonValue,
    /// Value handed to the expression
    pub value: JsonValue,
    /// Scratch cache contents at the time of failure
    pub cache: JsonValue,
}

impl fmt::Display for ExpressionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expression '{}' in module {} failed: {} (value: {}, item: {}, cache: {})",
            self.expression_id, self.module, self.message, self.value, self.item, self.cache
        )
    }
}

/// Diagnostic snapshot captured when a write loop runs away
#[derive(Debug, Clone, PartialEq)]
pub struct LoopGuardSnapshot {
    /// Rule that was being applied
    pub rule_id: String,
    /// Destination path of the rule
    pub destination: String,
    /// Number of writes performed before giving up
    pub iterations: usize,
    /// Configured ceiling
    pub ceiling: usize,
    /// Placement hints of the last attempted write
    pub hints: BTreeMap<String, Option<usize>>,
    /// Synthetic counters per dynamic tag
    pub counters: BTreeMap<String, usize>,
}

impl fmt::Display for LoopGuardSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rule '{}' exceeded {} writes to {} (iterations: {}, hints: {:?}, counters: {:?})",
            self.rule_id, self.ceiling, self.destination, self.iterations, self.hints, self.counters
        )
    }
}

/// Error type for all mapping operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    /// Path expression failed to parse or validate
    #[error("Grammar error in path '{path}': {source}")]
    Grammar {
        /// The offending path text
        path: String,
        /// Underlying parser error
        #[source]
        source: PathError,
    },

    /// Rule resolves to no destination path
    #[error("Rule '{rule_id}' has no destination path")]
    MissingDestinationPath {
        /// Rule identifier
        rule_id: String,
    },

    /// Rule has no source, constant, or expression
    #[error("Rule '{rule_id}' has no source field, constant value or value expression")]
    UnsupportedMapping {
        /// Rule identifier
        rule_id: String,
    },

    /// A value of a non-scalar kind was about to be written to a leaf
    #[error("Unsupported value type for a leaf write: {type_name}")]
    UnsupportedValueType {
        /// Kind of the rejected value
        type_name: String,
    },

    /// Rule references a field id missing from the lookups
    #[error("Rule '{rule_id}' references unknown field '{field_id}'")]
    UnknownField {
        /// Rule identifier
        rule_id: String,
        /// Missing field identifier
        field_id: String,
    },

    /// Rule references a format id missing from the lookups
    #[error("Rule '{rule_id}' references unknown format '{format_id}'")]
    UnknownFormat {
        /// Rule identifier
        rule_id: String,
        /// Missing format identifier
        format_id: String,
    },

    /// Placement hint string could not be parsed
    #[error("Invalid placement hint '{hint}': {message}")]
    InvalidPlacementHint {
        /// Hint text
        hint: String,
        /// What is wrong with it
        message: String,
    },

    /// Composite format template could not be parsed or applied
    #[error("Invalid format template '{template}': {message}")]
    InvalidFormatTemplate {
        /// Template text
        template: String,
        /// What is wrong with it
        message: String,
    },

    /// Existing target structure conflicts with the path being written
    #[error("Path conflict at {path}: {message}")]
    PathConflict {
        /// Path being written
        path: String,
        /// Description of the conflict
        message: String,
    },

    /// Raw value cannot be coerced to the declared source type
    #[error("Conversion error: cannot convert {value} to {target}")]
    Conversion {
        /// Rendered raw value
        value: String,
        /// Requested type
        target: String,
    },

    /// An expression failed to compile
    #[error("Expression '{expression_id}' in module {module} failed to compile: {message}")]
    ExpressionCompile {
        /// Module key
        module: String,
        /// Expression identifier
        expression_id: String,
        /// Compiler message
        message: String,
    },

    /// An expression id is not part of the compiled module
    #[error("Expression '{expression_id}' not found in module {module}")]
    UnknownExpression {
        /// Module key
        module: String,
        /// Expression identifier
        expression_id: String,
    },

    /// An expression failed while running
    #[error("Expression error: {0}")]
    ExpressionFailed(Box<ExpressionFailure>),

    /// Write loop exceeded the configured iteration ceiling
    #[error("Loop guard triggered: {0}")]
    LoopGuard(Box<LoopGuardSnapshot>),
}

impl MappingError {
    /// Create a grammar error for a path
    pub fn grammar(path: impl Into<String>, source: PathError) -> Self {
        Self::Grammar {
            path: path.into(),
            source,
        }
    }

    /// Create a missing destination path error
    pub fn missing_destination_path(rule_id: impl Into<String>) -> Self {
        Self::MissingDestinationPath {
            rule_id: rule_id.into(),
        }
    }

    /// Create an unsupported mapping error
    pub fn unsupported_mapping(rule_id: impl Into<String>) -> Self {
        Self::UnsupportedMapping {
            rule_id: rule_id.into(),
        }
    }

    /// Create an unsupported value type error
    pub fn unsupported_value_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedValueType {
            type_name: type_name.into(),
        }
    }

    /// Create an unknown field error
    pub fn unknown_field(rule_id: impl Into<String>, field_id: impl Into<String>) -> Self {
        Self::UnknownField {
            rule_id: rule_id.into(),
            field_id: field_id.into(),
        }
    }

    /// Create an unknown format error
    pub fn unknown_format(rule_id: impl Into<String>, format_id: impl Into<String>) -> Self {
        Self::UnknownFormat {
            rule_id: rule_id.into(),
            format_id: format_id.into(),
        }
    }

    /// Create an invalid placement hint error
    pub fn invalid_placement_hint(hint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPlacementHint {
            hint: hint.into(),
            message: message.into(),
        }
    }

    /// Create an invalid format template error
    pub fn invalid_format_template(
        template: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidFormatTemplate {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Create a path conflict error
    pub fn path_conflict(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PathConflict {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a conversion error
    pub fn conversion(value: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Conversion {
            value: value.into(),
            target: target.into(),
        }
    }

    /// Create an expression compile error
    pub fn expression_compile(
        module: impl Into<String>,
        expression_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ExpressionCompile {
            module: module.into(),
            expression_id: expression_id.into(),
            message: message.into(),
        }
    }

    /// Create an unknown expression error
    pub fn unknown_expression(module: impl Into<String>, expression_id: impl Into<String>) -> Self {
        Self::UnknownExpression {
            module: module.into(),
            expression_id: expression_id.into(),
        }
    }

    /// Wrap a runtime expression failure
    pub fn expression_failed(failure: ExpressionFailure) -> Self {
        Self::ExpressionFailed(Box::new(failure))
    }

    /// Wrap a loop-guard snapshot
    pub fn loop_guard(snapshot: LoopGuardSnapshot) -> Self {
        Self::LoopGuard(Box::new(snapshot))
    }

    /// Category this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            MappingError::Grammar { .. } => ErrorCategory::Grammar,
            MappingError::MissingDestinationPath { .. }
            | MappingError::UnsupportedMapping { .. }
            | MappingError::UnsupportedValueType { .. }
            | MappingError::UnknownField { .. }
            | MappingError::UnknownFormat { .. }
            | MappingError::InvalidPlacementHint { .. }
            | MappingError::InvalidFormatTemplate { .. }
            | MappingError::PathConflict { .. }
            | MappingError::Conversion { .. } => ErrorCategory::Configuration,
            MappingError::ExpressionCompile { .. }
            | MappingError::UnknownExpression { .. }
            | MappingError::ExpressionFailed(_) => ErrorCategory::Expression,
            MappingError::LoopGuard(_) => ErrorCategory::LoopGuard,
        }
    }
}
