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

//! Pluggable value-expression capability
//!
//! The engine never depends on a particular expression syntax. An
//! [`ExpressionCompiler`] turns source text into a [`CompiledExpression`];
//! compiled expressions are grouped into modules and memoized per
//! configuration fingerprint by [`cache::ModuleCache`]. The crate ships one
//! compiler, [`script::ScriptCompiler`].

pub mod cache;
pub mod script;

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::model::{Node, ObjectMap};

/// Named inputs handed to every expression call
#[derive(Debug, Clone, Copy)]
pub struct ExpressionInputs<'a> {
    /// The whole source document
    pub request: &'a Node,
    /// Innermost source array item enclosing the value
    pub item: &'a Node,
    /// The value being mapped
    pub value: &'a Node,
}

/// Failure reported by an expression compiler or at runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExpressionFault {
    /// Human readable description
    pub message: String,
}

impl ExpressionFault {
    /// Create a fault
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A compiled, callable expression
pub trait CompiledExpression: Send + Sync {
    /// Evaluate against the inputs, reading and writing the scratch cache
    fn evaluate(
        &self,
        inputs: &ExpressionInputs<'_>,
        cache: &mut ExecutionCache,
    ) -> Result<Node, ExpressionFault>;
}

impl<F> CompiledExpression for F
where
    F: Fn(&ExpressionInputs<'_>, &mut ExecutionCache) -> Result<Node, ExpressionFault>
        + Send
        + Sync,
{
    fn evaluate(
        &self,
        inputs: &ExpressionInputs<'_>,
        cache: &mut ExecutionCache,
    ) -> Result<Node, ExpressionFault> {
        self(inputs, cache)
    }
}

/// Turns expression source text into callables
pub trait ExpressionCompiler: Send + Sync {
    /// Compile one expression
    fn compile(&self, id: &str, source: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionFault>;
}

/// Mutable scratch storage shared by the expressions of one mapping pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionCache {
    entries: IndexMap<String, Node>,
}

impl ExecutionCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for a key
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.get(key)
    }

    /// Store an entry, returning the previous one
    pub fn set(&mut self, key: impl Into<String>, value: Node) -> Option<Node> {
        self.entries.insert(key.into(), value)
    }

    /// Whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove an entry
    pub fn remove(&mut self, key: &str) -> Option<Node> {
        self.entries.shift_remove(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Copy every property of an object into the cache
    pub fn merge(&mut self, properties: &ObjectMap) {
        for (key, value) in properties {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// JSON snapshot for diagnostics
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.entries
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScalarValue;
    use serde_json::json;

    #[test]
    fn test_cache_merge_and_snapshot() {
        let mut cache = ExecutionCache::new();
        cache.set("rate", Node::from(ScalarValue::Integer(2)));
        let seed = Node::from(json!({ "currency": "EUR", "rate": 3 }));
        cache.merge(seed.as_object().unwrap());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.to_json(), json!({ "rate": 3, "currency": "EUR" }));
        assert!(cache.remove("rate").is_some());
        assert!(!cache.contains("rate"));
    }

    #[test]
    fn test_closures_are_expressions() {
        let double = |inputs: &ExpressionInputs<'_>,
                      _: &mut ExecutionCache|
         -> Result<Node, ExpressionFault> {
            let value = inputs.value.as_scalar().and_then(ScalarValue::as_i64).unwrap_or(0);
            Ok(Node::from(ScalarValue::Integer(value * 2)))
        };
        let root = Node::placeholder();
        let value = Node::from(ScalarValue::Integer(21));
        let inputs = ExpressionInputs {
            request: &root,
            item: &root,
            value: &value,
        };
        let result = double.evaluate(&inputs, &mut ExecutionCache::new()).unwrap();
        assert_eq!(result, Node::from(ScalarValue::Integer(42)));
    }
}
