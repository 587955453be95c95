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

//! Compiled-expression modules memoized per configuration fingerprint
//!
//! Each fingerprint owns one slot in a [`DashMap`]. The slot is an
//! `Arc<OnceCell>`: the map shard lock is held only long enough to clone the
//! slot, and compilation then runs inside `OnceCell::get_or_try_init`, which
//! serializes callers of the same fingerprint while other fingerprints
//! compile in parallel. A failed compilation leaves the cell empty.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::script::ScriptCompiler;
use super::{CompiledExpression, ExecutionCache, ExpressionCompiler, ExpressionInputs};
use crate::error::{ExpressionFailure, MappingError, Result};
use crate::model::Node;

/// Fingerprint of the configuration a module was compiled from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleKey(String);

impl ModuleKey {
    /// Create a key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ModuleKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// An immutable set of compiled expressions keyed by expression id
pub struct CompiledModule {
    key: ModuleKey,
    expressions: FxHashMap<String, Arc<dyn CompiledExpression>>,
}

impl CompiledModule {
    /// Fingerprint the module was compiled for
    pub fn key(&self) -> &ModuleKey {
        &self.key
    }

    /// Expression by id
    pub fn get(&self, id: &str) -> Option<&Arc<dyn CompiledExpression>> {
        self.expressions.get(id)
    }

    /// Whether an expression id exists
    pub fn contains(&self, id: &str) -> bool {
        self.expressions.contains_key(id)
    }

    /// Number of expressions
    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    /// Whether the module has no expressions
    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}

impl fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.expressions.keys().collect();
        ids.sort();
        f.debug_struct("CompiledModule")
            .field("key", &self.key)
            .field("expressions", &ids)
            .finish()
    }
}

type ModuleSlot = Arc<OnceCell<Arc<CompiledModule>>>;

/// Process-wide cache of compiled modules
pub struct ModuleCache {
    compiler: Arc<dyn ExpressionCompiler>,
    modules: DashMap<ModuleKey, ModuleSlot>,
    compilations: AtomicU64,
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new(Arc::new(ScriptCompiler::new()))
    }
}

impl fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCache")
            .field("modules", &self.modules.len())
            .field("compilations", &self.compilations())
            .finish()
    }
}

impl ModuleCache {
    /// Create a cache backed by the given compiler
    pub fn new(compiler: Arc<dyn ExpressionCompiler>) -> Self {
        Self {
            compiler,
            modules: DashMap::new(),
            compilations: AtomicU64::new(0),
        }
    }

    /// Create a cache backed by a compiler value
    pub fn with_compiler(compiler: impl ExpressionCompiler + 'static) -> Self {
        Self::new(Arc::new(compiler))
    }

    /// Module for `key`, compiling `sources` on first access
    ///
    /// Concurrent callers with the same key all receive the same module and
    /// the sources are compiled once. A compilation error is returned to the
    /// caller that attempted it and leaves no entry behind.
    pub fn get_or_compile(
        &self,
        key: &ModuleKey,
        sources: &IndexMap<String, String>,
    ) -> Result<Arc<CompiledModule>> {
        let slot: ModuleSlot = self.modules.entry(key.clone()).or_default().clone();

        let outcome = slot.get_or_try_init(|| self.compile_module(key, sources));
        match outcome {
            Ok(module) => Ok(Arc::clone(module)),
            Err(err) => {
                self.modules
                    .remove_if(key, |_, slot| slot.get().is_none());
                Err(err)
            }
        }
    }

    fn compile_module(
        &self,
        key: &ModuleKey,
        sources: &IndexMap<String, String>,
    ) -> Result<Arc<CompiledModule>> {
        log::debug!("compiling module {key} with {} expressions", sources.len());
        let mut expressions = FxHashMap::default();
        for (id, source) in sources {
            let compiled = self.compiler.compile(id, source).map_err(|fault| {
                MappingError::expression_compile(key.as_str(), id.as_str(), fault.message)
            })?;
            expressions.insert(id.clone(), compiled);
        }
        self.compilations.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(CompiledModule {
            key: key.clone(),
            expressions,
        }))
    }

    /// Already compiled module for `key`
    pub fn get(&self, key: &ModuleKey) -> Option<Arc<CompiledModule>> {
        self.modules
            .get(key)
            .and_then(|slot| slot.get().cloned())
    }

    /// Number of cached modules
    pub fn len(&self) -> usize {
        self.modules.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// Whether no module is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the module for `key`; callers holding it keep their `Arc`
    pub fn evict(&self, key: &ModuleKey) -> bool {
        self.modules.remove(key).is_some()
    }

    /// Drop every module
    pub fn clear(&self) {
        self.modules.clear();
    }

    /// Number of successful module compilations since creation
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }
}

/// Invoke one expression of a module
///
/// Faults and panics raised by the expression are converted into
/// [`MappingError::ExpressionFailed`] carrying the inputs and cache contents.
pub fn invoke_expression(
    module: &CompiledModule,
    id: &str,
    inputs: &ExpressionInputs<'_>,
    cache: &mut ExecutionCache,
) -> Result<Node> {
    let expression = module
        .get(id)
        .ok_or_else(|| MappingError::unknown_expression(module.key().as_str(), id))?;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| expression.evaluate(inputs, cache)));
    let message = match outcome {
        Ok(Ok(node)) => return Ok(node),
        Ok(Err(fault)) => fault.message,
        Err(payload) => panic_message(payload.as_ref()),
    };

    log::debug!("expression '{id}' in module {} failed: {message}", module.key());
    Err(MappingError::expression_failed(ExpressionFailure {
        module: module.key().to_string(),
        expression_id: id.to_string(),
        message,
        request: inputs.request.to_json(),
        item: inputs.item.to_json(),
        value: inputs.value.to_json(),
        cache: cache.to_json(),
    }))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("expression panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("expression panicked: {message}")
    } else {
        "expression panicked".to_string()
    }
}
