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

//! Compiled-module cache under concurrent use

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use docmap::expression::ExpressionFault;
use docmap::{
    CompiledExpression, ExecutionCache, ExpressionCompiler, ExpressionInputs, FieldMappingRule,
    MappingEngine, MappingError, MappingLookups, MappingOptions, ModuleCache, ModuleKey, Node,
    ScriptCompiler,
};
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use serde_json::json;

/// Script compiler that counts calls and refuses sources containing `FAIL`
#[derive(Default)]
struct CountingCompiler {
    calls: Arc<AtomicUsize>,
}

impl ExpressionCompiler for CountingCompiler {
    fn compile(&self, id: &str, source: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // widen the window in which racing threads could double-compile
        thread::sleep(Duration::from_millis(5));
        if source.contains("FAIL") {
            return Err(ExpressionFault::new("refused"));
        }
        ScriptCompiler::new().compile(id, source)
    }
}

fn sources(source: &str) -> IndexMap<String, String> {
    IndexMap::from([("e".to_string(), source.to_string())])
}

#[test]
fn concurrent_callers_share_one_compilation() {
    let compiler = CountingCompiler::default();
    let calls = Arc::clone(&compiler.calls);
    let cache = ModuleCache::with_compiler(compiler);
    let key = ModuleKey::new("shared");
    let sources = sources("1 + 2");

    let modules: Vec<_> = thread::scope(|scope| {
        let (cache, key, sources) = (&cache, &key, &sources);
        let handles: Vec<_> = (0..50)
            .map(|_| scope.spawn(move || cache.get_or_compile(key, sources).unwrap()))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.compilations(), 1);
    assert!(modules.iter().all(|module| Arc::ptr_eq(module, &modules[0])));

    let root = Node::placeholder();
    let inputs = ExpressionInputs {
        request: &root,
        item: &root,
        value: &root,
    };
    let result = docmap::invoke_expression(&modules[0], "e", &inputs, &mut ExecutionCache::new());
    assert_eq!(result.unwrap().to_json(), json!(3));
}

#[test]
fn failed_compilation_does_not_poison_the_key() {
    let cache = ModuleCache::with_compiler(CountingCompiler::default());
    let key = ModuleKey::new("retry");

    let err = cache.get_or_compile(&key, &sources("FAIL")).unwrap_err();
    assert!(matches!(
        err,
        MappingError::ExpressionCompile { ref expression_id, .. } if expression_id == "e"
    ));
    assert!(cache.get(&key).is_none());

    let module = cache.get_or_compile(&key, &sources("2 * 3")).unwrap();
    assert!(module.contains("e"));
    assert_eq!(cache.compilations(), 1);
}

#[test]
fn engines_sharing_a_cache_compile_each_configuration_once() {
    let cache = Arc::new(ModuleCache::default());
    let lookups = MappingLookups::new().with_destination_field("out", "$.out");
    let rules = vec![
        FieldMappingRule::new("r")
            .to_destination("out")
            .with_expression("request.n * 2"),
    ];
    let options = MappingOptions::default();

    let outputs: Vec<_> = thread::scope(|scope| {
        let (rules, lookups, options) = (&rules, &lookups, &options);
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let engine = MappingEngine::default().with_module_cache(Arc::clone(&cache));
                scope.spawn(move || {
                    engine
                        .map_document(&Node::from(json!({ "n": n })), rules, lookups, options)
                        .unwrap()
                        .to_json()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    for (n, output) in outputs.iter().enumerate() {
        assert_eq!(output, &json!({ "out": n * 2 }));
    }
    assert_eq!(cache.compilations(), 1);
    assert_eq!(cache.len(), 1);
}
