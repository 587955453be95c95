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

//! Built-in value expression language
//!
//! A small, side-effect free language over the three named inputs
//! `request`, `item` and `value`, plus the scratch cache through
//! `get`/`set`/`has`:
//!
//! ```text
//! round(value * get('rate', 1), 2)
//! if(item.qty > 0, concat(upper(value), '-', item.qty), null)
//! request.header.currency ?? 'EUR'
//! ```

pub mod ast;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod tokenizer;

use std::sync::Arc;

use self::ast::Expr;
use self::evaluator::Evaluator;
use self::parser::parse_expression;
use super::{CompiledExpression, ExecutionCache, ExpressionCompiler, ExpressionFault, ExpressionInputs};
use crate::model::Node;

/// An expression compiled to a syntax tree
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptExpression {
    id: String,
    expr: Expr,
}

impl ScriptExpression {
    /// Expression id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parsed syntax tree
    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl CompiledExpression for ScriptExpression {
    fn evaluate(
        &self,
        inputs: &ExpressionInputs<'_>,
        cache: &mut ExecutionCache,
    ) -> Result<Node, ExpressionFault> {
        Evaluator::new(inputs, cache).evaluate(&self.expr)
    }
}

/// Compiler for the built-in expression language
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptCompiler;

impl ScriptCompiler {
    /// Create a compiler
    pub fn new() -> Self {
        Self
    }

    /// Compile without type erasure
    pub fn compile_script(&self, id: &str, source: &str) -> Result<ScriptExpression, ExpressionFault> {
        let expr = parse_expression(source)?;
        log::trace!("compiled expression '{id}': {expr}");
        Ok(ScriptExpression {
            id: id.to_string(),
            expr,
        })
    }
}

impl ExpressionCompiler for ScriptCompiler {
    fn compile(&self, id: &str, source: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionFault> {
        Ok(Arc::new(self.compile_script(id, source)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScalarValue;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn eval_with(source: &str, value: serde_json::Value, cache: &mut ExecutionCache) -> Result<Node, ExpressionFault> {
        let request = Node::from(json!({
            "header": { "currency": "USD" },
            "lines": [{ "qty": 2, "sku": "ab-1" }, { "qty": 0, "sku": "cd-2" }]
        }));
        let item = Node::from(json!({ "qty": 2, "sku": "ab-1" }));
        let value = Node::from(value);
        let inputs = ExpressionInputs {
            request: &request,
            item: &item,
            value: &value,
        };
        ScriptCompiler::new()
            .compile("e", source)?
            .evaluate(&inputs, cache)
    }

    fn eval(source: &str, value: serde_json::Value) -> serde_json::Value {
        eval_with(source, value, &mut ExecutionCache::new())
            .unwrap()
            .to_json()
    }

    #[rstest]
    #[case("value * 2", json!(21), json!(42))]
    #[case("value + 1", json!(1.5), json!(2.5))]
    #[case("value + '!'", json!("hi"), json!("hi!"))]
    #[case("item.qty * 10", json!(null), json!(20))]
    #[case("request.lines[1].sku", json!(null), json!("cd-2"))]
    #[case("request.lines[-1].qty", json!(null), json!(0))]
    #[case("request.header.missing ?? 'none'", json!(null), json!("none"))]
    #[case("request.header.currency ?? 'EUR'", json!(null), json!("USD"))]
    #[case("if(item.qty > 1, 'many', 'few')", json!(null), json!("many"))]
    #[case("upper(replace(item.sku, '-', ''))", json!(null), json!("AB1"))]
    #[case("count(request.lines)", json!(null), json!(2))]
    #[case("value == 3 && !(value < 1)", json!(3), json!(true))]
    #[case("round(value, 1)", json!(2.25), json!(2.3))]
    #[case("format('{0:N2}', value)", json!(1234.5), json!("1,234.50"))]
    #[case("value.a.b", json!(5), json!(null))]
    fn test_evaluate(
        #[case] source: &str,
        #[case] value: serde_json::Value,
        #[case] expected: serde_json::Value,
    ) {
        assert_eq!(eval(source, value), expected);
    }

    #[test]
    fn test_cache_is_shared_across_calls() {
        let mut cache = ExecutionCache::new();
        eval_with("set('rate', 3)", json!(null), &mut cache).unwrap();
        let result = eval_with("value * get('rate', 1)", json!(5), &mut cache).unwrap();
        assert_eq!(result, Node::from(ScalarValue::Integer(15)));
    }

    #[test]
    fn test_runtime_faults() {
        let err = eval_with("value / 0", json!(4), &mut ExecutionCache::new()).unwrap_err();
        assert_eq!(err.message, "division by zero");
        let err = eval_with("value - 'a'", json!(4), &mut ExecutionCache::new()).unwrap_err();
        assert!(err.message.contains("cannot be applied to integer and string"));
    }

    #[test]
    fn test_lazy_branches() {
        assert_eq!(eval("if(false, 1 / 0, 'safe')", json!(null)), json!("safe"));
        assert_eq!(eval("coalesce(null, value, 1 / 0)", json!(7)), json!(7));
        assert_eq!(eval("false && 1 / 0", json!(null)), json!(false));
    }
}
