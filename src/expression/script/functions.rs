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

//! Built-in functions of the expression language
//!
//! Functions are resolved by name when an expression is compiled, so an
//! unknown name or a wrong argument count is a compile error. `if` and
//! `coalesce` evaluate their arguments lazily; the evaluator handles them
//! before arguments reach [`call`].

use std::str::FromStr;

use once_cell::sync::Lazy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rustc_hash::FxHashMap;

use super::evaluator::{Numeric, text_of, truthy};
use crate::expression::{ExecutionCache, ExpressionFault};
use crate::mapping::format::format_template;
use crate::model::{Node, ScalarValue};

/// A built-in function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    If,
    Coalesce,
    Concat,
    Upper,
    Lower,
    Trim,
    Length,
    Substring,
    Replace,
    Contains,
    StartsWith,
    EndsWith,
    Round,
    Abs,
    Floor,
    Ceiling,
    Number,
    Integer,
    String,
    Count,
    Sum,
    First,
    Last,
    Join,
    Format,
    Get,
    Set,
    Has,
}

/// Name, function, minimum and maximum argument count
const SIGNATURES: &[(&str, Function, usize, Option<usize>)] = &[
    ("if", Function::If, 2, Some(3)),
    ("coalesce", Function::Coalesce, 1, None),
    ("concat", Function::Concat, 1, None),
    ("upper", Function::Upper, 1, Some(1)),
    ("lower", Function::Lower, 1, Some(1)),
    ("trim", Function::Trim, 1, Some(1)),
    ("length", Function::Length, 1, Some(1)),
    ("substring", Function::Substring, 2, Some(3)),
    ("replace", Function::Replace, 3, Some(3)),
    ("contains", Function::Contains, 2, Some(2)),
    ("starts_with", Function::StartsWith, 2, Some(2)),
    ("ends_with", Function::EndsWith, 2, Some(2)),
    ("round", Function::Round, 1, Some(2)),
    ("abs", Function::Abs, 1, Some(1)),
    ("floor", Function::Floor, 1, Some(1)),
    ("ceiling", Function::Ceiling, 1, Some(1)),
    ("number", Function::Number, 1, Some(1)),
    ("integer", Function::Integer, 1, Some(1)),
    ("string", Function::String, 1, Some(1)),
    ("count", Function::Count, 1, Some(1)),
    ("sum", Function::Sum, 1, Some(1)),
    ("first", Function::First, 1, Some(1)),
    ("last", Function::Last, 1, Some(1)),
    ("join", Function::Join, 1, Some(2)),
    ("format", Function::Format, 2, Some(2)),
    ("get", Function::Get, 1, Some(2)),
    ("set", Function::Set, 2, Some(2)),
    ("has", Function::Has, 1, Some(1)),
];

static REGISTRY: Lazy<FxHashMap<&'static str, (Function, usize, Option<usize>)>> =
    Lazy::new(|| {
        SIGNATURES
            .iter()
            .map(|&(name, function, min, max)| (name, (function, min, max)))
            .collect()
    });

impl Function {
    /// Resolve a call site, checking the argument count
    pub fn resolve(name: &str, arg_count: usize) -> Result<Self, ExpressionFault> {
        let Some(&(function, min, max)) = REGISTRY.get(name) else {
            return Err(ExpressionFault::new(format!("unknown function '{name}'")));
        };
        if arg_count < min || max.is_some_and(|max| arg_count > max) {
            let expected = match max {
                Some(max) if max == min => format!("{min}"),
                Some(max) => format!("{min}-{max}"),
                None => format!("at least {min}"),
            };
            return Err(ExpressionFault::new(format!(
                "function '{name}' expects {expected} arguments, got {arg_count}"
            )));
        }
        Ok(function)
    }

    /// Name used in source text
    pub fn name(&self) -> &'static str {
        SIGNATURES
            .iter()
            .find(|(_, function, _, _)| function == self)
            .map_or("?", |(name, _, _, _)| name)
    }
}

fn fault(function: Function, message: impl std::fmt::Display) -> ExpressionFault {
    ExpressionFault::new(format!("{}(): {message}", function.name()))
}

fn scalar_arg(function: Function, args: &[Node], index: usize) -> Result<ScalarValue, ExpressionFault> {
    match args.get(index) {
        None => Ok(ScalarValue::Null),
        Some(Node::Scalar(value)) => Ok(value.clone()),
        Some(other) => Err(fault(
            function,
            format!("argument {} must be a scalar, got {}", index + 1, other.kind()),
        )),
    }
}

fn string_arg(function: Function, args: &[Node], index: usize) -> Result<Option<String>, ExpressionFault> {
    match scalar_arg(function, args, index)? {
        ScalarValue::Null => Ok(None),
        value => Ok(Some(value.to_string())),
    }
}

fn integer_arg(function: Function, args: &[Node], index: usize) -> Result<Option<i64>, ExpressionFault> {
    match scalar_arg(function, args, index)? {
        ScalarValue::Null => Ok(None),
        ScalarValue::Integer(i) => Ok(Some(i)),
        ScalarValue::Decimal(d) if d.fract().is_zero() => d
            .to_i64()
            .map(Some)
            .ok_or_else(|| fault(function, format!("{d} is out of range"))),
        other => Err(fault(
            function,
            format!("argument {} must be an integer, got {}", index + 1, other.type_name()),
        )),
    }
}

fn numeric_arg(function: Function, args: &[Node], index: usize) -> Result<Option<Numeric>, ExpressionFault> {
    let value = scalar_arg(function, args, index)?;
    if value.is_null() {
        return Ok(None);
    }
    Numeric::from_scalar(&value).map(Some).ok_or_else(|| {
        fault(
            function,
            format!("argument {} must be a number, got {}", index + 1, value.type_name()),
        )
    })
}

fn items(node: &Node) -> Vec<&Node> {
    match node {
        Node::Array(items) => items.iter().collect(),
        Node::Scalar(ScalarValue::Null) => Vec::new(),
        other => vec![other],
    }
}

fn string_result(value: Option<String>) -> Node {
    value.map_or_else(Node::placeholder, |text| Node::from(ScalarValue::String(text)))
}

/// Invoke a built-in with evaluated arguments
pub fn call(
    function: Function,
    args: Vec<Node>,
    cache: &mut ExecutionCache,
) -> Result<Node, ExpressionFault> {
    match function {
        Function::If => {
            let condition = args.first().is_some_and(truthy);
            let branch = if condition { 1 } else { 2 };
            Ok(args.into_iter().nth(branch).unwrap_or_default())
        }
        Function::Coalesce => Ok(args
            .into_iter()
            .find(|arg| !arg.is_placeholder())
            .unwrap_or_default()),
        Function::Concat => {
            let mut output = String::new();
            for arg in &args {
                output.push_str(&text_of(arg));
            }
            Ok(Node::from(ScalarValue::String(output)))
        }
        Function::Upper => Ok(string_result(
            string_arg(function, &args, 0)?.map(|s| s.to_uppercase()),
        )),
        Function::Lower => Ok(string_result(
            string_arg(function, &args, 0)?.map(|s| s.to_lowercase()),
        )),
        Function::Trim => Ok(string_result(
            string_arg(function, &args, 0)?.map(|s| s.trim().to_string()),
        )),
        Function::Length => {
            let length = match &args[0] {
                Node::Array(items) => items.len(),
                Node::Object(map) => map.len(),
                Node::Scalar(ScalarValue::Null) => 0,
                Node::Scalar(value) => value.to_string().chars().count(),
            };
            Ok(Node::from(ScalarValue::Integer(length as i64)))
        }
        Function::Substring => {
            let Some(text) = string_arg(function, &args, 0)? else {
                return Ok(Node::placeholder());
            };
            let start = integer_arg(function, &args, 1)?.unwrap_or(0).max(0) as usize;
            let chars = text.chars().skip(start);
            let result: String = match integer_arg(function, &args, 2)? {
                Some(length) => chars.take(length.max(0) as usize).collect(),
                None => chars.collect(),
            };
            Ok(Node::from(ScalarValue::String(result)))
        }
        Function::Replace => {
            let Some(text) = string_arg(function, &args, 0)? else {
                return Ok(Node::placeholder());
            };
            let pattern = string_arg(function, &args, 1)?.unwrap_or_default();
            let replacement = string_arg(function, &args, 2)?.unwrap_or_default();
            if pattern.is_empty() {
                return Ok(Node::from(ScalarValue::String(text)));
            }
            Ok(Node::from(ScalarValue::String(
                text.replace(&pattern, &replacement),
            )))
        }
        Function::Contains | Function::StartsWith | Function::EndsWith => {
            let (Some(text), Some(needle)) = (
                string_arg(function, &args, 0)?,
                string_arg(function, &args, 1)?,
            ) else {
                return Ok(Node::from(ScalarValue::Boolean(false)));
            };
            let found = match function {
                Function::Contains => text.contains(&needle),
                Function::StartsWith => text.starts_with(&needle),
                _ => text.ends_with(&needle),
            };
            Ok(Node::from(ScalarValue::Boolean(found)))
        }
        Function::Round => {
            let Some(number) = numeric_arg(function, &args, 0)? else {
                return Ok(Node::placeholder());
            };
            let digits = integer_arg(function, &args, 1)?.unwrap_or(0);
            if !(0..=28).contains(&digits) {
                return Err(fault(function, format!("invalid number of digits {digits}")));
            }
            Ok(match number {
                Numeric::Integer(i) => Node::from(ScalarValue::Integer(i)),
                Numeric::Decimal(d) => Node::from(ScalarValue::Decimal(
                    d.round_dp_with_strategy(digits as u32, RoundingStrategy::MidpointAwayFromZero),
                )),
            })
        }
        Function::Abs => match numeric_arg(function, &args, 0)? {
            None => Ok(Node::placeholder()),
            Some(Numeric::Integer(i)) => Ok(Node::from(
                i.checked_abs()
                    .map_or_else(|| ScalarValue::Decimal(Decimal::from(i).abs()), ScalarValue::Integer),
            )),
            Some(Numeric::Decimal(d)) => Ok(Node::from(ScalarValue::Decimal(d.abs()))),
        },
        Function::Floor | Function::Ceiling => match numeric_arg(function, &args, 0)? {
            None => Ok(Node::placeholder()),
            Some(Numeric::Integer(i)) => Ok(Node::from(ScalarValue::Integer(i))),
            Some(Numeric::Decimal(d)) => {
                let rounded = if function == Function::Floor {
                    d.floor()
                } else {
                    d.ceil()
                };
                Ok(Node::from(Numeric::Decimal(rounded).into_integral()))
            }
        },
        Function::Number => {
            let value = scalar_arg(function, &args, 0)?;
            let number = match &value {
                ScalarValue::Null => return Ok(Node::placeholder()),
                ScalarValue::Boolean(b) => Numeric::Integer(i64::from(*b)),
                ScalarValue::String(text) => parse_number(text.trim())
                    .ok_or_else(|| fault(function, format!("cannot convert '{text}' to a number")))?,
                other => Numeric::from_scalar(other).ok_or_else(|| {
                    fault(function, format!("cannot convert {} to a number", other.type_name()))
                })?,
            };
            Ok(Node::from(number.into_scalar()))
        }
        Function::Integer => {
            let value = scalar_arg(function, &args, 0)?;
            let number = match &value {
                ScalarValue::Null => return Ok(Node::placeholder()),
                ScalarValue::Boolean(b) => Numeric::Integer(i64::from(*b)),
                ScalarValue::String(text) => parse_number(text.trim())
                    .ok_or_else(|| fault(function, format!("cannot convert '{text}' to an integer")))?,
                other => Numeric::from_scalar(other).ok_or_else(|| {
                    fault(function, format!("cannot convert {} to an integer", other.type_name()))
                })?,
            };
            match number {
                Numeric::Integer(i) => Ok(Node::from(ScalarValue::Integer(i))),
                Numeric::Decimal(d) => d
                    .trunc()
                    .to_i64()
                    .map(|i| Node::from(ScalarValue::Integer(i)))
                    .ok_or_else(|| fault(function, format!("{d} is out of range"))),
            }
        }
        Function::String => match &args[0] {
            Node::Scalar(ScalarValue::Null) => Ok(Node::placeholder()),
            node => Ok(Node::from(ScalarValue::String(text_of(node)))),
        },
        Function::Count => Ok(Node::from(ScalarValue::Integer(items(&args[0]).len() as i64))),
        Function::Sum => {
            let mut total = Numeric::Integer(0);
            for item in items(&args[0]) {
                let value = match item {
                    Node::Scalar(ScalarValue::Null) => continue,
                    Node::Scalar(value) => value,
                    other => return Err(fault(function, format!("cannot sum {}", other.kind()))),
                };
                let number = Numeric::from_scalar(value)
                    .ok_or_else(|| fault(function, format!("cannot sum {}", value.type_name())))?;
                total = total
                    .add(number)
                    .ok_or_else(|| fault(function, "arithmetic overflow"))?;
            }
            Ok(Node::from(total.into_scalar()))
        }
        Function::First => Ok(items(&args[0]).first().map_or_else(Node::placeholder, |n| (*n).clone())),
        Function::Last => Ok(items(&args[0]).last().map_or_else(Node::placeholder, |n| (*n).clone())),
        Function::Join => {
            let separator = string_arg(function, &args, 1)?.unwrap_or_else(|| ",".to_string());
            let parts: Vec<String> = items(&args[0])
                .into_iter()
                .filter(|item| !item.is_placeholder())
                .map(text_of)
                .collect();
            Ok(Node::from(ScalarValue::String(parts.join(&separator))))
        }
        Function::Format => {
            let template = string_arg(function, &args, 0)?.unwrap_or_default();
            let value = scalar_arg(function, &args, 1)?;
            format_template(&template, &value)
                .map(|text| Node::from(ScalarValue::String(text)))
                .map_err(|err| fault(function, err))
        }
        Function::Get => {
            let key = string_arg(function, &args, 0)?.unwrap_or_default();
            match cache.get(&key) {
                Some(node) => Ok(node.clone()),
                None => Ok(args.into_iter().nth(1).unwrap_or_default()),
            }
        }
        Function::Set => {
            let key = string_arg(function, &args, 0)?
                .ok_or_else(|| fault(function, "key must not be null"))?;
            let value = args.into_iter().nth(1).unwrap_or_default();
            cache.set(key, value.clone());
            Ok(value)
        }
        Function::Has => {
            let key = string_arg(function, &args, 0)?.unwrap_or_default();
            Ok(Node::from(ScalarValue::Boolean(cache.contains(&key))))
        }
    }
}

fn parse_number(text: &str) -> Option<Numeric> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Numeric::Integer(i));
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
        .map(Numeric::Decimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(function: Function, args: Vec<Node>) -> Node {
        call(function, args, &mut ExecutionCache::new()).unwrap()
    }

    fn s(text: &str) -> Node {
        Node::from(ScalarValue::from(text))
    }

    #[test]
    fn test_resolve_checks_arity() {
        assert_eq!(Function::resolve("upper", 1), Ok(Function::Upper));
        assert_eq!(
            Function::resolve("upper", 2).unwrap_err().message,
            "function 'upper' expects 1 arguments, got 2"
        );
        assert_eq!(
            Function::resolve("if", 1).unwrap_err().message,
            "function 'if' expects 2-3 arguments, got 1"
        );
        assert!(Function::resolve("nope", 0).unwrap_err().message.contains("unknown function"));
        assert_eq!(Function::StartsWith.name(), "starts_with");
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(run(Function::Upper, vec![s("abc")]), s("ABC"));
        assert_eq!(run(Function::Upper, vec![Node::placeholder()]), Node::placeholder());
        assert_eq!(run(Function::Substring, vec![s("invoice"), Node::from(json!(2)), Node::from(json!(3))]), s("voi"));
        assert_eq!(run(Function::Replace, vec![s("a-b-c"), s("-"), s("/")]), s("a/b/c"));
        assert_eq!(run(Function::Concat, vec![s("n"), Node::from(json!(1)), Node::placeholder()]), s("n1"));
        assert_eq!(run(Function::Length, vec![s("héllo")]), Node::from(json!(5)));
    }

    #[test]
    fn test_numeric_functions() {
        assert_eq!(
            run(Function::Round, vec![Node::from(json!(2.345)), Node::from(json!(2))]),
            Node::from(ScalarValue::Decimal(Decimal::new(235, 2)))
        );
        assert_eq!(run(Function::Floor, vec![Node::from(json!(2.7))]), Node::from(json!(2)));
        assert_eq!(run(Function::Number, vec![s(" 12.5 ")]), Node::from(ScalarValue::Decimal(Decimal::new(125, 1))));
        assert_eq!(run(Function::Integer, vec![s("42")]), Node::from(json!(42)));
        assert!(call(Function::Number, vec![s("abc")], &mut ExecutionCache::new()).is_err());
    }

    #[test]
    fn test_collection_functions() {
        let list = Node::from(json!([1, 2, null, 3]));
        assert_eq!(run(Function::Count, vec![list.clone()]), Node::from(json!(4)));
        assert_eq!(run(Function::Sum, vec![list.clone()]), Node::from(json!(6)));
        assert_eq!(run(Function::First, vec![list.clone()]), Node::from(json!(1)));
        assert_eq!(run(Function::Join, vec![list, s("|")]), s("1|2|3"));
        assert_eq!(run(Function::Count, vec![Node::placeholder()]), Node::from(json!(0)));
    }

    #[test]
    fn test_cache_functions() {
        let mut cache = ExecutionCache::new();
        call(Function::Set, vec![s("rate"), Node::from(json!(3))], &mut cache).unwrap();
        assert_eq!(call(Function::Get, vec![s("rate")], &mut cache).unwrap(), Node::from(json!(3)));
        assert_eq!(call(Function::Get, vec![s("missing"), s("x")], &mut cache).unwrap(), s("x"));
        assert_eq!(
            call(Function::Has, vec![s("rate")], &mut cache).unwrap(),
            Node::from(json!(true))
        );
    }
}
