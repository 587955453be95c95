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

//! Tree-walking evaluator for value expressions
//!
//! Values are [`Node`]s. Member access and indexing on the wrong kind of node
//! yield null instead of failing, so optional source properties can be probed
//! with `??`. Arithmetic on integers is checked and falls back to decimals on
//! overflow; division by zero and operations on incompatible types are
//! faults.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::ast::{BinaryOperator, Expr, Root, UnaryOperator};
use super::functions::{self, Function};
use crate::expression::{ExecutionCache, ExpressionFault, ExpressionInputs};
use crate::model::{Node, ScalarValue};

/// Numeric operand
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Integer(i64),
    Decimal(Decimal),
}

impl Numeric {
    /// Numeric view of a scalar
    pub fn from_scalar(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Integer(i) => Some(Numeric::Integer(*i)),
            ScalarValue::Decimal(d) => Some(Numeric::Decimal(*d)),
            _ => None,
        }
    }

    fn as_decimal(self) -> Decimal {
        match self {
            Numeric::Integer(i) => Decimal::from(i),
            Numeric::Decimal(d) => d,
        }
    }

    fn combine(
        self,
        other: Numeric,
        integer: fn(i64, i64) -> Option<i64>,
        decimal: fn(Decimal, Decimal) -> Option<Decimal>,
    ) -> Option<Numeric> {
        if let (Numeric::Integer(a), Numeric::Integer(b)) = (self, other) {
            if let Some(result) = integer(a, b) {
                return Some(Numeric::Integer(result));
            }
        }
        decimal(self.as_decimal(), other.as_decimal()).map(Numeric::Decimal)
    }

    /// Checked addition
    pub fn add(self, other: Numeric) -> Option<Numeric> {
        self.combine(other, i64::checked_add, Decimal::checked_add)
    }

    fn subtract(self, other: Numeric) -> Option<Numeric> {
        self.combine(other, i64::checked_sub, Decimal::checked_sub)
    }

    fn multiply(self, other: Numeric) -> Option<Numeric> {
        self.combine(other, i64::checked_mul, Decimal::checked_mul)
    }

    fn divide(self, other: Numeric) -> Option<Numeric> {
        let exact = |a: i64, b: i64| (a.checked_rem(b)? == 0).then(|| a.checked_div(b)).flatten();
        self.combine(other, exact, Decimal::checked_div)
    }

    fn remainder(self, other: Numeric) -> Option<Numeric> {
        self.combine(other, i64::checked_rem, Decimal::checked_rem)
    }

    fn is_zero(self) -> bool {
        match self {
            Numeric::Integer(i) => i == 0,
            Numeric::Decimal(d) => d.is_zero(),
        }
    }

    fn compare(self, other: Numeric) -> Ordering {
        match (self, other) {
            (Numeric::Integer(a), Numeric::Integer(b)) => a.cmp(&b),
            _ => self.as_decimal().cmp(&other.as_decimal()),
        }
    }

    /// Scalar holding this number
    pub fn into_scalar(self) -> ScalarValue {
        match self {
            Numeric::Integer(i) => ScalarValue::Integer(i),
            Numeric::Decimal(d) => ScalarValue::Decimal(d),
        }
    }

    /// Scalar holding this number, as an integer when it has no fraction
    pub fn into_integral(self) -> ScalarValue {
        match self {
            Numeric::Decimal(d) if d.fract().is_zero() => d
                .to_i64()
                .map_or(ScalarValue::Decimal(d), ScalarValue::Integer),
            other => other.into_scalar(),
        }
    }
}

/// Truthiness used by `!`, `&&`, `||` and `if`
pub fn truthy(node: &Node) -> bool {
    match node {
        Node::Scalar(ScalarValue::Null) => false,
        Node::Scalar(ScalarValue::Boolean(b)) => *b,
        Node::Scalar(ScalarValue::Integer(i)) => *i != 0,
        Node::Scalar(ScalarValue::Decimal(d)) => !d.is_zero(),
        Node::Scalar(ScalarValue::String(s)) => !s.is_empty(),
        Node::Scalar(_) => true,
        Node::Array(items) => !items.is_empty(),
        Node::Object(map) => !map.is_empty(),
    }
}

/// Text rendering used by string concatenation; null renders empty
pub fn text_of(node: &Node) -> String {
    match node {
        Node::Scalar(ScalarValue::Null) => String::new(),
        Node::Scalar(value) => value.to_string(),
        container => container.to_json().to_string(),
    }
}

/// Evaluation state for one expression call
pub struct Evaluator<'a, 'c> {
    inputs: &'a ExpressionInputs<'a>,
    cache: &'c mut ExecutionCache,
}

impl<'a, 'c> Evaluator<'a, 'c> {
    /// Create an evaluator over the given inputs and scratch cache
    pub fn new(inputs: &'a ExpressionInputs<'a>, cache: &'c mut ExecutionCache) -> Self {
        Self { inputs, cache }
    }

    /// Evaluate an expression
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Node, ExpressionFault> {
        match expr {
            Expr::Literal(value) => Ok(Node::from(value.clone())),
            Expr::Root(root) => Ok(self.root(*root).clone()),
            Expr::Member(base, name) => {
                let base = self.evaluate(base)?;
                Ok(base.get(name).cloned().unwrap_or_default())
            }
            Expr::Index(base, index) => {
                let base = self.evaluate(base)?;
                let index = self.evaluate(index)?;
                Ok(index_node(&base, &index).cloned().unwrap_or_default())
            }
            Expr::Unary(op, operand) => {
                let operand = self.evaluate(operand)?;
                unary(*op, &operand)
            }
            Expr::Binary(op, left, right) => self.binary(*op, left, right),
            Expr::Call(function, args) => self.call(*function, args),
        }
    }

    fn root(&self, root: Root) -> &'a Node {
        match root {
            Root::Request => self.inputs.request,
            Root::Item => self.inputs.item,
            Root::Value => self.inputs.value,
        }
    }

    fn binary(&mut self, op: BinaryOperator, left: &Expr, right: &Expr) -> Result<Node, ExpressionFault> {
        match op {
            BinaryOperator::And => {
                let result = truthy(&self.evaluate(left)?) && truthy(&self.evaluate(right)?);
                return Ok(Node::from(ScalarValue::Boolean(result)));
            }
            BinaryOperator::Or => {
                let result = truthy(&self.evaluate(left)?) || truthy(&self.evaluate(right)?);
                return Ok(Node::from(ScalarValue::Boolean(result)));
            }
            BinaryOperator::Coalesce => {
                let left = self.evaluate(left)?;
                return if left.is_placeholder() {
                    self.evaluate(right)
                } else {
                    Ok(left)
                };
            }
            _ => {}
        }

        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;
        match op {
            BinaryOperator::Equal => Ok(Node::from(ScalarValue::Boolean(nodes_equal(&left, &right)))),
            BinaryOperator::NotEqual => Ok(Node::from(ScalarValue::Boolean(!nodes_equal(&left, &right)))),
            BinaryOperator::LessThan
            | BinaryOperator::LessThanOrEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanOrEqual => {
                let result = compare(&left, &right).is_some_and(|ordering| match op {
                    BinaryOperator::LessThan => ordering == Ordering::Less,
                    BinaryOperator::LessThanOrEqual => ordering != Ordering::Greater,
                    BinaryOperator::GreaterThan => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                });
                Ok(Node::from(ScalarValue::Boolean(result)))
            }
            _ => arithmetic(op, &left, &right),
        }
    }

    fn call(&mut self, function: Function, args: &[Expr]) -> Result<Node, ExpressionFault> {
        match function {
            Function::If => {
                let condition = truthy(&self.evaluate(&args[0])?);
                match (condition, args.get(2)) {
                    (true, _) => self.evaluate(&args[1]),
                    (false, Some(otherwise)) => self.evaluate(otherwise),
                    (false, None) => Ok(Node::placeholder()),
                }
            }
            Function::Coalesce => {
                for arg in args {
                    let value = self.evaluate(arg)?;
                    if !value.is_placeholder() {
                        return Ok(value);
                    }
                }
                Ok(Node::placeholder())
            }
            _ => {
                let values = args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                functions::call(function, values, self.cache)
            }
        }
    }
}

fn index_node<'n>(base: &'n Node, index: &Node) -> Option<&'n Node> {
    match index.as_scalar()? {
        ScalarValue::Integer(i) => {
            let items = base.as_array()?;
            let position = if *i < 0 {
                items.len().checked_sub(i.unsigned_abs() as usize)?
            } else {
                *i as usize
            };
            items.get(position)
        }
        ScalarValue::String(name) => base.get(name),
        _ => None,
    }
}

fn unary(op: UnaryOperator, operand: &Node) -> Result<Node, ExpressionFault> {
    match op {
        UnaryOperator::Not => Ok(Node::from(ScalarValue::Boolean(!truthy(operand)))),
        UnaryOperator::Negate => match operand {
            Node::Scalar(ScalarValue::Null) => Ok(Node::placeholder()),
            Node::Scalar(ScalarValue::Integer(i)) => Ok(Node::from(
                i.checked_neg()
                    .map_or_else(|| ScalarValue::Decimal(-Decimal::from(*i)), ScalarValue::Integer),
            )),
            Node::Scalar(ScalarValue::Decimal(d)) => Ok(Node::from(ScalarValue::Decimal(-*d))),
            other => Err(ExpressionFault::new(format!("cannot negate {}", other.kind()))),
        },
    }
}

fn nodes_equal(left: &Node, right: &Node) -> bool {
    match (left, right) {
        (Node::Scalar(a), Node::Scalar(b)) => match (Numeric::from_scalar(a), Numeric::from_scalar(b)) {
            (Some(a), Some(b)) => a.compare(b) == Ordering::Equal,
            _ => a == b,
        },
        _ => left == right,
    }
}

fn compare(left: &Node, right: &Node) -> Option<Ordering> {
    let (Node::Scalar(a), Node::Scalar(b)) = (left, right) else {
        return None;
    };
    if let (Some(a), Some(b)) = (Numeric::from_scalar(a), Numeric::from_scalar(b)) {
        return Some(a.compare(b));
    }
    match (a, b) {
        (ScalarValue::String(a), ScalarValue::String(b)) => Some(a.cmp(b)),
        (ScalarValue::Date(a), ScalarValue::Date(b)) => Some(a.cmp(b)),
        (ScalarValue::DateTime(a), ScalarValue::DateTime(b)) => Some(a.cmp(b)),
        (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn arithmetic(op: BinaryOperator, left: &Node, right: &Node) -> Result<Node, ExpressionFault> {
    let incompatible = || {
        ExpressionFault::new(format!(
            "operator '{}' cannot be applied to {} and {}",
            op.symbol(),
            left.kind(),
            right.kind()
        ))
    };

    let (Node::Scalar(a), Node::Scalar(b)) = (left, right) else {
        return Err(incompatible());
    };

    if op == BinaryOperator::Add
        && (matches!(a, ScalarValue::String(_)) || matches!(b, ScalarValue::String(_)))
    {
        return Ok(Node::from(ScalarValue::String(format!(
            "{}{}",
            text_of(left),
            text_of(right)
        ))));
    }

    if a.is_null() || b.is_null() {
        return Ok(Node::placeholder());
    }

    let (Some(a), Some(b)) = (Numeric::from_scalar(a), Numeric::from_scalar(b)) else {
        return Err(incompatible());
    };

    if matches!(op, BinaryOperator::Divide | BinaryOperator::Modulo) && b.is_zero() {
        return Err(ExpressionFault::new("division by zero"));
    }

    let result = match op {
        BinaryOperator::Add => a.add(b),
        BinaryOperator::Subtract => a.subtract(b),
        BinaryOperator::Multiply => a.multiply(b),
        BinaryOperator::Divide => a.divide(b),
        BinaryOperator::Modulo => a.remainder(b),
        _ => return Err(incompatible()),
    };
    result
        .map(|number| Node::from(number.into_scalar()))
        .ok_or_else(|| ExpressionFault::new(format!("arithmetic overflow in '{}'", op.symbol())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_overflow_widens_to_decimal() {
        let sum = Numeric::Integer(i64::MAX).add(Numeric::Integer(1)).unwrap();
        assert_eq!(sum, Numeric::Decimal(Decimal::from(i64::MAX) + Decimal::ONE));
        assert_eq!(
            Numeric::Integer(7).divide(Numeric::Integer(2)),
            Some(Numeric::Decimal(Decimal::new(35, 1)))
        );
        assert_eq!(Numeric::Integer(8).divide(Numeric::Integer(2)), Some(Numeric::Integer(4)));
    }

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&Node::placeholder()));
        assert!(!truthy(&Node::from(ScalarValue::from(""))));
        assert!(truthy(&Node::from(ScalarValue::from("x"))));
        assert!(!truthy(&Node::from(ScalarValue::Integer(0))));
        assert!(!truthy(&Node::Array(Vec::new())));
    }

    #[test]
    fn test_index_node() {
        let list = Node::from(serde_json::json!([1, 2, 3]));
        let last = index_node(&list, &Node::from(ScalarValue::Integer(-1)));
        assert_eq!(last, Some(&Node::from(ScalarValue::Integer(3))));
        assert_eq!(index_node(&list, &Node::from(ScalarValue::Integer(5))), None);
    }
}
