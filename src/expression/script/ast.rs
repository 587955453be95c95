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

//! Syntax tree of value expressions

use std::fmt;

use super::functions::Function;
use crate::model::ScalarValue;

/// Named input an expression can start from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Root {
    /// Whole source document
    Request,
    /// Innermost source array item enclosing the value
    Item,
    /// The value being mapped
    Value,
}

impl Root {
    /// Resolve an identifier to a root
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "request" => Some(Root::Request),
            "item" => Some(Root::Item),
            "value" => Some(Root::Value),
            _ => None,
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// `-`
    Negate,
    /// `!`
    Not,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
    Coalesce,
}

impl BinaryOperator {
    /// Operator symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Coalesce => "??",
        }
    }
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal scalar
    Literal(ScalarValue),
    /// One of the named inputs
    Root(Root),
    /// `base.name`
    Member(Box<Expr>, String),
    /// `base[index]`
    Index(Box<Expr>, Box<Expr>),
    /// Prefix operator
    Unary(UnaryOperator, Box<Expr>),
    /// Infix operator
    Binary(BinaryOperator, Box<Expr>, Box<Expr>),
    /// Built-in function call, resolved at compile time
    Call(Function, Vec<Expr>),
}

impl Expr {
    pub(crate) fn member(base: Expr, name: impl Into<String>) -> Self {
        Expr::Member(Box::new(base), name.into())
    }

    pub(crate) fn index(base: Expr, index: Expr) -> Self {
        Expr::Index(Box::new(base), Box::new(index))
    }

    pub(crate) fn unary(op: UnaryOperator, operand: Expr) -> Self {
        Expr::Unary(op, Box::new(operand))
    }

    pub(crate) fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        Expr::Binary(op, Box::new(left), Box::new(right))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(ScalarValue::String(text)) => write!(f, "'{}'", text.replace('\'', "\\'")),
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Root(Root::Request) => f.write_str("request"),
            Expr::Root(Root::Item) => f.write_str("item"),
            Expr::Root(Root::Value) => f.write_str("value"),
            Expr::Member(base, name) => write!(f, "{base}.{name}"),
            Expr::Index(base, index) => write!(f, "{base}[{index}]"),
            Expr::Unary(UnaryOperator::Negate, operand) => write!(f, "-{operand}"),
            Expr::Unary(UnaryOperator::Not, operand) => write!(f, "!{operand}"),
            Expr::Binary(op, left, right) => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Call(function, args) => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
