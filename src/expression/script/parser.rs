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

//! Pratt parser for value expressions

use std::str::FromStr;

use rust_decimal::Decimal;

use super::ast::{BinaryOperator, Expr, Root, UnaryOperator};
use super::functions::Function;
use super::tokenizer::{Spanned, Token, Tokenizer};
use crate::expression::ExpressionFault;
use crate::model::ScalarValue;

/// Operator precedence levels (higher = tighter binding)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// `??`, right associative
    Coalesce = 1,
    /// `||`
    Or = 2,
    /// `&&`
    And = 3,
    /// `==`, `!=`
    Equality = 4,
    /// `<`, `<=`, `>`, `>=`
    Comparison = 5,
    /// `+`, `-`
    Additive = 6,
    /// `*`, `/`, `%`
    Multiplicative = 7,
    /// Prefix `-` and `!`
    Unary = 8,
    /// Member access and indexing
    Postfix = 9,
}

impl Precedence {
    /// Next higher level, used for the right operand of left-associative operators
    pub const fn next_level(self) -> Self {
        match self {
            Precedence::Coalesce => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative => Precedence::Unary,
            Precedence::Unary => Precedence::Postfix,
            Precedence::Postfix => Precedence::Postfix,
        }
    }

    /// Whether operators of this level group to the right
    pub const fn is_right_associative(self) -> bool {
        matches!(self, Precedence::Coalesce)
    }
}

fn get_precedence(token: &Token<'_>) -> Option<Precedence> {
    match token {
        Token::Dot | Token::LeftBracket => Some(Precedence::Postfix),
        Token::Multiply | Token::Divide | Token::Modulo => Some(Precedence::Multiplicative),
        Token::Plus | Token::Minus => Some(Precedence::Additive),
        Token::LessThan
        | Token::LessThanOrEqual
        | Token::GreaterThan
        | Token::GreaterThanOrEqual => Some(Precedence::Comparison),
        Token::Equal | Token::NotEqual => Some(Precedence::Equality),
        Token::And => Some(Precedence::And),
        Token::Or => Some(Precedence::Or),
        Token::Coalesce => Some(Precedence::Coalesce),
        _ => None,
    }
}

fn token_to_binary_op(token: &Token<'_>) -> Option<BinaryOperator> {
    match token {
        Token::Plus => Some(BinaryOperator::Add),
        Token::Minus => Some(BinaryOperator::Subtract),
        Token::Multiply => Some(BinaryOperator::Multiply),
        Token::Divide => Some(BinaryOperator::Divide),
        Token::Modulo => Some(BinaryOperator::Modulo),
        Token::Equal => Some(BinaryOperator::Equal),
        Token::NotEqual => Some(BinaryOperator::NotEqual),
        Token::LessThan => Some(BinaryOperator::LessThan),
        Token::LessThanOrEqual => Some(BinaryOperator::LessThanOrEqual),
        Token::GreaterThan => Some(BinaryOperator::GreaterThan),
        Token::GreaterThanOrEqual => Some(BinaryOperator::GreaterThanOrEqual),
        Token::And => Some(BinaryOperator::And),
        Token::Or => Some(BinaryOperator::Or),
        Token::Coalesce => Some(BinaryOperator::Coalesce),
        _ => None,
    }
}

/// Pratt parser over a pre-tokenized expression
pub struct PrattParser<'input> {
    tokens: Vec<Spanned<'input>>,
    pos: usize,
    length: usize,
}

impl<'input> PrattParser<'input> {
    /// Tokenize `input` and prepare to parse it
    pub fn new(input: &'input str) -> Result<Self, ExpressionFault> {
        Ok(Self {
            tokens: Tokenizer::new(input).tokenize_all()?,
            pos: 0,
            length: input.len(),
        })
    }

    fn current(&self) -> Option<&Token<'input>> {
        self.tokens.get(self.pos).map(|spanned| &spanned.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.length, |spanned| spanned.position)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn error(&self, message: impl Into<String>) -> ExpressionFault {
        ExpressionFault::new(format!("{} at position {}", message.into(), self.position()))
    }

    fn expect(&mut self, expected: Token<'input>, what: &str) -> Result<(), ExpressionFault> {
        match self.current() {
            Some(token) if *token == expected => {
                self.advance();
                Ok(())
            }
            Some(token) => Err(self.error(format!("expected {what}, found {token:?}"))),
            None => Err(self.error(format!("expected {what}, found end of input"))),
        }
    }

    /// Parse the complete input as one expression
    pub fn parse(mut self) -> Result<Expr, ExpressionFault> {
        if self.tokens.is_empty() {
            return Err(self.error("empty expression"));
        }
        let expr = self.parse_expression(Precedence::Coalesce)?;
        if let Some(token) = self.current() {
            return Err(self.error(format!("unexpected {token:?}")));
        }
        Ok(expr)
    }

    fn parse_expression(&mut self, min_precedence: Precedence) -> Result<Expr, ExpressionFault> {
        let mut left = self.parse_prefix()?;

        while let Some(token) = self.current() {
            let precedence = match get_precedence(token) {
                Some(precedence) if precedence >= min_precedence => precedence,
                _ => break,
            };

            match token {
                Token::Dot => {
                    self.advance();
                    let name = match self.current() {
                        Some(Token::Identifier(name)) => name.to_string(),
                        Some(Token::String(name)) => name.to_string(),
                        _ => return Err(self.error("expected property name after '.'")),
                    };
                    self.advance();
                    left = Expr::member(left, name);
                }
                Token::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression(Precedence::Coalesce)?;
                    self.expect(Token::RightBracket, "']'")?;
                    left = Expr::index(left, index);
                }
                _ => {
                    let Some(op) = token_to_binary_op(token) else {
                        break;
                    };
                    self.advance();
                    let next = if precedence.is_right_associative() {
                        precedence
                    } else {
                        precedence.next_level()
                    };
                    let right = self.parse_expression(next)?;
                    left = Expr::binary(op, left, right);
                }
            }
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ExpressionFault> {
        let Some(token) = self.current().cloned() else {
            return Err(self.error("unexpected end of input"));
        };
        let start = self.position();
        self.advance();

        match token {
            Token::Integer(value) => Ok(Expr::Literal(ScalarValue::Integer(value))),
            Token::Decimal(text) => Decimal::from_str(text)
                .map(|value| Expr::Literal(ScalarValue::Decimal(value)))
                .map_err(|_| {
                    ExpressionFault::new(format!("invalid number '{text}' at position {start}"))
                }),
            Token::String(text) => Ok(Expr::Literal(ScalarValue::String(text.into_owned()))),
            Token::LeftParen => {
                let inner = self.parse_expression(Precedence::Coalesce)?;
                self.expect(Token::RightParen, "')'")?;
                Ok(inner)
            }
            Token::Minus => {
                let operand = self.parse_expression(Precedence::Unary)?;
                Ok(match operand {
                    Expr::Literal(ScalarValue::Integer(i)) => {
                        Expr::Literal(ScalarValue::Integer(-i))
                    }
                    Expr::Literal(ScalarValue::Decimal(d)) => {
                        Expr::Literal(ScalarValue::Decimal(-d))
                    }
                    other => Expr::unary(UnaryOperator::Negate, other),
                })
            }
            Token::Not => {
                let operand = self.parse_expression(Precedence::Unary)?;
                Ok(Expr::unary(UnaryOperator::Not, operand))
            }
            Token::Identifier(name) => {
                if self.current() == Some(&Token::LeftParen) {
                    self.advance();
                    let args = self.parse_arguments()?;
                    let function = Function::resolve(name, args.len()).map_err(|fault| {
                        ExpressionFault::new(format!("{} at position {start}", fault.message))
                    })?;
                    return Ok(Expr::Call(function, args));
                }
                match name {
                    "true" => Ok(Expr::Literal(ScalarValue::Boolean(true))),
                    "false" => Ok(Expr::Literal(ScalarValue::Boolean(false))),
                    "null" => Ok(Expr::Literal(ScalarValue::Null)),
                    _ => Root::from_name(name).map(Expr::Root).ok_or_else(|| {
                        ExpressionFault::new(format!(
                            "unknown identifier '{name}' at position {start}"
                        ))
                    }),
                }
            }
            other => Err(ExpressionFault::new(format!(
                "unexpected {other:?} at position {start}"
            ))),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ExpressionFault> {
        let mut args = Vec::new();
        if self.current() == Some(&Token::RightParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression(Precedence::Coalesce)?);
            match self.current() {
                Some(Token::Comma) => self.advance(),
                Some(Token::RightParen) => {
                    self.advance();
                    return Ok(args);
                }
                _ => return Err(self.error("expected ',' or ')' in argument list")),
            }
        }
    }
}

/// Parse an expression source into a syntax tree
pub fn parse_expression(input: &str) -> Result<Expr, ExpressionFault> {
    PrattParser::new(input)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(input: &str) -> String {
        parse_expression(input).unwrap().to_string()
    }

    #[test]
    fn test_precedence_ordering() {
        assert!(Precedence::Multiplicative > Precedence::Additive);
        assert!(Precedence::Additive > Precedence::Comparison);
        assert!(Precedence::Equality > Precedence::And);
        assert!(Precedence::And > Precedence::Or);
        assert!(Precedence::Or > Precedence::Coalesce);
    }

    #[test]
    fn test_binding() {
        assert_eq!(render("1 + 2 * 3"), "(1 + (2 * 3))");
        assert_eq!(render("10 - 4 - 3"), "((10 - 4) - 3)");
        assert_eq!(
            render("value.a ?? item['b'] ?? 0"),
            "(value.a ?? (item['b'] ?? 0))"
        );
        assert_eq!(render("-value.qty * 2"), "(-value.qty * 2)");
        assert_eq!(
            render("!has('k') || value == 1 && 2 < 3"),
            "(!has('k') || ((value == 1) && (2 < 3)))"
        );
    }

    #[test]
    fn test_literals_and_calls() {
        assert_eq!(
            parse_expression("-1.5").unwrap(),
            Expr::Literal(ScalarValue::Decimal(Decimal::new(-15, 1)))
        );
        assert_eq!(render("upper(concat('a', value))"), "upper(concat('a', value))");
        assert_eq!(render("request.lines[0].amount"), "request.lines[0].amount");
    }

    #[test]
    fn test_compile_errors() {
        let err = parse_expression("total + 1").unwrap_err();
        assert_eq!(err.message, "unknown identifier 'total' at position 0");
        let err = parse_expression("nope(1)").unwrap_err();
        assert_eq!(err.message, "unknown function 'nope' at position 0");
        let err = parse_expression("upper()").unwrap_err();
        assert!(err.message.contains("expects 1 arguments"));
        assert!(parse_expression("(1 + 2").is_err());
        assert!(parse_expression("1 2").is_err());
        assert!(parse_expression("   ").is_err());
    }
}
