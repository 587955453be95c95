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

//! Tokenizer for value expressions

use std::borrow::Cow;

use unicode_xid::UnicodeXID;

use crate::expression::ExpressionFault;

/// Token of the expression language
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'input> {
    /// Integer literal
    Integer(i64),
    /// Decimal literal text, parsed by the parser
    Decimal(&'input str),
    /// String literal with escapes resolved
    String(Cow<'input, str>),
    /// Identifier or keyword
    Identifier(&'input str),
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `!`
    Not,
    /// `??`
    Coalesce,
}

/// Token with its byte offset in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<'input> {
    /// The token
    pub token: Token<'input>,
    /// Byte offset of the first character
    pub position: usize,
}

/// Pull-based tokenizer
pub struct Tokenizer<'input> {
    input: &'input str,
    bytes: &'input [u8],
    pos: usize,
}

impl<'input> Tokenizer<'input> {
    /// Create a tokenizer over `input`
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenize the whole input
    pub fn tokenize_all(mut self) -> Result<Vec<Spanned<'input>>, ExpressionFault> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn error(&self, position: usize, message: impl Into<String>) -> ExpressionFault {
        ExpressionFault::new(format!("{} at position {position}", message.into()))
    }

    /// Next token, `None` at end of input
    pub fn next_token(&mut self) -> Result<Option<Spanned<'input>>, ExpressionFault> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(&byte) = self.bytes.get(start) else {
            return Ok(None);
        };
        let next = self.bytes.get(start + 1).copied();

        let (token, width) = match (byte, next) {
            (b'.', _) => (Token::Dot, 1),
            (b',', _) => (Token::Comma, 1),
            (b'(', _) => (Token::LeftParen, 1),
            (b')', _) => (Token::RightParen, 1),
            (b'[', _) => (Token::LeftBracket, 1),
            (b']', _) => (Token::RightBracket, 1),
            (b'+', _) => (Token::Plus, 1),
            (b'-', _) => (Token::Minus, 1),
            (b'*', _) => (Token::Multiply, 1),
            (b'/', _) => (Token::Divide, 1),
            (b'%', _) => (Token::Modulo, 1),
            (b'=', Some(b'=')) => (Token::Equal, 2),
            (b'!', Some(b'=')) => (Token::NotEqual, 2),
            (b'!', _) => (Token::Not, 1),
            (b'<', Some(b'=')) => (Token::LessThanOrEqual, 2),
            (b'<', _) => (Token::LessThan, 1),
            (b'>', Some(b'=')) => (Token::GreaterThanOrEqual, 2),
            (b'>', _) => (Token::GreaterThan, 1),
            (b'&', Some(b'&')) => (Token::And, 2),
            (b'|', Some(b'|')) => (Token::Or, 2),
            (b'?', Some(b'?')) => (Token::Coalesce, 2),
            (b'\'' | b'"', _) => return self.string(byte).map(Some),
            (b'0'..=b'9', _) => return self.number().map(Some),
            _ => return self.identifier().map(Some),
        };

        self.pos += width;
        Ok(Some(Spanned {
            token,
            position: start,
        }))
    }

    fn number(&mut self) -> Result<Spanned<'input>, ExpressionFault> {
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }

        let is_decimal = self.bytes.get(self.pos) == Some(&b'.')
            && self
                .bytes
                .get(self.pos + 1)
                .is_some_and(|b| b.is_ascii_digit());
        if is_decimal {
            self.pos += 1;
            while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
            return Ok(Spanned {
                token: Token::Decimal(&self.input[start..self.pos]),
                position: start,
            });
        }

        let text = &self.input[start..self.pos];
        let token = match text.parse::<i64>() {
            Ok(value) => Token::Integer(value),
            Err(_) => Token::Decimal(text),
        };
        Ok(Spanned {
            token,
            position: start,
        })
    }

    fn string(&mut self, quote: u8) -> Result<Spanned<'input>, ExpressionFault> {
        let start = self.pos;
        self.pos += 1;
        let content_start = self.pos;
        let mut owned: Option<String> = None;

        loop {
            let Some(&byte) = self.bytes.get(self.pos) else {
                return Err(self.error(start, "unterminated string literal"));
            };

            if byte == quote {
                let token = match owned {
                    Some(text) => Token::String(Cow::Owned(text)),
                    None => Token::String(Cow::Borrowed(&self.input[content_start..self.pos])),
                };
                self.pos += 1;
                return Ok(Spanned {
                    token,
                    position: start,
                });
            }

            if byte == b'\\' {
                let text =
                    owned.get_or_insert_with(|| self.input[content_start..self.pos].to_string());
                let escaped = match self.bytes.get(self.pos + 1) {
                    Some(b'n') => '\n',
                    Some(b't') => '\t',
                    Some(b'r') => '\r',
                    Some(b'\\') => '\\',
                    Some(b'\'') => '\'',
                    Some(b'"') => '"',
                    Some(_) => return Err(self.error(self.pos, "invalid escape sequence")),
                    None => return Err(self.error(start, "unterminated string literal")),
                };
                text.push(escaped);
                self.pos += 2;
                continue;
            }

            let ch_len = self.input[self.pos..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
            if let Some(text) = owned.as_mut() {
                text.push_str(&self.input[self.pos..self.pos + ch_len]);
            }
            self.pos += ch_len;
        }
    }

    fn identifier(&mut self) -> Result<Spanned<'input>, ExpressionFault> {
        let start = self.pos;
        let mut chars = self.input[start..].char_indices();
        match chars.next() {
            Some((_, c)) if c == '_' || c.is_xid_start() => {}
            Some((_, c)) => return Err(self.error(start, format!("unexpected character '{c}'"))),
            None => return Err(self.error(start, "unexpected end of input")),
        }

        let end = chars
            .find(|(_, c)| !c.is_xid_continue())
            .map_or(self.input.len(), |(offset, _)| start + offset);
        self.pos = end;
        Ok(Spanned {
            token: Token::Identifier(&self.input[start..end]),
            position: start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        Tokenizer::new(input)
            .tokenize_all()
            .unwrap()
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn test_operators_and_literals() {
        assert_eq!(
            tokens("value.qty * 2.5 >= 10 ?? 'n/a'"),
            vec![
                Token::Identifier("value"),
                Token::Dot,
                Token::Identifier("qty"),
                Token::Multiply,
                Token::Decimal("2.5"),
                Token::GreaterThanOrEqual,
                Token::Integer(10),
                Token::Coalesce,
                Token::String(Cow::Borrowed("n/a")),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#"'it\'s' "a\nb""#),
            vec![
                Token::String(Cow::Owned("it's".to_string())),
                Token::String(Cow::Owned("a\nb".to_string())),
            ]
        );
    }

    #[test]
    fn test_errors_carry_position() {
        let err = Tokenizer::new("1 + 'abc").tokenize_all().unwrap_err();
        assert_eq!(err.message, "unterminated string literal at position 4");
        let err = Tokenizer::new("a # b").tokenize_all().unwrap_err();
        assert!(err.message.contains("position 2"));
    }
}
