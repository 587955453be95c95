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

//! Path parser error types

use nom::error::{ErrorKind, ParseError as NomParseError};
use thiserror::Error;

use super::span::{Span, position};

/// Result type for path parsing
pub type PathResult<T> = Result<T, PathError>;

/// Errors raised while parsing or validating a path expression
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Input does not follow the path grammar
    #[error("Syntax error at position {position}: {message}")]
    Syntax {
        /// Byte offset where parsing stopped
        position: usize,
        /// Error message describing the syntax error
        message: String,
    },

    /// A quoted property name is missing its closing `']`
    #[error("Unterminated property literal starting at position {position}")]
    UnterminatedLiteral {
        /// Byte offset of the opening `['`
        position: usize,
    },

    /// A static index does not fit in 32 bits
    #[error("Index {digits} at position {position} is out of range")]
    IndexOverflow {
        /// Byte offset of the index
        position: usize,
        /// Digits as written
        digits: String,
    },

    /// The same named tag appears twice
    #[error("Named index '{tag}' is used more than once")]
    DuplicateTag {
        /// Repeated tag
        tag: String,
    },

    /// The same wildcard run appears twice
    #[error("Wildcard index '{marker}' is used more than once")]
    DuplicateWildcard {
        /// Repeated wildcard marker
        marker: String,
    },

    /// Wildcard and named indexers mixed in one path
    #[error("Wildcard index '{wildcard}' cannot be combined with named index '{named}'")]
    MixedWildcardAndNamed {
        /// First wildcard marker found
        wildcard: String,
        /// First named tag found
        named: String,
    },
}

impl PathError {
    /// Create a syntax error
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Create an unterminated literal error
    pub fn unterminated_literal(position: usize) -> Self {
        Self::UnterminatedLiteral { position }
    }
}

/// Implement nom's ParseError trait so combinators report positions directly
impl<'a> NomParseError<Span<'a>> for PathError {
    fn from_error_kind(input: Span<'a>, kind: ErrorKind) -> Self {
        let rest = input.fragment();
        let message = if rest.is_empty() {
            format!("unexpected end of input ({kind:?})")
        } else {
            let snippet: String = rest.chars().take(12).collect();
            format!("unexpected input '{snippet}' ({kind:?})")
        };
        PathError::syntax(position(&input), message)
    }

    fn append(_input: Span<'a>, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}
