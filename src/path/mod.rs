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

//! Path addressing language
//!
//! Paths select locations in a JSON tree: `$.invoice.lines[a1].tax[a2]`.
//! Indexers are static positions, wildcard runs (`*`, `**`, ...) or named
//! tags used to correlate array dimensions between a source and a
//! destination path.

pub mod element;
pub mod error;
pub mod parser;
pub mod span;

pub use element::{IndexToken, Path, PathElement, is_wildcard_marker, wildcard_marker};
pub use error::{PathError, PathResult};
pub use parser::{parse_element, parse_path};

use crate::error::{MappingError, Result};

/// Parse a path, wrapping grammar failures with the offending text
pub fn parse(input: &str) -> Result<Path> {
    parse_path(input).map_err(|source| MappingError::grammar(input, source))
}
