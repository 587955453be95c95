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

//! Parsed path representation
//!
//! A [`Path`] is an ordered list of [`PathElement`]s, each naming an object
//! property and optionally indexing into the array held by that property.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use super::error::{PathError, PathResult};
use super::parser;

/// Index applied to a path element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum IndexToken {
    /// No indexer: the element addresses an object property
    #[default]
    None,
    /// A fixed array position, `[3]`
    Static(u32),
    /// A run of `*` characters, `[*]` / `[**]`; the run length distinguishes markers
    Wildcard(usize),
    /// A named tag used to correlate dimensions across paths, `[a1]`
    Named(String),
}

impl IndexToken {
    /// Whether this token indexes into an array
    pub fn is_indexed(&self) -> bool {
        !matches!(self, IndexToken::None)
    }

    /// Whether the position is decided at mapping time (wildcard or named)
    pub fn is_dynamic(&self) -> bool {
        matches!(self, IndexToken::Wildcard(_) | IndexToken::Named(_))
    }

    /// Tag used as a correlation and placement-hint key
    ///
    /// Static indices tag as their decimal text, wildcard runs as the run
    /// itself, named tags as the name.
    pub fn tag(&self) -> Option<Cow<'_, str>> {
        match self {
            IndexToken::None => None,
            IndexToken::Static(index) => Some(Cow::Owned(index.to_string())),
            IndexToken::Wildcard(run) => Some(Cow::Owned(wildcard_marker(*run))),
            IndexToken::Named(tag) => Some(Cow::Borrowed(tag.as_str())),
        }
    }

    /// Static index value, if any
    pub fn as_static(&self) -> Option<u32> {
        match self {
            IndexToken::Static(index) => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for IndexToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag() {
            Some(tag) => write!(f, "[{tag}]"),
            None => Ok(()),
        }
    }
}

/// Build the marker text for a wildcard run of the given length
pub fn wildcard_marker(run: usize) -> String {
    "*".repeat(run)
}

/// Whether a string is a wildcard marker (one or more `*`)
pub fn is_wildcard_marker(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c == '*')
}

/// Characters allowed in an unquoted property name
pub(crate) fn is_bare_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '@'
}

/// One step of a path: a property name plus an optional index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathElement {
    /// Object property name
    pub name: String,
    /// Index applied to the property value
    pub index: IndexToken,
}

impl PathElement {
    /// Create a new element
    pub fn new(name: impl Into<String>, index: IndexToken) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// Create an element addressing a plain property
    pub fn property(name: impl Into<String>) -> Self {
        Self::new(name, IndexToken::None)
    }

    /// Create an element addressing a fixed array position
    pub fn at(name: impl Into<String>, index: u32) -> Self {
        Self::new(name, IndexToken::Static(index))
    }

    /// Tag of this element's indexer
    pub fn tag(&self) -> Option<Cow<'_, str>> {
        self.index.tag()
    }

    fn name_is_bare(&self) -> bool {
        !self.name.is_empty() && self.name.chars().all(is_bare_name_char)
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name_is_bare() {
            write!(f, ".{}", self.name)?;
        } else {
            f.write_str("['")?;
            for c in self.name.chars() {
                if c == '\'' || c == '\\' {
                    f.write_str("\\")?;
                }
                write!(f, "{c}")?;
            }
            f.write_str("']")?;
        }
        write!(f, "{}", self.index)
    }
}

impl FromStr for PathElement {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_element(s)
    }
}

/// A validated path expression
///
/// Invariants, checked on construction:
/// - every wildcard run occurs at most once,
/// - every named tag occurs at most once,
/// - wildcard and named indexers never appear together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    elements: SmallVec<[PathElement; 4]>,
}

impl Path {
    /// Build a path from elements, checking the indexer invariants
    pub fn new(elements: impl IntoIterator<Item = PathElement>) -> PathResult<Self> {
        let path = Self {
            elements: elements.into_iter().collect(),
        };
        path.validate()?;
        Ok(path)
    }

    /// Build a concrete path whose indexers are all static
    pub(crate) fn concrete(elements: SmallVec<[PathElement; 4]>) -> Self {
        Self { elements }
    }

    /// Destination path for a tabular column: `$.<row>[*]['<title>']`
    pub fn tabular_column(row_property: &str, title: &str) -> Self {
        Self {
            elements: SmallVec::from_vec(vec![
                PathElement::new(row_property, IndexToken::Wildcard(1)),
                PathElement::property(title),
            ]),
        }
    }

    /// Elements in order
    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the path has no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Indexed elements with their position in the path
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &PathElement)> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, element)| element.index.is_indexed())
    }

    /// Whether the path contains any indexer
    pub fn has_indexers(&self) -> bool {
        self.indexed().next().is_some()
    }

    /// Whether the path can address more than one location
    pub fn is_multiple(&self) -> bool {
        self.elements.iter().any(|element| element.index.is_dynamic())
    }

    /// Tags of all indexed elements, in path order
    pub fn tags(&self) -> Vec<String> {
        self.indexed()
            .filter_map(|(_, element)| element.tag().map(Cow::into_owned))
            .collect()
    }

    fn validate(&self) -> PathResult<()> {
        let mut wildcards: FxHashSet<usize> = FxHashSet::default();
        let mut named: FxHashSet<&str> = FxHashSet::default();
        let mut first_wildcard: Option<usize> = None;
        let mut first_named: Option<&str> = None;

        for element in &self.elements {
            match &element.index {
                IndexToken::Wildcard(run) => {
                    if !wildcards.insert(*run) {
                        return Err(PathError::DuplicateWildcard {
                            marker: wildcard_marker(*run),
                        });
                    }
                    first_wildcard.get_or_insert(*run);
                }
                IndexToken::Named(tag) => {
                    if !named.insert(tag.as_str()) {
                        return Err(PathError::DuplicateTag { tag: tag.clone() });
                    }
                    first_named.get_or_insert(tag.as_str());
                }
                IndexToken::None | IndexToken::Static(_) => {}
            }
        }

        if let (Some(run), Some(tag)) = (first_wildcard, first_named) {
            return Err(PathError::MixedWildcardAndNamed {
                wildcard: wildcard_marker(run),
                named: tag.to_string(),
            });
        }

        Ok(())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for element in &self.elements {
            write!(f, "{element}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_path(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(IndexToken::None.tag(), None);
        assert_eq!(IndexToken::Static(3).tag().as_deref(), Some("3"));
        assert_eq!(IndexToken::Wildcard(2).tag().as_deref(), Some("**"));
        assert_eq!(
            IndexToken::Named("a1".to_string()).tag().as_deref(),
            Some("a1")
        );
    }

    #[test]
    fn test_display_quotes_non_bare_names() {
        let path = Path::new([
            PathElement::new("rows", IndexToken::Wildcard(1)),
            PathElement::property("Unit Price"),
            PathElement::property("it's"),
        ])
        .unwrap();
        assert_eq!(path.to_string(), r"$.rows[*]['Unit Price']['it\'s']");
    }

    #[test]
    fn test_validation() {
        let duplicate = Path::new([
            PathElement::new("a", IndexToken::Named("x".to_string())),
            PathElement::new("b", IndexToken::Named("x".to_string())),
        ]);
        assert_eq!(
            duplicate,
            Err(PathError::DuplicateTag {
                tag: "x".to_string()
            })
        );

        let distinct_runs = Path::new([
            PathElement::new("a", IndexToken::Wildcard(1)),
            PathElement::new("b", IndexToken::Wildcard(2)),
        ]);
        assert!(distinct_runs.is_ok());

        let mixed = Path::new([
            PathElement::new("a", IndexToken::Wildcard(1)),
            PathElement::new("b", IndexToken::Named("t".to_string())),
        ]);
        assert!(matches!(
            mixed,
            Err(PathError::MixedWildcardAndNamed { .. })
        ));
    }

    #[test]
    fn test_tabular_column() {
        let path = Path::tabular_column("row", "Net Amount");
        assert_eq!(path.to_string(), "$.row[*]['Net Amount']");
        assert!(path.is_multiple());
        assert_eq!(path.tags(), vec!["*".to_string()]);
    }
}
