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

//! Path-driven tree reader
//!
//! [`read`] expands a path against the actual shape of a source tree and
//! yields every scalar it reaches, in document order. Each value carries the
//! concrete path it was found at, with every indexer replaced by the static
//! position of the item, so later stages can correlate array dimensions.

use smallvec::SmallVec;

use crate::model::{Node, ScalarValue};
use crate::path::{IndexToken, Path, PathElement};

/// A scalar read from a source tree together with its concrete location
#[derive(Debug, Clone, PartialEq)]
pub struct SourceValue {
    /// Concrete path; every indexer is [`IndexToken::Static`]
    pub path: Path,
    /// The scalar found there
    pub value: ScalarValue,
}

impl SourceValue {
    /// Concrete array position of the element at `position` in the path
    pub fn index_at(&self, position: usize) -> Option<usize> {
        self.path
            .elements()
            .get(position)
            .and_then(|element| element.index.as_static())
            .map(|index| index as usize)
    }
}

/// Read every scalar addressed by `path`
///
/// The returned iterator is lazy and cheap to clone; cloning it before
/// consumption restarts the read from the same position.
pub fn read<'a>(source: &'a Node, path: &'a Path) -> Reader<'a> {
    Reader {
        path,
        stack: vec![Frame {
            node: source,
            depth: 0,
            prefix: SmallVec::new(),
        }],
    }
}

#[derive(Debug, Clone)]
struct Frame<'a> {
    node: &'a Node,
    depth: usize,
    prefix: SmallVec<[PathElement; 4]>,
}

/// Lazy depth-first expansion of a path over a tree
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    path: &'a Path,
    stack: Vec<Frame<'a>>,
}

impl<'a> Reader<'a> {
    fn push_child(&mut self, frame: &Frame<'a>, node: &'a Node, element: PathElement) {
        let mut prefix = frame.prefix.clone();
        prefix.push(element);
        self.stack.push(Frame {
            node,
            depth: frame.depth + 1,
            prefix,
        });
    }
}

impl Iterator for Reader<'_> {
    type Item = SourceValue;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.path;
        while let Some(frame) = self.stack.pop() {
            let Some(element) = path.elements().get(frame.depth) else {
                // Path exhausted: only scalars are yielded
                if let Node::Scalar(value) = frame.node {
                    return Some(SourceValue {
                        path: Path::concrete(frame.prefix),
                        value: value.clone(),
                    });
                }
                continue;
            };

            let Some(child) = frame.node.get(&element.name) else {
                continue;
            };

            match &element.index {
                IndexToken::None => {
                    self.push_child(&frame, child, PathElement::property(element.name.as_str()));
                }
                IndexToken::Static(index) => {
                    if let Some(item) = child.item(*index as usize) {
                        self.push_child(&frame, item, PathElement::at(element.name.as_str(), *index));
                    }
                }
                IndexToken::Wildcard(_) | IndexToken::Named(_) => {
                    if let Some(items) = child.as_array() {
                        // reversed so the stack pops items in document order
                        for (index, item) in items.iter().enumerate().rev() {
                            let Ok(index) = u32::try_from(index) else {
                                continue;
                            };
                            self.push_child(&frame, item, PathElement::at(element.name.as_str(), index));
                        }
                    }
                }
            }
        }
        None
    }
}

/// Innermost array item enclosing the location of a concrete path
///
/// Returns the root when the path crosses no array, and `None` when the path
/// does not resolve in `source`.
pub fn enclosing_item<'a>(source: &'a Node, path: &Path) -> Option<&'a Node> {
    let mut current = source;
    let mut enclosing = source;
    for element in path.elements() {
        current = current.get(&element.name)?;
        if let Some(index) = element.index.as_static() {
            current = current.item(index as usize)?;
            enclosing = current;
        }
    }
    Some(enclosing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::parse_path;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fixture() -> Node {
        Node::from(json!({
            "lines": [
                { "sku": "A", "tax": [{ "rate": 5 }, { "rate": 7 }] },
                { "sku": "B", "tax": [{ "rate": 9 }] },
                { "sku": "C" }
            ],
            "total": 21
        }))
    }

    #[test]
    fn test_read_scalar() {
        let source = fixture();
        let path = parse_path("$.total").unwrap();
        let values: Vec<_> = read(&source, &path).collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, ScalarValue::Integer(21));
        assert_eq!(values[0].path.to_string(), "$.total");
    }

    #[test]
    fn test_wildcards_expand_in_document_order() {
        let source = fixture();
        let path = parse_path("$.lines[*].tax[**].rate").unwrap();
        let values: Vec<_> = read(&source, &path)
            .map(|v| (v.path.to_string(), v.value))
            .collect();
        assert_eq!(
            values,
            vec![
                ("$.lines[0].tax[0].rate".to_string(), ScalarValue::Integer(5)),
                ("$.lines[0].tax[1].rate".to_string(), ScalarValue::Integer(7)),
                ("$.lines[1].tax[0].rate".to_string(), ScalarValue::Integer(9)),
            ]
        );
    }

    #[test]
    fn test_static_index_and_restart() {
        let source = fixture();
        let path = parse_path("$.lines[1].sku").unwrap();
        let reader = read(&source, &path);
        let again = reader.clone();
        assert_eq!(reader.count(), 1);
        assert_eq!(again.map(|v| v.value).collect::<Vec<_>>(), vec![ScalarValue::from("B")]);
    }

    #[test]
    fn test_missing_and_container_leaves_yield_nothing() {
        let source = fixture();
        assert_eq!(read(&source, &parse_path("$.nope[*].x").unwrap()).count(), 0);
        assert_eq!(read(&source, &parse_path("$.lines[*]").unwrap()).count(), 0);
        assert_eq!(read(&source, &parse_path("$.lines[7].sku").unwrap()).count(), 0);
    }

    #[test]
    fn test_enclosing_item() {
        let source = fixture();
        let path = parse_path("$.lines[a1].tax[a2].rate").unwrap();
        let value = read(&source, &path).nth(1).unwrap();
        assert_eq!(value.index_at(1), Some(1));
        let item = enclosing_item(&source, &value.path).unwrap();
        assert_eq!(item.to_json(), json!({ "rate": 7 }));

        let total = read(&source, &parse_path("$.total").unwrap()).next().unwrap();
        assert_eq!(enclosing_item(&source, &total.path), Some(&source));
    }
}
