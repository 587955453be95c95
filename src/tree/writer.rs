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

//! Create-on-write tree writer
//!
//! The writer walks a destination path, creating objects and arrays as it
//! goes and reifying arrays up to the index each element resolves to.
//! Index resolution per indexed element:
//!
//! | indexer | hint | resolved position |
//! |---|---|---|
//! | static `[i]` | ignored | `i` |
//! | any tag | `Some(i)` | `i` |
//! | any tag | `None` | append |
//! | wildcard run | absent | append |
//! | named tag | absent | last item (created if the array is empty) |

use rustc_hash::FxHashSet;

use crate::error::{MappingError, Result};
use crate::mapping::hints::PlacementHints;
use crate::model::{Node, ScalarValue};
use crate::path::{IndexToken, Path};

/// Write `value` at `path`, returning whether more slots remain
///
/// The return value is `true` when some array position on the path was
/// resolved for a tag in `dynamic_tags` and the array already holds items
/// beyond that position. Callers use it to keep writing the same value into
/// the following slots.
pub fn write(
    target: &mut Node,
    path: &Path,
    value: ScalarValue,
    hints: &PlacementHints,
    dynamic_tags: &FxHashSet<String>,
) -> Result<bool> {
    let mut current = target;
    let mut more = false;

    for element in path.elements() {
        let node = current;
        let Some(object) = node.coerce_to_object() else {
            return Err(MappingError::path_conflict(
                path.to_string(),
                format!("expected an object holding '{}' but found an array", element.name),
            ));
        };
        let slot = object
            .entry(element.name.clone())
            .or_insert_with(Node::placeholder);

        if !element.index.is_indexed() {
            current = slot;
            continue;
        }

        let Some(items) = slot.coerce_to_array() else {
            return Err(MappingError::path_conflict(
                path.to_string(),
                format!("expected '{}' to hold an array but found an object", element.name),
            ));
        };

        let position = resolve_position(&element.index, items.len(), hints);
        if items.len() <= position {
            items.resize_with(position + 1, Node::placeholder);
        }

        if let Some(tag) = element.tag() {
            if dynamic_tags.contains(tag.as_ref()) && items.len() > position + 1 {
                more = true;
            }
        }

        log::trace!("{path}: '{}' resolved to item {position} of {}", element.name, items.len());
        current = &mut items[position];
    }

    *current = Node::Scalar(value);
    Ok(more)
}

fn resolve_position(index: &IndexToken, len: usize, hints: &PlacementHints) -> usize {
    if let IndexToken::Static(position) = index {
        return *position as usize;
    }

    match index.tag().and_then(|tag| hints.get(&tag)) {
        Some(Some(position)) => position,
        Some(None) => len,
        None => match index {
            IndexToken::Wildcard(1) => len,
            _ => len.saturating_sub(1),
        },
    }
}
