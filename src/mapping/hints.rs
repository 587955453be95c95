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

//! Placement hints and dynamic index renames
//!
//! A rule's hint string is a list of `tag=value` pairs separated by `;` or
//! `,`:
//!
//! - `a1=2` pins tag `a1` to index 2,
//! - `a1=` or `a1=null` makes every write under `a1` append,
//! - `a2=**` renames the source wildcard run `**` to destination tag `a2`
//!   for index correlation.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::error::{MappingError, Result};
use crate::path::is_wildcard_marker;

/// Resolved (or pending) index per destination tag
///
/// `Some(i)` places the write at item `i`; `None` appends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementHints(FxHashMap<String, Option<usize>>);

impl PlacementHints {
    /// Create an empty hint map
    pub fn new() -> Self {
        Self::default()
    }

    /// Hint for a tag: `None` when the tag has no hint
    pub fn get(&self, tag: &str) -> Option<Option<usize>> {
        self.0.get(tag).copied()
    }

    /// Whether a tag has a hint
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains_key(tag)
    }

    /// Set the hint for a tag
    pub fn insert(&mut self, tag: impl Into<String>, index: Option<usize>) {
        self.0.insert(tag.into(), index);
    }

    /// Number of hinted tags
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no tag is hinted
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over hinted tags
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<usize>)> {
        self.0.iter().map(|(tag, index)| (tag.as_str(), *index))
    }

    /// Sorted copy for diagnostics
    pub fn to_sorted(&self) -> BTreeMap<String, Option<usize>> {
        self.0.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

impl FromIterator<(String, Option<usize>)> for PlacementHints {
    fn from_iter<I: IntoIterator<Item = (String, Option<usize>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Wildcard marker to destination tag substitutions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicIndexRenames(FxHashMap<String, String>);

impl DynamicIndexRenames {
    /// Create an empty rename table
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename a wildcard marker to a destination tag
    pub fn insert(&mut self, marker: impl Into<String>, tag: impl Into<String>) {
        self.0.insert(marker.into(), tag.into());
    }

    /// Destination tag for a marker, if renamed
    pub fn get(&self, marker: &str) -> Option<&str> {
        self.0.get(marker).map(String::as_str)
    }

    /// Effective tag: the rename when present, otherwise the tag itself
    pub fn resolve<'a>(&'a self, tag: &'a str) -> &'a str {
        self.get(tag).unwrap_or(tag)
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Hints parsed from a rule's hint string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleHints {
    /// Static placements
    pub placement: PlacementHints,
    /// Wildcard renames used for correlation
    pub renames: DynamicIndexRenames,
}

impl RuleHints {
    /// Parse a hint string; `None` or blank yields empty hints
    pub fn parse(hint: Option<&str>) -> Result<Self> {
        let mut hints = RuleHints::default();
        let Some(text) = hint else {
            return Ok(hints);
        };

        for pair in text.split([';', ',']).map(str::trim).filter(|p| !p.is_empty()) {
            let (tag, value) = pair.split_once('=').ok_or_else(|| {
                MappingError::invalid_placement_hint(text, format!("'{pair}' is not a tag=value pair"))
            })?;
            let tag = tag.trim();
            let value = value.trim();

            if !is_hint_tag(tag) {
                return Err(MappingError::invalid_placement_hint(
                    text,
                    format!("'{tag}' is not a valid index tag"),
                ));
            }

            if value.is_empty() || value.eq_ignore_ascii_case("null") {
                hints.placement.insert(tag, None);
            } else if value.bytes().all(|b| b.is_ascii_digit()) {
                let index = value.parse::<usize>().map_err(|_| {
                    MappingError::invalid_placement_hint(text, format!("index '{value}' is out of range"))
                })?;
                hints.placement.insert(tag, Some(index));
            } else if is_wildcard_marker(value) {
                hints.renames.insert(value, tag);
            } else {
                return Err(MappingError::invalid_placement_hint(
                    text,
                    format!("'{value}' is neither an index, null, nor a wildcard marker"),
                ));
            }
        }

        Ok(hints)
    }
}

fn is_hint_tag(tag: &str) -> bool {
    is_wildcard_marker(tag)
        || (!tag.is_empty()
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
}
