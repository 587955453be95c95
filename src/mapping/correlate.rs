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

//! Index correlation between source and destination paths
//!
//! Given `$.Lines[*].Tax[**]` on the source and
//! `$.invoice.lines[a1].tax[a2]` with renames `a1=*;a2=**`, the correlation
//! maps source tag `*` to destination `lines[a1]` and `**` to `tax[a2]`, so
//! every value read from `Lines[i].Tax[j]` lands in `lines[i].tax[j]`.

use std::borrow::Cow;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use super::hints::DynamicIndexRenames;
use crate::path::Path;

/// Destination array a source tag drives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationTarget {
    /// Destination element (property) name
    pub element: String,
    /// Destination tag
    pub tag: String,
}

/// Source tag to destination array lookup for one rule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexCorrelation {
    entries: IndexMap<String, CorrelationTarget>,
    correlated: FxHashSet<String>,
}

impl IndexCorrelation {
    /// Destination driven by a source tag
    pub fn get(&self, source_tag: &str) -> Option<&CorrelationTarget> {
        self.entries.get(source_tag)
    }

    /// Whether a destination tag is driven by some source element
    pub fn is_correlated(&self, destination_tag: &str) -> bool {
        self.correlated.contains(destination_tag)
    }

    /// Number of entries, identity entries included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CorrelationTarget)> {
        self.entries.iter().map(|(tag, target)| (tag.as_str(), target))
    }
}

/// Build the correlation lookup for a rule
pub fn correlate(
    destination: &Path,
    source: Option<&Path>,
    renames: &DynamicIndexRenames,
) -> IndexCorrelation {
    let mut correlation = IndexCorrelation::default();

    if let Some(source) = source {
        for (_, element) in source.indexed() {
            let Some(source_tag) = element.tag() else {
                continue;
            };
            let effective = renames.resolve(&source_tag).to_string();
            let target = destination
                .indexed()
                .find(|(_, dest)| dest.tag().as_deref() == Some(effective.as_str()));

            if let Some((_, dest)) = target {
                log::trace!("correlated source [{source_tag}] with {}[{effective}]", dest.name);
                correlation.correlated.insert(effective.clone());
                correlation.entries.insert(
                    source_tag.into_owned(),
                    CorrelationTarget {
                        element: dest.name.clone(),
                        tag: effective,
                    },
                );
            }
        }
    }

    for (_, dest) in destination.indexed() {
        let Some(tag) = dest.tag().map(Cow::into_owned) else {
            continue;
        };
        if correlation.correlated.contains(&tag) || correlation.entries.contains_key(&tag) {
            continue;
        }
        correlation.entries.insert(
            tag.clone(),
            CorrelationTarget {
                element: dest.name.clone(),
                tag,
            },
        );
    }

    correlation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::hints::RuleHints;
    use crate::path::parse_path;

    #[test]
    fn test_renamed_wildcards() {
        let source = parse_path("$.Lines[*].Tax[**]").unwrap();
        let destination = parse_path("$.invoice.lines[a1].tax[a2]").unwrap();
        let hints = RuleHints::parse(Some("a1=*;a2=**")).unwrap();

        let correlation = correlate(&destination, Some(&source), &hints.renames);
        assert_eq!(
            correlation.get("*"),
            Some(&CorrelationTarget {
                element: "lines".to_string(),
                tag: "a1".to_string()
            })
        );
        assert_eq!(correlation.get("**").map(|t| t.tag.as_str()), Some("a2"));
        assert!(correlation.is_correlated("a1"));
        assert!(correlation.is_correlated("a2"));
        assert_eq!(correlation.len(), 2);
    }

    #[test]
    fn test_matching_tags_without_renames() {
        let source = parse_path("$.lines[*].amount").unwrap();
        let destination = parse_path("$.rows[*].total").unwrap();
        let correlation = correlate(&destination, Some(&source), &DynamicIndexRenames::new());
        assert_eq!(correlation.get("*").map(|t| t.element.as_str()), Some("rows"));
        assert!(correlation.is_correlated("*"));
    }

    #[test]
    fn test_uncovered_destination_indices_get_identity_entries() {
        let source = parse_path("$.lines[*].amount").unwrap();
        let destination = parse_path("$.pages[0].rows[a1].total").unwrap();
        let correlation = correlate(&destination, Some(&source), &DynamicIndexRenames::new());

        assert!(correlation.get("*").is_none());
        assert_eq!(correlation.get("0").map(|t| t.element.as_str()), Some("pages"));
        assert_eq!(correlation.get("a1").map(|t| t.tag.as_str()), Some("a1"));
        assert!(!correlation.is_correlated("a1"));
    }

    #[test]
    fn test_no_source() {
        let destination = parse_path("$.rows[a1].x").unwrap();
        let correlation = correlate(&destination, None, &DynamicIndexRenames::new());
        assert_eq!(correlation.len(), 1);
        assert!(!correlation.is_correlated("a1"));
    }
}
