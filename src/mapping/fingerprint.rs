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

//! Content fingerprint of a mapping configuration

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::expression::cache::ModuleKey;
use crate::model::FieldMappingRule;

/// Fingerprint rules plus preprocessor source
///
/// Any change to a rule field or to the preprocessor yields a different key.
pub fn fingerprint(rules: &[FieldMappingRule], preprocessor: Option<&str>) -> ModuleKey {
    let mut hasher = FxHasher::default();
    rules.len().hash(&mut hasher);
    for rule in rules {
        rule.id.hash(&mut hasher);
        rule.disabled.hash(&mut hasher);
        rule.source_field_id.hash(&mut hasher);
        rule.destination_field_id.hash(&mut hasher);
        rule.destination_header_title.hash(&mut hasher);
        rule.destination_placement_hint.hash(&mut hasher);
        rule.destination_constant_value
            .as_ref()
            .map(ToString::to_string)
            .hash(&mut hasher);
        rule.destination_format_id.hash(&mut hasher);
        rule.uses_value_expression.hash(&mut hasher);
        rule.value_expression.hash(&mut hasher);
    }
    preprocessor.hash(&mut hasher);
    ModuleKey::new(hex::encode(hasher.finish().to_be_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        let rules = vec![FieldMappingRule::new("r1").with_expression("value + 1")];
        let first = fingerprint(&rules, None);
        assert_eq!(first, fingerprint(&rules, None));
        assert_eq!(first.as_str().len(), 16);

        let changed = vec![FieldMappingRule::new("r1").with_expression("value + 2")];
        assert_ne!(first, fingerprint(&changed, None));
        assert_ne!(first, fingerprint(&rules, Some("1")));
    }
}
