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

//! Field mapping rules and the lookup tables they reference

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::expression::cache::ModuleKey;

/// A single field mapping rule
///
/// Rules reference fields and formats by id; paths and format templates are
/// resolved through [`MappingLookups`] when the rule is applied.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldMappingRule {
    /// Rule identifier, also the expression id of its value expression
    pub id: String,
    /// Disabled rules are skipped
    pub disabled: bool,
    /// Source field to read values from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_field_id: Option<String>,
    /// Destination field to write values to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_field_id: Option<String>,
    /// Column title, used instead of a destination field for tabular targets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_header_title: Option<String>,
    /// Placement hint string, `tag=value` pairs separated by `;` or `,`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_placement_hint: Option<String>,
    /// Constant written instead of (or formatted in place of) a source value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_constant_value: Option<JsonValue>,
    /// Format applied to every written value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_format_id: Option<String>,
    /// Whether `value_expression` computes the written value
    pub uses_value_expression: bool,
    /// Expression source text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_expression: Option<String>,
}

impl FieldMappingRule {
    /// Create an enabled rule with only an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Read values from a source field
    pub fn from_source(mut self, field_id: impl Into<String>) -> Self {
        self.source_field_id = Some(field_id.into());
        self
    }

    /// Write values to a destination field
    pub fn to_destination(mut self, field_id: impl Into<String>) -> Self {
        self.destination_field_id = Some(field_id.into());
        self
    }

    /// Write values to a tabular column
    pub fn to_header(mut self, title: impl Into<String>) -> Self {
        self.destination_header_title = Some(title.into());
        self
    }

    /// Set the placement hint string
    pub fn with_placement_hint(mut self, hint: impl Into<String>) -> Self {
        self.destination_placement_hint = Some(hint.into());
        self
    }

    /// Set a constant value
    pub fn with_constant(mut self, value: impl Into<JsonValue>) -> Self {
        self.destination_constant_value = Some(value.into());
        self
    }

    /// Set the format applied to written values
    pub fn with_format(mut self, format_id: impl Into<String>) -> Self {
        self.destination_format_id = Some(format_id.into());
        self
    }

    /// Compute values with an expression
    pub fn with_expression(mut self, source: impl Into<String>) -> Self {
        self.uses_value_expression = true;
        self.value_expression = Some(source.into());
        self
    }

    /// Mark the rule as disabled
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Expression source, if the rule computes its value
    pub fn expression(&self) -> Option<&str> {
        if self.uses_value_expression {
            self.value_expression
                .as_deref()
                .filter(|source| !source.trim().is_empty())
        } else {
            None
        }
    }
}

/// A named location in a source or destination document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Field identifier
    pub id: String,
    /// Path expression
    pub path: String,
}

impl FieldDefinition {
    /// Create a field definition
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

/// Type a raw value is coerced to before formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceType {
    #[default]
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Guid,
    Uri,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceType::String => "string",
            SourceType::Integer => "integer",
            SourceType::Decimal => "decimal",
            SourceType::Boolean => "boolean",
            SourceType::Date => "date",
            SourceType::DateTime => "dateTime",
            SourceType::Guid => "guid",
            SourceType::Uri => "uri",
        };
        f.write_str(name)
    }
}

/// Format applied to a written value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatDescriptor {
    /// Format identifier
    pub id: String,
    /// Type the raw value is coerced to
    #[serde(default)]
    pub source_type: SourceType,
    /// Composite format template such as `{0:yyyy-MM-dd}`; `None` writes the
    /// coerced value unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl FormatDescriptor {
    /// Create a format descriptor
    pub fn new(id: impl Into<String>, source_type: SourceType, template: Option<&str>) -> Self {
        Self {
            id: id.into(),
            source_type,
            template: template.map(str::to_string),
        }
    }
}

/// Resolved field and format metadata consumed by the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingLookups {
    /// Source fields by id
    pub source_fields: IndexMap<String, FieldDefinition>,
    /// Destination fields by id
    pub destination_fields: IndexMap<String, FieldDefinition>,
    /// Formats by id
    pub formats: IndexMap<String, FormatDescriptor>,
}

impl MappingLookups {
    /// Create empty lookups
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source field
    pub fn with_source_field(mut self, id: impl Into<String>, path: impl Into<String>) -> Self {
        let field = FieldDefinition::new(id, path);
        self.source_fields.insert(field.id.clone(), field);
        self
    }

    /// Add a destination field
    pub fn with_destination_field(mut self, id: impl Into<String>, path: impl Into<String>) -> Self {
        let field = FieldDefinition::new(id, path);
        self.destination_fields.insert(field.id.clone(), field);
        self
    }

    /// Add a format
    pub fn with_format(mut self, format: FormatDescriptor) -> Self {
        self.formats.insert(format.id.clone(), format);
        self
    }

    /// Build lookups from definition lists
    pub fn from_definitions(
        source_fields: impl IntoIterator<Item = FieldDefinition>,
        destination_fields: impl IntoIterator<Item = FieldDefinition>,
        formats: impl IntoIterator<Item = FormatDescriptor>,
    ) -> Self {
        Self {
            source_fields: source_fields
                .into_iter()
                .map(|field| (field.id.clone(), field))
                .collect(),
            destination_fields: destination_fields
                .into_iter()
                .map(|field| (field.id.clone(), field))
                .collect(),
            formats: formats
                .into_iter()
                .map(|format| (format.id.clone(), format))
                .collect(),
        }
    }
}

/// Per-call mapping options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MappingOptions {
    /// Target is a flat table: header titles become columns and two passes run
    pub is_tabular_target: bool,
    /// Expression run once before any rule to seed the scratch cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessor_expression: Option<String>,
    /// Explicit configuration fingerprint; computed from the rules when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<ModuleKey>,
}

impl MappingOptions {
    /// Options for a tabular target
    pub fn tabular() -> Self {
        Self {
            is_tabular_target: true,
            ..Self::default()
        }
    }

    /// Set the preprocessor expression
    pub fn with_preprocessor(mut self, source: impl Into<String>) -> Self {
        self.preprocessor_expression = Some(source.into());
        self
    }

    /// Set an explicit fingerprint
    pub fn with_fingerprint(mut self, key: impl Into<ModuleKey>) -> Self {
        self.fingerprint = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_rule_deserializes_from_camel_case() {
        let rule: FieldMappingRule = serde_json::from_value(json!({
            "id": "r7",
            "sourceFieldId": "qty",
            "destinationFieldId": "lineQty",
            "destinationPlacementHint": "a1=0",
            "usesValueExpression": true,
            "valueExpression": "value * 2"
        }))
        .unwrap();

        assert_eq!(
            rule,
            FieldMappingRule::new("r7")
                .from_source("qty")
                .to_destination("lineQty")
                .with_placement_hint("a1=0")
                .with_expression("value * 2")
        );
        assert!(!rule.disabled);
    }

    #[test]
    fn test_expression_requires_flag() {
        let mut rule = FieldMappingRule::new("r").with_expression("1 + 1");
        assert_eq!(rule.expression(), Some("1 + 1"));
        rule.uses_value_expression = false;
        assert_eq!(rule.expression(), None);
        assert_eq!(FieldMappingRule::new("r").with_expression("  ").expression(), None);
    }

    #[test]
    fn test_source_type_names() {
        let format: FormatDescriptor =
            serde_json::from_value(json!({ "id": "f", "sourceType": "dateTime" })).unwrap();
        assert_eq!(format.source_type, SourceType::DateTime);
        assert_eq!(format.template, None);
        assert_eq!(SourceType::Guid.to_string(), "guid");
    }
}
