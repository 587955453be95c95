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

//! Serialized mapping configuration

use serde::{Deserialize, Serialize};

use super::rule::{FieldDefinition, FieldMappingRule, FormatDescriptor, MappingLookups, MappingOptions};
use crate::config::EngineConfig;

/// Everything needed to run a mapping, in one loadable document
///
/// ```json
/// {
///   "rules": [{ "id": "r1", "sourceFieldId": "amt", "destinationFieldId": "total" }],
///   "sourceFields": [{ "id": "amt", "path": "$.amount" }],
///   "destinationFields": [{ "id": "total", "path": "$.invoice.total" }],
///   "formats": [],
///   "options": { "isTabularTarget": false },
///   "engine": { "maxWriteIterations": 1000 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MappingDocument {
    pub rules: Vec<FieldMappingRule>,
    pub source_fields: Vec<FieldDefinition>,
    pub destination_fields: Vec<FieldDefinition>,
    pub formats: Vec<FormatDescriptor>,
    pub options: MappingOptions,
    pub engine: EngineConfig,
}

impl MappingDocument {
    /// Parse a document from JSON text
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Lookup tables keyed by id
    pub fn lookups(&self) -> MappingLookups {
        MappingLookups::from_definitions(
            self.source_fields.iter().cloned(),
            self.destination_fields.iter().cloned(),
            self.formats.iter().cloned(),
        )
    }
}
