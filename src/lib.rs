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

//! Declarative schema-to-schema JSON mapping
//!
//! Given a source JSON document and an ordered list of field-mapping rules,
//! the engine produces a target document. Rules address both documents with
//! a small path language (`$.lines[*].tax[a2]`), values are transformed per
//! field (constant, formatted, or computed by an expression), and the target
//! structure is materialized on demand while writing.
//!
//! ```rust
//! use docmap::{FieldMappingRule, MappingEngine, MappingLookups, MappingOptions, Node};
//! use serde_json::json;
//!
//! let source = Node::from(json!({ "lines": [{ "amount": 10 }, { "amount": 20 }] }));
//! let lookups = MappingLookups::new()
//!     .with_source_field("amount", "$.lines[*].amount")
//!     .with_destination_field("total", "$.invoice.items[*].total");
//! let rules = vec![FieldMappingRule::new("r1").from_source("amount").to_destination("total")];
//!
//! let engine = MappingEngine::default();
//! let target = engine
//!     .map_document(&source, &rules, &lookups, &MappingOptions::default())
//!     .unwrap();
//! assert_eq!(
//!     serde_json::Value::from(&target),
//!     json!({ "invoice": { "items": [{ "total": 10 }, { "total": 20 }] } })
//! );
//! ```

pub mod config;
pub mod error;
pub mod expression;
pub mod mapping;
pub mod model;
pub mod path;
pub mod tree;

pub use config::EngineConfig;
pub use error::{ErrorCategory, MappingError, Result};
pub use expression::cache::{CompiledModule, ModuleCache, ModuleKey, invoke_expression};
pub use expression::script::ScriptCompiler;
pub use expression::{CompiledExpression, ExecutionCache, ExpressionCompiler, ExpressionInputs};
pub use mapping::MappingEngine;
pub use model::{
    FieldDefinition, FieldMappingRule, FormatDescriptor, MappingDocument, MappingLookups,
    MappingOptions, Node, ScalarValue, SourceType,
};
pub use path::{IndexToken, Path, PathElement, PathError, parse_element, parse_path};
