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

//! Per-rule value transforms

use std::fmt;

use super::format::apply_format;
use crate::error::{MappingError, Result};
use crate::expression::cache::{CompiledModule, invoke_expression};
use crate::expression::{ExecutionCache, ExpressionInputs};
use crate::model::{FieldMappingRule, FormatDescriptor, MappingLookups, Node, ScalarValue};

/// How a rule produces the value it writes
///
/// Decided once per rule, in priority order:
/// 1. a constant without format or expression,
/// 2. the source value when a source is bound and no expression is set,
/// 3. the expression result (a null scaffold stands in when no source is bound),
/// 4. a formatted constant when only a constant and a format are set.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueMode {
    /// Literal value, cloned for every write
    Constant(ScalarValue),
    /// Source value used verbatim
    Passthrough,
    /// Computed by the rule's value expression
    Expression,
    /// Literal value run through the rule's format
    FormattedConstant(ScalarValue),
}

impl ValueMode {
    /// Pick the mode for a rule
    pub fn decide(rule: &FieldMappingRule) -> Result<Self> {
        let constant = constant_value(rule)?;
        let has_format = rule.destination_format_id.is_some();
        let has_expression = rule.expression().is_some();
        let has_source = rule.source_field_id.is_some();

        match constant {
            Some(value) if !has_format && !has_expression => Ok(ValueMode::Constant(value)),
            _ if has_source && !has_expression => Ok(ValueMode::Passthrough),
            _ if has_expression => Ok(ValueMode::Expression),
            Some(value) if has_format => Ok(ValueMode::FormattedConstant(value)),
            _ => Err(MappingError::unsupported_mapping(&rule.id)),
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            ValueMode::Constant(_) => "constant",
            ValueMode::Passthrough => "passthrough",
            ValueMode::Expression => "expression",
            ValueMode::FormattedConstant(_) => "formatted-constant",
        }
    }
}

impl fmt::Display for ValueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn constant_value(rule: &FieldMappingRule) -> Result<Option<ScalarValue>> {
    match &rule.destination_constant_value {
        None => Ok(None),
        Some(json) => ScalarValue::from_json(json).map(Some).ok_or_else(|| {
            MappingError::unsupported_value_type(if json.is_array() { "array" } else { "object" })
        }),
    }
}

/// Inputs available while computing one written value
#[derive(Debug, Clone, Copy)]
pub struct ValueInputs<'a> {
    /// Source document root
    pub request: &'a Node,
    /// Innermost source array item around the value
    pub item: &'a Node,
    /// The raw source value (null for the scaffold)
    pub value: &'a ScalarValue,
}

/// Planned value computation of one rule
#[derive(Debug, Clone)]
pub struct ValueTransform<'a> {
    rule_id: &'a str,
    mode: ValueMode,
    format: Option<&'a FormatDescriptor>,
}

impl<'a> ValueTransform<'a> {
    /// Resolve the rule's mode and format
    pub fn plan(rule: &'a FieldMappingRule, lookups: &'a MappingLookups) -> Result<Self> {
        let mode = ValueMode::decide(rule)?;
        let format = match rule.destination_format_id.as_deref() {
            Some(format_id) => Some(
                lookups
                    .formats
                    .get(format_id)
                    .ok_or_else(|| MappingError::unknown_format(&rule.id, format_id))?,
            ),
            None => None,
        };
        Ok(Self {
            rule_id: &rule.id,
            mode,
            format,
        })
    }

    /// The decided mode
    pub fn mode(&self) -> &ValueMode {
        &self.mode
    }

    /// Compute the value to write
    pub fn apply(
        &self,
        inputs: ValueInputs<'_>,
        expressions: Option<&CompiledModule>,
        cache: &mut ExecutionCache,
    ) -> Result<ScalarValue> {
        let raw = match &self.mode {
            ValueMode::Constant(value) | ValueMode::FormattedConstant(value) => value.clone(),
            ValueMode::Passthrough => inputs.value.clone(),
            ValueMode::Expression => {
                let module = expressions
                    .ok_or_else(|| MappingError::unknown_expression("(none)", self.rule_id))?;
                let value = Node::Scalar(inputs.value.clone());
                let expression_inputs = ExpressionInputs {
                    request: inputs.request,
                    item: inputs.item,
                    value: &value,
                };
                invoke_expression(module, self.rule_id, &expression_inputs, cache)?.into_scalar()?
            }
        };

        match self.format {
            Some(format) => apply_format(&raw, format),
            None => Ok(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceType;
    use serde_json::json;

    #[test]
    fn test_mode_priority() {
        let constant = FieldMappingRule::new("r").from_source("s").with_constant("X");
        assert_eq!(
            ValueMode::decide(&constant).unwrap(),
            ValueMode::Constant(ScalarValue::from("X"))
        );

        let formatted_source = constant.clone().with_format("f");
        assert_eq!(ValueMode::decide(&formatted_source).unwrap(), ValueMode::Passthrough);

        let computed = FieldMappingRule::new("r").with_constant(1).with_expression("value");
        assert_eq!(ValueMode::decide(&computed).unwrap(), ValueMode::Expression);

        let formatted_constant = FieldMappingRule::new("r").with_constant(1).with_format("f");
        assert_eq!(
            ValueMode::decide(&formatted_constant).unwrap(),
            ValueMode::FormattedConstant(ScalarValue::Integer(1))
        );

        let empty = FieldMappingRule::new("r").with_format("f");
        assert_eq!(
            ValueMode::decide(&empty),
            Err(MappingError::unsupported_mapping("r"))
        );
    }

    #[test]
    fn test_container_constant_rejected() {
        let rule = FieldMappingRule::new("r").with_constant(json!({ "a": 1 }));
        assert_eq!(
            ValueMode::decide(&rule),
            Err(MappingError::unsupported_value_type("object"))
        );
    }

    #[test]
    fn test_apply_formats_passthrough() {
        let lookups = MappingLookups::new().with_format(FormatDescriptor::new(
            "money",
            SourceType::Decimal,
            Some("{0:N2}"),
        ));
        let rule = FieldMappingRule::new("r").from_source("s").with_format("money");
        let transform = ValueTransform::plan(&rule, &lookups).unwrap();

        let root = Node::empty_object();
        let value = ScalarValue::from("1234.5");
        let written = transform
            .apply(
                ValueInputs {
                    request: &root,
                    item: &root,
                    value: &value,
                },
                None,
                &mut ExecutionCache::new(),
            )
            .unwrap();
        assert_eq!(written, ScalarValue::from("1,234.50"));
    }

    #[test]
    fn test_unknown_format() {
        let rule = FieldMappingRule::new("r").from_source("s").with_format("nope");
        let err = ValueTransform::plan(&rule, &MappingLookups::new()).unwrap_err();
        assert_eq!(err, MappingError::unknown_format("r", "nope"));
    }
}
