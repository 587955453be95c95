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

//! Mapping orchestrator - the main entry point for document mapping
//!
//! A run plans every enabled rule up front (paths, hints, correlation, value
//! mode), compiles the rules' expressions into one cached module, runs the
//! optional preprocessor, and then applies the rules in order against a
//! fresh target. Tabular targets are mapped in two passes over the same
//! target so that single-valued columns fan out over rows created later in
//! the first pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use super::correlate::{IndexCorrelation, correlate};
use super::fingerprint::fingerprint;
use super::hints::{PlacementHints, RuleHints};
use super::transform::{ValueInputs, ValueTransform};
use crate::config::EngineConfig;
use crate::error::{LoopGuardSnapshot, MappingError, Result};
use crate::expression::cache::{CompiledModule, ModuleCache, invoke_expression};
use crate::expression::{ExecutionCache, ExpressionInputs};
use crate::model::{
    FieldMappingRule, MappingDocument, MappingLookups, MappingOptions, Node, ScalarValue,
};
use crate::path::{self, Path};
use crate::tree::{SourceValue, enclosing_item, read, write};

/// Expression id of the preprocessor inside a compiled module
pub const PREPROCESSOR_ID: &str = "$preprocessor";

/// Cache key holding a non-object preprocessor result
pub const PREPROCESSOR_CACHE_KEY: &str = "preprocessor";

/// Main mapping engine
///
/// The engine is cheap to clone and safe to share between threads; clones
/// share the compiled-expression cache.
#[derive(Debug, Clone)]
pub struct MappingEngine {
    config: EngineConfig,
    modules: Arc<ModuleCache>,
}

impl Default for MappingEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl MappingEngine {
    /// Create an engine with its own module cache
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            modules: Arc::new(ModuleCache::default()),
        }
    }

    /// Use a module cache shared with other engines
    pub fn with_module_cache(mut self, modules: Arc<ModuleCache>) -> Self {
        self.modules = modules;
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compiled-expression cache
    pub fn modules(&self) -> &Arc<ModuleCache> {
        &self.modules
    }

    /// Map a source document using a loaded mapping document
    pub fn map_with_document(&self, source: &Node, document: &MappingDocument) -> Result<Node> {
        self.map_document(source, &document.rules, &document.lookups(), &document.options)
    }

    /// Map `source` through `rules` into a new target document
    pub fn map_document(
        &self,
        source: &Node,
        rules: &[FieldMappingRule],
        lookups: &MappingLookups,
        options: &MappingOptions,
    ) -> Result<Node> {
        let mut plans = Vec::with_capacity(rules.len());
        for rule in rules {
            if rule.disabled {
                log::debug!("rule '{}' is disabled, skipping", rule.id);
                continue;
            }
            plans.push(RulePlan::build(rule, lookups, options, &self.config)?);
        }

        let module = self.compile(rules, options)?;
        let mut base_cache = ExecutionCache::new();
        if let Some(module) = module.as_deref() {
            if module.contains(PREPROCESSOR_ID) {
                preprocess(source, module, &mut base_cache)?;
            }
        }

        let passes = if options.is_tabular_target { 2 } else { 1 };
        log::info!(
            "mapping document with {} rules ({} enabled), {passes} pass(es)",
            rules.len(),
            plans.len()
        );

        let mut target = Node::empty_object();
        for pass in 1..=passes {
            let mut cache = base_cache.clone();
            for plan in &plans {
                let writes = self.apply_rule(plan, source, module.as_deref(), &mut cache, &mut target)?;
                log::debug!(
                    "pass {pass}: rule '{}' ({}) wrote {writes} value(s) to {}",
                    plan.rule.id,
                    plan.transform.mode(),
                    plan.destination
                );
            }
        }

        Ok(target)
    }

    fn compile(
        &self,
        rules: &[FieldMappingRule],
        options: &MappingOptions,
    ) -> Result<Option<Arc<CompiledModule>>> {
        let preprocessor = options
            .preprocessor_expression
            .as_deref()
            .filter(|source| !source.trim().is_empty());

        let mut sources = IndexMap::new();
        for rule in rules.iter().filter(|rule| !rule.disabled) {
            if let Some(expression) = rule.expression() {
                sources.insert(rule.id.clone(), expression.to_string());
            }
        }
        if let Some(preprocessor) = preprocessor {
            sources.insert(PREPROCESSOR_ID.to_string(), preprocessor.to_string());
        }
        if sources.is_empty() {
            return Ok(None);
        }

        let key = options
            .fingerprint
            .clone()
            .unwrap_or_else(|| fingerprint(rules, preprocessor));
        self.modules.get_or_compile(&key, &sources).map(Some)
    }

    fn apply_rule(
        &self,
        plan: &RulePlan<'_>,
        source: &Node,
        module: Option<&CompiledModule>,
        cache: &mut ExecutionCache,
        target: &mut Node,
    ) -> Result<usize> {
        let mut counters: BTreeMap<String, usize> = plan
            .dynamic_tags
            .iter()
            .map(|tag| (tag.clone(), 0))
            .collect();

        let Some(source_path) = &plan.source else {
            let scaffold = Node::placeholder();
            let inputs = ValueInputs {
                request: source,
                item: &scaffold,
                value: &ScalarValue::Null,
            };
            return self.write_value(plan, inputs, None, false, &mut counters, module, cache, target);
        };

        let values: Vec<SourceValue> = read(source, source_path).collect();
        if values.is_empty() {
            log::debug!("rule '{}': no values at {source_path}", plan.rule.id);
            return Ok(0);
        }

        let many = values.len() > 1;
        let mut writes = 0;
        for value in &values {
            let inputs = ValueInputs {
                request: source,
                item: enclosing_item(source, &value.path).unwrap_or(source),
                value: &value.value,
            };
            writes += self.write_value(plan, inputs, Some(value), many, &mut counters, module, cache, target)?;
        }
        Ok(writes)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_value(
        &self,
        plan: &RulePlan<'_>,
        inputs: ValueInputs<'_>,
        located: Option<&SourceValue>,
        many: bool,
        counters: &mut BTreeMap<String, usize>,
        module: Option<&CompiledModule>,
        cache: &mut ExecutionCache,
        target: &mut Node,
    ) -> Result<usize> {
        let value = plan.transform.apply(inputs, module, cache)?;
        let mut hints = plan.hints.clone();
        let correlated = located.is_some_and(|located| plan.correlate_into(located, &mut hints));

        // Counters only place values that carry no correlated position.
        let fan_out = !correlated && !plan.dynamic_tags.is_empty();
        let no_dynamic = FxHashSet::default();
        let dynamic_tags = if fan_out { &plan.dynamic_tags } else { &no_dynamic };

        let mut iterations = 0;
        loop {
            if fan_out {
                for (tag, counter) in counters.iter() {
                    hints.insert(tag.clone(), Some(*counter));
                }
            }

            log::trace!(
                "rule '{}': writing {value} to {} with hints {:?}",
                plan.rule.id,
                plan.destination,
                hints.to_sorted()
            );
            let more = write(target, &plan.destination, value.clone(), &hints, dynamic_tags)?;
            iterations += 1;

            // All dynamic tags share one step, so nested dynamic arrays are
            // walked along the diagonal rather than as a cross product.
            if fan_out {
                for counter in counters.values_mut() {
                    *counter += 1;
                }
            }

            if many || !more {
                return Ok(iterations);
            }

            if iterations >= self.config.max_write_iterations {
                log::warn!(
                    "rule '{}' hit the write ceiling of {} at {}",
                    plan.rule.id,
                    self.config.max_write_iterations,
                    plan.destination
                );
                return Err(MappingError::loop_guard(LoopGuardSnapshot {
                    rule_id: plan.rule.id.clone(),
                    destination: plan.destination.to_string(),
                    iterations,
                    ceiling: self.config.max_write_iterations,
                    hints: hints.to_sorted(),
                    counters: counters.clone(),
                }));
            }
        }
    }
}

fn preprocess(source: &Node, module: &CompiledModule, cache: &mut ExecutionCache) -> Result<()> {
    let scaffold = Node::placeholder();
    let inputs = ExpressionInputs {
        request: source,
        item: &scaffold,
        value: &scaffold,
    };

    match invoke_expression(module, PREPROCESSOR_ID, &inputs, cache)? {
        Node::Object(properties) => {
            log::debug!("preprocessor seeded {} cache entries", properties.len());
            cache.merge(&properties);
        }
        result if result.is_placeholder() => {}
        result => {
            cache.set(PREPROCESSOR_CACHE_KEY, result);
        }
    }
    Ok(())
}

/// Everything about a rule that does not depend on the source values
struct RulePlan<'a> {
    rule: &'a FieldMappingRule,
    destination: Path,
    source: Option<Path>,
    hints: PlacementHints,
    correlation: IndexCorrelation,
    dynamic_tags: FxHashSet<String>,
    transform: ValueTransform<'a>,
}

impl<'a> RulePlan<'a> {
    fn build(
        rule: &'a FieldMappingRule,
        lookups: &'a MappingLookups,
        options: &MappingOptions,
        config: &EngineConfig,
    ) -> Result<Self> {
        let destination = match rule.destination_field_id.as_deref() {
            Some(field_id) => {
                let field = lookups
                    .destination_fields
                    .get(field_id)
                    .ok_or_else(|| MappingError::unknown_field(&rule.id, field_id))?;
                if field.path.trim().is_empty() {
                    return Err(MappingError::missing_destination_path(&rule.id));
                }
                path::parse(&field.path)?
            }
            None => match rule.destination_header_title.as_deref() {
                Some(title) if options.is_tabular_target && !title.is_empty() => {
                    Path::tabular_column(&config.tabular_row_property, title)
                }
                _ => return Err(MappingError::missing_destination_path(&rule.id)),
            },
        };

        let source = match rule.source_field_id.as_deref() {
            Some(field_id) => {
                let field = lookups
                    .source_fields
                    .get(field_id)
                    .ok_or_else(|| MappingError::unknown_field(&rule.id, field_id))?;
                Some(path::parse(&field.path)?)
            }
            None => None,
        };

        let transform = ValueTransform::plan(rule, lookups)?;
        let RuleHints { placement, renames } =
            RuleHints::parse(rule.destination_placement_hint.as_deref())?;

        let destination_tags = destination.tags();
        for (tag, _) in placement.iter() {
            if !destination_tags.iter().any(|known| known == tag) {
                log::warn!(
                    "rule '{}': placement hint '{tag}' does not occur in {destination}",
                    rule.id
                );
            }
        }

        let correlation = correlate(&destination, source.as_ref(), &renames);
        let dynamic_tags = destination
            .indexed()
            .filter(|(_, element)| element.index.is_dynamic())
            .filter_map(|(_, element)| element.tag().map(|tag| tag.into_owned()))
            .filter(|tag| !correlation.is_correlated(tag) && !placement.contains(tag))
            .collect();

        Ok(Self {
            rule,
            destination,
            source,
            hints: placement,
            correlation,
            dynamic_tags,
            transform,
        })
    }

    /// Add hints for every destination array driven by the value's source
    /// position; returns whether any were added
    fn correlate_into(&self, located: &SourceValue, hints: &mut PlacementHints) -> bool {
        let Some(source_path) = &self.source else {
            return false;
        };

        let mut correlated = false;
        for (position, element) in source_path.indexed() {
            let Some(tag) = element.tag() else {
                continue;
            };
            let Some(target) = self.correlation.get(&tag) else {
                continue;
            };
            if self.hints.contains(&target.tag) {
                continue;
            }
            if let Some(index) = located.index_at(position) {
                hints.insert(target.tag.clone(), Some(index));
                correlated = true;
            }
        }
        correlated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn lookups() -> MappingLookups {
        MappingLookups::new()
            .with_source_field("tax", "$.lines[*].tax")
            .with_destination_field("tax", "$.inv.lines[a1].tax[a2]")
            .with_destination_field("note", "$.inv.note")
    }

    #[test]
    fn test_plan_dynamic_tags() {
        let lookups = lookups();
        let rule = FieldMappingRule::new("r")
            .from_source("tax")
            .to_destination("tax")
            .with_placement_hint("a1=*");
        let plan = RulePlan::build(&rule, &lookups, &MappingOptions::default(), &EngineConfig::default())
            .unwrap();

        assert!(plan.correlation.is_correlated("a1"));
        assert_eq!(plan.dynamic_tags, FxHashSet::from_iter(["a2".to_string()]));
    }

    #[test]
    fn test_plan_errors() {
        let lookups = lookups();
        let config = EngineConfig::default();
        let options = MappingOptions::default();

        let rule = FieldMappingRule::new("r").with_constant(1);
        assert_eq!(
            RulePlan::build(&rule, &lookups, &options, &config).err(),
            Some(MappingError::missing_destination_path("r"))
        );

        let rule = FieldMappingRule::new("r").with_constant(1).to_header("Total");
        assert!(RulePlan::build(&rule, &lookups, &options, &config).is_err());
        assert!(RulePlan::build(&rule, &lookups, &MappingOptions::tabular(), &config).is_ok());

        let rule = FieldMappingRule::new("r").from_source("nope").to_destination("note");
        assert_eq!(
            RulePlan::build(&rule, &lookups, &options, &config).err(),
            Some(MappingError::unknown_field("r", "nope"))
        );
    }

    #[test]
    fn test_dynamic_counters_advance_together() {
        let engine = MappingEngine::default();
        let lookups = MappingLookups::new()
            .with_destination_field("first", "$.lines[0].tax[1].rate")
            .with_destination_field("second", "$.lines[1].tax[1].rate")
            .with_destination_field("currency", "$.lines[a1].tax[a2].currency");
        let rules = vec![
            FieldMappingRule::new("first").with_constant(1).to_destination("first"),
            FieldMappingRule::new("second").with_constant(2).to_destination("second"),
            FieldMappingRule::new("currency")
                .with_constant("EUR")
                .to_destination("currency"),
        ];

        let target = engine
            .map_document(&Node::placeholder(), &rules, &lookups, &MappingOptions::default())
            .unwrap();
        assert_eq!(
            target.to_json(),
            json!({
                "lines": [
                    { "tax": [{ "currency": "EUR" }, { "rate": 1 }] },
                    { "tax": [null, { "rate": 2, "currency": "EUR" }] }
                ]
            })
        );
    }

    #[test]
    fn test_preprocessor_seeds_cache() {
        let engine = MappingEngine::default();
        let lookups = MappingLookups::new().with_destination_field("out", "$.out");
        let rules = vec![
            FieldMappingRule::new("r")
                .to_destination("out")
                .with_expression("get('rate') * get('preprocessor', 1)"),
        ];
        let options = MappingOptions::default().with_preprocessor("set('rate', request.rate)");
        let source = Node::from(json!({ "rate": 4 }));

        let target = engine.map_document(&source, &rules, &lookups, &options).unwrap();
        assert_eq!(target.to_json(), json!({ "out": 16 }));
    }
}
