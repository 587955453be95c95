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

//! Value expressions and the preprocessor inside mapping runs

use docmap::{
    FieldMappingRule, MappingEngine, MappingError, MappingLookups, MappingOptions, Node,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value as JsonValue, json};

fn compute(expression: &str, options: MappingOptions) -> docmap::Result<JsonValue> {
    let source = Node::from(json!({
        "customer": { "name": "ada", "tier": "gold" },
        "lines": [{ "amount": 10 }, { "amount": 2.5 }]
    }));
    let lookups = MappingLookups::new().with_destination_field("out", "$.out");
    let rules = vec![
        FieldMappingRule::new("out")
            .to_destination("out")
            .with_expression(expression),
    ];
    MappingEngine::default()
        .map_document(&source, &rules, &lookups, &options)
        .map(|target| target.to_json()["out"].clone())
}

#[rstest]
#[case("6 / 3", json!(2))]
#[case("7 / 2", json!(3.5))]
#[case("7 % 4", json!(3))]
#[case("round(7 / 3, 2)", json!(2.33))]
#[case("item.amount ?? 'scaffold'", json!("scaffold"))]
#[case("value", json!(null))]
#[case("concat(upper(request.customer.name), '/', request.customer.tier)", json!("ADA/gold"))]
#[case("if(has('seen'), 1, 0)", json!(0))]
fn expressions_without_a_source(#[case] expression: &str, #[case] expected: JsonValue) {
    assert_eq!(compute(expression, MappingOptions::default()).unwrap(), expected);
}

#[test]
fn preprocessor_object_results_seed_the_cache() {
    let options = MappingOptions::default().with_preprocessor("request.customer");
    assert_eq!(
        compute("upper(get('tier')) + ':' + get('name')", options).unwrap(),
        json!("GOLD:ada")
    );
}

#[test]
fn preprocessor_scalar_results_are_stored_under_one_key() {
    let options = MappingOptions::default().with_preprocessor("count(request.lines) * 100");
    assert_eq!(compute("get('preprocessor')", options).unwrap(), json!(200));
}

#[test]
fn preprocessor_faults_stop_the_run() {
    let options = MappingOptions::default().with_preprocessor("request.customer.name - 1");
    let err = compute("1", options).unwrap_err();
    let MappingError::ExpressionFailed(failure) = err else {
        panic!("expected an expression failure");
    };
    assert_eq!(failure.expression_id, "$preprocessor");
    assert_eq!(
        failure.message,
        "operator '-' cannot be applied to string and integer"
    );
}

#[test]
fn blank_expressions_are_not_compiled() {
    let lookups = MappingLookups::new().with_destination_field("out", "$.out");
    let rules = vec![
        FieldMappingRule::new("out")
            .to_destination("out")
            .with_constant("fallback")
            .with_expression("   "),
    ];
    let engine = MappingEngine::default();
    let target = engine
        .map_document(&Node::from(json!({})), &rules, &lookups, &MappingOptions::default())
        .unwrap();

    assert_eq!(target.to_json(), json!({ "out": "fallback" }));
    assert!(engine.modules().is_empty());
}
