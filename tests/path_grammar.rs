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

//! Path grammar: canonical forms, validation rules and error reporting

use docmap::path::{self, IndexToken, PathError, parse_path};
use docmap::{ErrorCategory, MappingError, Path};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
#[case("$.invoice.total")]
#[case("$.lines[*].amount")]
#[case("$.Lines[*].Tax[**]")]
#[case("$.inv.lines[a1].tax[a2]")]
#[case("$.inv.lines[a1-2].tax[3]")]
#[case("$.rows[2].x")]
#[case(r"$.row[*]['Unit Price']")]
#[case(r"$['it\'s'].value")]
#[case(r"$.a['back\\slash'][0]")]
#[case("$.@type._id")]
fn parse_is_idempotent_over_canonical_form(#[case] input: &str) {
    let parsed = parse_path(input).unwrap();
    let canonical = parsed.to_string();
    let reparsed = parse_path(&canonical).unwrap();
    assert_eq!(reparsed, parsed);
    assert_eq!(reparsed.to_string(), canonical);
}

#[rstest]
#[case("$.row.['Net Amount']", "$['row']['Net Amount']")]
#[case("$.row['Net Amount']", "$.row['Net Amount']")]
#[case("$['plain']", "$.plain")]
fn bracket_literals_with_or_without_dot(#[case] input: &str, #[case] equivalent: &str) {
    assert_eq!(parse_path(input).unwrap(), parse_path(equivalent).unwrap());
}

#[rstest]
#[case("$.a[x].b[x]", "x")]
#[case("$.a[t1].b[t2].c[t1]", "t1")]
fn duplicate_named_tags_are_rejected(#[case] input: &str, #[case] tag: &str) {
    assert_eq!(
        parse_path(input),
        Err(PathError::DuplicateTag {
            tag: tag.to_string()
        })
    );
}

#[rstest]
#[case("$.a[*].b[x]")]
#[case("$.a[x].b[**]")]
#[case("$.a[1].b[*].c[y]")]
fn wildcards_and_named_tags_never_mix(#[case] input: &str) {
    assert!(matches!(
        parse_path(input),
        Err(PathError::MixedWildcardAndNamed { .. })
    ));
}

#[test]
fn repeated_wildcard_run_is_rejected() {
    assert_eq!(
        parse_path("$.a[*].b[*]"),
        Err(PathError::DuplicateWildcard {
            marker: "*".to_string()
        })
    );
    assert!(parse_path("$.a[*].b[**].c[***]").is_ok());
}

#[rstest]
#[case("")]
#[case("$")]
#[case("$.")]
#[case("$.a[")]
#[case("$.a[]")]
#[case("$.a[-1]")]
#[case("$.a b")]
#[case("a.b")]
#[case("$.a['open")]
fn malformed_paths_are_grammar_errors(#[case] input: &str) {
    let err = path::parse(input).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Grammar);
    assert!(matches!(err, MappingError::Grammar { ref path, .. } if path == input));
}

#[test]
fn indexed_elements_keep_positions() {
    let path: Path = "$.inv.lines[a1].tax[a2].rates[2]".parse().unwrap();
    let indexed: Vec<(usize, String)> = path
        .indexed()
        .map(|(position, element)| (position, element.index.to_string()))
        .collect();
    assert_eq!(
        indexed,
        vec![
            (1, "[a1]".to_string()),
            (2, "[a2]".to_string()),
            (3, "[2]".to_string()),
        ]
    );
    assert_eq!(path.tags(), vec!["a1", "a2", "2"]);
    assert!(path.is_multiple());
    assert!(!parse_path("$.rows[2].x").unwrap().is_multiple());
}

#[test]
fn tabular_column_paths() {
    let path = Path::tabular_column("row", "Unit Price");
    assert_eq!(path.to_string(), "$.row[*]['Unit Price']");
    assert_eq!(path.elements()[0].index, IndexToken::Wildcard(1));
    assert_eq!(parse_path(&path.to_string()).unwrap(), path);
}
