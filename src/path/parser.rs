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

//! nom parser for path expressions
//!
//! Grammar:
//!
//! ```text
//! path     := "$" element+
//! element  := "." bareName indexer?
//!           | "."? "['" literal "']" indexer?
//! indexer  := "[" ( "*"+ | digits | tag ) "]"
//! tag      := [A-Za-z0-9_]+ ( "-" digits )?
//! literal  := any text, with \' and \\ escapes
//! ```
//!
//! Indexer invariants (tag uniqueness, wildcard/named exclusivity) are
//! checked structurally by [`Path::new`] after parsing.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{anychar, char, digit1};
use nom::combinator::{all_consuming, opt, recognize};
use nom::multi::many1;
use nom::sequence::{delimited, preceded};
use nom::{IResult, Parser};

use super::element::{IndexToken, Path, PathElement, is_bare_name_char};
use super::error::{PathError, PathResult};
use super::span::{Span, position};

type PResult<'a, T> = IResult<Span<'a>, T, PathError>;

/// Parse and validate a full path expression such as `$.lines[*].tax[**]`
pub fn parse_path(input: &str) -> PathResult<Path> {
    let span = Span::new(input);
    let (_, elements) = all_consuming(preceded(char('$'), many1(element)))
        .parse(span)
        .map_err(flatten)?;
    Path::new(elements)
}

/// Parse a single element in isolation
///
/// Accepts the element with or without its leading dot, so both
/// `.lines[a1]` and `lines[a1]` yield the same element.
pub fn parse_element(input: &str) -> PathResult<PathElement> {
    let span = Span::new(input);
    let (_, element) = all_consuming(alt((element, undotted_element)))
        .parse(span)
        .map_err(flatten)?;
    Ok(element)
}

fn flatten(err: nom::Err<PathError>) -> PathError {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => PathError::syntax(0, "incomplete input"),
    }
}

fn element(input: Span<'_>) -> PResult<'_, PathElement> {
    let (input, name) = alt((
        preceded(char('.'), alt((quoted_name, bare_name))),
        quoted_name,
    ))
    .parse(input)?;
    let (input, index) = opt(indexer).parse(input)?;
    Ok((input, PathElement::new(name, index.unwrap_or_default())))
}

fn undotted_element(input: Span<'_>) -> PResult<'_, PathElement> {
    let (input, name) = bare_name(input)?;
    let (input, index) = opt(indexer).parse(input)?;
    Ok((input, PathElement::new(name, index.unwrap_or_default())))
}

fn bare_name(input: Span<'_>) -> PResult<'_, String> {
    take_while1(is_bare_name_char)
        .map(|name: Span<'_>| name.fragment().to_string())
        .parse(input)
}

fn quoted_name(input: Span<'_>) -> PResult<'_, String> {
    let start = position(&input);
    let (mut remaining, _) = tag("['").parse(input)?;
    let mut name = String::new();

    loop {
        let closing: PResult<'_, Span<'_>> = tag("']").parse(remaining);
        if let Ok((next, _)) = closing {
            return Ok((next, name));
        }

        match anychar::<_, PathError>(remaining) {
            Ok((next, '\\')) => match anychar::<_, PathError>(next) {
                Ok((after, escaped @ ('\'' | '\\'))) => {
                    name.push(escaped);
                    remaining = after;
                }
                Ok((_, other)) => {
                    return Err(nom::Err::Failure(PathError::syntax(
                        position(&next),
                        format!("invalid escape sequence '\\{other}'"),
                    )));
                }
                Err(_) => {
                    return Err(nom::Err::Failure(PathError::unterminated_literal(start)));
                }
            },
            Ok((_, '\'')) => {
                return Err(nom::Err::Failure(PathError::syntax(
                    position(&remaining),
                    "quote inside a property literal must be escaped as \\'",
                )));
            }
            Ok((next, c)) => {
                name.push(c);
                remaining = next;
            }
            Err(_) => {
                return Err(nom::Err::Failure(PathError::unterminated_literal(start)));
            }
        }
    }
}

fn indexer(input: Span<'_>) -> PResult<'_, IndexToken> {
    delimited(char('['), alt((wildcard_run, static_or_named)), char(']')).parse(input)
}

fn wildcard_run(input: Span<'_>) -> PResult<'_, IndexToken> {
    take_while1(|c: char| c == '*')
        .map(|run: Span<'_>| IndexToken::Wildcard(run.fragment().len()))
        .parse(input)
}

fn static_or_named(input: Span<'_>) -> PResult<'_, IndexToken> {
    let start = position(&input);
    let (rest, text) = recognize((
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        opt((char('-'), digit1)),
    ))
    .parse(input)?;

    let text = *text.fragment();
    if text.bytes().all(|b| b.is_ascii_digit()) {
        let index = text.parse::<u32>().map_err(|_| {
            nom::Err::Failure(PathError::IndexOverflow {
                position: start,
                digits: text.to_string(),
            })
        })?;
        Ok((rest, IndexToken::Static(index)))
    } else {
        Ok((rest, IndexToken::Named(text.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_properties() {
        let path = parse_path("$.invoice.total").unwrap();
        assert_eq!(
            path.elements(),
            &[
                PathElement::property("invoice"),
                PathElement::property("total")
            ]
        );
        assert!(!path.has_indexers());
    }

    #[test]
    fn test_indexers() {
        let path = parse_path("$.lines[*].tax[**].rates[2].code[a1-2]");
        // wildcard and named cannot mix
        assert!(matches!(
            path,
            Err(PathError::MixedWildcardAndNamed { .. })
        ));

        let path = parse_path("$.inv.lines[a1].tax[a2].rates[2]").unwrap();
        let indices: Vec<_> = path.elements().iter().map(|e| e.index.clone()).collect();
        assert_eq!(
            indices,
            vec![
                IndexToken::None,
                IndexToken::Named("a1".to_string()),
                IndexToken::Named("a2".to_string()),
                IndexToken::Static(2),
            ]
        );
    }

    #[test]
    fn test_quoted_names() {
        let path = parse_path(r"$.row[*]['Unit Price'].['it\'s']").unwrap();
        assert_eq!(path.elements()[1].name, "Unit Price");
        assert_eq!(path.elements()[2].name, "it's");
    }

    #[test]
    fn test_unterminated_literal() {
        let err = parse_path("$.row['abc").unwrap_err();
        assert_eq!(err, PathError::UnterminatedLiteral { position: 5 });
    }

    #[test]
    fn test_index_overflow() {
        let err = parse_path("$.rows[99999999999]").unwrap_err();
        assert!(matches!(err, PathError::IndexOverflow { .. }));
    }

    #[test]
    fn test_syntax_errors_report_position() {
        let err = parse_path("$.a..b").unwrap_err();
        assert!(matches!(err, PathError::Syntax { position: 3, .. }));

        assert!(parse_path("$").is_err());
        assert!(parse_path("a.b").is_err());
        assert!(parse_path("$.a[]").is_err());
    }

    #[test]
    fn test_parse_element_in_isolation() {
        assert_eq!(
            parse_element("lines[a1]").unwrap(),
            PathElement::new("lines", IndexToken::Named("a1".to_string()))
        );
        assert_eq!(
            parse_element(".lines[3]").unwrap(),
            PathElement::at("lines", 3)
        );
        assert_eq!(
            parse_element("['Net Amount']").unwrap(),
            PathElement::property("Net Amount")
        );
    }
}
