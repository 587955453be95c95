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

//! Type coercion and composite format templates
//!
//! A format descriptor first coerces the raw value to its declared
//! [`SourceType`], then renders it through a composite template:
//!
//! ```text
//! Invoice {0:yyyy-MM-dd}     -> Invoice 2024-03-09
//! {0:N2} EUR                 -> 1,234.50 EUR
//! [{0,8:F1}]                 -> [    12.5]
//! {{{0:D4}}}                 -> {0042}
//! ```
//!
//! Placeholders are `{0[,alignment][:spec]}`; only argument 0 exists.
//! `{{` and `}}` are literal braces.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Timelike,
};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use url::Url;
use uuid::Uuid;

use crate::error::{MappingError, Result};
use crate::model::{FormatDescriptor, ScalarValue, SourceType};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{|\}\}|\{(\d+)(?:,\s*(-?\d+))?(?::([^{}]*))?\}")
        .expect("placeholder pattern is valid")
});

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const DAY_NAMES: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

/// Coerce, then render through the descriptor's template if it has one
pub fn apply_format(value: &ScalarValue, descriptor: &FormatDescriptor) -> Result<ScalarValue> {
    let coerced = coerce(value, descriptor.source_type)?;
    match descriptor.template.as_deref() {
        Some(template) => format_template(template, &coerced).map(ScalarValue::String),
        None => Ok(coerced),
    }
}

/// Coerce a scalar to the given type
///
/// Null stays null for every target type.
pub fn coerce(value: &ScalarValue, target: SourceType) -> Result<ScalarValue> {
    if value.is_null() {
        return Ok(ScalarValue::Null);
    }
    let fail = || MappingError::conversion(value.to_string(), target.to_string());

    match target {
        SourceType::String => Ok(ScalarValue::String(value.to_string())),
        SourceType::Integer => match value {
            ScalarValue::Integer(i) => Ok(ScalarValue::Integer(*i)),
            ScalarValue::Decimal(d) if d.fract().is_zero() => {
                d.to_i64().map(ScalarValue::Integer).ok_or_else(fail)
            }
            ScalarValue::Boolean(b) => Ok(ScalarValue::Integer(i64::from(*b))),
            ScalarValue::String(s) => {
                let text = s.trim();
                if let Ok(i) = text.parse::<i64>() {
                    return Ok(ScalarValue::Integer(i));
                }
                parse_decimal(text)
                    .filter(|d| d.fract().is_zero())
                    .and_then(|d| d.to_i64())
                    .map(ScalarValue::Integer)
                    .ok_or_else(fail)
            }
            _ => Err(fail()),
        },
        SourceType::Decimal => match value {
            ScalarValue::Decimal(d) => Ok(ScalarValue::Decimal(*d)),
            ScalarValue::Integer(i) => Ok(ScalarValue::Decimal(Decimal::from(*i))),
            ScalarValue::Boolean(b) => Ok(ScalarValue::Decimal(if *b {
                Decimal::ONE
            } else {
                Decimal::ZERO
            })),
            ScalarValue::String(s) => parse_decimal(s.trim())
                .map(ScalarValue::Decimal)
                .ok_or_else(fail),
            _ => Err(fail()),
        },
        SourceType::Boolean => match value {
            ScalarValue::Boolean(b) => Ok(ScalarValue::Boolean(*b)),
            ScalarValue::Integer(i) => Ok(ScalarValue::Boolean(*i != 0)),
            ScalarValue::Decimal(d) => Ok(ScalarValue::Boolean(!d.is_zero())),
            ScalarValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Ok(ScalarValue::Boolean(true)),
                "false" | "f" | "no" | "n" | "0" => Ok(ScalarValue::Boolean(false)),
                _ => Err(fail()),
            },
            _ => Err(fail()),
        },
        SourceType::Date => match value {
            ScalarValue::Date(d) => Ok(ScalarValue::Date(*d)),
            ScalarValue::DateTime(dt) => Ok(ScalarValue::Date(dt.date_naive())),
            ScalarValue::String(s) => parse_date(s.trim()).map(ScalarValue::Date).ok_or_else(fail),
            _ => Err(fail()),
        },
        SourceType::DateTime => match value {
            ScalarValue::DateTime(dt) => Ok(ScalarValue::DateTime(*dt)),
            ScalarValue::Date(d) => Ok(ScalarValue::DateTime(midnight_utc(*d))),
            ScalarValue::String(s) => parse_date_time(s.trim())
                .map(ScalarValue::DateTime)
                .ok_or_else(fail),
            _ => Err(fail()),
        },
        SourceType::Guid => match value {
            ScalarValue::Guid(g) => Ok(ScalarValue::Guid(*g)),
            ScalarValue::String(s) => Uuid::parse_str(s.trim())
                .map(ScalarValue::Guid)
                .map_err(|_| fail()),
            _ => Err(fail()),
        },
        SourceType::Uri => match value {
            ScalarValue::Uri(u) => Ok(ScalarValue::Uri(u.clone())),
            ScalarValue::String(s) => Url::parse(s.trim())
                .map(ScalarValue::Uri)
                .map_err(|_| fail()),
            _ => Err(fail()),
        },
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_date_time(text).map(|dt| dt.date_naive()))
        .or_else(|| NaiveDate::parse_from_str(text, "%m/%d/%Y").ok())
}

fn parse_date_time(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|pattern| NaiveDateTime::parse_from_str(text, pattern).ok())
        .map(|naive| naive.and_utc().fixed_offset())
        .or_else(|| NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(midnight_utc))
}

fn midnight_utc(date: NaiveDate) -> DateTime<FixedOffset> {
    date.and_time(NaiveTime::MIN).and_utc().fixed_offset()
}

/// Render a value through a composite format template
pub fn format_template(template: &str, value: &ScalarValue) -> Result<String> {
    let invalid = |message: String| MappingError::invalid_format_template(template, message);
    let mut output = String::with_capacity(template.len() + 16);
    let mut last = 0;

    for captures in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        push_literal(&mut output, &template[last..whole.start()]).map_err(invalid)?;
        last = whole.end();

        match whole.as_str() {
            "{{" => output.push('{'),
            "}}" => output.push('}'),
            _ => {
                let argument = captures.get(1).map_or("", |m| m.as_str());
                if argument != "0" {
                    return Err(invalid(format!("argument {{{argument}}} does not exist")));
                }
                let spec = captures.get(3).map_or("", |m| m.as_str());
                let rendered = format_value(value, spec).map_err(invalid)?;
                match captures.get(2) {
                    Some(alignment) => {
                        let alignment: i64 = alignment
                            .as_str()
                            .parse()
                            .map_err(|_| invalid("alignment out of range".to_string()))?;
                        align(&mut output, &rendered, alignment);
                    }
                    None => output.push_str(&rendered),
                }
            }
        }
    }

    push_literal(&mut output, &template[last..]).map_err(invalid)?;
    Ok(output)
}

fn push_literal(output: &mut String, literal: &str) -> std::result::Result<(), String> {
    if let Some(brace) = literal.find(['{', '}']) {
        return Err(format!("unescaped brace in '{}'", &literal[brace..]));
    }
    output.push_str(literal);
    Ok(())
}

fn align(output: &mut String, rendered: &str, alignment: i64) {
    let width = alignment.unsigned_abs() as usize;
    let padding = width.saturating_sub(rendered.chars().count());
    if alignment >= 0 {
        output.extend(std::iter::repeat_n(' ', padding));
        output.push_str(rendered);
    } else {
        output.push_str(rendered);
        output.extend(std::iter::repeat_n(' ', padding));
    }
}

/// Render one value with a format spec
fn format_value(value: &ScalarValue, spec: &str) -> std::result::Result<String, String> {
    match value {
        ScalarValue::Null => Ok(String::new()),
        ScalarValue::Integer(i) => format_number(Decimal::from(*i), spec, true),
        ScalarValue::Decimal(d) => format_number(*d, spec, d.fract().is_zero()),
        ScalarValue::Date(d) => Ok(format_moment(&Moment::from_date(*d), spec)),
        ScalarValue::DateTime(dt) => Ok(format_moment(&Moment::from_date_time(dt), spec)),
        ScalarValue::Guid(g) => format_guid(g, spec),
        ScalarValue::String(s) => Ok(match spec {
            "U" | "u" => s.to_uppercase(),
            "L" | "l" => s.to_lowercase(),
            _ => s.clone(),
        }),
        ScalarValue::Boolean(_) | ScalarValue::Number(_) | ScalarValue::Uri(_) => {
            Ok(value.to_string())
        }
    }
}

fn format_guid(guid: &Uuid, spec: &str) -> std::result::Result<String, String> {
    match spec {
        "" | "D" | "d" => Ok(guid.hyphenated().to_string()),
        "N" | "n" => Ok(guid.simple().to_string()),
        "B" | "b" => Ok(guid.braced().to_string()),
        "P" | "p" => Ok(format!("({})", guid.hyphenated())),
        other => Err(format!("'{other}' is not a GUID format")),
    }
}

fn format_number(
    value: Decimal,
    spec: &str,
    integral: bool,
) -> std::result::Result<String, String> {
    if spec.is_empty() {
        return Ok(value.normalize().to_string());
    }
    if spec.chars().all(|c| matches!(c, '0' | '#' | ',' | '.')) {
        return Ok(format_custom_number(value, spec));
    }

    let mut chars = spec.chars();
    let letter = chars.next().unwrap_or('G');
    let digits = chars.as_str();
    let precision: Option<u32> = if digits.is_empty() {
        None
    } else {
        Some(
            digits
                .parse()
                .map_err(|_| format!("invalid precision in '{spec}'"))?,
        )
    };

    match letter {
        'N' | 'n' => Ok(fixed(value, precision.unwrap_or(2), true)),
        'F' | 'f' => Ok(fixed(value, precision.unwrap_or(2), false)),
        'P' | 'p' => {
            let percent = value
                .checked_mul(Decimal::ONE_HUNDRED)
                .ok_or_else(|| format!("{value} is out of range for '{spec}'"))?;
            Ok(format!("{} %", fixed(percent, precision.unwrap_or(2), true)))
        }
        'G' | 'g' => Ok(match precision {
            Some(dp) => round(value, dp).normalize().to_string(),
            None => value.normalize().to_string(),
        }),
        'D' | 'd' => {
            let integer = integral
                .then(|| value.to_i64())
                .flatten()
                .ok_or_else(|| format!("'{spec}' requires an integral value"))?;
            let width = precision.unwrap_or(0) as usize;
            let sign = if integer < 0 { "-" } else { "" };
            Ok(format!("{sign}{:0width$}", integer.unsigned_abs()))
        }
        'X' | 'x' => {
            let integer = integral
                .then(|| value.to_i64())
                .flatten()
                .ok_or_else(|| format!("'{spec}' requires an integral value"))?;
            let width = precision.unwrap_or(0) as usize;
            Ok(if letter == 'X' {
                format!("{integer:0width$X}")
            } else {
                format!("{integer:0width$x}")
            })
        }
        _ => Err(format!("'{spec}' is not a numeric format")),
    }
}

fn round(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

fn fixed(value: Decimal, dp: u32, group: bool) -> String {
    let text = format!("{:.*}", dp as usize, round(value, dp));
    if group { group_thousands(&text) } else { text }
}

fn group_thousands(text: &str) -> String {
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(text.len() + integer.len() / 3);
    grouped.push_str(sign);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(fraction) = fraction {
        grouped.push('.');
        grouped.push_str(fraction);
    }
    grouped
}

/// Picture formats such as `0.00`, `#,##0.0#`, `000`
fn format_custom_number(value: Decimal, spec: &str) -> String {
    let (integer_part, fraction_part) = spec.split_once('.').unwrap_or((spec, ""));
    let max_dp = fraction_part.chars().filter(|c| matches!(c, '0' | '#')).count() as u32;
    let min_dp = fraction_part.chars().take_while(|c| *c == '0').count();
    let min_integer = integer_part.chars().filter(|c| *c == '0').count();
    let group = integer_part.contains(',');

    let text = format!("{:.*}", max_dp as usize, round(value, max_dp));
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let mut fraction = fraction.to_string();
    while fraction.len() > min_dp && fraction.ends_with('0') {
        fraction.pop();
    }
    let integer = integer.trim_start_matches('0');
    let integer = format!("{integer:0>min_integer$}");

    let mut result = String::new();
    result.push_str(sign);
    if group {
        result.push_str(&group_thousands(&integer));
    } else {
        result.push_str(&integer);
    }
    if !fraction.is_empty() {
        result.push('.');
        result.push_str(&fraction);
    }
    if result.is_empty() || result == "-" {
        result = "0".to_string();
    }
    result
}

/// Calendar fields shared by dates and date-times
struct Moment {
    date: NaiveDate,
    time: NaiveTime,
    offset: Option<FixedOffset>,
}

impl Moment {
    fn from_date(date: NaiveDate) -> Self {
        Self {
            date,
            time: NaiveTime::MIN,
            offset: None,
        }
    }

    fn from_date_time(value: &DateTime<FixedOffset>) -> Self {
        Self {
            date: value.date_naive(),
            time: value.time(),
            offset: Some(*value.offset()),
        }
    }

    fn to_date_time(&self) -> DateTime<FixedOffset> {
        let naive = self.date.and_time(self.time);
        self.offset
            .and_then(|offset| naive.and_local_timezone(offset).single())
            .unwrap_or_else(|| naive.and_utc().fixed_offset())
    }
}

fn format_moment(moment: &Moment, spec: &str) -> String {
    match spec {
        "" => match moment.offset {
            Some(_) => moment.to_date_time().to_rfc3339(),
            None => moment.date.format("%Y-%m-%d").to_string(),
        },
        "d" => moment.date.format("%m/%d/%Y").to_string(),
        "s" => format!(
            "{}T{}",
            moment.date.format("%Y-%m-%d"),
            moment.time.format("%H:%M:%S")
        ),
        "o" | "O" => moment
            .to_date_time()
            .to_rfc3339_opts(SecondsFormat::AutoSi, false),
        custom => format_custom_moment(moment, custom),
    }
}

fn format_custom_moment(moment: &Moment, spec: &str) -> String {
    let chars: Vec<char> = spec.chars().collect();
    let mut output = String::with_capacity(spec.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }

        match c {
            '\'' | '"' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j] != c {
                    output.push(chars[j]);
                    j += 1;
                }
                i = j + 1;
                continue;
            }
            '\\' => {
                if let Some(next) = chars.get(i + 1) {
                    output.push(*next);
                }
                i += 2;
                continue;
            }
            _ => {}
        }

        let date = &moment.date;
        let time = &moment.time;
        // write! to a String never fails
        let _ = match (c, run) {
            ('y', 1) => write!(output, "{}", date.year() % 100),
            ('y', 2) => write!(output, "{:02}", date.year() % 100),
            ('y', n) => write!(output, "{:0n$}", date.year()),
            ('M', 1) => write!(output, "{}", date.month()),
            ('M', 2) => write!(output, "{:02}", date.month()),
            ('M', 3) => write!(output, "{}", &MONTH_NAMES[date.month0() as usize][..3]),
            ('M', _) => write!(output, "{}", MONTH_NAMES[date.month0() as usize]),
            ('d', 1) => write!(output, "{}", date.day()),
            ('d', 2) => write!(output, "{:02}", date.day()),
            ('d', 3) => write!(
                output,
                "{}",
                &DAY_NAMES[date.weekday().num_days_from_monday() as usize][..3]
            ),
            ('d', _) => write!(
                output,
                "{}",
                DAY_NAMES[date.weekday().num_days_from_monday() as usize]
            ),
            ('H', 1) => write!(output, "{}", time.hour()),
            ('H', _) => write!(output, "{:02}", time.hour()),
            ('h', 1) => write!(output, "{}", twelve_hour(time.hour())),
            ('h', _) => write!(output, "{:02}", twelve_hour(time.hour())),
            ('m', 1) => write!(output, "{}", time.minute()),
            ('m', _) => write!(output, "{:02}", time.minute()),
            ('s', 1) => write!(output, "{}", time.second()),
            ('s', _) => write!(output, "{:02}", time.second()),
            ('f', n) => {
                let nanos = format!("{:09}", time.nanosecond() % 1_000_000_000);
                write!(output, "{}", &nanos[..n.min(9)])
            }
            ('t', 1) => write!(output, "{}", if time.hour() < 12 { "A" } else { "P" }),
            ('t', _) => write!(output, "{}", if time.hour() < 12 { "AM" } else { "PM" }),
            ('z', n) | ('K', n) => {
                if let Some(offset) = moment.offset {
                    let seconds = offset.local_minus_utc();
                    let sign = if seconds < 0 { '-' } else { '+' };
                    let hours = seconds.abs() / 3600;
                    let minutes = seconds.abs() % 3600 / 60;
                    match (c, n) {
                        ('z', 1) => write!(output, "{sign}{hours}"),
                        ('z', 2) => write!(output, "{sign}{hours:02}"),
                        _ => write!(output, "{sign}{hours:02}:{minutes:02}"),
                    }
                } else {
                    Ok(())
                }
            }
            (other, n) => {
                output.extend(std::iter::repeat_n(other, n));
                Ok(())
            }
        };
        i += run;
    }

    output
}

fn twelve_hour(hour: u32) -> u32 {
    match hour % 12 {
        0 => 12,
        h => h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> ScalarValue {
        ScalarValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[rstest]
    #[case("{0:N2}", ScalarValue::Decimal(Decimal::new(123450, 2)), "1,234.50")]
    #[case("{0:F1}", ScalarValue::Decimal(Decimal::new(125, 2)), "1.3")]
    #[case("{0:D4}", ScalarValue::Integer(42), "0042")]
    #[case("{0:X}", ScalarValue::Integer(255), "FF")]
    #[case("{0:P1}", ScalarValue::Decimal(Decimal::new(125, 3)), "12.5 %")]
    #[case("{0:0.00}", ScalarValue::Integer(7), "7.00")]
    #[case("{0:#,##0.##}", ScalarValue::Decimal(Decimal::new(12345678, 3)), "12,345.68")]
    #[case("{{{0}}}", ScalarValue::Integer(3), "{3}")]
    #[case("[{0,5}]", ScalarValue::from("ab"), "[   ab]")]
    #[case("[{0,-5}]", ScalarValue::from("ab"), "[ab   ]")]
    #[case("{0:U}", ScalarValue::from("abc"), "ABC")]
    #[case("Total: {0}", ScalarValue::Null, "Total: ")]
    fn test_format_template(
        #[case] template: &str,
        #[case] value: ScalarValue,
        #[case] expected: &str,
    ) {
        assert_eq!(format_template(template, &value).unwrap(), expected);
    }

    #[rstest]
    #[case("{0:yyyy-MM-dd}", "2024-03-09")]
    #[case("{0:dd/MM/yy}", "09/03/24")]
    #[case("{0:d MMM yyyy}", "9 Mar 2024")]
    #[case("{0:dddd}", "Saturday")]
    #[case("{0:d}", "03/09/2024")]
    #[case("{0:'Day' d}", "Day 9")]
    fn test_date_formats(#[case] template: &str, #[case] expected: &str) {
        assert_eq!(format_template(template, &date(2024, 3, 9)).unwrap(), expected);
    }

    #[test]
    fn test_date_time_formats() {
        let value = ScalarValue::DateTime(
            DateTime::parse_from_rfc3339("2024-03-09T14:05:07.250+02:00").unwrap(),
        );
        assert_eq!(
            format_template("{0:yyyy-MM-dd HH:mm:ss.fff zzz}", &value).unwrap(),
            "2024-03-09 14:05:07.250 +02:00"
        );
        assert_eq!(format_template("{0:hh:mm tt}", &value).unwrap(), "02:05 PM");
        assert_eq!(format_template("{0:s}", &value).unwrap(), "2024-03-09T14:05:07");
    }

    #[test]
    fn test_guid_formats() {
        let value = ScalarValue::Guid(Uuid::parse_str("6f9619ff-8b86-d011-b42d-00c04fc964ff").unwrap());
        assert_eq!(
            format_template("{0:N}", &value).unwrap(),
            "6f9619ff8b86d011b42d00c04fc964ff"
        );
        assert_eq!(
            format_template("{0:B}", &value).unwrap(),
            "{6f9619ff-8b86-d011-b42d-00c04fc964ff}"
        );
    }

    #[rstest]
    #[case("{1}")]
    #[case("a { b")]
    #[case("{0:Q}")]
    fn test_invalid_templates(#[case] template: &str) {
        let err = format_template(template, &ScalarValue::Integer(1)).unwrap_err();
        assert!(matches!(err, MappingError::InvalidFormatTemplate { .. }));
    }

    #[test]
    fn test_coercion() {
        assert_eq!(
            coerce(&ScalarValue::from(" 12 "), SourceType::Integer).unwrap(),
            ScalarValue::Integer(12)
        );
        assert_eq!(
            coerce(&ScalarValue::from("2024-03-09"), SourceType::Date).unwrap(),
            date(2024, 3, 9)
        );
        assert_eq!(
            coerce(&ScalarValue::from("yes"), SourceType::Boolean).unwrap(),
            ScalarValue::Boolean(true)
        );
        assert_eq!(
            coerce(&ScalarValue::Null, SourceType::Decimal).unwrap(),
            ScalarValue::Null
        );
        assert!(matches!(
            coerce(&ScalarValue::from("12.5"), SourceType::Integer),
            Err(MappingError::Conversion { .. })
        ));
        assert!(matches!(
            coerce(&ScalarValue::Integer(1), SourceType::Guid),
            Err(MappingError::Conversion { .. })
        ));
    }

    #[test]
    fn test_percent_overflow_is_an_error() {
        let err = format_template("{0:P}", &ScalarValue::Decimal(Decimal::MAX)).unwrap_err();
        assert!(matches!(
            err,
            MappingError::InvalidFormatTemplate { ref message, .. } if message.contains("out of range")
        ));
    }

    #[test]
    fn test_apply_format_without_template_coerces() {
        let descriptor = FormatDescriptor::new("amount", SourceType::Decimal, None);
        assert_eq!(
            apply_format(&ScalarValue::from("19.99"), &descriptor).unwrap(),
            ScalarValue::Decimal(Decimal::new(1999, 2))
        );
    }
}
