//! Declarative filter predicates.
//!
//! A filter is a boolean expression over an event's snapshot fields, written
//! in blueprint configuration as a string such as
//! `_type == "page" && !defined(autoSummary)`. Filter strings are parsed
//! once at load time into a typed AST; malformed filters are a configuration
//! error and fail startup instead of surfacing at dispatch time.
//!
//! Evaluation is pure and total: it never errors for any snapshot. Missing
//! fields make comparison clauses false (`!defined(...)` tests true), and
//! type mismatches evaluate to false. Filters are advisory routing
//! conditions, not schema validators.
//!
//! A path with the `previous.` prefix resolves against the event's prior
//! snapshot; when no prior snapshot was supplied every such path is
//! undefined.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::Snapshot;
use crate::value::FieldValue;

/// Path prefix that redirects resolution to the prior snapshot.
const PREVIOUS_PREFIX: &str = "previous.";

/// A single boolean clause over one field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Clause {
    /// Field equals a literal value.
    Equals {
        /// Dotted field path.
        path: String,
        /// Literal to compare against.
        value: FieldValue,
    },

    /// Field differs from a literal value (same-type comparison only).
    NotEquals {
        /// Dotted field path.
        path: String,
        /// Literal to compare against.
        value: FieldValue,
    },

    /// Field is present and not null.
    IsDefined {
        /// Dotted field path.
        path: String,
    },

    /// Field is absent or null.
    IsNotDefined {
        /// Dotted field path.
        path: String,
    },
}

impl Clause {
    /// Creates an equality clause.
    #[must_use]
    pub fn equals(path: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::Equals {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Creates an inequality clause.
    #[must_use]
    pub fn not_equals(path: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::NotEquals {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Creates a definedness test.
    #[must_use]
    pub fn is_defined(path: impl Into<String>) -> Self {
        Self::IsDefined { path: path.into() }
    }

    /// Creates a not-defined test.
    #[must_use]
    pub fn is_not_defined(path: impl Into<String>) -> Self {
        Self::IsNotDefined { path: path.into() }
    }

    /// The field path this clause inspects.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Equals { path, .. }
            | Self::NotEquals { path, .. }
            | Self::IsDefined { path }
            | Self::IsNotDefined { path } => path,
        }
    }

    fn evaluate(&self, snapshot: &Snapshot, previous: Option<&Snapshot>) -> bool {
        match self {
            Self::Equals { path, value } => {
                resolve(path, snapshot, previous).is_some_and(|field| values_equal(field, value))
            }
            Self::NotEquals { path, value } => resolve(path, snapshot, previous)
                .is_some_and(|field| comparable(field, value) && !values_equal(field, value)),
            Self::IsDefined { path } => {
                resolve(path, snapshot, previous).is_some_and(|v| !v.is_null())
            }
            Self::IsNotDefined { path } => {
                !resolve(path, snapshot, previous).is_some_and(|v| !v.is_null())
            }
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals { path, value } => write!(f, "{path} == {}", literal(value)),
            Self::NotEquals { path, value } => write!(f, "{path} != {}", literal(value)),
            Self::IsDefined { path } => write!(f, "defined({path})"),
            Self::IsNotDefined { path } => write!(f, "!defined({path})"),
        }
    }
}

fn literal(value: &FieldValue) -> String {
    match value {
        FieldValue::String(s) => format!("{s:?}"),
        other => other.to_string(),
    }
}

fn resolve<'a>(
    path: &str,
    snapshot: &'a Snapshot,
    previous: Option<&'a Snapshot>,
) -> Option<&'a FieldValue> {
    if let Some(rest) = path.strip_prefix(PREVIOUS_PREFIX) {
        previous?.get_path(rest)
    } else {
        snapshot.get_path(path)
    }
}

/// Two values are comparable when they share a type, counting `Int` and
/// `Float` as one numeric type. Incomparable pairs make the clause false.
fn comparable(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::Int(_) | FieldValue::Float(_), FieldValue::Int(_) | FieldValue::Float(_)) => {
            true
        }
        _ => std::mem::discriminant(a) == std::mem::discriminant(b),
    }
}

fn values_equal(a: &FieldValue, b: &FieldValue) -> bool {
    match (a.as_float(), b.as_float()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// A declarative boolean filter: the conjunction of its clauses.
///
/// The empty predicate matches every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterPredicate {
    clauses: Vec<Clause>,
}

impl FilterPredicate {
    /// A predicate that matches every event.
    #[must_use]
    pub const fn always() -> Self {
        Self { clauses: Vec::new() }
    }

    /// Builds a predicate from explicit clauses.
    #[must_use]
    pub fn new(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }

    /// Appends a clause, keeping conjunction semantics.
    #[must_use]
    pub fn and(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    /// The clauses in source order.
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Parses a filter expression string into a predicate.
    ///
    /// Grammar: `clause ("&&" clause)*` where a clause is `defined(path)`,
    /// `!defined(path)`, or `path ==|!= literal`; literals are double-quoted
    /// strings, integers, floats, `true`, `false`, or `null`. A blank string
    /// parses to the always-matching predicate.
    ///
    /// # Errors
    /// Returns [`FilterParseError`] describing the first syntax problem.
    pub fn parse(input: &str) -> Result<Self, FilterParseError> {
        Parser::new(input).parse_filter()
    }

    /// Evaluates the predicate against a snapshot pair.
    ///
    /// Deterministic and side-effect free: the same inputs always yield the
    /// same boolean, and no snapshot can make evaluation fail.
    #[must_use]
    pub fn evaluate(&self, snapshot: &Snapshot, previous: Option<&Snapshot>) -> bool {
        self.clauses
            .iter()
            .all(|clause| clause.evaluate(snapshot, previous))
    }

    /// True when this predicate has no clauses.
    #[must_use]
    pub fn is_always(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return write!(f, "true");
        }
        let rendered: Vec<String> = self.clauses.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(" && "))
    }
}

/// Syntax error in a filter expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} at offset {offset}")]
pub struct FilterParseError {
    /// What went wrong.
    pub message: String,
    /// Byte offset into the source string.
    pub offset: usize,
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> FilterParseError {
        FilterParseError {
            message: message.into(),
            offset: self.pos,
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, expected: &str) -> bool {
        if self.src[self.pos..].starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }

    fn parse_filter(&mut self) -> Result<FilterPredicate, FilterParseError> {
        self.skip_ws();
        if self.pos == self.bytes.len() {
            return Ok(FilterPredicate::always());
        }

        let mut clauses = vec![self.parse_clause()?];
        loop {
            self.skip_ws();
            if self.pos == self.bytes.len() {
                break;
            }
            if !self.eat("&&") {
                return Err(self.error("expected '&&' between clauses"));
            }
            self.skip_ws();
            clauses.push(self.parse_clause()?);
        }

        Ok(FilterPredicate::new(clauses))
    }

    fn parse_clause(&mut self) -> Result<Clause, FilterParseError> {
        self.skip_ws();

        if self.eat("!") {
            self.skip_ws();
            let path = self.parse_defined_call()?;
            return Ok(Clause::IsNotDefined { path });
        }

        // `defined(` is only a function call when followed by a parenthesis;
        // otherwise `defined` is an ordinary field name.
        let checkpoint = self.pos;
        if self.eat("defined") {
            self.skip_ws();
            let is_call = self.peek() == Some(b'(');
            self.pos = checkpoint;
            if is_call {
                let path = self.parse_defined_call()?;
                return Ok(Clause::IsDefined { path });
            }
        }

        let path = self.parse_path()?;
        self.skip_ws();

        let negated = if self.eat("==") {
            false
        } else if self.eat("!=") {
            true
        } else {
            return Err(self.error("expected '==', '!=' or 'defined(...)'"));
        };

        self.skip_ws();
        let value = self.parse_literal()?;

        if negated {
            Ok(Clause::NotEquals { path, value })
        } else {
            Ok(Clause::Equals { path, value })
        }
    }

    fn parse_defined_call(&mut self) -> Result<String, FilterParseError> {
        if !self.eat("defined") {
            return Err(self.error("expected 'defined'"));
        }
        self.skip_ws();
        if !self.eat("(") {
            return Err(self.error("expected '(' after 'defined'"));
        }
        self.skip_ws();
        let path = self.parse_path()?;
        self.skip_ws();
        if !self.eat(")") {
            return Err(self.error("expected ')' after path"));
        }
        Ok(path)
    }

    fn parse_path(&mut self) -> Result<String, FilterParseError> {
        let start = self.pos;
        let mut expect_segment = true;
        while let Some(c) = self.peek() {
            if c == b'.' {
                if expect_segment {
                    break;
                }
                expect_segment = true;
                self.pos += 1;
            } else if c.is_ascii_alphanumeric() || c == b'_' {
                if expect_segment && c.is_ascii_digit() {
                    break;
                }
                expect_segment = false;
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start || expect_segment {
            return Err(self.error("expected field path"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn parse_literal(&mut self) -> Result<FieldValue, FilterParseError> {
        match self.peek() {
            Some(b'"') => self.parse_string(),
            Some(c) if c == b'-' || c.is_ascii_digit() => self.parse_number(),
            _ => {
                if self.eat("true") {
                    Ok(FieldValue::Bool(true))
                } else if self.eat("false") {
                    Ok(FieldValue::Bool(false))
                } else if self.eat("null") {
                    Ok(FieldValue::Null)
                } else {
                    Err(self.error("expected literal (string, number, true, false, or null)"))
                }
            }
        }
    }

    fn parse_string(&mut self) -> Result<FieldValue, FilterParseError> {
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string literal")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(FieldValue::String(out));
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b'"') => out.push('"'),
                        Some(b'\\') => out.push('\\'),
                        Some(b'n') => out.push('\n'),
                        Some(b't') => out.push('\t'),
                        _ => return Err(self.error("invalid escape in string literal")),
                    }
                    self.pos += 1;
                }
                Some(_) => {
                    // Consume one full UTF-8 scalar.
                    let ch = self.src[self.pos..]
                        .chars()
                        .next()
                        .ok_or_else(|| self.error("invalid utf-8 in string literal"))?;
                    out.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }

    fn parse_number(&mut self) -> Result<FieldValue, FilterParseError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == b'.' && !is_float {
                is_float = true;
                self.pos += 1;
            } else {
                break;
            }
        }

        let text = &self.src[start..self.pos];
        if is_float {
            text.parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| self.error("invalid float literal"))
        } else {
            text.parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|_| self.error("invalid integer literal"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(json: serde_json::Value) -> Snapshot {
        let FieldValue::Object(map) = FieldValue::from(json) else {
            panic!("snapshot fixture must be an object");
        };
        Snapshot::from(map)
    }

    #[test]
    fn parse_type_and_definedness_filter() {
        let filter = FilterPredicate::parse("_type == \"page\" && !defined(autoSummary)").unwrap();
        assert_eq!(filter.clauses().len(), 2);
        assert_eq!(
            filter.clauses()[0],
            Clause::equals("_type", "page")
        );
        assert_eq!(filter.clauses()[1], Clause::is_not_defined("autoSummary"));
    }

    #[test]
    fn parse_all_literal_forms() {
        let filter = FilterPredicate::parse(
            "a == 1 && b == -2.5 && c == true && d == false && e == null && f != \"x\"",
        )
        .unwrap();
        assert_eq!(filter.clauses().len(), 6);
        assert_eq!(filter.clauses()[0], Clause::equals("a", 1i64));
        assert_eq!(filter.clauses()[1], Clause::equals("b", -2.5));
        assert_eq!(filter.clauses()[4], Clause::equals("e", FieldValue::Null));
        assert_eq!(filter.clauses()[5], Clause::not_equals("f", "x"));
    }

    #[test]
    fn parse_blank_filter_matches_everything() {
        let filter = FilterPredicate::parse("   ").unwrap();
        assert!(filter.is_always());
        assert!(filter.evaluate(&Snapshot::new(), None));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for bad in [
            "_type ==",
            "_type = \"page\"",
            "defined(",
            "defined()",
            "!undefined(x)",
            "a == \"unterminated",
            "a == 1 &&",
            "a == 1 || b == 2",
            ". == 1",
        ] {
            assert!(
                FilterPredicate::parse(bad).is_err(),
                "expected parse error for {bad:?}"
            );
        }
    }

    #[test]
    fn parse_defined_as_field_name() {
        // `defined` with no parenthesis is an ordinary path.
        let filter = FilterPredicate::parse("defined == true").unwrap();
        assert_eq!(filter.clauses()[0], Clause::equals("defined", true));
    }

    #[test]
    fn parse_error_reports_offset() {
        let err = FilterPredicate::parse("a == 1 &&").unwrap_err();
        assert!(err.offset >= 9);
        assert!(err.to_string().contains("offset"));
    }

    #[test]
    fn evaluate_scenario_page_without_summary() {
        let filter = FilterPredicate::parse("_type == \"page\" && !defined(autoSummary)").unwrap();

        let matching = snap(serde_json::json!({"_type": "page", "body": "text"}));
        assert!(filter.evaluate(&matching, None));

        let already_summarized =
            snap(serde_json::json!({"_type": "page", "autoSummary": "done"}));
        assert!(!filter.evaluate(&already_summarized, None));

        let wrong_type = snap(serde_json::json!({"_type": "post"}));
        assert!(!filter.evaluate(&wrong_type, None));
    }

    #[test]
    fn evaluate_null_field_is_not_defined() {
        let filter = FilterPredicate::parse("!defined(publishedAt)").unwrap();
        let snapshot = snap(serde_json::json!({"publishedAt": null}));
        assert!(filter.evaluate(&snapshot, None));

        let defined = snap(serde_json::json!({"publishedAt": "2024-01-01"}));
        assert!(!filter.evaluate(&defined, None));
    }

    #[test]
    fn evaluate_missing_field_never_errors() {
        let snapshot = snap(serde_json::json!({"present": 1}));

        assert!(!FilterPredicate::parse("absent == 1")
            .unwrap()
            .evaluate(&snapshot, None));
        assert!(!FilterPredicate::parse("absent != 1")
            .unwrap()
            .evaluate(&snapshot, None));
        assert!(!FilterPredicate::parse("defined(absent)")
            .unwrap()
            .evaluate(&snapshot, None));
        assert!(FilterPredicate::parse("!defined(absent)")
            .unwrap()
            .evaluate(&snapshot, None));
    }

    #[test]
    fn evaluate_type_mismatch_is_false() {
        let snapshot = snap(serde_json::json!({"title": "Hello"}));

        // String field vs numeric literal: false for both operators.
        assert!(!FilterPredicate::parse("title == 3")
            .unwrap()
            .evaluate(&snapshot, None));
        assert!(!FilterPredicate::parse("title != 3")
            .unwrap()
            .evaluate(&snapshot, None));
    }

    #[test]
    fn evaluate_numeric_cross_type_comparison() {
        let snapshot = snap(serde_json::json!({"count": 3}));
        assert!(FilterPredicate::parse("count == 3.0")
            .unwrap()
            .evaluate(&snapshot, None));
        assert!(FilterPredicate::parse("count != 4")
            .unwrap()
            .evaluate(&snapshot, None));
    }

    #[test]
    fn evaluate_not_equals_requires_defined_field() {
        let filter = FilterPredicate::parse("status != \"archived\"").unwrap();
        let active = snap(serde_json::json!({"status": "active"}));
        assert!(filter.evaluate(&active, None));

        let archived = snap(serde_json::json!({"status": "archived"}));
        assert!(!filter.evaluate(&archived, None));

        // Undefined field: clause is false, not true.
        assert!(!filter.evaluate(&Snapshot::new(), None));
    }

    #[test]
    fn evaluate_nested_path() {
        let filter = FilterPredicate::parse("author.role == \"editor\"").unwrap();
        let snapshot = snap(serde_json::json!({"author": {"role": "editor"}}));
        assert!(filter.evaluate(&snapshot, None));
    }

    #[test]
    fn evaluate_previous_prefix_reads_prior_snapshot() {
        let filter =
            FilterPredicate::parse("status == \"published\" && previous.status != \"published\"")
                .unwrap();

        let current = snap(serde_json::json!({"status": "published"}));
        let prior = snap(serde_json::json!({"status": "draft"}));
        assert!(filter.evaluate(&current, Some(&prior)));

        // Without a prior snapshot, `previous.*` paths are undefined.
        assert!(!filter.evaluate(&current, None));

        let unchanged = snap(serde_json::json!({"status": "published"}));
        assert!(!filter.evaluate(&current, Some(&unchanged)));
    }

    #[test]
    fn evaluate_is_deterministic() {
        let filter = FilterPredicate::parse("_type == \"page\" && defined(title)").unwrap();
        let snapshot = snap(serde_json::json!({"_type": "page", "title": "t"}));
        let first = filter.evaluate(&snapshot, None);
        for _ in 0..10 {
            assert_eq!(filter.evaluate(&snapshot, None), first);
        }
    }

    #[test]
    fn display_round_trips_through_parse() {
        let source = "_type == \"page\" && !defined(autoSummary) && count == 3";
        let filter = FilterPredicate::parse(source).unwrap();
        let rendered = filter.to_string();
        let reparsed = FilterPredicate::parse(&rendered).unwrap();
        assert_eq!(filter, reparsed);
    }

    #[test]
    fn filter_serialization() {
        let filter = FilterPredicate::parse("_type == \"page\"").unwrap();
        let json = serde_json::to_string(&filter).unwrap();
        let back: FilterPredicate = serde_json::from_str(&json).unwrap();
        assert_eq!(filter, back);
    }
}
