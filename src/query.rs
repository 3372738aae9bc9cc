//! Turning user keyword strings into tantivy queries.
//!
//! Plain input goes straight to tantivy's [`QueryParser`]. Input containing
//! `*` or `?` is split on whitespace and every wildcard token becomes a
//! [`RegexQuery`] over the analyzed terms, which is how a search for
//! `*fish` can find `starfish`.

use tantivy::{
    query::{BooleanQuery, Occur, Query, QueryParser, RegexQuery},
    schema::Field,
};
use tracing::debug;

use crate::{
    error::{Error, Result},
    tantivy_index::SearchIndex,
};

/// Builds queries against a fixed set of default fields.
pub struct KeywordParser<'a> {
    index: &'a SearchIndex,
    default_fields: Vec<Field>,
    allow_leading_wildcard: bool,
}

impl<'a> KeywordParser<'a> {
    pub fn new(index: &'a SearchIndex, default_fields: Vec<Field>) -> Self {
        Self {
            index,
            default_fields,
            allow_leading_wildcard: false,
        }
    }

    /// Permit patterns such as `*fish`. These scan the whole term
    /// dictionary of the field instead of seeking to a prefix.
    pub fn allow_leading_wildcard(mut self, allow: bool) -> Self {
        self.allow_leading_wildcard = allow;
        self
    }

    pub fn parse(&self, input: &str) -> Result<Box<dyn Query>> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::EmptyQuery);
        }

        if !has_wildcard(input) {
            return Ok(self.query_parser().parse_query(input)?);
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for token in input.split_whitespace() {
            let (occur, token) = split_operator(token);
            if token.is_empty() {
                continue;
            }
            let query = if has_wildcard(token) {
                self.wildcard_query(token)?
            } else {
                self.query_parser().parse_query(token)?
            };
            clauses.push((occur, query));
        }
        if clauses.is_empty() {
            return Err(Error::EmptyQuery);
        }

        debug!(input, clauses = clauses.len(), "built wildcard query");
        Ok(single_or_union(clauses))
    }

    fn query_parser(&self) -> QueryParser {
        QueryParser::for_index(
            self.index.index(),
            self.default_fields.clone(),
        )
    }

    fn wildcard_query(&self, token: &str) -> Result<Box<dyn Query>> {
        let (fields, pattern) = match token.split_once(':') {
            Some((name, pattern))
                if self.index.schema().get_field(name).is_ok() =>
            {
                (vec![self.index.field(name)?], pattern)
            }
            _ => (self.default_fields.clone(), token),
        };

        if !self.allow_leading_wildcard && pattern.starts_with(['*', '?']) {
            return Err(Error::LeadingWildcard(token.to_string()));
        }

        let regex = wildcard_to_regex(pattern).ok_or_else(|| {
            Error::InvalidQuery(format!(
                "wildcard '{token}' has no literal characters"
            ))
        })?;

        let mut clauses: Vec<(Occur, Box<dyn Query>)> =
            Vec::with_capacity(fields.len());
        for field in fields {
            let query = RegexQuery::from_pattern(&regex, field)?;
            clauses.push((Occur::Should, Box::new(query)));
        }
        Ok(single_or_union(clauses))
    }
}

/// Inclusive range query over a u64 field.
pub fn numeric_range(
    index: &SearchIndex,
    field_name: &str,
    lower: u64,
    upper: u64,
) -> Result<Box<dyn Query>> {
    let field = index.field(field_name)?;
    let parser = QueryParser::for_index(index.index(), vec![field]);
    Ok(parser.parse_query(&format!("{field_name}:[{lower} TO {upper}]"))?)
}

/// Split a `+`/`-` prefix off a token and drop grouping parentheses.
fn split_operator(token: &str) -> (Occur, &str) {
    let (occur, rest) = match token.as_bytes().first() {
        Some(b'+') => (Occur::Must, &token[1..]),
        Some(b'-') => (Occur::MustNot, &token[1..]),
        _ => (Occur::Should, token),
    };
    (occur, rest.trim_start_matches('(').trim_end_matches(')'))
}

fn single_or_union(mut clauses: Vec<(Occur, Box<dyn Query>)>) -> Box<dyn Query> {
    if clauses.len() == 1 && clauses[0].0 != Occur::MustNot {
        clauses.remove(0).1
    } else {
        Box::new(BooleanQuery::new(clauses))
    }
}

pub fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?'])
}

/// Translate a wildcard pattern into a regex over analyzed (lowercased)
/// terms. Characters that the analyzer never keeps inside a term are
/// dropped. Returns `None` when nothing but wildcards remains.
pub fn wildcard_to_regex(pattern: &str) -> Option<String> {
    let mut regex = String::with_capacity(pattern.len() + 4);
    let mut literals = 0;

    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            c if c.is_alphanumeric() || c == '_' => {
                regex.extend(c.to_lowercase());
                literals += 1;
            }
            _ => {}
        }
    }

    (literals > 0).then_some(regex)
}
