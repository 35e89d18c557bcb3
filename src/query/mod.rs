//! Boolean term queries and numeric filters.

use serde::{Deserialize, Serialize};

use crate::schema::FieldKind;

/// A single field/term match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    /// Field to match in.
    pub field: String,
    /// Term to match.
    pub word: String,
}

/// A boolean query tree.
///
/// Exactly one of the three members is populated: `keyword` for a leaf,
/// `must` for AND semantics, `should` for OR semantics. The distinguished
/// empty query (all three unset) means "no keyword constraint" at the top
/// level of a search; inside a tree it evaluates to the empty set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermQuery {
    /// Leaf match.
    pub keyword: Option<Keyword>,
    /// Subqueries that must all match.
    pub must: Vec<TermQuery>,
    /// Subqueries of which at least one must match.
    pub should: Vec<TermQuery>,
}

impl TermQuery {
    /// Create a leaf query matching one term in one field.
    pub fn keyword<F: Into<String>, W: Into<String>>(field: F, word: W) -> Self {
        TermQuery {
            keyword: Some(Keyword {
                field: field.into(),
                word: word.into(),
            }),
            ..TermQuery::default()
        }
    }

    /// The distinguished empty query.
    pub fn empty() -> Self {
        TermQuery::default()
    }

    /// Check whether this query carries no constraint.
    pub fn is_empty(&self) -> bool {
        self.keyword.is_none() && self.must.is_empty() && self.should.is_empty()
    }

    /// Combine this query with others under AND semantics.
    ///
    /// Empty operands are dropped; combining with nothing returns the query
    /// unchanged.
    pub fn and<I: IntoIterator<Item = TermQuery>>(self, others: I) -> Self {
        let mut clauses = Vec::new();
        if !self.is_empty() {
            clauses.push(self);
        }
        clauses.extend(others.into_iter().filter(|q| !q.is_empty()));
        if clauses.len() > 1 {
            return TermQuery {
                must: clauses,
                ..TermQuery::default()
            };
        }
        clauses.pop().unwrap_or_default()
    }

    /// Combine this query with others under OR semantics.
    pub fn or<I: IntoIterator<Item = TermQuery>>(self, others: I) -> Self {
        let mut clauses = Vec::new();
        if !self.is_empty() {
            clauses.push(self);
        }
        clauses.extend(others.into_iter().filter(|q| !q.is_empty()));
        if clauses.len() > 1 {
            return TermQuery {
                should: clauses,
                ..TermQuery::default()
            };
        }
        clauses.pop().unwrap_or_default()
    }
}

/// Upper bound used for open-ended `Over` filter windows.
pub const MAX_FILTER_BOUND: i64 = 0xFF_FFFF_FFFF;

/// Seconds spanned by one day minus one second; widens date equality
/// filters to day granularity.
const DAY_WIDENING_SECONDS: i64 = 86_399;

/// The comparison a numeric filter applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    /// Equal to `start` (widened to the whole day for date fields).
    Eq,
    /// Between `start` and `end`, inclusive.
    Range,
    /// Between zero and `start`, inclusive.
    Less,
    /// At least `start`.
    Over,
}

/// A numeric window filter on one field.
///
/// Filters are ANDed with each other and with the keyword query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Field the window applies to.
    pub field: String,
    /// Comparison kind.
    pub kind: FilterKind,
    /// Lower operand.
    pub start: i64,
    /// Upper operand; only meaningful for `Range`.
    pub end: i64,
}

impl Filter {
    /// Equality filter.
    pub fn eq<F: Into<String>>(field: F, value: i64) -> Self {
        Filter {
            field: field.into(),
            kind: FilterKind::Eq,
            start: value,
            end: 0,
        }
    }

    /// Inclusive range filter.
    pub fn range<F: Into<String>>(field: F, start: i64, end: i64) -> Self {
        Filter {
            field: field.into(),
            kind: FilterKind::Range,
            start,
            end,
        }
    }

    /// Filter accepting values in `[0, bound]`.
    pub fn less<F: Into<String>>(field: F, bound: i64) -> Self {
        Filter {
            field: field.into(),
            kind: FilterKind::Less,
            start: bound,
            end: 0,
        }
    }

    /// Filter accepting values of at least `bound`.
    pub fn over<F: Into<String>>(field: F, bound: i64) -> Self {
        Filter {
            field: field.into(),
            kind: FilterKind::Over,
            start: bound,
            end: 0,
        }
    }

    /// Resolve the filter into an inclusive `[min, max]` window for the
    /// given field kind.
    pub fn window(&self, field_kind: FieldKind) -> (i64, i64) {
        match self.kind {
            FilterKind::Eq => {
                if field_kind == FieldKind::Date {
                    (self.start, self.start + DAY_WIDENING_SECONDS)
                } else {
                    (self.start, self.start)
                }
            }
            FilterKind::Range => (self.start, self.end),
            FilterKind::Less => (0, self.start),
            FilterKind::Over => (self.start, MAX_FILTER_BOUND),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query() {
        assert!(TermQuery::empty().is_empty());
        assert!(!TermQuery::keyword("name", "alice").is_empty());
    }

    #[test]
    fn test_and_skips_empty_operands() {
        let q = TermQuery::keyword("name", "alice").and([TermQuery::empty()]);
        // A single surviving clause collapses to itself.
        assert_eq!(q, TermQuery::keyword("name", "alice"));

        let q = TermQuery::keyword("name", "alice")
            .and([TermQuery::keyword("city", "rome"), TermQuery::empty()]);
        assert_eq!(q.must.len(), 2);
        assert!(q.keyword.is_none());
    }

    #[test]
    fn test_or_builds_should_tree() {
        let q = TermQuery::keyword("name", "alice").or([TermQuery::keyword("name", "bob")]);
        assert_eq!(q.should.len(), 2);
    }

    #[test]
    fn test_filter_windows() {
        assert_eq!(
            Filter::eq("age", 30).window(FieldKind::Integer),
            (30, 30)
        );
        assert_eq!(
            Filter::eq("day", 1_000_000).window(FieldKind::Date),
            (1_000_000, 1_086_399)
        );
        assert_eq!(
            Filter::range("age", 10, 20).window(FieldKind::Integer),
            (10, 20)
        );
        assert_eq!(Filter::less("age", 18).window(FieldKind::Integer), (0, 18));
        assert_eq!(
            Filter::over("age", 65).window(FieldKind::Integer),
            (65, MAX_FILTER_BOUND)
        );
    }
}
