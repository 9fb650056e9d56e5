use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static PUBLICATION_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}(/\d{2}(/\d{2})?)?$").unwrap());

/// Open-ended bounds substituted when only one side of a date range is given.
pub const EARLIEST_YEAR: &str = "1900";
pub const LATEST_YEAR: &str = "3000";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("search term must not be empty")]
    EmptyTerm,
    #[error("invalid publication date `{0}` (expected YYYY, YYYY/MM or YYYY/MM/DD)")]
    InvalidDate(String),
    #[error("invalid field qualifier `{0}`")]
    InvalidQualifier(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// Optional narrowing applied to an E-utilities search term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub organism: Option<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub field: Option<String>,
}

/// An Entrez query built from a base term plus qualifying clauses.
///
/// Each `with_*` call returns a new term. Rendering always emits the
/// field-qualified base first, then the organism clause, then the
/// publication-date clause, whatever order the clauses were added in, so the
/// same inputs give the same upstream query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerm {
    base: String,
    field: Option<String>,
    organism: Option<String>,
    published: Option<(String, String)>,
}

impl QueryTerm {
    pub fn new(base: &str) -> Result<Self, QueryError> {
        let base = base.trim();
        if base.is_empty() {
            return Err(QueryError::EmptyTerm);
        }

        Ok(Self {
            base: base.to_string(),
            field: None,
            organism: None,
            published: None,
        })
    }

    pub fn from_filters(base: &str, filters: &SearchFilters) -> Result<Self, QueryError> {
        let mut term = Self::new(base)?;

        if let Some(organism) = non_blank(filters.organism.as_deref()) {
            term = term.with_organism(organism);
        }
        if let Some(range) = &filters.date_range {
            term = term.with_date_range(range.start.as_deref(), range.end.as_deref())?;
        }
        if let Some(field) = non_blank(filters.field.as_deref()) {
            term = term.with_field(field)?;
        }

        Ok(term)
    }

    pub fn with_organism(&self, organism: &str) -> Self {
        Self {
            organism: Some(organism.trim().to_string()),
            ..self.clone()
        }
    }

    pub fn with_field(&self, field: &str) -> Result<Self, QueryError> {
        let field = field.trim();
        if field.is_empty() || field.contains(['[', ']']) {
            return Err(QueryError::InvalidQualifier(field.to_string()));
        }

        Ok(Self {
            field: Some(field.to_string()),
            ..self.clone()
        })
    }

    /// Restricts by publication date. A missing bound is left open; with
    /// neither bound the term is returned unchanged.
    pub fn with_date_range(&self, start: Option<&str>, end: Option<&str>) -> Result<Self, QueryError> {
        let start = non_blank(start).map(validate_date).transpose()?;
        let end = non_blank(end).map(validate_date).transpose()?;

        let published = match (start, end) {
            (None, None) => return Ok(self.clone()),
            (start, end) => (
                start.unwrap_or(EARLIEST_YEAR).to_string(),
                end.unwrap_or(LATEST_YEAR).to_string(),
            ),
        };

        Ok(Self {
            published: Some(published),
            ..self.clone()
        })
    }

    pub fn render(&self) -> String {
        let mut out = match &self.field {
            Some(field) => format!("{}[{}]", self.base, field),
            None => self.base.clone(),
        };

        if let Some(organism) = &self.organism {
            out.push_str(&format!(" AND {}[Organism]", organism));
        }
        if let Some((start, end)) = &self.published {
            out.push_str(&format!(" AND {}:{}[Date - Publication]", start, end));
        }

        out
    }
}

impl fmt::Display for QueryTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn validate_date(date: &str) -> Result<&str, QueryError> {
    if PUBLICATION_DATE_RE.is_match(date) {
        Ok(date)
    } else {
        Err(QueryError::InvalidDate(date.to_string()))
    }
}
