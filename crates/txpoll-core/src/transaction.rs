use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use thiserror::Error;

/// Longest transaction id accepted when no limit is configured.
pub const DEFAULT_MAX_ID_LEN: usize = 50;

/// Query parameter the host page receives the id under.
pub const QUERY_PARAM: &str = "transactionId";

// ---------------------------------------------------------------------------
// ValidationFailure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("transaction id is missing")]
    Missing,

    #[error("transaction id '{0}' contains characters outside [A-Za-z0-9_-]")]
    InvalidCharacters(String),

    #[error("transaction id is {len} characters long (max {max})")]
    TooLong { len: usize, max: usize },
}

// ---------------------------------------------------------------------------
// TransactionId
// ---------------------------------------------------------------------------

/// A validated transaction identifier.
///
/// Only constructed through [`TransactionId::parse`], so holding one means the
/// value is non-empty, within the length limit, and uses only letters, digits,
/// hyphens, and underscores. It is therefore safe to embed in a query string
/// without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap())
}

impl TransactionId {
    pub fn parse(raw: Option<&str>, max_len: usize) -> Result<Self, ValidationFailure> {
        let raw = match raw {
            Some(s) if !s.is_empty() => s,
            _ => return Err(ValidationFailure::Missing),
        };
        if !id_re().is_match(raw) {
            return Err(ValidationFailure::InvalidCharacters(raw.to_string()));
        }
        // The charset is ASCII-only, so byte length equals character count here.
        if raw.len() > max_len {
            return Err(ValidationFailure::TooLong {
                len: raw.len(),
                max: max_len,
            });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TransactionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Pull the `transactionId` parameter out of a URL query string.
///
/// Accepts the query with or without its leading `?`. Values are
/// percent-decoded; the first occurrence wins.
pub fn from_query(query: &str) -> Option<String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let url = reqwest::Url::parse(&format!("http://host/?{query}")).ok()?;
    let value = url
        .query_pairs()
        .find(|(k, _)| k == QUERY_PARAM)
        .map(|(_, v)| v.into_owned());
    value
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
