use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::transaction::TransactionId;

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// What a verdict predicate concluded about one parsed response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Found,
    NotFound,
}

impl From<bool> for Presence {
    fn from(found: bool) -> Self {
        if found {
            Presence::Found
        } else {
            Presence::NotFound
        }
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

type PredicateFn = dyn Fn(&Value, &TransactionId) -> Presence + Send + Sync;

/// An injected predicate deciding whether a response body means the
/// transaction has completed.
///
/// The poll engine only ever sees the [`Presence`] this returns, so swapping
/// the predicate changes classification without touching retry behaviour.
#[derive(Clone)]
pub struct Verdict {
    name: String,
    predicate: Arc<PredicateFn>,
}

impl Verdict {
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &TransactionId) -> Presence + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(f),
        }
    }

    pub fn classify(&self, body: &Value, id: &TransactionId) -> Presence {
        (self.predicate)(body, id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verdict").field("name", &self.name).finish()
    }
}

impl From<&VerdictRule> for Verdict {
    fn from(rule: &VerdictRule) -> Self {
        rule.to_verdict()
    }
}

// ---------------------------------------------------------------------------
// VerdictRule
// ---------------------------------------------------------------------------

/// Configurable form of the response shapes status endpoints are known to
/// return. Field names are top-level keys, or JSON pointers when they start
/// with `/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerdictRule {
    /// `{"found": true}`
    FoundFlag {
        #[serde(default = "default_found_field")]
        field: String,
    },
    /// Find the record for this transaction, then compare its status field.
    RecordStatus {
        #[serde(default = "default_items")]
        items: String,
        #[serde(default = "default_id_field")]
        id_field: String,
        #[serde(default = "default_status_field")]
        status_field: String,
        #[serde(default = "default_expected_status")]
        expected: String,
    },
    /// Found once the transaction's record exists and none of its fields
    /// still holds the sentinel.
    NoSentinel {
        #[serde(default = "default_sentinel")]
        sentinel: String,
        #[serde(default = "default_items")]
        items: String,
        #[serde(default = "default_id_field")]
        id_field: String,
    },
    /// `body[field] == expected`, compared as JSON values.
    FieldEquals { field: String, expected: Value },
}

fn default_found_field() -> String {
    "found".to_string()
}

fn default_items() -> String {
    "items".to_string()
}

fn default_id_field() -> String {
    "transactionId".to_string()
}

fn default_status_field() -> String {
    "paymentStatus".to_string()
}

fn default_expected_status() -> String {
    "received".to_string()
}

fn default_sentinel() -> String {
    "pending".to_string()
}

impl Default for VerdictRule {
    fn default() -> Self {
        VerdictRule::FoundFlag {
            field: default_found_field(),
        }
    }
}

impl VerdictRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictRule::FoundFlag { .. } => "found_flag",
            VerdictRule::RecordStatus { .. } => "record_status",
            VerdictRule::NoSentinel { .. } => "no_sentinel",
            VerdictRule::FieldEquals { .. } => "field_equals",
        }
    }

    pub fn to_verdict(&self) -> Verdict {
        let rule = self.clone();
        Verdict::from_fn(self.as_str(), move |body, id| rule.evaluate(body, id))
    }

    pub fn evaluate(&self, body: &Value, id: &TransactionId) -> Presence {
        match self {
            VerdictRule::FoundFlag { field } => {
                Presence::from(lookup(body, field) == Some(&Value::Bool(true)))
            }
            VerdictRule::RecordStatus {
                items,
                id_field,
                status_field,
                expected,
            } => {
                let status = locate_record(body, items, id_field, id)
                    .and_then(|record| lookup(record, status_field))
                    .and_then(Value::as_str);
                Presence::from(status == Some(expected.as_str()))
            }
            VerdictRule::NoSentinel {
                sentinel,
                items,
                id_field,
            } => {
                let settled = match locate_record(body, items, id_field, id) {
                    Some(Value::Object(fields)) if !fields.is_empty() => fields
                        .values()
                        .all(|v| v.as_str() != Some(sentinel.as_str())),
                    _ => false,
                };
                Presence::from(settled)
            }
            VerdictRule::FieldEquals { field, expected } => {
                Presence::from(lookup(body, field) == Some(expected))
            }
        }
    }
}

fn lookup<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    if field.starts_with('/') {
        value.pointer(field)
    } else {
        value.get(field)
    }
}

/// Find the record describing `id`.
///
/// The body may be an array of records, an object holding such an array under
/// `items`, or a single record. A single record without an id field is taken
/// to be the one asked for.
fn locate_record<'a>(
    body: &'a Value,
    items: &str,
    id_field: &str,
    id: &TransactionId,
) -> Option<&'a Value> {
    let matches = |record: &&Value| {
        lookup(record, id_field).and_then(Value::as_str) == Some(id.as_str())
    };
    if let Some(list) = body.as_array() {
        return list.iter().find(matches);
    }
    if let Some(list) = lookup(body, items).and_then(Value::as_array) {
        return list.iter().find(matches);
    }
    match lookup(body, id_field) {
        None if body.is_object() => Some(body),
        Some(_) if matches(&body) => Some(body),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
