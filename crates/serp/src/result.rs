// ABOUTME: Batch data types: query tasks, per-query outcomes and the ordered batch result.
// ABOUTME: Each entry serialises to the flat success/error JSON object consumers expect.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SerpError;
use crate::extractors::Record;

/// One query in a batch. `query_id` is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QueryTask {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
}

impl QueryTask {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            query_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.query_id = Some(id.into());
        self
    }
}

impl From<&str> for QueryTask {
    fn from(query: &str) -> Self {
        Self::new(query)
    }
}

/// How one query settled.
#[derive(Debug)]
pub enum QueryOutcome {
    /// A sanitized record with meaningful content.
    Success(Record),
    /// The page was fetched but had nothing worth returning.
    SoftFailure(String),
    /// Acquisition or processing failed.
    HardFailure(SerpError),
    /// The per-query bound elapsed first.
    Timeout(Duration),
}

impl QueryOutcome {
    /// Stable snake_case name of the outcome kind.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryOutcome::Success(_) => "success",
            QueryOutcome::SoftFailure(_) => "soft_failure",
            QueryOutcome::HardFailure(_) => "hard_failure",
            QueryOutcome::Timeout(_) => "timeout",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Success(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, QueryOutcome::Timeout(_))
    }

    /// The record, for successful outcomes.
    pub fn record(&self) -> Option<&Record> {
        match self {
            QueryOutcome::Success(r) => Some(r),
            _ => None,
        }
    }

    /// Human-readable failure message, if any.
    pub fn error_message(&self) -> Option<String> {
        match self {
            QueryOutcome::Success(_) => None,
            QueryOutcome::SoftFailure(msg) => Some(msg.clone()),
            QueryOutcome::HardFailure(err) => Some(err.message()),
            QueryOutcome::Timeout(bound) => {
                Some(format!("Request timed out after {}ms", bound.as_millis()))
            }
        }
    }
}

/// A task paired with how it settled.
#[derive(Debug)]
pub struct BatchEntry {
    pub task: QueryTask,
    pub outcome: QueryOutcome,
}

impl BatchEntry {
    /// Flat JSON form: `{success, outcome, query, query_id?, ...fields, error?, timeout?}`.
    ///
    /// Record fields never override the envelope keys.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        if let QueryOutcome::Success(ref record) = self.outcome {
            obj.extend(record.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        obj.insert("success".to_string(), Value::Bool(self.outcome.is_success()));
        obj.insert("outcome".to_string(), Value::from(self.outcome.kind()));
        obj.insert("query".to_string(), Value::from(self.task.query.as_str()));
        if let Some(ref id) = self.task.query_id {
            obj.insert("query_id".to_string(), Value::from(id.as_str()));
        }
        if let Some(msg) = self.outcome.error_message() {
            obj.insert("error".to_string(), Value::String(msg));
        }
        match self.outcome {
            QueryOutcome::HardFailure(ref err) => {
                obj.insert("error_code".to_string(), Value::from(err.code.as_str()));
            }
            QueryOutcome::Timeout(bound) => {
                obj.insert("timeout".to_string(), Value::Bool(true));
                obj.insert("timeout_ms".to_string(), Value::from(bound.as_millis() as u64));
            }
            QueryOutcome::Success(_) | QueryOutcome::SoftFailure(_) => {}
        }
        Value::Object(obj)
    }
}

/// Ordered outcomes; same length and order as the submitted tasks.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub entries: Vec<BatchEntry>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outcome kinds in input order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.outcome.kind()).collect()
    }

    /// Number of successful entries.
    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter()
    }

    /// JSON array of every entry.
    pub fn to_json(&self) -> Value {
        Value::Array(self.entries.iter().map(BatchEntry::to_json).collect())
    }
}

impl IntoIterator for BatchResult {
    type Item = BatchEntry;
    type IntoIter = std::vec::IntoIter<BatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
