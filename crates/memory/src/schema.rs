use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Scalar metadata ──────────────────────────────────────────────────────────

/// Metadata values are restricted to scalars so every backend (and the JSONL
/// fallback) can store them without nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Num(f64),
    Str(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            MetaValue::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Lossy rendering used by text-match queries and placeholder substitution.
    pub fn render(&self) -> String {
        match self {
            MetaValue::Str(s) => s.clone(),
            MetaValue::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            MetaValue::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Str(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Num(value)
    }
}

impl From<u64> for MetaValue {
    fn from(value: u64) -> Self {
        MetaValue::Num(value as f64)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

pub type Metadata = BTreeMap<String, MetaValue>;

// ── Stored record (one row of a collection) ──────────────────────────────────

/// The uniform row shape every collection stores: a searchable document plus
/// scalar metadata.  `ts` is kept as a first-class field and mirrored into
/// metadata on conversion so backends that only see metadata still carry it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub document: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub ts: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(id: impl Into<String>, document: impl Into<String>, metadata: Metadata) -> Self {
        let ts = Utc::now();
        let mut record = Self {
            id: id.into(),
            document: document.into(),
            metadata,
            ts,
        };
        record
            .metadata
            .insert("ts".to_string(), MetaValue::Num(ts.timestamp() as f64));
        record
    }

    /// Move the record's timestamp, keeping the metadata mirror in sync.
    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self.metadata
            .insert("ts".to_string(), MetaValue::Num(ts.timestamp() as f64));
        self
    }

    /// Whether the record represents a successful interaction.  Records
    /// without a `success` flag (facts, lessons) count as successful so the
    /// housekeeper's `keep_successful` pass never drops them by accident.
    pub fn is_successful(&self) -> bool {
        self.metadata
            .get("success")
            .and_then(MetaValue::as_bool)
            .unwrap_or(true)
    }
}

// ── Typed records ────────────────────────────────────────────────────────────

/// A completed task: what was asked, what the agent did, how it ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub id: Uuid,
    pub task: String,
    pub actions: Vec<String>,
    pub outcome: String,
    pub success: bool,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub meta: Metadata,
}

impl Experience {
    pub fn new(task: impl Into<String>, actions: Vec<String>, outcome: impl Into<String>, success: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            actions,
            outcome: outcome.into(),
            success,
            ts: Utc::now(),
            meta: Metadata::new(),
        }
    }

    pub fn to_record(&self) -> StoredRecord {
        let mut metadata = self.meta.clone();
        metadata.insert("task".into(), self.task.as_str().into());
        metadata.insert("actions".into(), self.actions.join(",").into());
        metadata.insert("success".into(), self.success.into());
        let document = format!("{} => {}", self.task, self.outcome);
        StoredRecord::new(self.id.to_string(), document, metadata).at(self.ts)
    }
}

/// Summarized guidance distilled from past experiences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Uuid,
    pub lesson: String,
    pub context: String,
    pub category: String,
    /// Relative weight in [0, 1].
    pub importance: f32,
    pub ts: DateTime<Utc>,
}

impl Lesson {
    pub fn to_record(&self) -> StoredRecord {
        let mut metadata = Metadata::new();
        metadata.insert("context".into(), self.context.as_str().into());
        metadata.insert("category".into(), self.category.as_str().into());
        metadata.insert("importance".into(), MetaValue::Num(self.importance as f64));
        StoredRecord::new(self.id.to_string(), self.lesson.clone(), metadata).at(self.ts)
    }
}

/// A reusable approach for a class of tasks, with its observed success rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: Uuid,
    pub strategy: String,
    pub task_type: String,
    pub success_rate: f32,
    pub usage_count: u32,
    pub ts: DateTime<Utc>,
}

impl Strategy {
    pub fn to_record(&self) -> StoredRecord {
        let mut metadata = Metadata::new();
        metadata.insert("task_type".into(), self.task_type.as_str().into());
        metadata.insert("success_rate".into(), MetaValue::Num(self.success_rate as f64));
        metadata.insert("usage_count".into(), MetaValue::Num(self.usage_count as f64));
        StoredRecord::new(self.id.to_string(), self.strategy.clone(), metadata).at(self.ts)
    }
}

/// A durable statement about the user, carried across tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: Uuid,
    /// Rendered sentence injected into prompts, e.g. "User's name is Budi".
    pub fact: String,
    pub category: String,
    pub value: String,
    pub ts: DateTime<Utc>,
}

impl Fact {
    pub fn new(fact: impl Into<String>, category: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            fact: fact.into(),
            category: category.into(),
            value: value.into(),
            ts: Utc::now(),
        }
    }

    pub fn to_record(&self, source_utterance: &str) -> StoredRecord {
        let mut metadata = Metadata::new();
        metadata.insert("category".into(), self.category.as_str().into());
        metadata.insert("value".into(), self.value.as_str().into());
        metadata.insert("source".into(), source_utterance.into());
        StoredRecord::new(self.id.to_string(), self.fact.clone(), metadata).at(self.ts)
    }
}

/// One logged tool or LLM failure, with whatever context the caller had.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub id: Uuid,
    pub tool: String,
    pub operation: String,
    pub error: String,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorEvent {
    pub fn new(
        tool: impl Into<String>,
        operation: impl Into<String>,
        error: impl Into<String>,
        meta: Metadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool: tool.into(),
            operation: operation.into(),
            error: error.into(),
            ts: Utc::now(),
            meta,
            remediation: None,
        }
    }

    pub fn to_record(&self) -> StoredRecord {
        let mut metadata = self.meta.clone();
        metadata.insert("tool".into(), self.tool.as_str().into());
        metadata.insert("operation".into(), self.operation.as_str().into());
        metadata.insert("success".into(), false.into());
        let document = format!("{} {}: {}", self.tool, self.operation, self.error);
        StoredRecord::new(self.id.to_string(), document, metadata).at(self.ts)
    }
}

// ── Rules ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Exact,
    Contains,
    Regex,
}

/// A deterministic `(trigger, response)` pair applied before LLM reasoning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub trigger: String,
    pub trigger_kind: TriggerKind,
    pub response: String,
    #[serde(default)]
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

// ── Tests ────────────────────────────────────────────────────────────────────
