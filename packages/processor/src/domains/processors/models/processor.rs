use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;

/// One worker process, keyed by `{name}_{instance}_{mode}`.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Processor {
    pub id: String,
    pub metadata: serde_json::Value,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written by an upsert. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
pub struct ProcessorPatch {
    /// Merged into the stored metadata.
    pub metadata: Option<serde_json::Value>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_processed_at: Option<DateTime<Utc>>,
}

impl ProcessorPatch {
    /// An empty poll just happened.
    pub fn polled() -> Self {
        Self::builder().last_poll_at(Utc::now()).build()
    }

    /// A job is about to be dispatched.
    pub fn processing() -> Self {
        Self::builder().last_processed_at(Utc::now()).build()
    }

    /// A job just reached `DONE` or `DONE_ERROR`.
    pub fn processed() -> Self {
        Self::builder().last_processed_at(Utc::now()).build()
    }
}
