use crate::store::{create_typed, list_typed, Collection, ListQuery, RecordStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Completed,
    Failed,
    InProgress,
}

impl CallStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CallStatus::Completed => "Completed",
            CallStatus::Failed => "Failed",
            CallStatus::InProgress => "In progress",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub contact_name: String,
    pub contact_number: String,
    pub status: CallStatus,
    pub outcome: String,
    pub transcript: String,
    /// Seconds.
    pub duration: u64,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn summary(&self) -> String {
        format!(
            "{} [{}] {}s: {}",
            self.contact_name,
            self.status.label(),
            self.duration,
            self.outcome
        )
    }
}

pub async fn save_call_record<S: RecordStore>(
    store: &S,
    record: &CallRecord,
) -> Result<CallRecord> {
    create_typed(store, Collection::CallRecords, record).await
}

/// The user's calls, newest first.
pub async fn recent_calls<S: RecordStore>(
    store: &S,
    user_id: &str,
    limit: usize,
) -> Result<Vec<CallRecord>> {
    let query = ListQuery::new().where_eq("userId", user_id);
    let mut records: Vec<CallRecord> = list_typed(store, Collection::CallRecords, &query).await?;
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records.truncate(limit);
    Ok(records)
}
