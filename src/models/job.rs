use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Queue-level state of a job. Distinct from the receipt lifecycle: the
/// queue owns this, the receipt only holds a weak `job_id` reference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Priority tier. High-priority jobs are dequeued before normal ones
/// regardless of arrival order; within a tier the order is FIFO.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    High,
    Normal,
}

/// Point-in-time view of one job, read from its queue-side record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    pub job_id: Uuid,
    pub state: JobState,
    pub progress: u8,
    pub priority: JobPriority,
    pub receipt_id: Uuid,
    pub user_id: Uuid,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Receipt returned to the caller when a job is accepted.
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueResult {
    pub job_id: Uuid,
    pub queue_position: i64,
    /// Heuristic seconds until completion, not a guarantee.
    pub estimated_time: i64,
    pub priority: JobPriority,
}

/// Counters for the dashboard/health views.
#[derive(Debug, Clone, Serialize, Default)]
pub struct QueueStats {
    pub waiting_high: i64,
    pub waiting_normal: i64,
    pub delayed: i64,
    pub active: i64,
}

impl QueueStats {
    pub fn waiting(&self) -> i64 {
        self.waiting_high + self.waiting_normal
    }
}
