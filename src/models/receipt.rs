use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of a receipt. `Completed` and (post-retry) `Failed`
/// are terminal; `Failed` may re-enter `Processing` when the queue
/// retries the job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Error,
}

impl ReceiptStatus {
    /// Valid state-machine edges. `Failed -> Processing` is the queue's
    /// retry path; nothing leaves `Completed`.
    pub fn can_transition_to(self, next: ReceiptStatus) -> bool {
        use ReceiptStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Error)
                | (Failed, Processing)
                | (Error, Processing)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReceiptStatus::Completed | ReceiptStatus::Failed | ReceiptStatus::Error)
    }

    /// Still waiting on the worker; clients should keep polling.
    pub fn is_in_flight(self) -> bool {
        matches!(self, ReceiptStatus::Pending | ReceiptStatus::Processing)
    }
}

/// Sub-state of processing, finer-grained than `status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Uploaded,
    AnalysisStarted,
    AnalysisCompleted,
    Error,
}

/// Summary of the arithmetic check for one receipt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptAnalysis {
    pub has_discrepancies: bool,
    pub total_discrepancy: f64,
    pub confidence: f64,
    pub suggestions: Vec<String>,
    pub ai_note: String,
}

/// Owner feedback on a completed analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFeedback {
    pub is_accurate: bool,
    #[serde(default)]
    pub corrected_items: Vec<serde_json::Value>,
    #[serde(default)]
    pub comments: String,
    pub rating: Option<i32>,
}

/// One uploaded bill and its processing outcome.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Receipt {
    pub id: Uuid,
    pub user_id: Uuid,

    pub image_url: String,
    pub storage_key: String,

    pub status: String,
    pub processing_stage: String,

    pub extracted_data: Option<serde_json::Value>,

    pub has_discrepancies: bool,
    pub total_discrepancy: f64,
    pub confidence: f64,
    pub suggestions: Option<serde_json::Value>,
    pub ai_note: Option<String>,
    pub error_message: Option<String>,

    pub total_processing_ms: Option<i64>,
    pub analysis_ms: Option<i64>,
    pub retry_count: i32,

    pub feedback: Option<serde_json::Value>,

    pub job_id: Option<Uuid>,
    pub queue_position: Option<i64>,

    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Receipt {
    pub fn status(&self) -> ReceiptStatus {
        self.status.parse().unwrap_or(ReceiptStatus::Pending)
    }

    /// Number of extracted line items, for list views.
    pub fn item_count(&self) -> usize {
        self.extracted_data
            .as_ref()
            .and_then(|d| d.get("items"))
            .and_then(|i| i.as_array())
            .map(|a| a.len())
            .unwrap_or(0)
    }
}

/// Query parameters for the receipt listing.
#[derive(Debug, Deserialize)]
pub struct ListReceiptsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub has_discrepancies: Option<bool>,
}

/// Owner feedback submission.
#[derive(Debug, Deserialize, Validate)]
pub struct FeedbackRequest {
    #[garde(skip)]
    pub is_accurate: bool,

    #[garde(skip)]
    pub corrected_items: Option<Vec<serde_json::Value>>,

    #[garde(length(max = 500))]
    pub comments: Option<String>,

    #[garde(range(min = 1, max = 5))]
    pub rating: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        assert!(ReceiptStatus::Pending.can_transition_to(ReceiptStatus::Processing));
        assert!(ReceiptStatus::Processing.can_transition_to(ReceiptStatus::Completed));
        assert!(ReceiptStatus::Processing.can_transition_to(ReceiptStatus::Failed));
    }

    #[test]
    fn completed_is_final() {
        for next in [
            ReceiptStatus::Pending,
            ReceiptStatus::Processing,
            ReceiptStatus::Failed,
            ReceiptStatus::Error,
        ] {
            assert!(!ReceiptStatus::Completed.can_transition_to(next));
        }
    }

    #[test]
    fn no_reverse_to_pending() {
        assert!(!ReceiptStatus::Processing.can_transition_to(ReceiptStatus::Pending));
        assert!(!ReceiptStatus::Failed.can_transition_to(ReceiptStatus::Pending));
    }

    #[test]
    fn failed_may_retry_into_processing() {
        assert!(ReceiptStatus::Failed.can_transition_to(ReceiptStatus::Processing));
    }

    #[test]
    fn status_round_trips_through_text() {
        let s: ReceiptStatus = "processing".parse().unwrap();
        assert_eq!(s, ReceiptStatus::Processing);
        assert_eq!(ProcessingStage::AnalysisStarted.to_string(), "analysis_started");
    }

    #[test]
    fn item_count_handles_missing_extraction() {
        let receipt = Receipt {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            image_url: "https://example.test/x.jpg".into(),
            storage_key: "x.jpg".into(),
            status: "pending".into(),
            processing_stage: "uploaded".into(),
            extracted_data: None,
            has_discrepancies: false,
            total_discrepancy: 0.0,
            confidence: 0.0,
            suggestions: None,
            ai_note: None,
            error_message: None,
            total_processing_ms: None,
            analysis_ms: None,
            retry_count: 0,
            feedback: None,
            job_id: None,
            queue_position: None,
            is_archived: false,
            archived_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(receipt.item_count(), 0);
    }
}
