use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::generate_id;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CrawlRequestStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
}

/// One navigation+capture job queued against a named driver. Mutated only
/// by the worker processing it; immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawlRequest {
    pub request_id: String,
    pub driver_name: String,
    pub url: String,
    pub requester: String,
    pub status: CrawlRequestStatus,
    pub page_content: Option<String>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CrawlRequest {
    pub fn new(
        driver_name: impl Into<String>,
        url: impl Into<String>,
        requester: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            request_id: generate_id(),
            driver_name: driver_name.into(),
            url: url.into(),
            requester: requester.into(),
            status: CrawlRequestStatus::Pending,
            page_content: None,
            error_message: None,
            metadata,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn mark_queued(&mut self) {
        self.status = CrawlRequestStatus::Queued;
    }

    pub fn mark_processing(&mut self) {
        self.status = CrawlRequestStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, content: String) {
        self.status = CrawlRequestStatus::Completed;
        self.page_content = Some(content);
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = CrawlRequestStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            CrawlRequestStatus::Completed | CrawlRequestStatus::Failed
        )
    }
}
