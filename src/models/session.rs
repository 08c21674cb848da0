use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CrawlSessionStatus {
    Pending,
    Running,
    Completed,
    Partial,
    Failed,
}

/// One batch of identifier crawls. Counts are updated as each item
/// finishes; the terminal status is computed once the batch is done.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawlSession {
    pub session_id: String,
    pub driver_name: String,
    pub country_code: String,
    pub identifiers_crawled: Vec<String>,
    pub total_products: usize,
    pub successful_crawls: usize,
    pub failed_crawls: usize,
    pub status: CrawlSessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CrawlSession {
    pub fn new(
        session_id: impl Into<String>,
        driver_name: impl Into<String>,
        country_code: impl Into<String>,
        total_products: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            driver_name: driver_name.into(),
            country_code: country_code.into(),
            identifiers_crawled: Vec::new(),
            total_products,
            successful_crawls: 0,
            failed_crawls: 0,
            status: CrawlSessionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = CrawlSessionStatus::Running;
    }

    pub fn record_success(&mut self, identifier: &str) {
        self.successful_crawls += 1;
        self.identifiers_crawled.push(identifier.to_string());
    }

    pub fn record_failure(&mut self, identifier: &str) {
        self.failed_crawls += 1;
        self.identifiers_crawled.push(identifier.to_string());
    }

    /// Terminal status: COMPLETED iff nothing failed, FAILED iff nothing
    /// succeeded, PARTIAL otherwise.
    pub fn finalize(&mut self) {
        self.status = if self.failed_crawls == 0 {
            CrawlSessionStatus::Completed
        } else if self.successful_crawls > 0 {
            CrawlSessionStatus::Partial
        } else {
            CrawlSessionStatus::Failed
        };
        self.completed_at = Some(Utc::now());
    }
}
