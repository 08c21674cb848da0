use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::price::PriceObservation;
use crate::models::product::ProductRecord;
use crate::models::request::CrawlRequest;
use crate::models::session::{CrawlSession, CrawlSessionStatus};
use crate::utils::error::Result;

/// Aggregate counters over recent crawl sessions.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CrawlStatistics {
    pub total_sessions: usize,
    pub completed_sessions: usize,
    pub partial_sessions: usize,
    pub failed_sessions: usize,
    pub total_products_crawled: usize,
    pub total_observations: usize,
}

/// Persistence seam for crawl results. The engine only needs these
/// operations; callers bring whatever backend they like.
pub trait CrawlStore: Send + Sync {
    fn upsert_product(&self, record: &ProductRecord) -> Result<()>;
    fn get_product(&self, identifier: &str, country_code: &str) -> Result<Option<ProductRecord>>;

    fn insert_price(&self, observation: &PriceObservation) -> Result<()>;
    /// Newest observation not older than `window`, if any.
    fn latest_price_within(
        &self,
        identifier: &str,
        country_code: &str,
        window: Duration,
    ) -> Result<Option<PriceObservation>>;
    /// Newest observation strictly older than `cutoff`.
    fn latest_price_before(
        &self,
        identifier: &str,
        country_code: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<PriceObservation>>;
    fn price_history(
        &self,
        identifier: &str,
        country_code: &str,
        days: i64,
    ) -> Result<Vec<PriceObservation>>;

    fn save_session(&self, session: &CrawlSession) -> Result<()>;
    fn get_session(&self, session_id: &str) -> Result<Option<CrawlSession>>;
    fn save_request(&self, request: &CrawlRequest) -> Result<()>;
    fn get_request(&self, request_id: &str) -> Result<Option<CrawlRequest>>;

    fn crawl_statistics(&self, days: i64) -> Result<CrawlStatistics>;
}

#[derive(Default)]
struct MemoryInner {
    products: HashMap<(String, String), ProductRecord>,
    observations: Vec<PriceObservation>,
    sessions: HashMap<String, CrawlSession>,
    requests: HashMap<String, CrawlRequest>,
}

/// In-memory store. Backs the default composition root and the tests;
/// everything lives behind one mutex since crawl throughput is bounded
/// by the browsers, not the store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observation_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.observations.len()
    }
}

impl CrawlStore for MemoryStore {
    fn upsert_product(&self, record: &ProductRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.products.insert(record.key(), record.clone());
        Ok(())
    }

    fn get_product(&self, identifier: &str, country_code: &str) -> Result<Option<ProductRecord>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .products
            .get(&(identifier.to_string(), country_code.to_string()))
            .cloned())
    }

    fn insert_price(&self, observation: &PriceObservation) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.observations.push(observation.clone());
        Ok(())
    }

    fn latest_price_within(
        &self,
        identifier: &str,
        country_code: &str,
        window: Duration,
    ) -> Result<Option<PriceObservation>> {
        let cutoff = Utc::now() - window;
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .observations
            .iter()
            .filter(|o| {
                o.identifier == identifier
                    && o.country_code == country_code
                    && o.observed_at >= cutoff
            })
            .max_by_key(|o| o.observed_at)
            .cloned())
    }

    fn latest_price_before(
        &self,
        identifier: &str,
        country_code: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<PriceObservation>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .observations
            .iter()
            .filter(|o| {
                o.identifier == identifier
                    && o.country_code == country_code
                    && o.observed_at < cutoff
            })
            .max_by_key(|o| o.observed_at)
            .cloned())
    }

    fn price_history(
        &self,
        identifier: &str,
        country_code: &str,
        days: i64,
    ) -> Result<Vec<PriceObservation>> {
        let cutoff = Utc::now() - Duration::days(days);
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut history: Vec<PriceObservation> = inner
            .observations
            .iter()
            .filter(|o| {
                o.identifier == identifier
                    && o.country_code == country_code
                    && o.observed_at >= cutoff
            })
            .cloned()
            .collect();
        history.sort_by_key(|o| std::cmp::Reverse(o.observed_at));
        Ok(history)
    }

    fn save_session(&self, session: &CrawlSession) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<CrawlSession>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.sessions.get(session_id).cloned())
    }

    fn save_request(&self, request: &CrawlRequest) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .requests
            .insert(request.request_id.clone(), request.clone());
        Ok(())
    }

    fn get_request(&self, request_id: &str) -> Result<Option<CrawlRequest>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.requests.get(request_id).cloned())
    }

    fn crawl_statistics(&self, days: i64) -> Result<CrawlStatistics> {
        let cutoff = Utc::now() - Duration::days(days);
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let mut stats = CrawlStatistics::default();
        for session in inner.sessions.values() {
            if session.started_at < cutoff {
                continue;
            }
            stats.total_sessions += 1;
            stats.total_products_crawled += session.successful_crawls;
            match session.status {
                CrawlSessionStatus::Completed => stats.completed_sessions += 1,
                CrawlSessionStatus::Partial => stats.partial_sessions += 1,
                CrawlSessionStatus::Failed => stats.failed_sessions += 1,
                _ => {}
            }
        }
        stats.total_observations = inner
            .observations
            .iter()
            .filter(|o| o.observed_at >= cutoff)
            .count();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(identifier: &str, price: f64) -> PriceObservation {
        PriceObservation::new(identifier, "US", price, "USD", "Amazon", true, "", "amazon_us")
    }

    #[test]
    fn test_upsert_replaces_product() {
        let store = MemoryStore::new();
        let mut record = ProductRecord::new("B08N5WRWNW", "US");
        record.title = "First title".to_string();
        store.upsert_product(&record).unwrap();

        record.title = "Updated title".to_string();
        store.upsert_product(&record).unwrap();

        let stored = store.get_product("B08N5WRWNW", "US").unwrap().unwrap();
        assert_eq!(stored.title, "Updated title");
    }

    #[test]
    fn test_latest_price_within_window() {
        let store = MemoryStore::new();
        let mut old = observation("B08N5WRWNW", 10.0);
        old.observed_at = Utc::now() - Duration::hours(30);
        store.insert_price(&old).unwrap();

        assert!(store
            .latest_price_within("B08N5WRWNW", "US", Duration::hours(24))
            .unwrap()
            .is_none());

        let fresh = observation("B08N5WRWNW", 12.0);
        store.insert_price(&fresh).unwrap();

        let found = store
            .latest_price_within("B08N5WRWNW", "US", Duration::hours(24))
            .unwrap()
            .unwrap();
        assert_eq!(found.price, 12.0);
    }

    #[test]
    fn test_latest_price_before_cutoff() {
        let store = MemoryStore::new();
        let mut oldest = observation("B08N5WRWNW", 8.0);
        oldest.observed_at = Utc::now() - Duration::hours(72);
        store.insert_price(&oldest).unwrap();

        let mut older = observation("B08N5WRWNW", 10.0);
        older.observed_at = Utc::now() - Duration::hours(30);
        store.insert_price(&older).unwrap();

        store.insert_price(&observation("B08N5WRWNW", 12.0)).unwrap();

        let cutoff = Utc::now() - Duration::hours(24);
        let found = store
            .latest_price_before("B08N5WRWNW", "US", cutoff)
            .unwrap()
            .unwrap();
        assert_eq!(found.price, 10.0);
    }

    #[test]
    fn test_price_history_sorted_newest_first() {
        let store = MemoryStore::new();
        let mut a = observation("B08N5WRWNW", 10.0);
        a.observed_at = Utc::now() - Duration::days(2);
        let b = observation("B08N5WRWNW", 12.0);
        let mut ancient = observation("B08N5WRWNW", 5.0);
        ancient.observed_at = Utc::now() - Duration::days(40);
        store.insert_price(&a).unwrap();
        store.insert_price(&b).unwrap();
        store.insert_price(&ancient).unwrap();

        let history = store.price_history("B08N5WRWNW", "US", 30).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].price, 12.0);
        assert_eq!(history[1].price, 10.0);
    }

    #[test]
    fn test_history_is_scoped_by_country() {
        let store = MemoryStore::new();
        store.insert_price(&observation("B08N5WRWNW", 10.0)).unwrap();
        let mut de = observation("B08N5WRWNW", 11.0);
        de.country_code = "DE".to_string();
        store.insert_price(&de).unwrap();

        assert_eq!(store.price_history("B08N5WRWNW", "US", 30).unwrap().len(), 1);
        assert_eq!(store.price_history("B08N5WRWNW", "DE", 30).unwrap().len(), 1);
    }

    #[test]
    fn test_crawl_statistics() {
        let store = MemoryStore::new();
        let mut done = CrawlSession::new("s1", "amazon_us", "US", 3);
        done.record_success("A");
        done.record_success("B");
        done.record_success("C");
        done.finalize();
        store.save_session(&done).unwrap();

        let mut partial = CrawlSession::new("s2", "amazon_de", "DE", 2);
        partial.record_success("A");
        partial.record_failure("B");
        partial.finalize();
        store.save_session(&partial).unwrap();

        store.insert_price(&observation("B08N5WRWNW", 10.0)).unwrap();

        let stats = store.crawl_statistics(7).unwrap();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.completed_sessions, 1);
        assert_eq!(stats.partial_sessions, 1);
        assert_eq!(stats.failed_sessions, 0);
        assert_eq!(stats.total_products_crawled, 4);
        assert_eq!(stats.total_observations, 1);
    }
}
