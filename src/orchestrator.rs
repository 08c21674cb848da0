use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::block::{self, PageState};
use crate::config::AppConfig;
use crate::country_pool::{extract_asin_from_url, simulate_human_behavior, CountryDriverPool};
use crate::extractor::ProductExtractor;
use crate::geo::GeoConfigurator;
use crate::models::country::{CountryProfile, CountryTable};
use crate::models::price::{PriceChange, PriceObservation};
use crate::models::product::ProductRecord;
use crate::models::session::CrawlSession;
use crate::models::generate_id;
use crate::store::CrawlStore;
use crate::utils::error::{AppError, Result};

/// One failed batch item, surfaced as data rather than an error so the
/// rest of the batch keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlFailure {
    pub identifier: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub session_id: String,
    pub successful: Vec<String>,
    pub failed: Vec<CrawlFailure>,
    pub total: usize,
}

/// Result of a navigation-free URL sanity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    pub valid: bool,
    pub identifier_match: bool,
    pub seller_match: bool,
    pub details: String,
}

/// Ties the whole pipeline together: session acquisition, geo state,
/// block recovery, extraction and persistence. One instance per process,
/// explicitly wired at the composition root.
pub struct CrawlOrchestrator {
    config: Arc<AppConfig>,
    countries: CountryTable,
    pool: CountryDriverPool,
    extractor: ProductExtractor,
    geo: GeoConfigurator,
    store: Arc<dyn CrawlStore>,
}

impl CrawlOrchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        pool: Arc<crate::driver_pool::DriverPool>,
        store: Arc<dyn CrawlStore>,
    ) -> Self {
        let countries = config.country_table();
        let pool = CountryDriverPool::new(pool, Arc::clone(&config));
        Self {
            config,
            countries,
            pool,
            extractor: ProductExtractor,
            geo: GeoConfigurator::new(),
            store,
        }
    }

    /// Crawls one product on the storefront of `country_code`. The code
    /// must resolve to a crawl-enabled country; this fails before any
    /// browser work otherwise.
    pub fn crawl_by_identifier(
        &self,
        identifier: &str,
        country_code: &str,
    ) -> Result<ProductRecord> {
        let country = self.resolve_country(country_code)?;
        let url = country.product_url(identifier);
        self.crawl_item(identifier, &url, &country)
    }

    /// Crawls a raw product URL. The country is inferred from the URL's
    /// domain; unknown domains fall back to the base country.
    pub fn crawl_by_url(&self, url: &str) -> Result<ProductRecord> {
        let identifier = extract_asin_from_url(url).ok_or_else(|| {
            AppError::InvalidUrl(format!("no product identifier in '{}'", url))
        })?;
        let country = self.countries.by_url(url).clone();
        if !country.crawl_enabled {
            return Err(AppError::CountryUnavailable {
                code: country.code.clone(),
            });
        }
        self.crawl_item(&identifier, url, &country)
    }

    /// Crawls a list of identifiers against one storefront, with a
    /// randomized pause between items. Item failures are collected, never
    /// propagated; the returned session status reflects the mix.
    pub fn crawl_batch(
        &self,
        identifiers: &[String],
        country_code: &str,
        session_id: Option<String>,
    ) -> Result<BatchOutcome> {
        let country = self.resolve_country(country_code)?;
        let session_id = session_id.unwrap_or_else(generate_id);
        let driver_name = crate::country_pool::driver_name_for(&country.code);

        let mut session =
            CrawlSession::new(session_id.clone(), driver_name, country.code.clone(), identifiers.len());
        self.store.save_session(&session)?;

        let mut successful = Vec::new();
        let mut failed = Vec::new();

        session.mark_running();
        self.store.save_session(&session)?;

        for (index, identifier) in identifiers.iter().enumerate() {
            if index > 0 {
                self.inter_item_delay();
            }

            let url = country.product_url(identifier);
            match self.crawl_item(identifier, &url, &country) {
                Ok(_) => {
                    session.record_success(identifier);
                    successful.push(identifier.clone());
                }
                Err(e) => {
                    warn!("Batch item {} failed: {}", identifier, e);
                    session.record_failure(identifier);
                    failed.push(CrawlFailure {
                        identifier: identifier.clone(),
                        reason: e.to_string(),
                    });
                }
            }
            self.store.save_session(&session)?;
        }

        session.finalize();
        self.store.save_session(&session)?;
        info!(
            "Batch {} finished: {:?}, {} ok / {} failed",
            session_id, session.status, session.successful_crawls, session.failed_crawls
        );

        Ok(BatchOutcome {
            session_id,
            successful,
            failed,
            total: identifiers.len(),
        })
    }

    /// Checks a URL against an expected identifier without navigating.
    /// Seller match is decided from URL merchant pins (`smid`/`m` query
    /// parameters); a URL that does not pin a merchant counts as a match.
    pub fn verify_match(&self, url: &str, expected_identifier: &str) -> MatchReport {
        let parsed = match Url::parse(url) {
            Ok(p) => p,
            Err(e) => {
                return MatchReport {
                    valid: false,
                    identifier_match: false,
                    seller_match: false,
                    details: format!("URL does not parse: {}", e),
                }
            }
        };

        let mut details = Vec::new();

        let host = parsed.host_str().unwrap_or("");
        let known_domain = self
            .countries
            .profiles()
            .iter()
            .any(|c| host == c.domain || host.ends_with(&format!(".{}", c.domain)));
        if !known_domain {
            details.push(format!("'{}' is not a known storefront domain", host));
        }

        let identifier_match = match extract_asin_from_url(url) {
            Some(found) => {
                let matches = found.eq_ignore_ascii_case(expected_identifier);
                if !matches {
                    details.push(format!(
                        "URL identifier {} does not match expected {}",
                        found, expected_identifier
                    ));
                }
                matches
            }
            None => {
                details.push("no product identifier in URL".to_string());
                false
            }
        };

        let pinned_merchant = parsed
            .query_pairs()
            .find(|(k, _)| k == "smid" || k == "m")
            .map(|(_, v)| v.to_string());
        let seller_match = match pinned_merchant {
            Some(merchant) => {
                details.push(format!("URL pins merchant '{}'", merchant));
                false
            }
            None => true,
        };

        MatchReport {
            valid: known_domain && identifier_match && seller_match,
            identifier_match,
            seller_match,
            details: if details.is_empty() {
                "ok".to_string()
            } else {
                details.join("; ")
            },
        }
    }

    fn resolve_country(&self, code: &str) -> Result<CountryProfile> {
        let country = self
            .countries
            .by_code(code)
            .ok_or_else(|| AppError::CountryUnavailable {
                code: code.to_string(),
            })?;
        if !country.crawl_enabled {
            return Err(AppError::CountryUnavailable {
                code: country.code.clone(),
            });
        }
        Ok(country.clone())
    }

    fn crawl_item(
        &self,
        identifier: &str,
        url: &str,
        country: &CountryProfile,
    ) -> Result<ProductRecord> {
        info!("Crawling {} on {}", identifier, country.domain);
        let handle = self.pool.acquire(country, false)?;
        let _guard = handle.usage_lock.lock().unwrap_or_else(|e| e.into_inner());

        self.geo.ensure_location(handle.session.as_ref(), country)?;

        handle.session.navigate(url)?;
        handle.session.wait_for_element(
            "body",
            Duration::from_secs(self.config.crawl.navigation_timeout_secs),
        )?;

        match block::check_and_recover(handle.session.as_ref())? {
            PageState::BlockPage => {
                return Err(AppError::Navigation(format!("blocked at {}", url)))
            }
            PageState::ErrorPage => {
                return Err(AppError::Navigation(format!("storefront error page at {}", url)))
            }
            PageState::Loaded | PageState::Unknown => {}
        }

        simulate_human_behavior(handle.session.as_ref());

        let record = self
            .extractor
            .extract(handle.session.as_ref(), country)?
            .ok_or_else(|| {
                AppError::Extraction(format!("no product data at {}", url))
            })?;

        self.persist(&record, &handle.name)?;
        Ok(record)
    }

    fn persist(&self, record: &ProductRecord, crawl_source: &str) -> Result<()> {
        self.store.upsert_product(record)?;

        let Some(price) = record.price else {
            info!("No price on {}, descriptive fields updated only", record.identifier);
            return Ok(());
        };

        let window = ChronoDuration::hours(self.config.crawl.dedup_window_hours);
        if let Some(existing) =
            self.store
                .latest_price_within(&record.identifier, &record.country_code, window)?
        {
            info!(
                "Price for {} already observed within {}h (stored {} {}, seen {} {}), skipping insert",
                record.identifier,
                self.config.crawl.dedup_window_hours,
                existing.price,
                existing.currency,
                price,
                record.currency
            );
            return Ok(());
        }

        let mut observation = PriceObservation::new(
            record.identifier.clone(),
            record.country_code.clone(),
            price,
            record.currency.clone(),
            record.seller.clone(),
            record.availability,
            record.shipping_info.clone(),
            crawl_source,
        );

        let cutoff = Utc::now() - window;
        if let Some(previous) =
            self.store
                .latest_price_before(&record.identifier, &record.country_code, cutoff)?
        {
            observation.price_change = Some(PriceChange::compute(previous.price, price));
        }

        self.store.insert_price(&observation)?;
        Ok(())
    }

    fn inter_item_delay(&self) {
        let min = self.config.crawl.batch_delay_min_secs;
        let max = self.config.crawl.batch_delay_max_secs;
        let secs = rand::thread_rng().gen_range(min..=max);
        info!("Waiting {:.1}s before next item", secs);
        std::thread::sleep(Duration::from_secs_f64(secs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::driver_pool::DriverPool;
    use crate::store::MemoryStore;

    fn orchestrator() -> CrawlOrchestrator {
        let config = Arc::new(AppConfig::default());
        let pool = Arc::new(DriverPool::new(Box::new(
            crate::session::ChromeSessionFactory::new(None),
        )));
        let store = Arc::new(MemoryStore::new());
        CrawlOrchestrator::new(config, pool, store)
    }

    #[test]
    fn test_verify_match_plain_product_url() {
        let report = orchestrator()
            .verify_match("https://www.amazon.com/dp/B08N5WRWNW", "B08N5WRWNW");
        assert!(report.valid);
        assert!(report.identifier_match);
        assert!(report.seller_match);
        assert_eq!(report.details, "ok");
    }

    #[test]
    fn test_verify_match_wrong_identifier() {
        let report = orchestrator()
            .verify_match("https://www.amazon.com/dp/B08N5WRWNW", "B000000000");
        assert!(!report.valid);
        assert!(!report.identifier_match);
        assert!(report.seller_match);
    }

    #[test]
    fn test_verify_match_pinned_merchant() {
        let report = orchestrator().verify_match(
            "https://www.amazon.com/dp/B08N5WRWNW?smid=A1B2C3D4E5F6G7",
            "B08N5WRWNW",
        );
        assert!(!report.valid);
        assert!(report.identifier_match);
        assert!(!report.seller_match);
        assert!(report.details.contains("pins merchant"));
    }

    #[test]
    fn test_verify_match_unknown_domain() {
        let report =
            orchestrator().verify_match("https://shop.example.com/dp/B08N5WRWNW", "B08N5WRWNW");
        assert!(!report.valid);
        assert!(report.identifier_match);
        assert!(report.details.contains("not a known storefront"));
    }

    #[test]
    fn test_verify_match_unparseable_url() {
        let report = orchestrator().verify_match("not a url", "B08N5WRWNW");
        assert!(!report.valid);
        assert!(!report.identifier_match);
        assert!(!report.seller_match);
    }

    #[test]
    fn test_unknown_country_fails_fast() {
        let result = orchestrator().crawl_by_identifier("B08N5WRWNW", "XX");
        assert!(matches!(
            result,
            Err(AppError::CountryUnavailable { .. })
        ));
    }

    #[test]
    fn test_disabled_country_fails_fast() {
        let mut config = AppConfig::default();
        let mut us = crate::models::country::builtin_countries()
            .into_iter()
            .find(|c| c.code == "US")
            .unwrap();
        us.crawl_enabled = false;
        config.countries = vec![us];

        let pool = Arc::new(DriverPool::new(Box::new(
            crate::session::ChromeSessionFactory::new(None),
        )));
        let orch = CrawlOrchestrator::new(Arc::new(config), pool, Arc::new(MemoryStore::new()));

        let result = orch.crawl_by_identifier("B08N5WRWNW", "US");
        assert!(matches!(
            result,
            Err(AppError::CountryUnavailable { code }) if code == "US"
        ));
    }

    #[test]
    fn test_crawl_by_url_requires_identifier() {
        let result = orchestrator().crawl_by_url("https://www.amazon.com/gp/help/customer");
        assert!(matches!(result, Err(AppError::InvalidUrl(_))));
    }
}
