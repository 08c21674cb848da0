use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

use crate::models::{builtin_countries, CountryProfile, CountryTable};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub countries: Vec<CountryProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
    pub chrome_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Element/body wait bound in seconds; a stuck page load is only
    /// bounded by this.
    pub navigation_timeout_secs: u64,
    /// Price snapshots inside this window are suppressed.
    pub dedup_window_hours: i64,
    /// Uniform inter-item delay range for batch crawling, in seconds.
    pub batch_delay_min_secs: f64,
    pub batch_delay_max_secs: f64,
    /// Queue workers exit after this long with an empty queue.
    pub queue_idle_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            window_width: 1920,
            window_height: 1080,
            chrome_path: None,
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: 15,
            dedup_window_hours: 24,
            batch_delay_min_secs: 10.0,
            batch_delay_max_secs: 25.0,
            queue_idle_secs: 30,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            crawl: CrawlConfig::default(),
            countries: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "PRICEWATCH__"
            .add_source(Environment::with_prefix("PRICEWATCH").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    /// Country table for this deployment: configured profiles first, the
    /// built-in storefronts as the fallback set.
    pub fn country_table(&self) -> CountryTable {
        if self.countries.is_empty() {
            CountryTable::builtin()
        } else {
            let mut profiles = self.countries.clone();
            for builtin in builtin_countries() {
                if !profiles.iter().any(|p| p.code == builtin.code) {
                    profiles.push(builtin);
                }
            }
            CountryTable::new(profiles)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.browser.window_width == 0 || self.browser.window_height == 0 {
            return Err(ConfigError::Message(
                "Browser window dimensions must be greater than 0".into(),
            ));
        }

        if self.browser.user_agent.trim().is_empty() {
            return Err(ConfigError::Message(
                "Browser user_agent must not be empty".into(),
            ));
        }

        if self.crawl.navigation_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Crawl navigation_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.crawl.dedup_window_hours <= 0 {
            return Err(ConfigError::Message(
                "Crawl dedup_window_hours must be greater than 0".into(),
            ));
        }

        // Lower bound strictly positive so batches never hammer the site
        if self.crawl.batch_delay_min_secs <= 0.0 {
            return Err(ConfigError::Message(
                "Crawl batch_delay_min_secs must be strictly positive".into(),
            ));
        }

        if self.crawl.batch_delay_max_secs < self.crawl.batch_delay_min_secs {
            return Err(ConfigError::Message(
                "Crawl batch_delay_max_secs cannot be below batch_delay_min_secs".into(),
            ));
        }

        if self.crawl.queue_idle_secs == 0 {
            return Err(ConfigError::Message(
                "Crawl queue_idle_secs must be greater than 0".into(),
            ));
        }

        for country in &self.countries {
            if country.code.len() != 2 {
                return Err(ConfigError::Message(format!(
                    "Country code must be 2 characters: {}",
                    country.code
                )));
            }
            if country.domain.trim().is_empty() {
                return Err(ConfigError::Message(format!(
                    "Country {} is missing a domain",
                    country.code
                )));
            }
        }

        Ok(())
    }
}
