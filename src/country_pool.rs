use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::AppConfig;
use crate::driver_pool::{DriverHandle, DriverPool};
use crate::models::country::CountryProfile;
use crate::session::{LaunchProfile, PageSession};
use crate::utils::error::Result;

/// Derives the pool name for a country, e.g. "amazon_us".
pub fn driver_name_for(country_code: &str) -> String {
    format!("amazon_{}", country_code.to_lowercase())
}

/// Pulls a product identifier out of a product URL. Identifiers are
/// exactly ten alphanumeric characters; they appear as the path segment
/// after `/dp/` or as an `asin` query parameter.
pub fn extract_asin_from_url(raw_url: &str) -> Option<String> {
    let url = Url::parse(raw_url).ok()?;

    let segments: Vec<&str> = url.path_segments()?.collect();
    for (i, segment) in segments.iter().enumerate() {
        if segment.eq_ignore_ascii_case("dp") {
            if let Some(candidate) = segments.get(i + 1) {
                if is_identifier(candidate) {
                    return Some(candidate.to_uppercase());
                }
            }
        }
    }

    for (key, value) in url.query_pairs() {
        if key == "asin" && is_identifier(&value) {
            return Some(value.to_uppercase());
        }
    }

    None
}

fn is_identifier(s: &str) -> bool {
    s.len() == 10 && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// One pooled browser session per country, named `amazon_<code>`. Wraps
/// the generic [`DriverPool`] with the launch profile appropriate for
/// storefront crawling.
pub struct CountryDriverPool {
    pool: Arc<DriverPool>,
    config: Arc<AppConfig>,
}

impl CountryDriverPool {
    pub fn new(pool: Arc<DriverPool>, config: Arc<AppConfig>) -> Self {
        Self { pool, config }
    }

    pub fn launch_profile(&self) -> LaunchProfile {
        LaunchProfile {
            headless: self.config.browser.headless,
            user_agent: Some(self.config.browser.user_agent.clone()),
            window_size: (
                self.config.browser.window_width,
                self.config.browser.window_height,
            ),
            cookies: Vec::new(),
        }
    }

    /// Fetches (or creates) the session for a country. `force_new` tears
    /// down any existing session first, which resets cookies and location
    /// state.
    pub fn acquire(&self, country: &CountryProfile, force_new: bool) -> Result<DriverHandle> {
        let name = driver_name_for(&country.code);
        if force_new {
            self.pool.release(&name);
        }
        self.pool.acquire(&name, &self.launch_profile())
    }

    pub fn release(&self, country_code: &str) {
        self.pool.release(&driver_name_for(country_code));
    }

    pub fn release_all(&self) {
        self.pool.release_all();
    }
}

/// Scrolls and wiggles the pointer so the page sees activity resembling
/// a person reading. Two scroll steps of 300-600px with 0.3-1.0s pauses,
/// then a small mouse movement. Script errors are ignored; this is best
/// effort.
pub fn simulate_human_behavior(session: &dyn PageSession) {
    let mut rng = rand::thread_rng();
    for _ in 0..2 {
        let delta: u32 = rng.gen_range(300..=600);
        let js = format!("window.scrollBy(0, {});", delta);
        if let Err(e) = session.execute_script(&js) {
            debug!("Scroll script failed: {}", e);
        }
        let pause = Duration::from_millis(rng.gen_range(300..=1000));
        std::thread::sleep(pause);
    }

    let x: u32 = rng.gen_range(100..=800);
    let y: u32 = rng.gen_range(100..=600);
    let js = format!(
        "document.dispatchEvent(new MouseEvent('mousemove', {{clientX: {}, clientY: {}, bubbles: true}}));",
        x, y
    );
    if let Err(e) = session.execute_script(&js) {
        debug!("Mouse move script failed: {}", e);
    }
}
