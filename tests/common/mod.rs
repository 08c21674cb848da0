// Shared fixtures: a scripted PageSession so the full crawl pipeline can
// run without a browser.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pricewatch_crawler::config::AppConfig;
use pricewatch_crawler::driver_pool::DriverPool;
use pricewatch_crawler::session::{
    LaunchProfile, PageSession, SeedCookie, SessionFactory, SessionResult,
};
use pricewatch_crawler::store::MemoryStore;
use pricewatch_crawler::utils::error::SessionError;
use pricewatch_crawler::CrawlOrchestrator;

/// Script shared by every session the factory hands out, so state
/// survives pool-level recreation and is inspectable from the test.
#[derive(Default)]
pub struct Script {
    /// substring-of-url -> page html; first match wins, falls back to
    /// `default_page`
    pub pages: Vec<(String, String)>,
    pub default_page: String,
    /// navigation to any url containing one of these fails with a timeout
    pub fail_url_markers: Vec<String>,
    /// text reported for the delivery-location header
    pub location_text: String,
    pub visited: Vec<String>,
}

pub struct ScriptedSession {
    script: Arc<Mutex<Script>>,
    current_url: Mutex<String>,
}

impl ScriptedSession {
    fn page_for(&self, url: &str) -> String {
        let script = self.script.lock().unwrap();
        script
            .pages
            .iter()
            .find(|(marker, _)| url.contains(marker.as_str()))
            .map(|(_, html)| html.clone())
            .unwrap_or_else(|| script.default_page.clone())
    }
}

impl PageSession for ScriptedSession {
    fn navigate(&self, url: &str) -> SessionResult<()> {
        {
            let mut script = self.script.lock().unwrap();
            if script
                .fail_url_markers
                .iter()
                .any(|marker| url.contains(marker.as_str()))
            {
                return Err(SessionError::Timeout(format!("navigation to {}", url)));
            }
            script.visited.push(url.to_string());
        }
        *self.current_url.lock().unwrap() = url.to_string();
        Ok(())
    }

    fn current_url(&self) -> SessionResult<String> {
        Ok(self.current_url.lock().unwrap().clone())
    }

    fn page_source(&self) -> SessionResult<String> {
        let url = self.current_url.lock().unwrap().clone();
        Ok(self.page_for(&url))
    }

    fn wait_for_element(&self, _selector: &str, _timeout: Duration) -> SessionResult<()> {
        Ok(())
    }

    fn element_text(&self, selector: &str) -> SessionResult<String> {
        if selector == "#nav-global-location-popover-link" {
            let text = self.script.lock().unwrap().location_text.clone();
            if !text.is_empty() {
                return Ok(text);
            }
        }
        Err(SessionError::ElementNotFound {
            selector: selector.to_string(),
        })
    }

    fn click(&self, _selector: &str) -> SessionResult<()> {
        Ok(())
    }

    fn click_by_text(&self, _tag: &str, _text: &str) -> SessionResult<bool> {
        Ok(false)
    }

    fn type_into(&self, _selector: &str, _text: &str) -> SessionResult<()> {
        Ok(())
    }

    fn select_value(&self, _selector: &str, _value: &str) -> SessionResult<()> {
        Ok(())
    }

    fn execute_script(&self, _js: &str) -> SessionResult<()> {
        Ok(())
    }

    fn refresh(&self) -> SessionResult<()> {
        Ok(())
    }

    fn set_cookies(&self, _cookies: &[SeedCookie]) -> SessionResult<()> {
        Ok(())
    }
}

pub struct ScriptedFactory {
    pub script: Arc<Mutex<Script>>,
}

impl SessionFactory for ScriptedFactory {
    fn create(&self, _name: &str, _profile: &LaunchProfile) -> SessionResult<Arc<dyn PageSession>> {
        Ok(Arc::new(ScriptedSession {
            script: Arc::clone(&self.script),
            current_url: Mutex::new("about:blank".to_string()),
        }))
    }
}

/// Minimal US product page that passes the page-load indicators and the
/// currency probe.
pub fn product_page(title: &str, price: &str) -> String {
    format!(
        r#"<html><body><div id="dp">
        <span id="productTitle">{}</span>
        <span class="a-price"><span class="a-price-symbol">$</span><span class="a-offscreen">{}</span></span>
        <div id="merchant-info">Ships from and sold by Amazon.com.</div>
        <div id="availability">In Stock</div>
        </div></body></html>"#,
        title, price
    )
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    // keep the batch delay real but short
    config.crawl.batch_delay_min_secs = 0.01;
    config.crawl.batch_delay_max_secs = 0.05;
    config.crawl.navigation_timeout_secs = 1;
    config
}

pub fn scripted_orchestrator(
    script: Script,
) -> (CrawlOrchestrator, Arc<MemoryStore>, Arc<Mutex<Script>>) {
    let script = Arc::new(Mutex::new(script));
    let pool = Arc::new(DriverPool::new(Box::new(ScriptedFactory {
        script: Arc::clone(&script),
    })));
    let store = Arc::new(MemoryStore::new());
    let orchestrator = CrawlOrchestrator::new(
        Arc::new(test_config()),
        pool,
        store.clone() as Arc<dyn pricewatch_crawler::store::CrawlStore>,
    );
    (orchestrator, store, script)
}

/// A script whose every page is a normal US product page and whose ZIP
/// is already the US default, so geo setup is a no-op.
pub fn us_script() -> Script {
    Script {
        default_page: product_page("Scripted Test Product", "$49.99"),
        location_text: "Deliver to New York 10001".to_string(),
        ..Script::default()
    }
}
