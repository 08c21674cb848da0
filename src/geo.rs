use regex::Regex;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::block;
use crate::models::country::CountryProfile;
use crate::session::PageSession;
use crate::utils::error::{AppError, Result};

const ZIP_TRIGGER: &str = "#nav-global-location-popover-link";
const ZIP_INPUT: &str = "#GLUXZipUpdateInput";
const ZIP_APPLY: &str = "#GLUXZipUpdate";
const ZIP_DISMISS: &str = "span[data-action='a-popover-close']";
const CURRENCY_DROPDOWN: &str = "#icp-currency-dropdown-selected-option, select#a-native-dropdown";
const CURRENCY_SUBMIT: &str = "input[type='submit']";

fn symbols_for(currency: &str) -> &'static [&'static str] {
    match currency {
        "USD" => &["$", "US$"],
        "EUR" => &["€"],
        "GBP" => &["£"],
        "JPY" => &["¥", "￥"],
        "CAD" => &["C$", "CA$"],
        "AUD" => &["A$", "AU$"],
        _ => &[],
    }
}

/// Drives the storefront UI to match a country profile: correct domain,
/// delivery ZIP, display currency. Every step checks before acting, so a
/// session that is already configured passes through untouched.
pub struct GeoConfigurator {
    zip_pattern: Regex,
}

impl Default for GeoConfigurator {
    fn default() -> Self {
        Self::new()
    }
}

impl GeoConfigurator {
    pub fn new() -> Self {
        Self {
            zip_pattern: Regex::new(r"\b\d{5}\b").unwrap(),
        }
    }

    /// Returns `Ok(true)` when the session ended up fully configured.
    /// ZIP and currency failures log a warning and return `Ok(false)`;
    /// only transport-level failures surface as errors.
    pub fn ensure_location(
        &self,
        session: &dyn PageSession,
        country: &CountryProfile,
    ) -> Result<bool> {
        info!("Checking storefront location for {}", country.name);
        let mut fully_configured = true;

        if !self.is_on_domain(session, &country.domain) {
            info!("Redirecting to {}", country.domain);
            session.navigate(&country.base_url())?;
            let state = block::check_and_recover(session)?;
            if state == block::PageState::BlockPage {
                return Err(AppError::Navigation(format!(
                    "blocked while switching to {}",
                    country.domain
                )));
            }
        }

        if let Some(zip) = country.zip_code.as_deref() {
            if !self.is_zip_set(session, zip) && !self.set_zip_code(session, zip) {
                warn!("Failed to set ZIP code {}, continuing", zip);
                fully_configured = false;
            }
        }

        if let Some(currency) = country.currency.as_deref() {
            if !self.is_currency_set(session, currency) && !self.set_currency(session, currency) {
                warn!("Failed to set currency {}, continuing", currency);
                fully_configured = false;
            }
        }

        info!(
            "Location check for {} done (fully configured: {})",
            country.name, fully_configured
        );
        Ok(fully_configured)
    }

    fn is_on_domain(&self, session: &dyn PageSession, domain: &str) -> bool {
        session
            .current_url()
            .map(|url| url.contains(domain))
            .unwrap_or(false)
    }

    fn is_zip_set(&self, session: &dyn PageSession, expected: &str) -> bool {
        let text = match session.element_text(ZIP_TRIGGER) {
            Ok(t) => t,
            Err(_) => return false,
        };
        match self.zip_pattern.find(&text) {
            Some(m) => {
                debug!("Current ZIP: {}, expected: {}", m.as_str(), expected);
                m.as_str() == expected
            }
            None => false,
        }
    }

    fn set_zip_code(&self, session: &dyn PageSession, zip: &str) -> bool {
        info!("Setting delivery ZIP to {}", zip);
        let steps = || -> std::result::Result<(), crate::utils::error::SessionError> {
            session.click(ZIP_TRIGGER)?;
            std::thread::sleep(Duration::from_millis(1000));
            session.wait_for_element(ZIP_INPUT, Duration::from_secs(5))?;
            session.type_into(ZIP_INPUT, zip)?;
            session.click(ZIP_APPLY)?;
            std::thread::sleep(Duration::from_millis(2000));
            Ok(())
        };
        if let Err(e) = steps() {
            warn!("ZIP update sequence failed: {}", e);
            return false;
        }
        // Confirmation popover does not always appear
        if session.click(ZIP_DISMISS).is_err() {
            debug!("No location popover to dismiss");
        }
        true
    }

    fn is_currency_set(&self, session: &dyn PageSession, expected: &str) -> bool {
        let source = match session.page_source() {
            Ok(s) => s,
            Err(_) => return false,
        };
        currency_visible_in_html(&source, expected)
    }

    fn set_currency(&self, session: &dyn PageSession, currency: &str) -> bool {
        info!("Setting display currency to {}", currency);
        let host = match session.current_url() {
            Ok(url) => match url::Url::parse(&url).ok().and_then(|u| u.host_str().map(String::from)) {
                Some(h) => h,
                None => return false,
            },
            Err(_) => return false,
        };

        let prefs_url = format!("https://{}/gp/help/customer/display.html?nodeId=201895280", host);
        if self.select_currency_at(session, &prefs_url, currency) {
            return self.is_currency_set_after_return(session, currency);
        }

        warn!("Currency dropdown method failed, trying preferences page");
        let alt_url = format!("https://{}/gp/customer-preferences/select-currency", host);
        if self.pick_currency_radio(session, &alt_url, currency) {
            return self.is_currency_set_after_return(session, currency);
        }
        false
    }

    fn select_currency_at(&self, session: &dyn PageSession, url: &str, currency: &str) -> bool {
        let steps = || -> std::result::Result<(), crate::utils::error::SessionError> {
            session.navigate(url)?;
            session.wait_for_element(CURRENCY_DROPDOWN, Duration::from_secs(10))?;
            session.select_value(CURRENCY_DROPDOWN, currency)?;
            std::thread::sleep(Duration::from_millis(1000));
            session.click(CURRENCY_SUBMIT)?;
            std::thread::sleep(Duration::from_millis(2000));
            Ok(())
        };
        match steps() {
            Ok(()) => true,
            Err(e) => {
                debug!("Currency dropdown flow failed: {}", e);
                false
            }
        }
    }

    fn pick_currency_radio(&self, session: &dyn PageSession, url: &str, currency: &str) -> bool {
        let radio = format!("input[name='currency'][value='{}']", currency);
        let steps = || -> std::result::Result<(), crate::utils::error::SessionError> {
            session.navigate(url)?;
            session.wait_for_element(&radio, Duration::from_secs(10))?;
            session.click(&radio)?;
            session.click(CURRENCY_SUBMIT)?;
            std::thread::sleep(Duration::from_millis(2000));
            Ok(())
        };
        match steps() {
            Ok(()) => true,
            Err(e) => {
                debug!("Currency preferences flow failed: {}", e);
                false
            }
        }
    }

    fn is_currency_set_after_return(&self, session: &dyn PageSession, currency: &str) -> bool {
        if self.is_currency_set(session, currency) {
            info!("Currency set to {}", currency);
            true
        } else {
            warn!("Currency {} not confirmed after change", currency);
            false
        }
    }
}

/// Scans price markup for the symbols belonging to a currency code.
/// Pure over page source so it is testable without a browser.
pub fn currency_visible_in_html(html: &str, currency: &str) -> bool {
    let symbols = symbols_for(currency);
    if symbols.is_empty() {
        return false;
    }

    let document = Html::parse_document(html);
    let selector = match Selector::parse(".a-price-symbol, .a-price-whole") {
        Ok(s) => s,
        Err(_) => return false,
    };

    for element in document.select(&selector) {
        let text: String = element.text().collect::<String>();
        let text = text.trim();
        if symbols.iter().any(|sym| text.contains(sym)) {
            return true;
        }
    }
    false
}
