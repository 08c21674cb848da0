use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

use crate::session::PageSession;
use crate::utils::error::Result;

/// Classification of a fetched storefront page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Product content is present.
    Loaded,
    /// Anti-bot interstitial or captcha wall.
    BlockPage,
    /// Storefront error page (dogs page, 404, 503).
    ErrorPage,
    /// Neither product markers nor block markers found.
    Unknown,
}

const BLOCK_PHRASES: &[&str] = &[
    "being controlled by automated test software",
    "automated test software",
    "bot behavior",
    "unusual traffic",
    "to discuss automated access",
    "enter the characters you see below",
    "click the button below to continue",
];

const ERROR_PHRASES: &[&str] = &[
    "sorry! something went wrong",
    "we're sorry, an error has occurred",
    "looking for something?",
];

const PRODUCT_MARKERS: &[&str] = &["id=\"dp\"", "id=\"productTitle\"", "id=\"landingImage\""];

/// Click targets tried in order when a block interstitial offers a way
/// through. Tag and visible-text pairs.
const CONTINUE_STRATEGIES: &[(&str, &str)] = &[
    ("button", "Continue shopping"),
    ("a", "Continue shopping"),
    ("input", "Continue shopping"),
    ("button", "Continue"),
    ("a", "Continue"),
];

/// Classifies raw page source. Pure; callers fetch the source once and
/// reuse it for extraction.
pub fn classify_page(source: &str) -> PageState {
    let lower = source.to_lowercase();

    if BLOCK_PHRASES.iter().any(|p| lower.contains(p)) {
        return PageState::BlockPage;
    }
    if PRODUCT_MARKERS.iter().any(|m| source.contains(m)) {
        return PageState::Loaded;
    }
    if ERROR_PHRASES.iter().any(|p| lower.contains(p)) {
        return PageState::ErrorPage;
    }
    PageState::Unknown
}

/// Inspects the current page and, if blocked, works through the continue
/// strategies and finally a refresh. Returns the state the page ended up
/// in. A refresh that still shows a block yields `BlockPage`; the caller
/// decides whether to retry with a fresh session.
pub fn check_and_recover(session: &dyn PageSession) -> Result<PageState> {
    let state = classify_page(&session.page_source()?);
    if state != PageState::BlockPage {
        return Ok(state);
    }

    warn!("Block page detected, attempting recovery");

    for (tag, text) in CONTINUE_STRATEGIES {
        match session.click_by_text(tag, text) {
            Ok(true) => {
                info!("Clicked <{}> '{}', re-checking page", tag, text);
                pause_briefly();
                let state = classify_page(&session.page_source()?);
                if state != PageState::BlockPage {
                    info!("Block cleared via continue button");
                    return Ok(state);
                }
            }
            Ok(false) => {}
            Err(e) => warn!("Continue click <{}> '{}' failed: {}", tag, text, e),
        }
    }

    info!("No continue button worked, refreshing page");
    session.refresh()?;
    pause_briefly();
    let state = classify_page(&session.page_source()?);
    if state == PageState::BlockPage {
        warn!("Still blocked after refresh");
    }
    Ok(state)
}

fn pause_briefly() {
    let millis = rand::thread_rng().gen_range(1500..=3500);
    std::thread::sleep(Duration::from_millis(millis));
}
