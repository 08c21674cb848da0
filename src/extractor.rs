use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::country_pool::extract_asin_from_url;
use crate::models::country::CountryProfile;
use crate::models::product::{ProductRecord, ProductVariant};
use crate::models::ProductCondition;
use crate::session::PageSession;
use crate::utils::error::Result;

const PAGE_INDICATORS: &[&str] = &["#dp", "#productTitle", "#landingImage"];

const TITLE_SELECTORS: &[&str] = &["#productTitle", "#title", "h1.a-size-large"];

const PRICE_SELECTORS: &[&str] = &[
    ".a-price .a-offscreen",
    ".a-price-whole",
    "#priceblock_dealprice",
    "#priceblock_ourprice",
    ".a-price-current",
    "[data-a-color=\"price\"] .a-offscreen",
];

const IMAGE_SELECTORS: &[&str] = &["#landingImage", "#imgBlkFront", ".a-dynamic-image"];

const DESCRIPTION_SELECTORS: &[&str] = &["#productDescription", ".product-description", "#aplus"];

const FEATURE_SELECTORS: &[&str] = &[
    "#feature-bullets .a-list-item",
    ".a-unordered-list .a-list-item",
    "[data-hook=\"cr-features-list\"] li",
];

const SPEC_SELECTORS: &[&str] = &[".prodDetTable tr", ".product-specification-table tr"];

const SHIPPING_SELECTORS: &[&str] = &[
    "#mir-layout-DELIVERY_BLOCK-slot-DELIVERY_MESSAGE",
    ".shipping-weight",
    ".a-section.shipping-weight",
];

const CONDITION_SELECTORS: &[&str] = &["#condition", ".a-section.condition"];

const IDENTIFIER_ATTR_SELECTORS: &[&str] = &["[data-asin]", "[data-product-asin]", "#ASIN"];

const VARIANT_PICKER_SELECTORS: &[&str] = &[
    "#twister li[data-defaultasin]",
    "#twisterContainer li[data-defaultasin]",
    "#variation_color_name li[data-defaultasin]",
    "#variation_size_name li[data-defaultasin]",
];

fn sel(s: &str) -> Selector {
    // selector literals above are known-valid
    Selector::parse(s).unwrap()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(document: &Html, selectors: &[&str]) -> Option<String> {
    for selector in selectors {
        if let Some(element) = document.select(&sel(selector)).next() {
            let text = element_text(element);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Pulls the first price-looking number out of text. Thousands separators
/// are stripped before matching; text with no digits yields `None`.
pub fn parse_price(text: &str) -> Option<f64> {
    let normalized = text.replace(',', "");
    let pattern = Regex::new(r"\d+\.?\d*").unwrap();
    pattern
        .find(&normalized)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Stateless page-to-record extraction. Every public entry point parses a
/// captured HTML snapshot, so all the field logic is testable offline.
pub struct ProductExtractor;

impl ProductExtractor {
    /// Captures the live page once and extracts from the snapshot.
    /// `None` means the page is not a product page or has no identifier.
    pub fn extract(
        &self,
        session: &dyn PageSession,
        country: &CountryProfile,
    ) -> Result<Option<ProductRecord>> {
        let url = session.current_url()?;
        let html = session.page_source()?;
        Ok(self.extract_from_html(&html, &url, country))
    }

    pub fn extract_from_html(
        &self,
        html: &str,
        current_url: &str,
        country: &CountryProfile,
    ) -> Option<ProductRecord> {
        let document = Html::parse_document(html);

        if !is_product_page(&document) {
            warn!("Page has no product indicators, skipping extraction");
            return None;
        }

        let identifier = match extract_identifier(&document, current_url) {
            Some(id) => id,
            None => {
                warn!("Could not determine product identifier");
                return None;
            }
        };

        let mut record = ProductRecord::new(identifier.clone(), country.code.clone());
        record.title = first_text(&document, TITLE_SELECTORS)
            .filter(|t| t.len() > 5)
            .unwrap_or_default();
        record.price = extract_price(&document);
        record.currency = country.currency.clone().unwrap_or_default();
        record.brand = extract_brand(&document);
        record.seller = extract_seller(&document);
        record.seller_id = extract_seller_id(&document);
        record.rating = extract_rating(&document);
        record.review_count = extract_review_count(&document);
        record.image_url = extract_image_url(&document);
        record.category = extract_category(&document);
        record.availability = extract_availability(&document);
        record.description = extract_description(&document);
        record.features = extract_features(&document);
        record.specifications = extract_specifications(&document);
        record.shipping_info = extract_shipping_info(&document);
        record.condition = extract_condition(&document);
        record.variants = extract_variants(&document, &identifier);
        record.domain = country.domain.clone();
        record.last_crawled = chrono::Utc::now();

        info!("Extracted product {} ({} variants)", identifier, record.variants.len());
        Some(record)
    }
}

fn is_product_page(document: &Html) -> bool {
    PAGE_INDICATORS
        .iter()
        .any(|indicator| document.select(&sel(indicator)).next().is_some())
}

fn extract_identifier(document: &Html, current_url: &str) -> Option<String> {
    if let Some(asin) = extract_asin_from_url(current_url) {
        return Some(asin);
    }

    for selector in IDENTIFIER_ATTR_SELECTORS {
        for element in document.select(&sel(selector)) {
            let candidate = element
                .value()
                .attr("data-asin")
                .or_else(|| element.value().attr("data-product-asin"))
                .or_else(|| element.value().attr("value"));
            if let Some(id) = candidate {
                if id.len() == 10 && id.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Some(id.to_uppercase());
                }
            }
        }
    }
    None
}

fn extract_price(document: &Html) -> Option<f64> {
    for selector in PRICE_SELECTORS {
        for element in document.select(&sel(selector)) {
            if let Some(price) = parse_price(&element_text(element)) {
                return Some(price);
            }
        }
    }
    None
}

fn extract_brand(document: &Html) -> String {
    if let Some(element) = document.select(&sel("#bylineInfo")).next() {
        let clean = element_text(element)
            .replace("Visit the", "")
            .replace("Store", "")
            .replace("Brand:", "")
            .trim()
            .to_string();
        if clean.len() > 1 {
            return clean;
        }
    }
    String::new()
}

fn extract_seller(document: &Html) -> String {
    let text = match document.select(&sel("#merchant-info")).next() {
        Some(element) => element_text(element),
        None => return "Amazon".to_string(),
    };

    if text.contains("Ships from and sold by") {
        text.replace("Ships from and sold by", "")
            .split('.')
            .next()
            .unwrap_or("")
            .trim()
            .to_string()
    } else if text.contains("Sold by") {
        text.replace("Sold by", "")
            .split('.')
            .next()
            .unwrap_or("")
            .trim()
            .to_string()
    } else if text.contains("Amazon") {
        "Amazon".to_string()
    } else {
        text
    }
}

fn extract_seller_id(document: &Html) -> String {
    document
        .select(&sel("[data-csa-c-seller-id]"))
        .next()
        .and_then(|e| e.value().attr("data-csa-c-seller-id"))
        .unwrap_or("")
        .to_string()
}

fn extract_rating(document: &Html) -> Option<f64> {
    let element = document
        .select(&sel("[data-hook=\"average-star-rating\"] .a-icon-alt"))
        .next()?;
    let text = element_text(element);
    let pattern = Regex::new(r"(\d+\.?\d*) out of 5").unwrap();
    pattern
        .captures(&text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn extract_review_count(document: &Html) -> u32 {
    let Some(element) = document.select(&sel("#acrCustomerReviewText")).next() else {
        return 0;
    };
    let text = element_text(element).replace(',', "");
    let pattern = Regex::new(r"\d+").unwrap();
    pattern
        .find(&text)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(0)
}

fn extract_image_url(document: &Html) -> String {
    for selector in IMAGE_SELECTORS {
        if let Some(element) = document.select(&sel(selector)).next() {
            let url = element
                .value()
                .attr("src")
                .or_else(|| element.value().attr("data-old-hires"));
            if let Some(url) = url {
                if url.contains("http") {
                    return url.to_string();
                }
            }
        }
    }
    String::new()
}

fn extract_category(document: &Html) -> String {
    let crumbs: Vec<String> = document
        .select(&sel("#wayfinding-breadcrumbs_container a"))
        .map(element_text)
        .filter(|t| !t.is_empty() && t != "Home" && t != "›")
        .collect();
    crumbs.join(" > ")
}

fn extract_availability(document: &Html) -> bool {
    match document.select(&sel("#availability")).next() {
        Some(element) => {
            let text = element_text(element).to_lowercase();
            text.contains("in stock") || text.contains("available")
        }
        // Missing availability block means a buyable layout
        None => true,
    }
}

fn extract_description(document: &Html) -> String {
    first_text(document, DESCRIPTION_SELECTORS)
        .filter(|t| t.len() > 50)
        .unwrap_or_default()
}

fn extract_features(document: &Html) -> Vec<String> {
    for selector in FEATURE_SELECTORS {
        let features: Vec<String> = document
            .select(&sel(selector))
            .map(element_text)
            .filter(|t| t.len() > 10 && !t.starts_with('#'))
            .collect();
        if !features.is_empty() {
            return features;
        }
    }
    Vec::new()
}

fn extract_specifications(document: &Html) -> HashMap<String, String> {
    let cell = sel("td");
    for selector in SPEC_SELECTORS {
        let mut specs = HashMap::new();
        for row in document.select(&sel(selector)) {
            let cells: Vec<ElementRef<'_>> = row.select(&cell).collect();
            if cells.len() == 2 {
                let key = element_text(cells[0]).trim_end_matches(':').to_string();
                let value = element_text(cells[1]);
                if !key.is_empty() && !value.is_empty() {
                    specs.insert(key, value);
                }
            }
        }
        if !specs.is_empty() {
            return specs;
        }
    }
    HashMap::new()
}

fn extract_shipping_info(document: &Html) -> String {
    first_text(document, SHIPPING_SELECTORS)
        .filter(|t| t.len() > 10)
        .unwrap_or_default()
}

fn extract_condition(document: &Html) -> ProductCondition {
    for selector in CONDITION_SELECTORS {
        if let Some(element) = document.select(&sel(selector)).next() {
            let text = element_text(element).to_lowercase();
            if text.contains("renewed") || text.contains("refurbished") {
                return ProductCondition::Renewed;
            }
            if text.contains("used") {
                return ProductCondition::Used;
            }
            if text.contains("new") {
                return ProductCondition::New;
            }
        }
    }
    ProductCondition::New
}

/// Variant discovery. The structured picker scan reads per-variant price,
/// strike-through original price, availability and thumbnail; the generic
/// fallback only yields identifiers. Dedup keeps first-seen order, and the
/// page's own identifier is excluded.
fn extract_variants(document: &Html, own_identifier: &str) -> Vec<ProductVariant> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut variants: Vec<ProductVariant> = Vec::new();
    seen.insert(own_identifier.to_string());

    for selector in VARIANT_PICKER_SELECTORS {
        for element in document.select(&sel(selector)) {
            let Some(id) = element.value().attr("data-defaultasin") else {
                continue;
            };
            if !is_identifier(id) || !seen.insert(id.to_uppercase()) {
                continue;
            }
            let mut variant = ProductVariant::new(id.to_uppercase());
            variant.price = element
                .select(&sel(".twisterSwatchPrice, .a-price .a-offscreen"))
                .next()
                .and_then(|e| parse_price(&element_text(e)));
            variant.original_price = element
                .select(&sel(".a-text-strike"))
                .next()
                .and_then(|e| parse_price(&element_text(e)));
            variant.available = !element
                .value()
                .classes()
                .any(|c| c.eq_ignore_ascii_case("swatchUnavailable"));
            variant.thumbnail_url = element
                .select(&sel("img"))
                .next()
                .and_then(|e| e.value().attr("src"))
                .unwrap_or("")
                .to_string();
            variants.push(variant);
        }
    }

    // Generic fallback: anything carrying a ten-character identifier attr
    for element in document.select(&sel("[data-asin]")) {
        let Some(id) = element.value().attr("data-asin") else {
            continue;
        };
        if is_identifier(id) && seen.insert(id.to_uppercase()) {
            variants.push(ProductVariant::new(id.to_uppercase()));
        }
    }

    debug!("Discovered {} variant(s)", variants.len());
    variants
}

fn is_identifier(s: &str) -> bool {
    s.len() == 10 && s.chars().all(|c| c.is_ascii_alphanumeric())
}
