use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::ProductCondition;

/// A purchasable variant (style/size/color) discovered on a product page,
/// each with its own catalog identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductVariant {
    pub identifier: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub original_price: Option<f64>,
    #[serde(default = "variant_available")]
    pub available: bool,
    #[serde(default)]
    pub thumbnail_url: String,
}

fn variant_available() -> bool {
    true
}

impl ProductVariant {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            price: None,
            original_price: None,
            available: true,
            thumbnail_url: String::new(),
        }
    }
}

/// One crawled product, keyed by (identifier, country code). Descriptive
/// fields are upserted on every successful crawl; price snapshots live in
/// `PriceObservation` and follow their own dedup policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub identifier: String,
    pub country_code: String,
    pub title: String,
    pub brand: String,
    pub category: String,
    pub image_url: String,
    pub description: String,
    pub features: Vec<String>,
    pub specifications: HashMap<String, String>,
    pub condition: ProductCondition,
    pub rating: Option<f64>,
    pub review_count: u32,
    pub variants: Vec<ProductVariant>,

    // Extraction-time observations carried through to the price snapshot
    pub price: Option<f64>,
    pub currency: String,
    pub seller: String,
    pub seller_id: String,
    pub availability: bool,
    pub shipping_info: String,

    // Provenance
    pub domain: String,
    pub last_crawled: DateTime<Utc>,
}

impl ProductRecord {
    pub fn new(identifier: impl Into<String>, country_code: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            country_code: country_code.into(),
            title: String::new(),
            brand: String::new(),
            category: String::new(),
            image_url: String::new(),
            description: String::new(),
            features: Vec::new(),
            specifications: HashMap::new(),
            condition: ProductCondition::New,
            rating: None,
            review_count: 0,
            variants: Vec::new(),
            price: None,
            currency: String::new(),
            seller: String::new(),
            seller_id: String::new(),
            availability: true,
            shipping_info: String::new(),
            domain: String::new(),
            last_crawled: Utc::now(),
        }
    }

    /// Storage key: one record per identifier per storefront.
    pub fn key(&self) -> (String, String) {
        (self.identifier.clone(), self.country_code.clone())
    }

    pub fn product_url(&self) -> String {
        format!("https://www.{}/dp/{}", self.domain, self.identifier)
    }

    pub fn variant_identifiers(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.identifier.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = ProductRecord::new("B08N5WRWNW", "US");
        assert_eq!(record.identifier, "B08N5WRWNW");
        assert!(record.availability);
        assert_eq!(record.condition, ProductCondition::New);
        assert_eq!(record.review_count, 0);
        assert!(record.price.is_none());
    }

    #[test]
    fn test_record_key() {
        let record = ProductRecord::new("B08N5WRWNW", "DE");
        assert_eq!(
            record.key(),
            ("B08N5WRWNW".to_string(), "DE".to_string())
        );
    }

    #[test]
    fn test_variant_identifiers() {
        let mut record = ProductRecord::new("B08N5WRWNW", "US");
        record.variants.push(ProductVariant::new("B0AAAAAAA1"));
        record.variants.push(ProductVariant::new("B0AAAAAAA2"));
        assert_eq!(
            record.variant_identifiers(),
            vec!["B0AAAAAAA1".to_string(), "B0AAAAAAA2".to_string()]
        );
    }

    #[test]
    fn test_product_url() {
        let mut record = ProductRecord::new("B08N5WRWNW", "US");
        record.domain = "amazon.com".to_string();
        assert_eq!(
            record.product_url(),
            "https://www.amazon.com/dp/B08N5WRWNW"
        );
    }
}
