use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{generate_id, PriceTrend, SellerKind};

/// One timestamped price snapshot for a product on one storefront.
/// Append-only; the orchestrator suppresses inserts inside the 24-hour
/// dedup window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceObservation {
    pub id: String,
    pub identifier: String,
    pub country_code: String,
    pub price: f64,
    pub currency: String,
    pub seller: String,
    pub seller_kind: SellerKind,
    pub availability: bool,
    pub stock_status: String,
    pub shipping_info: String,
    pub crawl_source: String,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub price_change: Option<PriceChange>,
}

impl PriceObservation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identifier: impl Into<String>,
        country_code: impl Into<String>,
        price: f64,
        currency: impl Into<String>,
        seller: impl Into<String>,
        availability: bool,
        shipping_info: impl Into<String>,
        crawl_source: impl Into<String>,
    ) -> Self {
        let seller = seller.into();
        let seller_kind = if seller.to_lowercase().contains("amazon") {
            SellerKind::Marketplace
        } else {
            SellerKind::ThirdParty
        };
        Self {
            id: generate_id(),
            identifier: identifier.into(),
            country_code: country_code.into(),
            price,
            currency: currency.into(),
            seller,
            seller_kind,
            availability,
            stock_status: if availability {
                "In Stock".to_string()
            } else {
                "Out of Stock".to_string()
            },
            shipping_info: shipping_info.into(),
            crawl_source: crawl_source.into(),
            observed_at: Utc::now(),
            price_change: None,
        }
    }
}

/// Annotation comparing a fresh observation against the most recent one
/// strictly older than the dedup window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceChange {
    pub previous_price: f64,
    pub difference: f64,
    pub percentage: f64,
    pub trend: PriceTrend,
}

impl PriceChange {
    pub fn compute(previous_price: f64, current_price: f64) -> Self {
        let difference = current_price - previous_price;
        let percentage = if previous_price == 0.0 {
            0.0
        } else {
            difference / previous_price * 100.0
        };
        let trend = if difference > 0.0 {
            PriceTrend::Up
        } else if difference < 0.0 {
            PriceTrend::Down
        } else {
            PriceTrend::Stable
        };
        Self {
            previous_price,
            difference,
            percentage,
            trend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_change_up() {
        let change = PriceChange::compute(100.0, 125.0);
        assert_eq!(change.difference, 25.0);
        assert_eq!(change.percentage, 25.0);
        assert_eq!(change.trend, PriceTrend::Up);
    }

    #[test]
    fn test_price_change_down() {
        let change = PriceChange::compute(80.0, 60.0);
        assert_eq!(change.difference, -20.0);
        assert_eq!(change.percentage, -25.0);
        assert_eq!(change.trend, PriceTrend::Down);
    }

    #[test]
    fn test_price_change_stable() {
        let change = PriceChange::compute(19.99, 19.99);
        assert_eq!(change.difference, 0.0);
        assert_eq!(change.trend, PriceTrend::Stable);
    }

    #[test]
    fn test_price_change_zero_previous() {
        let change = PriceChange::compute(0.0, 10.0);
        assert_eq!(change.percentage, 0.0);
        assert_eq!(change.trend, PriceTrend::Up);
    }

    #[test]
    fn test_seller_kind_derivation() {
        let obs = PriceObservation::new(
            "B08N5WRWNW",
            "US",
            99.99,
            "USD",
            "Amazon.com",
            true,
            "",
            "amazon_us",
        );
        assert_eq!(obs.seller_kind, SellerKind::Marketplace);
        assert_eq!(obs.stock_status, "In Stock");

        let obs = PriceObservation::new(
            "B08N5WRWNW",
            "US",
            99.99,
            "USD",
            "SomeShop GmbH",
            false,
            "",
            "amazon_us",
        );
        assert_eq!(obs.seller_kind, SellerKind::ThirdParty);
        assert_eq!(obs.stock_status, "Out of Stock");
    }
}
