use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod country;
pub mod price;
pub mod product;
pub mod request;
pub mod session;

// Re-exports for convenience
pub use country::*;
pub use price::*;
pub use product::*;
pub use request::*;
pub use session::*;

// Common enums used across models
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductCondition {
    New,
    Used,
    Renewed,
}

impl Default for ProductCondition {
    fn default() -> Self {
        ProductCondition::New
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SellerKind {
    #[serde(rename = "Amazon")]
    Marketplace,
    #[serde(rename = "Third-Party")]
    ThirdParty,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriceTrend {
    Up,
    Down,
    Stable,
}

// Helper function to generate ids in the compact hex format used everywhere
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
