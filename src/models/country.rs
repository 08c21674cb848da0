use serde::{Deserialize, Serialize};

/// Per-country storefront configuration: which domain to crawl, which
/// postal code and currency the session should present, and whether the
/// country is enabled for crawling at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CountryProfile {
    pub code: String,
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default = "default_true")]
    pub crawl_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl CountryProfile {
    pub fn base_url(&self) -> String {
        format!("https://www.{}", self.domain)
    }

    pub fn product_url(&self, identifier: &str) -> String {
        format!("https://www.{}/dp/{}", self.domain, identifier)
    }
}

/// The built-in storefront table. A config file may override or extend it;
/// the first entry is the base country used when a domain is unrecognized.
pub fn builtin_countries() -> Vec<CountryProfile> {
    let entries: [(&str, &str, &str, Option<&str>, &str); 9] = [
        ("US", "United States", "amazon.com", Some("10001"), "USD"),
        ("UK", "United Kingdom", "amazon.co.uk", None, "GBP"),
        ("DE", "Germany", "amazon.de", None, "EUR"),
        ("FR", "France", "amazon.fr", None, "EUR"),
        ("IT", "Italy", "amazon.it", None, "EUR"),
        ("ES", "Spain", "amazon.es", None, "EUR"),
        ("CA", "Canada", "amazon.ca", None, "CAD"),
        ("JP", "Japan", "amazon.co.jp", None, "JPY"),
        ("AU", "Australia", "amazon.com.au", None, "AUD"),
    ];

    entries
        .iter()
        .map(|(code, name, domain, zip, currency)| CountryProfile {
            code: code.to_string(),
            name: name.to_string(),
            domain: domain.to_string(),
            zip_code: zip.map(str::to_string),
            city: None,
            state: None,
            currency: Some(currency.to_string()),
            crawl_enabled: true,
        })
        .collect()
}

/// Lookup table over country profiles; resolves codes and domains.
#[derive(Debug, Clone)]
pub struct CountryTable {
    profiles: Vec<CountryProfile>,
}

impl CountryTable {
    pub fn new(profiles: Vec<CountryProfile>) -> Self {
        Self { profiles }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_countries())
    }

    pub fn base(&self) -> &CountryProfile {
        &self.profiles[0]
    }

    pub fn by_code(&self, code: &str) -> Option<&CountryProfile> {
        self.profiles
            .iter()
            .find(|p| p.code.eq_ignore_ascii_case(code))
    }

    /// Resolves a URL's host to a country profile. Longest matching domain
    /// wins so `amazon.co.uk` is not shadowed by a hypothetical `amazon.co`.
    /// Unrecognized hosts fall back to the base country.
    pub fn by_url(&self, raw_url: &str) -> &CountryProfile {
        let host = url::Url::parse(raw_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));

        let host = match host {
            Some(h) => h,
            None => return self.base(),
        };

        self.profiles
            .iter()
            .filter(|p| host == p.domain || host.ends_with(&format!(".{}", p.domain)))
            .max_by_key(|p| p.domain.len())
            .unwrap_or_else(|| self.base())
    }

    pub fn profiles(&self) -> &[CountryProfile] {
        &self.profiles
    }
}
