//! Deterministic naming for replacement records.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VigilError};

/// Brands with a historical prefix that does not follow the `api<brand>` rule.
const KNOWN_PREFIXES: &[(&str, &str)] = &[("wujie", "apiwj"), ("v2word", "apiv2")];

/// Label prefix for a brand's replacement subdomains.
pub fn prefix_for(brand: &str) -> String {
    let brand = brand.trim().to_lowercase();
    KNOWN_PREFIXES
        .iter()
        .find(|(known, _)| *known == brand)
        .map(|(_, prefix)| prefix.to_string())
        .unwrap_or_else(|| format!("api{}", brand))
}

/// Per-brand naming and routing details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandProfile {
    pub name: String,
    pub prefix: String,
    /// Apex zone replacement records are created under
    pub apex: String,
    /// Upstream host the brand's reverse-proxy block forwards to
    pub target_host: Option<String>,
}

impl BrandProfile {
    pub fn new(name: &str, apex: &str) -> Self {
        let name = name.trim().to_lowercase();
        Self {
            prefix: prefix_for(&name),
            name,
            apex: apex.trim().trim_end_matches('.').to_lowercase(),
            target_host: None,
        }
    }

    pub fn with_target_host(mut self, host: impl Into<String>) -> Self {
        self.target_host = Some(host.into());
        self
    }
}

/// Lifecycle of a candidate record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateStatus {
    Pending,
    Created,
    AlreadyExists,
    Failed,
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandidateStatus::Pending => "PENDING",
            CandidateStatus::Created => "CREATED",
            CandidateStatus::AlreadyExists => "ALREADY_EXISTS",
            CandidateStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// A proposed replacement domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDomain {
    pub brand: String,
    pub subdomain: String,
    pub fqdn: String,
    pub status: CandidateStatus,
}

impl CandidateDomain {
    pub fn url(&self) -> String {
        format!("https://{}", self.fqdn)
    }
}

/// Configured brands, keyed by lowercase name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrandRegistry {
    brands: BTreeMap<String, BrandProfile>,
}

impl BrandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, profile: BrandProfile) {
        self.brands.insert(profile.name.clone(), profile);
    }

    pub fn with_brand(mut self, profile: BrandProfile) -> Self {
        self.insert(profile);
        self
    }

    pub fn get(&self, brand: &str) -> Result<&BrandProfile> {
        self.brands
            .get(&brand.trim().to_lowercase())
            .ok_or_else(|| VigilError::UnknownBrand(brand.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.brands.keys().map(String::as_str)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &BrandProfile> {
        self.brands.values()
    }

    pub fn len(&self) -> usize {
        self.brands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brands.is_empty()
    }

    /// Builds the replacement candidate for `brand` on `date`.
    ///
    /// The same brand and date always give the same fqdn, which is what
    /// makes a re-run after a partial failure hit `ALREADY_EXISTS`.
    pub fn generate(&self, brand: &str, date: NaiveDate) -> Result<CandidateDomain> {
        let profile = self.get(brand)?;
        if profile.apex.is_empty() {
            return Err(VigilError::UnknownBrand(format!("{} has no apex domain", brand)));
        }

        let subdomain = format!("{}{}", profile.prefix, date.format("%y%m%d"));
        let fqdn = format!("{}.{}", subdomain, profile.apex);

        Ok(CandidateDomain {
            brand: profile.name.clone(),
            subdomain,
            fqdn,
            status: CandidateStatus::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> BrandRegistry {
        BrandRegistry::new()
            .with_brand(BrandProfile::new("wujie", "wj0001.cfd"))
            .with_brand(BrandProfile::new("v2word", "v20000.cfd"))
            .with_brand(BrandProfile::new("Acme", "acme.example."))
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    #[test]
    fn test_prefix_for() {
        assert_eq!(prefix_for("wujie"), "apiwj");
        assert_eq!(prefix_for("v2word"), "apiv2");
        assert_eq!(prefix_for("Acme"), "apiacme");
    }

    #[test]
    fn test_generate_known_brand() {
        let candidate = registry().generate("wujie", date()).unwrap();

        assert_eq!(candidate.subdomain, "apiwj250301");
        assert_eq!(candidate.fqdn, "apiwj250301.wj0001.cfd");
        assert_eq!(candidate.status, CandidateStatus::Pending);
        assert_eq!(candidate.url(), "https://apiwj250301.wj0001.cfd");
    }

    #[test]
    fn test_generate_unknown_prefix_brand() {
        let candidate = registry().generate("ACME", date()).unwrap();
        assert_eq!(candidate.fqdn, "apiacme250301.acme.example");
    }

    #[test]
    fn test_generate_is_deterministic() {
        let registry = registry();
        assert_eq!(
            registry.generate("v2word", date()).unwrap(),
            registry.generate("v2word", date()).unwrap()
        );
    }

    #[test]
    fn test_unconfigured_brand_is_error() {
        let err = registry().generate("nobody", date()).unwrap_err();
        assert!(matches!(err, VigilError::UnknownBrand(_)));
    }
}
