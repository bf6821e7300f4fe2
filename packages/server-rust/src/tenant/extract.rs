use http::header::{HeaderMap, HeaderName};
use tentia_core::{TenantKey, TenantKeyError};

/// Header consulted when no other name is configured.
pub const DEFAULT_TENANT_HEADER: &str = "tenantid";

/// What to do when the tenant header appears more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicateTenantPolicy {
    /// Use the first occurrence and ignore the rest.
    First,
    /// Refuse the request.
    #[default]
    Reject,
}

impl std::str::FromStr for DuplicateTenantPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown duplicate tenant policy: {other} (expected first|reject)")),
        }
    }
}

/// Why a present tenant header could not be turned into a [`TenantKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TenantRejection {
    #[error("tenant header is absent or empty")]
    Absent,
    #[error("tenant header appears {count} times")]
    Duplicate { count: usize },
    #[error("tenant header is not visible ASCII")]
    Unreadable,
    #[error("tenant header value is invalid: {0}")]
    Invalid(#[from] TenantKeyError),
}

/// Reads the tenant key from one designated request header.
///
/// Header lookup is case-insensitive. Surrounding whitespace is trimmed and a
/// blank value counts as absent. No default tenant is ever substituted.
#[derive(Debug, Clone)]
pub struct TenantExtractor {
    header: HeaderName,
    duplicates: DuplicateTenantPolicy,
}

impl Default for TenantExtractor {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static(DEFAULT_TENANT_HEADER),
            duplicates: DuplicateTenantPolicy::default(),
        }
    }
}

impl TenantExtractor {
    #[must_use]
    pub fn new(header: HeaderName, duplicates: DuplicateTenantPolicy) -> Self {
        Self { header, duplicates }
    }

    /// The header name this extractor reads.
    #[must_use]
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    #[must_use]
    pub fn duplicates(&self) -> DuplicateTenantPolicy {
        self.duplicates
    }

    /// Extracts the tenant key.
    ///
    /// Returns `Ok(None)` when the header is missing or blank.
    ///
    /// # Errors
    ///
    /// Returns [`TenantRejection`] for repeated headers under
    /// [`DuplicateTenantPolicy::Reject`], values that are not visible ASCII,
    /// and values outside the tenant key alphabet.
    pub fn extract(&self, headers: &HeaderMap) -> Result<Option<TenantKey>, TenantRejection> {
        let mut values = headers.get_all(&self.header).iter();
        let Some(first) = values.next() else {
            return Ok(None);
        };

        let extra = values.count();
        if extra > 0 && self.duplicates == DuplicateTenantPolicy::Reject {
            return Err(TenantRejection::Duplicate { count: extra + 1 });
        }

        let raw = first.to_str().map_err(|_| TenantRejection::Unreadable)?.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(TenantKey::parse(raw)?))
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn reads_designated_header() {
        let key = TenantExtractor::default()
            .extract(&headers(&[("tenantid", "acme")]))
            .unwrap();
        assert_eq!(key.unwrap().as_str(), "acme");
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let mut map = HeaderMap::new();
        map.insert(
            HeaderName::from_bytes(b"TenantId").unwrap(),
            HeaderValue::from_static("acme"),
        );
        let key = TenantExtractor::default().extract(&map).unwrap();
        assert_eq!(key.unwrap().as_str(), "acme");
    }

    #[test]
    fn missing_header_is_none() {
        assert_eq!(TenantExtractor::default().extract(&HeaderMap::new()), Ok(None));
    }

    #[test]
    fn blank_header_is_none() {
        for blank in ["", "   ", "\t"] {
            let mut map = HeaderMap::new();
            map.insert("tenantid", HeaderValue::from_str(blank).unwrap());
            assert_eq!(TenantExtractor::default().extract(&map), Ok(None));
        }
    }

    #[test]
    fn value_is_trimmed_not_rewritten() {
        let key = TenantExtractor::default()
            .extract(&headers(&[("tenantid", "  AcMe-01 ")]))
            .unwrap();
        assert_eq!(key.unwrap().as_str(), "AcMe-01");
    }

    #[test]
    fn duplicates_rejected_by_default() {
        let map = headers(&[("tenantid", "acme"), ("tenantid", "globex")]);
        assert_eq!(
            TenantExtractor::default().extract(&map),
            Err(TenantRejection::Duplicate { count: 2 })
        );
    }

    #[test]
    fn first_policy_takes_first_value() {
        let map = headers(&[("tenantid", "acme"), ("tenantid", "globex")]);
        let extractor = TenantExtractor::new(
            HeaderName::from_static(DEFAULT_TENANT_HEADER),
            DuplicateTenantPolicy::First,
        );
        assert_eq!(extractor.extract(&map).unwrap().unwrap().as_str(), "acme");
    }

    #[test]
    fn metacharacters_are_invalid() {
        let err = TenantExtractor::default()
            .extract(&headers(&[("tenantid", "acme;Database=globex")]))
            .unwrap_err();
        assert!(matches!(err, TenantRejection::Invalid(_)));
    }

    #[test]
    fn opaque_bytes_are_unreadable() {
        let mut map = HeaderMap::new();
        map.insert("tenantid", HeaderValue::from_bytes(b"ac\xffme").unwrap());
        assert_eq!(
            TenantExtractor::default().extract(&map),
            Err(TenantRejection::Unreadable)
        );
    }

    #[test]
    fn custom_header_name() {
        let extractor = TenantExtractor::new(
            HeaderName::from_static("x-tenant"),
            DuplicateTenantPolicy::Reject,
        );
        let map = headers(&[("tenantid", "acme"), ("x-tenant", "globex")]);
        assert_eq!(extractor.extract(&map).unwrap().unwrap().as_str(), "globex");
    }

    #[test]
    fn policy_parses_from_cli_strings() {
        assert_eq!("FIRST".parse::<DuplicateTenantPolicy>(), Ok(DuplicateTenantPolicy::First));
        assert_eq!("reject".parse::<DuplicateTenantPolicy>(), Ok(DuplicateTenantPolicy::Reject));
        assert!("last".parse::<DuplicateTenantPolicy>().is_err());
    }
}
