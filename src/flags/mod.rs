//! Feature-flag provider selection.
//!
//! # Data Flow
//! ```text
//! ConfigStore (provider name + url)
//!     → set_provider (validate, construct, wait for readiness)
//!     → Arc<dyn FeatureProvider> injected into the Api handle
//!     → bundles evaluate flags per request
//! ```
//!
//! # Design Decisions
//! - No process-global provider; the selected provider is passed explicitly
//! - Evaluation never fails a request: providers fall back to the default

pub mod go_feature_flag;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::schema::{SERVER_OPENFEATURE_PROVIDER_NAME, SERVER_OPENFEATURE_PROVIDER_URL};
use crate::config::ConfigStore;

pub use go_feature_flag::GoFeatureFlagProvider;

/// Explicit spelling of "no provider".
pub const NOOP_PROVIDER_NAME: &str = "NoopProvider";

#[derive(Debug, Error)]
pub enum FlagError {
    #[error("openfeature provider url not set: {0}")]
    ProviderUrlNotSet(String),
    #[error("invalid openfeature provider url: {url}: {reason}")]
    InvalidProviderUrl { url: String, reason: String },
    #[error("unsupported openfeature provider: {0}")]
    UnsupportedProvider(String),
    #[error("openfeature provider {name} not ready: {reason}")]
    ProviderNotReady { name: String, reason: String },
}

/// Attributes a flag may be evaluated against.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationContext {
    #[serde(rename = "targetingKey", skip_serializing_if = "Option::is_none")]
    pub targeting_key: Option<String>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl EvaluationContext {
    pub fn new(targeting_key: impl Into<String>) -> Self {
        Self {
            targeting_key: Some(targeting_key.into()),
            attributes: BTreeMap::new(),
        }
    }
}

/// A source of feature-flag values.
#[async_trait]
pub trait FeatureProvider: Send + Sync {
    /// Human-readable provider name.
    fn metadata_name(&self) -> &str;

    /// Wait until the provider can serve evaluations.
    async fn init(&self) -> Result<(), FlagError> {
        Ok(())
    }

    /// Evaluate a boolean flag, returning `default` when the provider has no answer.
    async fn boolean_value(&self, flag: &str, default: bool, ctx: &EvaluationContext) -> bool;
}

/// Provider that always returns the supplied default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProvider;

#[async_trait]
impl FeatureProvider for NoopProvider {
    fn metadata_name(&self) -> &str {
        NOOP_PROVIDER_NAME
    }

    async fn boolean_value(&self, _flag: &str, default: bool, _ctx: &EvaluationContext) -> bool {
        default
    }
}

/// Select, construct and initialise the provider named in `store`.
pub async fn set_provider(store: &ConfigStore) -> Result<Arc<dyn FeatureProvider>, FlagError> {
    let name = store.get_string(SERVER_OPENFEATURE_PROVIDER_NAME);
    if name.is_empty() || name == NOOP_PROVIDER_NAME {
        tracing::info!("No feature-flag provider configured, using noop provider");
        return Ok(Arc::new(NoopProvider));
    }

    let url = store.get_string(SERVER_OPENFEATURE_PROVIDER_URL);
    if url.is_empty() {
        return Err(FlagError::ProviderUrlNotSet(name));
    }
    validate_request_uri(&url)?;

    let provider: Arc<dyn FeatureProvider> = match name.as_str() {
        go_feature_flag::PROVIDER_NAME => Arc::new(GoFeatureFlagProvider::new(&url)?),
        _ => return Err(FlagError::UnsupportedProvider(name)),
    };

    provider.init().await?;
    tracing::info!(provider = provider.metadata_name(), url = %url, "Feature-flag provider ready");
    Ok(provider)
}

/// Accept only absolute URLs that need no cleanup to parse.
///
/// Stricter than request-URI parsing: path-only (`/relay`) and opaque
/// (`mailto:`) forms are rejected since provider endpoints are appended as
/// paths under the URL.
pub(crate) fn validate_request_uri(raw: &str) -> Result<url::Url, FlagError> {
    let invalid = |reason: String| FlagError::InvalidProviderUrl {
        url: raw.to_string(),
        reason,
    };

    if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("contains whitespace or control characters".to_string()));
    }
    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if parsed.cannot_be_a_base() {
        return Err(invalid("not a hierarchical url".to_string()));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(name: &str, url: &str) -> ConfigStore {
        ConfigStore::new()
            .with(SERVER_OPENFEATURE_PROVIDER_NAME, name.to_string())
            .with(SERVER_OPENFEATURE_PROVIDER_URL, url.to_string())
    }

    #[tokio::test]
    async fn test_empty_name_selects_noop() {
        let provider = set_provider(&store("", "")).await.unwrap();
        assert_eq!(provider.metadata_name(), NOOP_PROVIDER_NAME);
    }

    #[tokio::test]
    async fn test_unconfigured_store_selects_noop() {
        let provider = set_provider(&ConfigStore::new()).await.unwrap();
        assert_eq!(provider.metadata_name(), NOOP_PROVIDER_NAME);
    }

    #[tokio::test]
    async fn test_explicit_noop_name_ignores_url() {
        let provider = set_provider(&store(NOOP_PROVIDER_NAME, "not a url"))
            .await
            .unwrap();
        assert_eq!(provider.metadata_name(), NOOP_PROVIDER_NAME);
    }

    #[tokio::test]
    async fn test_url_without_name_selects_noop() {
        let provider = set_provider(&store("", "http://custom-provider.example.com"))
            .await
            .unwrap();
        assert_eq!(provider.metadata_name(), NOOP_PROVIDER_NAME);
    }

    #[tokio::test]
    async fn test_name_without_url_fails() {
        let err = set_provider(&store("go-feature-flag", "")).await.err().unwrap();
        assert!(matches!(err, FlagError::ProviderUrlNotSet(ref name) if name == "go-feature-flag"));
    }

    #[tokio::test]
    async fn test_invalid_url_fails() {
        for url in ["not a url", "http:/i\nvalid-url", "mailto:ops@example.com", "/relay"] {
            let err = set_provider(&store("go-feature-flag", url)).await.err().unwrap();
            assert!(matches!(err, FlagError::InvalidProviderUrl { .. }), "{url}: {err}");
        }
    }

    #[test]
    fn test_only_hierarchical_absolute_urls_are_accepted() {
        let err = validate_request_uri("/relay").unwrap_err();
        assert!(matches!(err, FlagError::InvalidProviderUrl { ref url, .. } if url == "/relay"));

        match validate_request_uri("mailto:ops@example.com").unwrap_err() {
            FlagError::InvalidProviderUrl { reason, .. } => {
                assert_eq!(reason, "not a hierarchical url")
            }
            other => panic!("unexpected error: {other}"),
        }

        let ok = validate_request_uri("http://relay.local:1031").unwrap();
        assert_eq!(ok.host_str(), Some("relay.local"));
        assert_eq!(ok.port(), Some(1031));
    }

    #[tokio::test]
    async fn test_unknown_provider_fails() {
        let err = set_provider(&store("launchdarkly", "http://flags.example.com"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FlagError::UnsupportedProvider(ref name) if name == "launchdarkly"));
    }

    #[tokio::test]
    async fn test_noop_returns_default() {
        let ctx = EvaluationContext::default();
        assert!(NoopProvider.boolean_value("test-flag", true, &ctx).await);
        assert!(!NoopProvider.boolean_value("test-flag", false, &ctx).await);
    }
}
