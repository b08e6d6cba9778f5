//! GO Feature Flag relay-proxy provider (OFREP over HTTP).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::flags::{validate_request_uri, EvaluationContext, FeatureProvider, FlagError};

/// Configuration name selecting this provider.
pub const PROVIDER_NAME: &str = "go-feature-flag";

const DISPLAY_NAME: &str = "GO Feature Flag Provider";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const READINESS_POLL: Duration = Duration::from_millis(200);
const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct EvaluationRequest<'a> {
    context: &'a EvaluationContext,
}

#[derive(Deserialize)]
struct EvaluationResponse {
    value: serde_json::Value,
}

pub struct GoFeatureFlagProvider {
    endpoint: String,
    client: reqwest::Client,
    readiness_timeout: Duration,
}

impl GoFeatureFlagProvider {
    pub fn new(endpoint: &str) -> Result<Self, FlagError> {
        let parsed = validate_request_uri(endpoint)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FlagError::ProviderNotReady {
                name: DISPLAY_NAME.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            endpoint: parsed.as_str().trim_end_matches('/').to_string(),
            client,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
        })
    }

    /// Override how long [`FeatureProvider::init`] waits for the relay.
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    async fn is_healthy(&self) -> bool {
        match self.client.get(format!("{}/health", self.endpoint)).send().await {
            Ok(res) => res.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Feature-flag relay not reachable yet");
                false
            }
        }
    }

    async fn evaluate(
        &self,
        flag: &str,
        ctx: &EvaluationContext,
    ) -> Result<serde_json::Value, reqwest::Error> {
        let res = self
            .client
            .post(format!("{}/ofrep/v1/evaluate/flags/{}", self.endpoint, flag))
            .json(&EvaluationRequest { context: ctx })
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json::<EvaluationResponse>().await?.value)
    }
}

#[async_trait]
impl FeatureProvider for GoFeatureFlagProvider {
    fn metadata_name(&self) -> &str {
        DISPLAY_NAME
    }

    async fn init(&self) -> Result<(), FlagError> {
        let wait = async {
            while !self.is_healthy().await {
                tokio::time::sleep(READINESS_POLL).await;
            }
        };

        tokio::time::timeout(self.readiness_timeout, wait)
            .await
            .map_err(|_| FlagError::ProviderNotReady {
                name: DISPLAY_NAME.to_string(),
                reason: format!("relay at {} not healthy after {:?}", self.endpoint, self.readiness_timeout),
            })
    }

    async fn boolean_value(&self, flag: &str, default: bool, ctx: &EvaluationContext) -> bool {
        match self.evaluate(flag, ctx).await {
            Ok(serde_json::Value::Bool(value)) => value,
            Ok(other) => {
                tracing::warn!(flag, value = %other, "Flag is not a boolean, using default");
                default
            }
            Err(e) => {
                tracing::warn!(flag, error = %e, "Flag evaluation failed, using default");
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let provider = GoFeatureFlagProvider::new("http://relay.example.com:1031/").unwrap();
        assert_eq!(provider.endpoint, "http://relay.example.com:1031");
        assert_eq!(provider.metadata_name(), DISPLAY_NAME);
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_not_ready() {
        // Port 9 (discard) on loopback is closed on test machines.
        let provider = GoFeatureFlagProvider::new("http://127.0.0.1:9")
            .unwrap()
            .with_readiness_timeout(Duration::from_millis(300));
        let err = provider.init().await.unwrap_err();
        assert!(matches!(err, FlagError::ProviderNotReady { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_relay_evaluates_to_default() {
        let provider = GoFeatureFlagProvider::new("http://127.0.0.1:9").unwrap();
        let ctx = EvaluationContext::new("user-1");
        assert!(provider.boolean_value("test-flag", true, &ctx).await);
    }
}
