//! Remote decision source over HTTP.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::debug;

use super::parser::parse_decision;
use super::{DecisionError, DecisionSource};
use crate::config::DecisionConfig;
use crate::domain::{Decision, MarketSnapshot};

const STRATEGY_TAG: &str = "http";

/// POSTs the snapshot as JSON and parses whatever comes back.
pub struct HttpDecisionSource {
    endpoint: String,
    api_key: String,
    http_client: HttpClient,
}

impl HttpDecisionSource {
    pub fn new(config: &DecisionConfig) -> Result<Self, DecisionError> {
        let endpoint = config
            .endpoint
            .clone()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| DecisionError::Unsupported("http source without endpoint".into()))?;
        let http_client = HttpClient::builder().timeout(config.timeout).build()?;

        Ok(Self {
            endpoint,
            api_key: config.api_key.clone(),
            http_client,
        })
    }
}

#[async_trait]
impl DecisionSource for HttpDecisionSource {
    fn name(&self) -> &str {
        STRATEGY_TAG
    }

    async fn decide(&self, snapshot: &MarketSnapshot) -> Result<Decision, DecisionError> {
        let mut request = self.http_client.post(&self.endpoint).json(snapshot);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        debug!(symbol = %snapshot.symbol, endpoint = %self.endpoint, "Requesting decision");

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(DecisionError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        parse_decision(&body, STRATEGY_TAG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_endpoint() {
        let config = DecisionConfig {
            source: "http".into(),
            ..DecisionConfig::default()
        };
        assert!(matches!(
            HttpDecisionSource::new(&config),
            Err(DecisionError::Unsupported(_))
        ));

        let config = DecisionConfig {
            source: "http".into(),
            endpoint: Some("http://127.0.0.1:9/decide".into()),
            ..DecisionConfig::default()
        };
        let source = HttpDecisionSource::new(&config).unwrap();
        assert_eq!(source.name(), "http");
    }
}
