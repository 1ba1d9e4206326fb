//! Sensay replica chat client (`/v1/replicas/{id}/chat/completions`).

use axum::http::header;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{send_json, ProviderError};
use crate::config::SensayConfig;

/// Chat completion body. `messages` is passed through as the caller sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensayChatRequest {
    pub messages: Vec<Value>,
    pub source: String,
    pub store: bool,
}

/// Client for the Sensay API.
#[derive(Debug, Clone)]
pub struct SensayClient {
    http: Client,
    base_url: String,
    api_version: String,
}

impl SensayClient {
    pub fn new(http: Client, config: &SensayConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Completions URL for a replica. The id is percent-encoded as one path segment.
    pub fn completions_url(&self, replica_id: &str) -> Result<Url, ProviderError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["v1", "replicas", replica_id, "chat", "completions"]);
        Ok(url)
    }

    /// Send a chat completion on behalf of `user_id`, returning the reply as-is.
    pub async fn chat_completion(
        &self,
        organization_secret: &str,
        user_id: &str,
        replica_id: &str,
        request: &SensayChatRequest,
    ) -> Result<Value, ProviderError> {
        let builder = self
            .http
            .post(self.completions_url(replica_id)?)
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-ORGANIZATION-SECRET", organization_secret)
            .header("X-USER-ID", user_id)
            .header("X-API-Version", &self.api_version)
            .json(request);
        send_json(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(base_url: &str) -> SensayClient {
        SensayClient::new(
            Client::new(),
            &SensayConfig {
                base_url: base_url.to_string(),
                ..SensayConfig::default()
            },
        )
    }

    #[test]
    fn test_completions_url() {
        let url = client("https://api.sensay.io/")
            .completions_url("replica-123")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.sensay.io/v1/replicas/replica-123/chat/completions"
        );
    }

    #[test]
    fn test_replica_id_stays_one_segment() {
        let url = client("https://api.sensay.io")
            .completions_url("a/b?c")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.sensay.io/v1/replicas/a%2Fb%3Fc/chat/completions"
        );
    }

    #[test]
    fn test_unusable_base_url() {
        let err = client("not a url").completions_url("r").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidUrl(_)));
    }

    #[test]
    fn test_request_wire_shape() {
        let request = SensayChatRequest {
            messages: vec![json!({"role": "user", "content": "hi"})],
            source: "web".to_string(),
            store: true,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "messages": [{"role": "user", "content": "hi"}],
                "source": "web",
                "store": true
            })
        );
    }
}
