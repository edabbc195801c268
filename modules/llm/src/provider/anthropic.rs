use super::{LlmProvider, parse_json_object, with_deadline};
use crate::{
    error::ProviderError,
    model::{DEFAULT_PROBE_TIMEOUT, GenerationRequest, ModelInfo, Probe},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use time::OffsetDateTime;
use url::Url;

pub const NAME: &str = "anthropic";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const API_VERSION: &str = "2023-06-01";

/// A hosted backend speaking the Anthropic messages wire format
/// (content-parts rather than flat chat messages).
#[derive(Debug)]
pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(base_url: Url, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}/{path}"));
        url
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
    }
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<Model>,
}

#[derive(Deserialize)]
struct Model {
    id: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_at: Option<OffsetDateTime>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn test_connection(&self) -> Result<Probe, ProviderError> {
        let start = Instant::now();

        let response = with_deadline(DEFAULT_PROBE_TIMEOUT, async {
            Ok(self
                .request(self.client.get(self.endpoint("v1/models")))
                .send()
                .await?)
        })
        .await?;

        let latency_ms = start.elapsed().as_millis() as u64;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::Auth(status.to_string()));
        }

        Ok(Probe {
            ok: status.is_success(),
            reason: (!status.is_success()).then(|| format!("unexpected status: {status}")),
            latency_ms,
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        with_deadline(DEFAULT_PROBE_TIMEOUT, async {
            let response = self
                .request(self.client.get(self.endpoint("v1/models")))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::from_status(status, body));
            }

            let models = response.json::<ModelsResponse>().await?;

            Ok(models
                .data
                .into_iter()
                .map(|model| ModelInfo {
                    name: model.id,
                    size_hint: None,
                    modified_at: model.created_at,
                })
                .collect())
        })
        .await
    }

    async fn generate_json(
        &self,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, ProviderError> {
        let body = json!({
            "model": request.model,
            "system": request.system_prompt,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": [ { "type": "text", "text": request.user_prompt } ],
                },
            ],
        });

        with_deadline(request.timeout, async {
            let response = self
                .request(self.client.post(self.endpoint("v1/messages")))
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::from_status(status, body));
            }

            let message = response.json::<MessagesResponse>().await?;
            let text = message
                .content
                .iter()
                .find_map(|part| part.text.as_deref())
                .ok_or_else(|| ProviderError::generation("no text content part"))?;

            parse_json_object(text)
        })
        .await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    fn provider(server: &MockServer) -> AnthropicProvider {
        AnthropicProvider::new(
            server.uri().parse().expect("mock server uri"),
            "sk-ant-test".into(),
        )
    }

    #[test_log::test(tokio::test)]
    async fn generate_reads_first_text_part() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    { "type": "text", "text": "Here you go: {\"kev\": true}" }
                ]
            })))
            .mount(&server)
            .await;

        let result = provider(&server)
            .generate_json(&GenerationRequest::new("sys", "user", "claude-sonnet-4-5"))
            .await
            .unwrap();

        assert_eq!(result["kev"], true);
    }

    #[test_log::test(tokio::test)]
    async fn forbidden_is_auth_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(403).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate_json(&GenerationRequest::new("sys", "user", "claude-sonnet-4-5"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Auth(_)));
    }
}
