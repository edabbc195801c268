use super::{LlmProvider, parse_json_object, with_deadline};
use crate::{
    error::ProviderError,
    model::{DEFAULT_PROBE_TIMEOUT, GenerationRequest, ModelInfo, Probe},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use url::Url;

pub const NAME: &str = "openai";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// A hosted backend speaking the OpenAI chat-completions wire format.
///
/// Also covers OpenAI-compatible gateways when configured with a custom base
/// URL.
#[derive(Debug)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl OpenAiProvider {
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

    async fn get(&self, path: &str) -> Result<reqwest::Response, ProviderError> {
        Ok(self
            .client
            .get(self.endpoint(path))
            .bearer_auth(&self.api_key)
            .send()
            .await?)
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
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn test_connection(&self) -> Result<Probe, ProviderError> {
        let start = Instant::now();

        let response = with_deadline(DEFAULT_PROBE_TIMEOUT, self.get("models")).await?;
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
            let response = self.get("models").await?;

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
                    modified_at: None,
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
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
        });

        with_deadline(request.timeout, async {
            let response = self
                .client
                .post(self.endpoint("chat/completions"))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::from_status(status, body));
            }

            let completion = response.json::<ChatCompletion>().await?;
            let content = completion
                .choices
                .first()
                .map(|choice| choice.message.content.as_str())
                .ok_or_else(|| ProviderError::generation("empty choices"))?;

            parse_json_object(content)
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

    fn provider(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(
            server.uri().parse().expect("mock server uri"),
            "sk-test".into(),
        )
    }

    #[test_log::test(tokio::test)]
    async fn generate_sends_bearer_and_parses_choice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "{\"severity\": \"HIGH\"}" } }
                ]
            })))
            .mount(&server)
            .await;

        let result = provider(&server)
            .generate_json(&GenerationRequest::new("sys", "user", "gpt-4o-mini"))
            .await
            .unwrap();

        assert_eq!(result["severity"], "HIGH");
    }

    #[test_log::test(tokio::test)]
    async fn unauthorized_is_auth_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate_json(&GenerationRequest::new("sys", "user", "gpt-4o-mini"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Auth(_)));
    }

    #[test_log::test(tokio::test)]
    async fn rate_limit_is_flagged() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate_json(&GenerationRequest::new("sys", "user", "gpt-4o-mini"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProviderError::Generation {
                rate_limited: true,
                ..
            }
        ));
    }
}
