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

pub const NAME: &str = "ollama";

/// A local inference server speaking the Ollama HTTP API.
#[derive(Debug)]
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl OllamaProvider {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}/{path}"));
        url
    }
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<Tag>,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    modified_at: Option<OffsetDateTime>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn test_connection(&self) -> Result<Probe, ProviderError> {
        let start = Instant::now();

        let response = with_deadline(DEFAULT_PROBE_TIMEOUT, async {
            Ok(self.client.get(self.endpoint("api/version")).send().await?)
        })
        .await?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        Ok(Probe {
            ok: status.is_success(),
            reason: (!status.is_success()).then(|| format!("unexpected status: {status}")),
            latency_ms,
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        with_deadline(DEFAULT_PROBE_TIMEOUT, async {
            let response = self.client.get(self.endpoint("api/tags")).send().await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::from_status(status, body));
            }

            let tags = response.json::<TagsResponse>().await?;

            Ok(tags
                .models
                .into_iter()
                .map(|tag| ModelInfo {
                    name: tag.name,
                    size_hint: tag.size,
                    modified_at: tag.modified_at,
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
            "stream": false,
            "format": "json",
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });

        with_deadline(request.timeout, async {
            let response = self
                .client
                .post(self.endpoint("api/chat"))
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::from_status(status, body));
            }

            let chat = response.json::<ChatResponse>().await?;
            parse_json_object(&chat.message.content)
        })
        .await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    async fn provider(server: &MockServer) -> OllamaProvider {
        OllamaProvider::new(server.uri().parse().expect("mock server uri"))
    }

    #[test_log::test(tokio::test)]
    async fn generate_parses_chat_content() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "role": "assistant", "content": r#"{"cve_id": "CVE-2024-1234"}"# }
            })))
            .mount(&server)
            .await;

        let result = provider(&server)
            .await
            .generate_json(&GenerationRequest::new("sys", "user", "llama3"))
            .await
            .unwrap();

        assert_eq!(result["cve_id"], "CVE-2024-1234");
    }

    #[test_log::test(tokio::test)]
    async fn server_error_is_generation_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .generate_json(&GenerationRequest::new("sys", "user", "llama3"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProviderError::Generation {
                rate_limited: false,
                ..
            }
        ));
    }

    #[test_log::test(tokio::test)]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_json(serde_json::json!({"message": {"content": "{}"}})),
            )
            .mount(&server)
            .await;

        let mut request = GenerationRequest::new("sys", "user", "llama3");
        request.timeout = Duration::from_millis(50);

        let err = provider(&server)
            .await
            .generate_json(&request)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[test_log::test(tokio::test)]
    async fn list_models_maps_tags() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    { "name": "llama3:8b", "size": 4661224676u64 },
                    { "name": "mistral" },
                ]
            })))
            .mount(&server)
            .await;

        let provider = provider(&server).await;
        let models = provider.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "llama3:8b");
        assert_eq!(models[0].size_hint, Some(4661224676));

        assert!(provider.check_model_available("mistral").await.unwrap());
        assert!(!provider.check_model_available("gpt-4o").await.unwrap());
    }
}
