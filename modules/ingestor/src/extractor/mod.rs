pub mod confidence;
pub mod fallback;
pub mod prompt;
pub mod validate;

use crate::model::{ExtractionMetadata, ExtractionResult};
use std::borrow::Cow;
use tracing::instrument;
use vulndash_common::settings::{LlmSettings, ProcessingSettings};
use vulndash_module_llm::{Gateway, GatewayOutcome, GenerationRequest};

/// Turns raw advisory text into a validated [`ExtractionResult`].
///
/// Stateless and infallible towards the caller: provider trouble surfaces as
/// warnings or the low-confidence fallback result, never as an error.
pub struct ExtractionEngine {
    gateway: Gateway,
    confidence_threshold: f64,
    temperature: f32,
    max_tokens: u32,
    max_raw_text_bytes: usize,
}

impl ExtractionEngine {
    pub fn new(gateway: Gateway, llm: &LlmSettings, processing: &ProcessingSettings) -> Self {
        Self {
            gateway,
            confidence_threshold: llm.confidence_threshold,
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            max_raw_text_bytes: processing.max_raw_text_bytes,
        }
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    #[instrument(skip_all, fields(len = raw_text.len()))]
    pub async fn extract(&self, raw_text: &str) -> ExtractionResult {
        let text = truncate_at_word_boundary(raw_text, self.max_raw_text_bytes);

        if self.gateway.is_empty() {
            return fallback::extract(&text, vec!["no providers configured".into()]);
        }

        let mut request = GenerationRequest::new(prompt::SYSTEM_PROMPT, prompt::user_prompt(&text), "");
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        match self.gateway.generate_json(&request).await {
            GatewayOutcome::Success(tagged) => {
                let (candidate, warnings) = validate::validate(&tagged.value, &text);
                let confidence =
                    confidence::score(&candidate, warnings.len(), tagged.attempt_index);

                ExtractionResult {
                    needs_review: confidence < self.confidence_threshold
                        || candidate.cve_id.is_none(),
                    cve_id: candidate.cve_id,
                    title: candidate.title,
                    description: candidate.description,
                    vendor: candidate.vendor,
                    product: candidate.product,
                    severity: candidate.severity,
                    cvss_score: candidate.cvss_score,
                    cvss_vector: candidate.cvss_vector,
                    confidence_score: confidence,
                    metadata: ExtractionMetadata {
                        provider: Some(tagged.provider),
                        model: Some(tagged.model),
                        fallback_attempt: tagged.attempt_index,
                        warnings,
                        all_providers_failed: false,
                    },
                }
            }
            GatewayOutcome::AllFailed(failures) => {
                let warnings = failures
                    .iter()
                    .map(|failure| format!("provider '{}' failed: {}", failure.provider, failure.error))
                    .collect();
                fallback::extract(&text, warnings)
            }
        }
    }
}

/// Truncate to at most `max_bytes`, cutting at a word boundary and marking
/// the cut with an ellipsis. Text at exactly the limit is left untouched.
fn truncate_at_word_boundary(text: &str, max_bytes: usize) -> Cow<'_, str> {
    if text.len() <= max_bytes {
        return Cow::Borrowed(text);
    }

    // pick the largest char boundary not past the limit
    let mut cut = max_bytes;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }

    let head = &text[..cut];
    let head = match head.rfind(char::is_whitespace) {
        Some(boundary) if boundary > 0 => &head[..boundary],
        _ => head,
    };

    Cow::Owned(format!("{}…", head.trim_end()))
}

#[cfg(test)]
mod test {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use vulndash_entity::vulnerability::Severity;
    use vulndash_module_llm::{
        LlmProvider, ModelInfo, Probe, ProviderError, gateway::Attempt,
    };

    struct Canned {
        name: &'static str,
        response: Result<serde_json::Value, fn() -> ProviderError>,
    }

    #[async_trait]
    impl LlmProvider for Canned {
        fn name(&self) -> &str {
            self.name
        }

        async fn test_connection(&self) -> Result<Probe, ProviderError> {
            Ok(Probe {
                ok: true,
                reason: None,
                latency_ms: 1,
            })
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
            Ok(vec![])
        }

        async fn generate_json(
            &self,
            _request: &GenerationRequest,
        ) -> Result<serde_json::Value, ProviderError> {
            match &self.response {
                Ok(value) => Ok(value.clone()),
                Err(error) => Err(error()),
            }
        }
    }

    const RAW: &str = "CVE-2024-1234: Critical authentication bypass in Acme CMS version 2.1 \
                       allows remote attackers to obtain administrative access via a crafted \
                       HTTP header. CVSS 9.8.";

    fn good_response() -> serde_json::Value {
        serde_json::json!({
            "cve_id": "CVE-2024-1234",
            "title": "Acme CMS authentication bypass",
            "description": "Critical authentication bypass in Acme CMS version 2.1 allows \
                            remote attackers to obtain administrative access via a crafted \
                            HTTP header.",
            "vendor": "Acme",
            "product": "CMS",
            "severity": "CRITICAL",
            "cvss_score": 9.8,
            "cvss_vector": null,
        })
    }

    fn engine(providers: Vec<Canned>) -> ExtractionEngine {
        let attempts = providers
            .into_iter()
            .map(|provider| Attempt {
                provider: Arc::new(provider) as Arc<dyn LlmProvider>,
                model: None,
            })
            .collect();

        ExtractionEngine::new(
            Gateway::new(attempts, "test-model"),
            &Default::default(),
            &Default::default(),
        )
    }

    #[test_log::test(tokio::test)]
    async fn happy_path_promotes() {
        let engine = engine(vec![Canned {
            name: "primary",
            response: Ok(good_response()),
        }]);

        let result = engine.extract(RAW).await;

        assert_eq!(result.cve_id.as_deref(), Some("CVE-2024-1234"));
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.cvss_score, Some(9.8));
        assert_eq!(result.vendor.as_deref(), Some("acme"));
        assert_eq!(result.product.as_deref(), Some("cms"));
        assert!(result.confidence_score >= 0.85);
        assert!(!result.needs_review);
        assert_eq!(result.metadata.fallback_attempt, 0);
    }

    #[test_log::test(tokio::test)]
    async fn second_fallback_still_above_threshold() {
        let engine = engine(vec![
            Canned {
                name: "primary",
                response: Err(|| ProviderError::Auth("rejected".into())),
            },
            Canned {
                name: "first",
                response: Err(|| ProviderError::Connection("unreachable".into())),
            },
            Canned {
                name: "second",
                response: Ok(good_response()),
            },
        ]);

        let result = engine.extract(RAW).await;

        assert_eq!(result.metadata.fallback_attempt, 2);
        assert!(result.confidence_score >= 0.75);
        assert!(!result.needs_review);
    }

    #[test_log::test(tokio::test)]
    async fn all_failures_fall_back_to_regex() {
        let engine = engine(vec![
            Canned {
                name: "a",
                response: Err(|| ProviderError::generation("bad json")),
            },
            Canned {
                name: "b",
                response: Err(|| ProviderError::Timeout(std::time::Duration::from_secs(30))),
            },
        ]);

        let result = engine.extract(RAW).await;

        assert_eq!(result.cve_id.as_deref(), Some("CVE-2024-1234"));
        assert_eq!(result.confidence_score, fallback::FALLBACK_CONFIDENCE);
        assert!(result.needs_review);
        assert!(result.metadata.all_providers_failed);
        assert_eq!(result.title, None);
        assert_eq!(result.metadata.warnings.len(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn no_cve_in_text_needs_review() {
        let engine = engine(vec![Canned {
            name: "primary",
            response: Ok(serde_json::json!({
                "cve_id": null,
                "title": "Unspecified issue",
            })),
        }]);

        let result = engine
            .extract("A security advisory about some unspecified issue was published.")
            .await;

        assert_eq!(result.cve_id, None);
        assert!(result.needs_review);
    }

    #[test_log::test(tokio::test)]
    async fn empty_text_is_accepted() {
        let engine = engine(vec![Canned {
            name: "a",
            response: Err(|| ProviderError::generation("nothing to do")),
        }]);

        let result = engine.extract("").await;

        assert_eq!(result.cve_id, None);
        assert!(result.needs_review);
    }

    #[test_log::test]
    fn truncation_boundary() {
        let text = "word ".repeat(20);
        let text = text.trim_end();

        // exactly at the limit: untouched
        assert_eq!(truncate_at_word_boundary(text, text.len()), text);

        // one byte over: truncated at a word boundary with a marker
        let truncated = truncate_at_word_boundary(text, text.len() - 1);
        assert!(truncated.ends_with('…'));
        assert!(truncated.len() < text.len() + '…'.len_utf8());
        assert!(!truncated.trim_end_matches('…').ends_with(' '));
    }

    #[test_log::test]
    fn truncation_respects_char_boundaries() {
        let text = "héllo wörld, ünicode everywhere";
        for max in 1..text.len() {
            // must never panic on a char boundary
            let _ = truncate_at_word_boundary(text, max);
        }
    }
}
