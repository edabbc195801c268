use crate::{
    error::ProviderError,
    model::{AttemptFailure, GenerationRequest, Probe, TaggedGeneration},
    provider::LlmProvider,
};
use std::sync::Arc;
use tracing::instrument;

/// Outcome of a gateway call. Provider failure is data, not an error: the
/// extraction engine decides how to recover.
#[derive(Debug)]
pub enum GatewayOutcome {
    Success(TaggedGeneration),
    AllFailed(Vec<AttemptFailure>),
}

/// One provider plus its model override, in attempt order.
#[derive(Clone)]
pub struct Attempt {
    pub provider: Arc<dyn LlmProvider>,
    pub model: Option<String>,
}

/// Presents the provider contract over a primary plus ordered fallbacks.
pub struct Gateway {
    attempts: Vec<Attempt>,
    default_model: String,
}

impl Gateway {
    pub fn new(attempts: Vec<Attempt>, default_model: impl Into<String>) -> Self {
        Self {
            attempts,
            default_model: default_model.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Walk the attempt order sequentially until one provider succeeds.
    ///
    /// Auth failures also continue: fallbacks carry independent credentials.
    #[instrument(skip_all, fields(attempts = self.attempts.len()))]
    pub async fn generate_json(&self, request: &GenerationRequest) -> GatewayOutcome {
        let mut failures = Vec::new();

        for (attempt_index, attempt) in self.attempts.iter().enumerate() {
            let model = attempt
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone());

            let request = GenerationRequest {
                model: model.clone(),
                ..request.clone()
            };

            match attempt.provider.generate_json(&request).await {
                Ok(value) => {
                    log::debug!(
                        "generation succeeded via '{}' (attempt {attempt_index})",
                        attempt.provider.name()
                    );
                    return GatewayOutcome::Success(TaggedGeneration {
                        value,
                        provider: attempt.provider.name().to_string(),
                        model,
                        attempt_index,
                    });
                }
                Err(error) => {
                    log::warn!(
                        "provider '{}' failed (attempt {attempt_index}): {error}",
                        attempt.provider.name()
                    );
                    failures.push(AttemptFailure {
                        provider: attempt.provider.name().to_string(),
                        error,
                    });
                }
            }
        }

        GatewayOutcome::AllFailed(failures)
    }

    /// Probe every configured provider; used by the health surface.
    pub async fn probe_all(&self) -> Vec<(String, Result<Probe, ProviderError>)> {
        let mut results = Vec::with_capacity(self.attempts.len());
        for attempt in &self.attempts {
            let probe = attempt.provider.test_connection().await;
            results.push((attempt.provider.name().to_string(), probe));
        }
        results
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::ModelInfo;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A scripted provider: fails `failures` times, then succeeds.
    struct Scripted {
        name: &'static str,
        error: Option<fn() -> ProviderError>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                error: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str, error: fn() -> ProviderError) -> Arc<Self> {
            Arc::new(Self {
                name,
                error: Some(error),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.error {
                Some(error) => Err(error()),
                None => Ok(serde_json::json!({"cve_id": "CVE-2024-1234"})),
            }
        }
    }

    fn gateway(providers: Vec<Arc<Scripted>>) -> Gateway {
        Gateway::new(
            providers
                .into_iter()
                .map(|provider| Attempt {
                    provider,
                    model: None,
                })
                .collect(),
            "default-model",
        )
    }

    #[test_log::test(tokio::test)]
    async fn primary_success_short_circuits() {
        let primary = Scripted::ok("primary");
        let fallback = Scripted::ok("fallback");
        let gateway = gateway(vec![primary, fallback.clone()]);

        let outcome = gateway
            .generate_json(&GenerationRequest::new("s", "u", "m"))
            .await;

        match outcome {
            GatewayOutcome::Success(tagged) => {
                assert_eq!(tagged.provider, "primary");
                assert_eq!(tagged.attempt_index, 0);
                assert_eq!(tagged.model, "default-model");
            }
            GatewayOutcome::AllFailed(_) => panic!("expected success"),
        }

        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[test_log::test(tokio::test)]
    async fn auth_failure_continues_to_fallback() {
        let primary = Scripted::failing("primary", || ProviderError::Auth("rejected".into()));
        let second =
            Scripted::failing("second", || ProviderError::Connection("unreachable".into()));
        let third = Scripted::ok("third");

        let outcome = gateway(vec![primary, second, third])
            .generate_json(&GenerationRequest::new("s", "u", "m"))
            .await;

        match outcome {
            GatewayOutcome::Success(tagged) => {
                assert_eq!(tagged.provider, "third");
                assert_eq!(tagged.attempt_index, 2);
            }
            GatewayOutcome::AllFailed(_) => panic!("expected fallback success"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn exhaustion_returns_all_failures() {
        let providers = vec![
            Scripted::failing("a", || ProviderError::Auth("no".into())),
            Scripted::failing("b", || ProviderError::generation("garbage")),
            Scripted::failing("c", || {
                ProviderError::Timeout(std::time::Duration::from_secs(30))
            }),
        ];

        let outcome = gateway(providers)
            .generate_json(&GenerationRequest::new("s", "u", "m"))
            .await;

        match outcome {
            GatewayOutcome::AllFailed(failures) => {
                assert_eq!(failures.len(), 3);
                assert_eq!(failures[0].provider, "a");
                assert_eq!(failures[2].provider, "c");
            }
            GatewayOutcome::Success(_) => panic!("expected exhaustion"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn per_attempt_model_override() {
        let provider = Scripted::ok("primary");
        let gateway = Gateway::new(
            vec![Attempt {
                provider,
                model: Some("tuned-model".into()),
            }],
            "default-model",
        );

        match gateway
            .generate_json(&GenerationRequest::new("s", "u", "ignored"))
            .await
        {
            GatewayOutcome::Success(tagged) => assert_eq!(tagged.model, "tuned-model"),
            GatewayOutcome::AllFailed(_) => panic!("expected success"),
        }
    }
}
