pub mod anthropic;
pub mod ollama;
pub mod openai;

use crate::{
    error::ProviderError,
    model::{GenerationRequest, ModelInfo, Probe},
};
use async_trait::async_trait;
use std::{future::Future, time::Duration};

/// Contract of a single remote inference backend.
///
/// Every method observes the caller supplied deadline and is cancellable at
/// its suspension points.
#[async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn test_connection(&self) -> Result<Probe, ProviderError>;

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError>;

    async fn check_model_available(&self, name: &str) -> Result<bool, ProviderError> {
        Ok(self.list_models().await?.iter().any(|m| m.name == name))
    }

    /// Generate a structured JSON object.
    async fn generate_json(
        &self,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, ProviderError>;
}

/// Enforce a deadline on a provider call.
pub(crate) async fn with_deadline<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(timeout)),
    }
}

/// Parse model output into a JSON object, tolerating surrounding prose.
///
/// Tries the whole payload first, then the first balanced `{…}` substring.
pub fn parse_json_object(text: &str) -> Result<serde_json::Value, ProviderError> {
    let direct = serde_json::from_str::<serde_json::Value>(text.trim());
    if let Ok(value @ serde_json::Value::Object(_)) = direct {
        return Ok(value);
    }

    if let Some(candidate) = first_balanced_object(text) {
        if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str(candidate) {
            return Ok(value);
        }
    }

    Err(ProviderError::generation(format!(
        "response is not a JSON object: {}",
        truncate(text, 120)
    )))
}

/// Find the first balanced `{…}` substring, skipping braces inside strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(r#"{"a": 1}"#, json!({"a": 1}))]
    #[case("Sure! Here is the JSON:\n```json\n{\"a\": 1}\n```", json!({"a": 1}))]
    #[case(r#"prefix {"a": {"b": "}"}} suffix"#, json!({"a": {"b": "}"}}))]
    #[case("text {\"a\": \"quote \\\" brace {\"} done", json!({"a": "quote \" brace {"}))]
    #[test_log::test]
    fn extract_wrapped_json(#[case] input: &str, #[case] expected: serde_json::Value) {
        assert_eq!(parse_json_object(input).unwrap(), expected);
    }

    #[rstest]
    #[case("no json here")]
    #[case("[1, 2, 3]")]
    #[case("{unbalanced")]
    #[test_log::test]
    fn reject_non_objects(#[case] input: &str) {
        assert!(matches!(
            parse_json_object(input),
            Err(ProviderError::Generation { .. })
        ));
    }
}
