use reqwest::StatusCode;
use serde_json::json;

use crate::prompt::categorizer::{CategorizeError, Categorizer, SingleCategory, TitleCategory};
use crate::server_config::ModelConfig;
use crate::HttpClient;

use super::{
    batch_system_prompt, batch_user_prompt, parse_batch_answer, parse_single_answer,
    single_system_prompt, single_user_prompt, ChatApiError, ChatApiResponseOrError,
};

/// Message the Mistral API sends when a key exhausts its request quota.
const RATE_LIMIT_MESSAGE: &str = "Requests rate limit exceeded";

/// Chat-completions client for any OpenAI-compatible endpoint (Mistral by
/// default). The credential is supplied per call by the key pool.
#[derive(Debug, Clone)]
pub struct MistralClient {
    http_client: HttpClient,
    endpoint: String,
    model: ModelConfig,
    categories: Vec<String>,
}

impl MistralClient {
    pub fn new(
        http_client: HttpClient,
        endpoint: String,
        model: ModelConfig,
        categories: Vec<String>,
    ) -> Self {
        Self {
            http_client,
            endpoint,
            model,
            categories,
        }
    }

    /// Send one chat request and return the content of the first choice.
    async fn send_chat(
        &self,
        key: &str,
        system_prompt: String,
        user_content: String,
    ) -> Result<String, CategorizeError> {
        let resp = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(key)
            .json(&json!(
              {
                "model": &self.model.id,
                "temperature": self.model.temperature,
                "messages": [
                  {
                    "role": "system",
                    "content": system_prompt
                  },
                  {
                    "role": "user",
                    "content": user_content
                  }
                ],
                "response_format": {
                    "type": "json_object",
                }
              }
            ))
            .send()
            .await
            .map_err(|e| CategorizeError::Other(format!("Request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| CategorizeError::Other(format!("Could not read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_http_error(status, &body));
        }

        let parsed = serde_json::from_str::<ChatApiResponseOrError>(&body)
            .map_err(|e| CategorizeError::Other(format!("Could not parse chat response: {e}")))?;

        let parsed = match parsed {
            ChatApiResponseOrError::Error(error) => return Err(classify_api_error(&error)),
            ChatApiResponseOrError::Response(parsed) => parsed,
        };

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CategorizeError::Other("No choices in response".to_string()))?;

        if choice
            .finish_reason
            .as_ref()
            .is_some_and(|reason| reason.is_safety_block())
        {
            return Err(CategorizeError::SafetyBlocked(format!(
                "SAFETY: response blocked with finish reason {:?}",
                choice.finish_reason
            )));
        }

        if let Some(usage) = parsed.usage {
            tracing::debug!("Chat completion used {} tokens", usage.total_tokens);
        }

        Ok(choice.message.content)
    }
}

impl Categorizer for MistralClient {
    async fn categorize_batch(
        &self,
        titles: &[String],
        key: &str,
    ) -> Result<Vec<TitleCategory>, CategorizeError> {
        let content = self
            .send_chat(
                key,
                batch_system_prompt(&self.categories),
                batch_user_prompt(titles),
            )
            .await?;

        parse_batch_answer(&content).ok_or_else(|| {
            CategorizeError::Other(format!("Could not parse JSON response: {}", content))
        })
    }

    async fn categorize_single(
        &self,
        title: &str,
        key: &str,
    ) -> Result<SingleCategory, CategorizeError> {
        let content = self
            .send_chat(
                key,
                single_system_prompt(&self.categories),
                single_user_prompt(title),
            )
            .await?;

        parse_single_answer(&content).ok_or_else(|| {
            CategorizeError::Other(format!("Could not parse JSON response: {}", content))
        })
    }
}

fn classify_http_error(status: StatusCode, body: &str) -> CategorizeError {
    let message = serde_json::from_str::<ChatApiError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.to_string());

    if status == StatusCode::TOO_MANY_REQUESTS {
        return CategorizeError::RateLimited(format!("HTTP 429: {message}"));
    }
    classify_message(format!("HTTP {}: {}", status.as_u16(), message))
}

fn classify_api_error(error: &ChatApiError) -> CategorizeError {
    if error.message == RATE_LIMIT_MESSAGE {
        return CategorizeError::RateLimited(error.message.clone());
    }
    classify_message(format!("Chat API error: {}", error.message))
}

/// `SAFETY` first, then any wording of a rate limit, then the shared policy.
fn classify_message(message: String) -> CategorizeError {
    if !message.contains("SAFETY") && message.to_lowercase().contains("rate limit") {
        return CategorizeError::RateLimited(message);
    }
    CategorizeError::from_message(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_429_is_rate_limited() {
        let err = classify_http_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"message": "Requests rate limit exceeded"}"#,
        );
        assert!(matches!(err, CategorizeError::RateLimited(_)));
    }

    #[test]
    fn test_http_error_with_safety_token() {
        let err = classify_http_error(StatusCode::BAD_REQUEST, "blocked: SAFETY");
        assert!(matches!(err, CategorizeError::SafetyBlocked(_)));
    }

    #[test]
    fn test_http_error_plain_body() {
        let err = classify_http_error(StatusCode::UNAUTHORIZED, "Unauthorized");
        assert_eq!(
            err,
            CategorizeError::Other("HTTP 401: Unauthorized".to_string())
        );
    }

    #[test]
    fn test_api_error_rate_limit_message() {
        let err = classify_api_error(&ChatApiError {
            message: RATE_LIMIT_MESSAGE.to_string(),
        });
        assert!(matches!(err, CategorizeError::RateLimited(_)));
    }

    #[test]
    fn test_api_error_rate_limit_wording() {
        let err = classify_api_error(&ChatApiError {
            message: "Rate limit exceeded for this key".to_string(),
        });
        assert_eq!(
            err,
            CategorizeError::RateLimited("Chat API error: Rate limit exceeded for this key".to_string())
        );
    }

    #[test]
    fn test_http_error_rate_limit_body() {
        let err = classify_http_error(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"message": "rate limit reached"}"#,
        );
        assert_eq!(
            err,
            CategorizeError::RateLimited("HTTP 503: rate limit reached".to_string())
        );
    }

    #[test]
    fn test_safety_wins_over_rate_limit_wording() {
        let err = classify_http_error(
            StatusCode::BAD_REQUEST,
            "SAFETY block, rate limit also close",
        );
        assert!(matches!(err, CategorizeError::SafetyBlocked(_)));
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn test_categorize_batch_live() {
        use crate::server_config::ServerConfig;

        dotenvy::dotenv().ok();
        let cfg = ServerConfig::load().unwrap();
        let key = cfg.api.keys.first().cloned().expect("LLM_API_KEYS must be set");
        let client = MistralClient::new(
            HttpClient::new(),
            cfg.api.endpoint.clone(),
            cfg.model.clone(),
            cfg.categories.clone(),
        );

        let titles = vec![
            "Deep Residual Learning for Image Recognition".to_string(),
            "The Byzantine Generals Problem".to_string(),
        ];
        let results = client.categorize_batch(&titles, &key).await.unwrap();

        assert!(!results.is_empty());
        assert!(results
            .iter()
            .all(|r| r.confidence >= 0.0 && r.confidence <= 1.0));
    }
}
