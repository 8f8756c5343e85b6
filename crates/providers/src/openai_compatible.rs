use crate::traits::*;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Pulls the assistant text out of a chat-completions response body.
pub fn response_content(body: &serde_json::Value) -> Result<String, ProviderError> {
    let choice = body["choices"]
        .get(0)
        .ok_or_else(|| ProviderError::Parse("No choices in response".to_string()))?;

    choice["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ProviderError::Parse("Response message has no content".to_string()))
}

#[async_trait]
impl ChatProvider for OpenAICompatibleProvider {
    async fn complete(&self, messages: &[Message]) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.0,
        });

        let mut request = self.client.post(&url).json(&body);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{}: {}", status, text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        response_content(&json)
    }

    fn name(&self) -> &str {
        "OpenAI Compatible"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_response_content() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"steps\": []}"}}]
        });
        assert_eq!(response_content(&body).unwrap(), "{\"steps\": []}");
    }

    #[test]
    fn test_response_without_choices() {
        let err = response_content(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let provider = OpenAICompatibleProvider::new(
            "http://localhost:8080/v1/".to_string(),
            None,
            "local".to_string(),
        );
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
        assert_eq!(provider.model(), "local");
    }
}
