use crate::extract::{build_prompt, error_message, parse_response, Extractor, Provider};
use crate::model::Extraction;
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

/// Extracts expenses with the Gemini `generateContent` API. The key travels as a query parameter.
#[derive(Debug, Clone)]
pub struct GeminiExtractor {
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl GeminiExtractor {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn url(&self) -> String {
        format!("{BASE_URL}/{}:generateContent", self.model)
    }
}

#[async_trait::async_trait]
impl Extractor for GeminiExtractor {
    async fn process_text(&self, text: &str) -> Result<Extraction> {
        debug!("Sending text to Gemini model {}", self.model);
        let response = self
            .http
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body(&build_prompt(text)))
            .send()
            .await
            .map_err(|e| provider_error(format!("{e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| provider_error(format!("Unable to read the response: {e}")))?;
        if !status.is_success() {
            return Err(provider_error(format!(
                "{status}: {}",
                error_message(&body)
            )));
        }

        let content = response_text(&body)?;
        parse_response(Provider::Gemini, &content)
    }
}

fn provider_error(message: String) -> Error {
    Error::ProviderError {
        provider: Provider::Gemini.to_string(),
        message,
    }
}

fn request_body(prompt: &str) -> serde_json::Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "temperature": 0.3,
            "topP": 0.8,
            "topK": 40,
        }
    })
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// The text at `candidates[0].content.parts[0].text`.
fn response_text(body: &str) -> Result<String> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| Error::MalformedResponse(format!("unexpected Gemini response: {e}")))?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::EmptyResponse(Provider::Gemini.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExpenseEntry;

    #[test]
    fn test_url_uses_model() {
        let e = GeminiExtractor::new("key").with_model("gemini-2.5-pro");
        assert_eq!(
            e.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:generateContent"
        );
        assert!(GeminiExtractor::new("key").url().contains(DEFAULT_MODEL));
    }

    #[test]
    fn test_request_body() {
        let body = request_body("hola");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hola");
        assert_eq!(body["generationConfig"]["topK"], 40);
    }

    #[test]
    fn test_response_text_to_extraction() {
        let body = r#"{
            "candidates": [{
                "content": {
                    "parts": [{ "text": "```json\n{\"entries\":[{\"name\":\"Pan\",\"amount\":\"$2.000\"}],\"confidence\":0.95}\n```" }],
                    "role": "model"
                },
                "finishReason": "STOP"
            }]
        }"#;
        let text = response_text(body).unwrap();
        let x = parse_response(Provider::Gemini, &text).unwrap();
        assert_eq!(x.entries, vec![ExpenseEntry::new("Pan", "$2.000")]);
    }

    #[test]
    fn test_response_without_candidates_is_empty() {
        assert!(matches!(
            response_text(r#"{"candidates":[]}"#),
            Err(Error::EmptyResponse(_))
        ));
        assert!(matches!(
            response_text(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#),
            Err(Error::EmptyResponse(_))
        ));
        assert!(matches!(
            response_text(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#),
            Err(Error::EmptyResponse(_))
        ));
    }

    #[test]
    fn test_response_not_json() {
        assert!(matches!(
            response_text("<html>oops</html>"),
            Err(Error::MalformedResponse(_))
        ));
    }
}
