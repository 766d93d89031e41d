use crate::extract::{build_prompt, error_message, parse_response, Extractor, Provider};
use crate::model::Extraction;
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "google/gemma-3n-e2b-it:free";
const REFERER: &str = "https://github.com/mangos-app/mangos";
const TITLE: &str = "Mangos App";

/// Extracts expenses through the OpenRouter chat completions API with a bearer key.
#[derive(Debug, Clone)]
pub struct OpenRouterExtractor {
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl OpenRouterExtractor {
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

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.1,
            "top_p": 0.9,
        })
    }
}

#[async_trait::async_trait]
impl Extractor for OpenRouterExtractor {
    async fn process_text(&self, text: &str) -> Result<Extraction> {
        debug!("Sending text to OpenRouter model {}", self.model);
        let response = self
            .http
            .post(URL)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(&self.request_body(&build_prompt(text)))
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
        parse_response(Provider::OpenRouter, &content)
    }
}

fn provider_error(message: String) -> Error {
    Error::ProviderError {
        provider: Provider::OpenRouter.to_string(),
        message,
    }
}

#[derive(Debug, Default, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Default, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Default, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// The text at `choices[0].message.content`.
fn response_text(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::MalformedResponse(format!("unexpected OpenRouter response: {e}")))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::EmptyResponse(Provider::OpenRouter.to_string()))
}
