//! Turns free text into expense entries by asking a language model.
//!
//! Both providers send the same prompt and must answer with a JSON object shaped like
//! `{"entries": [{"name": "...", "amount": "$..."}], "confidence": 0.9}`. Models like to wrap that
//! object in code fences or chatter around it, so `parse_response` only trusts what lies between
//! the first `{` and the last `}`.

mod gemini;
mod openrouter;

use crate::model::Extraction;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use gemini::GeminiExtractor;
pub use openrouter::OpenRouterExtractor;

/// Something that can turn free text into an `Extraction`. One attempt per call.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    async fn process_text(&self, text: &str) -> Result<Extraction>;
}

/// The language-model backends that are supported.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Gemini,
    #[serde(rename = "openrouter")]
    OpenRouter,
}

serde_plain::derive_display_from_serialize!(Provider);
serde_plain::derive_fromstr_from_deserialize!(Provider);

impl Provider {
    /// Creates the extractor for this provider. `model` overrides the provider's default model.
    pub fn extractor(self, api_key: &str, model: Option<&str>) -> Box<dyn Extractor> {
        match self {
            Provider::Gemini => {
                let e = GeminiExtractor::new(api_key);
                Box::new(match model {
                    Some(m) => e.with_model(m),
                    None => e,
                })
            }
            Provider::OpenRouter => {
                let e = OpenRouterExtractor::new(api_key);
                Box::new(match model {
                    Some(m) => e.with_model(m),
                    None => e,
                })
            }
        }
    }
}

/// Builds the instruction sent to every provider.
pub(crate) fn build_prompt(text: &str) -> String {
    format!(
        r#"You are a financial assistant. Extract the expenses mentioned by the user.

RULES:
1. Extract only the concept (name) and the total amount, including the $ symbol.
2. Always answer with a JSON object with the structure below.
3. If there is no clear amount, estimate it or use 0 and lower the confidence.
4. Answer in Spanish.

Input: "{text}"

JSON structure:
{{
    "entries": [
        {{ "name": "Expense name", "amount": "$ positive number" }}
    ],
    "confidence": number between 0 and 1
}}

Do not write anything outside of the JSON. List every expense in "entries"."#
    )
}

/// Parses model output into an `Extraction`.
///
/// Surrounding whitespace and a code fence (with or without a language tag) are removed, then the
/// text from the first `{` to the last `}` is parsed.
///
/// # Errors
/// - `Error::EmptyResponse` if `content` is blank
/// - `Error::MalformedResponse` if there is no object or it is not valid JSON
pub fn parse_response(provider: Provider, content: &str) -> Result<Extraction> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyResponse(provider.to_string()));
    }
    let unfenced = strip_fence(trimmed);
    let object = json_object(unfenced).ok_or_else(|| {
        Error::MalformedResponse(format!("no JSON object found in the {provider} response"))
    })?;
    let extraction: Extraction = serde_json::from_str(object).map_err(|e| {
        Error::MalformedResponse(format!("unable to parse the {provider} response: {e}"))
    })?;
    debug!(
        "{provider} extracted {} entries with confidence {}",
        extraction.entries.len(),
        extraction.confidence
    );
    Ok(extraction)
}

/// Removes an opening code fence line, with or without a language tag, and the closing fence.
fn strip_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Drop the language tag, if any, up to the end of the first line
    let rest = match rest.find('\n') {
        Some(nl) if rest[..nl].chars().all(|c| c.is_ascii_alphanumeric()) => &rest[nl + 1..],
        _ => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

/// Pulls the upstream error message out of a failed response body, falling back to the raw body.
pub(crate) fn error_message(body: &str) -> String {
    let value = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(v) => v,
        Err(_) => return body.trim().to_string(),
    };
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .map(String::from)
        .unwrap_or_else(|| body.trim().to_string())
}
