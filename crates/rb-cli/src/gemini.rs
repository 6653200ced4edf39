//! Gemini keyword suggester
//!
//! Calls the `generateContent` REST endpoint with a JSON response schema
//! (an array of strings) and hands the returned text to the core parser.

use std::env;

use rb_core::suggest::{parse_suggestions, suggestion_prompt, KeywordSuggester, SuggestError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl GeminiConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let api_key = env::var("API_KEY").map_err(|_| "API_KEY environment variable not set")?;
        if api_key.trim().is_empty() {
            return Err("API_KEY is empty".to_string());
        }

        Ok(Self {
            api_key,
            base_url: env::var("GEMINI_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| content.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }
}

pub struct GeminiSuggester {
    client: Client,
    config: GeminiConfig,
}

impl GeminiSuggester {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn request_body(base: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: suggestion_prompt(base),
                }],
            }],
            generation_config: json!({
                "responseMimeType": "application/json",
                "responseSchema": { "type": "ARRAY", "items": { "type": "STRING" } }
            }),
        }
    }
}

impl KeywordSuggester for GeminiSuggester {
    async fn suggest(&self, base: &str) -> Result<Vec<String>, SuggestError> {
        log::debug!("Requesting suggestions for '{}' from {}", base, self.config.model);

        let response = self
            .client
            .post(self.config.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&Self::request_body(base))
            .send()
            .await
            .map_err(|e| SuggestError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SuggestError::Request(format!("HTTP {}: {}", status, body)));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SuggestError::Malformed(e.to_string()))?;

        parse_suggestions(&body.text())
    }
}
