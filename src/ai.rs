//! Generative model collaborators used for fact checking and summaries.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AiConfig;
use crate::error::{Error, Result};

/// Condenses the contents of several articles into one text.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    /// Fails with [`Error::EmptyInput`] when `contents` is empty.
    async fn summarize(&self, contents: &[String]) -> Result<String>;
}

/// Produces a fact-check report for a piece of text.
#[async_trait::async_trait]
pub trait FactChecker: Send + Sync {
    async fn fact_check(&self, content: &str) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

impl Content {
    fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Serialize)]
struct Tool {
    #[serde(rename = "googleSearchRetrieval")]
    google_search_retrieval: GoogleSearchRetrieval,
}

#[derive(Serialize)]
struct GoogleSearchRetrieval {
    #[serde(rename = "dynamicRetrievalConfig")]
    dynamic_retrieval_config: DynamicRetrievalConfig,
}

#[derive(Serialize)]
struct DynamicRetrievalConfig {
    mode: &'static str,
    #[serde(rename = "dynamicThreshold")]
    dynamic_threshold: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Client for the Gemini `generateContent` endpoint
pub struct GeminiClient {
    client: Client,
    config: AiConfig,
}

impl GeminiClient {
    pub fn new(config: AiConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Returns the concatenated text of the first candidate.
    async fn generate(&self, request: &GenerateRequest) -> std::result::Result<String, String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.config.api_key.as_str())
            .json(request)
            .send()
            .await
            .map_err(|e| format!("Gemini API request failed: {}", e.without_url()))?;

        let status = response.status();
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| {
                format!("Failed to parse Gemini response ({}): {}", status, e.without_url())
            })?;

        if let Some(error) = body.error {
            return Err(format!("Gemini API error: {}", error.message));
        }
        if !status.is_success() {
            return Err(format!("Gemini API returned {}", status));
        }

        let text: String = body
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err("Gemini returned no text".to_string());
        }

        debug!("Gemini returned {} chars", text.len());
        Ok(text)
    }
}

#[async_trait::async_trait]
impl Summarizer for GeminiClient {
    async fn summarize(&self, contents: &[String]) -> Result<String> {
        if contents.is_empty() {
            return Err(Error::EmptyInput);
        }

        let combined = contents
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n");

        let request = GenerateRequest {
            system_instruction: Content::text(&self.config.summarizer_prompt),
            contents: vec![Content::text(combined)],
            tools: Vec::new(),
        };

        self.generate(&request)
            .await
            .map_err(Error::SummarizationUnavailable)
    }
}

#[async_trait::async_trait]
impl FactChecker for GeminiClient {
    async fn fact_check(&self, content: &str) -> Result<String> {
        let request = GenerateRequest {
            system_instruction: Content::text(&self.config.fact_checker_prompt),
            contents: vec![Content::text(content)],
            tools: vec![Tool {
                google_search_retrieval: GoogleSearchRetrieval {
                    dynamic_retrieval_config: DynamicRetrievalConfig {
                        mode: "MODE_DYNAMIC",
                        dynamic_threshold: self.config.search_threshold,
                    },
                },
            }],
        };

        self.generate(&request)
            .await
            .map_err(Error::FactCheckUnavailable)
    }
}
