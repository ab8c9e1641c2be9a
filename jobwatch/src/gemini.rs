//! Gemini `generateContent` client used as the job [`Classifier`].
//!
//! Requests structured output (`application/json` with a response schema of
//! `[{ "job_id": string }]`) so the answer can be parsed without scraping prose.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use jobwatch_core::contract::{BoxError, Classifier};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error (HTTP {status}): {message}")]
    Api {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("response contained no text candidate")]
    EmptyResponse,

    #[error("could not parse model output: {0}")]
    Parse(String),
}

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, GeminiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(GeminiError::Client)?;
        let model = model.into();
        info!(model = %model, "Initialized Gemini client");
        Ok(Self {
            client,
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.into(),
            model,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Sends one prompt and returns the concatenated text of the first candidate.
    pub async fn generate(&self, prompt: &str) -> Result<String, GeminiError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GeminiError::Api {
                status,
                message: api_error_message(&text),
            });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| GeminiError::Parse(e.to_string()))?;
        candidate_text(parsed).ok_or(GeminiError::EmptyResponse)
    }
}

#[async_trait]
impl Classifier for GeminiClient {
    async fn select(&self, prompt: &str) -> Result<Vec<String>, BoxError> {
        let text = self.generate(prompt).await?;
        debug!(chars = text.len(), "Gemini answered");
        Ok(parse_selected_ids(&text)?)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

fn request_body(prompt: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "job_id": { "type": "STRING" }
                    },
                    "required": ["job_id"]
                }
            }
        }
    })
}

fn candidate_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Pulls `error.message` out of an API error body, falling back to the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Reads the model's JSON answer. Accepts `[{"job_id": ..}]` as well as bare
/// ids, and ids given as numbers; code fences around the JSON are ignored.
pub fn parse_selected_ids(text: &str) -> Result<Vec<String>, GeminiError> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    let value: Value =
        serde_json::from_str(unfenced.trim()).map_err(|e| GeminiError::Parse(e.to_string()))?;
    let items = value
        .as_array()
        .ok_or_else(|| GeminiError::Parse("expected a JSON array".to_string()))?;

    Ok(items
        .iter()
        .filter_map(|item| id_string(item.get("job_id").unwrap_or(item)))
        .collect())
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_asks_for_structured_json() {
        let body = request_body("pick some jobs");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "pick some jobs");
        let config = &body["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(config["responseSchema"]["type"], "ARRAY");
        assert_eq!(config["responseSchema"]["items"]["required"][0], "job_id");
    }

    #[test]
    fn endpoint_includes_model() {
        let client = GeminiClient::new("key", "gemini-2.5-pro")
            .unwrap()
            .with_base_url("http://localhost:8080/v1beta/");
        assert_eq!(
            client.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }

    #[test]
    fn joins_candidate_parts() {
        let raw = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "[{\"job_id\": "}, {"text": "\"7\"}]"}]},
                "finishReason": "STOP"
            }]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let text = candidate_text(parsed).unwrap();
        assert_eq!(parse_selected_ids(&text).unwrap(), vec!["7".to_string()]);
    }

    #[test]
    fn no_candidates_is_empty_response() {
        let parsed: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(candidate_text(parsed).is_none());
    }

    #[test]
    fn parses_ids_in_several_shapes() {
        let text = "```json\n[{\"job_id\": \"1\", \"title\": \"x\"}, {\"job_id\": 2}, \"3\", {\"title\": \"no id\"}]\n```";
        assert_eq!(parse_selected_ids(text).unwrap(), ["1", "2", "3"]);
        assert!(parse_selected_ids("[]").unwrap().is_empty());
    }

    #[test]
    fn rejects_non_array_output() {
        assert!(matches!(
            parse_selected_ids(r#"{"job_id": "1"}"#),
            Err(GeminiError::Parse(_))
        ));
        assert!(parse_selected_ids("Sure! Here are the jobs").is_err());
    }

    #[test]
    fn api_error_message_prefers_structured_message() {
        let body = r#"{"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(api_error_message(body), "Resource has been exhausted");
        assert_eq!(api_error_message("Bad Gateway\n"), "Bad Gateway");
    }

    mod over_http {
        use super::*;
        use crate::test_http::{serve, Request};

        const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-pro:generateContent";

        fn client(base_url: &str) -> GeminiClient {
            GeminiClient::new("secret-key", "gemini-2.5-pro")
                .unwrap()
                .with_base_url(format!("{base_url}/v1beta"))
        }

        #[tokio::test]
        async fn select_posts_prompt_with_api_key_header() {
            let (base_url, recorded) = serve(|req: &Request| {
                if req.method == "POST" && req.path == GENERATE_PATH {
                    (
                        200,
                        r#"{"candidates": [{"content": {"parts": [{"text": "[{\"job_id\": \"7\"}, {\"job_id\": \"9\"}]"}]}}]}"#
                            .to_string(),
                    )
                } else {
                    (404, String::new())
                }
            })
            .await;

            let ids = client(&base_url).select("pick jobs").await.unwrap();
            assert_eq!(ids, ["7", "9"]);

            let requests = recorded.lock().unwrap();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].header("x-goog-api-key"), Some("secret-key"));
            let body: Value = serde_json::from_str(&requests[0].body).unwrap();
            assert_eq!(body["contents"][0]["parts"][0]["text"], "pick jobs");
            assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        }

        #[tokio::test]
        async fn non_success_status_is_api_error() {
            let (base_url, _) = serve(|_: &Request| {
                (
                    429,
                    r#"{"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}}"#
                        .to_string(),
                )
            })
            .await;

            match client(&base_url).generate("pick jobs").await {
                Err(GeminiError::Api { status, message }) => {
                    assert_eq!(status, reqwest::StatusCode::TOO_MANY_REQUESTS);
                    assert_eq!(message, "Resource has been exhausted");
                }
                other => panic!("expected API error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn blocked_prompt_is_empty_response() {
            let (base_url, _) = serve(|_: &Request| {
                (200, r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#.to_string())
            })
            .await;

            assert!(matches!(
                client(&base_url).generate("pick jobs").await,
                Err(GeminiError::EmptyResponse)
            ));
        }
    }
}
