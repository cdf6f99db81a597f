use reqwest::header::{HeaderValue, CONTENT_TYPE};
use tracing::{debug, warn};

use crate::models::{GenerateContentRequest, GenerateContentResponse, Outcome};
use crate::summary::extract_summary;

pub const MISSING_KEY_MESSAGE: &str = "API Key missing.";
pub const PARSE_FAILED_MESSAGE: &str = "Failed to parse Gemini response.";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
  #[error("response body is not the expected JSON: {0}")]
  InvalidJson(#[from] serde_json::Error),
  #[error("response has no candidates")]
  NoCandidates,
  #[error("first candidate has no content")]
  NoContent,
  #[error("candidate content has no parts")]
  NoParts,
  #[error("first part has no text")]
  NoText,
}

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
  #[error("API key is not configured")]
  MissingApiKey,
  #[error("upstream returned {status}")]
  Status { status: u16, body: String },
  /// Always built through `GeminiError::transport` so the URL (and its `key=` query) is stripped.
  #[error("{0}")]
  Transport(reqwest::Error),
  #[error(transparent)]
  Parse(#[from] ParseError),
}

impl GeminiError {
  fn transport(err: reqwest::Error) -> Self {
    GeminiError::Transport(err.without_url())
  }
}

impl From<GeminiError> for Outcome {
  fn from(err: GeminiError) -> Self {
    match err {
      GeminiError::MissingApiKey => Outcome::new(MISSING_KEY_MESSAGE, MISSING_KEY_MESSAGE),
      GeminiError::Status { status, body } => Outcome::new(format!("Error: {status} - {body}"), "Error"),
      GeminiError::Transport(err) => Outcome::new(format!("Error: {err}"), "Error"),
      GeminiError::Parse(_) => Outcome::new(PARSE_FAILED_MESSAGE, "Failed"),
    }
  }
}

/// Client for the `generateContent` endpoint. Built once at startup and shared read-only.
pub struct GeminiClient {
  http: reqwest::Client,
  endpoint: String,
  api_key: Option<String>,
}

impl GeminiClient {
  pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
    let api_key = api_key.filter(|k| !k.trim().is_empty());
    Self {
      http: reqwest::Client::new(),
      endpoint: endpoint.into(),
      api_key,
    }
  }

  pub fn has_api_key(&self) -> bool {
    self.api_key.is_some()
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  /// Sends one request and returns the first text part of the first candidate.
  pub async fn generate(&self, request: &GenerateContentRequest) -> Result<String, GeminiError> {
    let key = self.api_key.as_deref().ok_or(GeminiError::MissingApiKey)?;

    debug!(endpoint = %self.endpoint, parts = request.parts().len(), "sending generateContent request");
    let resp = self
      .http
      .post(&self.endpoint)
      .query(&[("key", key)])
      .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
      .json(request)
      .send()
      .await
      .map_err(|err| {
        let err = GeminiError::transport(err);
        warn!(error = %err, "generateContent request failed");
        err
      })?;

    let status = resp.status();
    let body = resp.text().await.map_err(GeminiError::transport)?;
    if !status.is_success() {
      warn!(status = status.as_u16(), "generateContent returned an error status");
      return Err(GeminiError::Status {
        status: status.as_u16(),
        body,
      });
    }

    first_text(&body).map_err(|err| {
      warn!(error = %err, "could not read generateContent response");
      GeminiError::Parse(err)
    })
  }

  /// Runs `request` and pairs the detailed text with its summary line.
  /// Every failure is folded into the sentinel outcomes.
  pub async fn invoke(&self, request: &GenerateContentRequest, keyword: &str) -> Outcome {
    match self.generate(request).await {
      Ok(text) => {
        let summary = extract_summary(&text, keyword);
        Outcome::new(text, summary)
      }
      Err(err) => err.into(),
    }
  }
}

fn first_text(body: &str) -> Result<String, ParseError> {
  let response: GenerateContentResponse = serde_json::from_str(body)?;
  let candidate = response.candidates.into_iter().next().ok_or(ParseError::NoCandidates)?;
  let content = candidate.content.ok_or(ParseError::NoContent)?;
  let part = content
    .parts
    .and_then(|parts| parts.into_iter().next())
    .ok_or(ParseError::NoParts)?;
  part.text.ok_or(ParseError::NoText)
}

#[cfg(test)]
pub(crate) mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  use axum::extract::{Query, State};
  use axum::http::StatusCode;
  use axum::routing::post;
  use axum::{Json, Router};

  use super::*;
  use crate::models::{Content, Part};

  #[derive(Clone)]
  pub(crate) struct MockUpstream {
    pub status: StatusCode,
    pub body: &'static str,
    pub hits: Arc<AtomicUsize>,
    pub last_key: Arc<std::sync::Mutex<Option<String>>>,
    pub last_body: Arc<std::sync::Mutex<Option<serde_json::Value>>>,
  }

  impl MockUpstream {
    pub fn new(status: StatusCode, body: &'static str) -> Self {
      Self {
        status,
        body,
        hits: Arc::new(AtomicUsize::new(0)),
        last_key: Arc::new(std::sync::Mutex::new(None)),
        last_body: Arc::new(std::sync::Mutex::new(None)),
      }
    }

    pub fn hits(&self) -> usize {
      self.hits.load(Ordering::SeqCst)
    }
  }

  async fn mock_generate(
    State(mock): State<MockUpstream>,
    Query(params): Query<std::collections::HashMap<String, String>>,
    Json(body): Json<serde_json::Value>,
  ) -> (StatusCode, &'static str) {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    *mock.last_key.lock().unwrap() = params.get("key").cloned();
    *mock.last_body.lock().unwrap() = Some(body);
    (mock.status, mock.body)
  }

  /// Serves `mock` on an ephemeral port and returns the endpoint URL.
  pub(crate) async fn spawn_upstream(mock: MockUpstream) -> String {
    let app = Router::new()
      .route("/v1/models/test:generateContent", post(mock_generate))
      .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1/models/test:generateContent")
  }

  fn text_request() -> GenerateContentRequest {
    GenerateContentRequest {
      contents: vec![Content {
        parts: vec![Part::Text {
          text: "hello".to_string(),
        }],
      }],
    }
  }

  #[test]
  fn blank_key_counts_as_missing() {
    let client = GeminiClient::new("http://unused", Some("   ".to_string()));
    assert!(!client.has_api_key());
  }

  #[test]
  fn first_text_reports_each_missing_level() {
    assert!(matches!(first_text("not json"), Err(ParseError::InvalidJson(_))));
    assert!(matches!(first_text(r#"{"candidates":"nope"}"#), Err(ParseError::InvalidJson(_))));
    assert!(matches!(first_text("{}"), Err(ParseError::NoCandidates)));
    assert!(matches!(first_text(r#"{"candidates":[]}"#), Err(ParseError::NoCandidates)));
    assert!(matches!(first_text(r#"{"candidates":[{}]}"#), Err(ParseError::NoContent)));
    assert!(matches!(first_text(r#"{"candidates":[{"content":{}}]}"#), Err(ParseError::NoParts)));
    assert!(matches!(
      first_text(r#"{"candidates":[{"content":{"parts":[]}}]}"#),
      Err(ParseError::NoParts)
    ));
    assert!(matches!(
      first_text(r#"{"candidates":[{"content":{"parts":[{"inline_data":{}}]}}]}"#),
      Err(ParseError::NoText)
    ));
    assert_eq!(
      first_text(r#"{"candidates":[{"content":{"parts":[{"text":"hi"}]}}]}"#).unwrap(),
      "hi"
    );
  }

  #[tokio::test]
  async fn missing_key_short_circuits_without_network() {
    let mock = MockUpstream::new(StatusCode::OK, "{}");
    let endpoint = spawn_upstream(mock.clone()).await;
    let client = GeminiClient::new(endpoint, None);

    let outcome = client.invoke(&text_request(), "Final Answer").await;
    assert_eq!(outcome, Outcome::new("API Key missing.", "API Key missing."));
    assert_eq!(mock.hits(), 0);
  }

  #[tokio::test]
  async fn passes_key_as_query_and_payload_as_json() {
    let mock = MockUpstream::new(
      StatusCode::OK,
      r#"{"candidates":[{"content":{"parts":[{"text":"Answer\nFinal Answer: 1"}]}}]}"#,
    );
    let endpoint = spawn_upstream(mock.clone()).await;
    let client = GeminiClient::new(endpoint, Some("secret".to_string()));

    let outcome = client.invoke(&text_request(), "Final Answer").await;
    assert_eq!(outcome, Outcome::new("Answer\nFinal Answer: 1", "Final Answer: 1"));
    assert_eq!(mock.hits(), 1);
    assert_eq!(mock.last_key.lock().unwrap().as_deref(), Some("secret"));
    assert_eq!(
      mock.last_body.lock().unwrap().clone().unwrap(),
      serde_json::json!({ "contents": [{ "parts": [{ "text": "hello" }] }] })
    );
  }

  #[tokio::test]
  async fn error_status_embeds_code_and_raw_body() {
    let mock = MockUpstream::new(StatusCode::BAD_REQUEST, r#"{"error":{"message":"bad key"}}"#);
    let endpoint = spawn_upstream(mock).await;
    let client = GeminiClient::new(endpoint, Some("k".to_string()));

    let outcome = client.invoke(&text_request(), "Final Answer").await;
    assert_eq!(outcome.detailed, r#"Error: 400 - {"error":{"message":"bad key"}}"#);
    assert_eq!(outcome.summary, "Error");
  }

  #[tokio::test]
  async fn empty_object_is_a_parse_failure() {
    let endpoint = spawn_upstream(MockUpstream::new(StatusCode::OK, "{}")).await;
    let client = GeminiClient::new(endpoint, Some("k".to_string()));

    let outcome = client.invoke(&text_request(), "Final Answer").await;
    assert_eq!(outcome, Outcome::new("Failed to parse Gemini response.", "Failed"));
  }

  #[tokio::test]
  async fn missing_parts_is_a_parse_failure() {
    let endpoint = spawn_upstream(MockUpstream::new(StatusCode::OK, r#"{"candidates":[{"content":{}}]}"#)).await;
    let client = GeminiClient::new(endpoint, Some("k".to_string()));

    let err = client.generate(&text_request()).await.unwrap_err();
    assert!(matches!(err, GeminiError::Parse(ParseError::NoParts)));
  }

  #[tokio::test]
  async fn unreachable_endpoint_is_reported_as_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = GeminiClient::new(format!("http://{addr}/generate"), Some("SUPERSECRET".to_string()));

    let outcome = client.invoke(&text_request(), "Final Answer").await;
    assert!(outcome.detailed.starts_with("Error: "));
    assert_eq!(outcome.summary, "Error");
  }

  #[tokio::test]
  async fn transport_error_does_not_echo_the_key() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = GeminiClient::new(format!("http://{addr}/generate"), Some("SUPERSECRET".to_string()));

    let err = client.generate(&text_request()).await.unwrap_err();
    assert!(matches!(err, GeminiError::Transport(_)));
    assert!(!err.to_string().contains("SUPERSECRET"));

    let outcome = client.invoke(&text_request(), "Final Answer").await;
    assert!(!outcome.detailed.contains("SUPERSECRET"), "{}", outcome.detailed);
    assert!(!outcome.detailed.contains("key="), "{}", outcome.detailed);
  }
}
