use serde::{Deserialize, Serialize};

use crate::ui;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct InlineData {
  pub mime_type: String,
  pub data: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Part {
  InlineData { inline_data: InlineData },
  Text { text: String },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Content {
  pub parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GenerateContentRequest {
  pub contents: Vec<Content>,
}

impl GenerateContentRequest {
  /// Parts of the single content entry.
  pub fn parts(&self) -> &[Part] {
    self.contents.first().map(|c| c.parts.as_slice()).unwrap_or_default()
  }
}

// Response side: every level is optional so a short body maps to a precise ParseError.

#[derive(Deserialize, Default, Debug)]
pub struct GenerateContentResponse {
  #[serde(default)]
  pub candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
pub struct Candidate {
  pub content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
pub struct CandidateContent {
  pub parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize, Debug)]
pub struct ResponsePart {
  pub text: Option<String>,
}

/// What every workflow run hands back to the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
  pub detailed: String,
  pub summary: String,
}

impl Outcome {
  pub fn new(detailed: impl Into<String>, summary: impl Into<String>) -> Self {
    Self {
      detailed: detailed.into(),
      summary: summary.into(),
    }
  }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct OutcomeResponse {
  pub detailed: String,
  pub summary: String,
  pub summary_html: String,
}

impl From<Outcome> for OutcomeResponse {
  fn from(outcome: Outcome) -> Self {
    let summary_html = ui::summary_html(&outcome.summary);
    Self {
      detailed: outcome.detailed,
      summary: outcome.summary,
      summary_html,
    }
  }
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
  pub status: String,
  pub version: String,
  pub started_at: String,
  pub uptime_ms: u128,
  pub api_key_configured: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parts_serialize_in_wire_shape() {
    let request = GenerateContentRequest {
      contents: vec![Content {
        parts: vec![
          Part::InlineData {
            inline_data: InlineData {
              mime_type: "image/png".to_string(),
              data: "aGk=".to_string(),
            },
          },
          Part::Text {
            text: "solve".to_string(),
          },
        ],
      }],
    };

    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(
      value,
      serde_json::json!({
        "contents": [{
          "parts": [
            { "inline_data": { "mime_type": "image/png", "data": "aGk=" } },
            { "text": "solve" }
          ]
        }]
      })
    );
  }

  #[test]
  fn empty_response_body_has_no_candidates() {
    let response: GenerateContentResponse = serde_json::from_str("{}").unwrap();
    assert!(response.candidates.is_empty());
  }

  #[test]
  fn outcome_response_escapes_summary_html() {
    let response = OutcomeResponse::from(Outcome::new("full", "Final Answer: x < 3"));
    assert_eq!(response.summary, "Final Answer: x < 3");
    assert_eq!(
      response.summary_html,
      "<div class='one-liner-box'>Final Answer: x &lt; 3</div>"
    );
  }
}
