use std::fmt;
use std::path::Path;

use anyhow::Context;
use base64::Engine;
use tracing::{info, warn, Instrument};

use crate::gemini::{GeminiClient, GeminiError};
use crate::models::{Content, GenerateContentRequest, InlineData, Outcome, Part};

pub const INVALID_INPUT_SUMMARY: &str = "Invalid input";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Workflow {
  Math,
  Science,
  English,
  TestEvaluation,
}

/// Per-workflow table entry: what gets attached, how the task is phrased,
/// and which marker locates the one-line result.
pub struct WorkflowProfile {
  pub mime: Option<&'static str>,
  pub keyword: &'static str,
  pub instruction: &'static str,
}

const MATH: WorkflowProfile = WorkflowProfile {
  mime: Some("image/png"),
  keyword: "Final Answer",
  instruction: "Solve the math problem in the image step-by-step and also provide a final answer in the format: 'Final Answer: <result>'",
};

const SCIENCE: WorkflowProfile = WorkflowProfile {
  mime: Some("image/png"),
  keyword: "Final Answer",
  instruction: "Answer the following science question in detail. Then summarize the answer in one line starting with 'Final Answer:':\n",
};

const ENGLISH: WorkflowProfile = WorkflowProfile {
  mime: None,
  keyword: "Final Summary",
  instruction: "Check grammar, spelling, and suggest improvements for this essay. Provide detailed feedback and at the end, summarize it in one line starting with 'Final Summary:'.\n\n",
};

const TEST_EVALUATION: WorkflowProfile = WorkflowProfile {
  mime: Some("application/pdf"),
  keyword: "Final Score",
  instruction: "Evaluate the answers in this PDF and provide detailed feedback. At the end, give a one-line summary with final score starting with 'Final Score:'.",
};

impl Workflow {
  pub fn profile(self) -> &'static WorkflowProfile {
    match self {
      Workflow::Math => &MATH,
      Workflow::Science => &SCIENCE,
      Workflow::English => &ENGLISH,
      Workflow::TestEvaluation => &TEST_EVALUATION,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Workflow::Math => "math",
      Workflow::Science => "science",
      Workflow::English => "english",
      Workflow::TestEvaluation => "test_evaluation",
    }
  }
}

impl fmt::Display for Workflow {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Raw bytes of an uploaded image or PDF.
#[derive(Clone, Debug, Default)]
pub struct Attachment {
  bytes: Vec<u8>,
}

impl Attachment {
  pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
    Self { bytes: bytes.into() }
  }

  pub async fn from_path(path: &Path) -> anyhow::Result<Self> {
    let bytes = tokio::fs::read(path)
      .await
      .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Self { bytes })
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  fn encode(&self, mime: &str) -> Part {
    Part::InlineData {
      inline_data: InlineData {
        mime_type: mime.to_string(),
        data: base64::engine::general_purpose::STANDARD.encode(&self.bytes),
      },
    }
  }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InputError {
  #[error("Please upload {0} before submitting.")]
  MissingAttachment(&'static str),
  #[error("Please enter {0} before submitting.")]
  EmptyText(&'static str),
}

impl From<InputError> for Outcome {
  fn from(err: InputError) -> Self {
    Outcome::new(err.to_string(), INVALID_INPUT_SUMMARY)
  }
}

#[derive(Clone, Debug)]
pub enum WorkflowInput {
  Math { image: Option<Attachment> },
  Science { question: String, image: Option<Attachment> },
  English { essay: String },
  TestEvaluation { pdf: Option<Attachment> },
}

impl WorkflowInput {
  pub fn workflow(&self) -> Workflow {
    match self {
      WorkflowInput::Math { .. } => Workflow::Math,
      WorkflowInput::Science { .. } => Workflow::Science,
      WorkflowInput::English { .. } => Workflow::English,
      WorkflowInput::TestEvaluation { .. } => Workflow::TestEvaluation,
    }
  }

  /// Validates preconditions and builds the payload: attachments first, then one text part.
  pub fn into_request(self) -> Result<GenerateContentRequest, InputError> {
    let profile = self.workflow().profile();
    let (attachment, text) = match self {
      WorkflowInput::Math { image } => {
        let image = present(image).ok_or(InputError::MissingAttachment("an image of the math problem"))?;
        (Some(image), profile.instruction.to_string())
      }
      WorkflowInput::Science { question, image } => {
        if question.trim().is_empty() {
          return Err(InputError::EmptyText("a science question"));
        }
        (present(image), format!("{}{}", profile.instruction, question))
      }
      WorkflowInput::English { essay } => {
        if essay.trim().is_empty() {
          return Err(InputError::EmptyText("an essay"));
        }
        (None, format!("{}{}", profile.instruction, essay))
      }
      WorkflowInput::TestEvaluation { pdf } => {
        let pdf = present(pdf).ok_or(InputError::MissingAttachment("the answer sheet PDF"))?;
        (Some(pdf), profile.instruction.to_string())
      }
    };

    let mut parts = Vec::new();
    if let (Some(attachment), Some(mime)) = (attachment, profile.mime) {
      parts.push(attachment.encode(mime));
    }
    parts.push(Part::Text { text });

    Ok(GenerateContentRequest {
      contents: vec![Content { parts }],
    })
  }
}

fn present(attachment: Option<Attachment>) -> Option<Attachment> {
  attachment.filter(|a| !a.is_empty())
}

/// One workflow run: credential check, validation, a single upstream call, summary extraction.
/// Rejected input comes back as `Err` so callers can tell it apart from any model reply.
pub async fn execute(client: &GeminiClient, input: WorkflowInput) -> Result<Outcome, InputError> {
  let workflow = input.workflow();
  let span = tracing::info_span!("workflow", id = %uuid::Uuid::new_v4(), kind = %workflow);

  async move {
    if !client.has_api_key() {
      warn!("GEMINI_API_KEY is not set; skipping request");
      return Ok(Outcome::from(GeminiError::MissingApiKey));
    }

    let request = input.into_request().map_err(|err| {
      warn!(error = %err, "rejected workflow input");
      err
    })?;

    let outcome = client.invoke(&request, workflow.profile().keyword).await;
    info!(summary = %outcome.summary, "workflow finished");
    Ok(outcome)
  }
  .instrument(span)
  .await
}

/// Like `execute`, with rejected input folded into an `"Invalid input"` outcome.
pub async fn run(client: &GeminiClient, input: WorkflowInput) -> Outcome {
  execute(client, input).await.unwrap_or_else(Outcome::from)
}
