use std::sync::Arc;
use std::time::Instant;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::gemini::GeminiClient;
use crate::models::{HealthResponse, Outcome, OutcomeResponse};
use crate::workflow::{self, Attachment, Workflow, WorkflowInput};

type MultipartForm = Result<Multipart, MultipartRejection>;

pub struct RouterState {
  pub started_at: Instant,
  pub started_at_utc: DateTime<Utc>,
  pub gemini: Arc<GeminiClient>,
  pub page: String,
  pub permits: Semaphore,
}

impl RouterState {
  pub fn new(gemini: Arc<GeminiClient>, page: String, max_concurrent_requests: usize) -> Self {
    Self {
      started_at: Instant::now(),
      started_at_utc: Utc::now(),
      gemini,
      page,
      permits: Semaphore::new(max_concurrent_requests.max(1)),
    }
  }
}

pub fn build_router(state: RouterState, max_upload_bytes: usize) -> Router {
  Router::new()
    .route("/", get(index))
    .route("/health", get(health))
    .route("/api/math", post(math))
    .route("/api/science", post(science))
    .route("/api/english", post(english))
    .route("/api/evaluate", post(evaluate))
    .layer(DefaultBodyLimit::max(max_upload_bytes))
    .layer(TraceLayer::new_for_http())
    .with_state(Arc::new(state))
}

pub async fn run_router(listener: TcpListener, state: RouterState, max_upload_bytes: usize) -> anyhow::Result<()> {
  info!(addr = %listener.local_addr()?, "CurricuLens listening");
  axum::serve(listener, build_router(state, max_upload_bytes)).await?;
  Ok(())
}

async fn index(State(state): State<Arc<RouterState>>) -> Html<String> {
  Html(state.page.clone())
}

async fn health(State(state): State<Arc<RouterState>>) -> Json<HealthResponse> {
  Json(HealthResponse {
    status: "ok".to_string(),
    version: env!("CARGO_PKG_VERSION").to_string(),
    started_at: state.started_at_utc.to_rfc3339(),
    uptime_ms: state.started_at.elapsed().as_millis(),
    api_key_configured: state.gemini.has_api_key(),
  })
}

async fn math(State(state): State<Arc<RouterState>>, multipart: MultipartForm) -> Response {
  match FormFields::read(multipart).await {
    Ok(mut form) => dispatch(&state, WorkflowInput::Math { image: form.file("image") }).await,
    Err(resp) => resp,
  }
}

async fn science(State(state): State<Arc<RouterState>>, multipart: MultipartForm) -> Response {
  match FormFields::read(multipart).await {
    Ok(mut form) => {
      let input = WorkflowInput::Science {
        question: form.text("question"),
        image: form.file("image"),
      };
      dispatch(&state, input).await
    }
    Err(resp) => resp,
  }
}

async fn english(State(state): State<Arc<RouterState>>, multipart: MultipartForm) -> Response {
  match FormFields::read(multipart).await {
    Ok(mut form) => dispatch(&state, WorkflowInput::English { essay: form.text("essay") }).await,
    Err(resp) => resp,
  }
}

async fn evaluate(State(state): State<Arc<RouterState>>, multipart: MultipartForm) -> Response {
  match FormFields::read(multipart).await {
    Ok(mut form) => dispatch(&state, WorkflowInput::TestEvaluation { pdf: form.file("pdf") }).await,
    Err(resp) => resp,
  }
}

async fn dispatch(state: &RouterState, input: WorkflowInput) -> Response {
  let kind: Workflow = input.workflow();
  let _permit = match state.permits.acquire().await {
    Ok(permit) => permit,
    Err(_) => return error_response(StatusCode::SERVICE_UNAVAILABLE, "shutting_down", "Server is shutting down."),
  };

  let (status, outcome) = match workflow::execute(&state.gemini, input).await {
    Ok(outcome) => (StatusCode::OK, outcome),
    Err(err) => (StatusCode::UNPROCESSABLE_ENTITY, Outcome::from(err)),
  };
  info!(workflow = %kind, status = status.as_u16(), "workflow response");
  (status, Json(OutcomeResponse::from(outcome))).into_response()
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
  let body = Json(serde_json::json!({ "error": message, "code": code }));
  (status, body).into_response()
}

/// Multipart fields collected by name. Later fields with the same name replace earlier ones.
#[derive(Default)]
struct FormFields {
  fields: Vec<(String, Vec<u8>)>,
}

impl FormFields {
  async fn read(multipart: MultipartForm) -> Result<Self, Response> {
    let mut multipart = multipart.map_err(|rejection| {
      warn!(error = %rejection, "request is not a multipart form");
      error_response(rejection.status(), "invalid_form", &rejection.body_text())
    })?;
    let mut form = FormFields::default();
    loop {
      let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => break,
        Err(err) => {
          warn!(error = %err, "unreadable multipart body");
          return Err(error_response(err.status(), "invalid_form", &err.body_text()));
        }
      };
      let name = field.name().unwrap_or_default().to_string();
      let bytes = match field.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
          warn!(field = %name, error = %err, "unreadable multipart field");
          return Err(error_response(err.status(), "invalid_form", &err.body_text()));
        }
      };
      form.fields.retain(|(existing, _)| existing != &name);
      form.fields.push((name, bytes.to_vec()));
    }
    Ok(form)
  }

  fn take(&mut self, name: &str) -> Option<Vec<u8>> {
    let idx = self.fields.iter().position(|(n, _)| n == name)?;
    Some(self.fields.swap_remove(idx).1)
  }

  /// Browsers send an empty part for an untouched file input; that counts as absent.
  fn file(&mut self, name: &str) -> Option<Attachment> {
    self.take(name).filter(|b| !b.is_empty()).map(Attachment::from_bytes)
  }

  fn text(&mut self, name: &str) -> String {
    self
      .take(name)
      .map(|b| String::from_utf8_lossy(&b).into_owned())
      .unwrap_or_default()
  }
}
