//! HTTP surface for docsift.
//!
//! The router exposes:
//!
//! - `POST /process` – JSON body with exactly one of `file_url` or `file_base64` (alias
//!   `filedata`), plus optional `filename`, `format`, `reduce_tokens`, `include_images`.
//! - `POST /process/upload` – multipart form with a `file` part and optional text parts
//!   `format`, `reduce_tokens`, `include_images`.
//! - `POST /process_{pdf,docx}_{url,base64}` – legacy routes whose format is fixed by the path.
//! - `POST /process_pdf` – oldest variant: `pdf_url` in, `extracted_text` plus counts out.
//! - `GET /metrics` – processing counters.
//! - `GET /commands` – machine-readable command catalog for quick discovery by tools/hosts.
//! - `GET /health` – liveness probe; the only route that does not require an `API-Key` header.
//!
//! Every failure is returned as `{"error": "<message>"}`.

use crate::config::ApiKeys;
use crate::metrics::MetricsSnapshot;
use crate::processing::{
    DocumentFormat, DocumentSource, LinguisticAnalyzer, PipelineError, ProcessOptions,
    ProcessRequest, ProcessingApi, ProcessingOutcome, UnicodeAnalyzer,
};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Request, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Header carrying the client API key.
pub const API_KEY_HEADER: &str = "api-key";

const UNAUTHORIZED_MESSAGE: &str = "Invalid or missing API key";
const INTERNAL_MESSAGE: &str = "Internal processing error";

/// Largest request body accepted by the transport for a given payload ceiling.
///
/// Base64 inflates by 4/3; the extra 64 KiB leaves room for JSON or multipart framing so a
/// payload exactly at the ceiling still reaches the normalizer.
pub fn transport_limit(max_payload_bytes: usize) -> usize {
    max_payload_bytes
        .saturating_mul(4)
        .div_ceil(3)
        .saturating_add(64 * 1024)
}

struct AppState<S> {
    service: Arc<S>,
    api_keys: Arc<ApiKeys>,
    max_payload_bytes: usize,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            api_keys: Arc::clone(&self.api_keys),
            max_payload_bytes: self.max_payload_bytes,
        }
    }
}

impl<S> AppState<S> {
    fn transport_error(&self, status: StatusCode, detail: String) -> PipelineError {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            PipelineError::SizeExceeded {
                limit: self.max_payload_bytes,
            }
        } else {
            PipelineError::MissingInput(detail)
        }
    }

    fn json_rejection(&self, rejection: JsonRejection) -> PipelineError {
        self.transport_error(rejection.status(), rejection.body_text())
    }
}

/// Build the HTTP router exposing the processing API surface.
pub fn create_router<S>(service: Arc<S>, api_keys: ApiKeys, max_payload_bytes: usize) -> Router
where
    S: ProcessingApi + 'static,
{
    if api_keys.is_empty() {
        tracing::warn!("No API keys configured; every authenticated route will be rejected");
    }
    let state = AppState {
        service,
        api_keys: Arc::new(api_keys),
        max_payload_bytes,
    };

    Router::new()
        .route("/process", post(process_json::<S>))
        .route("/process/upload", post(process_upload::<S>))
        .route("/process_pdf_url", post(process_pdf_url::<S>))
        .route("/process_docx_url", post(process_docx_url::<S>))
        .route("/process_pdf_base64", post(process_pdf_base64::<S>))
        .route("/process_docx_base64", post(process_docx_base64::<S>))
        .route("/process_pdf", post(process_pdf_sentences::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key::<S>,
        ))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(transport_limit(max_payload_bytes)))
        .with_state(state)
}

async fn require_api_key<S>(
    State(state): State<AppState<S>>,
    request: Request,
    next: Next,
) -> Response
where
    S: ProcessingApi,
{
    let authorized = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|key| state.api_keys.contains(key));
    if !authorized {
        tracing::debug!(path = %request.uri().path(), "Rejected request without a valid API key");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": UNAUTHORIZED_MESSAGE })),
        )
            .into_response();
    }
    next.run(request).await
}

fn default_true() -> bool {
    true
}

/// Request body for `POST /process`.
#[derive(Deserialize)]
struct ProcessBody {
    /// Remote document to download.
    #[serde(default)]
    file_url: Option<String>,
    /// Base64-encoded document.
    #[serde(default, alias = "filedata")]
    file_base64: Option<String>,
    /// File name used to infer the format of base64 payloads.
    #[serde(default)]
    filename: Option<String>,
    /// Explicit format override.
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    reduce_tokens: bool,
    #[serde(default = "default_true")]
    include_images: bool,
}

impl ProcessBody {
    fn into_request(self) -> Result<ProcessRequest, PipelineError> {
        let present = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
        let source = match (present(self.file_url), present(self.file_base64)) {
            (Some(url), None) => DocumentSource::Url { url },
            (None, Some(data)) => DocumentSource::Base64 {
                filename: self.filename,
                data,
            },
            (Some(_), Some(_)) => {
                return Err(PipelineError::MissingInput(
                    "Provide exactly one of file_url or file_base64".to_string(),
                ));
            }
            (None, None) => {
                return Err(PipelineError::MissingInput(
                    "file_url or file_base64 is required".to_string(),
                ));
            }
        };
        Ok(ProcessRequest {
            source,
            format_hint: self.format,
            options: ProcessOptions {
                reduce_tokens: self.reduce_tokens,
                include_images: self.include_images,
            },
        })
    }
}

/// Process a document referenced by URL or carried as base64.
async fn process_json<S>(
    State(state): State<AppState<S>>,
    body: Result<Json<ProcessBody>, JsonRejection>,
) -> Result<Json<ProcessingOutcome>, AppError>
where
    S: ProcessingApi,
{
    let Json(body) = body.map_err(|rejection| state.json_rejection(rejection))?;
    let outcome = state.service.process(body.into_request()?).await?;
    Ok(Json(outcome))
}

/// Process a multipart upload.
async fn process_upload<S>(
    State(state): State<AppState<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ProcessingOutcome>, AppError>
where
    S: ProcessingApi,
{
    let multipart = multipart
        .map_err(|rejection| state.transport_error(rejection.status(), rejection.body_text()))?;
    let request = read_upload(&state, multipart).await?;
    let outcome = state.service.process(request).await?;
    Ok(Json(outcome))
}

async fn read_upload<S>(
    state: &AppState<S>,
    mut multipart: Multipart,
) -> Result<ProcessRequest, PipelineError> {
    let field_error = |err: MultipartError| {
        state.transport_error(err.status(), err.body_text())
    };

    let mut file = None;
    let mut format_hint = None;
    let mut options = ProcessOptions::default();
    while let Some(field) = multipart.next_field().await.map_err(field_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(field_error)?;
                file = Some((filename, bytes.to_vec()));
            }
            "format" => format_hint = Some(field.text().await.map_err(field_error)?),
            "reduce_tokens" => {
                options.reduce_tokens =
                    parse_flag(&name, &field.text().await.map_err(field_error)?)?;
            }
            "include_images" => {
                options.include_images =
                    parse_flag(&name, &field.text().await.map_err(field_error)?)?;
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| PipelineError::MissingInput("file is required".to_string()))?;
    Ok(ProcessRequest {
        source: DocumentSource::Upload { filename, bytes },
        format_hint,
        options,
    })
}

fn parse_flag(name: &str, value: &str) -> Result<bool, PipelineError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(PipelineError::MissingInput(format!(
            "{name} must be true or false"
        ))),
    }
}

/// Request body for the legacy URL routes.
#[derive(Deserialize)]
struct LegacyUrlBody {
    #[serde(default)]
    file_url: String,
    #[serde(default)]
    reduce_tokens: bool,
    #[serde(default = "default_true")]
    include_images: bool,
}

/// Request body for the legacy base64 routes.
#[derive(Deserialize)]
struct LegacyBase64Body {
    #[serde(default, alias = "filedata")]
    file_base64: String,
    #[serde(default)]
    reduce_tokens: bool,
    #[serde(default = "default_true")]
    include_images: bool,
}

async fn legacy_url<S>(
    state: AppState<S>,
    body: Result<Json<LegacyUrlBody>, JsonRejection>,
    format: DocumentFormat,
) -> Result<Json<ProcessingOutcome>, AppError>
where
    S: ProcessingApi,
{
    let Json(body) = body.map_err(|rejection| state.json_rejection(rejection))?;
    let request = ProcessRequest {
        source: DocumentSource::Url { url: body.file_url },
        format_hint: Some(format.to_string()),
        options: ProcessOptions {
            reduce_tokens: body.reduce_tokens,
            include_images: body.include_images,
        },
    };
    Ok(Json(state.service.process(request).await?))
}

async fn legacy_base64<S>(
    state: AppState<S>,
    body: Result<Json<LegacyBase64Body>, JsonRejection>,
    format: DocumentFormat,
) -> Result<Json<ProcessingOutcome>, AppError>
where
    S: ProcessingApi,
{
    let Json(body) = body.map_err(|rejection| state.json_rejection(rejection))?;
    let request = ProcessRequest {
        source: DocumentSource::Base64 {
            filename: None,
            data: body.file_base64,
        },
        format_hint: Some(format.to_string()),
        options: ProcessOptions {
            reduce_tokens: body.reduce_tokens,
            include_images: body.include_images,
        },
    };
    Ok(Json(state.service.process(request).await?))
}

async fn process_pdf_url<S: ProcessingApi>(
    State(state): State<AppState<S>>,
    body: Result<Json<LegacyUrlBody>, JsonRejection>,
) -> Result<Json<ProcessingOutcome>, AppError> {
    legacy_url(state, body, DocumentFormat::Pdf).await
}

async fn process_docx_url<S: ProcessingApi>(
    State(state): State<AppState<S>>,
    body: Result<Json<LegacyUrlBody>, JsonRejection>,
) -> Result<Json<ProcessingOutcome>, AppError> {
    legacy_url(state, body, DocumentFormat::Docx).await
}

async fn process_pdf_base64<S: ProcessingApi>(
    State(state): State<AppState<S>>,
    body: Result<Json<LegacyBase64Body>, JsonRejection>,
) -> Result<Json<ProcessingOutcome>, AppError> {
    legacy_base64(state, body, DocumentFormat::Pdf).await
}

async fn process_docx_base64<S: ProcessingApi>(
    State(state): State<AppState<S>>,
    body: Result<Json<LegacyBase64Body>, JsonRejection>,
) -> Result<Json<ProcessingOutcome>, AppError> {
    legacy_base64(state, body, DocumentFormat::Docx).await
}

#[derive(Deserialize)]
struct SentenceDigestBody {
    #[serde(default)]
    pdf_url: Option<String>,
}

/// Response of `POST /process_pdf`: the text as trimmed sentences joined by spaces.
#[derive(Debug, Serialize)]
struct SentenceDigest {
    extracted_text: String,
    sentence_count: usize,
    token_count: usize,
}

impl SentenceDigest {
    fn from_outcome(outcome: &ProcessingOutcome) -> Self {
        let extracted_text = UnicodeAnalyzer
            .sentences(&outcome.full_text)
            .into_iter()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            extracted_text,
            sentence_count: outcome.sentence_count,
            token_count: outcome.token_count,
        }
    }
}

async fn process_pdf_sentences<S: ProcessingApi>(
    State(state): State<AppState<S>>,
    body: Result<Json<SentenceDigestBody>, JsonRejection>,
) -> Result<Json<SentenceDigest>, AppError> {
    let Json(body) = body.map_err(|rejection| state.json_rejection(rejection))?;
    let url = body
        .pdf_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| PipelineError::MissingInput("pdf_url is required".to_string()))?;
    let request = ProcessRequest {
        source: DocumentSource::Url { url },
        format_hint: Some(DocumentFormat::Pdf.to_string()),
        options: ProcessOptions {
            reduce_tokens: false,
            include_images: false,
        },
    };
    let outcome = state.service.process(request).await?;
    Ok(Json(SentenceDigest::from_outcome(&outcome)))
}

/// Return the processing counters.
async fn get_metrics<S>(State(state): State<AppState<S>>) -> Json<MetricsSnapshot>
where
    S: ProcessingApi,
{
    Json(state.service.metrics_snapshot())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "process",
                method: "POST",
                path: "/process",
                description: "Extract text, counts, and images from a PDF or DOCX \
                              given as file_url or file_base64.",
                request_example: Some(json!({
                    "file_url": "https://example.org/report.pdf",
                    "reduce_tokens": false,
                    "include_images": true
                })),
            },
            CommandDescriptor {
                name: "process_upload",
                method: "POST",
                path: "/process/upload",
                description: "Same as process, for a multipart upload with a `file` part.",
                request_example: None,
            },
            CommandDescriptor {
                name: "process_pdf_url",
                method: "POST",
                path: "/process_pdf_url",
                description: "Legacy: process a PDF downloaded from file_url.",
                request_example: Some(json!({ "file_url": "https://example.org/report.pdf" })),
            },
            CommandDescriptor {
                name: "process_docx_url",
                method: "POST",
                path: "/process_docx_url",
                description: "Legacy: process a DOCX downloaded from file_url.",
                request_example: Some(json!({ "file_url": "https://example.org/notes.docx" })),
            },
            CommandDescriptor {
                name: "process_pdf_base64",
                method: "POST",
                path: "/process_pdf_base64",
                description: "Legacy: process a base64-encoded PDF.",
                request_example: Some(json!({ "file_base64": "JVBERi0xLjUK..." })),
            },
            CommandDescriptor {
                name: "process_docx_base64",
                method: "POST",
                path: "/process_docx_base64",
                description: "Legacy: process a base64-encoded DOCX.",
                request_example: Some(json!({ "file_base64": "UEsDBBQABgAIAAAAIQ..." })),
            },
            CommandDescriptor {
                name: "process_pdf",
                method: "POST",
                path: "/process_pdf",
                description: "Legacy: sentences of a PDF at pdf_url joined into extracted_text.",
                request_example: Some(json!({ "pdf_url": "https://example.org/report.pdf" })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return processing counters useful for observability dashboards.",
                request_example: None,
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness probe; does not require an API key.",
                request_example: None,
            },
        ],
    })
}

/// HTTP status for a pipeline failure.
fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

struct AppError(PipelineError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = match &self.0 {
            PipelineError::Internal(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{SentenceDigest, create_router, get_commands, status_for, transport_limit};
    use crate::config::ApiKeys;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        DocumentSource, ImageAsset, PipelineError, ProcessRequest, ProcessingApi,
        ProcessingOutcome,
    };
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    #[derive(Clone)]
    struct StubProcessingService {
        calls: Arc<Mutex<Vec<ProcessRequest>>>,
        failure: Option<fn() -> PipelineError>,
    }

    impl StubProcessingService {
        fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                failure: None,
            }
        }

        fn failing(failure: fn() -> PipelineError) -> Self {
            Self {
                failure: Some(failure),
                ..Self::new()
            }
        }

        async fn recorded_calls(&self) -> Vec<ProcessRequest> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl ProcessingApi for StubProcessingService {
        async fn process(
            &self,
            request: ProcessRequest,
        ) -> Result<ProcessingOutcome, PipelineError> {
            let options = request.options;
            self.calls.lock().await.push(request);
            if let Some(failure) = self.failure {
                return Err(failure());
            }
            let images = vec![ImageAsset {
                index: 1,
                encoded: "aW1n".into(),
            }];
            Ok(ProcessingOutcome {
                full_text: "Stub text.".into(),
                reduced_text: options.reduce_tokens.then(|| "Stub text.".into()),
                token_count: 2,
                sentence_count: 1,
                image_count: options.include_images.then_some(images.len()),
                images: options.include_images.then_some(images),
                process_time_seconds: 0.25,
                file_size_bytes: 42,
            })
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_processed: 3,
                ..MetricsSnapshot::default()
            }
        }
    }

    fn router(service: Arc<StubProcessingService>) -> Router {
        create_router(service, ApiKeys::new([KEY]), 1024 * 1024)
    }

    fn json_request(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .header("API-Key", KEY)
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("router response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn commands_catalog_exposes_process_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let process = commands
            .iter()
            .find(|cmd| cmd.name == "process")
            .expect("process command present");

        assert_eq!(process.method, "POST");
        assert_eq!(process.path, "/process");
        assert!(commands.iter().any(|cmd| cmd.path == "/process_docx_base64"));
    }

    #[tokio::test]
    async fn missing_or_wrong_key_is_forbidden() {
        let service = Arc::new(StubProcessingService::new());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/process")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"file_url":"https://example.org/a.pdf"}"#))
            .expect("request");
        let (status, json) = send(router(service.clone()), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json, json!({ "error": "Invalid or missing API key" }));

        let request = Request::builder()
            .uri("/metrics")
            .header("API-Key", "wrong")
            .body(Body::empty())
            .expect("request");
        let (status, _) = send(router(service.clone()), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        assert!(service.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn health_does_not_require_a_key() {
        let service = Arc::new(StubProcessingService::new());
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request");
        let (status, json) = send(router(service), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn metrics_route_returns_snapshot() {
        let service = Arc::new(StubProcessingService::new());
        let request = Request::builder()
            .uri("/metrics")
            .header("API-Key", KEY)
            .body(Body::empty())
            .expect("request");
        let (status, json) = send(router(service), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["documents_processed"], 3);
    }

    #[tokio::test]
    async fn base64_body_is_forwarded_with_defaults() {
        let service = Arc::new(StubProcessingService::new());
        let body = json!({ "filedata": "UEsDBA==", "filename": "notes.docx" });
        let (status, json) = send(
            router(service.clone()),
            json_request("/process", &body.to_string()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["full_text"], "Stub text.");
        assert_eq!(json["image_count"], 1);
        assert_eq!(json["images"][0]["image_index"], 1);
        assert!(json.get("reduced_text").is_none());

        let calls = service.recorded_calls().await;
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].options.reduce_tokens);
        assert!(calls[0].options.include_images);
        match &calls[0].source {
            DocumentSource::Base64 { filename, data } => {
                assert_eq!(filename.as_deref(), Some("notes.docx"));
                assert_eq!(data, "UEsDBA==");
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[tokio::test]
    async fn disabled_fields_are_omitted() {
        let service = Arc::new(StubProcessingService::new());
        let body = json!({
            "file_url": "https://example.org/a.pdf",
            "reduce_tokens": true,
            "include_images": false
        });
        let (status, json) =
            send(router(service), json_request("/process", &body.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["reduced_text"], "Stub text.");
        assert!(json.get("images").is_none());
        assert!(json.get("image_count").is_none());
        assert_eq!(json["file_size_bytes"], 42);
    }

    #[tokio::test]
    async fn ambiguous_or_empty_sources_are_rejected() {
        let service = Arc::new(StubProcessingService::new());
        let both = json!({ "file_url": "https://example.org/a.pdf", "file_base64": "AAAA" });
        let (status, json) = send(
            router(service.clone()),
            json_request("/process", &both.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("exactly one"));

        let (status, _) = send(router(service.clone()), json_request("/process", "{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) =
            send(router(service.clone()), json_request("/process", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        assert!(service.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn legacy_routes_fix_the_format() {
        let service = Arc::new(StubProcessingService::new());
        let body = json!({ "file_url": "https://example.org/download?id=7" });
        let (status, _) = send(
            router(service.clone()),
            json_request("/process_docx_url", &body.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let body = json!({ "file_base64": "JVBERg==", "include_images": false });
        let (status, _) = send(
            router(service.clone()),
            json_request("/process_pdf_base64", &body.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let calls = service.recorded_calls().await;
        assert_eq!(calls[0].format_hint.as_deref(), Some("docx"));
        assert!(matches!(calls[0].source, DocumentSource::Url { .. }));
        assert_eq!(calls[1].format_hint.as_deref(), Some("pdf"));
        assert!(!calls[1].options.include_images);
    }

    #[tokio::test]
    async fn sentence_digest_route_joins_trimmed_sentences() {
        let service = Arc::new(StubProcessingService::new());
        let body = json!({ "pdf_url": "https://example.org/paper.pdf" });
        let (status, json) = send(
            router(service.clone()),
            json_request("/process_pdf", &body.to_string()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            json!({ "extracted_text": "Stub text.", "sentence_count": 1, "token_count": 2 })
        );
        let calls = service.recorded_calls().await;
        assert_eq!(calls[0].format_hint.as_deref(), Some("pdf"));
        assert!(!calls[0].options.include_images);
        assert!(matches!(calls[0].source, DocumentSource::Url { .. }));

        let (status, json) =
            send(router(service.clone()), json_request("/process_pdf", "{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "pdf_url is required");
        assert_eq!(service.recorded_calls().await.len(), 1);
    }

    #[test]
    fn sentence_digest_trims_each_sentence() {
        let outcome = ProcessingOutcome {
            full_text: "First sentence here.\nSecond one.  ".into(),
            reduced_text: None,
            token_count: 5,
            sentence_count: 2,
            image_count: None,
            images: None,
            process_time_seconds: 0.0,
            file_size_bytes: 1,
        };
        let digest = SentenceDigest::from_outcome(&outcome);
        assert_eq!(digest.extracted_text, "First sentence here. Second one.");
        assert_eq!(digest.sentence_count, 2);
    }

    #[tokio::test]
    async fn multipart_upload_is_forwarded() {
        let service = Arc::new(StubProcessingService::new());
        let body = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"report.pdf\"\r\n",
            "Content-Type: application/pdf\r\n\r\n",
            "%PDF-1.5 body\r\n",
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"reduce_tokens\"\r\n\r\n",
            "true\r\n",
            "--XBOUNDARY--\r\n",
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/process/upload")
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .header("API-Key", KEY)
            .body(Body::from(body))
            .expect("request");
        let (status, json) = send(router(service.clone()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["reduced_text"], "Stub text.");

        let calls = service.recorded_calls().await;
        assert!(calls[0].options.reduce_tokens);
        match &calls[0].source {
            DocumentSource::Upload { filename, bytes } => {
                assert_eq!(filename.as_deref(), Some("report.pdf"));
                assert_eq!(bytes.as_slice(), b"%PDF-1.5 body");
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[tokio::test]
    async fn multipart_without_file_is_rejected() {
        let service = Arc::new(StubProcessingService::new());
        let body = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"format\"\r\n\r\n",
            "pdf\r\n",
            "--XBOUNDARY--\r\n",
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/process/upload")
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .header("API-Key", KEY)
            .body(Body::from(body))
            .expect("request");
        let (status, json) = send(router(service), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "file is required");
    }

    #[tokio::test]
    async fn oversized_body_maps_to_size_exceeded() {
        let service = Arc::new(StubProcessingService::new());
        let app = create_router(service.clone(), ApiKeys::new([KEY]), 16);
        let padding = "A".repeat(transport_limit(16) + 1);
        let body = json!({ "file_base64": padding, "filename": "big.pdf" });
        let (status, json) = send(app, json_request("/process", &body.to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("16 byte limit"));
        assert!(service.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn pipeline_errors_map_to_status_codes() {
        let service = Arc::new(StubProcessingService::failing(|| {
            PipelineError::CorruptDocument("invalid PDF".into())
        }));
        let body = json!({ "file_base64": "AAAA", "filename": "a.pdf" });
        let (status, json) =
            send(router(service), json_request("/process", &body.to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("invalid PDF"));

        let service = Arc::new(StubProcessingService::failing(|| {
            PipelineError::Internal("worker panicked at secret.rs".into())
        }));
        let (status, json) =
            send(router(service), json_request("/process", &body.to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json, json!({ "error": "Internal processing error" }));
    }

    #[test]
    fn only_internal_errors_are_server_errors() {
        let client_errors = [
            PipelineError::MissingInput("x".into()),
            PipelineError::InvalidEncoding("x".into()),
            PipelineError::SizeExceeded { limit: 1 },
            PipelineError::UnsupportedFormat("x".into()),
            PipelineError::RetrievalFailed("x".into()),
            PipelineError::CorruptDocument("x".into()),
            PipelineError::NoExtractableText,
        ];
        for error in &client_errors {
            assert_eq!(status_for(error), StatusCode::BAD_REQUEST, "{error:?}");
        }
        assert_eq!(
            status_for(&PipelineError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn transport_limit_leaves_room_for_base64() {
        let max = 10 * 1024 * 1024;
        assert!(transport_limit(max) >= max / 3 * 4 + 4);
        assert_eq!(transport_limit(0), 64 * 1024);
    }
}
