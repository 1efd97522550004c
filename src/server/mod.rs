//! HTTP API（axum）
//!
//! | 方法 | 路径 | 说明 |
//! |---|---|---|
//! | POST | `/api/import` | multipart 上传，`?wait=true` 时等待提取结束 |
//! | GET | `/api/import/{id}` | 任务状态；`?action=review` 返回待审核内容 |
//! | POST | `/api/import/commit` | 提交审核结果 |
//! | GET | `/health` | 健康检查 |
//!
//! 错误统一返回 `{"error": {"code", "message"}}`。

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{ImportError, ValidationError};
use crate::infrastructure::db;
use crate::models::{JobStatus, SubmitResponse};
use crate::orchestrator::ImportPipeline;
use crate::services::{CommitRequest, ReviewService, UploadRequest};
use crate::utils::logging::log_startup;
use crate::workflow::StageOutcome;

/// multipart 编码和其他表单字段的额外余量
const BODY_LIMIT_HEADROOM: usize = 1024 * 1024;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pipeline: ImportPipeline,
    review: ReviewService,
}

impl AppState {
    pub fn new(pipeline: ImportPipeline) -> Self {
        let review = pipeline.review_service();
        Self { pipeline, review }
    }
}

/// 启动 HTTP 服务（连接数据库、建表、组装流水线）
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    log_startup(&config.bind_addr, &config.database_url);

    let pool = db::connect(&config.database_url).await?;
    let pipeline = ImportPipeline::from_config(config, pool);
    let app = router(AppState::new(pipeline), config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("🌐 服务已启动: http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// 构建路由
///
/// 请求体上限高于上传上限，超大文件由校验给出具体原因，而不是被框架直接拒绝。
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/import", post(handle_submit))
        .route("/api/import/commit", post(handle_commit))
        .route("/api/import/{id}", get(handle_get_job))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(
            max_upload_bytes.saturating_add(BODY_LIMIT_HEADROOM),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ 错误响应 ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// 可转换为 HTTP 响应的错误
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request".to_string(),
            message: message.into(),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("❌ 请求失败: {}", err);
        } else {
            info!("请求被拒绝 ({}): {}", status.as_u16(), err);
        }
        Self {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ImportError::from(err).into()
    }
}

/// 请求体无法解析为 JSON（格式错误、缺少 content-type、字段类型不符）
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        info!("请求体被拒绝 ({}): {}", rejection.status().as_u16(), rejection.body_text());
        Self {
            status: rejection.status(),
            code: "invalid_body".to_string(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/import ============

#[derive(Debug, Default, Deserialize)]
struct SubmitParams {
    #[serde(default)]
    wait: bool,
}

/// 上传 PDF
///
/// 默认创建任务后立即返回 201；`wait=true` 时等待提取结束，
/// 成功返回 200 和提取数量，阶段失败返回 500 和任务 ID。
async fn handle_submit(
    State(state): State<AppState>,
    Query(params): Query<SubmitParams>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let request = read_upload(multipart).await?;
    let handle = state.pipeline.submit(request).await?;
    let job_id = handle.job_id.clone();

    if !params.wait {
        let body = SubmitResponse {
            job_id,
            status: JobStatus::Processing,
            questions_count: None,
            lessons_count: None,
            error: None,
        };
        return Ok((StatusCode::CREATED, Json(body)).into_response());
    }

    let response = match handle.wait().await? {
        StageOutcome::ReadyForReview { questions, lessons } => (
            StatusCode::OK,
            Json(SubmitResponse {
                job_id,
                status: JobStatus::ReadyForReview,
                questions_count: Some(questions as u32),
                lessons_count: Some(lessons as u32),
                error: None,
            }),
        ),
        StageOutcome::Failed { message, .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SubmitResponse {
                job_id,
                status: JobStatus::Failed,
                questions_count: None,
                lessons_count: None,
                error: Some(message),
            }),
        ),
    };
    Ok(response.into_response())
}

/// 读取 multipart 表单
async fn read_upload(mut multipart: Multipart) -> Result<UploadRequest, ApiError> {
    let mut request = UploadRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                request.filename = field.file_name().map(str::to_string);
                request.bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {}", e)))?
                    .to_vec();
            }
            "school" | "year" | "examType" | "paperNumber" => {
                let value = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read field {}: {}", name, e))
                })?;
                match name.as_str() {
                    "school" => request.school = Some(value),
                    "year" => request.year = Some(value),
                    "examType" => request.exam_type = Some(value),
                    _ => request.paper_number = Some(value),
                }
            }
            // 未知字段忽略
            _ => {}
        }
    }

    Ok(request)
}

// ============ GET /api/import/{id} ============

#[derive(Debug, Default, Deserialize)]
struct JobParams {
    action: Option<String>,
}

async fn handle_get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(params): Query<JobParams>,
) -> Result<Response, ApiError> {
    match params.action.as_deref() {
        None => {
            let view = state.pipeline.job_status(&job_id).await?;
            Ok(Json(view).into_response())
        }
        Some("review") => {
            let content = state.review.fetch_for_review(&job_id).await?;
            Ok(Json(content).into_response())
        }
        Some(other) => Err(ApiError::bad_request(format!("Unknown action: {}", other))),
    }
}

// ============ POST /api/import/commit ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitBody {
    #[serde(default)]
    job_id: Option<String>,
    #[serde(flatten)]
    request: CommitRequest,
}

async fn handle_commit(
    State(state): State<AppState>,
    body: Result<Json<CommitBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let job_id = body
        .job_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(ValidationError::MissingJobId)?;

    let result = state.review.commit(&job_id, body.request).await?;
    Ok(Json(result).into_response())
}
