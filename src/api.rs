use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    duplicate::{Candidate, SubmissionId},
    error::VerifyError,
    evidence::{ReportType, VerificationInput, VerificationResult},
    fingerprint::Fingerprint,
    ledger::{SubmissionLedger, SubmissionRecord},
    pipeline::{is_allowed_extension, Verifier, ALLOWED_EXTENSIONS},
};

/// 解码失败时给用户看的提示
pub const REUPLOAD_MESSAGE: &str = "please re-upload a valid image";

// ==========================================
// 1. 应用状态 (Shared State)
// ==========================================
// 校验器初始化后只读，直接 Arc 共享；台账是追加写的，需要 Mutex。
pub struct AppState {
    pub verifier: Arc<Verifier>,
    pub ledger: Arc<Mutex<SubmissionLedger>>,
}

impl AppState {
    pub fn new(verifier: Verifier, ledger: SubmissionLedger) -> Self {
        Self {
            verifier: Arc::new(verifier),
            ledger: Arc::new(Mutex::new(ledger)),
        }
    }
}

// ==========================================
// 2. 数据传输对象 (DTOs)
// ==========================================

/// 候选指纹 (来自调用方的持久层)
#[derive(Deserialize)]
pub struct CandidateDto {
    pub id: i64,
    pub fingerprint: String,
}

/// 请求：无状态校验，候选窗口由调用方提供
#[derive(Deserialize)]
pub struct VerifyRequest {
    pub image_path: String,
    #[serde(default)]
    pub report_type: Option<String>,
    #[serde(default)]
    pub candidates: Vec<CandidateDto>,
}

/// 请求：提交并记入台账
#[derive(Deserialize)]
pub struct SubmitRequest {
    pub image_path: String,
    #[serde(default)]
    pub report_type: Option<String>,
}

/// 响应：提交回执
#[derive(Serialize)]
pub struct SubmissionReceipt {
    pub id: SubmissionId,
    pub result: VerificationResult,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: String,
}

type ApiError = (StatusCode, String);

// ==========================================
// 3. API 路由构建
// ==========================================
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/verify", post(verify_image))
        .route("/submissions", post(submit))
        .route("/submissions/{id}", get(get_submission))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()) // ⚠️ 开发模式：允许所有跨域
        .with_state(state)
}

// ==========================================
// 4. 处理函数 (Handlers)
// ==========================================

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        backend: state.verifier.backend().to_string(),
    })
}

/// 接口：无状态校验
async fn verify_image(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerificationResult>, ApiError> {
    let image_path = checked_path(&req.image_path)?;
    let candidates = parse_candidates(req.candidates);
    let input = VerificationInput::new(image_path, report_type(req.report_type), candidates);

    let result = run_verification(state.verifier.clone(), input).await?;
    Ok(Json(result))
}

/// 接口：校验并记入台账
///
/// 先取窗口快照再校验，两个几乎同时到达的重复提交可能互相看不见 (由持久层的唯一约束兜底)。
async fn submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmissionReceipt>, ApiError> {
    let image_path = checked_path(&req.image_path)?;
    let report_type = report_type(req.report_type);

    let window = state.verifier.config().duplicates.window;
    let candidates = state.ledger.lock().await.recent_candidates(window);

    let input = VerificationInput::new(image_path, report_type.clone(), candidates);
    let result = run_verification(state.verifier.clone(), input).await?;

    let id = state
        .ledger
        .lock()
        .await
        .append(report_type, req.image_path, result.clone());

    info!(%id, status = %result.status, "📥 提交已记录");
    Ok(Json(SubmissionReceipt { id, result }))
}

/// 接口：查询提交
async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SubmissionRecord>, ApiError> {
    let ledger = state.ledger.lock().await;
    ledger
        .get(SubmissionId(id))
        .cloned()
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("submission {} not found", id)))
}

// ==========================================
// 5. 辅助函数
// ==========================================

fn report_type(raw: Option<String>) -> ReportType {
    raw.map(ReportType::from).unwrap_or_default()
}

fn checked_path(raw: &str) -> Result<PathBuf, ApiError> {
    let path = PathBuf::from(raw);
    if !is_allowed_extension(&path) {
        return Err((
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("unsupported file type, expected one of {}", ALLOWED_EXTENSIONS.join("|")),
        ));
    }
    Ok(path)
}

/// 解析失败的候选直接跳过 (比如旧版本留下的空指纹)
fn parse_candidates(raw: Vec<CandidateDto>) -> Vec<Candidate> {
    raw.into_iter()
        .filter_map(|dto| match dto.fingerprint.parse::<Fingerprint>() {
            Ok(fp) => Some(Candidate::new(SubmissionId(dto.id), fp)),
            Err(err) => {
                warn!(id = dto.id, error = %err, "跳过无法解析的候选指纹");
                None
            }
        })
        .collect()
}

/// 解码和打分是 CPU 密集型操作，放到 spawn_blocking
async fn run_verification(verifier: Arc<Verifier>, input: VerificationInput) -> Result<VerificationResult, ApiError> {
    tokio::task::spawn_blocking(move || verifier.verify(&input))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join error: {}", e)))?
        .map_err(|e| map_verify_error(&e))
}

/// 读不了 / 解不开都提示用户重新上传，而不是笼统的 500
fn map_verify_error(err: &VerifyError) -> ApiError {
    warn!(error = %err, "图片无法解码");
    (StatusCode::UNPROCESSABLE_ENTITY, REUPLOAD_MESSAGE.to_string())
}
