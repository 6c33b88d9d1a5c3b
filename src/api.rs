use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::{
    analysis::RawAnalysisDocument,
    export::{self, ExportFormat},
    history::{HistoryEntry, HistoryLedger, HistoryStats, TimeRange},
    session::{DetectionOutcome, DetectionRecorder},
    viewer::ExplainabilityImageSet,
};

/// 外部认证层写入的请求头
pub const USER_HEADER: &str = "x-deepguard-user";
pub const ROLE_HEADER: &str = "x-deepguard-role";

// ==========================================
// 1. 应用状态 (Shared State)
// ==========================================
// 账本是追加写的：用 Mutex 保证 append/clear 串行化，读操作同样经过锁拿到一致的快照。
pub struct AppState {
    pub ledger: Arc<Mutex<HistoryLedger>>,
    pub recorder: Arc<DetectionRecorder>,
    pub export_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(recorder: DetectionRecorder, export_dir: Option<PathBuf>) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(HistoryLedger::new())),
            recorder: Arc::new(recorder),
            export_dir,
        }
    }
}

/// 调用方角色。角色解析本身不在这里做，只读取上游给出的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    fn from_headers(headers: &HeaderMap) -> Self {
        match headers.get(ROLE_HEADER).and_then(|v| v.to_str().ok()) {
            Some(role) if role.eq_ignore_ascii_case("admin") => Role::Admin,
            _ => Role::User,
        }
    }
}

fn user_id(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("unknown")
        .to_string()
}

// ==========================================
// 2. 数据传输对象 (DTOs)
// ==========================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub range: Option<String>,
}

/// 单条回放：记录本身 + 原始响应 + 查看器图片集合
#[derive(Debug, Serialize)]
pub struct HistoryReplay {
    pub entry: HistoryEntry,
    pub raw_response: Option<RawAnalysisDocument>,
    pub images: ExplainabilityImageSet,
}

impl From<&HistoryEntry> for HistoryReplay {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            entry: entry.clone(),
            raw_response: entry.raw_response.clone(),
            images: ExplainabilityImageSet::from_entry(entry),
        }
    }
}

// ==========================================
// 3. API 路由构建
// ==========================================
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/detections", post(record_detection))
        .route("/history", get(list_history).delete(clear_history))
        .route("/history/stats", get(history_stats))
        .route("/history/{id}", get(replay_entry))
        .route("/history/export/{format}", get(export_history))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ==========================================
// 4. 处理函数 (Handlers)
// ==========================================

/// 接口：登记一次完成的分析。请求体就是分析服务返回的原始 JSON
async fn record_detection(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<DetectionOutcome> {
    let user = user_id(&headers);
    let document = RawAnalysisDocument::new(body);

    let outcome = {
        let mut ledger = state.ledger.lock().await;
        state
            .recorder
            .record(&mut ledger, &user, document, None, chrono::Utc::now())
    };

    tracing::info!(
        id = %outcome.entry.id,
        user = %user,
        model = %state.recorder.model().name,
        label = %outcome.result.label,
        confidence = outcome.result.confidence,
        "detection recorded"
    );
    Json(outcome)
}

/// 接口：历史列表（最新在前），可按期间过滤
async fn list_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, (StatusCode, String)> {
    let ledger = state.ledger.lock().await;
    let entries = match query.range.as_deref() {
        Some(range) => {
            let range: TimeRange = range
                .parse()
                .map_err(|e: anyhow::Error| (StatusCode::BAD_REQUEST, e.to_string()))?;
            ledger
                .within(range, chrono::Utc::now())
                .into_iter()
                .cloned()
                .collect()
        }
        None => ledger.all().cloned().collect(),
    };
    Ok(Json(entries))
}

async fn clear_history(State(state): State<Arc<AppState>>) -> StatusCode {
    state.ledger.lock().await.clear();
    StatusCode::NO_CONTENT
}

/// 接口：按 id 回放一条记录，找不到返回 404
async fn replay_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HistoryReplay>, (StatusCode, String)> {
    let ledger = state.ledger.lock().await;
    ledger
        .get(&id)
        .map(|entry| Json(HistoryReplay::from(entry)))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("history entry {id} not found")))
}

async fn history_stats(State(state): State<Arc<AppState>>) -> Json<HistoryStats> {
    Json(state.ledger.lock().await.stats())
}

/// 接口：导出（仅管理员）。空账本返回 204，不产生文件
async fn export_history(
    State(state): State<Arc<AppState>>,
    Path(format): Path<String>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    if Role::from_headers(&headers) != Role::Admin {
        tracing::warn!(user = %user_id(&headers), "export rejected: admin role required");
        return Err((StatusCode::FORBIDDEN, "export requires admin role".to_string()));
    }

    let format: ExportFormat = format
        .parse()
        .map_err(|e: anyhow::Error| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let file = {
        let ledger = state.ledger.lock().await;
        export::export(&ledger, format, chrono::Utc::now())
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    };

    let Some(file) = file else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    if let Some(dir) = &state.export_dir {
        let path = file
            .save_to(dir)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
        tracing::info!(path = %path.display(), "export archived");
    }

    let disposition = format!("attachment; filename=\"{}\"", file.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, file.mime().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.contents,
    )
        .into_response())
}
