use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::warn;

use crate::ax_state::AppState;
use crate::core::error::PipelineError;
use crate::core::pipeline::{process_question, QueryOutcome};
use crate::models::request::QueryRequest;

pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn order_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> impl IntoResponse {
    let question = payload.question.trim();
    if question.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Empty question" })),
        )
            .into_response();
    }

    match process_question(state, question, payload.clarification.as_deref()).await {
        Ok(QueryOutcome::Answer { filters, sql, rows }) => {
            let row_count = rows.len();
            Json(json!({
                "status": "success",
                "filters": filters,
                "sql": sql,
                "data": rows,
                "meta": { "row_count": row_count }
            }))
            .into_response()
        }
        // 两态对话的中间态：把缺失字段回给客户端，等它带着补充短语再来
        Ok(QueryOutcome::NeedClarification { missing }) => Json(json!({
            "status": "missing",
            "missing": missing,
            "message": "请补充查询的日期或时间范围"
        }))
        .into_response(),
        Err(e) => {
            warn!("查询管线失败: {}", e);
            let code = match &e {
                PipelineError::MalformedCompletion { .. }
                | PipelineError::UnresolvableDate { .. }
                | PipelineError::UnknownEnumValue { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::CompletionBackend(_) => StatusCode::BAD_GATEWAY,
                PipelineError::StatementExecution(_) | PipelineError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (code, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}
