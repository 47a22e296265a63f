use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::info;

use crate::ax_state::AppState;
use crate::core::sqlgen::SqlFlavor;
use crate::models::schema::DataSource;

/// 注册/更新一个来源系统的连接配置 (EON / SALESFORCE / ...)
pub async fn register_data_source(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DataSource>,
) -> impl IntoResponse {
    if SqlFlavor::from_db_type(&payload.db_type).is_none() {
        return (StatusCode::BAD_REQUEST, "Unsupported DB type").into_response();
    }
    info!("数据源配置已更新: {} ({})", payload.name, payload.db_type);
    state.sources.insert(payload.name.clone(), payload);
    (StatusCode::CREATED, "Source Registered").into_response()
}

pub async fn list_data_sources(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let list: Vec<DataSource> = state.sources.iter().map(|e| e.value().clone()).collect();
    Json(list).into_response()
}
