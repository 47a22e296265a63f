mod api;
mod core;
mod infra;
mod models;

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use tower_http::cors::{Any, CorsLayer};

use crate::api::query::{health_check, order_query};
use crate::api::source::{list_data_sources, register_data_source};
use crate::core::pipeline::QueryMode;
use crate::infra::db::PoolManager;
use crate::infra::llm::{CompletionService, LlamaServerClient};
use crate::models::schema::DataSource;

pub mod ax_state {
    use super::*;
    use tokio::sync::Mutex;

    pub struct AppState {
        pub llm: Arc<dyn CompletionService>,
        /// 模型句柄的单占用闸门，补全调用逐个排队通过
        pub llm_gate: Mutex<()>,
        pub sources: DashMap<String, DataSource>,
        pub default_source: String,
        pub pool_manager: PoolManager,
        pub mode: QueryMode,
        pub max_tokens: u32,
    }

    impl AppState {
        pub fn primary_source(&self) -> Option<DataSource> {
            self.sources
                .get(&self.default_source)
                .map(|e| e.value().clone())
        }

        /// 来源系统对应的数据源；没注册专属连接的来源退回主源
        pub fn source_for(&self, name: &str) -> Option<DataSource> {
            self.sources
                .get(name)
                .map(|e| e.value().clone())
                .or_else(|| self.primary_source())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let database_kind = env::var("DATABASE_KIND").unwrap_or_else(|_| "postgres".to_string());
    let default_source = env::var("DEFAULT_SOURCE").unwrap_or_else(|_| "EON".to_string());
    let llm_base = env::var("LLM_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
    let max_tokens = env::var("LLM_MAX_TOKENS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(512);
    let port: u16 = env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(5000);

    // 主数据源从环境变量种进注册表，其余来源系统走 /api/datasource 注册
    let sources = DashMap::new();
    sources.insert(
        default_source.clone(),
        DataSource {
            name: default_source.clone(),
            db_type: database_kind,
            connection_url: database_url,
        },
    );

    // 补全服务客户端整个进程只建一次
    let llm: Arc<dyn CompletionService> = Arc::new(LlamaServerClient::new(llm_base)?);

    let state = Arc::new(ax_state::AppState {
        llm,
        llm_gate: tokio::sync::Mutex::new(()),
        sources,
        default_source,
        pool_manager: PoolManager::new(),
        mode: QueryMode::from_env(),
        max_tokens,
    });

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/query", post(order_query))
        .route("/api/datasource", post(register_data_source))
        .route("/api/datasources", get(list_data_sources))
        .with_state(state)
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 ONQ Backend 运行在 http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
