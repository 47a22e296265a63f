use std::sync::Arc;

use chrono::Local;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::ax_state::AppState;
use crate::core::catalog::{build_catalog, pick_tables, render_schema_text};
use crate::core::dates::resolve_range;
use crate::core::error::PipelineError;
use crate::core::extract::{extract_sql_statement, parse_filter_completion, FilterOutcome};
use crate::core::prompt::{compile_filter_prompt, compile_sql_prompt, FILTER_STOP, SQL_STOP};
use crate::core::sqlgen::{build_order_query, ensure_select, SqlFlavor};
use crate::infra::db;
use crate::infra::llm::CompletionService;
use crate::models::filters::FilterRecord;

/// SQL 的产出方式：filters 为固定骨架 + 绑定参数 (默认)，
/// freeform 让模型整句自撰，执行前只做 SELECT 把关。两种方式不混用。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Filters,
    Freeform,
}

impl QueryMode {
    pub fn from_env() -> Self {
        match std::env::var("QUERY_MODE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "freeform" => Self::Freeform,
            _ => Self::Filters,
        }
    }
}

#[derive(Debug)]
pub enum QueryOutcome {
    Answer {
        filters: Option<FilterRecord>,
        sql: String,
        rows: Vec<Value>,
    },
    /// 首轮回答缺少日期，等客户端补一个时间短语再来一轮
    NeedClarification { missing: String },
}

/// 澄清短语并入原始提问的固定格式
pub(crate) fn combine_question(question: &str, clarification: &str) -> String {
    format!("{} from {}", question, clarification)
}

enum FilterStep {
    Ready(FilterRecord),
    Missing(String),
}

/// 过滤抽取的对话状态机：首轮允许一次"缺日期"哨兵触发澄清，
/// 澄清过后仍拿不到完整记录即为该请求的终态失败
async fn extract_filters(
    llm: &dyn CompletionService,
    gate: &Mutex<()>,
    question: &str,
    schema_text: &str,
    clarified: bool,
    max_tokens: u32,
) -> Result<FilterStep, PipelineError> {
    let prompt = compile_filter_prompt(question, schema_text);
    let raw = {
        // 模型句柄只允许单个占用者，排队通过闸门
        let _guard = gate.lock().await;
        llm.complete(&prompt, FILTER_STOP, max_tokens)
            .await
            .map_err(PipelineError::CompletionBackend)?
    };
    info!("模型原始输出: {}", raw);

    match parse_filter_completion(&raw)? {
        FilterOutcome::Filters(rec) => Ok(FilterStep::Ready(rec)),
        FilterOutcome::Missing(field) if clarified => {
            warn!("澄清一轮后模型仍报告缺少 {}", field);
            Err(PipelineError::MalformedCompletion { raw })
        }
        FilterOutcome::Missing(field) => Ok(FilterStep::Missing(field)),
    }
}

/// 单次请求的完整管线：建 schema 上下文 -> 编译提示词 -> 调补全服务 ->
/// 抽取结构 -> 解析日期 -> 拼装语句 -> 执行
#[instrument(skip(state, clarification), fields(question = %question))]
pub async fn process_question(
    state: Arc<AppState>,
    question: &str,
    clarification: Option<&str>,
) -> Result<QueryOutcome, PipelineError> {
    let effective = match clarification {
        Some(c) => combine_question(question, c),
        None => question.to_string(),
    };

    // 1. schema 上下文取自主数据源：全表名 -> 相关子集 -> 目录 -> 文本
    let primary = state
        .primary_source()
        .ok_or_else(|| PipelineError::Internal(anyhow::anyhow!("默认数据源未注册")))?;
    let all_tables = state.pool_manager.list_tables(&primary).await?;
    let relevant = pick_tables(&effective, &all_tables);
    info!("相关表: {:?}", relevant);
    let catalog = build_catalog(&state.pool_manager, &primary, Some(relevant.as_slice())).await?;
    let schema_text = render_schema_text(&catalog);

    match state.mode {
        QueryMode::Freeform => {
            let prompt = compile_sql_prompt(&effective, &schema_text);
            let raw = {
                let _guard = state.llm_gate.lock().await;
                state
                    .llm
                    .complete(&prompt, SQL_STOP, state.max_tokens)
                    .await
                    .map_err(PipelineError::CompletionBackend)?
            };
            info!("模型原始输出: {}", raw);
            let statement = extract_sql_statement(&raw);
            ensure_select(&statement)?;

            let pool = state.pool_manager.get_or_create_pool(&primary).await?;
            let rows = db::run_query(&pool, &statement, &[])
                .await
                .map_err(PipelineError::StatementExecution)?;
            info!("执行完成，返回 {} 行", rows.len());
            Ok(QueryOutcome::Answer {
                filters: None,
                sql: statement,
                rows,
            })
        }
        QueryMode::Filters => {
            let step = extract_filters(
                state.llm.as_ref(),
                &state.llm_gate,
                &effective,
                &schema_text,
                clarification.is_some(),
                state.max_tokens,
            )
            .await?;
            let mut record = match step {
                FilterStep::Ready(rec) => rec,
                FilterStep::Missing(field) => {
                    return Ok(QueryOutcome::NeedClarification { missing: field })
                }
            };

            // 2. 日期短语改写为绝对区间；同一次请求只取一次"现在"
            let anchor = Local::now();
            let range = resolve_range(&record.start_date, Some(record.end_date.as_str()), anchor)?;
            record.start_date = range.start_sql();
            record.end_date = range.end_sql();
            info!("解析后的时间区间: {} ~ {}", record.start_date, record.end_date);

            // 3. 按来源系统路由到注册的数据源，未注册的来源走主源
            let source = state
                .source_for(record.source_system.as_str())
                .ok_or_else(|| PipelineError::Internal(anyhow::anyhow!("数据源未注册")))?;
            let flavor = SqlFlavor::from_db_type(&source.db_type)
                .ok_or_else(|| PipelineError::Internal(anyhow::anyhow!("Unsupported DB type")))?;
            let (sql, binds) = build_order_query(&record, &range, flavor);

            let pool = state.pool_manager.get_or_create_pool(&source).await?;
            let rows = db::run_query(&pool, &sql, &binds)
                .await
                .map_err(PipelineError::StatementExecution)?;
            info!("执行完成，返回 {} 行", rows.len());
            Ok(QueryOutcome::Answer {
                filters: Some(record),
                sql,
                rows,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::filters::{OrderAction, OrderStatus, SourceSystem};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    struct MockLlm(&'static str);

    #[async_trait]
    impl CompletionService for MockLlm {
        async fn complete(
            &self,
            _prompt: &str,
            _stop: &[&str],
            _max_tokens: u32,
        ) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    const FULL: &str = r#"{"source_system":"SDP_OA","order_type":"ALL","order_status":"In progress","order_action":"change","start_date":"last 5 hours","end_date":"now"}"#;

    #[test]
    fn clarification_is_appended_with_from() {
        assert_eq!(
            combine_question("hello i want orders which are cancelled", "january"),
            "hello i want orders which are cancelled from january"
        );
    }

    #[tokio::test]
    async fn first_round_missing_requests_clarification() {
        let llm = MockLlm(r#"{"missing": "start_date"}"#);
        let gate = Mutex::new(());
        match extract_filters(&llm, &gate, "q", "", false, 256).await.unwrap() {
            FilterStep::Missing(f) => assert_eq!(f, "start_date"),
            FilterStep::Ready(_) => panic!("首轮不应直接解析出完整记录"),
        }
    }

    #[tokio::test]
    async fn clarified_round_resolves_record() {
        let llm = MockLlm(FULL);
        let gate = Mutex::new(());
        match extract_filters(&llm, &gate, "q from last 5 hours", "", true, 256)
            .await
            .unwrap()
        {
            FilterStep::Ready(rec) => {
                assert_eq!(rec.source_system, SourceSystem::SdpOa);
                assert_eq!(rec.order_status, OrderStatus::InProgress);
                assert_eq!(rec.order_action, OrderAction::Change);
                assert_eq!(rec.start_date, "last 5 hours");
            }
            FilterStep::Missing(_) => panic!("完整记录被误判为缺字段"),
        }
    }

    #[tokio::test]
    async fn second_missing_is_terminal() {
        let llm = MockLlm(r#"{"missing": "start_date"}"#);
        let gate = Mutex::new(());
        assert!(matches!(
            extract_filters(&llm, &gate, "q", "", true, 256).await,
            Err(PipelineError::MalformedCompletion { .. })
        ));
    }

    #[tokio::test]
    async fn relative_scenario_resolves_against_anchor() {
        // 抽取与日期解析的衔接：last 5 hours 命中快速路径
        let llm = MockLlm(FULL);
        let gate = Mutex::new(());
        let rec = match extract_filters(&llm, &gate, "q", "", false, 256).await.unwrap() {
            FilterStep::Ready(rec) => rec,
            FilterStep::Missing(_) => panic!("完整记录被误判为缺字段"),
        };
        let anchor = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let range = resolve_range(&rec.start_date, Some(rec.end_date.as_str()), anchor).unwrap();
        assert_eq!(range.end, anchor.naive_utc());
        assert_eq!(range.end - range.start, chrono::Duration::hours(5));
    }
}
