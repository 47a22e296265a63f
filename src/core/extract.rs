use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::core::error::PipelineError;
use crate::models::filters::{FilterRecord, OrderAction, OrderStatus, SourceSystem};

/// 一次补全调用抽取出的结果：完整的过滤意图，或"缺少字段"哨兵
#[derive(Debug)]
pub enum FilterOutcome {
    Filters(FilterRecord),
    Missing(String),
}

/// 把模型的原始回答解析为结构化过滤记录。
/// 模型是不可信的文本源：JSON 解析与枚举校验都必须显式通过，失败即报错。
pub fn parse_filter_completion(raw: &str) -> Result<FilterOutcome, PipelineError> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|_| PipelineError::MalformedCompletion {
            raw: raw.to_string(),
        })?;

    // 哨兵形态 {"missing": "start_date"}
    if let Some(missing) = value.get("missing").and_then(Value::as_str) {
        debug!("模型报告缺少字段: {}", missing);
        return Ok(FilterOutcome::Missing(missing.to_string()));
    }

    let field = |key: &str| value.get(key).and_then(Value::as_str).map(str::trim);

    let source_system = match field("source_system") {
        Some(v) if !v.is_empty() => SourceSystem::parse(v)?,
        _ => SourceSystem::Eon,
    };
    let order_status = match field("order_status") {
        Some(v) if !v.is_empty() => OrderStatus::parse(v)?,
        _ => OrderStatus::All,
    };
    let order_action = match field("order_action") {
        Some(v) if !v.is_empty() => OrderAction::parse(v)?,
        _ => OrderAction::All,
    };

    // start_date 是必填项：模型偶尔不给哨兵而是直接漏掉字段，同样走澄清一轮
    let start_date = match field("start_date") {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => return Ok(FilterOutcome::Missing("start_date".to_string())),
    };
    let end_date = match field("end_date") {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => "now".to_string(),
    };

    Ok(FilterOutcome::Filters(FilterRecord {
        source_system,
        order_type: "ALL".to_string(), // 该字段按约定恒为 ALL
        order_status,
        order_action,
        start_date,
        end_date,
    }))
}

/// 从模型的自由回答里剥出第一条可执行语句。
/// 去掉 markdown 代码围栏后按关键字 + 分号扫描；扫不到就原样返回，
/// 由调用方在执行前再做合法性把关。
pub fn extract_sql_statement(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```sql") {
        text = rest.trim_start();
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest.trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }

    let pattern = Regex::new(r"(?is)(SELECT|INSERT|UPDATE|DELETE).*?;").unwrap();
    match pattern.find(text) {
        Some(m) => m.as_str().trim().to_string(),
        None => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_record_is_parsed_and_typed() {
        let raw = r#"{
            "source_system": "SALESFORCE",
            "order_type": "ALL",
            "order_status": "complete",
            "order_action": "Install",
            "start_date": "January 2024",
            "end_date": "February 2024"
        }"#;
        match parse_filter_completion(raw).unwrap() {
            FilterOutcome::Filters(rec) => {
                assert_eq!(rec.source_system, SourceSystem::Salesforce);
                assert_eq!(rec.order_status, OrderStatus::Complete);
                assert_eq!(rec.order_action, OrderAction::Install);
                assert_eq!(rec.order_type, "ALL");
                assert_eq!(rec.start_date, "January 2024");
                assert_eq!(rec.end_date, "February 2024");
            }
            other => panic!("意外的结果: {other:?}"),
        }
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let raw = r#"{"start_date": "last week"}"#;
        match parse_filter_completion(raw).unwrap() {
            FilterOutcome::Filters(rec) => {
                assert_eq!(rec.source_system, SourceSystem::Eon);
                assert_eq!(rec.order_status, OrderStatus::All);
                assert_eq!(rec.order_action, OrderAction::All);
                assert_eq!(rec.end_date, "now");
            }
            other => panic!("意外的结果: {other:?}"),
        }
    }

    #[test]
    fn missing_sentinel_is_detected() {
        let raw = r#"{"missing": "start_date"}"#;
        assert!(matches!(
            parse_filter_completion(raw).unwrap(),
            FilterOutcome::Missing(f) if f == "start_date"
        ));
    }

    #[test]
    fn absent_start_date_behaves_like_sentinel() {
        let raw = r#"{"source_system": "SWIFT", "order_status": "entered"}"#;
        assert!(matches!(
            parse_filter_completion(raw).unwrap(),
            FilterOutcome::Missing(f) if f == "start_date"
        ));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            parse_filter_completion("Sure! Here are your filters:"),
            Err(PipelineError::MalformedCompletion { .. })
        ));
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        let raw = r#"{"order_status": "exploded", "start_date": "yesterday"}"#;
        match parse_filter_completion(raw).unwrap_err() {
            PipelineError::UnknownEnumValue { field, value } => {
                assert_eq!(field, "order_status");
                assert_eq!(value, "exploded");
            }
            other => panic!("意外的错误分类: {other:?}"),
        }
    }

    #[test]
    fn enum_matching_ignores_case() {
        let raw = r#"{"source_system": "salesforce", "order_status": "COMPLETE", "start_date": "yesterday"}"#;
        match parse_filter_completion(raw).unwrap() {
            FilterOutcome::Filters(rec) => {
                assert_eq!(rec.source_system, SourceSystem::Salesforce);
                assert_eq!(rec.order_status, OrderStatus::Complete);
            }
            other => panic!("意外的结果: {other:?}"),
        }
    }

    #[test]
    fn fenced_and_bare_statements_extract_identically() {
        let bare = "SELECT id FROM orders WHERE x = 1;";
        let fenced = format!("```sql\n{bare}\n```");
        assert_eq!(extract_sql_statement(bare), extract_sql_statement(&fenced));
    }

    #[test]
    fn leading_prose_is_skipped() {
        let raw = "Here is the query you asked for:\nSELECT count(*) FROM orders;";
        assert_eq!(extract_sql_statement(raw), "SELECT count(*) FROM orders;");
    }

    #[test]
    fn unterminated_text_is_returned_as_is() {
        let raw = "```\nSELECT id FROM orders\n```";
        assert_eq!(extract_sql_statement(raw), "SELECT id FROM orders");
    }
}
