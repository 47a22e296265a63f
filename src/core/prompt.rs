/// 过滤抽取提示词的停止标记：防止模型在给出 JSON 后继续编造下一轮对话
pub const FILTER_STOP: &[&str] = &["Input:", "Output:"];

/// 直接生成 SQL 时的停止标记
pub const SQL_STOP: &[&str] = &["</s>", "SQL:"];

/// 拼入提示词的 schema 文本上限，超出即截断，保证提示词尺寸有界
const MAX_SCHEMA_CHARS: usize = 4000;

/// 过滤抽取的固定指令块：字段规则、合法取值枚举、few-shot 示例。
/// 示例覆盖三种形态：全字段、默认值兜底、缺日期哨兵。
const FILTER_RULES: &str = r#"You are an assistant that extracts filters for querying orders from different source systems.

Extract the following fields in pure JSON with lowercase keys, no explanation or extra text:
- source_system (choose from the list below, default to "EON" if not mentioned)
- order_type (always set to "ALL")
- order_status (choose from list, default to "ALL")
- order_action (choose from list, default to "ALL")
- start_date (user-provided date/time as a natural phrase, like "last week" or "Jan 2023"; don't guess if missing)
- end_date (optional, default to "now")

Valid options:

source_system:
- EON
- PIPELINE
- SWIFT
- SALESFORCE
- SDP_FOA
- SDP_OA
- SDP_ORION
- SERVICENOW_ORDER
- VLOCITY_ORDER

order_status:
- ALL
- In progress
- entered
- cancelled
- complete
- rejected
- incomplete Entry
- hiberated activation

order_action:
- ALL
- Install
- disconnect
- change
- legacy

Rules:
- Always output date fields as natural phrases (e.g., "last 7 days", "March 1 to March 5")
- If any required field like start_date is missing, return: {"missing": "start_date"}
- Output compact JSON only

Examples:

Input: "Give me all completed install orders from SALESFORCE from Jan to Feb 2024"
Output: {"source_system":"SALESFORCE","order_type":"ALL","order_status":"complete","order_action":"Install","start_date":"January 2024","end_date":"February 2024"}

Input: "Show me in progress change orders from SDP_OA for the last 5 hours"
Output: {"source_system":"SDP_OA","order_type":"ALL","order_status":"In progress","order_action":"change","start_date":"last 5 hours","end_date":"now"}

Input: "hello i want orders which are cancelled"
Output: {"missing":"start_date"}"#;

/// 组装过滤抽取提示词：指令块 + 相关表的 schema 文本 + 用户提问，
/// 以 "Output:" 收尾引导模型直接吐 JSON
pub fn compile_filter_prompt(question: &str, schema_text: &str) -> String {
    format!(
        "{}\n\nSchema of the relevant tables:\n{}\n\nInput: \"{}\"\nOutput:\n",
        FILTER_RULES,
        bound_schema(schema_text),
        question
    )
}

/// 组装直接生成 SQL 的提示词 (freeform 模式)
pub fn compile_sql_prompt(question: &str, schema_text: &str) -> String {
    format!(
        "Generate an SQL query strictly based on the schema provided.\n\n\
         Schema:\n{}\n\n\
         Question:\n{}\n\n\
         Only output SQL code. Do not output any explanation or additional text.\nSQL:",
        bound_schema(schema_text),
        question
    )
}

fn bound_schema(schema_text: &str) -> String {
    if schema_text.len() <= MAX_SCHEMA_CHARS {
        return schema_text.to_string();
    }
    let mut cut = MAX_SCHEMA_CHARS;
    while !schema_text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n  [schema truncated]", &schema_text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_prompt_carries_question_and_enums() {
        let p = compile_filter_prompt("orders from SWIFT yesterday", "Table: orders");
        assert!(p.contains("orders from SWIFT yesterday"));
        assert!(p.contains("SERVICENOW_ORDER"));
        assert!(p.contains("hiberated activation"));
        assert!(p.contains(r#"{"missing": "start_date"}"#));
        assert!(p.trim_end().ends_with("Output:"));
    }

    #[test]
    fn sql_prompt_carries_schema_and_cue() {
        let p = compile_sql_prompt("count orders", "Table: orders\n  - id (int)");
        assert!(p.contains("Table: orders"));
        assert!(p.contains("count orders"));
        assert!(p.trim_end().ends_with("SQL:"));
    }

    #[test]
    fn oversized_schema_is_truncated() {
        let big = "x".repeat(MAX_SCHEMA_CHARS * 2);
        let p = compile_filter_prompt("q", &big);
        assert!(p.contains("[schema truncated]"));
        assert!(p.len() < big.len());
    }
}
