use thiserror::Error;

/// 查询合成管线的错误分类。
/// 逐表的 schema 探测失败不在这里：它只降级为占位文本，不会中断请求。
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 模型输出无法按约定结构解析 (非法 JSON，或澄清一轮后仍缺字段)
    #[error("模型输出无法解析: {raw}")]
    MalformedCompletion { raw: String },

    /// 快速相对模式与模糊解析器都无法识别该日期短语
    #[error("无法解析日期短语: '{phrase}'")]
    UnresolvableDate { phrase: String },

    /// 抽取出的枚举字段不在固定取值范围内，禁止继续拼装语句
    #[error("字段 {field} 的取值 '{value}' 不在允许范围内")]
    UnknownEnumValue { field: &'static str, value: String },

    /// 数据库执行失败，原样上抛，不自动重试
    #[error("SQL 执行失败: {0}")]
    StatementExecution(#[source] sqlx::Error),

    /// 补全服务本身的故障 (超时、连接失败)，与管线分类区分开
    #[error("补全服务调用失败: {0}")]
    CompletionBackend(anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
