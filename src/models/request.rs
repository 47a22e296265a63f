use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String, // 用户提问内容
    /// 首轮回答缺少日期时，客户端补发的日期/时间短语
    #[serde(default)]
    pub clarification: Option<String>,
}
