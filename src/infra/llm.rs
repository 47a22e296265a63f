use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// 文本补全服务的能力接口。
/// 管线只依赖这个 trait：给定提示词、停止标记和长度上限，换回续写文本。
/// 服务端故障 (超时、模型未加载) 属于基础设施错误，与管线的错误分类无关。
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str, stop: &[&str], max_tokens: u32)
        -> anyhow::Result<String>;
}

/// llama.cpp server 的 /completion 接口客户端。
/// 进程启动时构造一次，放进应用状态共享；并发访问由上层的互斥闸门排队。
pub struct LlamaServerClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

impl LlamaServerClient {
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CompletionService for LlamaServerClient {
    async fn complete(
        &self,
        prompt: &str,
        stop: &[&str],
        max_tokens: u32,
    ) -> anyhow::Result<String> {
        let url = format!("{}/completion", self.base_url);
        debug!("调用补全服务: {} (n_predict={})", url, max_tokens);

        let resp = self
            .client
            .post(&url)
            .json(&json!({
                "prompt": prompt,
                "n_predict": max_tokens,
                "stop": stop,
                "temperature": 0.2,
                "top_p": 0.9,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("补全服务返回 {}: {}", status, body);
        }

        let parsed: CompletionResponse = resp.json().await?;
        Ok(parsed.content.trim().to_string())
    }
}
