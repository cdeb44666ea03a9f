//! チャット補完クライアント

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ReplyError;
use crate::config::AppConfig;

/// 1回分の補完リクエスト
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// システムプロンプト（ペルソナ）
    pub system: String,
    /// ユーザー発話（コメント本文）
    pub user: String,
    pub temperature: f32,
}

/// チャット補完クライアントトレイト
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// 補完を1回実行して応答テキストを返す
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ReplyError>;

    /// クライアント名を取得
    fn name(&self) -> &'static str;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI互換 `/v1/chat/completions` クライアント
pub struct OpenAiCompletionClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompletionClient {
    /// 新しいインスタンスを作成
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReplyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// 設定から作成
    pub fn from_config(config: &AppConfig) -> Result<Self, ReplyError> {
        Self::new(
            config.api_key().unwrap_or_default(),
            config.api_base_url.clone(),
            config.model.clone(),
            Duration::from_secs(config.request_timeout_secs.max(1)),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

/// 補完レスポンスの本文から応答テキストを取り出す
pub fn extract_reply(body: &str) -> Result<String, ReplyError> {
    let response: ChatCompletionResponse = serde_json::from_str(body)?;
    let reply = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default();

    if reply.is_empty() {
        return Err(ReplyError::EmptyResponse);
    }
    Ok(reply)
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ReplyError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
        };

        tracing::debug!(model = %self.model, "📡 補完リクエスト送信");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        match status.as_u16() {
            200..=299 => extract_reply(&text),
            401 | 403 => Err(ReplyError::Auth {
                status: status.as_u16(),
            }),
            429 => Err(ReplyError::Quota(text)),
            code => Err(ReplyError::Status { status: code, body: text }),
        }
    }

    fn name(&self) -> &'static str {
        "OpenAI"
    }
}
