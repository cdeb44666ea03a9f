//! 応答生成
//!
//! ペルソナのシステムプロンプトとコメントからチャット補完を1回呼び出し、
//! 失敗時もプレースホルダ文字列を返してパイプラインを止めない。

pub mod client;
pub mod error;
pub mod gate;
pub mod persona;

use std::sync::Arc;

use crate::config::AppConfig;

pub use client::{CompletionClient, CompletionRequest, OpenAiCompletionClient};
pub use error::ReplyError;
pub use gate::{should_respond, KeywordGate};
pub use persona::{build_prompt, load_persona, DEFAULT_PERSONA};

/// エラー時プレースホルダの識別マーカー
pub const ERROR_MARKER: &str = "（エラー:";

/// エラーを表示用のプレースホルダ応答に変換
pub fn error_placeholder(error: &ReplyError) -> String {
    format!("{} {}）", ERROR_MARKER, error)
}

/// プレースホルダ応答かどうか
pub fn is_error_placeholder(reply: &str) -> bool {
    reply.starts_with(ERROR_MARKER)
}

/// ペルソナ付き応答生成器
#[derive(Clone)]
pub struct ReplyGenerator {
    client: Arc<dyn CompletionClient>,
    persona: String,
    temperature: f32,
}

impl ReplyGenerator {
    /// 新しいインスタンスを作成
    pub fn new(client: Arc<dyn CompletionClient>, persona: impl Into<String>) -> Self {
        Self {
            client,
            persona: persona.into(),
            temperature: 0.9,
        }
    }

    /// 設定からペルソナと温度を読み込んで作成
    pub fn from_config(config: &AppConfig, client: Arc<dyn CompletionClient>) -> Self {
        let persona = load_persona(
            AppConfig::optional_path(&config.persona_prompt_path),
            &config.character_name,
        );
        Self::new(client, persona).with_temperature(config.temperature)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// 応答を生成（エラーはそのまま返す）
    pub async fn try_generate_reply(
        &self,
        sender_name: &str,
        comment_text: &str,
    ) -> Result<String, ReplyError> {
        let request = CompletionRequest {
            system: build_prompt(&self.persona, sender_name),
            user: comment_text.to_string(),
            temperature: self.temperature,
        };

        let reply = self.client.complete(&request).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(ReplyError::EmptyResponse);
        }
        Ok(reply.to_string())
    }

    /// 応答を生成
    ///
    /// 失敗時は [`ERROR_MARKER`] で始まる空でないプレースホルダを返す。
    pub async fn generate_reply(&self, sender_name: &str, comment_text: &str) -> String {
        match self.try_generate_reply(sender_name, comment_text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("❌ {}で応答生成に失敗: {}", self.client.name(), e);
                error_placeholder(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct RecordingClient {
        reply: Result<String, u16>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionClient for RecordingClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, ReplyError> {
            self.requests.lock().push(request.clone());
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(status) => Err(ReplyError::Auth { status: *status }),
            }
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn generator(reply: Result<String, u16>) -> (ReplyGenerator, Arc<RecordingClient>) {
        let client = Arc::new(RecordingClient {
            reply,
            requests: Mutex::new(Vec::new()),
        });
        (ReplyGenerator::new(client.clone(), "persona"), client)
    }

    #[tokio::test]
    async fn test_generate_reply_success() {
        let (generator, client) = generator(Ok(" hello! ".to_string()));
        let reply = generator.generate_reply("Alice", "hi").await;
        assert_eq!(reply, "hello!");

        let requests = client.requests.lock();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system.starts_with("persona"));
        assert!(requests[0].system.contains("Alice"));
        assert_eq!(requests[0].user, "hi");
        assert_eq!(requests[0].temperature, 0.9);
    }

    #[tokio::test]
    async fn test_remote_failure_gives_placeholder() {
        let (generator, _client) = generator(Err(401));
        let reply = generator.generate_reply("Alice", "hi").await;
        assert!(!reply.is_empty());
        assert!(is_error_placeholder(&reply));
        assert!(reply.contains("401"));
    }

    #[tokio::test]
    async fn test_blank_reply_gives_placeholder() {
        let (generator, _client) = generator(Ok("   ".to_string()));
        let reply = generator.generate_reply("Alice", "hi").await;
        assert!(is_error_placeholder(&reply));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_gives_placeholder() {
        let client = OpenAiCompletionClient::new(
            "sk-test",
            "http://127.0.0.1:9",
            "gpt-4",
            std::time::Duration::from_secs(2),
        )
        .unwrap();
        let generator = ReplyGenerator::new(Arc::new(client), DEFAULT_PERSONA);
        let reply = generator.generate_reply("Alice", "hi").await;
        assert!(is_error_placeholder(&reply));
    }

    #[test]
    fn test_from_config_uses_character_name() {
        let (_, client) = generator(Ok(String::new()));
        let config = AppConfig {
            character_name: "Mio".to_string(),
            temperature: 0.3,
            ..AppConfig::default()
        };
        let generator = ReplyGenerator::from_config(&config, client);
        assert!(generator.persona().contains("『Mio』"));
        assert_eq!(generator.temperature, 0.3);
    }
}
