//! ローカル音声合成バックエンド実装

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use super::SpeechBackend;
use crate::speech::engine::SpeechEngine;
use crate::speech::error::SpeechError;
use crate::utils::preview;

/// 共有エンジンハンドル
///
/// 手動入力とログ監視の両方から使われるため、設定〜再生の一連の操作を
/// このロックで直列化する。
pub type SharedSpeechEngine = Arc<Mutex<Box<dyn SpeechEngine>>>;

/// 共有エンジンハンドルを作成
pub fn shared_engine(engine: impl SpeechEngine + 'static) -> SharedSpeechEngine {
    let engine: Box<dyn SpeechEngine> = Box::new(engine);
    Arc::new(Mutex::new(engine))
}

/// ローカル音声合成バックエンド
pub struct LocalSynthesisBackend {
    engine: SharedSpeechEngine,
    voice_name: String,
    rate: u32,
}

impl LocalSynthesisBackend {
    /// 新しいインスタンスを作成
    pub fn new(engine: SharedSpeechEngine, voice_name: impl Into<String>, rate: u32) -> Self {
        Self {
            engine,
            voice_name: voice_name.into(),
            rate,
        }
    }

    /// ロックを保持したまま話速・音声を設定して読み上げる（ブロッキング）
    fn speak_blocking(
        engine: &SharedSpeechEngine,
        voice_name: &str,
        rate: u32,
        text: &str,
    ) -> Result<(), SpeechError> {
        let mut engine = engine.lock();

        // 音声は毎回設定し直す（見つからなければ既定の音声）
        engine.set_rate(rate);
        let voice_id = if voice_name.is_empty() {
            None
        } else {
            let found = engine.voices()?.into_iter().find(|v| v.name == voice_name);
            if found.is_none() {
                tracing::warn!("⚠️ 音声が見つかりません、既定の音声を使います: {}", voice_name);
            }
            found.map(|v| v.id)
        };
        engine.set_voice(voice_id.as_deref());

        engine.say_and_wait(text)
    }
}

#[async_trait]
impl SpeechBackend for LocalSynthesisBackend {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        if text.is_empty() {
            return Ok(());
        }

        tracing::debug!("🔊 ローカル音声合成: {}", preview(text, 40));

        let engine = self.engine.clone();
        let voice_name = self.voice_name.clone();
        let rate = self.rate;
        let text = text.to_string();

        tokio::task::spawn_blocking(move || Self::speak_blocking(&engine, &voice_name, rate, &text))
            .await
            .map_err(|e| SpeechError::AudioOutput(format!("再生タスクエラー: {}", e)))??;

        tracing::debug!("✅ ローカル音声合成完了");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ローカル音声合成"
    }
}
