//! 音声バックエンド実装

pub mod local;
pub mod voice_conversion;

use async_trait::async_trait;

use super::error::SpeechError;

pub use local::{LocalSynthesisBackend, SharedSpeechEngine};
pub use voice_conversion::{
    HttpVoiceConverter, SharedVoiceConversion, VoiceConversionBackend, VoiceConversionSettings,
    VoiceConverter,
};

/// 音声バックエンドトレイト
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// テキストを読み上げ（再生完了まで待つ）
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;

    /// バックエンド名を取得
    fn name(&self) -> &'static str;
}
