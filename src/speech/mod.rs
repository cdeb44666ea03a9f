//! 音声読み上げ
//!
//! 応答テキストを有効なバックエンドそれぞれに独立したタスクとして振り分ける。
//! バックエンド同士はエンジンの状態を共有せず、片方の失敗はもう片方に影響しない。
//! バックエンド間、応答間の再生順序は保証しない（再生が重なることもある）。

pub mod artifacts;
pub mod backends;
pub mod engine;
pub mod error;
pub mod launcher;
pub mod playback;

use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::transcript::Transcript;

pub use backends::{
    LocalSynthesisBackend, SharedSpeechEngine, SharedVoiceConversion, SpeechBackend,
    VoiceConversionBackend, VoiceConversionSettings,
};
pub use engine::{EspeakEngine, SpeechEngine, VoiceInfo};
pub use error::SpeechError;
pub use playback::{list_output_devices, AudioOutput, RodioOutput};

/// 有効なバックエンドの組み合わせ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnabledBackends {
    pub local_synthesis: bool,
    pub voice_conversion: bool,
}

impl EnabledBackends {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            local_synthesis: config.use_local_tts,
            voice_conversion: config.use_voice_conversion,
        }
    }

    pub fn any(&self) -> bool {
        self.local_synthesis || self.voice_conversion
    }
}

/// 1件の読み上げ要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    text: Arc<str>,
    pub backends: EnabledBackends,
}

impl PlaybackRequest {
    /// 読み上げ可能なテキストが残らない場合は `None`
    pub fn new(text: &str, backends: EnabledBackends) -> Option<Self> {
        let text = sanitize_text(text);
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: Arc::from(text),
            backends,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// 読み上げ用にテキストを整える（URL除去・空白の圧縮）
pub fn sanitize_text(text: &str) -> String {
    static URL_PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    static WHITESPACE_PATTERN: OnceLock<regex::Regex> = OnceLock::new();

    let url_pattern =
        URL_PATTERN.get_or_init(|| regex::Regex::new(r"https?://\S+").expect("valid regex"));
    let whitespace_pattern =
        WHITESPACE_PATTERN.get_or_init(|| regex::Regex::new(r"\s+").expect("valid regex"));

    let text = url_pattern.replace_all(text, "");
    let text = whitespace_pattern.replace_all(&text, " ");
    text.trim().to_string()
}

/// 読み上げ振り分け
#[derive(Clone)]
pub struct SpeechRouter {
    local_synthesis: Option<Arc<dyn SpeechBackend>>,
    voice_conversion: Option<Arc<dyn SpeechBackend>>,
    transcript: Transcript,
}

impl SpeechRouter {
    /// バックエンドなしのルーターを作成
    pub fn new(transcript: Transcript) -> Self {
        Self {
            local_synthesis: None,
            voice_conversion: None,
            transcript,
        }
    }

    /// 設定で有効なバックエンドを組み立てる
    ///
    /// ローカルエンジンと声質変換バックエンドはプロセス全体で共有するものを使う。
    pub fn from_config(
        config: &AppConfig,
        engine: SharedSpeechEngine,
        voice_conversion: &SharedVoiceConversion,
        transcript: Transcript,
    ) -> Self {
        let mut router = Self::new(transcript);

        if config.use_local_tts {
            router = router.with_local_synthesis(Arc::new(LocalSynthesisBackend::new(
                engine,
                config.selected_voice.clone(),
                config.speech_rate,
            )));
        }

        if config.use_voice_conversion {
            router = router.with_voice_conversion(
                voice_conversion.backend(VoiceConversionSettings::from_config(config)),
            );
        }

        router
    }

    pub fn with_local_synthesis(mut self, backend: Arc<dyn SpeechBackend>) -> Self {
        self.local_synthesis = Some(backend);
        self
    }

    pub fn with_voice_conversion(mut self, backend: Arc<dyn SpeechBackend>) -> Self {
        self.voice_conversion = Some(backend);
        self
    }

    /// 有効なバックエンドごとに読み上げタスクを起動する
    ///
    /// 失敗はトランスクリプトに報告され、呼び出し元には伝播しない。
    pub fn dispatch(&self, request: &PlaybackRequest) -> Vec<JoinHandle<()>> {
        let targets = [
            (request.backends.local_synthesis, &self.local_synthesis),
            (request.backends.voice_conversion, &self.voice_conversion),
        ];

        let mut handles = Vec::new();
        for (enabled, backend) in targets {
            if !enabled {
                continue;
            }
            let Some(backend) = backend.clone() else {
                self.transcript
                    .warning("読み上げバックエンドが構成されていません");
                continue;
            };

            let text = request.text.clone();
            let transcript = self.transcript.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = backend.speak(&text).await {
                    transcript.error(format!("{}読み上げエラー: {}", backend.name(), e));
                }
            }));
        }
        handles
    }
}
