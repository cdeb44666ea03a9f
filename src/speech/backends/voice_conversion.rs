//! 声質変換バックエンド実装
//!
//! 初回の読み上げ時にエンジンの起動とクライアントの構築を一度だけ行い、
//! 以降は構築済みのクライアントを再利用する。

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::SpeechBackend;
use crate::config::AppConfig;
use crate::speech::artifacts;
use crate::speech::error::SpeechError;
use crate::speech::launcher;
use crate::speech::playback::AudioOutput;
use crate::utils::preview;

/// 変換リクエストのタイムアウト
const CONVERSION_TIMEOUT: Duration = Duration::from_secs(120);

/// 声質変換クライアントトレイト
#[async_trait]
pub trait VoiceConverter: Send + Sync {
    /// テキストを合成・変換して `output` に書き出す
    async fn synthesize_to_file(
        &self,
        text: &str,
        pitch: i32,
        output: &Path,
    ) -> Result<(), SpeechError>;
}

#[derive(Serialize)]
struct ConversionRequest<'a> {
    text: &'a str,
    model_path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    index_path: Option<&'a Path>,
    pitch: i32,
}

/// ローカルエンジンにHTTPで変換を依頼するクライアント
pub struct HttpVoiceConverter {
    client: reqwest::Client,
    engine_url: String,
    model_path: PathBuf,
    index_path: Option<PathBuf>,
}

impl HttpVoiceConverter {
    /// モデル・インデックスに紐づいたクライアントを作成
    pub fn new(
        engine_url: impl Into<String>,
        model_path: PathBuf,
        index_path: Option<PathBuf>,
    ) -> Result<Self, SpeechError> {
        let client = reqwest::Client::builder()
            .timeout(CONVERSION_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            engine_url: engine_url.into().trim_end_matches('/').to_string(),
            model_path,
            index_path,
        })
    }
}

#[async_trait]
impl VoiceConverter for HttpVoiceConverter {
    async fn synthesize_to_file(
        &self,
        text: &str,
        pitch: i32,
        output: &Path,
    ) -> Result<(), SpeechError> {
        let request = ConversionRequest {
            text,
            model_path: &self.model_path,
            index_path: self.index_path.as_deref(),
            pitch,
        };

        let response = self
            .client
            .post(format!("{}/tts", self.engine_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SpeechError::Connection(format!(
                "変換に失敗: ステータス {}",
                response.status()
            )));
        }

        let wav_bytes = response.bytes().await?;
        if wav_bytes.is_empty() {
            return Err(SpeechError::Synthesis("音声データが空です".to_string()));
        }
        tokio::fs::write(output, &wav_bytes).await?;

        Ok(())
    }
}

/// 声質変換バックエンドの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConversionSettings {
    pub engine_executable: Option<PathBuf>,
    pub engine_url: String,
    pub model_path: Option<PathBuf>,
    pub index_path: Option<PathBuf>,
    pub pitch: i32,
    pub output_device: Option<String>,
    pub artifacts_dir: PathBuf,
    /// エンジン起動待ちのタイムアウト
    pub ready_timeout: Duration,
}

impl VoiceConversionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            engine_executable: AppConfig::optional_path(&config.engine_executable_path)
                .map(Path::to_path_buf),
            engine_url: config.engine_url.clone(),
            model_path: AppConfig::optional_path(&config.model_path).map(Path::to_path_buf),
            index_path: AppConfig::optional_path(&config.index_path).map(Path::to_path_buf),
            pitch: config.pitch,
            output_device: config.output_device().map(str::to_string),
            artifacts_dir: PathBuf::from(&config.artifacts_dir),
            ready_timeout: launcher::DEFAULT_READY_TIMEOUT,
        }
    }
}

/// 声質変換バックエンド
pub struct VoiceConversionBackend {
    settings: VoiceConversionSettings,
    client: reqwest::Client,
    converter: OnceCell<Arc<dyn VoiceConverter>>,
    output: Arc<dyn AudioOutput>,
}

impl VoiceConversionBackend {
    /// 新しいインスタンスを作成（初期化は初回読み上げ時）
    pub fn new(settings: VoiceConversionSettings, output: Arc<dyn AudioOutput>) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
            converter: OnceCell::new(),
            output,
        }
    }

    /// 初期化済みのクライアントを使うインスタンスを作成
    pub fn with_converter(
        settings: VoiceConversionSettings,
        converter: Arc<dyn VoiceConverter>,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
            converter: OnceCell::new_with(Some(converter)),
            output,
        }
    }

    pub fn settings(&self) -> &VoiceConversionSettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.converter.initialized()
    }

    /// 一度だけ初期化してクライアントを返す
    ///
    /// 初期化中の呼び出しは完了を待ち、失敗は待っていた全員に返る。
    /// 失敗した場合は次の呼び出しで再試行する。
    async fn converter(&self) -> Result<Arc<dyn VoiceConverter>, SpeechError> {
        self.converter
            .get_or_try_init(|| self.initialize())
            .await
            .cloned()
    }

    async fn initialize(&self) -> Result<Arc<dyn VoiceConverter>, SpeechError> {
        let model_path = self
            .settings
            .model_path
            .clone()
            .ok_or_else(|| SpeechError::Config("モデルファイルが未設定です".to_string()))?;
        if !model_path.exists() {
            return Err(SpeechError::Config(format!(
                "モデルファイルが見つかりません: {}",
                model_path.display()
            )));
        }

        let executable = self
            .settings
            .engine_executable
            .as_deref()
            .ok_or_else(|| SpeechError::Config("エンジンの実行ファイルが未設定です".to_string()))?;

        tracing::info!("🔊 声質変換バックエンドを初期化中...");
        launcher::ensure_engine_running(
            &self.client,
            executable,
            &self.settings.engine_url,
            self.settings.ready_timeout,
        )
        .await?;

        let converter = HttpVoiceConverter::new(
            self.settings.engine_url.clone(),
            model_path,
            self.settings.index_path.clone(),
        )?;

        tracing::info!("✅ 声質変換バックエンド初期化完了");
        Ok(Arc::new(converter))
    }

    /// 音声を合成してファイルに書き出し、そのパスを返す
    pub async fn synthesize_and_queue(&self, text: &str, pitch: i32) -> Result<PathBuf, SpeechError> {
        let converter = self.converter().await?;
        let output = artifacts::new_artifact_path(&self.settings.artifacts_dir)?;

        if let Err(e) = converter.synthesize_to_file(text, pitch, &output).await {
            let _ = tokio::fs::remove_file(&output).await;
            return Err(e);
        }

        tracing::debug!(
            "🎵 音声ファイルを生成: {} ({})",
            output.display(),
            preview(text, 40)
        );
        Ok(output)
    }

    /// 設定された出力デバイスで再生し、再生後にファイルを削除する
    pub async fn play(&self, path: PathBuf) -> Result<(), SpeechError> {
        let output = self.output.clone();
        let device = self.settings.output_device.clone();
        let play_path = path.clone();

        let result = tokio::task::spawn_blocking(move || {
            output.play_file(&play_path, device.as_deref())
        })
        .await
        .map_err(|e| SpeechError::AudioOutput(format!("再生タスクエラー: {}", e)))
        .and_then(|r| r);

        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!("音声ファイルの削除に失敗: {}: {}", path.display(), e);
        }

        result
    }
}

/// 手動入力とログ監視で共有する声質変換バックエンド
///
/// 設定が同じ間は同じバックエンドを返すため、初期化の結果はどちらの経路からも見える。
pub struct SharedVoiceConversion {
    output: Arc<dyn AudioOutput>,
    current: Mutex<Option<Arc<VoiceConversionBackend>>>,
}

impl SharedVoiceConversion {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            current: Mutex::new(None),
        }
    }

    /// 設定に対応するバックエンドを取得（設定が変わった場合のみ作り直す）
    pub fn backend(&self, settings: VoiceConversionSettings) -> Arc<VoiceConversionBackend> {
        let mut current = self.current.lock();
        if let Some(backend) = current.as_ref().filter(|b| b.settings == settings) {
            return backend.clone();
        }

        if current.is_some() {
            tracing::debug!("🔄 声質変換の設定が変わったためバックエンドを作り直します");
        }
        let backend = Arc::new(VoiceConversionBackend::new(settings, self.output.clone()));
        *current = Some(backend.clone());
        backend
    }
}

#[async_trait]
impl SpeechBackend for VoiceConversionBackend {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        if text.is_empty() {
            return Ok(());
        }

        let path = self.synthesize_and_queue(text, self.settings.pitch).await?;
        self.play(path).await?;

        tracing::debug!("✅ 声質変換読み上げ完了");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "声質変換"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FakeConverter {
        calls: Mutex<Vec<(String, i32)>>,
    }

    #[async_trait]
    impl VoiceConverter for FakeConverter {
        async fn synthesize_to_file(
            &self,
            text: &str,
            pitch: i32,
            output: &Path,
        ) -> Result<(), SpeechError> {
            self.calls.lock().push((text.to_string(), pitch));
            tokio::fs::write(output, b"RIFF").await?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeOutput {
        played: Mutex<Vec<(PathBuf, Option<String>, bool)>>,
    }

    impl AudioOutput for FakeOutput {
        fn play_file(&self, path: &Path, device: Option<&str>) -> Result<(), SpeechError> {
            self.played
                .lock()
                .push((path.to_path_buf(), device.map(str::to_string), path.exists()));
            Ok(())
        }
    }

    fn settings(dir: &Path) -> VoiceConversionSettings {
        VoiceConversionSettings {
            engine_executable: None,
            engine_url: "http://127.0.0.1:9".to_string(),
            model_path: None,
            index_path: None,
            pitch: 4,
            output_device: Some("Virtual Cable".to_string()),
            artifacts_dir: dir.join("artifacts"),
            ready_timeout: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_speak_synthesizes_plays_and_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let converter = Arc::new(FakeConverter {
            calls: Mutex::new(Vec::new()),
        });
        let output = Arc::new(FakeOutput::default());
        let backend = VoiceConversionBackend::with_converter(
            settings(temp_dir.path()),
            converter.clone(),
            output.clone(),
        );

        backend.speak("こんにちは").await.unwrap();

        assert_eq!(converter.calls.lock()[0], ("こんにちは".to_string(), 4));
        let played = output.played.lock();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].1.as_deref(), Some("Virtual Cable"));
        assert!(played[0].2, "file must exist while playing");
        assert!(!played[0].0.exists(), "file is removed after playback");
    }

    #[tokio::test]
    async fn test_missing_model_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let backend = VoiceConversionBackend::new(
            settings(temp_dir.path()),
            Arc::new(FakeOutput::default()),
        );

        let err = backend.synthesize_and_queue("hi", 0).await.unwrap_err();
        assert!(matches!(err, SpeechError::Config(_)));
        assert!(!backend.is_initialized());
    }

    #[tokio::test]
    async fn test_missing_executable_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let model = temp_dir.path().join("voice.pth");
        std::fs::write(&model, b"model").unwrap();

        let mut settings = settings(temp_dir.path());
        settings.model_path = Some(model);
        let backend = VoiceConversionBackend::new(settings, Arc::new(FakeOutput::default()));

        let err = backend.speak("hi").await.unwrap_err();
        assert!(matches!(err, SpeechError::Config(_)));
    }

    #[tokio::test]
    async fn test_engine_launch_failure_is_reported_and_retried() {
        let temp_dir = TempDir::new().unwrap();
        let model = temp_dir.path().join("voice.pth");
        std::fs::write(&model, b"model").unwrap();

        let mut settings = settings(temp_dir.path());
        settings.model_path = Some(model);
        settings.engine_executable = Some(temp_dir.path().join("missing-engine"));
        let backend = VoiceConversionBackend::new(settings, Arc::new(FakeOutput::default()));

        for _ in 0..2 {
            let err = backend.speak("hi").await.unwrap_err();
            assert!(matches!(err, SpeechError::Launch(_)));
            assert!(!backend.is_initialized());
        }
    }

    #[test]
    fn test_shared_backend_is_reused_until_settings_change() {
        let temp_dir = TempDir::new().unwrap();
        let shared = SharedVoiceConversion::new(Arc::new(FakeOutput::default()));

        let first = shared.backend(settings(temp_dir.path()));
        let again = shared.backend(settings(temp_dir.path()));
        assert!(Arc::ptr_eq(&first, &again));

        let mut changed = settings(temp_dir.path());
        changed.pitch = 7;
        let rebuilt = shared.backend(changed.clone());
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.settings().pitch, 7);
        assert!(Arc::ptr_eq(&rebuilt, &shared.backend(changed)));
    }

    #[test]
    fn test_settings_from_config() {
        let config = AppConfig {
            model_path: "models/aki.pth".to_string(),
            index_path: " ".to_string(),
            pitch: -2,
            output_device: "Speakers".to_string(),
            ..AppConfig::default()
        };
        let settings = VoiceConversionSettings::from_config(&config);
        assert_eq!(settings.model_path, Some(PathBuf::from("models/aki.pth")));
        assert_eq!(settings.index_path, None);
        assert_eq!(settings.engine_executable, None);
        assert_eq!(settings.pitch, -2);
        assert_eq!(settings.output_device.as_deref(), Some("Speakers"));
    }
}
