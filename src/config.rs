//! アプリケーション設定管理モジュール
//!
//! XDGディレクトリを使用した設定ファイルの永続化と管理を提供します。
//! 実行中のセッションは開始時点のスナップショット（`Arc<AppConfig>`）だけを参照し、
//! ここでの保存・変更はセッションに反映されません。

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// ログ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// カスタムログディレクトリ（Noneの場合はXDGデフォルト使用）
    pub log_dir: Option<PathBuf>,
    /// ログレベル (trace/debug/info/warn/error)
    pub log_level: String,
    /// ファイル出力有効化
    pub enable_file_logging: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            log_level: "info".to_string(),
            enable_file_logging: false,
        }
    }
}

/// アプリケーション設定
///
/// フォームの各項目に対応するフラットな設定レコード。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// コメントログのフォルダ
    pub log_folder_path: String,
    /// チャット補完APIキー
    pub api_key: String,

    /// ローカル音声合成で読み上げる
    pub use_local_tts: bool,
    /// ローカル音声合成の音声名
    pub selected_voice: String,
    /// ローカル音声合成の話速
    pub speech_rate: u32,

    /// 声質変換エンジンで読み上げる
    pub use_voice_conversion: bool,
    /// 再生に使う出力デバイス名（空ならデフォルト）
    pub output_device: String,
    /// 声質変換エンジンの実行ファイル
    pub engine_executable_path: String,
    /// 声質変換エンジンのURL
    pub engine_url: String,
    /// 声質変換モデルファイル
    pub model_path: String,
    /// 声質変換インデックスファイル（任意）
    pub index_path: String,
    /// ピッチ補正（半音）
    pub pitch: i32,

    /// ペルソナプロンプトファイル（空なら組み込みのペルソナ）
    pub persona_prompt_path: String,
    /// キャラクター表示名
    pub character_name: String,
    /// 反応キーワード（空なら全コメントに反応）
    pub keywords: Vec<String>,

    /// チャット補完モデル
    pub model: String,
    /// チャット補完APIのベースURL
    pub api_base_url: String,
    /// サンプリング温度
    pub temperature: f32,
    /// 補完リクエストのタイムアウト（秒）
    pub request_timeout_secs: u64,

    /// 応答を追記するテキストファイル
    pub transcript_path: String,
    /// 合成音声ファイルの出力先
    pub artifacts_dir: String,
    /// ログ監視のポーリング間隔（ミリ秒）
    pub poll_interval_ms: u64,

    /// ログ設定
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_folder_path: String::new(),
            api_key: String::new(),
            use_local_tts: false,
            selected_voice: String::new(),
            speech_rate: 180,
            use_voice_conversion: false,
            output_device: String::new(),
            engine_executable_path: String::new(),
            engine_url: "http://127.0.0.1:50021".to_string(),
            model_path: String::new(),
            index_path: String::new(),
            pitch: 0,
            persona_prompt_path: String::new(),
            character_name: "Aki".to_string(),
            keywords: Vec::new(),
            model: "gpt-4".to_string(),
            api_base_url: "https://api.openai.com".to_string(),
            temperature: 0.9,
            request_timeout_secs: 60,
            transcript_path: "output.txt".to_string(),
            artifacts_dir: "voice_output".to_string(),
            poll_interval_ms: 500,
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// 前後の空白を除いたAPIキー
    pub fn api_key(&self) -> Option<&str> {
        let key = self.api_key.trim();
        (!key.is_empty()).then_some(key)
    }

    /// 空文字列を未設定として扱うパス
    pub fn optional_path(value: &str) -> Option<&Path> {
        let value = value.trim();
        (!value.is_empty()).then(|| Path::new(value))
    }

    pub fn output_device(&self) -> Option<&str> {
        let device = self.output_device.trim();
        (!device.is_empty()).then_some(device)
    }
}

/// 設定管理マネージャー
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// XDGディレクトリの設定ファイルを使う設定マネージャーを作成
    pub fn new() -> Result<Self> {
        Self::with_path(Self::default_config_path()?)
    }

    /// 指定パスの設定ファイルを使う設定マネージャーを作成
    pub fn with_path(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = config_path.into();

        // 設定ディレクトリを作成（存在しない場合）
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        Ok(Self { config_path })
    }

    /// XDGディレクトリに基づく設定ファイルパスを取得
    pub fn default_config_path() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("dev", "aivc", "aivc").context("Failed to get project directories")?;

        let config_file = project_dirs.config_dir().join("config.toml");
        debug!("Config file path: {}", config_file.display());

        Ok(config_file)
    }

    /// 設定を読み込み
    pub fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!(
                "Config file not found, using default settings: {}",
                self.config_path.display()
            );
            return Ok(AppConfig::default());
        }

        let config_content = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;

        let config: AppConfig = toml::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse config file: {}",
                self.config_path.display()
            )
        })?;

        info!(
            "✅ Configuration loaded from: {}",
            self.config_path.display()
        );

        Ok(config)
    }

    /// 設定を保存
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        let config_content =
            toml::to_string_pretty(config).context("Failed to serialize config")?;

        // 一時ファイルに書いてから置き換える
        let temp_path = self.config_path.with_extension("toml.tmp");
        fs::write(&temp_path, config_content)
            .with_context(|| format!("Failed to write config file: {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.config_path).with_context(|| {
            format!("Failed to replace config file: {}", self.config_path.display())
        })?;

        info!("💾 Configuration saved to: {}", self.config_path.display());

        Ok(())
    }

    /// 設定ファイルパスを取得
    pub fn config_file_path(&self) -> &Path {
        &self.config_path
    }

    /// 設定をリセット（デフォルト値に戻す）
    pub fn reset_config(&self) -> Result<()> {
        self.save_config(&AppConfig::default())?;
        info!("🔄 Configuration reset to defaults");
        Ok(())
    }

    /// 設定ファイルが存在するかチェック
    pub fn config_exists(&self) -> bool {
        self.config_path.exists()
    }
}
