use aivc::{
    config::{AppConfig, ConfigManager},
    speech::{artifacts, launcher, list_output_devices, EspeakEngine, SpeechEngine},
    utils, Controller, Transcript,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// AIVC - 配信コメントにAIキャラクターが音声で応答する
#[derive(Parser, Debug)]
#[command(name = "aivc", version, about)]
struct Cli {
    /// 設定ファイルのパス（省略時はXDGデフォルト）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// コメントログを監視して応答する（Ctrl+Cで停止）
    Run {
        /// コメントログのフォルダ
        #[arg(long)]
        folder: Option<String>,
        /// チャット補完APIキー
        #[arg(long)]
        api_key: Option<String>,
    },
    /// テキストを読み上げる
    Say {
        text: String,
    },
    /// 設定を表示・管理する
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// ローカル音声合成の音声一覧
    Voices,
    /// 音声出力デバイス一覧
    Devices,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// 現在の設定を表示
    Show,
    /// 設定ファイルのパスを表示
    Path,
    /// 設定をデフォルトに戻す
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path)?,
        None => ConfigManager::new()?,
    };
    let config = config_manager.load_config().unwrap_or_else(|e| {
        eprintln!("設定読み込みエラー、デフォルト設定を使用: {:#}", e);
        AppConfig::default()
    });

    let _log_guard = utils::init_logging(&config.log)?;

    match cli.command {
        Command::Run { folder, api_key } => {
            let mut config = config;
            if let Some(folder) = folder {
                config.log_folder_path = folder;
            }
            if let Some(api_key) = api_key {
                config.api_key = api_key;
            }
            run(config_manager, config).await
        }
        Command::Say { text } => say(config, &text).await,
        Command::Config { action } => config_command(&config_manager, &config, action),
        Command::Voices => {
            let voices = tokio::task::spawn_blocking(|| EspeakEngine::default().voices())
                .await
                .context("音声一覧の取得タスクが失敗しました")??;
            for voice in voices {
                println!("{}\t{}\t{}", voice.id, voice.name, voice.language);
            }
            Ok(())
        }
        Command::Devices => {
            for device in list_output_devices()? {
                println!("{}", device);
            }
            Ok(())
        }
    }
}

/// 監視セッションを実行
async fn run(config_manager: ConfigManager, config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("🎬 Starting aivc comment responder");

    housekeeping(&config);

    let (transcript, mut entries) = Transcript::new();
    let transcript = transcript.with_file(&config.transcript_path);
    let printer = tokio::spawn(async move {
        while let Some(entry) = entries.recv().await {
            println!("{}", entry);
        }
    });

    let controller = Controller::new(transcript).with_config_manager(config_manager);

    let result = match controller.start(config).await {
        Ok(outcome) => {
            tracing::info!("▶️ {:?}", outcome);
            let mut status = controller.subscribe_status();
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => tracing::info!("🛑 終了シグナルを受信しました"),
                        Err(e) => tracing::error!("❌ シグナル待機に失敗しました: {}", e),
                    }
                }
                _ = status.wait_for(|state| *state == aivc::SessionState::Idle) => {
                    tracing::warn!("⚠️ 監視セッションが終了しました");
                }
            }
            Ok(())
        }
        Err(e) => Err(anyhow::Error::from(e).context("監視を開始できませんでした")),
    };

    let outstanding = controller.stop().await;
    if outstanding > 0 {
        tracing::info!("⏳ 実行中のタスクの完了を待っています: {}件", outstanding);
    }
    controller.wait_idle().await;
    launcher::terminate_launched_engines();

    drop(controller);
    let _ = printer.await;

    tracing::info!("👋 aivc shutting down");
    result
}

/// 手動入力テキストを読み上げ
async fn say(config: AppConfig, text: &str) -> anyhow::Result<()> {
    housekeeping(&config);

    let (transcript, mut entries) = Transcript::new();
    let controller = Controller::new(transcript);

    let launched = controller.speak(&config, text);
    tracing::debug!("🔊 読み上げタスク: {}件", launched);
    controller.wait_idle().await;
    launcher::terminate_launched_engines();

    drop(controller);
    while let Some(entry) = entries.recv().await {
        println!("{}", entry);
    }
    Ok(())
}

fn config_command(
    config_manager: &ConfigManager,
    config: &AppConfig,
    action: ConfigAction,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let mut shown = config.clone();
            if !shown.api_key.is_empty() {
                shown.api_key = "********".to_string();
            }
            print!("{}", toml::to_string_pretty(&shown)?);
        }
        ConfigAction::Path => println!("{}", config_manager.config_file_path().display()),
        ConfigAction::Reset => {
            config_manager.reset_config()?;
            println!("設定をリセットしました: {}", config_manager.config_file_path().display());
        }
    }
    Ok(())
}

/// 前回の実行で残った音声ファイルを削除
fn housekeeping(config: &AppConfig) {
    let dir = Path::new(config.artifacts_dir.trim());
    if dir.as_os_str().is_empty() {
        return;
    }
    artifacts::remove_stray_artifacts(dir);
}
