//! 声質変換エンジン起動ユーティリティ
//!
//! エンジンが応答しなければ実行ファイルを起動し、準備完了まで待つ。

use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::Mutex;
use std::time::Duration;

use super::error::SpeechError;

/// aivcが起動したプロセスを追跡
static LAUNCHED_ENGINES: Mutex<Vec<LaunchedEngine>> = Mutex::new(Vec::new());

/// 起動待ちの既定タイムアウト
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(60);

const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 起動したプロセス情報
struct LaunchedEngine {
    executable: PathBuf,
    child: Child,
}

/// エンジンのヘルスチェックURL
pub fn health_url(engine_url: &str) -> String {
    format!("{}/health", engine_url.trim_end_matches('/'))
}

/// エンジンが応答するか確認
pub async fn probe_engine(client: &reqwest::Client, engine_url: &str) -> bool {
    match client.get(health_url(engine_url)).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            tracing::debug!("🔍 エンジン未応答: {}", e);
            false
        }
    }
}

/// aivcが起動したエンジンがまだ動いているか
fn launched_engine_alive(executable: &Path) -> bool {
    if let Ok(mut engines) = LAUNCHED_ENGINES.lock() {
        engines.retain_mut(|e| matches!(e.child.try_wait(), Ok(None)));
        engines.iter().any(|e| e.executable == executable)
    } else {
        false
    }
}

/// エンジンを起動
/// - 作業ディレクトリは実行ファイルの親ディレクトリに設定
/// - 起動したプロセスを追跡リストに追加
pub fn launch_engine(executable: &Path) -> Result<(), SpeechError> {
    if !executable.exists() {
        return Err(SpeechError::Launch(format!(
            "実行ファイルが見つかりません: {}",
            executable.display()
        )));
    }

    let working_dir = executable
        .parent()
        .ok_or_else(|| SpeechError::Launch("無効なパスです".to_string()))?;

    tracing::info!("🚀 エンジンを起動: {}", executable.display());
    tracing::debug!("  作業ディレクトリ: {:?}", working_dir);

    let mut command = Command::new(executable);
    command.current_dir(working_dir);

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(0x08000000); // CREATE_NO_WINDOW
    }

    let child = command
        .spawn()
        .map_err(|e| SpeechError::Launch(format!("起動に失敗しました: {}", e)))?;

    if let Ok(mut engines) = LAUNCHED_ENGINES.lock() {
        engines.push(LaunchedEngine {
            executable: executable.to_path_buf(),
            child,
        });
        tracing::debug!("📝 プロセスを追跡リストに追加 (合計: {})", engines.len());
    }

    Ok(())
}

/// エンジンが応答するまで待つ
pub async fn wait_until_ready(
    client: &reqwest::Client,
    engine_url: &str,
    timeout: Duration,
) -> Result<(), SpeechError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if probe_engine(client, engine_url).await {
            tracing::info!("✅ エンジンの準備完了: {}", engine_url);
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(SpeechError::BackendUnavailable(format!(
                "{}秒以内にエンジンが応答しませんでした: {}",
                timeout.as_secs(),
                engine_url
            )));
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

/// エンジンを起動して準備完了まで待つ（既に応答するなら何もしない）
pub async fn ensure_engine_running(
    client: &reqwest::Client,
    executable: &Path,
    engine_url: &str,
    timeout: Duration,
) -> Result<(), SpeechError> {
    if probe_engine(client, engine_url).await {
        tracing::info!("✅ エンジンは既に起動中です: {}", engine_url);
        return Ok(());
    }

    if launched_engine_alive(executable) {
        tracing::info!("⏳ 起動済みのエンジンの準備を待っています");
    } else {
        launch_engine(executable)?;
    }

    wait_until_ready(client, engine_url, timeout).await
}

/// aivcが起動した全てのエンジンを終了する
pub fn terminate_launched_engines() {
    if let Ok(mut engines) = LAUNCHED_ENGINES.lock() {
        for e in engines.iter_mut() {
            tracing::info!("🛑 {}を終了中...", e.executable.display());
            match e.child.kill() {
                Ok(()) => {
                    let _ = e.child.wait(); // ゾンビプロセス防止
                    tracing::info!("✅ {}を終了しました", e.executable.display());
                }
                Err(err) => {
                    tracing::warn!("⚠️ {}の終了に失敗: {}", e.executable.display(), err);
                }
            }
        }
        engines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_url() {
        assert_eq!(
            health_url("http://127.0.0.1:50021/"),
            "http://127.0.0.1:50021/health"
        );
    }

    #[test]
    fn test_launch_missing_executable() {
        let err = launch_engine(Path::new("/definitely/not/here/engine")).unwrap_err();
        assert!(matches!(err, SpeechError::Launch(_)));
        assert!(!launched_engine_alive(Path::new("/definitely/not/here/engine")));
    }

    #[tokio::test]
    async fn test_wait_until_ready_times_out() {
        let client = reqwest::Client::new();
        let err = wait_until_ready(&client, "http://127.0.0.1:9", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::BackendUnavailable(_)));
    }
}
