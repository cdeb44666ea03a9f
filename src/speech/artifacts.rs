//! 合成音声ファイルの管理

use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::error::SpeechError;

/// 合成音声ファイル名の接頭辞
pub const ARTIFACT_PREFIX: &str = "voice_";

/// 新しい合成音声ファイルのパスを払い出す
pub fn new_artifact_path(dir: &Path) -> Result<PathBuf, SpeechError> {
    std::fs::create_dir_all(dir)?;
    Ok(dir.join(format!("{}{}.wav", ARTIFACT_PREFIX, Uuid::new_v4().simple())))
}

/// 前回の実行で残った合成音声ファイルを削除する
///
/// 失敗はログに残すだけで、削除できた件数を返す。
pub fn remove_stray_artifacts(dir: &Path) -> usize {
    if !dir.is_dir() {
        return 0;
    }

    let pattern = format!(
        "{}/{}*.wav",
        glob::Pattern::escape(&dir.to_string_lossy()),
        ARTIFACT_PREFIX
    );

    let entries = match glob::glob(&pattern) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("⚠️ 削除対象の検索に失敗: {}", e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries {
        match entry {
            Ok(path) => match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!("🗑️ 残存ファイルを削除: {}", path.display());
                    removed += 1;
                }
                Err(e) => tracing::warn!("⚠️ {} の削除に失敗: {}", path.display(), e),
            },
            Err(e) => tracing::warn!("⚠️ 削除対象の読み取りに失敗: {}", e),
        }
    }

    if removed > 0 {
        tracing::info!("🧹 残存音声ファイルを{}件削除しました", removed);
    }
    removed
}
