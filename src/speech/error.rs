//! 音声バックエンド用エラー型

use thiserror::Error;

/// 音声バックエンドのエラー型
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("接続に失敗しました: {0}")]
    Connection(String),

    #[error("HTTPリクエストに失敗しました: {0}")]
    Http(#[from] reqwest::Error),

    #[error("音声出力エラー: {0}")]
    AudioOutput(String),

    #[error("音声デコードエラー: {0}")]
    AudioDecode(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("バックエンドが利用できません: {0}")]
    BackendUnavailable(String),

    #[error("エンジンの起動に失敗しました: {0}")]
    Launch(String),

    #[error("音声合成エラー: {0}")]
    Synthesis(String),

    #[error("ファイルI/Oエラー: {0}")]
    Io(#[from] std::io::Error),
}
