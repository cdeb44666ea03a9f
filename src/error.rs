//! アプリケーション全体のエラー型

use thiserror::Error;

use crate::reply::ReplyError;
use crate::watcher::WatchError;

/// aivc の集約エラー型
#[derive(Debug, Error)]
pub enum AivcError {
    /// 必須設定の欠落（APIキー・パスなど）
    #[error("設定エラー: {0}")]
    Config(String),

    /// ログフォルダ/ファイルの入出力失敗
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// 応答生成の失敗
    #[error(transparent)]
    Remote(#[from] ReplyError),
}

impl AivcError {
    /// 設定エラーを作成
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type AivcResult<T> = Result<T, AivcError>;
