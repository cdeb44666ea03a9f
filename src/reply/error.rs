//! 応答生成のエラー型

use thiserror::Error;

/// チャット補完呼び出しのエラー
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("HTTPリクエストに失敗しました: {0}")]
    Http(#[from] reqwest::Error),

    #[error("認証に失敗しました (ステータス {status})")]
    Auth { status: u16 },

    #[error("利用上限を超えました: {0}")]
    Quota(String),

    #[error("補完APIがエラーを返しました (ステータス {status}): {body}")]
    Status { status: u16, body: String },

    #[error("応答の形式が不正です: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("応答が空でした")]
    EmptyResponse,
}
