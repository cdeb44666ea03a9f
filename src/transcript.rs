//! 表示用トランスクリプトと応答ログファイル
//!
//! 複数のタスクから同時に追記される。1件のエントリは1メッセージとして
//! チャネルに送られるため、表示側で行が混ざることはない。

use parking_lot::Mutex;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// トランスクリプト行の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// 状態通知
    Status,
    /// 受信コメント
    Comment,
    /// 生成された応答
    Reply,
    /// 警告（処理は継続）
    Warning,
    /// エラー
    Error,
}

impl EntryKind {
    /// 行頭の識別マーカー
    pub fn marker(self) -> &'static str {
        match self {
            EntryKind::Status => "📄",
            EntryKind::Comment => "💬",
            EntryKind::Reply => "🤖",
            EntryKind::Warning => "⚠️",
            EntryKind::Error => "❌",
        }
    }
}

/// トランスクリプトの1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub kind: EntryKind,
    pub text: String,
}

impl fmt::Display for TranscriptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.marker(), self.text)
    }
}

/// 応答の追記先ファイル
#[derive(Debug)]
struct TranscriptFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TranscriptFile {
    fn append(&self, text: &str) -> std::io::Result<()> {
        let _guard = self.lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(text.as_bytes())
    }
}

/// トランスクリプト送信ハンドル
#[derive(Debug, Clone)]
pub struct Transcript {
    sender: mpsc::UnboundedSender<TranscriptEntry>,
    file: Option<Arc<TranscriptFile>>,
}

impl Transcript {
    /// 新しいトランスクリプトと表示側の受信端を作成
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TranscriptEntry>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender, file: None }, receiver)
    }

    /// 応答をファイルにも追記する
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(Arc::new(TranscriptFile {
            path: path.into(),
            lock: Mutex::new(()),
        }));
        self
    }

    /// エントリを追加
    pub fn push(&self, kind: EntryKind, text: impl Into<String>) {
        let entry = TranscriptEntry {
            kind,
            text: text.into(),
        };
        match kind {
            EntryKind::Error => tracing::error!("{}", entry),
            EntryKind::Warning => tracing::warn!("{}", entry),
            _ => tracing::debug!("{}", entry),
        }
        if self.sender.send(entry).is_err() {
            tracing::debug!("トランスクリプトの表示側が閉じています");
        }
    }

    pub fn status(&self, text: impl Into<String>) {
        self.push(EntryKind::Status, text);
    }

    pub fn comment(&self, text: impl Into<String>) {
        self.push(EntryKind::Comment, text);
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.push(EntryKind::Warning, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.push(EntryKind::Error, text);
    }

    /// 応答を表示し、ファイルにも記録する
    pub fn reply(&self, character: &str, reply: &str) {
        let line = format!("{}: {}", character, reply);

        if let Some(file) = &self.file {
            if let Err(e) = file.append(&format!("{}\n\n", line)) {
                self.error(format!(
                    "応答ファイルへの書き込みに失敗: {}: {}",
                    file.path.display(),
                    e
                ));
            }
        }

        self.push(EntryKind::Reply, line);
    }
}
