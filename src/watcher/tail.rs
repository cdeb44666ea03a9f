//! Daily log file resolution and tail-from-end reading.

use chrono::{Local, NaiveDate};
use std::fs::OpenOptions;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use super::WatchError;

/// Resolve today's (local time) log file inside `folder`, creating it if needed.
pub fn resolve_today_log_file(folder: impl AsRef<Path>) -> Result<PathBuf, WatchError> {
    resolve_log_file_for(folder, Local::now().date_naive())
}

/// Resolve the `YYYY-MM-DD.log` file for `date` inside `folder`.
///
/// A missing file is created empty; an existing file is left untouched.
pub fn resolve_log_file_for(
    folder: impl AsRef<Path>,
    date: NaiveDate,
) -> Result<PathBuf, WatchError> {
    let folder = folder.as_ref();
    if !folder.is_dir() {
        return Err(WatchError::FolderNotFound(folder.to_path_buf()));
    }

    let path = folder.join(format!("{}.log", date.format("%Y-%m-%d")));
    if !path.exists() {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| WatchError::CreateFile {
                path: path.clone(),
                source,
            })?;
        tracing::info!("📄 ログファイルを作成しました: {}", path.display());
    }

    Ok(path)
}

/// Read cursor over an append-only log file.
///
/// The cursor starts at the end of the file, so content written before
/// [`LogTail::open`] is never returned.
#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    reader: BufReader<File>,
    pending: Vec<u8>,
}

impl LogTail {
    /// Open `path` positioned at its current end.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, WatchError> {
        let path = path.as_ref().to_path_buf();
        let open_error = |source| WatchError::Open {
            path: path.clone(),
            source,
        };

        let mut file = File::open(&path).await.map_err(open_error)?;
        let position = file.seek(SeekFrom::End(0)).await.map_err(open_error)?;
        tracing::debug!(path = %path.display(), position, "📌 Tail cursor positioned at end");

        Ok(Self {
            path,
            reader: BufReader::new(file),
            pending: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the next complete line without its terminator, or `None` when
    /// nothing new is available.
    ///
    /// Does not wait for data. A line still being written (no trailing
    /// newline yet) stays buffered until a later poll completes it.
    /// Blank lines are skipped. Bytes are returned undecoded.
    pub async fn poll_once(&mut self) -> Result<Option<Vec<u8>>, WatchError> {
        loop {
            let read = self
                .reader
                .read_until(b'\n', &mut self.pending)
                .await
                .map_err(WatchError::Read)?;

            if read == 0 || self.pending.last() != Some(&b'\n') {
                return Ok(None);
            }

            let mut line = std::mem::take(&mut self.pending);
            while matches!(line.last(), Some(b'\n' | b'\r')) {
                line.pop();
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(line));
        }
    }
}
