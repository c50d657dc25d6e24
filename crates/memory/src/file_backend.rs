//! File-based history store: one JSON-lines file per thread.
//!
//! Storage location: `<dir>/<thread>.jsonl`, default `~/.freshmate/history`.
//! A thread's rolling summary sits beside it in `<thread>.summary.json` and is
//! replaced whole through a temporary file and a rename.
//! Each line is one serialised [`Message`]. Writes only ever append, so a
//! crash can at worst leave a torn last line. Loads skip it; the next append
//! truncates it first so it never ends up in the middle of the file.
//!
//! Thread IDs are escaped into file names: ASCII alphanumerics, `-` and `_`
//! are kept, every other byte becomes `%XX`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use freshmate_core::error::HistoryError;
use freshmate_core::history::{HistoryStore, ThreadSummary};
use freshmate_core::message::{Message, ThreadId};

const EXTENSION: &str = "jsonl";
const SUMMARY_SUFFIX: &str = "summary.json";

pub struct FileHistoryStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileHistoryStore {
    /// The directory is created on first append.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(dir = %dir.display(), "File history store ready");
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn thread_path(&self, thread: &ThreadId) -> PathBuf {
        self.dir
            .join(format!("{}.{EXTENSION}", encode_file_stem(thread.as_str())))
    }

    fn summary_path(&self, thread: &ThreadId) -> PathBuf {
        self.dir
            .join(format!("{}.{SUMMARY_SUFFIX}", encode_file_stem(thread.as_str())))
    }

    fn parse(thread: &ThreadId, content: &str) -> Result<Vec<Message>, HistoryError> {
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let last = lines.len().saturating_sub(1);
        let mut messages = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            match serde_json::from_str::<Message>(line) {
                Ok(message) => messages.push(message),
                Err(e) if index == last => {
                    warn!(thread_id = %thread, error = %e, "Skipping torn trailing history line");
                }
                Err(e) => {
                    return Err(HistoryError::Corrupted {
                        thread_id: thread.to_string(),
                        reason: format!("line {}: {e}", index + 1),
                    });
                }
            }
        }
        Ok(messages)
    }

    /// Cut an unterminated last line left by an interrupted write.
    async fn truncate_torn_tail(thread: &ThreadId, path: &Path) -> Result<(), HistoryError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(HistoryError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        if bytes.is_empty() || bytes.ends_with(b"\n") {
            return Ok(());
        }

        let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        warn!(
            thread_id = %thread,
            dropped_bytes = bytes.len() - keep,
            "Truncating torn trailing history line"
        );
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to open {}: {e}", path.display())))?;
        file.set_len(keep as u64)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to truncate history: {e}")))
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, thread: &ThreadId) -> Result<Vec<Message>, HistoryError> {
        let path = self.thread_path(thread);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(HistoryError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        Self::parse(thread, &content)
    }

    async fn append(&self, thread: &ThreadId, messages: &[Message]) -> Result<(), HistoryError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut buffer = String::new();
        for message in messages {
            let line = serde_json::to_string(message).map_err(|e| {
                HistoryError::Storage(format!("Failed to serialize message: {e}"))
            })?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            HistoryError::Storage(format!("Failed to create history directory: {e}"))
        })?;

        let path = self.thread_path(thread);
        Self::truncate_torn_tail(thread, &path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to open {}: {e}", path.display())))?;
        file.write_all(buffer.as_bytes())
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to append history: {e}")))?;
        file.flush()
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to flush history: {e}")))?;

        debug!(thread_id = %thread, appended = messages.len(), "History appended");
        Ok(())
    }

    async fn threads(&self) -> Result<Vec<ThreadId>, HistoryError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HistoryError::Storage(format!("Failed to list threads: {e}"))),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to list threads: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match decode_file_stem(stem) {
                Some(id) => ids.push(ThreadId::from(id)),
                None => warn!(file = %path.display(), "Ignoring unrecognised history file"),
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    async fn load_summary(&self, thread: &ThreadId) -> Result<Option<ThreadSummary>, HistoryError> {
        let path = self.summary_path(thread);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(HistoryError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| HistoryError::Corrupted {
                thread_id: thread.to_string(),
                reason: format!("summary: {e}"),
            })
    }

    async fn save_summary(&self, thread: &ThreadId, summary: &ThreadSummary) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(summary)
            .map_err(|e| HistoryError::Storage(format!("Failed to serialize summary: {e}")))?;

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            HistoryError::Storage(format!("Failed to create history directory: {e}"))
        })?;

        let path = self.summary_path(thread);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to replace {}: {e}", path.display())))?;

        debug!(thread_id = %thread, covered = summary.covered, "Summary saved");
        Ok(())
    }
}

fn encode_file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode_file_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
