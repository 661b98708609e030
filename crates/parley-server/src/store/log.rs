//! Append-only durable message log.
//!
//! One JSON-encoded message per line. The whole log is read once at
//! startup to rebuild the in-memory index; after that every append is a
//! single sequential write, flushed and fsynced before it is reported
//! complete. A torn trailing line from a crash mid-append is skipped with
//! a warning at load time.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use parley_core::{Message, ParleyError, ParleyResult};

struct LogInner {
    file: File,
    messages: Vec<Message>,
}

/// Durable, append-only record of every message ever sent.
pub struct MessageLog {
    path: PathBuf,
    inner: Mutex<LogInner>,
}

impl MessageLog {
    /// Open (or create) the log file and rebuild the in-memory index.
    pub fn open(path: &Path) -> ParleyResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let messages = load_lines(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        info!(path = %path.display(), count = messages.len(), "message log opened");

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(LogInner { file, messages }),
        })
    }

    /// Append a message. Durable (flushed + fsynced) before returning.
    ///
    /// Appends are linearized by the inner mutex: two concurrent sends can
    /// never lose each other's write.
    pub async fn append(&self, message: &Message) -> ParleyResult<()> {
        if message.sender.is_empty() || message.recipient.is_empty() {
            return Err(ParleyError::InvalidFrame(
                "message must have a sender and a recipient".into(),
            ));
        }

        let line = serde_json::to_string(message)?;

        let mut inner = self.inner.lock().await;
        inner.file.write_all(line.as_bytes())?;
        inner.file.write_all(b"\n")?;
        inner.file.flush()?;
        inner
            .file
            .sync_data()
            .map_err(|e| ParleyError::Storage(format!("fsync {}: {e}", self.path.display())))?;
        inner.messages.push(message.clone());

        debug!(id = %message.id, sender = %message.sender, recipient = %message.recipient, "message appended");
        Ok(())
    }

    /// Every message, in append order.
    pub async fn scan_all(&self) -> Vec<Message> {
        self.inner.lock().await.messages.clone()
    }

    /// Messages where `username` is sender or recipient, in append order.
    pub async fn scan_for(&self, username: &str) -> Vec<Message> {
        self.inner
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| m.involves(username))
            .cloned()
            .collect()
    }

    /// Number of persisted messages.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.messages.len()
    }
}

/// Read all complete JSONL records from `path`. A torn final line is
/// tolerated; a corrupt line anywhere else is a hard error.
fn load_lines(path: &Path) -> ParleyResult<Vec<Message>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;
    let mut messages = Vec::with_capacity(lines.len());
    let last = lines.len().saturating_sub(1);

    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(line) {
            Ok(msg) => messages.push(msg),
            Err(e) if i == last => {
                warn!(path = %path.display(), error = %e, "skipping torn trailing log line");
            }
            Err(e) => {
                return Err(ParleyError::Storage(format!(
                    "corrupt log record at {}:{}: {e}",
                    path.display(),
                    i + 1
                )));
            }
        }
    }

    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn msg(id: &str, sender: &str, recipient: &str) -> Message {
        Message {
            id: id.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            text: format!("from {sender}"),
            image: None,
        }
    }

    #[tokio::test]
    async fn append_then_scan() {
        let dir = tempfile::tempdir().unwrap();
        let log = MessageLog::open(&dir.path().join("messages.jsonl")).unwrap();

        log.append(&msg("1", "alice", "bob")).await.unwrap();
        log.append(&msg("2", "bob", "alice")).await.unwrap();
        log.append(&msg("3", "carol", "dave")).await.unwrap();

        let all = log.scan_all().await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, "1");
        assert_eq!(all[2].id, "3");

        let alices = log.scan_for("alice").await;
        assert_eq!(alices.len(), 2);
        assert_eq!(alices[0].id, "1");
        assert_eq!(alices[1].id, "2");

        assert!(log.scan_for("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.jsonl");

        {
            let log = MessageLog::open(&path).unwrap();
            log.append(&msg("1001", "alice", "bob")).await.unwrap();
        }

        // Simulated process restart: reload from the persisted file.
        let log = MessageLog::open(&path).unwrap();
        let all = log.scan_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "1001");

        // Appends continue after the reloaded records.
        log.append(&msg("1002", "bob", "alice")).await.unwrap();
        let log = MessageLog::open(&path).unwrap();
        assert_eq!(log.len().await, 2);
    }

    #[tokio::test]
    async fn rejects_empty_participants() {
        let dir = tempfile::tempdir().unwrap();
        let log = MessageLog::open(&dir.path().join("messages.jsonl")).unwrap();

        assert!(log.append(&msg("1", "", "bob")).await.is_err());
        assert!(log.append(&msg("2", "alice", "")).await.is_err());
        assert_eq!(log.len().await, 0);
    }

    #[tokio::test]
    async fn tolerates_torn_trailing_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.jsonl");

        {
            let log = MessageLog::open(&path).unwrap();
            log.append(&msg("1", "alice", "bob")).await.unwrap();
        }
        // Crash mid-append: half a record at the end of the file.
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(b"{\"id\":\"2\",\"send").unwrap();
        }

        let log = MessageLog::open(&path).unwrap();
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_appends_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.jsonl");
        let log = std::sync::Arc::new(MessageLog::open(&path).unwrap());

        let mut handles = Vec::new();
        for i in 0..20 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.append(&msg(&format!("id-{i}"), "alice", "bob"))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(log.len().await, 20);
        // Reload to prove every append hit the file.
        let reloaded = MessageLog::open(&path).unwrap();
        assert_eq!(reloaded.len().await, 20);
    }
}
