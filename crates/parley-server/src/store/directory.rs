//! Durable set of known usernames.
//!
//! Same shape as the message log: append-only JSONL of `{"username":...}`
//! records plus an in-memory index. Insertion order is preserved for
//! listing; a uniqueness set enforces that no two entries share a
//! normalized username.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use parley_core::{normalize_username, ParleyError, ParleyResult, User};

struct DirectoryInner {
    file: File,
    /// Usernames in insertion order.
    order: Vec<String>,
    /// Normalized uniqueness set.
    known: HashSet<String>,
}

/// Durable directory of every username that has ever authenticated.
pub struct UserDirectory {
    path: PathBuf,
    inner: Mutex<DirectoryInner>,
}

impl UserDirectory {
    /// Open (or create) the directory file and rebuild the index.
    pub fn open(path: &Path) -> ParleyResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut order = Vec::new();
        let mut known = HashSet::new();
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;
            let last = lines.len().saturating_sub(1);
            for (i, line) in lines.iter().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<User>(line) {
                    Ok(user) => {
                        let name = normalize_username(&user.username);
                        if known.insert(name.clone()) {
                            order.push(name);
                        }
                    }
                    Err(e) if i == last => {
                        warn!(path = %path.display(), error = %e, "skipping torn trailing directory line");
                    }
                    Err(e) => {
                        return Err(ParleyError::Storage(format!(
                            "corrupt directory record at {}:{}: {e}",
                            path.display(),
                            i + 1
                        )));
                    }
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        info!(path = %path.display(), count = order.len(), "user directory opened");

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(DirectoryInner { file, order, known }),
        })
    }

    /// Idempotent insert: no-op if the normalized username is already
    /// present, otherwise append and persist before returning.
    pub async fn ensure_user(&self, username: &str) -> ParleyResult<()> {
        let name = normalize_username(username);
        if name.is_empty() {
            return Err(ParleyError::InvalidFrame("empty username".into()));
        }

        let mut inner = self.inner.lock().await;
        if inner.known.contains(&name) {
            return Ok(());
        }

        let line = serde_json::to_string(&User {
            username: name.clone(),
        })?;
        inner.file.write_all(line.as_bytes())?;
        inner.file.write_all(b"\n")?;
        inner.file.flush()?;
        inner
            .file
            .sync_data()
            .map_err(|e| ParleyError::Storage(format!("fsync {}: {e}", self.path.display())))?;

        inner.known.insert(name.clone());
        inner.order.push(name.clone());
        debug!(username = %name, "user registered in directory");
        Ok(())
    }

    /// All known users, in insertion order.
    pub async fn list_users(&self) -> Vec<User> {
        self.inner
            .lock()
            .await
            .order
            .iter()
            .map(|name| User {
                username: name.clone(),
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let users = UserDirectory::open(&dir.path().join("users.jsonl")).unwrap();

        users.ensure_user("alice").await.unwrap();
        users.ensure_user("alice").await.unwrap();
        users.ensure_user("bob").await.unwrap();

        let list = users.list_users().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].username, "alice");
        assert_eq!(list[1].username, "bob");
    }

    #[tokio::test]
    async fn normalization_collapses_variants() {
        let dir = tempfile::tempdir().unwrap();
        let users = UserDirectory::open(&dir.path().join("users.jsonl")).unwrap();

        users.ensure_user("Alice").await.unwrap();
        users.ensure_user("  alice ").await.unwrap();
        users.ensure_user("ALICE").await.unwrap();

        let list = users.list_users().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].username, "alice");
    }

    #[tokio::test]
    async fn rejects_empty_username() {
        let dir = tempfile::tempdir().unwrap();
        let users = UserDirectory::open(&dir.path().join("users.jsonl")).unwrap();

        assert!(users.ensure_user("   ").await.is_err());
        assert_eq!(users.len().await, 0);
    }

    #[tokio::test]
    async fn survives_restart_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.jsonl");

        {
            let users = UserDirectory::open(&path).unwrap();
            users.ensure_user("carol").await.unwrap();
            users.ensure_user("alice").await.unwrap();
            users.ensure_user("bob").await.unwrap();
        }

        let users = UserDirectory::open(&path).unwrap();
        let names: Vec<_> = users
            .list_users()
            .await
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["carol", "alice", "bob"]);

        // Re-inserting after reload stays a no-op.
        users.ensure_user("carol").await.unwrap();
        assert_eq!(users.len().await, 3);
    }
}
