//! File-backed persistence for the conversation context
//!
//! The document on disk looks like:
//!
//! ```json
//! {
//!   "context": { "cwd": "/home/me" },
//!   "history": [ { "role": "user", "content": "hi" } ]
//! }
//! ```
//!
//! Only the last [`HISTORY_WINDOW`] messages are ever written. Read and write
//! failures never escape [`ContextStore::load`] / [`ContextStore::save`]: a
//! corrupt or unwritable file must not make the agent unusable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::context::{ConversationContext, Message, Metadata, HISTORY_WINDOW};

/// File name used when no explicit path is configured
pub const DEFAULT_CONTEXT_FILE: &str = "context.json";

/// Error type for context persistence
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize context: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Owned form of the persisted document (used when loading)
#[derive(Debug, Default, Deserialize)]
struct StoredContext {
    #[serde(default)]
    context: Metadata,
    #[serde(default)]
    history: Vec<Message>,
}

/// Borrowed form of the persisted document (used when saving)
#[derive(Serialize)]
struct StoredContextRef<'a> {
    context: &'a Metadata,
    history: &'a [Message],
}

/// Reads and writes a [`ConversationContext`] snapshot to a JSON file
#[derive(Debug, Clone)]
pub struct ContextStore {
    path: PathBuf,
}

impl ContextStore {
    /// Create a store backed by the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create with the default file (~/.nextshell/context.json)
    pub fn default_store() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self::new(
            PathBuf::from(home)
                .join(".nextshell")
                .join(DEFAULT_CONTEXT_FILE),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the context, falling back to an empty one on any failure
    pub async fn load(&self) -> ConversationContext {
        match self.try_load().await {
            Ok(Some(ctx)) => ctx,
            Ok(None) => {
                debug!(path = %self.path.display(), "No saved context, starting fresh");
                ConversationContext::default()
            }
            Err(e) => {
                warn!(error = %e, "Error loading context, starting fresh");
                ConversationContext::default()
            }
        }
    }

    /// Load the context, reporting failures
    ///
    /// Returns `Ok(None)` when the backing file does not exist.
    pub async fn try_load(&self) -> Result<Option<ConversationContext>, PersistenceError> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let stored: StoredContext =
            serde_json::from_str(&json).map_err(|source| PersistenceError::Parse {
                path: self.path.clone(),
                source,
            })?;

        debug!(
            path = %self.path.display(),
            messages = stored.history.len(),
            "Loaded context"
        );
        Ok(Some(ConversationContext::new(stored.history, stored.context)))
    }

    /// Persist a snapshot, logging and dropping any failure
    ///
    /// The in-memory context stays authoritative when this fails.
    pub async fn save(&self, context: &ConversationContext) {
        if let Err(e) = self.try_save(context).await {
            warn!(error = %e, "Error saving context");
        }
    }

    /// Persist a snapshot, reporting failures
    ///
    /// Writes the last [`HISTORY_WINDOW`] messages to a temp file next to the
    /// target and renames it into place.
    pub async fn try_save(&self, context: &ConversationContext) -> Result<(), PersistenceError> {
        let document = StoredContextRef {
            context: &context.metadata,
            history: context.window(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        let write_err = |source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, json).await.map_err(write_err)?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }

        debug!(
            path = %self.path.display(),
            messages = document.history.len(),
            "Saved context"
        );
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_CONTEXT_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store_in(dir: &tempfile::TempDir) -> ContextStore {
        ContextStore::new(dir.path().join("context.json"))
    }

    fn metadata(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.try_load().await.unwrap().is_none());
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let ctx = ConversationContext::new(
            vec![
                Message::user("list files"),
                Message::assistant("try ls -la"),
                Message::user("thanks"),
            ],
            metadata(json!({"cwd": "/srv", "depth": 2})),
        );

        store.save(&ctx).await;
        assert_eq!(store.load().await, ctx);
    }

    #[tokio::test]
    async fn test_save_truncates_to_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let history: Vec<Message> = (0..25).map(|i| Message::user(format!("m{i}"))).collect();
        let ctx = ConversationContext::new(history.clone(), Metadata::new());

        store.save(&ctx).await;
        let loaded = store.load().await;
        assert_eq!(loaded.history, history[15..].to_vec());
    }

    #[tokio::test]
    async fn test_full_window_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let history: Vec<Message> = (0..HISTORY_WINDOW)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("q{i}"))
                } else {
                    Message::assistant(format!("a{i}"))
                }
            })
            .collect();
        let ctx = ConversationContext::new(history, metadata(json!({"shell": "zsh"})));

        store.save(&ctx).await;
        assert_eq!(store.load().await, ctx);

        let mut longer = ctx.history.clone();
        longer.push(Message::user("one more"));
        store
            .save(&ConversationContext::new(longer.clone(), Metadata::new()))
            .await;
        let loaded = store.load().await;
        assert_eq!(loaded.history.len(), HISTORY_WINDOW);
        assert_eq!(loaded.history, longer[1..].to_vec());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{ not json").unwrap();

        assert!(matches!(
            store.try_load().await,
            Err(PersistenceError::Parse { .. })
        ));
        let ctx = store.load().await;
        assert!(ctx.history.is_empty());
        assert!(ctx.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_shape_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), r#"{"history": [{"role": "robot", "content": 1}]}"#)
            .unwrap();
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), r#"{"context": {"a": 1}}"#).unwrap();
        let ctx = store.load().await;
        assert!(ctx.history.is_empty());
        assert_eq!(ctx.metadata["a"], 1);
    }

    #[tokio::test]
    async fn test_document_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let ctx = ConversationContext::new(
            vec![Message::user("hi")],
            metadata(json!({"k": "v"})),
        );
        store.try_save(&ctx).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(
            raw,
            json!({"context": {"k": "v"}, "history": [{"role": "user", "content": "hi"}]})
        );
        assert!(!store.tmp_path().exists());
    }

    #[tokio::test]
    async fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path().join("a").join("b").join("context.json"));
        store.try_save(&ConversationContext::default()).await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_unwritable_path_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join("context.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();
        let store = ContextStore::new(&path);

        assert!(matches!(
            store.try_save(&ConversationContext::default()).await,
            Err(PersistenceError::Write { .. })
        ));
        // Must not panic or propagate.
        store.save(&ConversationContext::default()).await;
    }
}
