use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use war_room_core::{CoreError, SessionRecord};

const SESSION_FILE_PREFIX: &str = "session_";
const SESSION_FILE_EXTENSION: &str = "json";
/// Upper bound on same-second suffixes tried before giving up.
const MAX_COLLISION_SUFFIX: u32 = 1_000;
const STAGING_EXTENSION: &str = "tmp";

static STAGING_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session {session_id} is not a valid session record: {source}")]
    Parse {
        session_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("session {session_id} failed validation: {source}")]
    Invalid {
        session_id: String,
        #[source]
        source: CoreError,
    },
    #[error("invalid session id: {0:?}")]
    InvalidId(String),
    #[error("failed to serialize session record: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("exhausted collision suffixes for session stamp {0}")]
    Exhausted(String),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

/// Identifier of a persisted session: the file stem, e.g. `session_20250101_120000`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Accept ids made of ASCII letters, digits, `_` and `-` only.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidId`] for anything that could escape the store root.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let stem = raw.strip_suffix(".json").unwrap_or(raw);
        Self::from_stem(stem).ok_or_else(|| StoreError::InvalidId(raw.to_string()))
    }

    /// Exact file stem, no suffix stripping.
    fn from_stem(stem: &str) -> Option<Self> {
        if stem.is_empty()
            || !stem.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        {
            return None;
        }
        Some(Self(stem.to_string()))
    }

    fn for_stamp(timestamp_utc: &str, attempt: u32) -> Self {
        if attempt <= 1 {
            Self(format!("{SESSION_FILE_PREFIX}{timestamp_utc}"))
        } else {
            Self(format!("{SESSION_FILE_PREFIX}{timestamp_utc}_{attempt}"))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn file_name(&self) -> String {
        format!("{}.{SESSION_FILE_EXTENSION}", self.0)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One pretty-printed JSON document per session under a single directory.
///
/// There is no locking. A save is written to a hidden staging file and then
/// hard-linked into place, so a session entry only ever appears complete. Two
/// attempts stamped in the same second get `_2`, `_3`, ... suffixes instead of
/// overwriting.
#[derive(Debug, Clone)]
pub struct JsonSessionStore {
    root: PathBuf,
}

impl JsonSessionStore {
    /// Point a store at `root`. Nothing touches the filesystem until the first call.
    #[must_use]
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.root.join(session_id.file_name())
    }

    /// Persist a scored attempt and return its identifier.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] when the root cannot be created or written,
    /// [`StoreError::Core`] when the record fails validation, and
    /// [`StoreError::Exhausted`] when every same-second suffix is taken.
    pub fn save(&self, record: &SessionRecord) -> Result<SessionId, StoreError> {
        record.validate()?;
        fs::create_dir_all(&self.root).map_err(|err| StoreError::io(&self.root, err))?;

        let mut body = serde_json::to_vec_pretty(record).map_err(StoreError::Serialize)?;
        body.push(b'\n');

        let staged = self.stage(&record.timestamp_utc, &body)?;
        let claimed = self.claim(&staged, &record.timestamp_utc);
        if let Err(err) = fs::remove_file(&staged) {
            tracing::warn!(path = %staged.display(), error = %err, "failed to remove staging file");
        }
        claimed
    }

    /// Write and sync `body` to a fresh staging file under the root.
    fn stage(&self, timestamp_utc: &str, body: &[u8]) -> Result<PathBuf, StoreError> {
        let sequence = STAGING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let path = self.root.join(format!(
            ".{timestamp_utc}.{}-{sequence}.{STAGING_EXTENSION}",
            std::process::id()
        ));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| StoreError::io(&path, err))?;

        if let Err(err) = file.write_all(body).and_then(|()| file.sync_all()) {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %cleanup, "failed to remove partial staging file");
            }
            return Err(StoreError::io(&path, err));
        }
        Ok(path)
    }

    /// Link the staged document to the first free `session_<stamp>[_<n>]` name.
    fn claim(&self, staged: &Path, timestamp_utc: &str) -> Result<SessionId, StoreError> {
        for attempt in 1..=MAX_COLLISION_SUFFIX {
            let session_id = SessionId::for_stamp(timestamp_utc, attempt);
            let path = self.path_for(&session_id);
            match fs::hard_link(staged, &path) {
                Ok(()) => {
                    tracing::info!(session_id = %session_id, path = %path.display(), "saved session");
                    return Ok(session_id);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    tracing::warn!(
                        session_id = %session_id,
                        "session stamp already taken, trying next suffix"
                    );
                }
                Err(err) => return Err(StoreError::io(&path, err)),
            }
        }

        Err(StoreError::Exhausted(timestamp_utc.to_string()))
    }

    /// Identifiers of every persisted session.
    ///
    /// Order is whatever the filesystem enumerates; callers that need a
    /// chronological view must sort themselves. A missing root lists as empty.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] when the root exists but cannot be read.
    pub fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(&self.root, err)),
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::io(&self.root, err))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SESSION_FILE_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match SessionId::from_stem(stem) {
                Some(session_id) => sessions.push(session_id),
                None => {
                    tracing::debug!(path = %path.display(), "skipping non-session file");
                }
            }
        }

        tracing::debug!(count = sessions.len(), root = %self.root.display(), "listed sessions");
        Ok(sessions)
    }

    /// Load one session for replay.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when no entry has this id,
    /// [`StoreError::Parse`] when the content is not a session record,
    /// [`StoreError::Invalid`] when it parses but breaks record invariants.
    pub fn load(&self, session_id: &SessionId) -> Result<SessionRecord, StoreError> {
        let path = self.path_for(session_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(session_id.to_string()));
            }
            Err(err) => return Err(StoreError::io(&path, err)),
        };

        let record: SessionRecord = serde_json::from_slice(&bytes).map_err(|source| {
            StoreError::Parse { session_id: session_id.to_string(), source }
        })?;
        record
            .validate()
            .map_err(|source| StoreError::Invalid { session_id: session_id.to_string(), source })?;

        tracing::debug!(session_id = %session_id, "loaded session");
        Ok(record)
    }
}
