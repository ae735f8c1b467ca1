//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking. Records are stored
//! in their canonical encoding and decoded on the way out.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use otgraph_core::canonical::{
    decode_commit, decode_head, decode_pull_request, decode_snapshot, encode_commit,
    encode_head, encode_pull_request, encode_snapshot,
};
use otgraph_core::{
    CommitEntry, CommitId, Ed25519PublicKey, Ed25519Signature, RawCommit, RawCommitHead,
    RawPullRequest, RawSnapshot, RepoId, Signed, Verified,
};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{ensure_repo, HeadsUpdate, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────

fn repo_key(conn: &Connection, repo: &RepoId) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT repo_key FROM repos WHERE owner = ?1 AND name = ?2",
        params![repo.owner.0.as_slice(), repo.name],
        |row| row.get(0),
    )
    .optional()
    .map_err(StoreError::from)
}

fn ensure_repo_key(conn: &Connection, repo: &RepoId) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO repos (owner, name, created_at) VALUES (?1, ?2, ?3)",
        params![repo.owner.0.as_slice(), repo.name, now_millis()],
    )?;
    repo_key(conn, repo)?
        .ok_or_else(|| StoreError::InvalidData(format!("repository {repo} vanished")))
}

fn has_commit_in(conn: &Connection, key: i64, id: &CommitId) -> Result<bool> {
    if id.is_root() {
        return Ok(true);
    }
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM commits WHERE repo_key = ?1 AND commit_id = ?2",
            params![key, id.to_bytes()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn has_children_in(conn: &Connection, key: i64, id: &CommitId) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM commit_parents WHERE repo_key = ?1 AND parent = ?2 LIMIT 1",
            params![key, id.to_bytes()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn signature_from(bytes: &[u8]) -> Result<Ed25519Signature> {
    Ok(Ed25519Signature::try_from(bytes)?)
}

#[async_trait]
impl Store for SqliteStore {
    async fn list_repos(&self, owner: &Ed25519PublicKey) -> Result<BTreeSet<String>> {
        let owner = *owner;
        self.blocking(move |conn| {
            let mut stmt = conn.prepare("SELECT name FROM repos WHERE owner = ?1")?;
            let names = stmt
                .query_map(params![owner.0.as_slice()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<BTreeSet<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn save_commits(&self, repo: &RepoId, entries: &[CommitEntry]) -> Result<usize> {
        let repo = repo.clone();
        let entries = entries.to_vec();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let key = ensure_repo_key(&tx, &repo)?;
            let now = now_millis();

            let mut inserted = 0;
            for entry in &entries {
                let id_bytes = entry.id.to_bytes();
                let level = i64::try_from(entry.id.level()).map_err(|_| {
                    StoreError::InvalidData(format!("level of {} out of range", entry.id))
                })?;
                let changed = tx.execute(
                    "INSERT OR IGNORE INTO commits (repo_key, commit_id, level, body, ingested_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        key,
                        id_bytes,
                        level,
                        encode_commit(&entry.commit),
                        now
                    ],
                )?;
                if changed == 0 {
                    continue;
                }
                for parent in &entry.commit.parents {
                    tx.execute(
                        "INSERT OR IGNORE INTO commit_parents (repo_key, child, parent)
                         VALUES (?1, ?2, ?3)",
                        params![key, id_bytes, parent.to_bytes()],
                    )?;
                }
                inserted += 1;
            }

            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    async fn load_commit(&self, repo: &RepoId, id: &CommitId) -> Result<Option<RawCommit>> {
        if id.is_root() {
            return Ok(None);
        }
        let repo = repo.clone();
        let id = *id;

        self.blocking(move |conn| {
            let Some(key) = repo_key(conn, &repo)? else {
                return Ok(None);
            };
            let body: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT body FROM commits WHERE repo_key = ?1 AND commit_id = ?2",
                    params![key, id.to_bytes()],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(|b| decode_commit(&b).map_err(StoreError::from))
                .transpose()
        })
        .await
    }

    async fn has_commit(&self, repo: &RepoId, id: &CommitId) -> Result<bool> {
        if id.is_root() {
            return Ok(true);
        }
        let repo = repo.clone();
        let id = *id;

        self.blocking(move |conn| match repo_key(conn, &repo)? {
            Some(key) => has_commit_in(conn, key, &id),
            None => Ok(false),
        })
        .await
    }

    async fn get_heads(&self, repo: &RepoId) -> Result<Vec<Signed<RawCommitHead>>> {
        let repo = repo.clone();

        self.blocking(move |conn| {
            let Some(key) = repo_key(conn, &repo)? else {
                return Ok(Vec::new());
            };
            let mut stmt = conn.prepare("SELECT body, signature FROM heads WHERE repo_key = ?1")?;
            let rows = stmt
                .query_map(params![key], |row| {
                    Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut heads = Vec::with_capacity(rows.len());
            for (body, signature) in rows {
                heads.push(Signed {
                    value: decode_head(&body)?,
                    signature: signature_from(&signature)?,
                });
            }
            heads.sort_by_key(|h| h.value.commit_id);
            Ok(heads)
        })
        .await
    }

    async fn save_heads(
        &self,
        repo: &RepoId,
        heads: &[Verified<RawCommitHead>],
    ) -> Result<HeadsUpdate> {
        for head in heads {
            ensure_repo(repo, &head.repo)?;
        }
        let repo = repo.clone();
        let heads: Vec<Signed<RawCommitHead>> =
            heads.iter().map(|h| h.signed().clone()).collect();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let key = ensure_repo_key(&tx, &repo)?;
            let mut update = HeadsUpdate::default();

            for head in &heads {
                let id = head.value.commit_id;
                let existing_ts: Option<i64> = tx
                    .query_row(
                        "SELECT timestamp FROM heads WHERE repo_key = ?1 AND commit_id = ?2",
                        params![key, id.to_bytes()],
                        |row| row.get(0),
                    )
                    .optional()?;

                let stale = !has_commit_in(&tx, key, &id)?
                    || has_children_in(&tx, key, &id)?
                    || existing_ts.is_some_and(|ts| ts >= head.value.timestamp);
                if stale {
                    update.ignored.push(id);
                    continue;
                }

                tx.execute(
                    "INSERT INTO heads (repo_key, commit_id, timestamp, body, signature)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(repo_key, commit_id) DO UPDATE SET
                        timestamp = excluded.timestamp,
                        body = excluded.body,
                        signature = excluded.signature",
                    params![
                        key,
                        id.to_bytes(),
                        head.value.timestamp,
                        encode_head(&head.value),
                        head.signature.0.as_slice()
                    ],
                )?;
                update.added.push(id);
            }

            let current: Vec<Vec<u8>> = {
                let mut stmt = tx.prepare("SELECT commit_id FROM heads WHERE repo_key = ?1")?;
                let ids = stmt
                    .query_map(params![key], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            };
            for id_bytes in current {
                let id = CommitId::from_bytes(&id_bytes)?;
                if has_children_in(&tx, key, &id)? {
                    tx.execute(
                        "DELETE FROM heads WHERE repo_key = ?1 AND commit_id = ?2",
                        params![key, id_bytes],
                    )?;
                    update.removed.push(id);
                }
            }
            update.removed.sort();

            tx.commit()?;
            Ok(update)
        })
        .await
    }

    async fn save_snapshot(&self, snapshot: &Verified<RawSnapshot>) -> Result<bool> {
        let snapshot = snapshot.signed().clone();

        self.blocking(move |conn| {
            let key = ensure_repo_key(conn, &snapshot.value.repo)?;
            let changed = conn.execute(
                "INSERT OR IGNORE INTO snapshots (repo_key, commit_id, body, signature)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    key,
                    snapshot.value.commit_id.to_bytes(),
                    encode_snapshot(&snapshot.value),
                    snapshot.signature.0.as_slice()
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn load_snapshot(
        &self,
        repo: &RepoId,
        id: &CommitId,
    ) -> Result<Option<Signed<RawSnapshot>>> {
        let repo = repo.clone();
        let id = *id;

        self.blocking(move |conn| {
            let Some(key) = repo_key(conn, &repo)? else {
                return Ok(None);
            };
            let row: Option<(Vec<u8>, Vec<u8>)> = conn
                .query_row(
                    "SELECT body, signature FROM snapshots WHERE repo_key = ?1 AND commit_id = ?2",
                    params![key, id.to_bytes()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((body, signature)) => Ok(Some(Signed {
                    value: decode_snapshot(&body)?,
                    signature: signature_from(&signature)?,
                })),
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_snapshots(&self, repo: &RepoId) -> Result<BTreeSet<CommitId>> {
        let repo = repo.clone();

        self.blocking(move |conn| {
            let Some(key) = repo_key(conn, &repo)? else {
                return Ok(BTreeSet::new());
            };
            let mut stmt = conn.prepare("SELECT commit_id FROM snapshots WHERE repo_key = ?1")?;
            let rows = stmt
                .query_map(params![key], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut ids = BTreeSet::new();
            for bytes in rows {
                ids.insert(CommitId::from_bytes(&bytes)?);
            }
            Ok(ids)
        })
        .await
    }

    async fn save_pull_request(&self, request: &Verified<RawPullRequest>) -> Result<bool> {
        let request = request.signed().clone();

        self.blocking(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO pull_requests (owner, body, signature, received_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    request.value.repo.owner.0.as_slice(),
                    encode_pull_request(&request.value),
                    request.signature.0.as_slice(),
                    now_millis()
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn get_pull_requests(
        &self,
        owner: &Ed25519PublicKey,
    ) -> Result<Vec<Signed<RawPullRequest>>> {
        let owner = *owner;

        self.blocking(move |conn| {
            let mut stmt =
                conn.prepare("SELECT body, signature FROM pull_requests WHERE owner = ?1")?;
            let rows = stmt
                .query_map(params![owner.0.as_slice()], |row| {
                    Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut requests = Vec::with_capacity(rows.len());
            for (body, signature) in rows {
                requests.push(Signed {
                    value: decode_pull_request(&body)?,
                    signature: signature_from(&signature)?,
                });
            }
            requests.sort_by(|a, b| a.value.cmp(&b.value));
            Ok(requests)
        })
        .await
    }
}
