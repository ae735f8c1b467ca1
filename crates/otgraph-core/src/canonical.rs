//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Commit ids are hashes of these bytes and signatures cover them, so every
//! node must produce identical output for equal records. Decoders re-encode
//! what they parsed and reject input that is not already canonical.

use ciborium::value::Value;
use std::collections::BTreeSet;

use crate::commit::{RawCommit, RawCommitHead, RawPullRequest, RawSnapshot};
use crate::crypto::Ed25519PublicKey;
use crate::encrypted::{EncryptedData, SimKeyHash};
use crate::error::CoreError;
use crate::types::{CommitId, RepoId};

/// Field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub mod commit {
        pub const EPOCH: u64 = 0;
        pub const PARENTS: u64 = 1;
        pub const ENCRYPTED_DIFFS: u64 = 2;
        pub const SIM_KEY_HASH: u64 = 3;
        pub const TIMESTAMP: u64 = 4;
    }

    pub mod head {
        pub const REPO: u64 = 0;
        pub const COMMIT_ID: u64 = 1;
        pub const TIMESTAMP: u64 = 2;
    }

    pub mod snapshot {
        pub const REPO: u64 = 0;
        pub const COMMIT_ID: u64 = 1;
        pub const ENCRYPTED_DIFFS: u64 = 2;
        pub const SIM_KEY_HASH: u64 = 3;
    }

    pub mod pull_request {
        pub const REPO: u64 = 0;
        pub const FORK: u64 = 1;
    }

    pub mod repo {
        pub const OWNER: u64 = 0;
        pub const NAME: u64 = 1;
    }

    pub mod encrypted {
        pub const NONCE: u64 = 0;
        pub const CIPHERTEXT: u64 = 1;
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Record encoders
// ─────────────────────────────────────────────────────────────────────────

/// Encode a commit. The level is not part of the encoding.
pub fn encode_commit(commit: &RawCommit) -> Vec<u8> {
    encode_cbor_value_canonical(&commit_to_cbor_value(commit))
}

pub fn encode_head(head: &RawCommitHead) -> Vec<u8> {
    let value = Value::Map(vec![
        (key(keys::head::REPO), repo_to_cbor_value(&head.repo)),
        (key(keys::head::COMMIT_ID), commit_id_value(&head.commit_id)),
        (key(keys::head::TIMESTAMP), Value::Integer(head.timestamp.into())),
    ]);
    encode_cbor_value_canonical(&value)
}

pub fn encode_snapshot(snapshot: &RawSnapshot) -> Vec<u8> {
    let value = Value::Map(vec![
        (key(keys::snapshot::REPO), repo_to_cbor_value(&snapshot.repo)),
        (key(keys::snapshot::COMMIT_ID), commit_id_value(&snapshot.commit_id)),
        (
            key(keys::snapshot::ENCRYPTED_DIFFS),
            encrypted_to_cbor_value(&snapshot.encrypted_diffs),
        ),
        (
            key(keys::snapshot::SIM_KEY_HASH),
            Value::Bytes(snapshot.sim_key_hash.0.to_vec()),
        ),
    ]);
    encode_cbor_value_canonical(&value)
}

pub fn encode_pull_request(request: &RawPullRequest) -> Vec<u8> {
    let value = Value::Map(vec![
        (key(keys::pull_request::REPO), repo_to_cbor_value(&request.repo)),
        (key(keys::pull_request::FORK), repo_to_cbor_value(&request.fork)),
    ]);
    encode_cbor_value_canonical(&value)
}

fn key(k: u64) -> Value {
    Value::Integer(k.into())
}

fn commit_id_value(id: &CommitId) -> Value {
    Value::Bytes(id.to_bytes())
}

fn commit_to_cbor_value(commit: &RawCommit) -> Value {
    // Parents go out in CommitId order, which is deterministic.
    let parents: Vec<Value> = commit.parents.iter().map(commit_id_value).collect();

    Value::Map(vec![
        (key(keys::commit::EPOCH), Value::Integer(commit.epoch.into())),
        (key(keys::commit::PARENTS), Value::Array(parents)),
        (
            key(keys::commit::ENCRYPTED_DIFFS),
            encrypted_to_cbor_value(&commit.encrypted_diffs),
        ),
        (
            key(keys::commit::SIM_KEY_HASH),
            Value::Bytes(commit.sim_key_hash.0.to_vec()),
        ),
        (key(keys::commit::TIMESTAMP), Value::Integer(commit.timestamp.into())),
    ])
}

fn repo_to_cbor_value(repo: &RepoId) -> Value {
    Value::Map(vec![
        (key(keys::repo::OWNER), Value::Bytes(repo.owner.0.to_vec())),
        (key(keys::repo::NAME), Value::Text(repo.name.clone())),
    ])
}

fn encrypted_to_cbor_value(data: &EncryptedData) -> Value {
    Value::Map(vec![
        (key(keys::encrypted::NONCE), Value::Bytes(data.nonce.to_vec())),
        (key(keys::encrypted::CIPHERTEXT), Value::Bytes(data.ciphertext.clone())),
    ])
}

// ─────────────────────────────────────────────────────────────────────────
// Low-level encoder
// ─────────────────────────────────────────────────────────────────────────

/// Encode a CBOR Value to canonical bytes.
fn encode_cbor_value_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => panic!("floats not supported in canonical encoding"),
        _ => panic!("unsupported CBOR value type"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);
    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Decoders
// ─────────────────────────────────────────────────────────────────────────

/// Decode a commit, rejecting non-canonical input.
pub fn decode_commit(bytes: &[u8]) -> Result<RawCommit, CoreError> {
    let value = parse(bytes)?;
    let fields = Fields::of(&value, "commit")?;

    let mut parents = BTreeSet::new();
    for item in fields.array(keys::commit::PARENTS)? {
        match item {
            Value::Bytes(b) => {
                parents.insert(CommitId::from_bytes(b)?);
            }
            _ => return Err(CoreError::MalformedRecord("commit: invalid parent".into())),
        }
    }
    if parents.is_empty() {
        return Err(CoreError::MalformedRecord("commit: no parents".into()));
    }

    let commit = RawCommit {
        epoch: fields.uint(keys::commit::EPOCH)?,
        parents,
        encrypted_diffs: decode_encrypted(fields.get(keys::commit::ENCRYPTED_DIFFS)?)?,
        sim_key_hash: SimKeyHash(fields.bytes32(keys::commit::SIM_KEY_HASH)?),
        timestamp: fields.int(keys::commit::TIMESTAMP)?,
    };

    ensure_canonical(bytes, &encode_commit(&commit), "commit")?;
    Ok(commit)
}

pub fn decode_head(bytes: &[u8]) -> Result<RawCommitHead, CoreError> {
    let value = parse(bytes)?;
    let fields = Fields::of(&value, "head")?;

    let head = RawCommitHead {
        repo: decode_repo(fields.get(keys::head::REPO)?)?,
        commit_id: CommitId::from_bytes(fields.bytes(keys::head::COMMIT_ID)?)?,
        timestamp: fields.int(keys::head::TIMESTAMP)?,
    };

    ensure_canonical(bytes, &encode_head(&head), "head")?;
    Ok(head)
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<RawSnapshot, CoreError> {
    let value = parse(bytes)?;
    let fields = Fields::of(&value, "snapshot")?;

    let snapshot = RawSnapshot {
        repo: decode_repo(fields.get(keys::snapshot::REPO)?)?,
        commit_id: CommitId::from_bytes(fields.bytes(keys::snapshot::COMMIT_ID)?)?,
        encrypted_diffs: decode_encrypted(fields.get(keys::snapshot::ENCRYPTED_DIFFS)?)?,
        sim_key_hash: SimKeyHash(fields.bytes32(keys::snapshot::SIM_KEY_HASH)?),
    };

    ensure_canonical(bytes, &encode_snapshot(&snapshot), "snapshot")?;
    Ok(snapshot)
}

pub fn decode_pull_request(bytes: &[u8]) -> Result<RawPullRequest, CoreError> {
    let value = parse(bytes)?;
    let fields = Fields::of(&value, "pull request")?;

    let request = RawPullRequest {
        repo: decode_repo(fields.get(keys::pull_request::REPO)?)?,
        fork: decode_repo(fields.get(keys::pull_request::FORK)?)?,
    };

    ensure_canonical(bytes, &encode_pull_request(&request), "pull request")?;
    Ok(request)
}

fn decode_repo(value: &Value) -> Result<RepoId, CoreError> {
    let fields = Fields::of(value, "repo")?;
    Ok(RepoId {
        owner: Ed25519PublicKey(fields.bytes32(keys::repo::OWNER)?),
        name: fields.text(keys::repo::NAME)?.to_owned(),
    })
}

fn decode_encrypted(value: &Value) -> Result<EncryptedData, CoreError> {
    let fields = Fields::of(value, "encrypted data")?;
    let nonce: [u8; 12] = fields
        .bytes(keys::encrypted::NONCE)?
        .try_into()
        .map_err(|_| CoreError::MalformedRecord("encrypted data: nonce must be 12 bytes".into()))?;
    Ok(EncryptedData {
        nonce,
        ciphertext: fields.bytes(keys::encrypted::CIPHERTEXT)?.to_vec(),
    })
}

fn parse(bytes: &[u8]) -> Result<Value, CoreError> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}

fn ensure_canonical(input: &[u8], reencoded: &[u8], what: &str) -> Result<(), CoreError> {
    if input != reencoded {
        return Err(CoreError::MalformedRecord(format!(
            "{what}: non-canonical encoding"
        )));
    }
    Ok(())
}

/// Typed access to a CBOR map with integer keys.
struct Fields<'a> {
    map: &'a [(Value, Value)],
    what: &'static str,
}

impl<'a> Fields<'a> {
    fn of(value: &'a Value, what: &'static str) -> Result<Self, CoreError> {
        match value {
            Value::Map(map) => Ok(Self { map, what }),
            _ => Err(CoreError::MalformedRecord(format!("{what}: expected map"))),
        }
    }

    fn get(&self, key: u64) -> Result<&'a Value, CoreError> {
        self.map
            .iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == i128::from(key)))
            .map(|(_, v)| v)
            .ok_or_else(|| self.malformed(key, "missing"))
    }

    fn uint(&self, key: u64) -> Result<u64, CoreError> {
        match self.get(key)? {
            Value::Integer(i) => {
                u64::try_from(i128::from(*i)).map_err(|_| self.malformed(key, "out of range"))
            }
            _ => Err(self.malformed(key, "expected unsigned integer")),
        }
    }

    fn int(&self, key: u64) -> Result<i64, CoreError> {
        match self.get(key)? {
            Value::Integer(i) => {
                i64::try_from(i128::from(*i)).map_err(|_| self.malformed(key, "out of range"))
            }
            _ => Err(self.malformed(key, "expected integer")),
        }
    }

    fn bytes(&self, key: u64) -> Result<&'a [u8], CoreError> {
        match self.get(key)? {
            Value::Bytes(b) => Ok(b),
            _ => Err(self.malformed(key, "expected bytes")),
        }
    }

    fn bytes32(&self, key: u64) -> Result<[u8; 32], CoreError> {
        self.bytes(key)?
            .try_into()
            .map_err(|_| self.malformed(key, "expected 32 bytes"))
    }

    fn text(&self, key: u64) -> Result<&'a str, CoreError> {
        match self.get(key)? {
            Value::Text(s) => Ok(s),
            _ => Err(self.malformed(key, "expected text")),
        }
    }

    fn array(&self, key: u64) -> Result<&'a [Value], CoreError> {
        match self.get(key)? {
            Value::Array(items) => Ok(items),
            _ => Err(self.malformed(key, "expected array")),
        }
    }

    fn malformed(&self, key: u64, problem: &str) -> CoreError {
        CoreError::MalformedRecord(format!("{}: field {key}: {problem}", self.what))
    }
}
