//! Fixture repositories signed at test-run time rather than checked in as
//! static JSON: each test builds exactly the root/timestamp/snapshot/targets
//! combination its scenario needs, with real ed25519 signatures over the
//! canonical encoding `trustframe` itself verifies against.
#![allow(dead_code)]

use aws_lc_rs::digest::{digest, SHA256};
use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{Ed25519KeyPair, KeyPair};
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let out = digest(&SHA256, bytes);
    let mut buf = [0u8; 32];
    buf.copy_from_slice(out.as_ref());
    buf
}

/// One ed25519 signing key plus the wire form `trustframe` expects in a
/// root or delegations `keys` map.
pub struct Key {
    pub keypair: Ed25519KeyPair,
    pub id: String,
    pub json: Value,
}

pub fn new_key() -> Key {
    let rng = SystemRandom::new();
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
    let keypair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
    let public_hex = hex::encode(keypair.public_key().as_ref());
    let json = json!({
        "keytype": "ed25519",
        "scheme": "ed25519",
        "keyval": {"public": public_hex},
    });
    let canonical = trustframe_cjson::to_canonical_vec(&json).unwrap();
    let id = hex::encode(sha256(&canonical));
    Key { keypair, id, json }
}

/// Wraps `payload` in a `{signed, signatures}` envelope, signed by `keys`
/// (threshold signing: one signature per key, in order).
pub fn sign(payload: Value, keys: &[&Key]) -> Value {
    let canonical = trustframe_cjson::to_canonical_vec(&payload).unwrap();
    let signatures: Vec<Value> = keys
        .iter()
        .map(|key| {
            let sig = key.keypair.sign(&canonical);
            json!({"keyid": key.id, "sig": hex::encode(sig.as_ref())})
        })
        .collect();
    json!({"signed": payload, "signatures": signatures})
}

pub fn expires_in(days: i64) -> String {
    (Utc::now() + Duration::days(days)).to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn root_payload(
    version: u64,
    expires: &str,
    consistent_snapshot: bool,
    all_keys: &[&Key],
    role_keys: &[(&str, &[&Key], u64)],
) -> Value {
    let mut keys = Map::new();
    for key in all_keys {
        keys.insert(key.id.clone(), key.json.clone());
    }
    let mut roles = Map::new();
    for (name, keys_for_role, threshold) in role_keys {
        roles.insert(
            (*name).to_string(),
            json!({
                "keyids": keys_for_role.iter().map(|k| k.id.clone()).collect::<Vec<_>>(),
                "threshold": threshold,
            }),
        );
    }
    json!({
        "type": "root",
        "spec_version": "1.0.31",
        "version": version,
        "expires": expires,
        "consistent_snapshot": consistent_snapshot,
        "keys": Value::Object(keys),
        "roles": Value::Object(roles),
    })
}

pub fn timestamp_payload(version: u64, expires: &str, snapshot_version: u64) -> Value {
    json!({
        "type": "timestamp",
        "spec_version": "1.0.31",
        "version": version,
        "expires": expires,
        "meta": {"snapshot.json": {"version": snapshot_version}},
    })
}

pub fn snapshot_payload(version: u64, expires: &str, meta: &[(&str, u64)]) -> Value {
    let mut m = Map::new();
    for (name, ver) in meta {
        m.insert((*name).to_string(), json!({"version": ver}));
    }
    json!({
        "type": "snapshot",
        "spec_version": "1.0.31",
        "version": version,
        "expires": expires,
        "meta": Value::Object(m),
    })
}

pub fn targets_payload(
    version: u64,
    expires: &str,
    targets: &[(&str, &[u8])],
    delegations: Option<Value>,
) -> Value {
    let mut m = Map::new();
    for (path, bytes) in targets {
        m.insert(
            (*path).to_string(),
            json!({"length": bytes.len(), "hashes": {"sha256": hex::encode(sha256(bytes))}}),
        );
    }
    let mut v = json!({
        "type": "targets",
        "spec_version": "1.0.31",
        "version": version,
        "expires": expires,
        "targets": Value::Object(m),
    });
    if let Some(d) = delegations {
        v["delegations"] = d;
    }
    v
}

pub fn delegations_block(keys: &[&Key], roles: &[Value]) -> Value {
    let mut keys_map = Map::new();
    for key in keys {
        keys_map.insert(key.id.clone(), key.json.clone());
    }
    json!({"keys": Value::Object(keys_map), "roles": roles})
}

pub fn delegated_role(name: &str, keys: &[&Key], threshold: u64, paths: &[&str], terminating: bool) -> Value {
    json!({
        "name": name,
        "keyids": keys.iter().map(|k| k.id.clone()).collect::<Vec<_>>(),
        "threshold": threshold,
        "paths": paths,
        "terminating": terminating,
    })
}

pub fn write_json(dir: &Path, name: &str, value: &Value) {
    std::fs::write(dir.join(name), serde_json::to_vec(value).unwrap()).unwrap();
}

/// A minimal, valid repository: one ed25519 key per role, no delegations,
/// no consistent-snapshot prefixing, one target `hello.txt`. Every role
/// expires a year out. Tests that need to deviate write additional/
/// replacement files into `metadata`/`targets` directly.
pub struct Repo {
    pub dir: TempDir,
    pub metadata: PathBuf,
    pub targets: PathBuf,
    pub root_key: Key,
    pub timestamp_key: Key,
    pub snapshot_key: Key,
    pub targets_key: Key,
}

pub const HELLO_CONTENTS: &[u8] = b"hello world";

impl Repo {
    pub fn basic() -> Self {
        let dir = TempDir::new().unwrap();
        let metadata = dir.path().join("metadata");
        let targets = dir.path().join("targets");
        std::fs::create_dir_all(&metadata).unwrap();
        std::fs::create_dir_all(&targets).unwrap();

        let root_key = new_key();
        let timestamp_key = new_key();
        let snapshot_key = new_key();
        let targets_key = new_key();
        let expires = expires_in(365);

        let root = root_payload(
            1,
            &expires,
            false,
            &[&root_key, &timestamp_key, &snapshot_key, &targets_key],
            &[
                ("root", &[&root_key], 1),
                ("timestamp", &[&timestamp_key], 1),
                ("snapshot", &[&snapshot_key], 1),
                ("targets", &[&targets_key], 1),
            ],
        );
        let signed_root = sign(root, &[&root_key]);
        write_json(&metadata, "1.root.json", &signed_root);
        write_json(&metadata, "root.json", &signed_root);

        std::fs::write(targets.join("hello.txt"), HELLO_CONTENTS).unwrap();
        let targets_doc = targets_payload(1, &expires, &[("hello.txt", HELLO_CONTENTS)], None);
        write_json(&metadata, "targets.json", &sign(targets_doc, &[&targets_key]));

        let snapshot = snapshot_payload(1, &expires, &[("targets.json", 1)]);
        write_json(&metadata, "snapshot.json", &sign(snapshot, &[&snapshot_key]));

        let timestamp = timestamp_payload(1, &expires, 1);
        write_json(&metadata, "timestamp.json", &sign(timestamp, &[&timestamp_key]));

        Self { dir, metadata, targets, root_key, timestamp_key, snapshot_key, targets_key }
    }

    pub fn metadata_url(&self) -> String {
        dir_url(&self.metadata)
    }

    pub fn targets_url(&self) -> String {
        dir_url(&self.targets)
    }

    pub fn initial_root(&self) -> Vec<u8> {
        std::fs::read(self.metadata.join("1.root.json")).unwrap()
    }
}

pub fn dir_url(path: &Path) -> String {
    url::Url::from_directory_path(path).unwrap().to_string()
}
