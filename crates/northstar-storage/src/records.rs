//! Structured record stores.
//!
//! `FileRecordStore` reads the insurance data layout from a records
//! directory:
//!
//! ```text
//! records/
//!   policies.json          { "AUTO-10001": { ...policy... }, ... }
//!   document_rules.json    { "auto_theft": ["police_report", ...], ... }
//!   claims/CLM-XXXXXXXX.json
//! ```
//!
//! Policies and document rules are loaded once and cached. Claims are read
//! per lookup, one file each.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use northstar_core::error::CapabilityError;
use northstar_core::types::{RecordKind, RecordRequest, RecordResponse};
use northstar_core::RecordStore;

const MAX_KEY_LEN: usize = 64;

/// Keys end up in file paths, so only a conservative charset is accepted.
fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Record store backed by JSON files on disk.
#[derive(Debug)]
pub struct FileRecordStore {
    root: PathBuf,
    policies: OnceCell<HashMap<String, Value>>,
    rules: OnceCell<HashMap<String, Vec<String>>>,
}

impl FileRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            policies: OnceCell::new(),
            rules: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn policies(&self) -> Result<&HashMap<String, Value>, CapabilityError> {
        self.policies
            .get_or_try_init(|| read_json_map(self.root.join("policies.json")))
            .await
    }

    async fn rules(&self) -> Result<&HashMap<String, Vec<String>>, CapabilityError> {
        self.rules
            .get_or_try_init(|| read_json_map(self.root.join("document_rules.json")))
            .await
    }

    async fn claim(&self, key: &str) -> Result<Option<Value>, CapabilityError> {
        let path = self.root.join("claims").join(format!("{}.json", key));
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).map(Some).map_err(|e| {
                CapabilityError::Unavailable(format!("corrupt claim {}: {}", key, e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CapabilityError::Unavailable(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Read a JSON object file. A missing file is an empty map.
async fn read_json_map<T>(path: PathBuf) -> Result<HashMap<String, T>, CapabilityError>
where
    T: serde::de::DeserializeOwned,
{
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => {
            let map: HashMap<String, T> = serde_json::from_str(&content).map_err(|e| {
                CapabilityError::Unavailable(format!("corrupt {}: {}", path.display(), e))
            })?;
            info!(path = %path.display(), entries = map.len(), "Record table loaded");
            Ok(map)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Record table missing, treating as empty");
            Ok(HashMap::new())
        }
        Err(e) => Err(CapabilityError::Unavailable(format!(
            "failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn lookup(&self, request: &RecordRequest) -> Result<RecordResponse, CapabilityError> {
        if !is_safe_key(&request.key) {
            return Ok(RecordResponse::not_found());
        }

        let payload = match request.kind {
            RecordKind::Policy => self.policies().await?.get(&request.key).cloned(),
            RecordKind::Claim => self.claim(&request.key).await?,
            RecordKind::DocumentRule => self.rules().await?.get(&request.key).map(|docs| {
                json!({
                    "loss_type": request.key,
                    "required_documents": docs,
                })
            }),
        };

        Ok(match payload {
            Some(value) => RecordResponse::found(value),
            None => RecordResponse::not_found(),
        })
    }
}

/// Record store over an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: HashMap<(RecordKind, String), Value>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, kind: RecordKind, key: impl Into<String>, payload: Value) -> Self {
        self.insert(kind, key, payload);
        self
    }

    pub fn insert(&mut self, kind: RecordKind, key: impl Into<String>, payload: Value) {
        self.records.insert((kind, key.into()), payload);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn lookup(&self, request: &RecordRequest) -> Result<RecordResponse, CapabilityError> {
        Ok(self
            .records
            .get(&(request.kind, request.key.clone()))
            .cloned()
            .map(RecordResponse::found)
            .unwrap_or_else(RecordResponse::not_found))
    }
}
