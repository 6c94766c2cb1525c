//! Atomic document writes + the remote keyed store the sync engine replicates into.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "podium-storage";

pub const ATHLETES_TABLE: &str = "athletes";
pub const RESULTS_TABLE: &str = "athlete_results";
pub const SYNC_LOG_TABLE: &str = "sync_logs";

const ERROR_BODY_LIMIT: usize = 500;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Replace `path` with `bytes` via a temp file in the same directory and a rename,
/// so readers never observe a half-written document.
pub async fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

/// Pretty-printed JSON, written atomically.
pub async fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    write_bytes_atomic(path, &bytes).await
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to [{table}] failed: {source}")]
    Request {
        table: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("[{table}] responded {status}: {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },
    #[error("encoding rows for [{table}]: {source}")]
    Encode {
        table: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Keyed store with upsert-on-conflict, generation sweep and an append-only log.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert or merge `rows`, matching existing rows on `conflict_key`.
    async fn upsert(
        &self,
        table: &str,
        conflict_key: &str,
        rows: &[Value],
    ) -> Result<(), StoreError>;

    /// Delete every row whose `sync_run_id` differs from `sync_run_id`.
    async fn delete_except_run(&self, table: &str, sync_run_id: &str) -> Result<(), StoreError>;

    async fn append(&self, table: &str, record: &Value) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    pub service_key: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl StoreConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            base_url: required_env("PODIUM_STORE_URL")?,
            service_key: required_env("PODIUM_STORE_KEY")?,
            timeout: Duration::from_secs(
                std::env::var("PODIUM_STORE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            user_agent: std::env::var("PODIUM_USER_AGENT").ok(),
        })
    }
}

fn required_env(name: &str) -> anyhow::Result<String> {
    let value = std::env::var(name).unwrap_or_default();
    let value = value.trim();
    if value.is_empty() {
        anyhow::bail!("missing required env var: {name}");
    }
    Ok(value.to_string())
}

/// PostgREST-style HTTP store authenticated with a static bearer key.
#[derive(Debug)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl RestStore {
    pub fn new(config: StoreConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key,
        })
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn send(&self, table: &str, builder: reqwest::RequestBuilder) -> Result<(), StoreError> {
        let resp = self
            .authorized(builder)
            .send()
            .await
            .map_err(|source| StoreError::Request {
                table: table.to_string(),
                source,
            })?;
        let status = resp.status();
        if status.as_u16() < 300 {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::Status {
            table: table.to_string(),
            status: status.as_u16(),
            body: truncate_body(&body),
        })
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn upsert(
        &self,
        table: &str,
        conflict_key: &str,
        rows: &[Value],
    ) -> Result<(), StoreError> {
        debug!(table, rows = rows.len(), "upserting chunk");
        let builder = self
            .client
            .post(self.table_url(table))
            .query(&[("on_conflict", conflict_key)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);
        self.send(table, builder).await
    }

    async fn delete_except_run(&self, table: &str, sync_run_id: &str) -> Result<(), StoreError> {
        let filter = format!("neq.{sync_run_id}");
        let builder = self
            .client
            .delete(self.table_url(table))
            .query(&[("sync_run_id", filter.as_str())])
            .header("Prefer", "return=minimal");
        self.send(table, builder).await
    }

    async fn append(&self, table: &str, record: &Value) -> Result<(), StoreError> {
        let builder = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(&[record]);
        self.send(table, builder).await
    }
}

pub fn truncate_body(body: &str) -> String {
    body.chars().take(ERROR_BODY_LIMIT).collect()
}

/// In-process store with the same semantics as the REST store. Backs dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, BTreeMap<String, Value>>,
    logs: BTreeMap<String, Vec<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of a keyed table, ordered by key.
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn row_count(&self, table: &str) -> usize {
        let state = self.state.lock().await;
        state.tables.get(table).map(BTreeMap::len).unwrap_or(0)
    }

    pub async fn appended(&self, table: &str) -> Vec<Value> {
        let state = self.state.lock().await;
        state.logs.get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn upsert(
        &self,
        table: &str,
        conflict_key: &str,
        rows: &[Value],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let stored = state.tables.entry(table.to_string()).or_default();
        for row in rows {
            let Some(key) = row.get(conflict_key).and_then(key_string) else {
                return Err(StoreError::Status {
                    table: table.to_string(),
                    status: 400,
                    body: format!("row is missing conflict key {conflict_key}"),
                });
            };
            if let (Some(Value::Object(existing)), Value::Object(incoming)) =
                (stored.get_mut(&key), row)
            {
                for (column, value) in incoming {
                    existing.insert(column.clone(), value.clone());
                }
                continue;
            }
            stored.insert(key, row.clone());
        }
        Ok(())
    }

    async fn delete_except_run(&self, table: &str, sync_run_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(stored) = state.tables.get_mut(table) {
            // `neq` never matches NULL, so untagged rows survive the sweep.
            stored.retain(|_, row| match row.get("sync_run_id").and_then(Value::as_str) {
                Some(id) => id == sync_run_id,
                None => true,
            });
        }
        Ok(())
    }

    async fn append(&self, table: &str, record: &Value) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .logs
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }
}

fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
