//! Vintage source contracts, adapter implementations and the generation loader.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use podium_core::{RawBatch, VintageRecord};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, info_span, warn};

pub const CRATE_NAME: &str = "podium-adapters";

/// Records of one generation keyed by canonical federation code.
pub type GenerationTable = BTreeMap<String, VintageRecord>;

/// One prior generation of the dataset. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Generation {
    pub label: String,
    pub table: GenerationTable,
}

impl Generation {
    pub fn new(label: impl Into<String>, table: GenerationTable) -> Self {
        Self {
            label: label.into(),
            table,
        }
    }

    pub fn empty(label: impl Into<String>) -> Self {
        Self::new(label, GenerationTable::new())
    }

    pub fn get(&self, federation_code: &str) -> Option<&VintageRecord> {
        self.table.get(federation_code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VintageKind {
    /// A dataset document with a top-level `athletes` array.
    Dataset,
    /// A packaged script bundle embedding the athlete array between two markers.
    Bundle,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VintageRegistry {
    #[serde(default)]
    pub vintages: Vec<VintageSourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VintageSourceConfig {
    pub label: String,
    pub kind: VintageKind,
    pub path: PathBuf,
    #[serde(default)]
    pub array_start: Option<String>,
    #[serde(default)]
    pub array_end: Option<String>,
    /// Source field name -> record field name.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum VintageError {
    #[error("vintage source {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("vintage source {path} is malformed: {message}")]
    Malformed { path: PathBuf, message: String },
    #[error("array markers not found in {path}")]
    MarkerNotFound { path: PathBuf },
    #[error("vintage {label} is misconfigured: {message}")]
    Misconfigured { label: String, message: String },
}

impl VintageError {
    pub fn is_absent_source(&self) -> bool {
        matches!(
            self,
            VintageError::Unreadable { source, .. }
                if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

/// Capability that turns one generation source into a federation-code keyed table.
pub trait VintageAdapter: Send + Sync {
    fn label(&self) -> &str;
    fn load(&self) -> Result<GenerationTable, VintageError>;
}

/// Reads a dataset document (the previous pipeline output or any compatible export).
#[derive(Debug, Clone)]
pub struct DatasetVintage {
    label: String,
    path: PathBuf,
    fields: BTreeMap<String, String>,
}

impl DatasetVintage {
    pub fn new(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, String>) -> Self {
        self.fields = fields;
        self
    }
}

impl VintageAdapter for DatasetVintage {
    fn label(&self) -> &str {
        &self.label
    }

    fn load(&self) -> Result<GenerationTable, VintageError> {
        let text = read_source(&self.path)?;
        let value: JsonValue = serde_json::from_str(&text).map_err(|e| VintageError::Malformed {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let Some(athletes) = value.get("athletes").and_then(JsonValue::as_array) else {
            return Err(VintageError::Malformed {
                path: self.path.clone(),
                message: "missing athletes array".to_string(),
            });
        };
        Ok(records_to_table(athletes, &self.fields))
    }
}

/// Best-effort extraction of an athlete array embedded in a packaged script bundle.
#[derive(Debug, Clone)]
pub struct BundleVintage {
    label: String,
    path: PathBuf,
    array_start: String,
    array_end: String,
    fields: BTreeMap<String, String>,
}

impl BundleVintage {
    pub fn new(
        label: impl Into<String>,
        path: impl Into<PathBuf>,
        array_start: impl Into<String>,
        array_end: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
            array_start: array_start.into(),
            array_end: array_end.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, String>) -> Self {
        self.fields = fields;
        self
    }

    fn embedded_array<'a>(&self, text: &'a str) -> Option<&'a str> {
        let start = text.find(&self.array_start)? + self.array_start.len();
        let end = start + text[start..].find(&self.array_end)?;
        let slice = text[start..end].trim();
        slice.starts_with('[').then_some(slice)
    }
}

impl VintageAdapter for BundleVintage {
    fn label(&self) -> &str {
        &self.label
    }

    fn load(&self) -> Result<GenerationTable, VintageError> {
        let text = read_source(&self.path)?;
        let Some(array_text) = self.embedded_array(&text) else {
            return Err(VintageError::MarkerNotFound {
                path: self.path.clone(),
            });
        };
        let value: JsonValue =
            serde_json::from_str(array_text).map_err(|e| VintageError::Malformed {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        let records = value.as_array().map(Vec::as_slice).unwrap_or_default();
        Ok(records_to_table(records, &self.fields))
    }
}

fn read_source(path: &Path) -> Result<String, VintageError> {
    fs::read_to_string(path).map_err(|source| VintageError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

fn records_to_table(records: &[JsonValue], fields: &BTreeMap<String, String>) -> GenerationTable {
    let mut table = GenerationTable::new();
    for raw in records {
        let renamed = rename_fields(raw, fields);
        let Ok(record) = serde_json::from_value::<VintageRecord>(renamed) else {
            continue;
        };
        let Some(code) = record.federation_code.clone() else {
            continue;
        };
        table.insert(code, record);
    }
    table
}

fn rename_fields(raw: &JsonValue, fields: &BTreeMap<String, String>) -> JsonValue {
    let JsonValue::Object(map) = raw else {
        return raw.clone();
    };
    if fields.is_empty() {
        return raw.clone();
    }
    let mut out = serde_json::Map::with_capacity(map.len());
    for (key, value) in map {
        let target = fields.get(key).unwrap_or(key);
        // A renamed field wins over a same-named field already present.
        if fields.contains_key(key) || !out.contains_key(target) {
            out.insert(target.clone(), value.clone());
        }
    }
    JsonValue::Object(out)
}

pub fn adapter_for_source(
    config: &VintageSourceConfig,
    base_dir: &Path,
) -> Result<Box<dyn VintageAdapter>, VintageError> {
    let path = base_dir.join(&config.path);
    match config.kind {
        VintageKind::Dataset => Ok(Box::new(
            DatasetVintage::new(config.label.clone(), path).with_fields(config.fields.clone()),
        )),
        VintageKind::Bundle => {
            let (Some(start), Some(end)) = (&config.array_start, &config.array_end) else {
                return Err(VintageError::Misconfigured {
                    label: config.label.clone(),
                    message: "bundle sources need array_start and array_end".to_string(),
                });
            };
            Ok(Box::new(
                BundleVintage::new(config.label.clone(), path, start.clone(), end.clone())
                    .with_fields(config.fields.clone()),
            ))
        }
    }
}

/// Reads the registry; a missing file means no prior generations are configured.
pub fn load_vintage_registry(path: impl AsRef<Path>) -> Result<VintageRegistry> {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "no vintage registry; merging without prior generations");
        return Ok(VintageRegistry {
            vintages: Vec::new(),
        });
    }
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Loads every configured generation, highest trust first. A source that cannot be
/// read degrades to an empty table; it never fails the run.
pub fn load_generations(registry: &VintageRegistry, base_dir: &Path) -> Vec<Generation> {
    registry
        .vintages
        .iter()
        .map(|config| {
            let span = info_span!("vintage", label = %config.label);
            let _guard = span.enter();
            let loaded = adapter_for_source(config, base_dir).and_then(|adapter| adapter.load());
            match loaded {
                Ok(table) => {
                    info!(records = table.len(), "loaded vintage");
                    Generation::new(config.label.clone(), table)
                }
                Err(err) if err.is_absent_source() => {
                    info!("vintage source absent; treating as empty");
                    Generation::empty(config.label.clone())
                }
                Err(err) => {
                    warn!(error = %err, "vintage source unusable; treating as empty");
                    Generation::empty(config.label.clone())
                }
            }
        })
        .collect()
}

/// Like [`load_generations`], but an unreadable or malformed registry also degrades to
/// "no prior generations" instead of failing the run.
pub fn load_generations_from_registry(path: impl AsRef<Path>) -> Vec<Generation> {
    let path = path.as_ref();
    let registry = match load_vintage_registry(path) {
        Ok(registry) => registry,
        Err(err) => {
            warn!(
                path = %path.display(),
                error = ?err,
                "vintage registry unusable; merging without prior generations"
            );
            return Vec::new();
        }
    };
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    load_generations(&registry, base_dir)
}

/// Output document of the external profile source.
pub fn load_raw_batch(path: impl AsRef<Path>) -> Result<RawBatch> {
    read_json_file(path)
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}
