//! Reconciliation and replication: identity merge, sport and result normalization,
//! freshness reporting, the processing run and the sync engine.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use podium_core::DatasetDocument;
use podium_storage::{MemoryStore, RemoteStore, RestStore, StoreConfig};
use tracing::info;

pub mod audit;
pub mod freshness;
pub mod merge;
pub mod pipeline;
pub mod remote;
pub mod results;
pub mod sport;

pub use audit::{audit_dataset, AuditReport, OrderIssue};
pub use freshness::{summarize_freshness, FreshnessReport, StaleAthlete};
pub use merge::{is_native_script, merge_identities, merge_record, MergedIdentity};
pub use pipeline::{
    build_canonical_athletes, run_process, HealthReport, PipelineConfig, ProcessSummary,
};
pub use remote::{
    build_rows, build_sync_detail, result_uid, sync_run_id_for, SyncConfig, SyncEngine, SyncError,
    SyncOutcome, SyncRunRecord, SyncStage,
};
pub use results::{normalize_results, RankedResults};
pub use sport::resolve_sport;

pub const CRATE_NAME: &str = "podium-sync";

pub async fn load_dataset(path: &Path) -> Result<DatasetDocument> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading dataset {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing dataset {}", path.display()))
}

pub async fn run_audit(data_path: &Path) -> Result<AuditReport> {
    let document = load_dataset(data_path).await?;
    let report = audit_dataset(&document);
    info!(
        athletes = report.athletes,
        order_issues = report.order_issue_count,
        "dataset audited"
    );
    Ok(report)
}

/// Replicates the dataset at `data_path`. Dry runs use an in-memory store and need no
/// store credentials. A store failure surfaces as a [`SyncError`] inside the error chain.
pub async fn run_sync_from_env(
    data_path: &Path,
    health_path: &Path,
    source: Option<&str>,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<SyncOutcome> {
    let mut config = SyncConfig::from_env();
    if let Some(source) = source {
        config.source = source.to_string();
    }

    let store: Arc<dyn RemoteStore> = if dry_run {
        info!("dry run: syncing into an in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(RestStore::new(StoreConfig::from_env()?)?)
    };

    let document = load_dataset(data_path).await?;
    let detail = build_sync_detail(data_path, health_path, &config.source).await;
    let engine = SyncEngine::new(store, config.chunk_size);
    let outcome = engine.run(&document, detail, &config.source, now).await?;
    Ok(outcome)
}
