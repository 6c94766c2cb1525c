//! Sync engine: replicates a dataset document into a remote store.
//!
//! Each run tags every row it writes with its own `sync_run_id`. Once both tables are
//! written, rows carrying any other id are swept. A failure between the two phases can
//! leave rows from two runs side by side; the next successful run removes them.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use podium_core::{CanonicalAthlete, DatasetDocument, NormalizedResult, SportKey};
use podium_storage::{
    sha256_hex, RemoteStore, StoreError, ATHLETES_TABLE, RESULTS_TABLE, SYNC_LOG_TABLE,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::freshness::parse_event_date;

pub const ATHLETE_CONFLICT_KEY: &str = "federation_code";
pub const RESULT_CONFLICT_KEY: &str = "result_uid";
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_SOURCE: &str = "pipeline";

const RUN_ID_FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Build,
    UpsertAthletes,
    UpsertResults,
    PruneStale,
    LogSuccess,
    LogFailure,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::Build => "build",
            SyncStage::UpsertAthletes => "upsert_athletes",
            SyncStage::UpsertResults => "upsert_results",
            SyncStage::PruneStale => "prune_stale",
            SyncStage::LogSuccess => "log_success",
            SyncStage::LogFailure => "log_failure",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("sync failed at {stage}: {source}")]
pub struct SyncError {
    pub stage: SyncStage,
    #[source]
    pub source: StoreError,
}

impl SyncError {
    fn at(stage: SyncStage) -> impl FnOnce(StoreError) -> SyncError {
        move |source| SyncError { stage, source }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteRow {
    pub federation_code: String,
    pub id: Uuid,
    pub local_name: String,
    pub display_name: String,
    pub birth_date: Option<String>,
    pub birth_year: Option<i32>,
    pub age: Option<i32>,
    pub sport: SportKey,
    pub sport_label: String,
    pub team: String,
    pub url: Option<String>,
    pub current_rank: Option<u32>,
    pub best_rank: Option<u32>,
    pub season_starts: usize,
    pub medals_gold: u32,
    pub medals_silver: u32,
    pub medals_bronze: u32,
    pub source_updated_at: DateTime<Utc>,
    pub synced_at: DateTime<Utc>,
    pub sync_run_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub result_uid: String,
    pub federation_code: String,
    pub event_date: String,
    pub place: Option<String>,
    pub category: Option<String>,
    pub discipline: String,
    pub rank: Option<u32>,
    pub rank_status: Option<String>,
    pub points: f64,
    pub cup_points: Option<f64>,
    pub source_updated_at: DateTime<Utc>,
    pub synced_at: DateTime<Utc>,
    pub sync_run_id: String,
}

/// Content-addressed id of a result: digest of its identifying fields, in a fixed order.
pub fn result_uid(federation_code: &str, result: &NormalizedResult) -> String {
    let discipline = result.discipline.as_deref().unwrap_or(&result.event);
    let parts = [
        federation_code.to_string(),
        result.date.clone(),
        result.place.clone().unwrap_or_default(),
        result.category.clone().unwrap_or_default(),
        discipline.to_string(),
        result.rank.map(|r| r.to_string()).unwrap_or_default(),
        result.rank_status.clone().unwrap_or_default(),
        result.points.to_string(),
        result.cup_points.map(|p| p.to_string()).unwrap_or_default(),
    ];
    sha256_hex(parts.join("|").as_bytes())
}

fn athlete_row(
    athlete: &CanonicalAthlete,
    federation_code: &str,
    sync_run_id: &str,
    source_updated_at: DateTime<Utc>,
    synced_at: DateTime<Utc>,
) -> AthleteRow {
    AthleteRow {
        federation_code: federation_code.to_string(),
        id: athlete.id,
        local_name: athlete.local_name.clone(),
        display_name: athlete.display_name.clone(),
        birth_date: athlete.birth_date.clone(),
        birth_year: athlete.birth_year,
        age: athlete.age,
        sport: athlete.sport,
        sport_label: athlete.sport_label.clone(),
        team: athlete.team.clone(),
        url: athlete.url.clone(),
        current_rank: athlete.current_rank,
        best_rank: athlete.best_rank,
        season_starts: athlete.season_starts,
        medals_gold: athlete.medals.gold,
        medals_silver: athlete.medals.silver,
        medals_bronze: athlete.medals.bronze,
        source_updated_at,
        synced_at,
        sync_run_id: sync_run_id.to_string(),
    }
}

fn result_row(
    federation_code: &str,
    result: &NormalizedResult,
    sync_run_id: &str,
    source_updated_at: DateTime<Utc>,
    synced_at: DateTime<Utc>,
) -> ResultRow {
    ResultRow {
        result_uid: result_uid(federation_code, result),
        federation_code: federation_code.to_string(),
        event_date: result.date.clone(),
        place: result.place.clone(),
        category: result.category.clone(),
        discipline: result
            .discipline
            .clone()
            .unwrap_or_else(|| result.event.clone()),
        rank: result.rank,
        rank_status: result.rank_status.clone(),
        points: result.points,
        cup_points: result.cup_points,
        source_updated_at,
        synced_at,
        sync_run_id: sync_run_id.to_string(),
    }
}

/// Rows of one run, deduplicated by conflict key.
#[derive(Debug, Clone, Default)]
pub struct SyncBatch {
    pub athletes: Vec<AthleteRow>,
    pub results: Vec<ResultRow>,
    pub max_event_date: Option<NaiveDate>,
}

/// Later rows replace earlier ones with the same key but keep the earlier position.
fn push_keyed<T>(rows: &mut Vec<T>, positions: &mut HashMap<String, usize>, key: &str, row: T) {
    match positions.get(key) {
        Some(&index) => rows[index] = row,
        None => {
            positions.insert(key.to_string(), rows.len());
            rows.push(row);
        }
    }
}

pub fn build_rows(document: &DatasetDocument, sync_run_id: &str, now: DateTime<Utc>) -> SyncBatch {
    let source_updated_at = document.metadata.last_updated;
    let mut batch = SyncBatch::default();
    let mut athlete_positions = HashMap::new();
    let mut result_positions = HashMap::new();

    for athlete in &document.athletes {
        let code = athlete.federation_code.trim();
        if code.is_empty() {
            warn!(id = %athlete.id, "athlete without federation code not synced");
            continue;
        }

        let row = athlete_row(athlete, code, sync_run_id, source_updated_at, now);
        push_keyed(&mut batch.athletes, &mut athlete_positions, code, row);

        for result in &athlete.recent_results {
            let row = result_row(code, result, sync_run_id, source_updated_at, now);
            if let Some(date) = parse_event_date(&row.event_date) {
                batch.max_event_date = batch.max_event_date.max(Some(date));
            }
            let key = row.result_uid.clone();
            push_keyed(&mut batch.results, &mut result_positions, &key, row);
        }
    }

    batch
}

pub fn sync_run_id_for(now: DateTime<Utc>) -> String {
    now.format(RUN_ID_FORMAT).to_string()
}

/// Audit entry appended once per run, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRunRecord {
    pub sync_run_id: String,
    pub source: String,
    pub success: bool,
    pub athletes_count: usize,
    pub results_count: usize,
    pub max_event_date: Option<NaiveDate>,
    pub detail: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub sync_run_id: String,
    pub athletes: usize,
    pub results: usize,
    pub max_event_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub chunk_size: usize,
    pub source: String,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            chunk_size: std::env::var("PODIUM_SYNC_CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size: &usize| *size > 0)
                .unwrap_or(DEFAULT_CHUNK_SIZE),
            source: std::env::var("PODIUM_SYNC_SOURCE")
                .unwrap_or_else(|_| DEFAULT_SOURCE.to_string()),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            source: DEFAULT_SOURCE.to_string(),
        }
    }
}

/// Detail blob for the audit record. A readable health report is embedded; one that
/// exists but does not parse is flagged instead.
pub async fn build_sync_detail(
    data_path: &Path,
    health_path: &Path,
    source: &str,
) -> Map<String, Value> {
    let mut detail = Map::new();
    detail.insert("data_path".into(), Value::String(data_path.display().to_string()));
    detail.insert("health_path".into(), Value::String(health_path.display().to_string()));
    detail.insert("source".into(), Value::String(source.to_string()));

    if let Ok(bytes) = tokio::fs::read(health_path).await {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(health) => {
                detail.insert("health".into(), health);
            }
            Err(err) => {
                warn!(path = %health_path.display(), error = %err, "health report unreadable");
                detail.insert("health_parse_error".into(), Value::Bool(true));
            }
        }
    }
    detail
}

pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    chunk_size: usize,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn RemoteStore>, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Runs build, upserts and prune, then appends the audit record. A failing audit
    /// write is logged and never replaces the run's own outcome.
    pub async fn run(
        &self,
        document: &DatasetDocument,
        mut detail: Map<String, Value>,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome, SyncError> {
        let sync_run_id = sync_run_id_for(now);
        let span = info_span!("sync_run", sync_run_id = %sync_run_id, source);

        async move {
            let batch = build_rows(document, &sync_run_id, now);
            let outcome = SyncOutcome {
                sync_run_id: sync_run_id.clone(),
                athletes: batch.athletes.len(),
                results: batch.results.len(),
                max_event_date: batch.max_event_date,
            };

            match self.write_generation(&batch, &sync_run_id).await {
                Ok(()) => {
                    info!(
                        athletes = outcome.athletes,
                        results = outcome.results,
                        "sync generation written"
                    );
                    self.record_run(&outcome, source, true, detail, SyncStage::LogSuccess)
                        .await;
                    Ok(outcome)
                }
                Err(err) => {
                    warn!(stage = %err.stage, error = %err, "sync run failed");
                    detail.insert("error".into(), Value::String(err.to_string()));
                    self.record_run(&outcome, source, false, detail, SyncStage::LogFailure)
                        .await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn write_generation(
        &self,
        batch: &SyncBatch,
        sync_run_id: &str,
    ) -> Result<(), SyncError> {
        let athletes = encode_rows(ATHLETES_TABLE, &batch.athletes)
            .map_err(SyncError::at(SyncStage::Build))?;
        let results = encode_rows(RESULTS_TABLE, &batch.results)
            .map_err(SyncError::at(SyncStage::Build))?;

        let stage = SyncStage::UpsertAthletes;
        self.upsert_chunks(ATHLETES_TABLE, ATHLETE_CONFLICT_KEY, &athletes)
            .instrument(info_span!("sync_stage", %stage))
            .await
            .map_err(SyncError::at(stage))?;

        let stage = SyncStage::UpsertResults;
        self.upsert_chunks(RESULTS_TABLE, RESULT_CONFLICT_KEY, &results)
            .instrument(info_span!("sync_stage", %stage))
            .await
            .map_err(SyncError::at(stage))?;

        let stage = SyncStage::PruneStale;
        async {
            // Results go first so no athlete is removed while rows referencing it remain.
            for table in [RESULTS_TABLE, ATHLETES_TABLE] {
                self.store.delete_except_run(table, sync_run_id).await?;
                info!(table, "swept rows from earlier runs");
            }
            Ok::<(), StoreError>(())
        }
        .instrument(info_span!("sync_stage", %stage))
        .await
        .map_err(SyncError::at(stage))
    }

    async fn upsert_chunks(
        &self,
        table: &str,
        conflict_key: &str,
        rows: &[Value],
    ) -> Result<(), StoreError> {
        for chunk in rows.chunks(self.chunk_size) {
            self.store.upsert(table, conflict_key, chunk).await?;
        }
        info!(table, rows = rows.len(), "upserted");
        Ok(())
    }

    async fn record_run(
        &self,
        outcome: &SyncOutcome,
        source: &str,
        success: bool,
        detail: Map<String, Value>,
        stage: SyncStage,
    ) {
        let record = SyncRunRecord {
            sync_run_id: outcome.sync_run_id.clone(),
            source: source.to_string(),
            success,
            athletes_count: outcome.athletes,
            results_count: outcome.results,
            max_event_date: outcome.max_event_date,
            detail,
        };
        let value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(err) => {
                warn!(%stage, error = %err, "encoding sync run record failed");
                return;
            }
        };
        if let Err(err) = self.store.append(SYNC_LOG_TABLE, &value).await {
            warn!(%stage, error = %err, "sync run record not written");
        }
    }
}

fn encode_rows<T: Serialize>(table: &str, rows: &[T]) -> Result<Vec<Value>, StoreError> {
    rows.iter()
        .map(|row| {
            serde_json::to_value(row).map_err(|source| StoreError::Encode {
                table: table.to_string(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use podium_core::MedalTally;
    use podium_storage::MemoryStore;
    use serde_json::json;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).single().unwrap()
    }

    fn result(date: &str, rank: u32) -> NormalizedResult {
        NormalizedResult {
            date: date.to_string(),
            event: "Slalom".to_string(),
            rank: Some(rank),
            rank_status: None,
            points: 12.5,
            place: Some("Levi".to_string()),
            category: Some("World Cup".to_string()),
            discipline: None,
            cup_points: None,
        }
    }

    fn athlete(code: &str, results: Vec<NormalizedResult>) -> CanonicalAthlete {
        CanonicalAthlete {
            id: CanonicalAthlete::stable_id(code),
            federation_code: code.to_string(),
            local_name: format!("선수 {code}"),
            display_name: format!("Athlete {code}"),
            birth_date: None,
            birth_year: None,
            age: None,
            sport: SportKey::AlpineSkiing,
            sport_label: SportKey::AlpineSkiing.label().to_string(),
            team: "KOR".to_string(),
            url: None,
            current_rank: results.first().and_then(|r| r.rank),
            best_rank: results.iter().filter_map(|r| r.rank).min(),
            season_starts: results.len(),
            medals: MedalTally::default(),
            recent_results: results,
        }
    }

    fn document() -> DatasetDocument {
        DatasetDocument::new(
            vec![
                athlete("1", vec![result("2026-02-01", 3), result("2026-01-15", 8)]),
                athlete("2", vec![result("2026-02-10", 1)]),
            ],
            at(5),
        )
    }

    fn engine(store: Arc<dyn RemoteStore>) -> SyncEngine {
        SyncEngine::new(store, 1)
    }

    fn run_ids(rows: &[Value]) -> Vec<&str> {
        rows.iter()
            .filter_map(|row| row["sync_run_id"].as_str())
            .collect()
    }

    /// Memory store that rejects chosen operations.
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStore,
        fail_upsert_table: Option<&'static str>,
        fail_append: bool,
    }

    fn rejected(table: &str) -> StoreError {
        StoreError::Status {
            table: table.to_string(),
            status: 503,
            body: "unavailable".to_string(),
        }
    }

    #[async_trait]
    impl RemoteStore for FailingStore {
        async fn upsert(
            &self,
            table: &str,
            conflict_key: &str,
            rows: &[Value],
        ) -> Result<(), StoreError> {
            if self.fail_upsert_table == Some(table) {
                return Err(rejected(table));
            }
            self.inner.upsert(table, conflict_key, rows).await
        }

        async fn delete_except_run(
            &self,
            table: &str,
            sync_run_id: &str,
        ) -> Result<(), StoreError> {
            self.inner.delete_except_run(table, sync_run_id).await
        }

        async fn append(&self, table: &str, record: &Value) -> Result<(), StoreError> {
            if self.fail_append {
                return Err(rejected(table));
            }
            self.inner.append(table, record).await
        }
    }

    #[test]
    fn run_id_is_a_compact_utc_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 6, 5, 9).single().unwrap();
        assert_eq!(sync_run_id_for(now), "20260301T060509Z");
    }

    #[test]
    fn result_uid_depends_on_every_identifying_field() {
        let base = result("2026-02-01", 3);
        let uid = result_uid("1", &base);
        assert_eq!(uid.len(), 64);
        assert_eq!(uid, result_uid("1", &base.clone()));
        assert_ne!(uid, result_uid("2", &base));
        assert_ne!(uid, result_uid("1", &NormalizedResult { rank: Some(4), ..base.clone() }));
        assert_ne!(
            uid,
            result_uid("1", &NormalizedResult { cup_points: Some(100.0), ..base.clone() })
        );
        assert_ne!(
            uid,
            result_uid("1", &NormalizedResult { place: None, ..base })
        );
    }

    #[test]
    fn identical_results_collapse_to_one_row() {
        let doc = DatasetDocument::new(
            vec![athlete(
                "1",
                vec![result("2026-02-01", 3), result("2026-01-15", 8), result("2026-02-01", 3)],
            )],
            at(5),
        );
        let batch = build_rows(&doc, "R1", at(6));
        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.results[0].event_date, "2026-02-01");
        assert_eq!(batch.results[1].event_date, "2026-01-15");
    }

    #[test]
    fn rows_carry_run_tag_timestamps_and_fallback_discipline() {
        let doc = DatasetDocument::new(
            vec![
                athlete("1", vec![result("2026-02-01", 3), result("TBD", 9)]),
                athlete("  ", vec![result("2026-02-20", 1)]),
            ],
            at(5),
        );
        let batch = build_rows(&doc, "R1", at(6));
        assert_eq!(batch.athletes.len(), 1, "blank codes are not synced");
        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.max_event_date, NaiveDate::from_ymd_opt(2026, 2, 1));

        let row = &batch.results[0];
        assert_eq!(row.discipline, "Slalom");
        assert_eq!(row.sync_run_id, "R1");
        assert_eq!(row.source_updated_at, at(5));
        assert_eq!(row.synced_at, at(6));
        assert_eq!(batch.athletes[0].medals_gold, 0);
    }

    #[tokio::test]
    async fn second_run_keeps_counts_and_retags_every_row() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());

        let first = engine.run(&document(), Map::new(), "test", at(6)).await.unwrap();
        assert_eq!(first.athletes, 2);
        assert_eq!(first.results, 3);

        let second = engine.run(&document(), Map::new(), "test", at(7)).await.unwrap();
        assert_ne!(first.sync_run_id, second.sync_run_id);
        assert_eq!(store.row_count(ATHLETES_TABLE).await, 2);
        assert_eq!(store.row_count(RESULTS_TABLE).await, 3);

        for table in [ATHLETES_TABLE, RESULTS_TABLE] {
            let rows = store.rows(table).await;
            assert!(run_ids(&rows).iter().all(|id| *id == second.sync_run_id));
        }
        assert_eq!(store.appended(SYNC_LOG_TABLE).await.len(), 2);
    }

    #[tokio::test]
    async fn rows_from_an_earlier_run_are_swept() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert(
                ATHLETES_TABLE,
                ATHLETE_CONFLICT_KEY,
                &[json!({"federation_code": "999", "sync_run_id": "R0"})],
            )
            .await
            .unwrap();
        store
            .upsert(
                RESULTS_TABLE,
                RESULT_CONFLICT_KEY,
                &[json!({"result_uid": "old", "federation_code": "999", "sync_run_id": "R0"})],
            )
            .await
            .unwrap();

        let outcome = engine(store.clone())
            .run(&document(), Map::new(), "test", at(6))
            .await
            .unwrap();

        for table in [ATHLETES_TABLE, RESULTS_TABLE] {
            let rows = store.rows(table).await;
            assert!(!rows.is_empty());
            assert!(!run_ids(&rows).contains(&"R0"));
            assert!(run_ids(&rows).iter().all(|id| *id == outcome.sync_run_id));
        }
    }

    #[tokio::test]
    async fn success_is_audited_with_counts_and_detail() {
        let store = Arc::new(MemoryStore::new());
        let mut detail = Map::new();
        detail.insert("source".into(), json!("nightly"));

        engine(store.clone())
            .run(&document(), detail, "nightly", at(6))
            .await
            .unwrap();

        let logs = store.appended(SYNC_LOG_TABLE).await;
        assert_eq!(logs.len(), 1);
        let record: SyncRunRecord = serde_json::from_value(logs[0].clone()).unwrap();
        assert!(record.success);
        assert_eq!(record.source, "nightly");
        assert_eq!(record.athletes_count, 2);
        assert_eq!(record.results_count, 3);
        assert_eq!(record.max_event_date, NaiveDate::from_ymd_opt(2026, 2, 10));
        assert!(!record.detail.contains_key("error"));
    }

    #[tokio::test]
    async fn failed_upsert_aborts_and_records_the_error() {
        let store = Arc::new(FailingStore {
            fail_upsert_table: Some(RESULTS_TABLE),
            ..Default::default()
        });

        let err = engine(store.clone())
            .run(&document(), Map::new(), "test", at(6))
            .await
            .unwrap_err();
        assert_eq!(err.stage, SyncStage::UpsertResults);
        assert!(matches!(err.source, StoreError::Status { status: 503, .. }));

        let logs = store.inner.appended(SYNC_LOG_TABLE).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0]["success"], json!(false));
        let error_text = logs[0]["detail"]["error"].as_str().unwrap();
        assert!(error_text.contains("upsert_results"));
        assert!(error_text.contains("503"));

        // Athletes were written but nothing was pruned.
        assert_eq!(store.inner.row_count(ATHLETES_TABLE).await, 2);
    }

    #[tokio::test]
    async fn audit_write_failure_never_masks_the_outcome() {
        let failing_log = Arc::new(FailingStore {
            fail_append: true,
            ..Default::default()
        });
        let outcome = engine(failing_log.clone())
            .run(&document(), Map::new(), "test", at(6))
            .await
            .unwrap();
        assert_eq!(outcome.athletes, 2);

        let failing_both = Arc::new(FailingStore {
            fail_upsert_table: Some(ATHLETES_TABLE),
            fail_append: true,
            ..Default::default()
        });
        let err = engine(failing_both)
            .run(&document(), Map::new(), "test", at(6))
            .await
            .unwrap_err();
        assert_eq!(err.stage, SyncStage::UpsertAthletes);
    }

    #[tokio::test]
    async fn detail_embeds_or_flags_the_health_report() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("athletes.json");
        let good = dir.path().join("health.json");
        let bad = dir.path().join("broken.json");
        std::fs::write(&good, br#"{"passed": true}"#).unwrap();
        std::fs::write(&bad, b"{not json").unwrap();

        let detail = build_sync_detail(&data, &good, "ci").await;
        assert_eq!(detail["health"]["passed"], json!(true));
        assert_eq!(detail["source"], json!("ci"));

        let detail = build_sync_detail(&data, &bad, "ci").await;
        assert_eq!(detail["health_parse_error"], json!(true));
        assert!(!detail.contains_key("health"));

        let detail = build_sync_detail(&data, &dir.path().join("absent.json"), "ci").await;
        assert!(!detail.contains_key("health"));
        assert!(!detail.contains_key("health_parse_error"));
    }
}
